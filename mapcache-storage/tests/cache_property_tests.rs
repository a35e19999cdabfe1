//! Property-based tests for the two cache tiers.
//!
//! Sessions are driven by generated operation sequences against the
//! in-memory Employee table and checked against the table's actual state.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use mapcache_storage::{CacheEntry, LogicalClock, SharedCache};
use mapcache_test_utils::fixtures::{
    employee_factory, employee_params, employee_settings, get_emp_by_id, id_param, update_emp,
};
use mapcache_test_utils::generators::{arb_fingerprint, arb_payload};
use mapcache_test_utils::{Employee, Namespace, RowBounds};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// STRATEGIES
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Read(i64),
    Write(i64, String),
    Commit,
    ClearCache,
    /// Commit, close, and continue in a new session.
    Reopen,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1i64..=4).prop_map(Op::Read),
        2 => (1i64..=4, "[A-Z][a-z]{2,8}").prop_map(|(id, name)| Op::Write(id, name)),
        1 => Just(Op::Commit),
        1 => Just(Op::ClearCache),
        2 => Just(Op::Reopen),
    ]
}

fn seeded_factory() -> (
    mapcache_test_utils::SessionFactory,
    Arc<mapcache_test_utils::fixtures::EmployeeExecutor>,
) {
    let (factory, executor) = employee_factory(employee_settings());
    for id in 2..=4 {
        executor.inner().seed(Employee::new(
            Some(id),
            format!("Emp{id}"),
            "0",
            format!("emp{id}@example.com"),
        ));
    }
    (factory, executor)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// With one session at a time and every write committed, each read
    /// returns what the table holds, whichever tier serves it.
    #[test]
    fn prop_reads_always_match_table(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let (factory, executor) = seeded_factory();
        let mut session = factory.open_session();

        for op in ops {
            match op {
                Op::Read(id) => {
                    let read = session
                        .select(&get_emp_by_id(), id_param(id), RowBounds::unbounded())
                        .unwrap();
                    let expected = executor.inner().row(id).unwrap();
                    prop_assert_eq!(
                        &read.value()["lastName"],
                        &json!(expected.last_name),
                        "read of {} served from {:?}",
                        id,
                        read.tier()
                    );
                }
                Op::Write(id, name) => {
                    let renamed = Employee::new(Some(id), name, "1", "renamed@example.com");
                    session.update(&update_emp(), employee_params(&renamed)).unwrap();
                    prop_assert_eq!(session.cached_entries(), 0);
                }
                Op::Commit => session.commit().unwrap(),
                Op::ClearCache => {
                    session.clear_cache().unwrap();
                    prop_assert_eq!(session.cached_entries(), 0);
                }
                Op::Reopen => {
                    session.commit().unwrap();
                    session.close().unwrap();
                    session = factory.open_session();
                }
            }
        }
        session.commit().unwrap();
        session.close().unwrap();
    }

    /// Without writes, each id costs one collaborator call in total: later
    /// sessions are served by the shared cache.
    #[test]
    fn prop_read_only_workload_calls_once_per_key(
        sessions in prop::collection::vec(prop::collection::vec(1i64..=4, 1..8), 1..6)
    ) {
        let (factory, executor) = seeded_factory();
        let mut distinct = BTreeSet::new();

        for reads in &sessions {
            let session = factory.open_session();
            for id in reads {
                session
                    .select(&get_emp_by_id(), id_param(*id), RowBounds::unbounded())
                    .unwrap();
                distinct.insert(*id);
            }
            session.close().unwrap();
        }

        prop_assert_eq!(executor.calls(), distinct.len() as u64);
    }

    /// Merges keep, per fingerprint, the entry with the highest sequence,
    /// regardless of arrival order.
    #[test]
    fn prop_merge_is_last_writer_by_sequence(
        writes in prop::collection::vec((0usize..4, arb_payload()), 1..24),
        order in any::<u64>(),
    ) {
        let clock = Arc::new(LogicalClock::new());
        let cache = SharedCache::new(Namespace::from("Employee"), Arc::clone(&clock));
        let keys: Vec<_> = (0..4)
            .map(|i| mapcache_test_utils::QueryFingerprint::new(
                Namespace::from("Employee"),
                "getEmpById",
                id_param(i),
                RowBounds::unbounded(),
            ))
            .collect();

        let mut stamped: Vec<_> = writes
            .into_iter()
            .map(|(key, payload)| (key, CacheEntry::new(&payload, clock.tick())))
            .collect();
        let mut newest: HashMap<usize, CacheEntry> = HashMap::new();
        for (key, entry) in &stamped {
            newest.insert(*key, entry.clone());
        }

        // Deterministic shuffle driven by the generated seed.
        let len = stamped.len();
        let mut seed = order;
        for i in (1..len).rev() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            stamped.swap(i, (seed >> 33) as usize % (i + 1));
        }
        for (key, entry) in stamped {
            cache.merge(vec![(keys[key].clone(), entry)]);
        }

        for (key, entry) in newest {
            prop_assert_eq!(cache.get(&keys[key]), Some(entry));
        }
    }

    /// After an invalidation nothing created before it is ever served,
    /// whatever was merged.
    #[test]
    fn prop_invalidation_hides_everything_older(
        entries in prop::collection::vec((arb_fingerprint(), arb_payload()), 0..16),
    ) {
        let clock = Arc::new(LogicalClock::new());
        let cache = SharedCache::new(Namespace::from("Employee"), Arc::clone(&clock));
        let stamped: Vec<_> = entries
            .iter()
            .map(|(fp, payload)| (fp.clone(), CacheEntry::new(payload, clock.tick())))
            .collect();

        cache.merge(stamped.clone());
        cache.invalidate();
        let late = cache.merge(stamped.clone());

        prop_assert_eq!(late.accepted, 0);
        prop_assert_eq!(late.stale, stamped.len());
        for (fp, _) in &stamped {
            prop_assert!(cache.get(fp).is_none());
        }
        prop_assert!(cache.is_empty());
    }
}
