//! MAPCACHE Demo Entry Point
//!
//! Runs the read, promote, update, re-read scenario against the in-memory
//! Employee table and logs what each cache tier did.

mod config;
mod error;
mod telemetry;

use std::sync::Arc;

use mapcache_core::Employee;
use mapcache_storage::{
    EmployeeMapper, InMemoryEmployeeTable, Session, SessionEmployeeMapper, SessionFactory,
};

use crate::config::DemoConfig;
use crate::error::{DemoError, DemoResult};
use crate::telemetry::{init_tracing, TelemetryConfig};

fn main() -> DemoResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let demo_config = DemoConfig::from_env()?;
    let settings = demo_config.load_settings()?;
    tracing::info!(
        settings_path = ?demo_config.settings_path,
        cache_enabled = settings.cache_enabled,
        local_cache_scope = ?settings.local_cache_scope,
        "Cache settings loaded"
    );

    let table = Arc::new(InMemoryEmployeeTable::with_rows([Employee::new(
        Some(1),
        "Alice",
        "0",
        "alice@example.com",
    )]));
    let factory = SessionFactory::new(settings, table.clone())?;

    run_scenario(&factory, &table)?;
    report(&factory);
    Ok(())
}

fn run_scenario(factory: &SessionFactory, table: &InMemoryEmployeeTable) -> DemoResult<()> {
    let shared = factory.settings().cache_enabled;

    // S1: first read goes to the table, then is promoted on close.
    let s1 = factory.open_session();
    let found = SessionEmployeeMapper::bind(&s1)?.get_emp_by_id(1)?;
    expect_name("s1 read", found, "Alice")?;
    finish("s1", &s1, table)?;

    // S2: served by the shared cache.
    let before = table.executions();
    let s2 = factory.open_session();
    let found = SessionEmployeeMapper::bind(&s2)?.get_emp_by_id(1)?;
    expect_name("s2 read", found, "Alice")?;
    if shared {
        expect_executions("s2 read", table, before)?;
    }
    finish("s2", &s2, table)?;

    // S3: the write invalidates the namespace at commit.
    let s3 = factory.open_session();
    let changed = SessionEmployeeMapper::bind(&s3)?
        .update_emp(&Employee::new(Some(1), "Bob", "1", "bob@example.com"))?;
    tracing::info!(changed, "s3 updated employee 1");
    s3.commit()?;
    finish("s3", &s3, table)?;

    // S4: the collaborator is consulted again and returns the new row.
    let before = table.executions();
    let s4 = factory.open_session();
    let found = SessionEmployeeMapper::bind(&s4)?.get_emp_by_id(1)?;
    expect_name("s4 read", found, "Bob")?;
    expect_executions("s4 read", table, before + 1)?;
    finish("s4", &s4, table)?;

    Ok(())
}

fn finish(step: &'static str, session: &Session, table: &InMemoryEmployeeTable) -> DemoResult<()> {
    let stats = session.stats();
    session.close()?;
    tracing::info!(
        step,
        session_id = %session.id(),
        session_hits = stats.session_hits,
        shared_hits = stats.shared_hits,
        collaborator_calls = stats.collaborator_calls,
        table_executions = table.executions(),
        "Session closed"
    );
    Ok(())
}

fn expect_name(step: &'static str, found: Option<Employee>, expected: &str) -> DemoResult<()> {
    match found {
        Some(employee) if employee.last_name == expected => Ok(()),
        other => Err(DemoError::Scenario {
            step,
            expected: expected.to_string(),
            actual: format!("{:?}", other),
        }),
    }
}

fn expect_executions(step: &'static str, table: &InMemoryEmployeeTable, expected: u64) -> DemoResult<()> {
    let actual = table.executions();
    if actual != expected {
        return Err(DemoError::Scenario {
            step,
            expected: format!("{} table executions", expected),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn report(factory: &SessionFactory) {
    for (namespace, stats) in factory.registry().stats() {
        tracing::info!(
            %namespace,
            hits = stats.hits,
            misses = stats.misses,
            entries = stats.entry_count,
            evictions = stats.evictions,
            hit_rate = stats.hit_rate(),
            "Shared cache statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(cache_enabled: bool) -> (SessionFactory, Arc<InMemoryEmployeeTable>) {
        let settings = DemoConfig {
            settings_path: None,
            cache_enabled: Some(cache_enabled),
        }
        .load_settings()
        .unwrap();
        let table = Arc::new(InMemoryEmployeeTable::with_rows([Employee::new(
            Some(1),
            "Alice",
            "0",
            "alice@example.com",
        )]));
        (SessionFactory::new(settings, table.clone()).unwrap(), table)
    }

    #[test]
    fn test_scenario_runs_with_shared_cache() {
        let (factory, table) = factory(true);
        run_scenario(&factory, &table).unwrap();
        // s1 read, s3 update, s4 read.
        assert_eq!(table.executions(), 3);
    }

    #[test]
    fn test_scenario_runs_without_shared_cache() {
        let (factory, table) = factory(false);
        run_scenario(&factory, &table).unwrap();
        assert_eq!(table.executions(), 4);
    }

    #[test]
    fn test_expect_name_reports_mismatch() {
        let err = expect_name("step", None, "Alice").unwrap_err();
        assert!(matches!(err, DemoError::Scenario { step: "step", .. }));
    }
}
