//! MAPCACHE Test Utilities
//!
//! Shared test infrastructure for the mapcache workspace:
//! - Instrumented collaborators (call counting, failure injection, gating)
//! - A promotion sink that records what it forwards
//! - Fixtures for the Employee scenario
//! - Proptest generators for fingerprints, params and payloads
//! - Assertions on `MapCacheResult` variants

pub use mapcache_core::{
    CacheSettings, Employee, ExecutorError, LocalCacheScope, MapCacheError, MapCacheResult,
    MappedStatement, Namespace, NamespaceSettings, ParamValue, Params, Payload, QueryFingerprint,
    RowBounds, SessionError, StatementKind, EMPLOYEE_NAMESPACE,
};
pub use mapcache_storage::{
    employee_namespace_settings, CacheRead, CacheTier, InMemoryEmployeeTable, PromotionEvent,
    PromotionSink, QueryExecutor, SessionFactory, SharedCacheRegistry,
};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// INSTRUMENTED COLLABORATORS
// ============================================================================

#[derive(Debug, Default)]
struct GateState {
    armed: bool,
    entered: usize,
    released: bool,
}

/// Holds collaborator calls until released.
///
/// Lets a test park one thread inside a session operation while another
/// thread exercises the same session or the shared cache.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl Gate {
    /// A gate that blocks the next callers until `release`.
    pub fn armed() -> Arc<Self> {
        let gate = Self::default();
        lock(&gate.state).armed = true;
        Arc::new(gate)
    }

    /// Called by the collaborator. Blocks while armed and not released.
    pub fn pass(&self) {
        let mut state = lock(&self.state);
        if !state.armed {
            return;
        }
        state.entered += 1;
        self.cv.notify_all();
        while !state.released {
            state = self.cv.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wait until `count` callers are parked at the gate.
    pub fn wait_entered(&self, count: usize) {
        let mut state = lock(&self.state);
        while state.entered < count {
            state = self.cv.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Let every parked and future caller through.
    pub fn release(&self) {
        let mut state = lock(&self.state);
        state.released = true;
        self.cv.notify_all();
    }
}

/// Wraps a collaborator and counts invocations per qualified statement.
#[derive(Debug)]
pub struct CountingExecutor<E> {
    inner: E,
    total: AtomicU64,
    per_statement: Mutex<BTreeMap<String, u64>>,
    fail_next: AtomicU64,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl<E: QueryExecutor> CountingExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            total: AtomicU64::new(0),
            per_statement: Mutex::new(BTreeMap::new()),
            fail_next: AtomicU64::new(0),
            gate: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Invocations so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Invocations of one statement, e.g. `"Employee.getEmpById"`.
    pub fn calls_to(&self, qualified_id: &str) -> u64 {
        lock(&self.per_statement)
            .get(qualified_id)
            .copied()
            .unwrap_or(0)
    }

    /// Make the next `count` invocations fail without reaching `inner`.
    pub fn fail_next(&self, count: u64) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Route every later invocation through `gate`.
    pub fn install_gate(&self, gate: Arc<Gate>) {
        *lock(&self.gate) = Some(gate);
    }

    /// Stop gating new invocations. Callers already parked stay parked.
    pub fn clear_gate(&self) {
        *lock(&self.gate) = None;
    }
}

impl<E: QueryExecutor> QueryExecutor for CountingExecutor<E> {
    fn execute(&self, statement: &MappedStatement, params: &Params) -> Result<Payload, ExecutorError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *lock(&self.per_statement)
            .entry(statement.qualified_id())
            .or_insert(0) += 1;

        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.pass();
        }

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ExecutorError::ExecutionFailed {
                statement: statement.qualified_id(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner.execute(statement, params)
    }
}

// ============================================================================
// PROMOTION SINK
// ============================================================================

/// Records every promotion event, then forwards it to a registry.
#[derive(Debug)]
pub struct RecordingSink {
    registry: Arc<SharedCacheRegistry>,
    events: Mutex<Vec<PromotionEvent>>,
}

impl RecordingSink {
    /// Sink forwarding to `registry`. Pass the registry the sessions read
    /// from, or promotions land where no read can see them.
    pub fn new(registry: Arc<SharedCacheRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            events: Mutex::new(Vec::new()),
        })
    }

    /// Route `factory`'s promotions through a sink forwarding to the
    /// factory's own registry.
    pub fn install(factory: SessionFactory) -> (SessionFactory, Arc<Self>) {
        let sink = Self::new(Arc::clone(factory.registry()));
        (factory.with_promotion_sink(sink.clone()), sink)
    }

    pub fn events(&self) -> Vec<PromotionEvent> {
        lock(&self.events).clone()
    }

    /// Entries promoted across every recorded event.
    pub fn promoted_entries(&self) -> usize {
        lock(&self.events).iter().map(PromotionEvent::len).sum()
    }
}

impl PromotionSink for RecordingSink {
    fn promote(&self, event: PromotionEvent) {
        lock(&self.events).push(event.clone());
        self.registry.promote(event);
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for the Employee scenario.

    use super::*;

    pub type EmployeeExecutor = CountingExecutor<InMemoryEmployeeTable>;

    pub fn alice() -> Employee {
        Employee::new(Some(1), "Alice", "0", "alice@example.com")
    }

    pub fn bob() -> Employee {
        Employee::new(Some(1), "Bob", "1", "bob@example.com")
    }

    /// Default settings with every Employee statement registered.
    pub fn employee_settings() -> CacheSettings {
        CacheSettings::default().with_namespace(EMPLOYEE_NAMESPACE, employee_namespace_settings())
    }

    /// Table holding only Alice (id 1).
    pub fn employee_table() -> InMemoryEmployeeTable {
        InMemoryEmployeeTable::with_rows([alice()])
    }

    /// Factory over a counted table seeded with Alice.
    pub fn employee_factory(settings: CacheSettings) -> (SessionFactory, Arc<EmployeeExecutor>) {
        let executor = Arc::new(CountingExecutor::new(employee_table()));
        let factory = SessionFactory::new(settings, executor.clone())
            .unwrap_or_else(|e| panic!("fixture settings must be valid: {e}"));
        (factory, executor)
    }

    pub fn get_emp_by_id() -> MappedStatement {
        MappedStatement::select(EMPLOYEE_NAMESPACE, "getEmpById")
    }

    pub fn update_emp() -> MappedStatement {
        MappedStatement::new(EMPLOYEE_NAMESPACE, "updateEmp", StatementKind::Update)
    }

    pub fn id_param(id: i64) -> Params {
        Params::new().with("id", id)
    }

    /// Parameters for `updateEmp` carrying every column of `employee`.
    pub fn employee_params(employee: &Employee) -> Params {
        Params::new()
            .with("id", employee.id)
            .with("lastName", employee.last_name.as_str())
            .with("gender", employee.gender.as_str())
            .with("email", employee.email.as_str())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache keys and payloads.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    pub fn arb_namespace() -> impl Strategy<Value = Namespace> {
        prop_oneof![
            Just(Namespace::from(EMPLOYEE_NAMESPACE)),
            Just(Namespace::from("Department")),
            "[A-Z][a-z]{2,10}".prop_map(Namespace::from),
        ]
    }

    pub fn arb_param_value() -> impl Strategy<Value = ParamValue> {
        prop_oneof![
            Just(ParamValue::Null),
            any::<bool>().prop_map(ParamValue::Bool),
            any::<i64>().prop_map(ParamValue::Int),
            "[a-zA-Z0-9%_ ]{0,16}".prop_map(ParamValue::Text),
        ]
    }

    /// Up to four parameters with distinct names.
    pub fn arb_params() -> impl Strategy<Value = Params> {
        prop::collection::btree_map("[a-z]{1,8}", arb_param_value(), 0..4)
            .prop_map(|map| map.into_iter().collect())
    }

    pub fn arb_row_bounds() -> impl Strategy<Value = RowBounds> {
        prop_oneof![
            Just(RowBounds::unbounded()),
            (0u64..100, 1u64..100).prop_map(|(offset, limit)| RowBounds::new(offset, limit)),
        ]
    }

    pub fn arb_fingerprint() -> impl Strategy<Value = QueryFingerprint> {
        (arb_namespace(), "[a-z][a-zA-Z]{2,20}", arb_params(), arb_row_bounds()).prop_map(
            |(namespace, statement, params, bounds)| {
                QueryFingerprint::new(namespace, statement, params, bounds)
            },
        )
    }

    pub fn arb_employee() -> impl Strategy<Value = Employee> {
        (
            prop::option::of(1i64..10_000),
            "[A-Z][a-z]{1,12}",
            prop_oneof![Just("0".to_string()), Just("1".to_string())],
            "[a-z]{1,10}@example\\.com",
        )
            .prop_map(|(id, last_name, gender, email)| Employee::new(id, last_name, gender, email))
    }

    /// Scalars, employee records and lists of them.
    pub fn arb_payload() -> impl Strategy<Value = Payload> {
        let employee = arb_employee()
            .prop_map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
            .boxed();
        prop_oneof![
            Just(Value::Null),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z ]{0,20}".prop_map(Value::from),
            employee.clone(),
            prop::collection::vec(employee, 0..5).prop_map(Value::Array),
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on mapcache result variants.

    use super::*;

    #[track_caller]
    pub fn assert_session_closed<T: std::fmt::Debug>(result: &MapCacheResult<T>) {
        match result {
            Err(MapCacheError::Session(SessionError::SessionClosed { .. })) => {}
            other => panic!("Expected SessionClosed, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_concurrent_use<T: std::fmt::Debug>(result: &MapCacheResult<T>) {
        match result {
            Err(MapCacheError::Session(SessionError::ConcurrentSessionUse { .. })) => {}
            other => panic!("Expected ConcurrentSessionUse, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_collaborator_error<T: std::fmt::Debug>(result: &MapCacheResult<T>) {
        match result {
            Err(MapCacheError::Collaborator(_)) => {}
            other => panic!("Expected collaborator error, got: {:?}", other),
        }
    }

    /// Assert which tier served a read.
    #[track_caller]
    pub fn assert_tier<T: std::fmt::Debug>(read: &CacheRead<T>, expected: CacheTier) {
        assert_eq!(
            read.tier(),
            expected,
            "Expected read from {:?}, got {:?}",
            expected,
            read
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
