//! Typed Employee mapper over a [`Session`].
//!
//! Each method resolves to one configured statement of the `Employee`
//! namespace, runs it through the session (and therefore through both cache
//! tiers) and decodes the payload into Rust types.

use std::collections::BTreeMap;

use mapcache_core::{
    Employee, MapCacheError, MapCacheResult, MappedStatement, NamespaceSettings, Params, Payload,
    RowBounds, StatementKind, StatementSettings, EMPLOYEE_NAMESPACE,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::session::Session;

/// Statement ids of the Employee namespace.
pub mod statements {
    pub const GET_EMP_BY_ID: &str = "getEmpById";
    pub const GET_EMP_BY_ID_AND_LAST_NAME: &str = "getEmpByIdAndLastName";
    pub const GET_EMP_BY_MAP: &str = "getEmpByMap";
    pub const GET_EMPS_BY_LAST_NAME: &str = "getEmpsByLastName";
    pub const GET_EMP_BY_ID_RETURN_MAP: &str = "getEmpByIdReturnMap";
    pub const GET_EMP_BY_LAST_NAME_LIKE_RETURN_MAP: &str = "getEmpByLastNameLikeReturnMap";
    pub const ADD_EMP: &str = "addEmp";
    pub const UPDATE_EMP: &str = "updateEmp";
    pub const DELETE_EMP_BY_ID: &str = "deleteEmpById";
}

/// Namespace settings registering every Employee statement with defaults.
pub fn employee_namespace_settings() -> NamespaceSettings {
    use statements::*;

    let selects = [
        GET_EMP_BY_ID,
        GET_EMP_BY_ID_AND_LAST_NAME,
        GET_EMP_BY_MAP,
        GET_EMPS_BY_LAST_NAME,
        GET_EMP_BY_ID_RETURN_MAP,
        GET_EMP_BY_LAST_NAME_LIKE_RETURN_MAP,
    ];
    let writes = [
        (ADD_EMP, StatementKind::Insert),
        (UPDATE_EMP, StatementKind::Update),
        (DELETE_EMP_BY_ID, StatementKind::Delete),
    ];

    let settings = selects.into_iter().fold(NamespaceSettings::default(), |ns, id| {
        ns.with_statement(id, StatementSettings::new(StatementKind::Select))
    });
    writes
        .into_iter()
        .fold(settings, |ns, (id, kind)| ns.with_statement(id, StatementSettings::new(kind)))
}

// ============================================================================
// MAPPER TRAIT
// ============================================================================

/// Employee data access.
pub trait EmployeeMapper {
    fn get_emp_by_id(&self, id: i64) -> MapCacheResult<Option<Employee>>;

    fn get_emp_by_id_and_last_name(
        &self,
        id: i64,
        last_name: &str,
    ) -> MapCacheResult<Option<Employee>>;

    /// Lookup by a caller-built parameter map (`id`, `lastName`).
    fn get_emp_by_map(&self, params: Params) -> MapCacheResult<Option<Employee>>;

    /// Employees whose last name matches a SQL `LIKE` pattern, by id.
    fn get_emps_by_last_name(&self, pattern: &str) -> MapCacheResult<Vec<Employee>>;

    /// One row as a column → value map.
    fn get_emp_by_id_return_map(&self, id: i64) -> MapCacheResult<Option<Map<String, Value>>>;

    /// Matching employees keyed by id.
    fn get_emp_by_last_name_like_return_map(
        &self,
        pattern: &str,
    ) -> MapCacheResult<BTreeMap<i64, Employee>>;

    /// Insert and return the generated id.
    fn add_emp(&self, employee: &Employee) -> MapCacheResult<i64>;

    /// Returns the number of rows changed.
    fn update_emp(&self, employee: &Employee) -> MapCacheResult<u64>;

    fn delete_emp_by_id(&self, id: i64) -> MapCacheResult<u64>;
}

// ============================================================================
// SESSION-BACKED MAPPER
// ============================================================================

#[derive(Debug, Clone)]
struct EmployeeStatements {
    get_by_id: MappedStatement,
    get_by_id_and_last_name: MappedStatement,
    get_by_map: MappedStatement,
    get_by_last_name: MappedStatement,
    get_by_id_return_map: MappedStatement,
    get_by_last_name_like_return_map: MappedStatement,
    add: MappedStatement,
    update: MappedStatement,
    delete_by_id: MappedStatement,
}

/// [`EmployeeMapper`] bound to one session.
#[derive(Debug)]
pub struct SessionEmployeeMapper<'s> {
    session: &'s Session,
    statements: EmployeeStatements,
}

impl<'s> SessionEmployeeMapper<'s> {
    /// Resolve every Employee statement against the session's settings.
    ///
    /// Fails with a configuration error if one is not registered.
    pub fn bind(session: &'s Session) -> MapCacheResult<Self> {
        let resolve = |id: &str| session.statement(EMPLOYEE_NAMESPACE, id);
        let statements = EmployeeStatements {
            get_by_id: resolve(statements::GET_EMP_BY_ID)?,
            get_by_id_and_last_name: resolve(statements::GET_EMP_BY_ID_AND_LAST_NAME)?,
            get_by_map: resolve(statements::GET_EMP_BY_MAP)?,
            get_by_last_name: resolve(statements::GET_EMPS_BY_LAST_NAME)?,
            get_by_id_return_map: resolve(statements::GET_EMP_BY_ID_RETURN_MAP)?,
            get_by_last_name_like_return_map: resolve(
                statements::GET_EMP_BY_LAST_NAME_LIKE_RETURN_MAP,
            )?,
            add: resolve(statements::ADD_EMP)?,
            update: resolve(statements::UPDATE_EMP)?,
            delete_by_id: resolve(statements::DELETE_EMP_BY_ID)?,
        };
        Ok(Self {
            session,
            statements,
        })
    }

    pub fn session(&self) -> &Session {
        self.session
    }

    fn query<T: DeserializeOwned>(&self, statement: &MappedStatement, params: Params) -> MapCacheResult<T> {
        let read = self.session.select(statement, params, RowBounds::unbounded())?;
        decode(statement, read.into_value())
    }

    fn write<T: DeserializeOwned>(&self, statement: &MappedStatement, params: Params) -> MapCacheResult<T> {
        let result = self.session.update(statement, params)?;
        decode(statement, result)
    }
}

fn decode<T: DeserializeOwned>(statement: &MappedStatement, payload: Payload) -> MapCacheResult<T> {
    serde_json::from_value(payload).map_err(|e| MapCacheError::Mapping {
        statement: statement.qualified_id(),
        reason: e.to_string(),
    })
}

fn employee_params(employee: &Employee) -> Params {
    Params::new()
        .with("id", employee.id)
        .with("lastName", employee.last_name.as_str())
        .with("gender", employee.gender.as_str())
        .with("email", employee.email.as_str())
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertOutcome {
    generated_key: i64,
}

impl EmployeeMapper for SessionEmployeeMapper<'_> {
    fn get_emp_by_id(&self, id: i64) -> MapCacheResult<Option<Employee>> {
        self.query(&self.statements.get_by_id, Params::new().with("id", id))
    }

    fn get_emp_by_id_and_last_name(
        &self,
        id: i64,
        last_name: &str,
    ) -> MapCacheResult<Option<Employee>> {
        self.query(
            &self.statements.get_by_id_and_last_name,
            Params::new().with("id", id).with("lastName", last_name),
        )
    }

    fn get_emp_by_map(&self, params: Params) -> MapCacheResult<Option<Employee>> {
        self.query(&self.statements.get_by_map, params)
    }

    fn get_emps_by_last_name(&self, pattern: &str) -> MapCacheResult<Vec<Employee>> {
        self.query(
            &self.statements.get_by_last_name,
            Params::new().with("lastName", pattern),
        )
    }

    fn get_emp_by_id_return_map(&self, id: i64) -> MapCacheResult<Option<Map<String, Value>>> {
        self.query(&self.statements.get_by_id_return_map, Params::new().with("id", id))
    }

    fn get_emp_by_last_name_like_return_map(
        &self,
        pattern: &str,
    ) -> MapCacheResult<BTreeMap<i64, Employee>> {
        self.query(
            &self.statements.get_by_last_name_like_return_map,
            Params::new().with("lastName", pattern),
        )
    }

    fn add_emp(&self, employee: &Employee) -> MapCacheResult<i64> {
        let outcome: InsertOutcome = self.write(&self.statements.add, employee_params(employee))?;
        Ok(outcome.generated_key)
    }

    fn update_emp(&self, employee: &Employee) -> MapCacheResult<u64> {
        self.write(&self.statements.update, employee_params(employee))
    }

    fn delete_emp_by_id(&self, id: i64) -> MapCacheResult<u64> {
        self.write(&self.statements.delete_by_id, Params::new().with("id", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_table::InMemoryEmployeeTable;
    use crate::session::SessionFactory;
    use mapcache_core::CacheSettings;
    use std::sync::Arc;

    fn factory() -> (SessionFactory, Arc<InMemoryEmployeeTable>) {
        let table = Arc::new(InMemoryEmployeeTable::with_rows([
            Employee::new(Some(1), "Alice", "0", "alice@example.com"),
            Employee::new(Some(2), "Bob", "1", "bob@example.com"),
        ]));
        let settings =
            CacheSettings::default().with_namespace(EMPLOYEE_NAMESPACE, employee_namespace_settings());
        let factory = SessionFactory::new(settings, table.clone()).unwrap();
        (factory, table)
    }

    #[test]
    fn test_namespace_settings_register_every_statement() {
        let settings =
            CacheSettings::default().with_namespace(EMPLOYEE_NAMESPACE, employee_namespace_settings());
        let add = settings.statement(EMPLOYEE_NAMESPACE, statements::ADD_EMP).unwrap();
        assert!(add.flush_cache);
        assert!(!add.use_cache);
        let get = settings.statement(EMPLOYEE_NAMESPACE, statements::GET_EMP_BY_ID).unwrap();
        assert!(get.use_cache);
        assert!(!get.flush_cache);
    }

    #[test]
    fn test_bind_fails_without_registration() {
        let table = Arc::new(InMemoryEmployeeTable::new());
        let factory = SessionFactory::new(CacheSettings::default(), table).unwrap();
        let session = factory.open_session();
        let err = SessionEmployeeMapper::bind(&session).unwrap_err();
        assert!(matches!(err, MapCacheError::Config(_)));
    }

    #[test]
    fn test_reads_decode_into_employees() {
        let (factory, table) = factory();
        let session = factory.open_session();
        let mapper = SessionEmployeeMapper::bind(&session).unwrap();

        let alice = mapper.get_emp_by_id(1).unwrap().unwrap();
        assert_eq!(alice.last_name, "Alice");
        assert!(mapper.get_emp_by_id(42).unwrap().is_none());
        assert!(mapper.get_emp_by_id_and_last_name(1, "Bob").unwrap().is_none());

        let by_map = mapper
            .get_emp_by_map(Params::new().with("id", 2).with("lastName", "Bob"))
            .unwrap();
        assert_eq!(by_map.and_then(|e| e.id), Some(2));

        let all = mapper.get_emps_by_last_name("%").unwrap();
        assert_eq!(all.len(), 2);

        let columns = mapper.get_emp_by_id_return_map(2).unwrap().unwrap();
        assert_eq!(columns.get("email"), Some(&Value::from("bob@example.com")));

        let keyed = mapper.get_emp_by_last_name_like_return_map("A%").unwrap();
        assert_eq!(keyed.keys().copied().collect::<Vec<_>>(), vec![1]);

        // Same call again is served from the session cache.
        let before = table.executions();
        mapper.get_emp_by_id(1).unwrap();
        assert_eq!(table.executions(), before);
    }

    #[test]
    fn test_writes_round_trip_through_table() {
        let (factory, table) = factory();
        let session = factory.open_session();
        let mapper = SessionEmployeeMapper::bind(&session).unwrap();

        let id = mapper
            .add_emp(&Employee::new(None, "Carol", "0", "carol@example.com"))
            .unwrap();
        assert_eq!(id, 3);

        let changed = mapper
            .update_emp(&Employee::new(Some(id), "Caroline", "0", "carol@example.com"))
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(mapper.get_emp_by_id(id).unwrap().unwrap().last_name, "Caroline");

        assert_eq!(mapper.delete_emp_by_id(id).unwrap(), 1);
        assert_eq!(mapper.delete_emp_by_id(id).unwrap(), 0);
        session.commit().unwrap();
        assert!(table.row(id).is_none());
    }

    #[test]
    fn test_update_without_id_is_collaborator_error() {
        let (factory, _table) = factory();
        let session = factory.open_session();
        let mapper = SessionEmployeeMapper::bind(&session).unwrap();
        let err = mapper
            .update_emp(&Employee::new(None, "Nobody", "0", "n@example.com"))
            .unwrap_err();
        assert!(err.is_collaborator_error());
    }

    #[test]
    fn test_payload_shape_mismatch_is_mapping_error() {
        let (factory, _table) = factory();
        let session = factory.open_session();
        let mapper = SessionEmployeeMapper::bind(&session).unwrap();
        // A list payload cannot decode into a single employee.
        let err = mapper
            .query::<Option<Employee>>(
                &mapper.statements.get_by_last_name,
                Params::new().with("lastName", "%"),
            )
            .unwrap_err();
        assert!(matches!(err, MapCacheError::Mapping { .. }));
    }
}
