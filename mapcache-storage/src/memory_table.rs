//! In-process `employee` table acting as the query-execution collaborator.
//!
//! Understands every statement of the Employee namespace. Used by the tests
//! and the demo binary in place of a real database connection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use mapcache_core::{
    Employee, ExecutorError, MappedStatement, ParamValue, Params, Payload, EMPLOYEE_NAMESPACE,
};
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::cache::traits::QueryExecutor;
use crate::mapper::statements;

/// Employee rows keyed by id.
#[derive(Debug)]
pub struct InMemoryEmployeeTable {
    rows: RwLock<BTreeMap<i64, Employee>>,
    next_id: AtomicI64,
    executions: AtomicU64,
}

impl Default for InMemoryEmployeeTable {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            executions: AtomicU64::new(0),
        }
    }
}

impl InMemoryEmployeeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-filled with `rows`; rows without an id get one assigned.
    pub fn with_rows(rows: impl IntoIterator<Item = Employee>) -> Self {
        let table = Self::new();
        for row in rows {
            table.seed(row);
        }
        table
    }

    /// Insert directly, without going through a statement. Returns the id.
    ///
    /// An existing row with the same id is replaced. Generated ids saturate
    /// at `i64::MAX`.
    pub fn seed(&self, employee: Employee) -> i64 {
        let mut rows = self.write();
        let id = employee
            .id
            .unwrap_or_else(|| self.next_id.load(Ordering::SeqCst));
        self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
        rows.insert(id, Employee { id: Some(id), ..employee });
        id
    }

    /// Insert a new row. The duplicate check, key generation and insert all
    /// happen under one write guard.
    fn insert(&self, statement: &MappedStatement, employee: Employee) -> Result<i64, ExecutorError> {
        let mut rows = self.write();
        let id = employee
            .id
            .unwrap_or_else(|| self.next_id.load(Ordering::SeqCst));
        if rows.contains_key(&id) {
            return Err(violation(statement, format!("duplicate primary key {}", id)));
        }
        let next = id
            .checked_add(1)
            .ok_or_else(|| violation(statement, format!("primary key {} exhausts the key space", id)))?;
        self.next_id.fetch_max(next, Ordering::SeqCst);
        rows.insert(id, Employee { id: Some(id), ..employee });
        Ok(id)
    }

    pub fn row(&self, id: i64) -> Option<Employee> {
        self.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of statements executed so far.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<i64, Employee>> {
        self.rows.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<i64, Employee>> {
        self.rows.write().unwrap_or_else(|e| e.into_inner())
    }

    fn select_by_id(&self, id: i64, last_name: Option<&str>) -> Payload {
        self.read()
            .get(&id)
            .filter(|e| last_name.map_or(true, |name| e.last_name == name))
            .map(to_json)
            .unwrap_or(Value::Null)
    }

    fn select_like(&self, statement: &MappedStatement, pattern: &str) -> Result<Vec<Employee>, ExecutorError> {
        let matcher = like_matcher(statement, pattern)?;
        Ok(self
            .read()
            .values()
            .filter(|e| matcher.is_match(&e.last_name))
            .cloned()
            .collect())
    }
}

impl QueryExecutor for InMemoryEmployeeTable {
    fn execute(&self, statement: &MappedStatement, params: &Params) -> Result<Payload, ExecutorError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if statement.namespace.as_str() != EMPLOYEE_NAMESPACE {
            return Err(unknown(statement));
        }

        match statement.id.as_str() {
            statements::GET_EMP_BY_ID => {
                let id = require_int(statement, params, "id")?;
                Ok(self.select_by_id(id, None))
            }
            statements::GET_EMP_BY_ID_AND_LAST_NAME | statements::GET_EMP_BY_MAP => {
                let id = require_int(statement, params, "id")?;
                let last_name = require_text(statement, params, "lastName")?;
                Ok(self.select_by_id(id, Some(last_name)))
            }
            statements::GET_EMPS_BY_LAST_NAME => {
                let pattern = require_text(statement, params, "lastName")?;
                let rows = self.select_like(statement, pattern)?;
                Ok(Value::Array(rows.iter().map(to_json).collect()))
            }
            statements::GET_EMP_BY_ID_RETURN_MAP => {
                let id = require_int(statement, params, "id")?;
                Ok(self
                    .read()
                    .get(&id)
                    .map(column_map)
                    .unwrap_or(Value::Null))
            }
            statements::GET_EMP_BY_LAST_NAME_LIKE_RETURN_MAP => {
                let pattern = require_text(statement, params, "lastName")?;
                let keyed: Map<String, Value> = self
                    .select_like(statement, pattern)?
                    .iter()
                    .filter_map(|e| e.id.map(|id| (id.to_string(), to_json(e))))
                    .collect();
                Ok(Value::Object(keyed))
            }
            statements::ADD_EMP => {
                let employee = Employee {
                    id: params.get("id").and_then(ParamValue::as_i64),
                    last_name: require_text(statement, params, "lastName")?.to_string(),
                    gender: require_text(statement, params, "gender")?.to_string(),
                    email: require_text(statement, params, "email")?.to_string(),
                };
                let id = self.insert(statement, employee)?;
                Ok(json!({"affected": 1, "generatedKey": id}))
            }
            statements::UPDATE_EMP => {
                let id = require_int(statement, params, "id")?;
                let last_name = require_text(statement, params, "lastName")?;
                let gender = require_text(statement, params, "gender")?;
                let email = require_text(statement, params, "email")?;
                let mut rows = self.write();
                let affected = match rows.get_mut(&id) {
                    Some(row) => {
                        *row = Employee::new(Some(id), last_name, gender, email);
                        1
                    }
                    None => 0,
                };
                Ok(json!(affected))
            }
            statements::DELETE_EMP_BY_ID => {
                let id = require_int(statement, params, "id")?;
                let affected = u64::from(self.write().remove(&id).is_some());
                Ok(json!(affected))
            }
            _ => Err(unknown(statement)),
        }
    }
}

fn unknown(statement: &MappedStatement) -> ExecutorError {
    ExecutorError::UnknownStatement {
        statement: statement.qualified_id(),
    }
}

fn violation(statement: &MappedStatement, reason: String) -> ExecutorError {
    ExecutorError::ConstraintViolation {
        statement: statement.qualified_id(),
        reason,
    }
}

fn missing(statement: &MappedStatement, parameter: &str) -> ExecutorError {
    ExecutorError::MissingParameter {
        statement: statement.qualified_id(),
        parameter: parameter.to_string(),
    }
}

fn require_int(statement: &MappedStatement, params: &Params, name: &str) -> Result<i64, ExecutorError> {
    params
        .get(name)
        .and_then(ParamValue::as_i64)
        .ok_or_else(|| missing(statement, name))
}

fn require_text<'p>(
    statement: &MappedStatement,
    params: &'p Params,
    name: &str,
) -> Result<&'p str, ExecutorError> {
    params
        .get(name)
        .and_then(ParamValue::as_str)
        .ok_or_else(|| missing(statement, name))
}

fn to_json(employee: &Employee) -> Value {
    json!({
        "id": employee.id,
        "lastName": employee.last_name,
        "gender": employee.gender,
        "email": employee.email,
    })
}

/// Row as a column-name → value map.
fn column_map(employee: &Employee) -> Value {
    json!({
        "id": employee.id,
        "last_name": employee.last_name,
        "gender": employee.gender,
        "email": employee.email,
    })
}

/// Compile a SQL `LIKE` pattern (`%` any run, `_` one char), case-insensitive.
fn like_matcher(statement: &MappedStatement, pattern: &str) -> Result<Regex, ExecutorError> {
    let mut expr = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| ExecutorError::ExecutionFailed {
        statement: statement.qualified_id(),
        reason: e.to_string(),
    })
}
