//! Mapped entity types.

use serde::{Deserialize, Serialize};

/// Namespace holding every Employee statement and its shared cache.
pub const EMPLOYEE_NAMESPACE: &str = "Employee";

/// One row of the `employee` table.
///
/// Field names follow the bean convention (`lastName`) so results coming back
/// from the collaborator map without renaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    /// Assigned by the table on insert when `None`.
    pub id: Option<i64>,
    pub last_name: String,
    pub gender: String,
    pub email: String,
}

impl Employee {
    pub fn new(
        id: Option<i64>,
        last_name: impl Into<String>,
        gender: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id,
            last_name: last_name.into(),
            gender: gender.into(),
            email: email.into(),
        }
    }
}
