//! Mapped statements: a statement id bound to its namespace and cache flags.

use serde::{Deserialize, Serialize};

use crate::fingerprint::{Namespace, Params, QueryFingerprint, RowBounds};

/// What a statement does to the underlying table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    /// Insert, update and delete are writes; they are never cached.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Select)
    }

    /// Framework default for `flushCache`: writes flush, selects don't.
    pub fn default_flush_cache(&self) -> bool {
        self.is_write()
    }

    /// Framework default for `useCache`: only selects are cacheable.
    pub fn default_use_cache(&self) -> bool {
        !self.is_write()
    }
}

/// A resolved statement, ready to be executed through a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappedStatement {
    pub namespace: Namespace,
    pub id: String,
    pub kind: StatementKind,
    pub use_cache: bool,
    pub flush_cache: bool,
}

impl MappedStatement {
    /// Build a statement with the framework defaults for its kind.
    pub fn new(namespace: impl Into<Namespace>, id: impl Into<String>, kind: StatementKind) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            kind,
            use_cache: kind.default_use_cache(),
            flush_cache: kind.default_flush_cache(),
        }
    }

    pub fn select(namespace: impl Into<Namespace>, id: impl Into<String>) -> Self {
        Self::new(namespace, id, StatementKind::Select)
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_flush_cache(mut self, flush_cache: bool) -> Self {
        self.flush_cache = flush_cache;
        self
    }

    /// `Namespace.statementId`, as used in logs and collaborator errors.
    pub fn qualified_id(&self) -> String {
        format!("{}.{}", self.namespace, self.id)
    }

    pub fn fingerprint(&self, params: Params, bounds: RowBounds) -> QueryFingerprint {
        QueryFingerprint::new(self.namespace.clone(), self.id.clone(), params, bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults() {
        assert!(StatementKind::Select.default_use_cache());
        assert!(!StatementKind::Select.default_flush_cache());
        for kind in [StatementKind::Insert, StatementKind::Update, StatementKind::Delete] {
            assert!(kind.is_write());
            assert!(kind.default_flush_cache());
            assert!(!kind.default_use_cache());
        }
    }

    #[test]
    fn test_mapped_statement_builders() {
        let stmt = MappedStatement::select("Employee", "getEmpById")
            .with_use_cache(false)
            .with_flush_cache(true);
        assert_eq!(stmt.kind, StatementKind::Select);
        assert!(!stmt.use_cache);
        assert!(stmt.flush_cache);
        assert_eq!(stmt.qualified_id(), "Employee.getEmpById");
    }

    #[test]
    fn test_fingerprint_carries_statement_identity() {
        let stmt = MappedStatement::select("Employee", "getEmpById");
        let fp = stmt.fingerprint(Params::new().with("id", 1), RowBounds::unbounded());
        assert_eq!(fp.namespace().as_str(), "Employee");
        assert_eq!(fp.statement(), "getEmpById");
    }
}
