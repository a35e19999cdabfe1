//! Configuration types
//!
//! Mirrors the framework's global settings (`cacheEnabled`,
//! `localCacheScope`) and per-statement cache flags, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::ConfigError;
use crate::fingerprint::Namespace;
use crate::statement::{MappedStatement, StatementKind};

/// Scope of the per-session cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LocalCacheScope {
    /// Results are reused for the whole session.
    #[default]
    Session,
    /// Results are dropped right after each statement.
    Statement,
}

/// Per-statement cache flags. Unset flags take the kind's default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatementSettings {
    pub kind: StatementKind,
    #[serde(default)]
    pub use_cache: Option<bool>,
    #[serde(default)]
    pub flush_cache: Option<bool>,
}

impl StatementSettings {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            use_cache: None,
            flush_cache: None,
        }
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }

    pub fn with_flush_cache(mut self, flush_cache: bool) -> Self {
        self.flush_cache = Some(flush_cache);
        self
    }
}

/// Per-namespace settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamespaceSettings {
    /// Share another namespace's shared cache instead of owning one.
    pub cache_ref: Option<String>,
    pub statements: BTreeMap<String, StatementSettings>,
}

impl NamespaceSettings {
    pub fn with_statement(mut self, id: impl Into<String>, settings: StatementSettings) -> Self {
        self.statements.insert(id.into(), settings);
        self
    }

    pub fn with_cache_ref(mut self, target: impl Into<String>) -> Self {
        self.cache_ref = Some(target.into());
        self
    }
}

/// Global cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Global switch for the shared cache. The session cache is always on.
    pub cache_enabled: bool,
    pub local_cache_scope: LocalCacheScope,
    pub namespaces: BTreeMap<String, NamespaceSettings>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            local_cache_scope: LocalCacheScope::Session,
            namespaces: BTreeMap::new(),
        }
    }
}

impl CacheSettings {
    /// Parse and validate settings from a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a TOML settings file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&input)
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_local_cache_scope(mut self, scope: LocalCacheScope) -> Self {
        self.local_cache_scope = scope;
        self
    }

    pub fn with_namespace(mut self, name: impl Into<String>, settings: NamespaceSettings) -> Self {
        self.namespaces.insert(name.into(), settings);
        self
    }

    /// Validate cross-references between namespaces and statement flags.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, ns) in &self.namespaces {
            if let Some(target) = &ns.cache_ref {
                if !self.namespaces.contains_key(target) {
                    return Err(ConfigError::DanglingCacheRef {
                        namespace: name.clone(),
                        target: target.clone(),
                    });
                }
            }

            for (id, stmt) in &ns.statements {
                if stmt.kind.is_write() && stmt.use_cache == Some(true) {
                    return Err(ConfigError::InvalidValue {
                        field: format!("{}.{}.use_cache", name, id),
                        value: "true".to_string(),
                        reason: "write statements are never cached".to_string(),
                    });
                }
            }
        }

        for name in self.namespaces.keys() {
            let mut seen = BTreeSet::new();
            let mut current = name.as_str();
            while let Some(next) = self
                .namespaces
                .get(current)
                .and_then(|ns| ns.cache_ref.as_deref())
            {
                if !seen.insert(current) {
                    return Err(ConfigError::CyclicCacheRef {
                        namespace: name.clone(),
                    });
                }
                current = next;
            }
        }

        Ok(())
    }

    /// Resolve a statement with defaults applied.
    pub fn statement(&self, namespace: &str, id: &str) -> Result<MappedStatement, ConfigError> {
        let settings = self
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.statements.get(id))
            .ok_or_else(|| ConfigError::UnknownStatement {
                namespace: namespace.to_string(),
                statement: id.to_string(),
            })?;

        let mut stmt = MappedStatement::new(namespace, id, settings.kind);
        if let Some(use_cache) = settings.use_cache {
            stmt.use_cache = use_cache;
        }
        if let Some(flush_cache) = settings.flush_cache {
            stmt.flush_cache = flush_cache;
        }
        Ok(stmt)
    }

    /// The namespace whose shared cache `namespace` actually uses.
    ///
    /// Follows `cache_ref` chains; unknown namespaces resolve to themselves.
    pub fn cache_namespace(&self, namespace: &Namespace) -> Namespace {
        let mut current = namespace.as_str();
        for _ in 0..=self.namespaces.len() {
            match self
                .namespaces
                .get(current)
                .and_then(|ns| ns.cache_ref.as_deref())
            {
                Some(next) => current = next,
                None => break,
            }
        }
        Namespace::new(current)
    }

    /// Every namespace that borrows another namespace's cache, resolved.
    pub fn cache_aliases(&self) -> BTreeMap<Namespace, Namespace> {
        self.namespaces
            .iter()
            .filter(|(_, ns)| ns.cache_ref.is_some())
            .map(|(name, _)| {
                let ns = Namespace::new(name.clone());
                let target = self.cache_namespace(&ns);
                (ns, target)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
cache_enabled = true
local_cache_scope = "SESSION"

[namespaces.Employee.statements.getEmpById]
kind = "select"

[namespaces.Employee.statements.getEmpsByLastName]
kind = "select"
use_cache = false

[namespaces.Employee.statements.updateEmp]
kind = "update"

[namespaces.Employee.statements.touchEmp]
kind = "update"
flush_cache = false

[namespaces.Department]
cache_ref = "Employee"
"#;

    #[test]
    fn test_parse_sample_settings() {
        let settings = CacheSettings::from_toml_str(SAMPLE).unwrap();
        assert!(settings.cache_enabled);
        assert_eq!(settings.local_cache_scope, LocalCacheScope::Session);

        let get = settings.statement("Employee", "getEmpById").unwrap();
        assert!(get.use_cache);
        assert!(!get.flush_cache);

        let list = settings.statement("Employee", "getEmpsByLastName").unwrap();
        assert!(!list.use_cache);

        let update = settings.statement("Employee", "updateEmp").unwrap();
        assert!(update.flush_cache);
        assert!(!update.use_cache);

        let touch = settings.statement("Employee", "touchEmp").unwrap();
        assert!(!touch.flush_cache);
    }

    #[test]
    fn test_defaults() {
        let settings = CacheSettings::from_toml_str("").unwrap();
        assert_eq!(settings, CacheSettings::default());
        assert!(settings.cache_enabled);
    }

    #[test]
    fn test_statement_scope_parses() {
        let settings = CacheSettings::from_toml_str(
            "cache_enabled = false\nlocal_cache_scope = \"STATEMENT\"\n",
        )
        .unwrap();
        assert!(!settings.cache_enabled);
        assert_eq!(settings.local_cache_scope, LocalCacheScope::Statement);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = CacheSettings::from_toml_str("cache_enable = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_statement() {
        let settings = CacheSettings::from_toml_str(SAMPLE).unwrap();
        let err = settings.statement("Employee", "nope").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStatement { .. }));
    }

    #[test]
    fn test_cache_ref_resolution() {
        let settings = CacheSettings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(
            settings.cache_namespace(&Namespace::from("Department")),
            Namespace::from("Employee")
        );
        assert_eq!(
            settings.cache_namespace(&Namespace::from("Employee")),
            Namespace::from("Employee")
        );
        assert_eq!(
            settings.cache_namespace(&Namespace::from("Unmapped")),
            Namespace::from("Unmapped")
        );

        let aliases = settings.cache_aliases();
        assert_eq!(aliases.len(), 1);
        assert_eq!(
            aliases.get(&Namespace::from("Department")),
            Some(&Namespace::from("Employee"))
        );
    }

    #[test]
    fn test_dangling_cache_ref_rejected() {
        let settings = CacheSettings::default()
            .with_namespace("A", NamespaceSettings::default().with_cache_ref("Missing"));
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::DanglingCacheRef { .. })
        ));
    }

    #[test]
    fn test_cyclic_cache_ref_rejected() {
        let settings = CacheSettings::default()
            .with_namespace("A", NamespaceSettings::default().with_cache_ref("B"))
            .with_namespace("B", NamespaceSettings::default().with_cache_ref("A"));
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::CyclicCacheRef { .. })
        ));
    }

    #[test]
    fn test_write_with_use_cache_rejected() {
        let settings = CacheSettings::default().with_namespace(
            "Employee",
            NamespaceSettings::default().with_statement(
                "addEmp",
                StatementSettings::new(StatementKind::Insert).with_use_cache(true),
            ),
        );
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
