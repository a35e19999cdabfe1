//! MAPCACHE Core - Shared Types
//!
//! Fingerprints, mapped statements, settings, entities and errors used by
//! every other crate. No caching behavior lives here.

pub mod config;
pub mod entities;
pub mod error;
pub mod fingerprint;
pub mod statement;

pub use config::{CacheSettings, LocalCacheScope, NamespaceSettings, StatementSettings};
pub use entities::{Employee, EMPLOYEE_NAMESPACE};
pub use error::{
    ConfigError, ExecutorError, MapCacheError, MapCacheResult, SessionError,
};
pub use fingerprint::{Namespace, ParamValue, Params, QueryFingerprint, RowBounds};
pub use statement::{MappedStatement, StatementKind};

/// Opaque result payload: a mapping, a list of records or a scalar.
pub type Payload = serde_json::Value;
