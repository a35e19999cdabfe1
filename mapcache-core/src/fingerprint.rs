//! Query fingerprints: the lookup key for both cache tiers.
//!
//! A `QueryFingerprint` can only be built from a namespace, a statement id,
//! the ordered parameter values and the row bounds. Two reads with the same
//! fingerprint are assumed to return the same result until a write
//! intervenes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Logical grouping owning exactly one shared cache (one per entity/table).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Namespace(String);

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Namespace {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A single bound parameter value.
///
/// Restricted to hashable scalars so fingerprints can derive `Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(v) => Value::Bool(*v),
            Self::Int(v) => Value::from(*v),
            Self::Text(v) => Value::String(v.clone()),
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Null => buf.push(0),
            Self::Bool(v) => {
                buf.push(1);
                buf.push(u8::from(*v));
            }
            Self::Int(v) => {
                buf.push(2);
                buf.extend_from_slice(&v.to_le_bytes());
            }
            Self::Text(v) => {
                buf.push(3);
                encode_str(buf, v);
            }
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Ordered, named statement parameters.
///
/// Order is significant: `(a=1, b=2)` and `(b=2, a=1)` are different
/// fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Params(Vec<(String, ParamValue)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    /// Look up a parameter by name (first match).
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object view, for collaborators that bind by name.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(n, v)| (n.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, ParamValue)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result-row window applied to list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RowBounds {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl RowBounds {
    /// No offset, no limit.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.offset == 0 && self.limit.is_none()
    }

    /// Apply the window to a result. Only arrays are windowed.
    pub fn apply(&self, result: Value) -> Value {
        if self.is_unbounded() {
            return result;
        }
        match result {
            Value::Array(rows) => {
                let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
                let limit = self
                    .limit
                    .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
                    .unwrap_or(usize::MAX);
                Value::Array(rows.into_iter().skip(offset).take(limit).collect())
            }
            other => other,
        }
    }
}

/// Deterministic cache key for one query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryFingerprint {
    inner: FingerprintInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FingerprintInner {
    namespace: Namespace,
    statement: String,
    params: Params,
    bounds: RowBounds,
}

impl QueryFingerprint {
    pub fn new(
        namespace: Namespace,
        statement: impl Into<String>,
        params: Params,
        bounds: RowBounds,
    ) -> Self {
        Self {
            inner: FingerprintInner {
                namespace,
                statement: statement.into(),
                params,
                bounds,
            },
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.inner.namespace
    }

    pub fn statement(&self) -> &str {
        &self.inner.statement
    }

    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    pub fn bounds(&self) -> RowBounds {
        self.inner.bounds
    }

    /// Length-prefixed binary encoding of every component.
    ///
    /// Length prefixes keep `("a|b", "c")` and `("a", "b|c")` distinct.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        encode_str(&mut buf, self.inner.namespace.as_str());
        encode_str(&mut buf, &self.inner.statement);
        buf.extend_from_slice(&(self.inner.params.len() as u64).to_le_bytes());
        for (name, value) in self.inner.params.iter() {
            encode_str(&mut buf, name);
            value.encode_into(&mut buf);
        }
        buf.extend_from_slice(&self.inner.bounds.offset.to_le_bytes());
        match self.inner.bounds.limit {
            Some(limit) => {
                buf.push(1);
                buf.extend_from_slice(&limit.to_le_bytes());
            }
            None => buf.push(0),
        }
        buf
    }

    /// Hex SHA-256 of [`encode`](Self::encode), used to correlate log lines.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.encode());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.inner.namespace, self.inner.statement)?;
        for (i, (name, value)) in self.inner.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value.to_json())?;
        }
        f.write_str(")")?;
        if !self.inner.bounds.is_unbounded() {
            write!(
                f,
                "[{}..{:?}]",
                self.inner.bounds.offset, self.inner.bounds.limit
            )?;
        }
        Ok(())
    }
}

fn encode_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}
