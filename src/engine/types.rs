//! Engine Types
//!
//! Opaque value types the interceptor chain passes around. The real wire
//! protocol and result-set decoding live outside this crate; these types only
//! carry what interceptors need to observe or substitute.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cell value inside a result row
pub type Value = serde_json::Value;

/// Unique identifier for an open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a single query execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A query on its way to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: QueryId,
    /// SQL representation handed to every hook
    pub sql: String,
    /// Bound parameters, if any
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            id: QueryId::new(),
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Result of a query, either produced by the server or substituted by an interceptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    /// Rows affected, for mutations
    #[serde(default)]
    pub affected_rows: Option<u64>,
    /// False when execution was interrupted before the server finished
    #[serde(default = "default_true")]
    pub complete: bool,
}

fn default_true() -> bool {
    true
}

impl ResultSet {
    /// Empty, complete result (no columns, no rows)
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: None,
            complete: true,
        }
    }

    /// Empty result standing in for an execution that never finished
    pub fn interrupted() -> Self {
        Self {
            complete: false,
            ..Self::empty()
        }
    }

    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: None,
            complete: true,
        }
    }

    pub fn with_affected_rows(mut self, affected_rows: u64) -> Self {
        self.affected_rows = Some(affected_rows);
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Server-side session state reported after a query executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSession {
    /// Current default schema, if the server reported one
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub warning_count: u32,
    #[serde(default)]
    pub last_insert_id: Option<u64>,
    #[serde(default)]
    pub in_transaction: bool,
}

/// What a dispatcher hands back after a successful round trip
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub result: ResultSet,
    pub session: ServerSession,
}

impl Dispatched {
    pub fn new(result: ResultSet, session: ServerSession) -> Self {
        Self { result, session }
    }
}

impl From<ResultSet> for Dispatched {
    fn from(result: ResultSet) -> Self {
        Self {
            result,
            session: ServerSession::default(),
        }
    }
}

/// Named connection settings consumed by the session manager
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Display name used in logs and session listings
    pub name: String,
    /// Interceptor chain for this connection
    #[serde(default)]
    pub chain: crate::config::ChainConfig,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, chain: crate::config::ChainConfig) -> Self {
        Self {
            name: name.into(),
            chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_result_is_incomplete() {
        let result = ResultSet::interrupted();
        assert!(!result.complete);
        assert!(result.is_empty());
        assert!(ResultSet::empty().complete);
    }

    #[test]
    fn test_result_set_deserializes_without_complete_flag() {
        let result: ResultSet =
            serde_json::from_str(r#"{"columns":[],"rows":[[1]]}"#).unwrap();
        assert!(result.complete);
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn test_query_ids_are_unique() {
        let a = Query::new("SELECT 1");
        let b = Query::new("SELECT 1");
        assert_ne!(a.id, b.id);
        assert_eq!(a.sql, b.sql);
    }
}
