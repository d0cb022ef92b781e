//! Plugin Types
//!
//! Records produced by the built-in interceptors.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::types::{ConnectionId, QueryId};

/// Characters of SQL kept in previews
const PREVIEW_CHARS: usize = 100;

/// Query operation type for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryOperationType {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Truncate,
    Grant,
    Revoke,
    Execute,
    Show,
    #[default]
    Other,
}

impl QueryOperationType {
    /// Classifies a statement by its leading keyword
    pub fn classify(sql: &str) -> Self {
        let first_word = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match first_word.as_str() {
            "SELECT" | "WITH" => Self::Select,
            "INSERT" | "REPLACE" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "CREATE" => Self::Create,
            "ALTER" => Self::Alter,
            "DROP" => Self::Drop,
            "TRUNCATE" => Self::Truncate,
            "GRANT" => Self::Grant,
            "REVOKE" => Self::Revoke,
            "EXEC" | "EXECUTE" | "CALL" => Self::Execute,
            "SHOW" | "DESCRIBE" | "EXPLAIN" => Self::Show,
            _ => Self::Other,
        }
    }

    /// Returns true if this operation modifies data or schema
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Select | Self::Show)
    }
}

/// An entry in the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub connection_id: ConnectionId,
    pub query_id: QueryId,
    pub query: String,
    /// Truncated query for display
    pub query_preview: String,
    pub operation_type: QueryOperationType,
    /// False when the server did not finish the query
    pub success: bool,
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub affected_rows: Option<u64>,
    #[serde(default)]
    pub warning_count: u32,
}

impl AuditLogEntry {
    pub fn new(connection_id: ConnectionId, query_id: QueryId, query: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            connection_id,
            query_id,
            query: query.to_string(),
            query_preview: preview(query),
            operation_type: QueryOperationType::classify(query),
            success: false,
            row_count: 0,
            affected_rows: None,
            warning_count: 0,
        }
    }
}

/// Aggregated execution-time metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilingMetrics {
    pub total_queries: u64,
    pub successful_queries: u64,
    /// Queries the server did not finish (cancelled, timed out, failed)
    pub failed_queries: u64,
    pub total_execution_time_ms: f64,
    pub avg_execution_time_ms: f64,
    pub min_execution_time_ms: f64,
    pub max_execution_time_ms: f64,
    /// Number of queries at or above the slow threshold
    pub slow_query_count: u64,
    /// Queries by operation type
    pub by_operation_type: HashMap<String, u64>,
    pub period_start: DateTime<Utc>,
}

impl ProfilingMetrics {
    pub fn new() -> Self {
        Self {
            total_queries: 0,
            successful_queries: 0,
            failed_queries: 0,
            total_execution_time_ms: 0.0,
            avg_execution_time_ms: 0.0,
            min_execution_time_ms: f64::MAX,
            max_execution_time_ms: 0.0,
            slow_query_count: 0,
            by_operation_type: HashMap::new(),
            period_start: Utc::now(),
        }
    }
}

impl Default for ProfilingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A slow query kept for later analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQueryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub connection_id: ConnectionId,
    pub query: String,
    pub execution_time_ms: f64,
    /// 1 for caller-issued queries, deeper for interceptor-issued ones
    pub depth: usize,
}

pub(crate) fn preview(query: &str) -> String {
    let mut preview: String = query.chars().take(PREVIEW_CHARS).collect();
    if query.chars().nth(PREVIEW_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}
