// SPDX-License-Identifier: Apache-2.0

//! Audit Interceptor
//!
//! Records one audit entry per caller-issued query into a bounded store
//! shared by every connection that uses it. Queries issued by other
//! interceptors are not audited.
//!
//! The bound belongs to the store, so it is set once when the store is
//! created (see `BuiltinStores::from_properties`), never per connection.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::types::{AuditLogEntry, QueryOperationType};
use crate::config::Properties;
use crate::engine::connection::ConnectionHandle;
use crate::engine::types::{ConnectionId, Query, ResultSet, ServerSession};
use crate::interceptor::error::InterceptorError;
use crate::interceptor::log::LogSink;
use crate::interceptor::traits::QueryInterceptor;

pub const MAX_ENTRIES_PROPERTY: &str = "audit.maxEntries";
pub const DEFAULT_MAX_ENTRIES: usize = 10000;

/// Bounded in-memory audit log
pub struct AuditStore {
    entries: RwLock<VecDeque<AuditLogEntry>>,
    max_entries: RwLock<usize>,
}

impl AuditStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: RwLock::new(max_entries),
        }
    }

    pub fn max_entries(&self) -> usize {
        *self.max_entries.read()
    }

    /// Update max audit entries, dropping the oldest beyond the new bound
    pub fn set_max_entries(&self, max_entries: usize) {
        *self.max_entries.write() = max_entries;
        let mut entries = self.entries.write();
        while entries.len() > max_entries {
            entries.pop_front();
        }
    }

    pub fn log(&self, entry: AuditLogEntry) {
        let max_entries = self.max_entries();
        let mut entries = self.entries.write();
        if max_entries == 0 {
            return;
        }
        while entries.len() >= max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent first
    pub fn get_entries(
        &self,
        limit: usize,
        offset: usize,
        connection_id: Option<ConnectionId>,
        operation: Option<QueryOperationType>,
    ) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .iter()
            .rev()
            .filter(|e| connection_id.map_or(true, |id| e.connection_id == id))
            .filter(|e| operation.map_or(true, |op| e.operation_type == op))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        info!("Audit log cleared");
    }

    /// Export all entries as JSON lines, oldest first
    pub fn export(&self) -> String {
        self.entries
            .read()
            .iter()
            .filter_map(|e| serde_json::to_string(e).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for AuditStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

/// Audits every caller-issued query
pub struct AuditInterceptor {
    store: Arc<AuditStore>,
    connection_id: Option<ConnectionId>,
    log: Option<LogSink>,
}

impl AuditInterceptor {
    pub fn new(store: Arc<AuditStore>) -> Self {
        Self {
            store,
            connection_id: None,
            log: None,
        }
    }
}

impl QueryInterceptor for AuditInterceptor {
    fn init(
        mut self: Box<Self>,
        conn: &ConnectionHandle,
        _props: &Properties,
        log: &LogSink,
    ) -> Result<Box<dyn QueryInterceptor>, InterceptorError> {
        self.connection_id = Some(conn.id());
        self.log = Some(log.clone());
        Ok(self)
    }

    fn post_process(
        &self,
        sql: &str,
        query: &Query,
        result: ResultSet,
        session: &ServerSession,
    ) -> Result<ResultSet, InterceptorError> {
        let connection_id = self.connection_id.unwrap_or_default();
        let mut entry = AuditLogEntry::new(connection_id, query.id, sql);
        entry.success = result.complete;
        entry.row_count = result.row_count();
        entry.affected_rows = result.affected_rows;
        entry.warning_count = session.warning_count;

        if let Some(log) = &self.log {
            log.debug(format_args!(
                "audited {:?} query {} (success: {})",
                entry.operation_type, entry.query_id, entry.success
            ));
        }
        self.store.log(entry);
        Ok(result)
    }

    fn execute_top_level_only(&self) -> bool {
        true
    }
}
