//! Server Status Diff Interceptor
//!
//! Snapshots the server's session status before and after every
//! caller-issued query, using its own connection, and logs the counters that
//! changed. The snapshot queries go through the chain like any other query;
//! being top-level-only is what keeps this interceptor from snapshotting its
//! own snapshots.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::config::Properties;
use crate::engine::connection::ConnectionHandle;
use crate::engine::types::{Query, ResultSet, ServerSession, Value};
use crate::interceptor::error::InterceptorError;
use crate::interceptor::log::LogSink;
use crate::interceptor::traits::QueryInterceptor;

pub const STATUS_QUERY_PROPERTY: &str = "statusDiff.query";
const DEFAULT_STATUS_QUERY: &str = "SHOW SESSION STATUS";

type StatusSnapshot = BTreeMap<String, String>;

/// A status variable whose value changed across a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub name: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

pub struct ServerStatusDiffInterceptor {
    conn: Option<ConnectionHandle>,
    log: Option<LogSink>,
    status_query: String,
    before: Mutex<Option<StatusSnapshot>>,
}

impl ServerStatusDiffInterceptor {
    pub fn new() -> Self {
        Self {
            conn: None,
            log: None,
            status_query: DEFAULT_STATUS_QUERY.to_string(),
            before: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> Result<StatusSnapshot, InterceptorError> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| InterceptorError::failed("interceptor used before init"))?;
        Ok(to_snapshot(&conn.execute(self.status_query.as_str())?))
    }
}

impl Default for ServerStatusDiffInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryInterceptor for ServerStatusDiffInterceptor {
    fn init(
        mut self: Box<Self>,
        conn: &ConnectionHandle,
        props: &Properties,
        log: &LogSink,
    ) -> Result<Box<dyn QueryInterceptor>, InterceptorError> {
        if let Some(query) = props.get(STATUS_QUERY_PROPERTY) {
            self.status_query = query.to_string();
        }
        self.conn = Some(conn.clone());
        self.log = Some(log.clone());
        Ok(self)
    }

    fn pre_process(&self, _sql: &str, _query: &Query) -> Result<Option<ResultSet>, InterceptorError> {
        let snapshot = self.snapshot()?;
        *self.before.lock() = Some(snapshot);
        Ok(None)
    }

    fn post_process(
        &self,
        _sql: &str,
        query: &Query,
        result: ResultSet,
        _session: &ServerSession,
    ) -> Result<ResultSet, InterceptorError> {
        let after = self.snapshot()?;
        let before = self.before.lock().take().unwrap_or_default();
        let changes = diff(&before, &after);

        if let Some(log) = &self.log {
            if !changes.is_empty() {
                let summary = changes
                    .iter()
                    .map(|c| {
                        format!(
                            "{}: {} -> {}",
                            c.name,
                            c.before.as_deref().unwrap_or("-"),
                            c.after.as_deref().unwrap_or("-")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                log.info(format_args!("server status changed for query {}: {}", query.id, summary));
            }
        }
        Ok(result)
    }

    fn execute_top_level_only(&self) -> bool {
        true
    }

    fn destroy(&self) -> Result<(), InterceptorError> {
        self.before.lock().take();
        Ok(())
    }
}

/// Reads (name, value) pairs from the first two columns
fn to_snapshot(result: &ResultSet) -> StatusSnapshot {
    result
        .rows
        .iter()
        .filter_map(|row| match row.as_slice() {
            [name, value, ..] => Some((value_to_string(name), value_to_string(value))),
            _ => None,
        })
        .collect()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Variables that appeared, disappeared or changed value, by name
pub fn diff(before: &StatusSnapshot, after: &StatusSnapshot) -> Vec<StatusChange> {
    let mut changes: Vec<StatusChange> = after
        .iter()
        .filter(|(name, value)| before.get(*name) != Some(*value))
        .map(|(name, value)| StatusChange {
            name: name.clone(),
            before: before.get(name).cloned(),
            after: Some(value.clone()),
        })
        .collect();

    changes.extend(
        before
            .iter()
            .filter(|(name, _)| !after.contains_key(*name))
            .map(|(name, value)| StatusChange {
                name: name.clone(),
                before: Some(value.clone()),
                after: None,
            }),
    );
    changes.sort_by(|a, b| a.name.cmp(&b.name));
    changes
}
