// SPDX-License-Identifier: Apache-2.0

//! Profiling Interceptor
//!
//! Times every query on the connection, including queries issued by other
//! interceptors, and aggregates the timings in a shared store.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::types::{ProfilingMetrics, QueryOperationType, SlowQueryEntry};
use crate::config::Properties;
use crate::engine::connection::ConnectionHandle;
use crate::engine::types::{ConnectionId, Query, QueryId, ResultSet, ServerSession};
use crate::interceptor::error::InterceptorError;
use crate::interceptor::log::LogSink;
use crate::interceptor::traits::QueryInterceptor;

pub const SLOW_THRESHOLD_PROPERTY: &str = "profiling.slowQueryThresholdMs";
const DEFAULT_SLOW_THRESHOLD_MS: u64 = 1000;
const DEFAULT_MAX_SLOW_QUERIES: usize = 100;

/// One finished query, as measured by the interceptor
#[derive(Debug, Clone)]
pub struct Measurement<'a> {
    pub connection_id: ConnectionId,
    pub query: &'a str,
    pub execution_time_ms: f64,
    pub success: bool,
    pub depth: usize,
    pub slow_threshold_ms: u64,
}

/// Profiling store with performance metrics
pub struct ProfilingStore {
    metrics: RwLock<ProfilingMetrics>,
    slow_queries: RwLock<VecDeque<SlowQueryEntry>>,
    max_slow_queries: usize,
}

impl ProfilingStore {
    pub fn new(max_slow_queries: usize) -> Self {
        Self {
            metrics: RwLock::new(ProfilingMetrics::new()),
            slow_queries: RwLock::new(VecDeque::with_capacity(max_slow_queries)),
            max_slow_queries,
        }
    }

    /// Record a query execution
    pub fn record(&self, m: &Measurement<'_>) {
        let is_slow = m.execution_time_ms >= m.slow_threshold_ms as f64;

        {
            let mut metrics = self.metrics.write();
            metrics.total_queries += 1;
            if m.success {
                metrics.successful_queries += 1;
            } else {
                metrics.failed_queries += 1;
            }

            metrics.total_execution_time_ms += m.execution_time_ms;
            metrics.avg_execution_time_ms =
                metrics.total_execution_time_ms / metrics.total_queries as f64;
            metrics.min_execution_time_ms = metrics.min_execution_time_ms.min(m.execution_time_ms);
            metrics.max_execution_time_ms = metrics.max_execution_time_ms.max(m.execution_time_ms);

            if is_slow {
                metrics.slow_query_count += 1;
            }

            let op_key = format!("{:?}", QueryOperationType::classify(m.query)).to_lowercase();
            *metrics.by_operation_type.entry(op_key).or_insert(0) += 1;
        }

        if is_slow {
            self.record_slow_query(m);
        }
    }

    fn record_slow_query(&self, m: &Measurement<'_>) {
        if self.max_slow_queries == 0 {
            return;
        }
        let entry = SlowQueryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            connection_id: m.connection_id,
            query: m.query.to_string(),
            execution_time_ms: m.execution_time_ms,
            depth: m.depth,
        };

        let mut slow_queries = self.slow_queries.write();
        if slow_queries.len() >= self.max_slow_queries {
            slow_queries.pop_front();
        }
        slow_queries.push_back(entry);

        debug!("Recorded slow query: {}ms", m.execution_time_ms);
    }

    pub fn get_metrics(&self) -> ProfilingMetrics {
        self.metrics.read().clone()
    }

    /// Most recent first
    pub fn get_slow_queries(&self, limit: usize, offset: usize) -> Vec<SlowQueryEntry> {
        self.slow_queries
            .read()
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Reset all profiling metrics
    pub fn reset(&self) {
        *self.metrics.write() = ProfilingMetrics::new();
        self.slow_queries.write().clear();
        info!("Profiling metrics reset");
    }
}

impl Default for ProfilingStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SLOW_QUERIES)
    }
}

/// Times queries between their pre and post hooks
pub struct ProfilingInterceptor {
    store: Arc<ProfilingStore>,
    conn: Option<ConnectionHandle>,
    slow_threshold_ms: u64,
    // Queries nest, so in-flight timers form a stack per connection.
    in_flight: Mutex<Vec<(QueryId, Instant)>>,
}

impl ProfilingInterceptor {
    pub fn new(store: Arc<ProfilingStore>) -> Self {
        Self {
            store,
            conn: None,
            slow_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    fn depth(&self) -> usize {
        self.conn.as_ref().map_or(0, ConnectionHandle::nesting_depth)
    }
}

impl QueryInterceptor for ProfilingInterceptor {
    fn init(
        mut self: Box<Self>,
        conn: &ConnectionHandle,
        props: &Properties,
        _log: &LogSink,
    ) -> Result<Box<dyn QueryInterceptor>, InterceptorError> {
        self.slow_threshold_ms = props.get_u64(SLOW_THRESHOLD_PROPERTY, DEFAULT_SLOW_THRESHOLD_MS)?;
        self.conn = Some(conn.clone());
        Ok(self)
    }

    fn pre_process(&self, _sql: &str, query: &Query) -> Result<Option<ResultSet>, InterceptorError> {
        let mut in_flight = self.in_flight.lock();
        // A new caller-issued query: anything left over was short-circuited or
        // failed before reaching the post stage.
        if self.depth() <= 1 {
            in_flight.clear();
        }
        in_flight.push((query.id, Instant::now()));
        Ok(None)
    }

    fn post_process(
        &self,
        sql: &str,
        query: &Query,
        result: ResultSet,
        _session: &ServerSession,
    ) -> Result<ResultSet, InterceptorError> {
        let started = {
            let mut in_flight = self.in_flight.lock();
            let mut started = None;
            while let Some((id, at)) = in_flight.pop() {
                if id == query.id {
                    started = Some(at);
                    break;
                }
            }
            started
        };

        if let Some(started) = started {
            self.store.record(&Measurement {
                connection_id: self.conn.as_ref().map(ConnectionHandle::id).unwrap_or_default(),
                query: sql,
                execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                success: result.complete,
                depth: self.depth(),
                slow_threshold_ms: self.slow_threshold_ms,
            });
        }
        Ok(result)
    }

    fn execute_top_level_only(&self) -> bool {
        false
    }

    fn destroy(&self) -> Result<(), InterceptorError> {
        self.in_flight.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(query: &str, ms: f64, success: bool) -> Measurement<'_> {
        Measurement {
            connection_id: ConnectionId::new(),
            query,
            execution_time_ms: ms,
            success,
            depth: 1,
            slow_threshold_ms: 100,
        }
    }

    #[test]
    fn test_record_aggregates() {
        let store = ProfilingStore::default();
        store.record(&measurement("SELECT 1", 10.0, true));
        store.record(&measurement("SELECT 2", 30.0, true));
        store.record(&measurement("DELETE FROM t", 200.0, false));

        let metrics = store.get_metrics();
        assert_eq!(metrics.total_queries, 3);
        assert_eq!(metrics.successful_queries, 2);
        assert_eq!(metrics.failed_queries, 1);
        assert_eq!(metrics.min_execution_time_ms, 10.0);
        assert_eq!(metrics.max_execution_time_ms, 200.0);
        assert_eq!(metrics.avg_execution_time_ms, 80.0);
        assert_eq!(metrics.slow_query_count, 1);
        assert_eq!(metrics.by_operation_type.get("select"), Some(&2));

        let slow = store.get_slow_queries(10, 0);
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].query, "DELETE FROM t");

        store.reset();
        assert_eq!(store.get_metrics().total_queries, 0);
        assert!(store.get_slow_queries(10, 0).is_empty());
    }

    #[test]
    fn test_slow_queries_bounded() {
        let store = ProfilingStore::new(2);
        for sql in ["SELECT 1", "SELECT 2", "SELECT 3"] {
            store.record(&measurement(sql, 500.0, true));
        }
        let slow = store.get_slow_queries(10, 0);
        let queries: Vec<&str> = slow.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, vec!["SELECT 3", "SELECT 2"]);
    }

    #[test]
    fn test_interceptor_times_pre_to_post() {
        let store = Arc::new(ProfilingStore::default());
        let connection_id = ConnectionId::new();
        let interceptor = Box::new(ProfilingInterceptor::new(store.clone()))
            .init(
                &ConnectionHandle::detached(connection_id),
                &Properties::new().with(SLOW_THRESHOLD_PROPERTY, "0"),
                &LogSink::new(connection_id),
            )
            .unwrap();
        assert!(!interceptor.execute_top_level_only());

        let query = Query::new("SELECT 1");
        assert!(interceptor.pre_process(&query.sql, &query).unwrap().is_none());
        interceptor
            .post_process(&query.sql, &query, ResultSet::empty(), &ServerSession::default())
            .unwrap();

        let metrics = store.get_metrics();
        assert_eq!(metrics.total_queries, 1);
        assert_eq!(metrics.slow_query_count, 1);
        assert_eq!(store.get_slow_queries(1, 0)[0].connection_id, connection_id);
    }

    #[test]
    fn test_post_without_pre_records_nothing() {
        let store = Arc::new(ProfilingStore::default());
        let connection_id = ConnectionId::new();
        let interceptor = Box::new(ProfilingInterceptor::new(store.clone()))
            .init(
                &ConnectionHandle::detached(connection_id),
                &Properties::new(),
                &LogSink::new(connection_id),
            )
            .unwrap();

        let query = Query::new("SELECT 1");
        interceptor
            .post_process(&query.sql, &query, ResultSet::empty(), &ServerSession::default())
            .unwrap();
        assert_eq!(store.get_metrics().total_queries, 0);
    }
}
