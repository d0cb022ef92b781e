#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use qore_intercept::config::Properties;
use qore_intercept::engine::{
    Column, ConnectionHandle, DispatchError, Dispatched, Query, QueryDispatcher, ResultSet,
};
use qore_intercept::interceptor::{InterceptorError, InterceptorRegistry, LogSink, QueryInterceptor};

/// Ordered record of hook calls, shared by every probe in a test
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// What a probe does besides recording its calls
#[derive(Debug, Clone, Default)]
pub struct ProbeBehavior {
    pub top_level_only: bool,
    /// Query issued on the probe's own connection from inside its pre hook
    pub nested_sql: Option<String>,
    /// Keep issuing `nested_sql` from pre until this depth is reached
    pub recurse_until_depth: Option<usize>,
    pub substitute: Option<ResultSet>,
    pub fail_init: bool,
    pub fail_destroy: bool,
}

impl ProbeBehavior {
    pub fn top_level_only() -> Self {
        Self {
            top_level_only: true,
            ..Self::default()
        }
    }
}

/// Interceptor recording `name.hook@depth` for every call
pub struct Probe {
    name: String,
    behavior: ProbeBehavior,
    log: EventLog,
    conn: Option<ConnectionHandle>,
}

impl Probe {
    fn depth(&self) -> usize {
        self.conn.as_ref().map_or(0, ConnectionHandle::nesting_depth)
    }

    fn record(&self, hook: &str) {
        self.log.push(format!("{}.{}@{}", self.name, hook, self.depth()));
    }
}

impl QueryInterceptor for Probe {
    fn init(
        mut self: Box<Self>,
        conn: &ConnectionHandle,
        _props: &Properties,
        _log: &LogSink,
    ) -> Result<Box<dyn QueryInterceptor>, InterceptorError> {
        self.log.push(format!("{}.init", self.name));
        if self.behavior.fail_init {
            return Err(InterceptorError::failed(format!("{} refused to start", self.name)));
        }
        self.conn = Some(conn.clone());
        Ok(self)
    }

    fn pre_process(&self, _sql: &str, _query: &Query) -> Result<Option<ResultSet>, InterceptorError> {
        self.record("pre");
        if let (Some(sql), Some(conn)) = (&self.behavior.nested_sql, &self.conn) {
            let limit = self.behavior.recurse_until_depth.unwrap_or(0);
            if self.behavior.top_level_only || self.depth() < limit {
                conn.execute(sql.as_str())?;
            }
        }
        Ok(self.behavior.substitute.clone())
    }

    fn post_process(
        &self,
        _sql: &str,
        _query: &Query,
        result: ResultSet,
        _session: &qore_intercept::engine::ServerSession,
    ) -> Result<ResultSet, InterceptorError> {
        self.record("post");
        Ok(result)
    }

    fn execute_top_level_only(&self) -> bool {
        self.behavior.top_level_only
    }

    fn destroy(&self) -> Result<(), InterceptorError> {
        self.log.push(format!("{}.destroy", self.name));
        if self.behavior.fail_destroy {
            return Err(InterceptorError::failed("resource still busy"));
        }
        Ok(())
    }
}

pub fn registry(log: &EventLog, probes: Vec<(&str, ProbeBehavior)>) -> InterceptorRegistry {
    let mut registry = InterceptorRegistry::new();
    for (name, behavior) in probes {
        let log = log.clone();
        let id = name.to_string();
        registry.register(name, move || -> Box<dyn QueryInterceptor> {
            Box::new(Probe {
                name: id.clone(),
                behavior: behavior.clone(),
                log: log.clone(),
                conn: None,
            })
        });
    }
    registry
}

/// Dispatcher answering every query with one row holding the SQL text
#[derive(Debug, Default)]
pub struct EchoDispatcher {
    sent: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl EchoDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl QueryDispatcher for EchoDispatcher {
    fn driver_id(&self) -> &'static str {
        "echo"
    }

    fn dispatch(&self, query: &Query) -> Result<Dispatched, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(query.sql.clone());
        Ok(ResultSet::new(
            vec![Column::new("sql", "text")],
            vec![vec![serde_json::Value::from(query.sql.clone())]],
        )
        .into())
    }
}
