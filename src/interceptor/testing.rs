//! Shared mock interceptors for the unit tests of this module

use std::sync::Arc;

use parking_lot::Mutex;

use super::error::InterceptorError;
use super::log::LogSink;
use super::pipeline::{Chain, ChainEntry};
use super::registry::InterceptorRegistry;
use super::traits::QueryInterceptor;
use crate::config::Properties;
use crate::engine::connection::ConnectionHandle;
use crate::engine::types::{ConnectionId, Query, ResultSet, ServerSession};

/// Ordered record of hook calls across every mock in a test
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: String) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == event).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Behavior {
    pub top_level_only: bool,
    pub substitute: Option<ResultSet>,
    pub add_affected: Option<u64>,
    pub fail_init: Option<String>,
    pub panic_init: bool,
    pub fail_pre: Option<String>,
    pub fail_post: Option<String>,
    pub fail_destroy: Option<String>,
    pub panic_destroy: bool,
}

impl Behavior {
    pub fn top_level_only() -> Self {
        Self {
            top_level_only: true,
            ..Self::default()
        }
    }

    pub fn substitute(result: ResultSet) -> Self {
        Self {
            substitute: Some(result),
            ..Self::default()
        }
    }

    pub fn add_affected(n: u64) -> Self {
        Self {
            add_affected: Some(n),
            ..Self::default()
        }
    }

    pub fn fail_init(msg: &str) -> Self {
        Self {
            fail_init: Some(msg.to_string()),
            ..Self::default()
        }
    }

    pub fn panic_init() -> Self {
        Self {
            panic_init: true,
            ..Self::default()
        }
    }

    pub fn fail_pre(msg: &str) -> Self {
        Self {
            fail_pre: Some(msg.to_string()),
            ..Self::default()
        }
    }

    pub fn fail_post(msg: &str) -> Self {
        Self {
            fail_post: Some(msg.to_string()),
            ..Self::default()
        }
    }

    pub fn fail_destroy(msg: &str) -> Self {
        Self {
            fail_destroy: Some(msg.to_string()),
            ..Self::default()
        }
    }

    pub fn panic_destroy() -> Self {
        Self {
            panic_destroy: true,
            ..Self::default()
        }
    }
}

/// Interceptor that records every call into an `EventLog`
pub struct Recorder {
    name: String,
    behavior: Behavior,
    log: EventLog,
}

impl Recorder {
    pub fn new(name: &str, behavior: Behavior, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            log,
        }
    }

    fn record(&self, hook: &str) {
        self.log.push(format!("{}.{}", self.name, hook));
    }
}

impl QueryInterceptor for Recorder {
    fn init(
        self: Box<Self>,
        _conn: &ConnectionHandle,
        _props: &Properties,
        _log: &LogSink,
    ) -> Result<Box<dyn QueryInterceptor>, InterceptorError> {
        self.record("init");
        if self.behavior.panic_init {
            panic!("{} blew up in init", self.name);
        }
        if let Some(msg) = &self.behavior.fail_init {
            return Err(InterceptorError::failed(msg.clone()));
        }
        Ok(self)
    }

    fn pre_process(&self, _sql: &str, _query: &Query) -> Result<Option<ResultSet>, InterceptorError> {
        self.record("pre");
        if let Some(msg) = &self.behavior.fail_pre {
            return Err(InterceptorError::failed(msg.clone()));
        }
        Ok(self.behavior.substitute.clone())
    }

    fn post_process(
        &self,
        _sql: &str,
        _query: &Query,
        mut result: ResultSet,
        _session: &ServerSession,
    ) -> Result<ResultSet, InterceptorError> {
        self.record("post");
        if let Some(msg) = &self.behavior.fail_post {
            return Err(InterceptorError::failed(msg.clone()));
        }
        if let Some(n) = self.behavior.add_affected {
            result.affected_rows = Some(result.affected_rows.unwrap_or(0) + n);
        }
        Ok(result)
    }

    fn execute_top_level_only(&self) -> bool {
        self.behavior.top_level_only
    }

    fn destroy(&self) -> Result<(), InterceptorError> {
        self.record("destroy");
        if self.behavior.panic_destroy {
            panic!("{} blew up in destroy", self.name);
        }
        match &self.behavior.fail_destroy {
            Some(msg) => Err(InterceptorError::failed(msg.clone())),
            None => Ok(()),
        }
    }
}

/// Builds chain entries directly, skipping the registry and init
pub fn entries_of(log: &EventLog, behaviors: Vec<(&str, Behavior)>) -> Vec<ChainEntry> {
    behaviors
        .into_iter()
        .enumerate()
        .map(|(position, (name, behavior))| {
            let top_level_only = behavior.top_level_only;
            ChainEntry::new(
                name.to_string(),
                position,
                top_level_only,
                Box::new(Recorder::new(name, behavior, log.clone())),
            )
        })
        .collect()
}

pub fn chain_of(log: &EventLog, behaviors: Vec<(&str, Behavior)>) -> Chain {
    Chain::new(ConnectionId::new(), entries_of(log, behaviors))
}

/// Registry whose factories produce recorders with the given behaviors
pub fn registry_of(log: &EventLog, behaviors: Vec<(&str, Behavior)>) -> InterceptorRegistry {
    let mut registry = InterceptorRegistry::new();
    for (name, behavior) in behaviors {
        let log = log.clone();
        let id = name.to_string();
        registry.register(name, move || -> Box<dyn QueryInterceptor> {
            Box::new(Recorder::new(&id, behavior.clone(), log.clone()))
        });
    }
    registry
}
