//! Interceptor Registry
//!
//! Central registry of interceptor factories, keyed by the identifier users
//! put in their configuration. Building a chain resolves each identifier here,
//! instantiates it and runs its `init`, in configuration order.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{info, warn};

use super::error::{ConstructionError, InterceptorError};
use super::lifecycle;
use super::log::LogSink;
use super::pipeline::{Chain, ChainEntry};
use super::traits::QueryInterceptor;
use crate::config::Properties;
use crate::engine::connection::ConnectionHandle;

/// Produces a fresh, uninitialized interceptor instance
pub type InterceptorFactory = Arc<dyn Fn() -> Box<dyn QueryInterceptor> + Send + Sync>;

/// Registry that maps identifiers to interceptor factories
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    factories: HashMap<String, InterceptorFactory>,
}

impl InterceptorRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers a factory under `id`
    ///
    /// Returns the factory previously registered under the same id, if any.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F) -> Option<InterceptorFactory>
    where
        F: Fn() -> Box<dyn QueryInterceptor> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Lists all registered identifiers, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of registered factories
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Builds the chain for one connection
    ///
    /// Every identifier gets its own instance, in list order, duplicates
    /// included. If an identifier is unknown or an `init` fails or panics, the
    /// instances built so far are destroyed in reverse order and the error
    /// is returned; the failing instance itself is never destroyed.
    pub fn build(
        &self,
        ids: &[String],
        conn: &ConnectionHandle,
        props: &Properties,
        log: &LogSink,
    ) -> Result<Chain, ConstructionError> {
        let connection_id = conn.id();
        let mut entries: Vec<ChainEntry> = Vec::with_capacity(ids.len());

        for (position, id) in ids.iter().enumerate() {
            let Some(factory) = self.factories.get(id) else {
                warn!(connection_id = %connection_id, interceptor = %id, position, "Unknown interceptor");
                lifecycle::unwind(connection_id, entries);
                return Err(ConstructionError::UnknownInterceptor {
                    id: id.clone(),
                    position,
                });
            };

            let sink = log.for_interceptor(id);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| factory().init(conn, props, &sink)))
                .unwrap_or_else(|payload| {
                    Err(InterceptorError::failed(lifecycle::panic_message(payload.as_ref())))
                });

            match outcome {
                Ok(instance) => {
                    let top_level_only = instance.execute_top_level_only();
                    entries.push(ChainEntry::new(id.clone(), position, top_level_only, instance));
                }
                Err(source) => {
                    warn!(
                        connection_id = %connection_id,
                        interceptor = %id,
                        position,
                        error = %source,
                        "Interceptor init failed; releasing partial chain"
                    );
                    lifecycle::unwind(connection_id, entries);
                    return Err(ConstructionError::InitFailed {
                        id: id.clone(),
                        position,
                        source,
                    });
                }
            }
        }

        info!(
            connection_id = %connection_id,
            interceptors = entries.len(),
            "Interceptor chain built"
        );
        Ok(Chain::new(connection_id, entries))
    }
}

impl fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorRegistry")
            .field("ids", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::ConnectionId;
    use crate::interceptor::error::InterceptorError;
    use crate::interceptor::testing::{registry_of, Behavior, EventLog};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn build(
        registry: &InterceptorRegistry,
        list: &[&str],
    ) -> Result<Chain, ConstructionError> {
        let connection_id = ConnectionId::new();
        registry.build(
            &ids(list),
            &ConnectionHandle::detached(connection_id),
            &Properties::new(),
            &LogSink::new(connection_id),
        )
    }

    #[test]
    fn test_registry_basics() {
        let log = EventLog::new();
        let registry = registry_of(
            &log,
            vec![("b", Behavior::default()), ("a", Behavior::default())],
        );
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_empty());
        assert!(registry.contains("a"));
        assert!(!registry.contains("nonexistent"));
        assert_eq!(registry.list(), vec!["a", "b"]);
        assert!(InterceptorRegistry::new().is_empty());
    }

    #[test]
    fn test_build_preserves_order_and_duplicates() {
        let log = EventLog::new();
        let registry = registry_of(
            &log,
            vec![
                ("a", Behavior::default()),
                ("b", Behavior::top_level_only()),
                ("c", Behavior::default()),
            ],
        );

        let chain = build(&registry, &["c", "a", "b", "a"]).unwrap();
        assert_eq!(chain.ids(), vec!["c", "a", "b", "a"]);
        let positions: Vec<usize> = chain.entries().iter().map(|e| e.position()).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
        assert!(chain.entries()[2].is_top_level_only());
        assert!(!chain.entries()[0].is_top_level_only());
        assert_eq!(log.events(), vec!["c.init", "a.init", "b.init", "a.init"]);
    }

    #[test]
    fn test_init_failure_destroys_partial_chain_in_reverse() {
        let log = EventLog::new();
        let registry = registry_of(
            &log,
            vec![
                ("a", Behavior::default()),
                ("b", Behavior::default()),
                ("c", Behavior::fail_init("bad property")),
                ("d", Behavior::default()),
            ],
        );

        let err = build(&registry, &["a", "b", "c", "d"]).unwrap_err();
        match &err {
            ConstructionError::InitFailed { id, position, source } => {
                assert_eq!(id, "c");
                assert_eq!(*position, 2);
                assert!(matches!(source, InterceptorError::Failed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            log.events(),
            vec!["a.init", "b.init", "c.init", "b.destroy", "a.destroy"]
        );
        assert_eq!(log.count("c.destroy"), 0);
        assert_eq!(log.count("d.init"), 0);
    }

    #[test]
    fn test_init_panic_destroys_partial_chain() {
        let log = EventLog::new();
        let registry = registry_of(
            &log,
            vec![("a", Behavior::default()), ("b", Behavior::panic_init())],
        );

        let err = build(&registry, &["a", "b"]).unwrap_err();
        match &err {
            ConstructionError::InitFailed { id, position, source } => {
                assert_eq!(id, "b");
                assert_eq!(*position, 1);
                assert!(source.to_string().contains("PANIC: b blew up in init"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(log.events(), vec!["a.init", "b.init", "a.destroy"]);
    }

    #[test]
    fn test_unknown_identifier_releases_partial_chain() {
        let log = EventLog::new();
        let registry = registry_of(&log, vec![("a", Behavior::default())]);

        let err = build(&registry, &["a", "missing"]).unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::UnknownInterceptor { ref id, position: 1 } if id == "missing"
        ));
        assert_eq!(err.interceptor(), "missing");
        assert_eq!(log.events(), vec!["a.init", "a.destroy"]);
    }

    #[test]
    fn test_empty_list_builds_empty_chain() {
        let registry = InterceptorRegistry::new();
        let chain = build(&registry, &[]).unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
    }

    #[test]
    fn test_register_replaces_previous() {
        let log = EventLog::new();
        let mut registry = registry_of(&log, vec![("a", Behavior::default())]);
        let previous = registry.register("a", || -> Box<dyn QueryInterceptor> {
            Box::new(crate::interceptor::testing::Recorder::new(
                "a2",
                Behavior::default(),
                EventLog::new(),
            ))
        });
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
    }
}
