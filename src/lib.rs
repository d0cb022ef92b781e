// qore-intercept - Query interceptor chain engine
// Core library

//! Runs a configurable, ordered chain of query interceptors around every
//! query a database connection sends.
//!
//! ```no_run
//! use std::sync::Arc;
//! use qore_intercept::config::ChainConfig;
//! use qore_intercept::engine::{Connection, Dispatched, DispatchError, Query, QueryDispatcher, ResultSet};
//! use qore_intercept::plugins::{builtin_registry, BuiltinStores};
//!
//! struct Wire;
//!
//! impl QueryDispatcher for Wire {
//!     fn driver_id(&self) -> &'static str {
//!         "wire"
//!     }
//!
//!     fn dispatch(&self, _query: &Query) -> Result<Dispatched, DispatchError> {
//!         Ok(ResultSet::empty().into())
//!     }
//! }
//!
//! let stores = BuiltinStores::default();
//! let registry = builtin_registry(&stores);
//! let config = ChainConfig::new(["safety", "audit", "profiling"])
//!     .with_property("safety.rule.no-drop", r"^\s*DROP\s");
//!
//! let conn = Connection::open("primary", Arc::new(Wire), &registry, &config)?;
//! conn.execute("SELECT 1")?;
//! conn.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod engine;
pub mod interceptor;
pub mod observability;
pub mod plugins;

pub use config::{ChainConfig, Properties};
pub use engine::{Connection, ConnectionHandle, QueryDispatcher, SessionManager};
pub use interceptor::{Chain, InterceptorRegistry, LogSink, PreOutcome, QueryInterceptor};
