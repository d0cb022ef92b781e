//! Built-in Interceptors
//!
//! Ready-made plugins registered under fixed identifiers:
//! - **audit**: per-query audit trail for caller-issued queries
//! - **profiling**: execution timings for every query, nested ones included
//! - **safety**: pattern-based rejection of dangerous statements
//! - **server-status-diff**: logs server status counters changed by each query
//!
//! They are ordinary registry entries; the chain treats them like any
//! third-party interceptor.

pub mod audit;
pub mod profiling;
pub mod safety;
pub mod status_diff;
pub mod types;

use std::sync::Arc;

pub use audit::{AuditInterceptor, AuditStore};
pub use profiling::{ProfilingInterceptor, ProfilingStore};
pub use safety::SafetyInterceptor;
pub use status_diff::{ServerStatusDiffInterceptor, StatusChange};
pub use types::{AuditLogEntry, ProfilingMetrics, QueryOperationType, SlowQueryEntry};

use crate::config::Properties;
use crate::interceptor::error::InterceptorError;
use crate::interceptor::registry::InterceptorRegistry;
use crate::interceptor::traits::QueryInterceptor;

pub const AUDIT: &str = "audit";
pub const PROFILING: &str = "profiling";
pub const SAFETY: &str = "safety";
pub const SERVER_STATUS_DIFF: &str = "server-status-diff";

/// Stores shared by every instance of the built-in interceptors
#[derive(Clone, Default)]
pub struct BuiltinStores {
    pub audit: Arc<AuditStore>,
    pub profiling: Arc<ProfilingStore>,
}

impl BuiltinStores {
    /// Stores sized from process-wide properties (`audit.maxEntries`)
    pub fn from_properties(props: &Properties) -> Result<Self, InterceptorError> {
        let max_entries = props.get_usize(audit::MAX_ENTRIES_PROPERTY, audit::DEFAULT_MAX_ENTRIES)?;
        Ok(Self {
            audit: Arc::new(AuditStore::new(max_entries)),
            profiling: Arc::new(ProfilingStore::default()),
        })
    }
}

/// Registers every built-in interceptor
pub fn register_builtins(registry: &mut InterceptorRegistry, stores: &BuiltinStores) {
    let audit = Arc::clone(&stores.audit);
    registry.register(AUDIT, move || -> Box<dyn QueryInterceptor> {
        Box::new(AuditInterceptor::new(Arc::clone(&audit)))
    });

    let profiling = Arc::clone(&stores.profiling);
    registry.register(PROFILING, move || -> Box<dyn QueryInterceptor> {
        Box::new(ProfilingInterceptor::new(Arc::clone(&profiling)))
    });

    registry.register(SAFETY, || -> Box<dyn QueryInterceptor> {
        Box::new(SafetyInterceptor::new())
    });

    registry.register(SERVER_STATUS_DIFF, || -> Box<dyn QueryInterceptor> {
        Box::new(ServerStatusDiffInterceptor::new())
    });
}

/// A registry holding only the built-in interceptors
pub fn builtin_registry(stores: &BuiltinStores) -> InterceptorRegistry {
    let mut registry = InterceptorRegistry::new();
    register_builtins(&mut registry, stores);
    registry
}
