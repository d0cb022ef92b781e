//! Query Interceptor Chain
//!
//! The engine that runs a connection's configured interceptors around every
//! query it sends:
//! - **Registry**: resolves identifiers to factories and builds the chain
//! - **Guard**: nesting depth and the top-level-only rule
//! - **Pipeline**: the pre/post walks, substitution and result threading
//! - **Lifecycle**: destroy on close, reverse unwind on failed construction
//!
//! The engine never knows what an interceptor does; it only decides when,
//! how often and in which order interceptors run.

pub mod error;
pub mod guard;
mod lifecycle;
pub mod log;
pub mod pipeline;
pub mod registry;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{
    ConstructionError, DestroyFailure, HookError, InterceptorError, Stage, TeardownError,
};
pub use guard::{should_run, DepthGuard, NestingDepth};
pub use log::LogSink;
pub use pipeline::{Chain, ChainEntry, Invocation, PreOutcome};
pub use registry::{InterceptorFactory, InterceptorRegistry};
pub use traits::QueryInterceptor;
