//! Recursion Guard
//!
//! Tracks how deeply query execution is nested on a connection and decides
//! which interceptors take part in a given invocation.
//!
//! Depth 1 is a query issued by the application. Anything deeper was issued
//! by an interceptor while the outer query was still in flight; top-level-only
//! interceptors sit those out, which is what keeps an interceptor that queries
//! its own connection from recursing forever.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Whether an interceptor participates at the given nesting depth
pub fn should_run(top_level_only: bool, depth: usize) -> bool {
    !top_level_only || depth == 1
}

/// Per-connection nesting counter
#[derive(Debug, Default)]
pub struct NestingDepth(AtomicUsize);

impl NestingDepth {
    pub fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub fn current(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Marks the start of a query; the returned guard marks its end on drop
    pub fn enter(&self) -> DepthGuard<'_> {
        let level = self.0.fetch_add(1, Ordering::AcqRel) + 1;
        DepthGuard { depth: self, level }
    }
}

/// Restores the nesting depth when dropped, on every exit path
#[derive(Debug)]
pub struct DepthGuard<'a> {
    depth: &'a NestingDepth,
    level: usize,
}

impl DepthGuard<'_> {
    /// Depth of the query this guard belongs to
    pub fn level(&self) -> usize {
        self.level
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.0.fetch_sub(1, Ordering::AcqRel);
    }
}
