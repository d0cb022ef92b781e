// SPDX-License-Identifier: Apache-2.0

//! Interceptor Pipeline
//!
//! Orchestrates one query through the chain:
//! 1. `Chain::enter`: bumps the nesting depth for the whole round trip
//! 2. `Invocation::pre`: every eligible pre hook, last substitute wins
//! 3. `Invocation::post`: every eligible post hook, threading the result
//! 4. drop of the `Invocation`: depth restored, whatever happened
//!
//! The pipeline takes no locks. Callers must hold the connection lock for
//! the lifetime of an `Invocation`; nested queries issued by hooks on the
//! same thread re-enter through the same lock.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use super::error::{HookError, InterceptorError, Stage, TeardownError};
use super::guard::{should_run, DepthGuard, NestingDepth};
use super::lifecycle;
use super::traits::QueryInterceptor;
use crate::engine::types::{ConnectionId, Query, ResultSet, ServerSession};

/// One configured interceptor, fixed once the chain is built
pub struct ChainEntry {
    id: String,
    position: usize,
    top_level_only: bool,
    instance: Box<dyn QueryInterceptor>,
}

impl ChainEntry {
    pub(crate) fn new(
        id: String,
        position: usize,
        top_level_only: bool,
        instance: Box<dyn QueryInterceptor>,
    ) -> Self {
        Self {
            id,
            position,
            top_level_only,
            instance,
        }
    }

    /// Identifier the entry was configured with
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ordinal in configuration order
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_top_level_only(&self) -> bool {
        self.top_level_only
    }

    pub(crate) fn instance(&self) -> &dyn QueryInterceptor {
        self.instance.as_ref()
    }

    fn hook_error(&self, stage: Stage, source: InterceptorError) -> HookError {
        HookError {
            stage,
            interceptor: self.id.clone(),
            position: self.position,
            source,
        }
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("top_level_only", &self.top_level_only)
            .finish_non_exhaustive()
    }
}

/// The ordered interceptors of one connection
pub struct Chain {
    connection_id: ConnectionId,
    entries: Vec<ChainEntry>,
    depth: NestingDepth,
    closed: AtomicBool,
}

impl Chain {
    pub(crate) fn new(connection_id: ConnectionId, entries: Vec<ChainEntry>) -> Self {
        Self {
            connection_id,
            entries,
            depth: NestingDepth::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    /// Identifiers in chain order
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(ChainEntry::id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queries currently in flight on this chain
    pub fn nesting_depth(&self) -> usize {
        self.depth.current()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Starts the pre/post pair for `query`
    ///
    /// The nesting depth stays raised until the returned `Invocation` is
    /// dropped, so it must be kept alive across dispatch and the post stage.
    pub fn enter<'a>(&'a self, query: &'a Query) -> Invocation<'a> {
        let depth = self.depth.enter();
        Invocation {
            chain: self,
            query,
            depth,
        }
    }

    /// Destroys every interceptor in chain order
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub fn close(&self) -> Result<(), TeardownError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        lifecycle::teardown(self.connection_id, &self.entries)
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = lifecycle::teardown(self.connection_id, &self.entries) {
            warn!(
                connection_id = %self.connection_id,
                error = %err,
                "Interceptor chain dropped without close; teardown reported failures"
            );
        }
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("connection_id", &self.connection_id)
            .field("entries", &self.entries)
            .field("depth", &self.depth.current())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Outcome of the pre stage
#[derive(Debug, Clone, PartialEq)]
pub enum PreOutcome {
    /// No interceptor substituted; dispatch the query
    Proceed,
    /// Return this result to the caller and skip the server
    Substitute(ResultSet),
}

impl PreOutcome {
    pub fn is_overridden(&self) -> bool {
        matches!(self, Self::Substitute(_))
    }

    pub fn into_substitute(self) -> Option<ResultSet> {
        match self {
            Self::Proceed => None,
            Self::Substitute(result) => Some(result),
        }
    }
}

/// A query in flight through the chain
#[derive(Debug)]
pub struct Invocation<'a> {
    chain: &'a Chain,
    query: &'a Query,
    depth: DepthGuard<'a>,
}

impl<'a> Invocation<'a> {
    pub fn query(&self) -> &Query {
        self.query
    }

    /// Nesting depth of this query (1 for caller-issued queries)
    pub fn depth(&self) -> usize {
        self.depth.level()
    }

    pub fn is_top_level(&self) -> bool {
        self.depth() == 1
    }

    /// Runs every eligible pre hook in chain order
    ///
    /// A substitute does not stop the walk; the last one produced is kept.
    pub fn pre(&self) -> Result<PreOutcome, HookError> {
        let mut substitute = None;

        for entry in self.eligible() {
            debug!(
                interceptor = entry.id(),
                depth = self.depth(),
                query_id = %self.query.id,
                "pre_process"
            );
            match entry.instance().pre_process(&self.query.sql, self.query) {
                Ok(Some(result)) => substitute = Some(result),
                Ok(None) => {}
                Err(source) => return Err(entry.hook_error(Stage::Pre, source)),
            }
        }

        Ok(match substitute {
            Some(result) => PreOutcome::Substitute(result),
            None => PreOutcome::Proceed,
        })
    }

    /// Runs every eligible post hook in chain order, each one receiving the
    /// result returned by the previous
    pub fn post(&self, raw: ResultSet, session: &ServerSession) -> Result<ResultSet, HookError> {
        let mut current = raw;

        for entry in self.eligible() {
            debug!(
                interceptor = entry.id(),
                depth = self.depth(),
                query_id = %self.query.id,
                "post_process"
            );
            current = entry
                .instance()
                .post_process(&self.query.sql, self.query, current, session)
                .map_err(|source| entry.hook_error(Stage::Post, source))?;
        }

        Ok(current)
    }

    // A chain closed mid-query (e.g. a hook closed its own connection) has
    // destroyed its interceptors; they must not be called again.
    fn eligible(&self) -> impl Iterator<Item = &'a ChainEntry> + '_ {
        let depth = self.depth();
        let chain = self.chain;
        chain
            .entries
            .iter()
            .take_while(move |_| !chain.is_closed())
            .filter(move |entry| should_run(entry.top_level_only, depth))
    }
}
