// SPDX-License-Identifier: Apache-2.0

//! Connection
//!
//! Ties an interceptor chain to one server connection. Opening builds the
//! chain, closing tears it down, and every query runs through the chain while
//! the connection lock is held.
//!
//! The lock is re-entrant: an interceptor that issues a query on its own
//! connection from inside a hook does so on the thread that already holds it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::ReentrantMutex;
use tracing::{debug, info, instrument, warn};

use crate::config::ChainConfig;
use crate::engine::error::{QueryError, QueryResult};
use crate::engine::traits::QueryDispatcher;
use crate::engine::types::{ConnectionId, Dispatched, Query, ResultSet, ServerSession};
use crate::interceptor::error::{ConstructionError, TeardownError};
use crate::interceptor::log::LogSink;
use crate::interceptor::pipeline::{Chain, PreOutcome};
use crate::interceptor::registry::InterceptorRegistry;

/// An open connection with its interceptor chain
pub struct Connection {
    id: ConnectionId,
    name: String,
    dispatcher: Arc<dyn QueryDispatcher>,
    lock: ReentrantMutex<()>,
    chain: OnceLock<Chain>,
    closed: AtomicBool,
}

impl Connection {
    /// Opens a connection and builds its chain from `config`
    ///
    /// Fails, without leaving anything initialized behind, if any
    /// interceptor cannot be resolved or initialized.
    #[instrument(skip_all, fields(name = %name.as_ref(), driver = dispatcher.driver_id()))]
    pub fn open(
        name: impl AsRef<str>,
        dispatcher: Arc<dyn QueryDispatcher>,
        registry: &InterceptorRegistry,
        config: &ChainConfig,
    ) -> Result<Arc<Self>, ConstructionError> {
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            name: name.as_ref().to_string(),
            dispatcher,
            lock: ReentrantMutex::new(()),
            chain: OnceLock::new(),
            closed: AtomicBool::new(false),
        });

        let handle = connection.handle();
        let log = LogSink::new(connection.id);
        let chain = registry.build(&config.interceptors, &handle, &config.properties, &log)?;
        // The cell was created empty above and nothing else can reach it yet.
        let _ = connection.chain.set(chain);

        info!(connection_id = %connection.id, "Connection opened");
        Ok(connection)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver_id(&self) -> &'static str {
        self.dispatcher.driver_id()
    }

    /// Handle for interceptors; does not keep the connection alive
    pub fn handle(self: &Arc<Self>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            inner: Arc::downgrade(self),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queries currently in flight (0 when idle)
    pub fn nesting_depth(&self) -> usize {
        self.chain.get().map_or(0, Chain::nesting_depth)
    }

    /// Configured interceptor identifiers, in chain order
    pub fn interceptor_ids(&self) -> Vec<String> {
        self.chain
            .get()
            .map(|chain| chain.ids().into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn execute(&self, sql: impl Into<String>) -> QueryResult<ResultSet> {
        self.execute_query(Query::new(sql))
    }

    /// Runs `query` through the chain and, unless an interceptor substituted
    /// a result, through the dispatcher
    ///
    /// If dispatch fails, the post stage still runs over the partial (or an
    /// empty, incomplete) result; its output and any hook error it raises are
    /// discarded and the dispatch error is returned.
    #[instrument(skip_all, fields(connection_id = %self.id, query_id = %query.id))]
    pub fn execute_query(&self, query: Query) -> QueryResult<ResultSet> {
        let _guard = self.lock.lock();
        if self.is_closed() {
            return Err(QueryError::closed(self.id));
        }
        let chain = self.chain.get().ok_or_else(|| QueryError::closed(self.id))?;

        let invocation = chain.enter(&query);
        if let PreOutcome::Substitute(result) = invocation.pre()? {
            debug!(depth = invocation.depth(), "Query short-circuited by interceptor");
            return Ok(result);
        }
        // A hook may have closed its own connection during the pre stage.
        if self.is_closed() {
            return Err(QueryError::closed(self.id));
        }

        match self.dispatcher.dispatch(&query) {
            Ok(Dispatched { result, session }) => Ok(invocation.post(result, &session)?),
            Err(mut err) => {
                let partial = err.take_partial().unwrap_or_else(ResultSet::interrupted);
                if let Err(hook_err) = invocation.post(partial, &ServerSession::default()) {
                    warn!(
                        error = %hook_err,
                        dispatch_error = %err,
                        "Post-stage hook failed after dispatch error"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Closes the connection and destroys its interceptors
    ///
    /// The connection is closed even if some interceptors fail to destroy;
    /// those failures are returned together. Closing twice is a no-op.
    #[instrument(skip_all, fields(connection_id = %self.id))]
    pub fn close(&self) -> Result<(), TeardownError> {
        let _guard = self.lock.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let result = self.chain.get().map_or(Ok(()), Chain::close);
        info!(teardown_failures = result.as_ref().err().map_or(0, |e| e.failures.len()), "Connection closed");
        result
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("driver", &self.dispatcher.driver_id())
            .field("chain", &self.chain.get())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// What an interceptor gets to talk to its own connection
///
/// Holds a weak reference: interceptors owned by the chain must not keep
/// the connection alive. Queries through a handle whose connection is gone
/// or closed fail with [`QueryError::Closed`].
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    inner: Weak<Connection>,
}

impl ConnectionHandle {
    /// A handle not bound to any live connection
    pub fn detached(id: ConnectionId) -> Self {
        Self {
            id,
            inner: Weak::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Issues a query on the owning connection, through its chain
    pub fn execute(&self, sql: impl Into<String>) -> QueryResult<ResultSet> {
        self.upgrade()?.execute(sql)
    }

    pub fn execute_query(&self, query: Query) -> QueryResult<ResultSet> {
        self.upgrade()?.execute_query(query)
    }

    pub fn nesting_depth(&self) -> usize {
        self.inner.upgrade().map_or(0, |conn| conn.nesting_depth())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.upgrade().map_or(true, |conn| conn.is_closed())
    }

    /// Closes the owning connection; a no-op once it is gone
    pub fn close(&self) -> Result<(), TeardownError> {
        self.inner.upgrade().map_or(Ok(()), |conn| conn.close())
    }

    fn upgrade(&self) -> QueryResult<Arc<Connection>> {
        self.inner.upgrade().ok_or_else(|| QueryError::closed(self.id))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}
