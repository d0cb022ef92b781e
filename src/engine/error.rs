// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the connection layer
//!
//! Dispatcher failures, query failures and connection lifecycle failures are
//! mapped to these types so callers get one error shape per operation.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::types::{ConnectionId, ResultSet};
use crate::interceptor::error::{ConstructionError, HookError, TeardownError};

/// Failure reported by a [`QueryDispatcher`](crate::engine::QueryDispatcher)
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("Connection lost: {message}")]
    ConnectionLost { message: String },

    #[error("Query execution error: {message}")]
    ExecutionError { message: String },

    #[error("Operation cancelled")]
    Cancelled { partial: Option<ResultSet> },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        timeout_ms: u64,
        partial: Option<ResultSet>,
    },
}

impl DispatchError {
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::ConnectionLost { message: msg.into() }
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::ExecutionError { message: msg.into() }
    }

    pub fn cancelled(partial: Option<ResultSet>) -> Self {
        Self::Cancelled { partial }
    }

    pub fn timeout(timeout_ms: u64, partial: Option<ResultSet>) -> Self {
        Self::Timeout {
            timeout_ms,
            partial,
        }
    }

    /// Removes whatever the server produced before the dispatch was interrupted
    pub fn take_partial(&mut self) -> Option<ResultSet> {
        match self {
            Self::Cancelled { partial } | Self::Timeout { partial, .. } => partial.take(),
            _ => None,
        }
    }
}

/// Failure of a single query on an open connection
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Connection {connection_id} is closed")]
    Closed { connection_id: ConnectionId },
}

impl QueryError {
    pub fn closed(connection_id: ConnectionId) -> Self {
        Self::Closed { connection_id }
    }
}

/// Failure of a connection lifecycle operation
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Teardown(#[from] TeardownError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Connection not found or closed: {connection_id}")]
    NotFound { connection_id: ConnectionId },
}

impl ConnectionError {
    pub fn not_found(connection_id: ConnectionId) -> Self {
        Self::NotFound { connection_id }
    }
}

/// Result type alias for query execution
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type alias for connection lifecycle operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;
