//! QueryDispatcher trait definition
//!
//! The boundary between a connection and the wire protocol. A dispatcher
//! sends one query to the server and returns what came back; it knows nothing
//! about interceptors.

use crate::engine::error::DispatchError;
use crate::engine::types::{Dispatched, Query};

/// Sends queries to the server on behalf of a connection
///
/// Each driver (MySQL protocol, Postgres protocol, an in-memory fake for
/// tests) implements this trait. The connection calls it while holding its
/// lock, so a dispatcher is never used by two queries of the same connection
/// at once.
pub trait QueryDispatcher: Send + Sync {
    /// Returns the unique identifier for this driver (e.g., "mysql", "postgres")
    fn driver_id(&self) -> &'static str;

    /// Executes the query on the server
    ///
    /// On cancellation or timeout the dispatcher should hand back whatever
    /// partial result it already decoded through [`DispatchError::Cancelled`]
    /// or [`DispatchError::Timeout`].
    fn dispatch(&self, query: &Query) -> Result<Dispatched, DispatchError>;
}
