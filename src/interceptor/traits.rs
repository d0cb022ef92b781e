//! QueryInterceptor trait definition
//!
//! The capability every plugin implements. The chain only ever sees
//! `Box<dyn QueryInterceptor>`; concrete types are resolved through the
//! registry by identifier.

use crate::config::Properties;
use crate::engine::connection::ConnectionHandle;
use crate::engine::types::{Query, ResultSet, ServerSession};
use crate::interceptor::error::InterceptorError;
use crate::interceptor::log::LogSink;

/// A pluggable observer/modifier of query execution
///
/// All hooks are called while the owning connection's lock is held, so a
/// given instance is never invoked from two threads at once. Hooks take
/// `&self` because a nested query issued from inside a hook re-enters the
/// chain on the same thread; interceptors that keep state use interior
/// mutability for it.
pub trait QueryInterceptor: Send + Sync {
    /// Called once per connection, right after instantiation
    ///
    /// Returns the instance the chain should use, which may be `self` or a
    /// wrapper around it. An error aborts connection opening; a failed
    /// instance is never destroyed.
    fn init(
        self: Box<Self>,
        conn: &ConnectionHandle,
        props: &Properties,
        log: &LogSink,
    ) -> Result<Box<dyn QueryInterceptor>, InterceptorError>;

    /// Called before the query is sent to the server
    ///
    /// Returning `Some(result)` substitutes `result` for the server's answer;
    /// if any interceptor substitutes, the server is never contacted.
    fn pre_process(&self, _sql: &str, _query: &Query) -> Result<Option<ResultSet>, InterceptorError> {
        Ok(None)
    }

    /// Called after the server answered
    ///
    /// Receives the current result (the server's, or the previous
    /// interceptor's replacement) and returns the one the next interceptor,
    /// and eventually the caller, should see.
    fn post_process(
        &self,
        _sql: &str,
        _query: &Query,
        result: ResultSet,
        _session: &ServerSession,
    ) -> Result<ResultSet, InterceptorError> {
        Ok(result)
    }

    /// Should this interceptor only run for the caller-issued query, and not
    /// for queries issued by interceptors while it is executing?
    ///
    /// Read once, right after `init`. Interceptors returning `false` that
    /// issue queries on their own connection must avoid infinite recursion
    /// themselves.
    fn execute_top_level_only(&self) -> bool;

    /// Called once when the connection closes
    fn destroy(&self) -> Result<(), InterceptorError> {
        Ok(())
    }
}
