//! Log handle given to interceptors at init

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::engine::types::ConnectionId;

/// Emits `tracing` events tagged with the owning connection and interceptor
#[derive(Debug, Clone)]
pub struct LogSink {
    connection_id: ConnectionId,
    interceptor: Option<Arc<str>>,
}

impl LogSink {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            interceptor: None,
        }
    }

    /// Same connection, events additionally tagged with `interceptor_id`
    pub fn for_interceptor(&self, interceptor_id: &str) -> Self {
        Self {
            connection_id: self.connection_id,
            interceptor: Some(Arc::from(interceptor_id)),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn interceptor(&self) -> Option<&str> {
        self.interceptor.as_deref()
    }

    pub fn debug(&self, message: impl fmt::Display) {
        debug!(
            connection_id = %self.connection_id,
            interceptor = self.interceptor().unwrap_or("-"),
            "{}",
            message
        );
    }

    pub fn info(&self, message: impl fmt::Display) {
        info!(
            connection_id = %self.connection_id,
            interceptor = self.interceptor().unwrap_or("-"),
            "{}",
            message
        );
    }

    pub fn warn(&self, message: impl fmt::Display) {
        warn!(
            connection_id = %self.connection_id,
            interceptor = self.interceptor().unwrap_or("-"),
            "{}",
            message
        );
    }

    pub fn error(&self, message: impl fmt::Display) {
        error!(
            connection_id = %self.connection_id,
            interceptor = self.interceptor().unwrap_or("-"),
            "{}",
            message
        );
    }
}
