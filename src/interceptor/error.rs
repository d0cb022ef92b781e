// SPDX-License-Identifier: Apache-2.0

//! Interceptor error types
//!
//! `InterceptorError` is what plugin code returns. The chain wraps it into
//! `ConstructionError`, `HookError` or `TeardownError` depending on the
//! lifecycle phase, adding the identifier and position of the failing entry.

use std::fmt;

use thiserror::Error;

use crate::engine::error::QueryError;

/// Error returned by an interceptor implementation
#[derive(Debug, Error)]
pub enum InterceptorError {
    #[error("{message}")]
    Failed { message: String },

    #[error("Query rejected by rule '{rule}': {message}")]
    Rejected { rule: String, message: String },

    #[error("Invalid property '{key}': {message}")]
    InvalidProperty { key: String, message: String },

    #[error("Nested query failed: {0}")]
    NestedQuery(#[source] Box<QueryError>),
}

impl InterceptorError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed { message: msg.into() }
    }

    pub fn rejected(rule: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Rejected {
            rule: rule.into(),
            message: msg.into(),
        }
    }

    pub fn invalid_property(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidProperty {
            key: key.into(),
            message: msg.into(),
        }
    }
}

impl From<QueryError> for InterceptorError {
    fn from(err: QueryError) -> Self {
        Self::NestedQuery(Box::new(err))
    }
}

/// Hook stage during which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pre,
    Post,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pre => write!(f, "pre"),
            Stage::Post => write!(f, "post"),
        }
    }
}

/// Chain construction failed; the connection must not open
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("Unknown interceptor '{id}' at position {position}")]
    UnknownInterceptor { id: String, position: usize },

    #[error("Interceptor '{id}' at position {position} failed to initialize: {source}")]
    InitFailed {
        id: String,
        position: usize,
        #[source]
        source: InterceptorError,
    },
}

impl ConstructionError {
    /// Identifier of the entry that stopped construction
    pub fn interceptor(&self) -> &str {
        match self {
            Self::UnknownInterceptor { id, .. } | Self::InitFailed { id, .. } => id,
        }
    }
}

/// A pre or post hook failed; the rest of that stage was skipped
#[derive(Debug, Error)]
#[error("Interceptor '{interceptor}' failed in {stage} stage: {source}")]
pub struct HookError {
    pub stage: Stage,
    pub interceptor: String,
    pub position: usize,
    #[source]
    pub source: InterceptorError,
}

/// One destroy call that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{interceptor}' at position {position}: {message}")]
pub struct DestroyFailure {
    pub interceptor: String,
    pub position: usize,
    pub message: String,
}

/// Aggregate of every destroy failure seen during one teardown sweep
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} interceptor(s) failed during teardown: {}", .failures.len(), join_failures(.failures))]
pub struct TeardownError {
    pub failures: Vec<DestroyFailure>,
}

fn join_failures(failures: &[DestroyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
