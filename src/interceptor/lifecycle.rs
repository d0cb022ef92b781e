//! Lifecycle Manager
//!
//! Destroys interceptors: the full chain in chain order at connection close,
//! or a partially built chain in reverse order when opening fails.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use super::error::{DestroyFailure, TeardownError};
use super::pipeline::ChainEntry;
use crate::engine::types::ConnectionId;

/// Calls `destroy` on every entry in chain order
///
/// A failing or panicking destroy is recorded and the sweep moves on; all
/// failures are reported together once every entry had its attempt.
pub(crate) fn teardown(
    connection_id: ConnectionId,
    entries: &[ChainEntry],
) -> Result<(), TeardownError> {
    let failures: Vec<DestroyFailure> = entries
        .iter()
        .filter_map(|entry| destroy_entry(connection_id, entry))
        .collect();

    info!(
        connection_id = %connection_id,
        destroyed = entries.len() - failures.len(),
        failed = failures.len(),
        "Interceptor chain torn down"
    );

    if failures.is_empty() {
        Ok(())
    } else {
        Err(TeardownError { failures })
    }
}

/// Releases a partially built chain after a failed construction
///
/// Runs in reverse order of construction. Failures are only logged: the
/// construction error is what the caller needs to see.
pub(crate) fn unwind(connection_id: ConnectionId, entries: Vec<ChainEntry>) {
    for entry in entries.iter().rev() {
        if let Some(failure) = destroy_entry(connection_id, entry) {
            warn!(
                connection_id = %connection_id,
                interceptor = %failure.interceptor,
                error = %failure.message,
                "Failed to release interceptor after aborted chain construction"
            );
        }
    }
}

fn destroy_entry(connection_id: ConnectionId, entry: &ChainEntry) -> Option<DestroyFailure> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.instance().destroy()));

    let message = match outcome {
        Ok(Ok(())) => {
            debug!(connection_id = %connection_id, interceptor = entry.id(), "Interceptor destroyed");
            return None;
        }
        Ok(Err(err)) => err.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    warn!(
        connection_id = %connection_id,
        interceptor = entry.id(),
        position = entry.position(),
        error = %message,
        "Interceptor destroy failed"
    );

    Some(DestroyFailure {
        interceptor: entry.id().to_string(),
        position: entry.position(),
        message,
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("PANIC: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("PANIC: {}", s)
    } else {
        "PANIC: unknown cause".to_string()
    }
}
