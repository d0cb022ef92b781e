//! Session Manager
//!
//! Owns every open connection of a client. Each connection has its own
//! chain, nesting counter and lock; the manager only tracks them by id and
//! never holds its own map lock while a query runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{instrument, warn};

use crate::config::ChainConfig;
use crate::engine::connection::Connection;
use crate::engine::error::{ConnectionError, ConnectionResult};
use crate::engine::traits::QueryDispatcher;
use crate::engine::types::{ConnectionConfig, ConnectionId, ResultSet};
use crate::interceptor::error::TeardownError;
use crate::interceptor::registry::InterceptorRegistry;

/// Manages all open connections
pub struct SessionManager {
    registry: Arc<InterceptorRegistry>,
    sessions: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl SessionManager {
    pub fn new(registry: Arc<InterceptorRegistry>) -> Self {
        Self {
            registry,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &InterceptorRegistry {
        &self.registry
    }

    /// Opens a connection and returns its id
    #[instrument(skip(self, config, dispatcher), fields(name = %config.name, interceptors = config.chain.interceptors.len()))]
    pub fn open(
        &self,
        config: &ConnectionConfig,
        dispatcher: Arc<dyn QueryDispatcher>,
    ) -> ConnectionResult<ConnectionId> {
        let connection = Connection::open(&config.name, dispatcher, &self.registry, &config.chain)?;
        let id = connection.id();
        self.sessions.write().insert(id, connection);
        Ok(id)
    }

    /// Opens a connection whose chain is read from a JSON config file
    ///
    /// A missing file opens the connection with an empty chain.
    pub fn open_from_file(
        &self,
        name: &str,
        path: &Path,
        dispatcher: Arc<dyn QueryDispatcher>,
    ) -> ConnectionResult<ConnectionId> {
        let chain = ChainConfig::load(path)?;
        self.open(&ConnectionConfig::new(name, chain), dispatcher)
    }

    /// Gets an open connection
    pub fn get(&self, id: ConnectionId) -> ConnectionResult<Arc<Connection>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| ConnectionError::not_found(id))
    }

    /// Runs a query on an open connection
    pub fn execute(&self, id: ConnectionId, sql: &str) -> ConnectionResult<ResultSet> {
        let connection = self.get(id)?;
        Ok(connection.execute(sql)?)
    }

    /// Closes a connection
    ///
    /// The connection is removed first, so it is gone even if some of its
    /// interceptors fail to destroy.
    #[instrument(skip(self), fields(connection_id = %id))]
    pub fn close(&self, id: ConnectionId) -> ConnectionResult<()> {
        let connection = self
            .sessions
            .write()
            .remove(&id)
            .ok_or_else(|| ConnectionError::not_found(id))?;

        connection.close()?;
        Ok(())
    }

    /// Closes every connection, returning the teardown failures per connection
    pub fn close_all(&self) -> Vec<(ConnectionId, TeardownError)> {
        let connections: Vec<Arc<Connection>> =
            self.sessions.write().drain().map(|(_, conn)| conn).collect();

        connections
            .into_iter()
            .filter_map(|conn| match conn.close() {
                Ok(()) => None,
                Err(err) => {
                    warn!(connection_id = %conn.id(), error = %err, "Teardown failures on close");
                    Some((conn.id(), err))
                }
            })
            .collect()
    }

    /// Lists open connections as (id, display name)
    pub fn list(&self) -> Vec<(ConnectionId, String)> {
        self.sessions
            .read()
            .iter()
            .map(|(id, conn)| (*id, conn.name().to_string()))
            .collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
