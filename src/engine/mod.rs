// Connection layer
// Dispatcher boundary, connections and the session manager

pub mod connection;
pub mod error;
pub mod session_manager;
pub mod traits;
pub mod types;

pub use connection::{Connection, ConnectionHandle};
pub use error::{ConnectionError, DispatchError, QueryError};
pub use session_manager::SessionManager;
pub use traits::QueryDispatcher;
pub use types::*;
