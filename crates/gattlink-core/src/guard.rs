//! Connection guard for automatic disconnect on drop.
//!
//! This module provides RAII-style connection management, ensuring that
//! subscriptions are disabled and the keep-alive is stopped when the guard
//! goes out of scope.

use std::ops::Deref;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::connection::Connection;

/// A guard that disconnects the connection when dropped.
///
/// The disconnect runs on a spawned task bounded by
/// [`LinkConfig::teardown_timeout`](crate::LinkConfig::teardown_timeout).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gattlink_core::{Connection, ConnectionGuard, MockTransport};
///
/// # #[tokio::main]
/// # async fn main() {
/// let connection = Connection::with_defaults(Arc::new(MockTransport::new()));
/// connection.connect().await;
/// {
///     let guard = ConnectionGuard::new(connection.clone());
///     assert!(guard.is_connected().await);
///     // Teardown is spawned when the guard goes out of scope.
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct ConnectionGuard {
    connection: Connection,
    armed: bool,
}

impl ConnectionGuard {
    /// Create a new connection guard.
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            armed: true,
        }
    }

    /// Consume the guard and return the connection.
    ///
    /// The connection is NOT disconnected; you are responsible for its
    /// lifecycle from here on.
    pub fn into_inner(mut self) -> Connection {
        self.armed = false;
        self.connection.clone()
    }

    /// Get a reference to the connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Deref for ConnectionGuard {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let connection = self.connection.clone();
        // Try to get a runtime handle to perform async disconnect
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                let report = connection.disconnect().await;
                if report.failed > 0 || report.timed_out {
                    warn!(?report, "Teardown in guard drop was incomplete");
                } else {
                    debug!(?report, "Guard disconnected connection");
                }
            });
        } else {
            warn!("No tokio runtime available for disconnect in guard drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keepalive::KeepAliveState;
    use crate::mock::MockTransport;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_disconnects_on_drop() {
        let connection = Connection::with_defaults(Arc::new(MockTransport::new()));
        connection.connect().await;

        drop(ConnectionGuard::new(connection.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!connection.is_connected().await);
        assert_eq!(connection.state().await, KeepAliveState::Idle);
    }

    #[tokio::test]
    async fn test_into_inner_skips_disconnect() {
        let connection = Connection::with_defaults(Arc::new(MockTransport::new()));
        connection.connect().await;

        let inner = ConnectionGuard::new(connection.clone()).into_inner();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(inner.is_connected().await);
        assert_eq!(connection.state().await, KeepAliveState::Probing);
    }

    #[test]
    fn test_drop_without_runtime_does_not_panic() {
        let connection = Connection::with_defaults(Arc::new(MockTransport::new()));
        drop(ConnectionGuard::new(connection));
    }
}
