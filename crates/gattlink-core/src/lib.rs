//! Connection core for BLE central applications.
//!
//! This crate manages one Bluetooth Low Energy peripheral connection from the
//! central role. It does not talk to a radio itself; it drives a
//! [`Transport`] and adds the lifecycle logic that platform GATT APIs leave to
//! the application.
//!
//! # Features
//!
//! - **Keep-alive**: an uncached service read every few seconds while no
//!   characteristic is notifying, suspended as soon as one is
//! - **Single-flight discovery**: services and characteristics are discovered
//!   lazily, once, and the result is replayed to every caller
//! - **Orderly teardown**: disconnect disables every active subscription first,
//!   isolating per-characteristic failures and honouring a deadline
//! - **Dispatch contexts**: descriptor writes can be pinned to one designated
//!   execution context
//! - **Events and metrics**: lifecycle transitions and swallowed failures are
//!   broadcast as [`LinkEvent`]s and counted in [`LinkMetrics`]
//!
//! # Keep-alive states
//!
//! | State | Probe | Subscribers |
//! |-------|-------|-------------|
//! | Idle | stopped | none |
//! | Probing | running | none |
//! | Subscribed | stopped | one or more |
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use gattlink_core::{Connection, KeepAliveState, MockTransport};
//! use gattlink_types::CharacteristicProperties;
//! use gattlink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = MockTransport::builder()
//!         .service(BATTERY_SERVICE)
//!         .characteristic(BATTERY_SERVICE, BATTERY_LEVEL, CharacteristicProperties::notify_only())
//!         .build();
//!
//!     let connection = Connection::with_defaults(Arc::new(transport));
//!     connection.connect().await;
//!     assert_eq!(connection.state().await, KeepAliveState::Probing);
//!
//!     let level = connection
//!         .service(BATTERY_SERVICE)
//!         .await?
//!         .characteristic(BATTERY_LEVEL)
//!         .await?;
//!     level.enable_notifications().await?;
//!     assert_eq!(connection.state().await, KeepAliveState::Subscribed);
//!
//!     let report = connection.disconnect().await;
//!     println!("Disabled {} subscriptions", report.unsubscribed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod guard;
pub mod keepalive;
pub mod metrics;
pub mod mock;
pub mod service;
pub mod transport;

mod single_flight;

#[cfg(feature = "btleplug")]
pub mod btle;

// Re-export types and uuid modules from gattlink-types
pub use gattlink_types::types;
pub use gattlink_types::uuid;

pub use config::{ConfigError, DEFAULT_PROBE_INTERVAL, LinkConfig};
pub use connection::Connection;
pub use dispatch::{DispatchQueue, Dispatcher, InlineDispatcher, Job, run_on};
pub use error::{Error, Result, TransportError};
pub use events::{EventDispatcher, EventReceiver, EventSender, LinkEvent};
pub use guard::ConnectionGuard;
pub use keepalive::{ConnectionKeepAlive, KeepAliveState, TeardownReport};
pub use metrics::{AtomicOperationMetrics, LinkMetrics, LinkMetricsSummary, OperationMetrics};
pub use mock::{MockTransport, MockTransportBuilder};
pub use service::{CharacteristicHandle, GattService};
pub use single_flight::Discovery;
pub use transport::Transport;

#[cfg(feature = "btleplug")]
pub use btle::BtleTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_types_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Connection>();
        assert_send_sync::<ConnectionKeepAlive>();
        assert_send_sync::<GattService>();
        assert_send_sync::<CharacteristicHandle>();
        assert_send_sync::<Discovery<CharacteristicHandle>>();
        assert_send_sync::<MockTransport>();
        assert_send_sync::<DispatchQueue>();
        assert_send_sync::<Error>();
    }

    #[test]
    fn test_default_probe_interval() {
        assert_eq!(DEFAULT_PROBE_INTERVAL, std::time::Duration::from_secs(5));
    }
}
