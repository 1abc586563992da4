//! One peripheral connection: keep-alive plus service discovery.

use std::sync::Arc;
use std::time::Duration;

use gattlink_types::CacheMode;
use uuid::Uuid;

use crate::config::LinkConfig;
use crate::dispatch::{Dispatcher, InlineDispatcher};
use crate::error::{Error, Result};
use crate::events::EventReceiver;
use crate::keepalive::{ConnectionKeepAlive, KeepAliveState, TeardownReport};
use crate::metrics::LinkMetrics;
use crate::service::{GattService, tracked_discovery};
use crate::single_flight::{Discovery, SingleFlight};
use crate::transport::Transport;

/// A connection to one peripheral.
///
/// Owns the transport, the dispatch context for descriptor writes and the
/// [`ConnectionKeepAlive`]. Services discovered here share that keep-alive,
/// so subscriptions made through any of their characteristics suspend the
/// probe for the whole connection.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gattlink_core::{Connection, KeepAliveState, MockTransport};
/// use gattlink_types::CharacteristicProperties;
/// use gattlink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE};
///
/// # #[tokio::main]
/// # async fn main() -> gattlink_core::Result<()> {
/// let transport = MockTransport::builder()
///     .service(BATTERY_SERVICE)
///     .characteristic(BATTERY_SERVICE, BATTERY_LEVEL, CharacteristicProperties::notify_only())
///     .build();
/// let connection = Connection::with_defaults(Arc::new(transport));
/// connection.connect().await;
///
/// let battery = connection.service(BATTERY_SERVICE).await?;
/// let level = battery.characteristic(BATTERY_LEVEL).await?;
/// level.enable_notifications().await?;
/// assert_eq!(connection.state().await, KeepAliveState::Subscribed);
///
/// let report = connection.disconnect().await;
/// assert_eq!(report.unsubscribed, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Connection {
    link: ConnectionKeepAlive,
    services: Arc<SingleFlight<GattService>>,
}

impl Connection {
    /// Create a connection after validating `config`.
    pub fn new(
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn Dispatcher>,
        config: LinkConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            link: ConnectionKeepAlive::with_validated(transport, dispatcher, config),
            services: Arc::new(SingleFlight::new()),
        })
    }

    /// Create a connection with the default config, running descriptor
    /// writes inline.
    pub fn with_defaults(transport: Arc<dyn Transport>) -> Self {
        Self {
            link: ConnectionKeepAlive::with_validated(
                transport,
                Arc::new(InlineDispatcher),
                LinkConfig::default(),
            ),
            services: Arc::new(SingleFlight::new()),
        }
    }

    /// The connection's keep-alive.
    pub fn keep_alive(&self) -> &ConnectionKeepAlive {
        &self.link
    }

    /// Mark the connection active and start the keep-alive probe.
    pub async fn connect(&self) {
        self.link.connect().await;
    }

    /// Disable every subscription and release the connection, bounded by
    /// [`LinkConfig::teardown_timeout`].
    pub async fn disconnect(&self) -> TeardownReport {
        self.link.disconnect(self.link.config().teardown_timeout).await
    }

    /// Like [`disconnect`](Self::disconnect) with an explicit deadline.
    pub async fn disconnect_within(&self, timeout: Duration) -> TeardownReport {
        self.link.disconnect(timeout).await
    }

    /// Discover the peripheral's services.
    ///
    /// Shares one uncached transport call between all concurrent and later
    /// observers, like [`GattService::discover_characteristics`].
    pub fn discover_services(&self) -> Discovery<GattService> {
        let link = self.link.clone();
        self.services.observe(move |epoch| async move {
            let transport = Arc::clone(link.transport());
            let found = tracked_discovery(
                &link,
                None,
                "discover services",
                transport.get_services(CacheMode::Uncached),
            )
            .await?;
            Ok(found
                .into_iter()
                .map(|info| GattService::new(info, link.clone(), epoch.clone()))
                .collect())
        })
    }

    /// Discover and return every service.
    pub async fn services(&self) -> Result<Arc<[GattService]>> {
        self.discover_services().result().await
    }

    /// Discover and return one service by UUID.
    pub async fn service(&self, uuid: Uuid) -> Result<GattService> {
        self.services()
            .await?
            .iter()
            .find(|service| service.uuid() == uuid)
            .cloned()
            .ok_or(Error::ServiceNotFound(uuid))
    }

    /// Drop the cached service list so the next call rediscovers it.
    ///
    /// Services from earlier discoveries report [`GattService::is_stale`].
    pub fn invalidate_services(&self) -> u64 {
        self.services.invalidate()
    }

    /// Current keep-alive state.
    pub async fn state(&self) -> KeepAliveState {
        self.link.state().await
    }

    /// Whether the connection is active.
    pub async fn is_connected(&self) -> bool {
        self.link.is_connected().await
    }

    /// Subscribe to link events.
    pub fn events(&self) -> EventReceiver {
        self.link.events()
    }

    /// Probe, descriptor write and discovery metrics.
    pub fn metrics(&self) -> &LinkMetrics {
        self.link.metrics()
    }

    /// The validated configuration.
    pub fn config(&self) -> &LinkConfig {
        self.link.config()
    }
}
