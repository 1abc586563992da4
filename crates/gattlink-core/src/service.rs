//! GATT services and characteristic handles.
//!
//! A [`GattService`] discovers its characteristics lazily through a
//! single-flight cache and wraps each one in a [`CharacteristicHandle`] bound
//! to the connection's [`ConnectionKeepAlive`]. Enabling notifications on a
//! handle registers it with the keep-alive, which suspends probing while any
//! subscription is active.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use gattlink_types::{
    CacheMode, CharacteristicId, CharacteristicInfo, CharacteristicProperties, DescriptorValue,
    ServiceInfo,
};

use crate::error::{Error, Result, TransportError};
use crate::events::LinkEvent;
use crate::keepalive::ConnectionKeepAlive;
use crate::single_flight::{Discovery, Epoch, SingleFlight};
use crate::transport::bounded;

/// Run one discovery call with timeout, events and metrics.
pub(crate) async fn tracked_discovery<T, F>(
    link: &ConnectionKeepAlive,
    service: Option<Uuid>,
    operation: &str,
    call: F,
) -> Result<Vec<T>>
where
    F: Future<Output = std::result::Result<Vec<T>, TransportError>>,
{
    let events = link.event_dispatcher();
    events.send(LinkEvent::DiscoveryStarted { service });
    debug!(?service, operation, "Discovery started");

    let started = Instant::now();
    let outcome = bounded(operation, link.config().discovery_timeout, call).await;
    link.metrics()
        .discoveries
        .record(outcome.is_ok(), started.elapsed());

    match &outcome {
        Ok(found) => debug!(?service, count = found.len(), "Discovery complete"),
        Err(e) => {
            warn!(?service, error = %e, "Discovery failed");
            events.send(LinkEvent::DiscoveryFailed {
                service,
                error: e.to_string(),
            });
        }
    }
    outcome
}

struct ServiceInner {
    info: ServiceInfo,
    link: ConnectionKeepAlive,
    characteristics: SingleFlight<CharacteristicHandle>,
    epoch: Epoch,
}

/// A GATT service discovered on a connection.
///
/// Cloning is cheap; clones share the characteristic cache.
#[derive(Clone)]
pub struct GattService {
    inner: Arc<ServiceInner>,
}

impl fmt::Debug for GattService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GattService")
            .field("info", &self.inner.info)
            .field("characteristics", &self.inner.characteristics)
            .finish_non_exhaustive()
    }
}

impl GattService {
    pub(crate) fn new(info: ServiceInfo, link: ConnectionKeepAlive, epoch: Epoch) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                info,
                link,
                characteristics: SingleFlight::new(),
                epoch,
            }),
        }
    }

    /// The service UUID.
    pub fn uuid(&self) -> Uuid {
        self.inner.info.uuid
    }

    /// The service as reported by the transport.
    pub fn info(&self) -> &ServiceInfo {
        &self.inner.info
    }

    /// Whether the connection's service list was invalidated or rediscovered
    /// after this service was produced.
    pub fn is_stale(&self) -> bool {
        self.inner.epoch.is_stale()
    }

    /// Discover this service's characteristics.
    ///
    /// Returns an observer of a shared, lazily started attempt. The first
    /// observer to await it issues one uncached transport call; concurrent
    /// and later observers attach to the same result. Once every observer is
    /// dropped the result is released and the next call discovers afresh.
    pub fn discover_characteristics(&self) -> Discovery<CharacteristicHandle> {
        let service = Arc::downgrade(&self.inner);
        let service_epoch = self.inner.epoch.clone();
        let link = self.inner.link.clone();
        let uuid = self.inner.info.uuid;

        self.inner.characteristics.observe(move |epoch| async move {
            let transport = Arc::clone(link.transport());
            let found = tracked_discovery(
                &link,
                Some(uuid),
                "discover characteristics",
                transport.get_characteristics(uuid, CacheMode::Uncached),
            )
            .await?;
            Ok(found
                .into_iter()
                .map(|info| CharacteristicHandle {
                    info,
                    service: service.clone(),
                    link: link.clone(),
                    epoch: epoch.clone(),
                    service_epoch: service_epoch.clone(),
                })
                .collect())
        })
    }

    /// Discover and return every characteristic.
    pub async fn characteristics(&self) -> Result<Arc<[CharacteristicHandle]>> {
        self.discover_characteristics().result().await
    }

    /// Discover and return one characteristic by UUID.
    pub async fn characteristic(&self, uuid: Uuid) -> Result<CharacteristicHandle> {
        self.characteristics()
            .await?
            .iter()
            .find(|handle| handle.uuid() == uuid)
            .cloned()
            .ok_or(Error::CharacteristicNotFound {
                service: self.uuid(),
                uuid,
            })
    }

    /// Drop the cached characteristics so the next call rediscovers them.
    ///
    /// Handles from earlier discoveries report [`CharacteristicHandle::is_stale`].
    /// Returns the new cache generation.
    pub fn invalidate(&self) -> u64 {
        let generation = self.inner.characteristics.invalidate();
        debug!(service = %self.uuid(), generation, "Characteristic cache invalidated");
        generation
    }

    /// The current characteristic cache generation.
    pub fn generation(&self) -> u64 {
        self.inner.characteristics.generation()
    }
}

/// A characteristic bound to its service and the connection keep-alive.
#[derive(Clone)]
pub struct CharacteristicHandle {
    info: CharacteristicInfo,
    service: Weak<ServiceInner>,
    link: ConnectionKeepAlive,
    epoch: Epoch,
    service_epoch: Epoch,
}

impl fmt::Debug for CharacteristicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharacteristicHandle")
            .field("info", &self.info)
            .field("generation", &self.epoch.generation())
            .finish_non_exhaustive()
    }
}

impl CharacteristicHandle {
    /// Service and characteristic UUID pair.
    pub fn id(&self) -> CharacteristicId {
        self.info.id()
    }

    /// The characteristic UUID.
    pub fn uuid(&self) -> Uuid {
        self.info.uuid
    }

    /// The characteristic as reported by the transport.
    pub fn info(&self) -> &CharacteristicInfo {
        &self.info
    }

    /// Supported operations.
    pub fn properties(&self) -> CharacteristicProperties {
        self.info.properties
    }

    /// The owning service, or `None` once every handle to it is gone.
    pub fn service(&self) -> Option<GattService> {
        self.service.upgrade().map(|inner| GattService { inner })
    }

    /// Cache generation that produced this handle.
    pub fn generation(&self) -> u64 {
        self.epoch.generation()
    }

    /// Whether the owning service's characteristics, or the connection's
    /// service list, were invalidated or rediscovered after this handle was
    /// discovered.
    pub fn is_stale(&self) -> bool {
        self.epoch.is_stale() || self.service_epoch.is_stale()
    }

    /// Enable value-change notifications.
    ///
    /// Uses notifications when offered, indications otherwise. The descriptor
    /// write runs on the connection's dispatch context; on success the
    /// characteristic joins the subscriber set and the keep-alive probe is
    /// suspended. Returns the value that was written.
    ///
    /// # Errors
    ///
    /// - [`Error::NotSupported`] if the characteristic offers neither mode.
    /// - [`Error::NotConnected`] if the connection is not active, or was torn
    ///   down while the write was in flight. The descriptor is reset in the
    ///   latter case.
    /// - The transport or timeout error of a failed write. The subscriber set
    ///   is unchanged in that case.
    #[tracing::instrument(level = "debug", skip(self), fields(characteristic = %self.id()))]
    pub async fn enable_notifications(&self) -> Result<DescriptorValue> {
        let value = self
            .info
            .properties
            .subscription_value()
            .ok_or_else(|| Error::NotSupported {
                id: self.id(),
                operation: "notifications".to_string(),
            })?;
        let session = self.link.active_session().await.ok_or(Error::NotConnected)?;

        self.link.write_descriptor(&self.info, value).await?;
        if let Err(e) = self.link.register_in_session(self.info, session).await {
            // Teardown ran during the write and never saw this subscription.
            if let Err(rollback) = self
                .link
                .write_descriptor(&self.info, DescriptorValue::None)
                .await
            {
                warn!(error = %rollback, "Failed to roll back notifications after disconnect");
            }
            return Err(e);
        }
        Ok(value)
    }

    /// Disable value-change notifications.
    ///
    /// # Errors
    ///
    /// Returns the transport or timeout error of a failed write. The
    /// characteristic then stays registered so disconnect retries it.
    #[tracing::instrument(level = "debug", skip(self), fields(characteristic = %self.id()))]
    pub async fn disable_notifications(&self) -> Result<()> {
        self.link
            .write_descriptor(&self.info, DescriptorValue::None)
            .await?;
        self.link.set_notify(self.info, false).await;
        Ok(())
    }

    /// Whether this characteristic is in the connection's subscriber set.
    pub async fn is_notifying(&self) -> bool {
        self.link.is_subscribed(&self.id()).await
    }
}
