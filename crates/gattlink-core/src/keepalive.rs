//! Subscription-aware keep-alive for one peripheral connection.
//!
//! Many BLE stacks drop a link that carries no traffic. While at least one
//! characteristic is notifying, the notifications themselves keep the link
//! busy; otherwise [`ConnectionKeepAlive`] issues a cheap uncached service
//! read every [`LinkConfig::probe_interval`].
//!
//! The keep-alive is in exactly one of three states:
//!
//! | State | Probe | Subscribers |
//! |-------|-------|-------------|
//! | [`KeepAliveState::Idle`] | stopped | none |
//! | [`KeepAliveState::Probing`] | running | none |
//! | [`KeepAliveState::Subscribed`] | stopped | one or more |
//!
//! The probe runs if and only if the subscriber set is empty and the
//! connection is active. The subscriber set, the probe ownership and the
//! connected flag live behind one mutex so that decision is always taken on a
//! consistent view.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, trace, warn};

use gattlink_types::{CacheMode, CharacteristicId, CharacteristicInfo, DescriptorValue};

use crate::config::LinkConfig;
use crate::dispatch::{Dispatcher, run_on};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, LinkEvent};
use crate::metrics::LinkMetrics;
use crate::transport::{Transport, bounded};

/// Observable state of a [`ConnectionKeepAlive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepAliveState {
    /// No probe and no subscribers.
    Idle,
    /// Probe running, no subscribers.
    Probing,
    /// At least one subscriber, probe suspended.
    Subscribed,
}

/// Outcome of [`ConnectionKeepAlive::disconnect`].
///
/// Teardown never fails; this report exists for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Characteristics that were subscribed when teardown began.
    pub attempted: usize,
    /// Disable writes that succeeded.
    pub unsubscribed: usize,
    /// Disable writes that failed or timed out individually.
    pub failed: usize,
    /// Whether the caller's deadline cut teardown short.
    pub timed_out: bool,
}

struct ProbeTask {
    cancel: CancellationToken,
    // Never joined: stopping must not wait for a tick in flight.
    _handle: JoinHandle<()>,
}

#[derive(Default)]
struct LinkState {
    connected: bool,
    // Bumped by every disconnect; registrations started earlier are refused.
    session: u64,
    subscribers: HashMap<CharacteristicId, CharacteristicInfo>,
    probe: Option<ProbeTask>,
}

impl LinkState {
    fn observed(&self) -> KeepAliveState {
        if !self.subscribers.is_empty() {
            KeepAliveState::Subscribed
        } else if self.probe.is_some() {
            KeepAliveState::Probing
        } else {
            KeepAliveState::Idle
        }
    }
}

struct KeepAliveInner {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<dyn Dispatcher>,
    config: LinkConfig,
    state: Mutex<LinkState>,
    events: EventDispatcher,
    metrics: Arc<LinkMetrics>,
}

impl Drop for KeepAliveInner {
    fn drop(&mut self) {
        if let Some(probe) = self.state.get_mut().probe.take() {
            probe.cancel.cancel();
        }
    }
}

/// Tracks active subscriptions and runs the keep-alive probe while there are
/// none.
///
/// Cloning is cheap and every clone shares the same state; characteristic
/// handles each hold one.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use gattlink_core::{ConnectionKeepAlive, InlineDispatcher, KeepAliveState, LinkConfig, MockTransport};
/// use gattlink_types::{CharacteristicInfo, CharacteristicProperties};
/// use gattlink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE};
///
/// # #[tokio::main]
/// # async fn main() -> gattlink_core::Result<()> {
/// let link = ConnectionKeepAlive::new(
///     Arc::new(MockTransport::new()),
///     Arc::new(InlineDispatcher),
///     LinkConfig::default(),
/// )?;
/// link.connect().await;
/// assert_eq!(link.state().await, KeepAliveState::Probing);
///
/// let battery = CharacteristicInfo::new(
///     BATTERY_SERVICE,
///     BATTERY_LEVEL,
///     CharacteristicProperties::notify_only(),
/// );
/// link.set_notify(battery, true).await;
/// assert_eq!(link.state().await, KeepAliveState::Subscribed);
///
/// link.disconnect(Duration::from_secs(5)).await;
/// assert_eq!(link.state().await, KeepAliveState::Idle);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionKeepAlive {
    inner: Arc<KeepAliveInner>,
}

impl std::fmt::Debug for ConnectionKeepAlive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionKeepAlive")
            .field("config", &self.inner.config)
            .field("dispatcher", &self.inner.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ConnectionKeepAlive {
    /// Create a keep-alive for a connection that has not been connected yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails
    /// [`LinkConfig::validate`].
    pub fn new(
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn Dispatcher>,
        config: LinkConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_validated(transport, dispatcher, config))
    }

    pub(crate) fn with_validated(
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn Dispatcher>,
        config: LinkConfig,
    ) -> Self {
        let events = EventDispatcher::new(config.event_capacity);
        Self {
            inner: Arc::new(KeepAliveInner {
                transport,
                dispatcher,
                config,
                state: Mutex::new(LinkState::default()),
                events,
                metrics: Arc::new(LinkMetrics::new()),
            }),
        }
    }

    /// Mark the connection active and start probing if nothing is subscribed.
    ///
    /// Calling this while already connected is a no-op.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn connect(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.connected {
            state.connected = true;
            info!("Connection active");
            self.inner.events.send(LinkEvent::Connected);
        }
        if state.probe.is_none() && state.subscribers.is_empty() {
            self.start_probe(&mut state);
        }
    }

    /// Disable every active subscription, then release the connection.
    ///
    /// The probe is stopped first. Disable writes are issued one at a time on
    /// the dispatch context, each bounded by
    /// [`LinkConfig::descriptor_write_timeout`]; a failing characteristic is
    /// logged and skipped. The whole sequence is bounded by `timeout`. The
    /// subscriber set is always empty afterwards.
    ///
    /// Calling this on an idle connection is a no-op.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn disconnect(&self, timeout: Duration) -> TeardownReport {
        let subscribers: Vec<CharacteristicInfo> = {
            let mut state = self.inner.state.lock().await;
            let was_connected = std::mem::replace(&mut state.connected, false);
            state.session += 1;
            self.stop_probe(&mut state);
            if !was_connected && state.subscribers.is_empty() {
                debug!("Already disconnected");
                return TeardownReport::default();
            }
            state.subscribers.values().copied().collect()
        };

        info!(
            subscribers = subscribers.len(),
            "Disconnecting, disabling active subscriptions"
        );

        let mut unsubscribed = 0;
        let mut failed = 0;
        let teardown = async {
            for characteristic in &subscribers {
                let id = characteristic.id();
                match self
                    .write_descriptor(characteristic, DescriptorValue::None)
                    .await
                {
                    Ok(()) => {
                        debug!(characteristic = %id, "Notifications disabled");
                        unsubscribed += 1;
                    }
                    Err(e) => {
                        warn!(characteristic = %id, error = %e, "Failed to disable notifications during teardown");
                        self.inner.events.send(LinkEvent::UnsubscribeFailed {
                            characteristic: id,
                            error: e.to_string(),
                        });
                        failed += 1;
                    }
                }
            }
        };
        let timed_out = tokio::time::timeout(timeout, teardown).await.is_err();
        if timed_out {
            warn!(
                ?timeout,
                abandoned = subscribers.len() - unsubscribed - failed,
                "Teardown deadline elapsed, abandoning remaining unsubscribe writes"
            );
        }

        {
            let mut state = self.inner.state.lock().await;
            state.subscribers.clear();
            // A concurrent connect() during teardown re-activated the link.
            if state.connected && state.probe.is_none() {
                self.start_probe(&mut state);
            }
        }

        let report = TeardownReport {
            attempted: subscribers.len(),
            unsubscribed,
            failed,
            timed_out,
        };
        info!(?report, "Disconnected");
        self.inner.events.send(LinkEvent::Disconnected {
            attempted: report.attempted,
            failed: report.failed,
            timed_out: report.timed_out,
        });
        report
    }

    /// Record that `characteristic` started or stopped notifying.
    ///
    /// The probe is stopped when the first subscriber arrives and restarted
    /// when the last one leaves (if the connection is still active). Returns
    /// whether the subscriber set changed.
    pub async fn set_notify(&self, characteristic: CharacteristicInfo, enable: bool) -> bool {
        let mut state = self.inner.state.lock().await;
        self.apply_notify(&mut state, characteristic, enable)
    }

    /// Session token of the active connection, or `None` while disconnected.
    ///
    /// Pass it to [`register_in_session`](Self::register_in_session) once the
    /// enable write has completed.
    pub(crate) async fn active_session(&self) -> Option<u64> {
        let state = self.inner.state.lock().await;
        state.connected.then_some(state.session)
    }

    /// Add `characteristic` to the subscriber set, unless the connection was
    /// torn down after `session` was taken.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if a disconnect ran in between; the
    /// subscriber set is left unchanged.
    pub(crate) async fn register_in_session(
        &self,
        characteristic: CharacteristicInfo,
        session: u64,
    ) -> Result<bool> {
        let mut state = self.inner.state.lock().await;
        if !state.connected || state.session != session {
            debug!(characteristic = %characteristic.id(), "Connection torn down while enabling, refusing subscriber");
            return Err(Error::NotConnected);
        }
        Ok(self.apply_notify(&mut state, characteristic, true))
    }

    fn apply_notify(
        &self,
        state: &mut LinkState,
        characteristic: CharacteristicInfo,
        enable: bool,
    ) -> bool {
        let id = characteristic.id();
        let changed = if enable {
            state.subscribers.insert(id, characteristic).is_none()
        } else {
            state.subscribers.remove(&id).is_some()
        };
        if changed {
            debug!(characteristic = %id, enable, subscribers = state.subscribers.len(), "Subscriber set changed");
            self.inner.events.send(if enable {
                LinkEvent::Subscribed { characteristic: id }
            } else {
                LinkEvent::Unsubscribed { characteristic: id }
            });
        }

        if state.subscribers.is_empty() {
            if state.connected && state.probe.is_none() {
                self.start_probe(state);
            }
        } else {
            self.stop_probe(state);
        }
        changed
    }

    /// Write a subscription descriptor on the dispatch context.
    ///
    /// The write runs inside the dispatched job, bounded by
    /// [`LinkConfig::descriptor_write_timeout`], so a hung write cannot stall
    /// the context for later jobs.
    pub(crate) async fn write_descriptor(
        &self,
        characteristic: &CharacteristicInfo,
        value: DescriptorValue,
    ) -> Result<()> {
        let transport = Arc::clone(&self.inner.transport);
        let characteristic = *characteristic;
        let limit = self.inner.config.descriptor_write_timeout;

        let started = Instant::now();
        let outcome = run_on(self.inner.dispatcher.as_ref(), async move {
            bounded(
                "write subscription descriptor",
                limit,
                transport.write_subscription_descriptor(&characteristic, value),
            )
            .await
        })
        .await
        .and_then(|written| written);

        self.inner
            .metrics
            .descriptor_writes
            .record(outcome.is_ok(), started.elapsed());
        outcome
    }

    fn start_probe(&self, state: &mut LinkState) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let transport = Arc::clone(&self.inner.transport);
        let events = self.inner.events.clone();
        let metrics = Arc::clone(&self.inner.metrics);
        let period = self.inner.config.probe_interval;
        let probe_timeout = self.inner.config.probe_timeout;

        let handle = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }

                    let started = Instant::now();
                    let outcome = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        outcome = bounded(
                            "keep-alive probe",
                            probe_timeout,
                            transport.get_services(CacheMode::Uncached),
                        ) => outcome,
                    };
                    metrics.probes.record(outcome.is_ok(), started.elapsed());

                    match outcome {
                        Ok(services) => trace!(services = services.len(), "Keep-alive probe answered"),
                        Err(e) => {
                            debug!(error = %e, "Keep-alive probe failed");
                            events.send(LinkEvent::ProbeFailed {
                                error: e.to_string(),
                            });
                        }
                    }
                }
                trace!("Keep-alive probe task exiting");
            }
            .instrument(debug_span!("keepalive_probe", interval = ?period)),
        );

        state.probe = Some(ProbeTask {
            cancel,
            _handle: handle,
        });
        debug!(interval = ?period, "Keep-alive probe started");
        self.inner.events.send(LinkEvent::ProbeStarted);
    }

    fn stop_probe(&self, state: &mut LinkState) {
        if let Some(probe) = state.probe.take() {
            probe.cancel.cancel();
            debug!("Keep-alive probe stopped");
            self.inner.events.send(LinkEvent::ProbeStopped);
        }
    }

    /// Get the current state.
    pub async fn state(&self) -> KeepAliveState {
        self.inner.state.lock().await.observed()
    }

    /// Whether [`connect`](Self::connect) was called and
    /// [`disconnect`](Self::disconnect) has not been since.
    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.connected
    }

    /// Whether the keep-alive probe is running.
    pub async fn is_probing(&self) -> bool {
        self.inner.state.lock().await.probe.is_some()
    }

    /// Number of characteristics currently notifying.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.state.lock().await.subscribers.len()
    }

    /// Whether `id` is currently notifying.
    pub async fn is_subscribed(&self, id: &CharacteristicId) -> bool {
        self.inner.state.lock().await.subscribers.contains_key(id)
    }

    /// Identifiers of every characteristic currently notifying, sorted.
    pub async fn subscribers(&self) -> Vec<CharacteristicId> {
        let state = self.inner.state.lock().await;
        let mut ids: Vec<_> = state.subscribers.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Subscribe to link events.
    pub fn events(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    pub(crate) fn event_dispatcher(&self) -> &EventDispatcher {
        &self.inner.events
    }

    /// Metrics for the calls this connection issued.
    pub fn metrics(&self) -> &LinkMetrics {
        &self.inner.metrics
    }

    /// The connection's configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Whether two handles refer to the same connection state.
    pub fn same_link(&self, other: &ConnectionKeepAlive) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
