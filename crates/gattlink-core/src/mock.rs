//! Mock transport implementation for testing.
//!
//! This module provides a mock GATT transport that can be used for unit
//! testing without requiring actual BLE hardware.
//!
//! # Features
//!
//! - **Failure injection**: fail service reads, characteristic reads, or
//!   descriptor writes for specific characteristics
//! - **Hang simulation**: make a call never complete, to exercise timeouts
//! - **Latency simulation**: add artificial delays to simulate slow BLE responses
//! - **Call recording**: count reads and record every descriptor write

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use gattlink_types::{
    CacheMode, CharacteristicId, CharacteristicInfo, CharacteristicProperties, DescriptorValue,
    ServiceInfo,
};

use crate::error::TransportError;
use crate::transport::Transport;

/// A mock GATT transport for testing.
///
/// # Example
///
/// ```
/// use gattlink_core::{MockTransport, Transport};
/// use gattlink_types::{CacheMode, CharacteristicProperties};
/// use gattlink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE};
///
/// #[tokio::main]
/// async fn main() {
///     let transport = MockTransport::builder()
///         .service(BATTERY_SERVICE)
///         .characteristic(BATTERY_SERVICE, BATTERY_LEVEL, CharacteristicProperties::notify_only())
///         .build();
///
///     let services = transport.get_services(CacheMode::Uncached).await.unwrap();
///     assert_eq!(services.len(), 1);
///     assert_eq!(transport.service_calls(), 1);
/// }
/// ```
pub struct MockTransport {
    services: RwLock<Vec<ServiceInfo>>,
    characteristics: RwLock<HashMap<Uuid, Vec<CharacteristicInfo>>>,
    service_calls: AtomicU32,
    characteristic_calls: AtomicU32,
    characteristics_in_flight: AtomicU32,
    max_characteristics_in_flight: AtomicU32,
    last_cache_mode: Mutex<Option<CacheMode>>,
    writes: Mutex<Vec<(CharacteristicId, DescriptorValue)>>,
    fail_services: AtomicBool,
    fail_characteristics: AtomicBool,
    hang_services: AtomicBool,
    hang_characteristics: AtomicBool,
    failing_writes: RwLock<HashSet<CharacteristicId>>,
    hanging_writes: RwLock<HashSet<CharacteristicId>>,
    fail_message: RwLock<String>,
    /// Simulated latency for every call in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    /// Remaining service reads to fail before succeeding.
    remaining_service_failures: AtomicU32,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("service_calls", &self.service_calls())
            .field("characteristic_calls", &self.characteristic_calls())
            .field("fail_services", &self.fail_services.load(Ordering::Relaxed))
            .field(
                "fail_characteristics",
                &self.fail_characteristics.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

fn latency_millis(latency: Duration) -> u64 {
    u64::try_from(latency.as_millis()).unwrap_or(u64::MAX)
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock transport with no services.
    pub fn new() -> Self {
        MockTransportBuilder::new().build()
    }

    /// Create a builder for a pre-populated mock transport.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::new()
    }

    async fn simulate_latency(&self) {
        let ms = self.latency_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    async fn failure(&self) -> TransportError {
        TransportError::Other(self.fail_message.read().await.clone())
    }

    /// Add a service at runtime.
    pub async fn add_service(&self, service: ServiceInfo) {
        self.services.write().await.push(service);
    }

    /// Add a characteristic at runtime.
    pub async fn add_characteristic(&self, characteristic: CharacteristicInfo) {
        self.characteristics
            .write()
            .await
            .entry(characteristic.service_uuid)
            .or_default()
            .push(characteristic);
    }

    /// Make service reads fail (or succeed again).
    pub fn set_fail_services(&self, fail: bool) {
        self.fail_services.store(fail, Ordering::Relaxed);
    }

    /// Make characteristic reads fail (or succeed again).
    pub fn set_fail_characteristics(&self, fail: bool) {
        self.fail_characteristics.store(fail, Ordering::Relaxed);
    }

    /// Make service reads never complete.
    pub fn set_hang_services(&self, hang: bool) {
        self.hang_services.store(hang, Ordering::Relaxed);
    }

    /// Make characteristic reads never complete.
    pub fn set_hang_characteristics(&self, hang: bool) {
        self.hang_characteristics.store(hang, Ordering::Relaxed);
    }

    /// Set the message carried by injected failures.
    pub async fn set_fail_message(&self, message: &str) {
        *self.fail_message.write().await = message.to_string();
    }

    /// Reject descriptor writes for `id`.
    pub async fn fail_writes_for(&self, id: CharacteristicId) {
        self.failing_writes.write().await.insert(id);
    }

    /// Make descriptor writes for `id` never complete.
    pub async fn hang_writes_for(&self, id: CharacteristicId) {
        self.hanging_writes.write().await.insert(id);
    }

    /// Clear all injected write failures and hangs.
    pub async fn clear_write_faults(&self) {
        self.failing_writes.write().await.clear();
        self.hanging_writes.write().await.clear();
    }

    /// Set simulated latency for every call.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency_millis(latency), Ordering::Relaxed);
    }

    /// Configure transient service read failures.
    ///
    /// The next `count` service reads fail, then reads succeed again.
    pub fn set_transient_service_failures(&self, count: u32) {
        self.remaining_service_failures
            .store(count, Ordering::Relaxed);
    }

    /// Number of service reads issued.
    pub fn service_calls(&self) -> u32 {
        self.service_calls.load(Ordering::Relaxed)
    }

    /// Number of characteristic reads issued.
    pub fn characteristic_calls(&self) -> u32 {
        self.characteristic_calls.load(Ordering::Relaxed)
    }

    /// Highest number of characteristic reads that were in flight at once.
    pub fn max_concurrent_characteristic_calls(&self) -> u32 {
        self.max_characteristics_in_flight.load(Ordering::Relaxed)
    }

    /// Cache mode of the most recent read.
    pub async fn last_cache_mode(&self) -> Option<CacheMode> {
        *self.last_cache_mode.lock().await
    }

    /// Every successful descriptor write, in order.
    pub async fn writes(&self) -> Vec<(CharacteristicId, DescriptorValue)> {
        self.writes.lock().await.clone()
    }

    /// Reset call counters and the write log.
    pub async fn reset_counters(&self) {
        self.service_calls.store(0, Ordering::Relaxed);
        self.characteristic_calls.store(0, Ordering::Relaxed);
        self.max_characteristics_in_flight
            .store(0, Ordering::Relaxed);
        self.writes.lock().await.clear();
    }
}

struct InFlight<'a>(&'a AtomicU32);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_services(
        &self,
        cache_mode: CacheMode,
    ) -> std::result::Result<Vec<ServiceInfo>, TransportError> {
        self.service_calls.fetch_add(1, Ordering::Relaxed);
        *self.last_cache_mode.lock().await = Some(cache_mode);

        if self.hang_services.load(Ordering::Relaxed) {
            futures::future::pending::<()>().await;
        }
        self.simulate_latency().await;

        if self.fail_services.load(Ordering::Relaxed) {
            return Err(self.failure().await);
        }
        let transient = self.remaining_service_failures.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |n| n.checked_sub(1),
        );
        if transient.is_ok() {
            return Err(TransportError::LinkLost);
        }

        Ok(self.services.read().await.clone())
    }

    async fn get_characteristics(
        &self,
        service: Uuid,
        cache_mode: CacheMode,
    ) -> std::result::Result<Vec<CharacteristicInfo>, TransportError> {
        self.characteristic_calls.fetch_add(1, Ordering::Relaxed);
        let now = self.characteristics_in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        let _in_flight = InFlight(&self.characteristics_in_flight);
        self.max_characteristics_in_flight
            .fetch_max(now, Ordering::Relaxed);
        *self.last_cache_mode.lock().await = Some(cache_mode);

        if self.hang_characteristics.load(Ordering::Relaxed) {
            futures::future::pending::<()>().await;
        }
        self.simulate_latency().await;

        if self.fail_characteristics.load(Ordering::Relaxed) {
            return Err(self.failure().await);
        }

        Ok(self
            .characteristics
            .read()
            .await
            .get(&service)
            .cloned()
            .unwrap_or_default())
    }

    async fn write_subscription_descriptor(
        &self,
        characteristic: &CharacteristicInfo,
        value: DescriptorValue,
    ) -> std::result::Result<(), TransportError> {
        let id = characteristic.id();
        if self.hanging_writes.read().await.contains(&id) {
            futures::future::pending::<()>().await;
        }
        self.simulate_latency().await;

        if self.failing_writes.read().await.contains(&id) {
            return Err(TransportError::Rejected(format!(
                "descriptor write to {id} refused"
            )));
        }
        self.writes.lock().await.push((id, value));
        Ok(())
    }
}

/// Builder for creating mock transports with custom attribute tables.
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    services: Vec<ServiceInfo>,
    characteristics: Vec<CharacteristicInfo>,
    latency: Duration,
    fail_message: Option<String>,
}

impl MockTransportBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a primary service.
    #[must_use]
    pub fn service(mut self, uuid: Uuid) -> Self {
        self.services.push(ServiceInfo::primary(uuid));
        self
    }

    /// Add a characteristic to a service.
    ///
    /// The service is not added implicitly.
    #[must_use]
    pub fn characteristic(
        mut self,
        service: Uuid,
        uuid: Uuid,
        properties: CharacteristicProperties,
    ) -> Self {
        self.characteristics
            .push(CharacteristicInfo::new(service, uuid, properties));
        self
    }

    /// Set simulated latency for every call.
    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Set the message carried by injected failures.
    #[must_use]
    pub fn fail_message(mut self, message: &str) -> Self {
        self.fail_message = Some(message.to_string());
        self
    }

    /// Build the mock transport.
    #[must_use]
    pub fn build(self) -> MockTransport {
        let mut characteristics: HashMap<Uuid, Vec<CharacteristicInfo>> = HashMap::new();
        for characteristic in self.characteristics {
            characteristics
                .entry(characteristic.service_uuid)
                .or_default()
                .push(characteristic);
        }

        MockTransport {
            services: RwLock::new(self.services),
            characteristics: RwLock::new(characteristics),
            service_calls: AtomicU32::new(0),
            characteristic_calls: AtomicU32::new(0),
            characteristics_in_flight: AtomicU32::new(0),
            max_characteristics_in_flight: AtomicU32::new(0),
            last_cache_mode: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            fail_services: AtomicBool::new(false),
            fail_characteristics: AtomicBool::new(false),
            hang_services: AtomicBool::new(false),
            hang_characteristics: AtomicBool::new(false),
            failing_writes: RwLock::new(HashSet::new()),
            hanging_writes: RwLock::new(HashSet::new()),
            fail_message: RwLock::new(
                self.fail_message
                    .unwrap_or_else(|| "Mock failure".to_string()),
            ),
            latency_ms: AtomicU64::new(latency_millis(self.latency)),
            remaining_service_failures: AtomicU32::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gattlink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE, GAP_SERVICE};

    fn battery() -> MockTransport {
        MockTransport::builder()
            .service(BATTERY_SERVICE)
            .characteristic(
                BATTERY_SERVICE,
                BATTERY_LEVEL,
                CharacteristicProperties::notify_only(),
            )
            .build()
    }

    #[tokio::test]
    async fn test_mock_returns_configured_attributes() {
        let transport = battery();

        let services = transport.get_services(CacheMode::Uncached).await.unwrap();
        assert_eq!(services, vec![ServiceInfo::primary(BATTERY_SERVICE)]);

        let characteristics = transport
            .get_characteristics(BATTERY_SERVICE, CacheMode::Cached)
            .await
            .unwrap();
        assert_eq!(characteristics.len(), 1);
        assert_eq!(characteristics[0].uuid, BATTERY_LEVEL);
        assert_eq!(transport.last_cache_mode().await, Some(CacheMode::Cached));
    }

    #[tokio::test]
    async fn test_mock_unknown_service_is_empty() {
        let transport = battery();
        let characteristics = transport
            .get_characteristics(GAP_SERVICE, CacheMode::Uncached)
            .await
            .unwrap();
        assert!(characteristics.is_empty());
    }

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let transport = battery();
        transport.get_services(CacheMode::Uncached).await.unwrap();
        transport.get_services(CacheMode::Uncached).await.unwrap();
        transport
            .get_characteristics(BATTERY_SERVICE, CacheMode::Uncached)
            .await
            .unwrap();

        assert_eq!(transport.service_calls(), 2);
        assert_eq!(transport.characteristic_calls(), 1);

        transport.reset_counters().await;
        assert_eq!(transport.service_calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let transport = MockTransport::builder().fail_message("radio off").build();
        transport.set_fail_services(true);

        let err = transport
            .get_services(CacheMode::Uncached)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Other("radio off".to_string()));

        transport.set_fail_services(false);
        assert!(transport.get_services(CacheMode::Uncached).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_transient_failures() {
        let transport = battery();
        transport.set_transient_service_failures(2);

        assert!(transport.get_services(CacheMode::Uncached).await.is_err());
        assert!(transport.get_services(CacheMode::Uncached).await.is_err());
        assert!(transport.get_services(CacheMode::Uncached).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_write_log_and_rejection() {
        let transport = battery();
        let level = CharacteristicInfo::new(
            BATTERY_SERVICE,
            BATTERY_LEVEL,
            CharacteristicProperties::notify_only(),
        );

        transport
            .write_subscription_descriptor(&level, DescriptorValue::Notify)
            .await
            .unwrap();
        transport.fail_writes_for(level.id()).await;
        let err = transport
            .write_subscription_descriptor(&level, DescriptorValue::None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));

        assert_eq!(
            transport.writes().await,
            vec![(level.id(), DescriptorValue::Notify)]
        );

        transport.clear_write_faults().await;
        assert!(
            transport
                .write_subscription_descriptor(&level, DescriptorValue::None)
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_latency() {
        let transport = battery();
        transport.set_latency(Duration::from_millis(200));

        let started = tokio::time::Instant::now();
        transport.get_services(CacheMode::Uncached).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_mock_latency_saturates() {
        let transport = MockTransport::builder().latency(Duration::MAX).build();
        assert_eq!(transport.latency_ms.load(Ordering::Relaxed), u64::MAX);

        transport.set_latency(Duration::from_secs(u64::MAX));
        assert_eq!(transport.latency_ms.load(Ordering::Relaxed), u64::MAX);

        transport.set_latency(Duration::from_millis(1_500));
        assert_eq!(transport.latency_ms.load(Ordering::Relaxed), 1_500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_hang() {
        let transport = battery();
        transport.set_hang_services(true);

        let outcome = tokio::time::timeout(
            Duration::from_secs(60),
            transport.get_services(CacheMode::Uncached),
        )
        .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_mock_runtime_attribute_changes() {
        let transport = MockTransport::new();
        transport.add_service(ServiceInfo::primary(GAP_SERVICE)).await;
        transport
            .add_characteristic(CharacteristicInfo::new(
                GAP_SERVICE,
                BATTERY_LEVEL,
                CharacteristicProperties::default(),
            ))
            .await;

        assert_eq!(
            transport
                .get_characteristics(GAP_SERVICE, CacheMode::Uncached)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
