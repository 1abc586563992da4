//! Trait abstraction over the platform GATT stack.
//!
//! The connection core never talks to a BLE stack directly. It consumes the
//! three capabilities of [`Transport`], which lets the same state machines run
//! against btleplug, a platform binding, or [`crate::MockTransport`] in tests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use gattlink_types::{CacheMode, CharacteristicInfo, DescriptorValue, ServiceInfo};

use crate::error::{Error, Result, TransportError};

/// Capabilities the connection core needs from a GATT client.
///
/// Every call may fail or never complete; callers inside this crate always
/// bound them with a timeout.
///
/// # Example
///
/// ```ignore
/// use gattlink_core::{Transport, TransportError};
/// use gattlink_types::CacheMode;
///
/// async fn count_services<T: Transport>(transport: &T) -> Result<usize, TransportError> {
///     Ok(transport.get_services(CacheMode::Uncached).await?.len())
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read the peripheral's service list.
    async fn get_services(
        &self,
        cache_mode: CacheMode,
    ) -> std::result::Result<Vec<ServiceInfo>, TransportError>;

    /// Read the characteristics of one service.
    async fn get_characteristics(
        &self,
        service: Uuid,
        cache_mode: CacheMode,
    ) -> std::result::Result<Vec<CharacteristicInfo>, TransportError>;

    /// Write the Client Characteristic Configuration Descriptor of a
    /// characteristic.
    ///
    /// Platforms that require descriptor writes on a designated execution
    /// context get them there: the core only calls this through a
    /// [`crate::Dispatcher`].
    async fn write_subscription_descriptor(
        &self,
        characteristic: &CharacteristicInfo,
        value: DescriptorValue,
    ) -> std::result::Result<(), TransportError>;
}

/// Await a transport call, mapping a hang to [`Error::Timeout`] and a failure
/// to [`Error::Transport`].
pub(crate) async fn bounded<T, F>(operation: &str, duration: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, TransportError>>,
{
    match tokio::time::timeout(duration, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::transport(operation, e)),
        Err(_) => Err(Error::timeout(operation, duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_value_through() {
        let value = bounded("read", Duration::from_secs(1), async {
            Ok::<_, TransportError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_bounded_wraps_transport_error() {
        let err = bounded("read", Duration::from_secs(1), async {
            Err::<(), _>(TransportError::LinkLost)
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                source: TransportError::LinkLost,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out_hung_call() {
        let err = bounded(
            "read",
            Duration::from_secs(2),
            futures::future::pending::<std::result::Result<(), TransportError>>(),
        )
        .await
        .unwrap_err();
        match err {
            Error::Timeout {
                operation,
                duration,
            } => {
                assert_eq!(operation, "read");
                assert_eq!(duration, Duration::from_secs(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
