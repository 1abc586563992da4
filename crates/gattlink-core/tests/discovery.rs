//! Integration tests for single-flight service and characteristic discovery.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use gattlink_core::{Connection, Error, KeepAliveState, LinkEvent, MockTransport, TransportError};
use gattlink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_NAME, GAP_SERVICE};
use gattlink_types::CharacteristicProperties;

fn transport() -> Arc<MockTransport> {
    Arc::new(
        MockTransport::builder()
            .service(GAP_SERVICE)
            .service(BATTERY_SERVICE)
            .characteristic(GAP_SERVICE, DEVICE_NAME, CharacteristicProperties::notify_only())
            .characteristic(
                BATTERY_SERVICE,
                BATTERY_LEVEL,
                CharacteristicProperties::notify_only(),
            )
            .latency(Duration::from_millis(100))
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_characteristic_discovery_single_call() {
    let transport = transport();
    let connection = Connection::with_defaults(transport.clone());
    let battery = connection.service(BATTERY_SERVICE).await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let battery = battery.clone();
            tokio::spawn(async move { battery.characteristics().await })
        })
        .collect();
    let mut lists = Vec::new();
    for task in tasks {
        lists.push(task.await.unwrap().unwrap());
    }

    assert_eq!(transport.characteristic_calls(), 1);
    let first: Vec<_> = lists[0].iter().map(|h| h.id()).collect();
    for list in &lists {
        let ids: Vec<_> = list.iter().map(|h| h.id()).collect();
        assert_eq!(ids, first);
    }
}

#[tokio::test(start_paused = true)]
async fn test_late_observer_replays_without_new_call() {
    let transport = transport();
    let connection = Connection::with_defaults(transport.clone());
    let battery = connection.service(BATTERY_SERVICE).await.unwrap();

    let first = battery.discover_characteristics();
    let early = first.result().await.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    let late = battery.discover_characteristics();
    assert!(late.is_complete());
    let replayed = late.result().await.unwrap();

    assert_eq!(transport.characteristic_calls(), 1);
    assert_eq!(replayed.len(), early.len());
    assert_eq!(replayed[0].id(), early[0].id());
}

#[tokio::test(start_paused = true)]
async fn test_observer_joins_in_flight_discovery() {
    let transport = transport();
    let connection = Connection::with_defaults(transport.clone());
    let battery = connection.service(BATTERY_SERVICE).await.unwrap();

    let first = battery.discover_characteristics();
    let pending = tokio::spawn({
        let first = first.clone();
        async move { first.result().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!first.is_complete());

    let joined = battery.discover_characteristics();
    assert_eq!(joined.result().await.unwrap().len(), 1);
    assert!(pending.await.unwrap().is_ok());
    assert_eq!(transport.characteristic_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failure_reaches_all_observers_without_retry() {
    let transport = transport();
    transport.set_fail_message("gatt busy").await;
    let connection = Connection::with_defaults(transport.clone());
    let battery = connection.service(BATTERY_SERVICE).await.unwrap();
    let mut events = connection.events();

    transport.set_fail_characteristics(true);
    let observers: Vec<_> = (0..4).map(|_| battery.discover_characteristics()).collect();
    for observer in &observers {
        match observer.result().await {
            Err(Error::Transport {
                source: TransportError::Other(message),
                ..
            }) => assert_eq!(message, "gatt busy"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    // Still failing for new callers while the failed attempt is observed,
    // even though the transport has recovered.
    transport.set_fail_characteristics(false);
    assert!(battery.characteristics().await.is_err());
    assert_eq!(transport.characteristic_calls(), 1);

    let failures = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, LinkEvent::DiscoveryFailed { service: Some(s), .. } if *s == BATTERY_SERVICE))
        .count();
    assert_eq!(failures, 1);

    drop(observers);
    assert_eq!(battery.characteristics().await.unwrap().len(), 1);
    assert_eq!(transport.characteristic_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_retries_failed_discovery() {
    let transport = transport();
    let connection = Connection::with_defaults(transport.clone());
    let battery = connection.service(BATTERY_SERVICE).await.unwrap();

    transport.set_fail_characteristics(true);
    let failed = battery.discover_characteristics();
    assert!(failed.result().await.is_err());

    transport.set_fail_characteristics(false);
    battery.invalidate();
    assert!(failed.is_stale());
    assert!(battery.characteristics().await.is_ok());
    assert_eq!(transport.characteristic_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_to_zero_observers_rediscovers() {
    let transport = transport();
    let connection = Connection::with_defaults(transport.clone());
    let battery = connection.service(BATTERY_SERVICE).await.unwrap();

    let handles = battery.characteristics().await.unwrap();
    assert_eq!(transport.characteristic_calls(), 1);

    // Handles keep no observer alive; only `Discovery` values do.
    let fresh = battery.characteristics().await.unwrap();
    assert_eq!(transport.characteristic_calls(), 2);
    assert!(handles[0].is_stale());
    assert!(!fresh[0].is_stale());
    assert_eq!(fresh[0].generation(), handles[0].generation() + 1);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_service_lookup_marks_earlier_handles_stale() {
    let transport = transport();
    let connection = Connection::with_defaults(transport.clone());

    let first_service = connection.service(BATTERY_SERVICE).await.unwrap();
    let first = first_service.characteristic(BATTERY_LEVEL).await.unwrap();
    assert!(!first.is_stale());

    let second_service = connection.service(BATTERY_SERVICE).await.unwrap();
    let second = second_service.characteristic(BATTERY_LEVEL).await.unwrap();

    assert_eq!(transport.service_calls(), 2);
    assert!(first_service.is_stale());
    assert!(first.is_stale());
    assert!(!second_service.is_stale());
    assert!(!second.is_stale());
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_call_in_flight_across_invalidation() {
    let transport = transport();
    let connection = Connection::with_defaults(transport.clone());
    let battery = connection.service(BATTERY_SERVICE).await.unwrap();

    let old = battery.discover_characteristics();
    let old_task = tokio::spawn({
        let old = old.clone();
        async move { old.result().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    battery.invalidate();
    let fresh = battery.discover_characteristics();
    let (old_result, fresh_result) = tokio::join!(old_task, fresh.result());

    assert!(old_result.unwrap().is_ok());
    assert!(fresh_result.is_ok());
    assert_eq!(transport.characteristic_calls(), 2);
    assert_eq!(transport.max_concurrent_characteristic_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stream_yields_handles_in_order() {
    let connection = Connection::with_defaults(transport());
    let uuids: Vec<_> = connection
        .discover_services()
        .into_stream()
        .map(|service| service.unwrap().uuid())
        .collect()
        .await;
    assert_eq!(uuids, vec![GAP_SERVICE, BATTERY_SERVICE]);
}

#[tokio::test(start_paused = true)]
async fn test_discovered_handles_drive_keep_alive() {
    let connection = Connection::with_defaults(transport());
    connection.connect().await;

    let handles = connection
        .service(GAP_SERVICE)
        .await
        .unwrap()
        .characteristics()
        .await
        .unwrap();
    let name = handles[0].clone();
    assert_eq!(name.service().map(|s| s.uuid()), None);

    name.enable_notifications().await.unwrap();
    assert_eq!(connection.state().await, KeepAliveState::Subscribed);

    let report = connection.disconnect().await;
    assert_eq!(report.unsubscribed, 1);
    assert!(!name.is_notifying().await);
}
