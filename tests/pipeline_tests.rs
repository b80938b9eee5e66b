//! End-to-end delivery: device coordinator to a live server and back out
//! through the consumer.

#[path = "common.rs"]
mod common;

use chrono::{DateTime, TimeZone, Utc};
use common::{FlakyTransmitter, KEY, TOKEN, TestServer};
use sensorlink::client::{DeliveryCoordinator, DeliveryReport, DeliveryScheduler, Outbox};
use sensorlink::client::{JsonFileSource, RejectPolicy};
use sensorlink::consumer::{TelemetryApi, decode_entries, sort_chronologically};
use sensorlink::reading::Reading;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DEVICE: &str = "phone-01";

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, minute, 0).unwrap()
}

fn consumer(server: &TestServer) -> TelemetryApi {
    TelemetryApi::new(&server.endpoint(), DEVICE, TOKEN, Duration::from_secs(5)).unwrap()
}

async fn motion_states(server: &TestServer) -> Vec<String> {
    let entries = consumer(server).fetch(None, None).await.unwrap();
    let mut readings = decode_entries(&entries, &KEY);
    sort_chronologically(&mut readings);
    readings
        .iter()
        .map(|r| r.reading.motion_state().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_offline_reading_is_delivered_after_recovery() {
    let server = TestServer::start().await.unwrap();
    let tmp = TempDir::new().unwrap();
    let outbox = Outbox::open(tmp.path().join("outbox.redb")).unwrap();
    let transmitter = FlakyTransmitter::new(server.transmitter(DEVICE), 2);
    let coordinator = DeliveryCoordinator::new(&KEY, outbox.clone(), transmitter.clone());

    let t1 = Reading::new(at(1)).with_motion("walking", "high");
    let t2 = Reading::new(at(2)).with_motion("walking", "medium");
    let t3 = Reading::new(at(3)).with_motion("running", "high");

    assert!(matches!(
        coordinator.collect_and_deliver(t1).await,
        DeliveryReport::Buffered { .. }
    ));
    assert!(matches!(
        coordinator.collect_and_deliver(t2).await,
        DeliveryReport::Buffered { .. }
    ));
    assert_eq!(server.stored(DEVICE).await, 0);
    assert_eq!(coordinator.status().buffered, 2);

    let report = coordinator.collect_and_deliver(t3).await;
    assert_eq!(report, DeliveryReport::Delivered { flushed: 2, remaining: 0 });
    assert_eq!(outbox.count().unwrap(), 0);
    assert_eq!(server.stored(DEVICE).await, 3);
    assert_eq!(transmitter.attempts(), 5);

    // Backlog arrives oldest-first after the fresh blob.
    let entries = consumer(&server).fetch(None, None).await.unwrap();
    let newest_first: Vec<String> = decode_entries(&entries, &KEY)
        .iter()
        .map(|r| r.reading.timestamp.to_rfc3339())
        .collect();
    assert_eq!(
        newest_first,
        vec![at(2).to_rfc3339(), at(1).to_rfc3339(), at(3).to_rfc3339()]
    );

    assert_eq!(motion_states(&server).await, vec!["walking", "walking", "running"]);

    let status = coordinator.status();
    assert!(status.last_success.is_some());
    assert!(status.last_error.is_none());
}

#[tokio::test]
async fn test_single_buffered_reading_then_fresh_reading() {
    let server = TestServer::start().await.unwrap();
    let tmp = TempDir::new().unwrap();
    let outbox = Outbox::open(tmp.path().join("outbox.redb")).unwrap();
    let transmitter = FlakyTransmitter::new(server.transmitter(DEVICE), 1);
    let coordinator = DeliveryCoordinator::new(&KEY, outbox.clone(), transmitter);

    coordinator
        .collect_and_deliver(Reading::new(at(1)).with_motion("walking", "high"))
        .await;
    coordinator
        .collect_and_deliver(Reading::new(at(3)).with_motion("running", "high"))
        .await;

    assert_eq!(outbox.count().unwrap(), 0);
    assert_eq!(motion_states(&server).await, vec!["walking", "running"]);
}

#[tokio::test]
async fn test_outbox_survives_restart() {
    let server = TestServer::start().await.unwrap();
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("outbox.redb");

    {
        let outbox = Outbox::open(&path).unwrap();
        let offline = FlakyTransmitter::new(server.transmitter(DEVICE), usize::MAX);
        let coordinator = DeliveryCoordinator::new(&KEY, outbox, offline);
        coordinator
            .collect_and_deliver(Reading::new(at(1)).with_motion("stationary", "high"))
            .await;
    }

    let outbox = Outbox::open(&path).unwrap();
    assert_eq!(outbox.count().unwrap(), 1);
    let coordinator =
        DeliveryCoordinator::new(&KEY, outbox.clone(), Arc::new(server.transmitter(DEVICE)));
    assert_eq!(coordinator.flush_outbox().await, (1, 0));
    assert_eq!(motion_states(&server).await, vec!["stationary"]);
}

#[tokio::test]
async fn test_wrong_token_is_buffered_or_dropped_by_policy() {
    let server = TestServer::start().await.unwrap();
    let tmp = TempDir::new().unwrap();
    let bad = sensorlink::client::HttpTransmitter::new(
        &server.endpoint(),
        DEVICE,
        "wrong-token",
        Duration::from_secs(5),
    )
    .unwrap();
    let bad = Arc::new(bad);

    let outbox = Outbox::open(tmp.path().join("buffer.redb")).unwrap();
    let buffering = DeliveryCoordinator::new(&KEY, outbox.clone(), bad.clone());
    let reading = Reading::new(at(1)).with_motion("walking", "high");
    assert!(matches!(
        buffering.collect_and_deliver(reading.clone()).await,
        DeliveryReport::Buffered { .. }
    ));
    assert_eq!(outbox.count().unwrap(), 1);

    let outbox = Outbox::open(tmp.path().join("drop.redb")).unwrap();
    let dropping = DeliveryCoordinator::new(&KEY, outbox.clone(), bad)
        .with_reject_policy(RejectPolicy::Drop);
    assert_eq!(
        dropping.collect_and_deliver(reading).await,
        DeliveryReport::Dropped
    );
    assert_eq!(outbox.count().unwrap(), 0);
    assert!(
        dropping
            .status()
            .last_error
            .unwrap()
            .contains("configuration")
    );
    assert_eq!(server.stored(DEVICE).await, 0);
}

#[tokio::test]
async fn test_scheduler_delivers_from_reading_file() {
    let server = TestServer::start().await.unwrap();
    let tmp = TempDir::new().unwrap();
    let reading_path = tmp.path().join("reading.json");
    std::fs::write(
        &reading_path,
        r#"{"sensors": {"motion": {"state": "cycling", "confidence": "high"}}}"#,
    )
    .unwrap();

    let outbox = Outbox::open(tmp.path().join("outbox.redb")).unwrap();
    let coordinator = Arc::new(DeliveryCoordinator::new(
        &KEY,
        outbox,
        Arc::new(server.transmitter(DEVICE)),
    ));
    let handle = DeliveryScheduler::spawn(
        coordinator.clone(),
        Arc::new(JsonFileSource::new(&reading_path)),
        Duration::from_millis(50),
        Duration::from_secs(2),
    );

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(coordinator.status().running);
    handle.shutdown().await;
    assert!(!coordinator.status().running);

    let delivered = server.stored(DEVICE).await;
    assert!(delivered >= 2, "expected several cycles, got {delivered}");
    let states = motion_states(&server).await;
    assert!(states.iter().all(|s| s == "cycling"));
}
