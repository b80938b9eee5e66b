//! Consumer client against a live server.

#[path = "common.rs"]
mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Duration as ChronoDuration, Utc};
use common::{KEY, TOKEN, TestServer};
use sensorlink::client::Transmitter;
use sensorlink::codec;
use sensorlink::config::ServerConfig;
use sensorlink::consumer::{
    ApiError, TelemetryApi, decode_entries, detect_transitions, sort_chronologically,
};
use sensorlink::reading::Reading;
use std::time::Duration;

const DEVICE: &str = "watch-7";

fn api(server: &TestServer, token: &str) -> TelemetryApi {
    TelemetryApi::new(&server.endpoint(), DEVICE, token, Duration::from_secs(5)).unwrap()
}

async fn ingest(server: &TestServer, reading: &Reading) {
    let blob = codec::encrypt(reading, &KEY).unwrap();
    server.transmitter(DEVICE).send(&blob).await.unwrap();
}

#[tokio::test]
async fn test_fetch_decrypt_and_detect_transitions() {
    let server = TestServer::start().await.unwrap();
    let start = Utc::now() - ChronoDuration::minutes(10);
    for (i, state) in ["stationary", "walking", "walking", "running"].iter().enumerate() {
        let reading = Reading::new(start + ChronoDuration::minutes(i as i64))
            .with_motion(*state, "high");
        ingest(&server, &reading).await;
    }

    let entries = api(&server, TOKEN).fetch(None, Some(10)).await.unwrap();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| STANDARD.decode(&e.data).is_ok()));

    let mut readings = decode_entries(&entries, &KEY);
    sort_chronologically(&mut readings);
    let transitions = detect_transitions(&readings);
    let pairs: Vec<(&str, &str)> = transitions
        .iter()
        .map(|t| (t.from.as_str(), t.to.as_str()))
        .collect();
    assert_eq!(pairs, vec![("stationary", "walking"), ("walking", "running")]);
}

#[tokio::test]
async fn test_undecryptable_entries_are_dropped() {
    let server = TestServer::start().await.unwrap();
    ingest(&server, &Reading::now().with_motion("walking", "high")).await;

    let foreign = codec::encrypt(&Reading::now().with_motion("x", "low"), &[1u8; 32]).unwrap();
    server.transmitter(DEVICE).send(&foreign).await.unwrap();
    server.transmitter(DEVICE).send(b"garbage").await.unwrap();

    let entries = api(&server, TOKEN).fetch(None, None).await.unwrap();
    assert_eq!(entries.len(), 3);
    let readings = decode_entries(&entries, &KEY);
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].reading.motion_state(), Some("walking"));
}

#[tokio::test]
async fn test_fetch_since_excludes_older_arrivals() {
    let server = TestServer::start().await.unwrap();
    ingest(&server, &Reading::now().with_motion("walking", "high")).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let cutoff = Utc::now();
    tokio::time::sleep(Duration::from_millis(20)).await;
    ingest(&server, &Reading::now().with_motion("running", "high")).await;

    let entries = api(&server, TOKEN).fetch(Some(cutoff), None).await.unwrap();
    let readings = decode_entries(&entries, &KEY);
    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].reading.motion_state(), Some("running"));
}

#[tokio::test]
async fn test_purge_before_and_all() {
    let server = TestServer::start().await.unwrap();
    for _ in 0..3 {
        ingest(&server, &Reading::now().with_motion("walking", "high")).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    let cutoff = Utc::now();
    tokio::time::sleep(Duration::from_millis(20)).await;
    ingest(&server, &Reading::now().with_motion("running", "high")).await;

    let client = api(&server, TOKEN);
    assert_eq!(client.purge(Some(cutoff)).await.unwrap(), 3);
    assert_eq!(server.stored(DEVICE).await, 1);
    assert_eq!(client.purge(None).await.unwrap(), 1);
    assert_eq!(server.stored(DEVICE).await, 0);
}

#[tokio::test]
async fn test_wrong_token_is_not_retried() {
    let server = TestServer::start().await.unwrap();
    let err = api(&server, "nope").fetch(None, None).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 401, .. }));
    assert!(!err.is_retriable());
}

#[tokio::test]
async fn test_rate_limited_consumer_gets_429() {
    let config = ServerConfig {
        rate_limit: 2,
        ..ServerConfig::default()
    };
    let server = TestServer::start_with(config).await.unwrap();
    let client = api(&server, TOKEN);

    client.fetch(None, None).await.unwrap();
    client.fetch(None, None).await.unwrap();
    let err = client.fetch(None, None).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 429, .. }));
}

#[tokio::test]
async fn test_health_over_the_wire() {
    let server = TestServer::start().await.unwrap();
    let body: serde_json::Value = reqwest::get(format!("{}/health", server.endpoint()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    server.stop().await;
}
