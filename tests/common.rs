//! Shared harness for integration tests.
//!
//! [`TestServer`] runs the real router on an ephemeral port with in-memory
//! storage. It is stopped when dropped.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use sensorlink::client::{HttpTransmitter, Transmitter};
use sensorlink::config::ServerConfig;
use sensorlink::error::TransmitError;
use sensorlink::server::{self, AppState, StorageService};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const TOKEN: &str = "integration-token-0123456789";
pub const KEY: [u8; 32] = [42u8; 32];

pub fn key_base64() -> String {
    STANDARD.encode(KEY)
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(ServerConfig::default()).await
    }

    /// Start with `config`, forcing the test token.
    pub async fn start_with(mut config: ServerConfig) -> anyhow::Result<Self> {
        config.api_token = TOKEN.to_string();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = AppState::new(StorageService::memory(), &config);

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server::serve(listener, state.clone(), async {
            let _ = rx.await;
        }));

        Ok(Self {
            addr,
            state,
            shutdown: Some(tx),
            task: Some(task),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn transmitter(&self, device_id: &str) -> HttpTransmitter {
        HttpTransmitter::new(&self.endpoint(), device_id, TOKEN, Duration::from_secs(5))
            .expect("Failed to build transmitter")
    }

    /// Number of blobs stored for a device.
    pub async fn stored(&self, device_id: &str) -> usize {
        self.state
            .storage
            .list_all(&format!("{device_id}/"))
            .await
            .expect("Failed to list storage")
            .len()
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Wraps a transmitter and fails the first `failures` sends with a network
/// error, as if the device were offline.
pub struct FlakyTransmitter {
    inner: Arc<dyn Transmitter>,
    failures_left: Mutex<usize>,
    attempts: Mutex<usize>,
}

impl FlakyTransmitter {
    pub fn new(inner: impl Transmitter + 'static, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(inner),
            failures_left: Mutex::new(failures),
            attempts: Mutex::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    pub fn go_offline(&self, failures: usize) {
        *self.failures_left.lock() = failures;
    }
}

#[async_trait]
impl Transmitter for FlakyTransmitter {
    async fn send(&self, blob: &[u8]) -> Result<(), TransmitError> {
        *self.attempts.lock() += 1;
        {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(TransmitError::Network("network is down".to_string()));
            }
        }
        self.inner.send(blob).await
    }
}
