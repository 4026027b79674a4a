//! Shared helpers for the integration tests
//!
//! Most tests drive one side of a [`MemoryConnection`] pair by hand, writing
//! raw JSON and reading back whatever the engine under test produced.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use duplex_json_rpc::{Connection, ConnectionError, MemoryConnection};
use parking_lot::Mutex;
use serde_json::Value;

/// How long a peer waits before concluding that nothing was sent
pub const SILENCE: Duration = Duration::from_millis(100);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duplex_json_rpc=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub async fn send_json(peer: &MemoryConnection, message: Value) {
    let bytes = serde_json::to_vec(&message).expect("serializable test message");
    peer.write(&bytes).await.expect("peer write");
}

pub async fn recv_json(peer: &MemoryConnection) -> Value {
    let bytes = peer.read().await.expect("peer read");
    serde_json::from_slice(&bytes).expect("engine wrote valid JSON")
}

/// Assert that nothing arrives on `peer` for a while
pub async fn expect_silence(peer: &MemoryConnection) {
    peer.set_deadline(Some(SILENCE));
    let outcome = peer.read().await;
    peer.set_deadline(None);
    match outcome {
        Err(ConnectionError::DeadlineExceeded) => {}
        Ok(bytes) => panic!(
            "expected silence, got {}",
            String::from_utf8_lossy(&bytes)
        ),
        Err(e) => panic!("expected silence, got error {}", e),
    }
}

/// Ordered record of events shared between handlers and assertions
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
