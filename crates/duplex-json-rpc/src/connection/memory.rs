//! In-process connection pair
//!
//! Two [`MemoryConnection`]s created by [`MemoryConnection::pair`] are wired
//! back to back over unbounded channels: whatever one side writes, the other
//! reads, one message at a time. Closing either side closes the pair: reads
//! and writes on both ends then fail with [`ConnectionError::Closed`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::{Connection, ConnectionError};
use crate::session::Session;

/// One end of an in-memory message pipe
#[derive(Debug)]
pub struct MemoryConnection {
    id: String,
    session: Session,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
    deadline: Mutex<Option<Duration>>,
    closed: CancellationToken,
}

impl MemoryConnection {
    /// Create two connected ends sharing one close signal
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        (
            Self::new(a_tx, b_rx, closed.clone()),
            Self::new(b_tx, a_rx, closed),
        )
    }

    fn new(
        outbound: mpsc::UnboundedSender<Bytes>,
        inbound: mpsc::UnboundedReceiver<Bytes>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            session: Session::new(),
            outbound: Mutex::new(Some(outbound)),
            inbound: tokio::sync::Mutex::new(inbound),
            deadline: Mutex::new(None),
            closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn read(&self) -> Result<Bytes, ConnectionError> {
        let deadline = *self.deadline.lock();
        let mut inbound = self.inbound.lock().await;

        let receive = async {
            tokio::select! {
                _ = self.closed.cancelled() => Err(ConnectionError::Closed),
                message = inbound.recv() => message.ok_or(ConnectionError::Closed),
            }
        };

        match deadline {
            Some(limit) => tokio::time::timeout(limit, receive)
                .await
                .map_err(|_| ConnectionError::DeadlineExceeded)?,
            None => receive.await,
        }
    }

    async fn write(&self, message: &[u8]) -> Result<(), ConnectionError> {
        if self.closed.is_cancelled() {
            return Err(ConnectionError::Closed);
        }
        match self.outbound.lock().as_ref() {
            Some(tx) => tx
                .send(Bytes::copy_from_slice(message))
                .map_err(|_| ConnectionError::Closed),
            None => Err(ConnectionError::Closed),
        }
    }

    fn set_deadline(&self, deadline: Option<Duration>) {
        *self.deadline.lock() = deadline;
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        debug!(conn_id = %self.id, "closing memory connection");
        // the token is shared, so the peer stops reading and writing too
        self.closed.cancel();
        self.outbound.lock().take();
        Ok(())
    }
}
