//! Connection abstraction consumed by the protocol engine
//!
//! The engine never dials, listens or frames bytes itself. It only needs a
//! connection that can hand over one complete message per [`Connection::read`]
//! and accept one complete message per [`Connection::write`]. Socket and TLS
//! transports live outside this crate; [`MemoryConnection`] is provided for
//! in-process pairs and tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::session::Session;

pub mod memory;

pub use memory::MemoryConnection;

/// Transport-level failures reported by a [`Connection`]
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error("connection deadline exceeded")]
    DeadlineExceeded,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ConnectionError {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Full-duplex message connection.
///
/// Implementations must serialize concurrent writes so that two messages are
/// never interleaved on the wire.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable unique identifier for the lifetime of the connection
    fn id(&self) -> &str;

    /// Key/value store scoped to this connection
    fn session(&self) -> &Session;

    /// Block until one complete message is available.
    ///
    /// Returns [`ConnectionError::Closed`] once the connection is closed by
    /// either side.
    async fn read(&self) -> Result<Bytes, ConnectionError>;

    /// Write one complete message
    async fn write(&self, message: &[u8]) -> Result<(), ConnectionError>;

    /// Limit how long a single read may block. `None` removes the limit.
    fn set_deadline(&self, deadline: Option<Duration>);

    async fn close(&self) -> Result<(), ConnectionError>;
}
