//! One connection bound to a middleware chain and a sender

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::config::EndpointConfig;
use crate::connection::{Connection, ConnectionError};
use crate::context::ResCtx;
use crate::error::{Error, RpcError, RpcResult};
use crate::message::Message;
use crate::middleware::{HandlerResult, Middleware};
use crate::sender::Sender;
use crate::session::Session;

/// Protocol endpoint for a single connection
///
/// Inbound messages read from the connection are classified and run through
/// the shared [`Middleware`]; outbound messages go through the endpoint's own
/// [`Sender`], which also owns the registry of requests awaiting a response.
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct Endpoint {
    conn: Arc<dyn Connection>,
    middleware: Middleware,
    sender: Sender,
    config: EndpointConfig,
}

impl Endpoint {
    pub fn new(conn: Arc<dyn Connection>, middleware: Middleware, config: EndpointConfig) -> Self {
        let sender = Sender::new(conn.clone(), config.clone());
        Self::with_sender(conn, middleware, sender)
    }

    /// Build an endpoint around an existing sender, e.g. one with a custom
    /// [`IdGenerator`](crate::IdGenerator)
    pub fn with_sender(conn: Arc<dyn Connection>, middleware: Middleware, sender: Sender) -> Self {
        let config = sender.config().clone();
        Self {
            conn,
            middleware,
            sender,
            config,
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn connection_id(&self) -> &str {
        self.conn.id()
    }

    pub fn session(&self) -> &Session {
        self.conn.session()
    }

    pub fn middleware(&self) -> &Middleware {
        &self.middleware
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Classify one inbound payload and run it through the chain for its kind.
    ///
    /// Malformed payloads are rejected here and never reach a handler. A
    /// handler error is returned as is.
    pub async fn dispatch(&self, bytes: &[u8]) -> RpcResult<()> {
        if let Some(limit) = self.config.max_message_size {
            if bytes.len() > limit {
                return Err(Error::MessageTooLarge {
                    size: bytes.len(),
                    limit,
                });
            }
        }

        if self.config.log_messages {
            trace!(
                conn_id = %self.connection_id(),
                payload = %String::from_utf8_lossy(bytes),
                "inbound message"
            );
        }

        let message = Message::classify(bytes)?;
        self.middleware
            .dispatch(message, &self.conn, &self.sender)
            .await
    }

    /// Read and dispatch messages until the connection closes.
    ///
    /// Messages are handled one at a time in arrival order. A message that
    /// fails to dispatch is logged and skipped. Any read error other than a
    /// closed connection (including an expired deadline) ends the loop and is
    /// returned. Requests still awaiting a response when the loop ends are
    /// abandoned.
    pub async fn run(&self) -> RpcResult<()> {
        debug!(conn_id = %self.connection_id(), "endpoint started");

        let outcome = loop {
            match self.conn.read().await {
                Ok(bytes) => {
                    if let Err(e) = self.dispatch(&bytes).await {
                        warn!(
                            conn_id = %self.connection_id(),
                            error = %e,
                            "failed to dispatch inbound message"
                        );
                    }
                }
                Err(ConnectionError::Closed) => break Ok(()),
                Err(e) => break Err(Error::Connection(e)),
            }
        };

        let abandoned = self.sender.abandon_pending();
        debug!(conn_id = %self.connection_id(), abandoned, "endpoint stopped");
        outcome
    }

    /// Abandon every pending request and close the connection
    pub async fn close(&self) -> RpcResult<()> {
        self.sender.abandon_pending();
        self.conn.close().await?;
        debug!(conn_id = %self.connection_id(), "endpoint closed");
        Ok(())
    }

    pub fn set_deadline(&self, deadline: Option<Duration>) {
        self.conn.set_deadline(deadline);
    }

    pub async fn send_request<P, F>(&self, method: &str, params: &P, on_response: F) -> RpcResult<String>
    where
        P: Serialize + ?Sized,
        F: for<'a> FnOnce(&'a mut ResCtx) -> BoxFuture<'a, HandlerResult> + Send + 'static,
    {
        self.sender.send_request(method, params, on_response).await
    }

    pub async fn call<P, T>(&self, method: &str, params: &P) -> RpcResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        self.sender.call(method, params).await
    }

    pub async fn send_notification<P>(&self, method: &str, params: &P) -> RpcResult<()>
    where
        P: Serialize + ?Sized,
    {
        self.sender.send_notification(method, params).await
    }

    pub async fn send_response<R>(&self, id: &str, result: &R, error: Option<RpcError>) -> RpcResult<()>
    where
        R: Serialize + ?Sized,
    {
        self.sender.send_response(id, result, error).await
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("conn_id", &self.connection_id())
            .field("middleware", &self.middleware)
            .field("pending", &self.sender.pending_count())
            .finish()
    }
}
