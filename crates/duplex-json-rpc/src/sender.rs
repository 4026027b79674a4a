//! Outbound messages and response correlation
//!
//! A [`Sender`] writes requests, notifications and responses to one
//! connection. Every request it sends gets a fresh id and an entry in the
//! sender's pending registry; when the matching response arrives, the
//! correlator at the end of the response chain removes that entry and runs
//! the callback stored in it. Each callback runs at most once: lookup and
//! removal are one step, so a duplicate response finds nothing and is
//! dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::EndpointConfig;
use crate::connection::Connection;
use crate::context::ResCtx;
use crate::error::{DecodeError, Error, RpcError, RpcResult, SendError};
use crate::message::to_raw_payload;
use crate::middleware::{HandlerResult, ResponseHandler};
use crate::notification::Notification;
use crate::request::Request;
use crate::response::Response;

/// Callback run with the response to a request sent by [`Sender::send_request`]
pub type ResponseCallback =
    Box<dyn for<'a> FnOnce(&'a mut ResCtx) -> BoxFuture<'a, HandlerResult> + Send>;

/// Source of request ids. Ids must not repeat while a request with the same
/// id is still awaiting its response.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs in their 32-character simple form
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Decimal counter ids ("1", "2", ...), handy for tests and logs
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

struct PendingEntry {
    method: String,
    callback: ResponseCallback,
    registered_at: Instant,
}

/// Requests awaiting a response, keyed by request id
struct PendingResponses {
    entries: Mutex<HashMap<String, PendingEntry>>,
    limit: Option<usize>,
}

impl PendingResponses {
    fn new(limit: Option<usize>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            limit,
        }
    }

    fn insert(&self, id: &str, entry: PendingEntry) -> RpcResult<()> {
        let mut entries = self.entries.lock();
        if let Some(limit) = self.limit {
            if entries.len() >= limit {
                return Err(Error::TooManyPending(limit));
            }
        }
        if entries.contains_key(id) {
            return Err(Error::DuplicateRequestId(id.to_string()));
        }
        entries.insert(id.to_string(), entry);
        Ok(())
    }

    /// Remove and return the entry for `id` in one step
    fn take(&self, id: &str) -> Option<PendingEntry> {
        self.entries.lock().remove(id)
    }

    fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn drain(&self) -> Vec<(String, PendingEntry)> {
        self.entries.lock().drain().collect()
    }
}

struct SenderInner {
    conn: Arc<dyn Connection>,
    pending: PendingResponses,
    ids: Arc<dyn IdGenerator>,
    config: EndpointConfig,
}

/// Writes outbound messages for one connection and tracks the requests it
/// has sent. Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct Sender {
    inner: Arc<SenderInner>,
}

impl Sender {
    pub fn new(conn: Arc<dyn Connection>, config: EndpointConfig) -> Self {
        Self::with_id_generator(conn, config, Arc::new(UuidIdGenerator))
    }

    pub fn with_id_generator(
        conn: Arc<dyn Connection>,
        config: EndpointConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                pending: PendingResponses::new(config.max_pending_requests),
                conn,
                ids,
                config,
            }),
        }
    }

    pub fn connection_id(&self) -> &str {
        self.inner.conn.id()
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Send a request and register `on_response` to run when its response
    /// arrives. Returns the id the request was sent with.
    ///
    /// On error nothing stays registered and the callback never runs. With
    /// [`EndpointConfig::request_timeout`] set, the callback is dropped if no
    /// response arrives in time.
    ///
    /// ```rust,no_run
    /// # async fn example(sender: duplex_json_rpc::Sender) -> duplex_json_rpc::RpcResult<()> {
    /// use serde_json::json;
    ///
    /// let id = sender
    ///     .send_request("echo", &json!({"message": "hi"}), |ctx| {
    ///         Box::pin(async move {
    ///             let reply: Option<serde_json::Value> = ctx.result()?;
    ///             tracing::info!(?reply, "echoed");
    ///             Ok(())
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = id;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send_request<P, F>(&self, method: &str, params: &P, on_response: F) -> RpcResult<String>
    where
        P: Serialize + ?Sized,
        F: for<'a> FnOnce(&'a mut ResCtx) -> BoxFuture<'a, HandlerResult> + Send + 'static,
    {
        let params = to_raw_payload(params).map_err(SendError::Serialize)?;
        let id = self.start_request(method, params, Box::new(on_response)).await?;
        if let Some(timeout) = self.inner.config.request_timeout {
            self.schedule_eviction(id.clone(), timeout);
        }
        Ok(id)
    }

    /// Send a request and wait for its response, decoded into `T`.
    ///
    /// A remote error comes back as [`Error::Rpc`]. Never await this from a
    /// handler running on the same connection: the response could only be
    /// read once that handler returns.
    pub async fn call<P, T>(&self, method: &str, params: &P) -> RpcResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        let params = to_raw_payload(params).map_err(SendError::Serialize)?;
        let (tx, rx) = oneshot::channel::<RpcResult<T>>();

        let callback = response_callback(move |ctx| {
            let outcome = match ctx.take_error() {
                Some(error) => Err(Error::Rpc(error)),
                None => decode_call_result(ctx),
            };
            // the caller may have given up already
            let _ = tx.send(outcome);
            Box::pin(async { Ok(()) })
        });

        let id = self.start_request(method, params, callback).await?;

        match self.inner.config.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome.unwrap_or_else(|_| Err(Error::Abandoned(id))),
                Err(_) => {
                    self.inner.pending.take(&id);
                    warn!(
                        conn_id = %self.connection_id(),
                        request_id = %id,
                        method = %method,
                        timeout_ms = limit.as_millis() as u64,
                        "call timed out"
                    );
                    Err(Error::Timeout(id))
                }
            },
            None => rx.await.unwrap_or_else(|_| Err(Error::Abandoned(id))),
        }
    }

    pub async fn send_notification<P>(&self, method: &str, params: &P) -> RpcResult<()>
    where
        P: Serialize + ?Sized,
    {
        let notification = Notification::with_params(method, params).map_err(SendError::Serialize)?;
        let bytes = notification.to_bytes().map_err(SendError::Serialize)?;
        self.write_message(&bytes).await
    }

    /// Answer a request received on this connection. A present `error` wins
    /// over `result`. The id is written as given.
    pub async fn send_response<R>(&self, id: &str, result: &R, error: Option<RpcError>) -> RpcResult<()>
    where
        R: Serialize + ?Sized,
    {
        let response = match error {
            Some(error) => Response::error(id, error),
            None => Response::with_result(id, result).map_err(SendError::Serialize)?,
        };
        self.write_response(&response).await
    }

    /// Forget a pending request. Its callback will never run.
    pub fn cancel(&self, id: &str) -> bool {
        let removed = self.inner.pending.take(id).is_some();
        if removed {
            debug!(conn_id = %self.connection_id(), request_id = %id, "cancelled pending request");
        }
        removed
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.inner.pending.contains(id)
    }

    /// Drop every pending callback without running it. Returns how many
    /// requests were still waiting.
    pub fn abandon_pending(&self) -> usize {
        let abandoned = self.inner.pending.drain();
        if !abandoned.is_empty() {
            debug!(
                conn_id = %self.connection_id(),
                count = abandoned.len(),
                "abandoning pending requests"
            );
        }
        abandoned.len()
    }

    pub(crate) async fn write_response(&self, response: &Response) -> RpcResult<()> {
        let bytes = response.to_bytes().map_err(SendError::Serialize)?;
        self.write_message(&bytes).await
    }

    pub(crate) fn correlator(&self) -> Correlator {
        Correlator {
            sender: self.clone(),
        }
    }

    async fn start_request(
        &self,
        method: &str,
        params: Option<Box<RawValue>>,
        callback: ResponseCallback,
    ) -> RpcResult<String> {
        let id = self.inner.ids.next_id();
        let request = Request::new(id.clone(), method, params);
        let bytes = request.to_bytes().map_err(SendError::Serialize)?;

        // registered before the write so a fast response always finds it
        self.inner.pending.insert(
            &id,
            PendingEntry {
                method: method.to_string(),
                callback,
                registered_at: Instant::now(),
            },
        )?;

        if let Err(e) = self.write_message(&bytes).await {
            self.inner.pending.take(&id);
            return Err(e);
        }

        debug!(conn_id = %self.connection_id(), request_id = %id, method = %method, "request sent");
        Ok(id)
    }

    fn schedule_eviction(&self, id: String, timeout: Duration) {
        let inner: Weak<SenderInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Some(entry) = inner.pending.take(&id) {
                warn!(
                    conn_id = %inner.conn.id(),
                    request_id = %id,
                    method = %entry.method,
                    waited_ms = entry.registered_at.elapsed().as_millis() as u64,
                    "no response in time, dropping callback"
                );
            }
        });
    }

    async fn write_message(&self, bytes: &[u8]) -> RpcResult<()> {
        if self.inner.config.log_messages {
            trace!(
                conn_id = %self.connection_id(),
                payload = %String::from_utf8_lossy(bytes),
                "outbound message"
            );
        }
        self.inner
            .conn
            .write(bytes)
            .await
            .map_err(|e| Error::Send(SendError::Write(e)))
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("conn_id", &self.connection_id())
            .field("pending", &self.pending_count())
            .finish()
    }
}

fn response_callback<F>(f: F) -> ResponseCallback
where
    F: for<'a> FnOnce(&'a mut ResCtx) -> BoxFuture<'a, HandlerResult> + Send + 'static,
{
    Box::new(f)
}

fn decode_call_result<T: DeserializeOwned>(ctx: &ResCtx) -> RpcResult<T> {
    match ctx.result::<T>()? {
        Some(value) => Ok(value),
        // a response carrying neither result nor error decodes like `null`
        None => serde_json::from_value(serde_json::Value::Null)
            .map_err(|e| Error::Decode(DecodeError::Result(e))),
    }
}

/// Terminal link of the response chain: hands each response to the
/// callback of the request it answers
pub(crate) struct Correlator {
    sender: Sender,
}

#[async_trait]
impl ResponseHandler for Correlator {
    async fn handle(&self, ctx: &mut ResCtx) -> HandlerResult {
        match self.sender.inner.pending.take(ctx.id()) {
            Some(entry) => {
                debug!(
                    conn_id = %ctx.connection_id(),
                    request_id = %ctx.id(),
                    method = %entry.method,
                    elapsed_ms = entry.registered_at.elapsed().as_millis() as u64,
                    "response matched"
                );
                (entry.callback)(ctx).await
            }
            None => {
                debug!(
                    conn_id = %ctx.connection_id(),
                    request_id = %ctx.id(),
                    "dropping response with no pending request"
                );
                Ok(())
            }
        }
    }
}
