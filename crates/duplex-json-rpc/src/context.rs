//! Per-message handler contexts
//!
//! Dispatch wraps every inbound message in a context that owns a snapshot of
//! the handler list and a cursor into it. Handlers call `next()` to run the
//! rest of the chain, which gives the usual onion shape: work before `next()`
//! runs on the way in, work after it runs on the way out, and not calling it
//! at all short-circuits the remaining handlers.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

use crate::connection::Connection;
use crate::error::{Error, RpcError, RpcResult, SendError};
use crate::middleware::{HandlerResult, NotificationHandler, RequestHandler, ResponseHandler};
use crate::notification::Notification;
use crate::request::{Request, decode_params};
use crate::response::{Response, decode_result};
use crate::sender::Sender;
use crate::session::Session;

/// Handler list snapshot plus a cursor that only moves forward
struct Chain<H: ?Sized> {
    handlers: Vec<Arc<H>>,
    position: usize,
}

impl<H: ?Sized> Chain<H> {
    fn new(handlers: Vec<Arc<H>>) -> Self {
        Self {
            handlers,
            position: 0,
        }
    }

    fn advance(&mut self) -> Option<Arc<H>> {
        let handler = self.handlers.get(self.position).cloned()?;
        self.position += 1;
        Some(handler)
    }
}

/// Context for an inbound request
pub struct ReqCtx {
    id: String,
    method: String,
    params: Option<Box<RawValue>>,
    result: Option<Box<RawValue>>,
    error: Option<RpcError>,
    conn: Arc<dyn Connection>,
    sender: Sender,
    chain: Chain<dyn RequestHandler>,
}

impl ReqCtx {
    pub(crate) fn new(
        request: Request,
        conn: Arc<dyn Connection>,
        sender: Sender,
        handlers: Vec<Arc<dyn RequestHandler>>,
    ) -> Self {
        Self {
            id: request.id,
            method: request.method,
            params: request.params,
            result: None,
            error: None,
            conn,
            sender,
            chain: Chain::new(handlers),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn raw_params(&self) -> Option<&RawValue> {
        self.params.as_deref()
    }

    /// Decode the request params into `T`; `Ok(None)` when there are none
    pub fn params<T: DeserializeOwned>(&self) -> RpcResult<Option<T>> {
        decode_params(self.params.as_deref())
    }

    /// Stage a successful result, replacing any staged result or error
    pub fn set_result<T: Serialize + ?Sized>(&mut self, result: &T) -> RpcResult<()> {
        let raw = serde_json::value::to_raw_value(result)
            .map_err(|e| Error::Send(SendError::Serialize(e)))?;
        self.result = Some(raw);
        self.error = None;
        Ok(())
    }

    /// Stage an error, replacing any staged result or error
    pub fn set_error(&mut self, error: RpcError) {
        self.error = Some(error);
        self.result = None;
    }

    pub fn staged_result(&self) -> Option<&RawValue> {
        self.result.as_deref()
    }

    pub fn staged_error(&self) -> Option<&RpcError> {
        self.error.as_ref()
    }

    /// True once a result or an error has been staged
    pub fn has_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Response that would be written if the chain ended now
    pub(crate) fn staged_response(&self) -> Option<Response> {
        if !self.has_response() {
            return None;
        }
        Some(Response::new(
            self.id.clone(),
            self.result.clone(),
            self.error.clone(),
        ))
    }

    pub fn session(&self) -> &Session {
        self.conn.session()
    }

    pub fn connection_id(&self) -> &str {
        self.conn.id()
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Number of handlers already entered for this message
    pub fn position(&self) -> usize {
        self.chain.position
    }

    /// Run the next handler in the chain. Returns `Ok(())` once the chain is
    /// exhausted; a handler is never entered twice for the same message.
    pub fn next(&mut self) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            match self.chain.advance() {
                Some(handler) => handler.handle(self).await,
                None => Ok(()),
            }
        })
    }
}

impl std::fmt::Debug for ReqCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqCtx")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("conn_id", &self.conn.id())
            .field("position", &self.chain.position)
            .field("has_response", &self.has_response())
            .finish()
    }
}

/// Context for an inbound notification. Notifications never produce a response.
pub struct NotCtx {
    method: String,
    params: Option<Box<RawValue>>,
    conn: Arc<dyn Connection>,
    sender: Sender,
    chain: Chain<dyn NotificationHandler>,
}

impl NotCtx {
    pub(crate) fn new(
        notification: Notification,
        conn: Arc<dyn Connection>,
        sender: Sender,
        handlers: Vec<Arc<dyn NotificationHandler>>,
    ) -> Self {
        Self {
            method: notification.method,
            params: notification.params,
            conn,
            sender,
            chain: Chain::new(handlers),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn raw_params(&self) -> Option<&RawValue> {
        self.params.as_deref()
    }

    pub fn params<T: DeserializeOwned>(&self) -> RpcResult<Option<T>> {
        decode_params(self.params.as_deref())
    }

    pub fn session(&self) -> &Session {
        self.conn.session()
    }

    pub fn connection_id(&self) -> &str {
        self.conn.id()
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn position(&self) -> usize {
        self.chain.position
    }

    pub fn next(&mut self) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            match self.chain.advance() {
                Some(handler) => handler.handle(self).await,
                None => Ok(()),
            }
        })
    }
}

impl std::fmt::Debug for NotCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotCtx")
            .field("method", &self.method)
            .field("conn_id", &self.conn.id())
            .field("position", &self.chain.position)
            .finish()
    }
}

/// Context for an inbound response, handed to response middleware and
/// finally to the callback registered when the request was sent
pub struct ResCtx {
    id: String,
    result: Option<Box<RawValue>>,
    error: Option<RpcError>,
    conn: Arc<dyn Connection>,
    sender: Sender,
    chain: Chain<dyn ResponseHandler>,
}

impl ResCtx {
    pub(crate) fn new(
        response: Response,
        conn: Arc<dyn Connection>,
        sender: Sender,
        handlers: Vec<Arc<dyn ResponseHandler>>,
    ) -> Self {
        Self {
            id: response.id,
            result: response.result,
            error: response.error,
            conn,
            sender,
            chain: Chain::new(handlers),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw_result(&self) -> Option<&RawValue> {
        self.result.as_deref()
    }

    /// Decode the response result into `T`; `Ok(None)` when there is none
    pub fn result<T: DeserializeOwned>(&self) -> RpcResult<Option<T>> {
        decode_result(self.result.as_deref())
    }

    pub fn error(&self) -> Option<&RpcError> {
        self.error.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn take_error(&mut self) -> Option<RpcError> {
        self.error.take()
    }

    pub fn session(&self) -> &Session {
        self.conn.session()
    }

    pub fn connection_id(&self) -> &str {
        self.conn.id()
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn position(&self) -> usize {
        self.chain.position
    }

    pub fn next(&mut self) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            match self.chain.advance() {
                Some(handler) => handler.handle(self).await,
                None => Ok(()),
            }
        })
    }
}

impl std::fmt::Debug for ResCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResCtx")
            .field("id", &self.id)
            .field("conn_id", &self.conn.id())
            .field("is_error", &self.is_error())
            .field("position", &self.chain.position)
            .finish()
    }
}
