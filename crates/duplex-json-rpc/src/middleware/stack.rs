//! Handler registry and chain dispatch

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{HandlerResult, NotificationHandler, RequestHandler, ResponseHandler};
use crate::connection::Connection;
use crate::context::{NotCtx, ReqCtx, ResCtx};
use crate::message::Message;
use crate::sender::Sender;

/// Ordered handler lists for the three message kinds
///
/// Registration is append-only and keeps insertion order. Each inbound
/// message is dispatched against a snapshot of the list taken when the
/// message arrives, so handlers registered while a message is in flight only
/// apply to later messages.
///
/// Cloning a `Middleware` yields another handle to the same lists; a
/// [`Server`](crate::Server) shares one registry across all its connections.
///
/// # Examples
///
/// ```rust
/// use duplex_json_rpc::middleware::{Middleware, request_fn};
///
/// let middleware = Middleware::new();
/// middleware.register_request_handler(request_fn(|ctx| {
///     Box::pin(async move {
///         tracing::info!(method = %ctx.method(), "inbound request");
///         ctx.next().await
///     })
/// }));
///
/// assert_eq!(middleware.request_handler_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct Middleware {
    registry: Arc<Registry>,
}

#[derive(Default)]
struct Registry {
    requests: RwLock<Vec<Arc<dyn RequestHandler>>>,
    notifications: RwLock<Vec<Arc<dyn NotificationHandler>>>,
    responses: RwLock<Vec<Arc<dyn ResponseHandler>>>,
}

impl Middleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the request chain
    pub fn register_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        self.registry.requests.write().push(handler);
    }

    /// Append a handler to the notification chain
    pub fn register_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        self.registry.notifications.write().push(handler);
    }

    /// Append a handler to the response chain. Response handlers run before
    /// the response is handed to the callback of the request it answers.
    pub fn register_response_handler(&self, handler: Arc<dyn ResponseHandler>) {
        self.registry.responses.write().push(handler);
    }

    pub fn request_handler_count(&self) -> usize {
        self.registry.requests.read().len()
    }

    pub fn notification_handler_count(&self) -> usize {
        self.registry.notifications.read().len()
    }

    pub fn response_handler_count(&self) -> usize {
        self.registry.responses.read().len()
    }

    /// Run one classified message through the chain for its kind
    pub(crate) async fn dispatch(
        &self,
        message: Message,
        conn: &Arc<dyn Connection>,
        sender: &Sender,
    ) -> HandlerResult {
        match message {
            Message::Request(request) => {
                let mut handlers = self.registry.requests.read().clone();
                handlers.push(Arc::new(ResponseWriter));
                let mut ctx = ReqCtx::new(request, conn.clone(), sender.clone(), handlers);
                ctx.next().await
            }
            Message::Notification(notification) => {
                let handlers = self.registry.notifications.read().clone();
                let mut ctx = NotCtx::new(notification, conn.clone(), sender.clone(), handlers);
                ctx.next().await
            }
            Message::Response(response) => {
                let mut handlers = self.registry.responses.read().clone();
                handlers.push(Arc::new(sender.correlator()));
                let mut ctx = ResCtx::new(response, conn.clone(), sender.clone(), handlers);
                ctx.next().await
            }
        }
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("requests", &self.request_handler_count())
            .field("notifications", &self.notification_handler_count())
            .field("responses", &self.response_handler_count())
            .finish()
    }
}

/// Last link of every request chain: writes whatever response was staged
struct ResponseWriter;

#[async_trait]
impl RequestHandler for ResponseWriter {
    async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult {
        match ctx.staged_response() {
            Some(response) => ctx.sender().write_response(&response).await,
            None => Ok(()),
        }
    }
}
