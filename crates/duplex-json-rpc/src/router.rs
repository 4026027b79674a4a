//! Method-name routing on top of the middleware chain
//!
//! A [`Router`] is a single link in the request chain and a single link in
//! the notification chain. Each link looks up the message's method and hands
//! the context to the handler registered for it. Unmatched methods fall
//! through to the next link, so middleware registered after the router still
//! sees them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::context::{NotCtx, ReqCtx};
use crate::middleware::{HandlerResult, Middleware, NotificationHandler, RequestHandler};

/// Routes requests and notifications to one handler per method name
///
/// The router registers itself with the [`Middleware`] when it is created,
/// which fixes its place in the chain: handlers registered earlier run
/// before routing, handlers registered later only run if the routed handler
/// (or the fall-through for an unknown method) calls `next()`.
///
/// Registering a second handler for the same method replaces the first.
///
/// ```rust
/// use duplex_json_rpc::middleware::{Middleware, request_fn};
/// use duplex_json_rpc::Router;
///
/// let middleware = Middleware::new();
/// let router = Router::new(&middleware);
///
/// router.route_request("ping", request_fn(|ctx| {
///     Box::pin(async move { ctx.set_result("pong")?; ctx.next().await })
/// }));
///
/// assert!(router.has_request_route("ping"));
/// assert_eq!(middleware.request_handler_count(), 1);
/// ```
#[derive(Clone)]
pub struct Router {
    routes: Arc<RouteTable>,
}

#[derive(Default)]
struct RouteTable {
    requests: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    notifications: RwLock<HashMap<String, Arc<dyn NotificationHandler>>>,
}

impl Router {
    pub fn new(middleware: &Middleware) -> Self {
        let router = Self {
            routes: Arc::new(RouteTable::default()),
        };
        middleware.register_request_handler(Arc::new(router.clone()));
        middleware.register_notification_handler(Arc::new(router.clone()));
        router
    }

    /// Route requests for `method` to `handler`, replacing any previous route
    pub fn route_request(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        let method = method.into();
        if self.routes.requests.write().insert(method.clone(), handler).is_some() {
            debug!(method = %method, "replaced request route");
        }
    }

    /// Route notifications for `method` to `handler`, replacing any previous route
    pub fn route_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        let method = method.into();
        if self
            .routes
            .notifications
            .write()
            .insert(method.clone(), handler)
            .is_some()
        {
            debug!(method = %method, "replaced notification route");
        }
    }

    pub fn has_request_route(&self, method: &str) -> bool {
        self.routes.requests.read().contains_key(method)
    }

    pub fn has_notification_route(&self, method: &str) -> bool {
        self.routes.notifications.read().contains_key(method)
    }

    /// Routed request methods, sorted
    pub fn request_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.routes.requests.read().keys().cloned().collect();
        methods.sort();
        methods
    }

    /// Routed notification methods, sorted
    pub fn notification_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.routes.notifications.read().keys().cloned().collect();
        methods.sort();
        methods
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("requests", &self.request_methods())
            .field("notifications", &self.notification_methods())
            .finish()
    }
}

#[async_trait]
impl RequestHandler for Router {
    async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult {
        let route = self.routes.requests.read().get(ctx.method()).cloned();
        match route {
            Some(handler) => handler.handle(ctx).await,
            None => ctx.next().await,
        }
    }
}

#[async_trait]
impl NotificationHandler for Router {
    async fn handle(&self, ctx: &mut NotCtx) -> HandlerResult {
        let route = self.routes.notifications.read().get(ctx.method()).cloned();
        match route {
            Some(handler) => handler.handle(ctx).await,
            None => ctx.next().await,
        }
    }
}
