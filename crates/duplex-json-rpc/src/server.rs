//! Multi-connection composition root

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::connection::Connection;
use crate::context::ResCtx;
use crate::endpoint::Endpoint;
use crate::error::{Error, RpcError, RpcResult};
use crate::middleware::{
    HandlerResult, Middleware, NotificationHandler, RequestHandler, ResponseHandler,
};
use crate::router::Router;
use crate::session::Session;

/// JSON-RPC peer serving many connections with one set of handlers
///
/// Middleware and routes are registered once and shared by every attached
/// connection. Each connection still gets its own [`Endpoint`], with its own
/// session and its own registry of requests awaiting a response, so
/// server-initiated requests are addressed by connection id.
///
/// Accepting connections is left to the caller: hand each accepted
/// connection to [`Server::spawn_connection`] or [`Server::serve_connection`].
///
/// ```rust,no_run
/// use duplex_json_rpc::middleware::request_fn;
/// use duplex_json_rpc::{EndpointConfig, MemoryConnection, Server};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let server = Server::new(EndpointConfig::default());
/// server.route_request("ping", request_fn(|ctx| {
///     Box::pin(async move { ctx.set_result("pong")?; ctx.next().await })
/// }));
///
/// let (accepted, _client_side) = MemoryConnection::pair();
/// server.spawn_connection(Arc::new(accepted));
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    middleware: Middleware,
    router: OnceLock<Router>,
    config: EndpointConfig,
    connections: RwLock<HashMap<String, Endpoint>>,
}

impl Server {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                middleware: Middleware::new(),
                router: OnceLock::new(),
                config,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn middleware(&self) -> &Middleware {
        &self.inner.middleware
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    pub fn register_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        self.inner.middleware.register_request_handler(handler);
    }

    pub fn register_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        self.inner.middleware.register_notification_handler(handler);
    }

    pub fn register_response_handler(&self, handler: Arc<dyn ResponseHandler>) {
        self.inner.middleware.register_response_handler(handler);
    }

    /// The shared router, created and registered in the chain on first use
    pub fn router(&self) -> &Router {
        self.inner
            .router
            .get_or_init(|| Router::new(&self.inner.middleware))
    }

    pub fn route_request(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        self.router().route_request(method, handler);
    }

    pub fn route_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.router().route_notification(method, handler);
    }

    /// Bind a connection to the shared chain without starting its read loop
    pub fn attach(&self, conn: Arc<dyn Connection>) -> Endpoint {
        let endpoint = Endpoint::new(conn, self.inner.middleware.clone(), self.inner.config.clone());
        let conn_id = endpoint.connection_id().to_string();
        let previous = self
            .inner
            .connections
            .write()
            .insert(conn_id.clone(), endpoint.clone());
        if previous.is_some() {
            warn!(conn_id = %conn_id, "replaced endpoint with the same connection id");
        }
        info!(conn_id = %conn_id, "connection attached");
        endpoint
    }

    /// Attach a connection and serve it until it closes
    pub async fn serve_connection(&self, conn: Arc<dyn Connection>) -> RpcResult<()> {
        let endpoint = self.attach(conn);
        self.run_attached(endpoint).await
    }

    /// Attach a connection and serve it on a background task.
    ///
    /// The connection is attached before this returns, so it can be
    /// addressed by id right away.
    pub fn spawn_connection(&self, conn: Arc<dyn Connection>) -> JoinHandle<RpcResult<()>> {
        let endpoint = self.attach(conn);
        let server = self.clone();
        tokio::spawn(async move { server.run_attached(endpoint).await })
    }

    async fn run_attached(&self, endpoint: Endpoint) -> RpcResult<()> {
        let outcome = endpoint.run().await;
        self.detach_if_current(&endpoint);
        if let Err(e) = &outcome {
            warn!(conn_id = %endpoint.connection_id(), error = %e, "connection ended with error");
        }
        outcome
    }

    /// Detach `endpoint` unless a newer connection has since been attached
    /// under the same id
    fn detach_if_current(&self, endpoint: &Endpoint) {
        let conn_id = endpoint.connection_id();
        let mut connections = self.inner.connections.write();
        let current = connections
            .get(conn_id)
            .is_some_and(|stored| Arc::ptr_eq(stored.connection(), endpoint.connection()));
        if current {
            connections.remove(conn_id);
            drop(connections);
            info!(conn_id = %conn_id, "connection detached");
        }
    }

    fn detach(&self, conn_id: &str) -> Option<Endpoint> {
        let removed = self.inner.connections.write().remove(conn_id);
        if removed.is_some() {
            info!(conn_id = %conn_id, "connection detached");
        }
        removed
    }

    pub fn endpoint(&self, conn_id: &str) -> Option<Endpoint> {
        self.inner.connections.read().get(conn_id).cloned()
    }

    /// Ids of every attached connection, sorted
    pub fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.connections.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.read().len()
    }

    pub fn session(&self, conn_id: &str) -> Option<Session> {
        self.endpoint(conn_id).map(|endpoint| endpoint.session().clone())
    }

    fn require(&self, conn_id: &str) -> RpcResult<Endpoint> {
        self.endpoint(conn_id)
            .ok_or_else(|| Error::UnknownConnection(conn_id.to_string()))
    }

    pub async fn send_request<P, F>(
        &self,
        conn_id: &str,
        method: &str,
        params: &P,
        on_response: F,
    ) -> RpcResult<String>
    where
        P: Serialize + ?Sized,
        F: for<'a> FnOnce(&'a mut ResCtx) -> BoxFuture<'a, HandlerResult> + Send + 'static,
    {
        self.require(conn_id)?
            .send_request(method, params, on_response)
            .await
    }

    pub async fn call<P, T>(&self, conn_id: &str, method: &str, params: &P) -> RpcResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        self.require(conn_id)?.call(method, params).await
    }

    pub async fn send_notification<P>(&self, conn_id: &str, method: &str, params: &P) -> RpcResult<()>
    where
        P: Serialize + ?Sized,
    {
        self.require(conn_id)?.send_notification(method, params).await
    }

    pub async fn send_response<R>(
        &self,
        conn_id: &str,
        id: &str,
        result: &R,
        error: Option<RpcError>,
    ) -> RpcResult<()>
    where
        R: Serialize + ?Sized,
    {
        self.require(conn_id)?.send_response(id, result, error).await
    }

    /// Detach and close one connection, abandoning its pending requests
    pub async fn close_connection(&self, conn_id: &str) -> RpcResult<()> {
        let endpoint = self
            .detach(conn_id)
            .ok_or_else(|| Error::UnknownConnection(conn_id.to_string()))?;
        endpoint.close().await
    }

    /// Close every attached connection
    pub async fn shutdown(&self) {
        let endpoints: Vec<Endpoint> = self
            .inner
            .connections
            .write()
            .drain()
            .map(|(_, endpoint)| endpoint)
            .collect();

        debug!(connections = endpoints.len(), "shutting down server");
        for endpoint in endpoints {
            if let Err(e) = endpoint.close().await {
                warn!(conn_id = %endpoint.connection_id(), error = %e, "failed to close connection");
            }
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("middleware", &self.inner.middleware)
            .field("router", &self.inner.router.get())
            .field("connections", &self.connection_ids())
            .finish()
    }
}
