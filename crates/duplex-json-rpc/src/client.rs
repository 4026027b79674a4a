//! Single-connection composition root

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::config::EndpointConfig;
use crate::connection::Connection;
use crate::context::ResCtx;
use crate::endpoint::Endpoint;
use crate::error::{RpcError, RpcResult};
use crate::middleware::{
    HandlerResult, Middleware, NotificationHandler, RequestHandler, ResponseHandler,
};
use crate::router::Router;
use crate::sender::{IdGenerator, Sender};
use crate::session::Session;

/// JSON-RPC peer driving exactly one connection
///
/// A client can both call the remote side and answer calls from it; the only
/// difference from a [`Server`](crate::Server) is that it owns a single
/// connection instead of many.
///
/// # Examples
///
/// ```rust,no_run
/// use duplex_json_rpc::{Client, EndpointConfig, MemoryConnection};
/// use std::sync::Arc;
///
/// # async fn example() -> duplex_json_rpc::RpcResult<()> {
/// let (local, _remote) = MemoryConnection::pair();
/// let client = Client::new(Arc::new(local), EndpointConfig::default());
/// client.spawn();
///
/// let sum: i64 = client.call("add", &[2, 3]).await?;
/// assert_eq!(sum, 5);
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    endpoint: Endpoint,
    router: OnceLock<Router>,
}

impl Client {
    pub fn new(conn: Arc<dyn Connection>, config: EndpointConfig) -> Self {
        Self::from_endpoint(Endpoint::new(conn, Middleware::new(), config))
    }

    pub fn with_id_generator(
        conn: Arc<dyn Connection>,
        config: EndpointConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let sender = Sender::with_id_generator(conn.clone(), config, ids);
        Self::from_endpoint(Endpoint::with_sender(conn, Middleware::new(), sender))
    }

    fn from_endpoint(endpoint: Endpoint) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                endpoint,
                router: OnceLock::new(),
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn middleware(&self) -> &Middleware {
        self.inner.endpoint.middleware()
    }

    pub fn sender(&self) -> &Sender {
        self.inner.endpoint.sender()
    }

    pub fn register_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        self.middleware().register_request_handler(handler);
    }

    pub fn register_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        self.middleware().register_notification_handler(handler);
    }

    pub fn register_response_handler(&self, handler: Arc<dyn ResponseHandler>) {
        self.middleware().register_response_handler(handler);
    }

    /// The client's router, created on first use. Creation registers it in
    /// the chain, so handlers registered before the first call to this method
    /// (or to `route_*`) run ahead of routing.
    pub fn router(&self) -> &Router {
        self.inner
            .router
            .get_or_init(|| Router::new(self.inner.endpoint.middleware()))
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

    pub async fn send_request<P, F>(&self, method: &str, params: &P, on_response: F) -> RpcResult<String>
    where
        P: Serialize + ?Sized,
        F: for<'a> FnOnce(&'a mut ResCtx) -> BoxFuture<'a, HandlerResult> + Send + 'static,
    {
        self.inner.endpoint.send_request(method, params, on_response).await
    }

    pub async fn call<P, T>(&self, method: &str, params: &P) -> RpcResult<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned + Send + 'static,
    {
        self.inner.endpoint.call(method, params).await
    }

    pub async fn send_notification<P>(&self, method: &str, params: &P) -> RpcResult<()>
    where
        P: Serialize + ?Sized,
    {
        self.inner.endpoint.send_notification(method, params).await
    }

    pub async fn send_response<R>(&self, id: &str, result: &R, error: Option<RpcError>) -> RpcResult<()>
    where
        R: Serialize + ?Sized,
    {
        self.inner.endpoint.send_response(id, result, error).await
    }

    /// Read and dispatch inbound messages until the connection closes
    pub async fn run(&self) -> RpcResult<()> {
        self.inner.endpoint.run().await
    }

    /// Run the read loop on a background task
    pub fn spawn(&self) -> JoinHandle<RpcResult<()>> {
        let endpoint = self.inner.endpoint.clone();
        tokio::spawn(async move { endpoint.run().await })
    }

    pub async fn close(&self) -> RpcResult<()> {
        self.inner.endpoint.close().await
    }

    pub fn connection_id(&self) -> &str {
        self.inner.endpoint.connection_id()
    }

    pub fn session(&self) -> &Session {
        self.inner.endpoint.session()
    }

    pub fn set_deadline(&self, deadline: Option<Duration>) {
        self.inner.endpoint.set_deadline(deadline);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.endpoint)
            .field("router", &self.inner.router.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MemoryConnection;
    use crate::error::Error;
    use crate::middleware::{MethodNotFound, request_fn};
    use crate::sender::SequentialIdGenerator;
    use serde_json::{Value, json};

    fn pair() -> (Client, Client) {
        let (a, b) = MemoryConnection::pair();
        (
            Client::with_id_generator(
                Arc::new(a),
                EndpointConfig::default(),
                Arc::new(SequentialIdGenerator::new()),
            ),
            Client::new(Arc::new(b), EndpointConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_router_is_created_once_and_lazily() {
        let (client, _peer) = pair();
        assert_eq!(client.middleware().request_handler_count(), 0);

        client.register_request_handler(Arc::new(MethodNotFound));
        client.router();
        client.router();
        assert_eq!(client.middleware().request_handler_count(), 2);
        assert_eq!(client.middleware().notification_handler_count(), 1);
    }

    #[tokio::test]
    async fn test_both_sides_can_call() {
        let (left, right) = pair();
        for client in [&left, &right] {
            client.route_request(
                "whoami",
                request_fn(|ctx| {
                    Box::pin(async move {
                        let id = ctx.connection_id().to_string();
                        ctx.set_result(&id)?;
                        ctx.next().await
                    })
                }),
            );
        }
        left.spawn();
        right.spawn();

        let answered_by: String = left.call("whoami", &()).await.unwrap();
        assert_eq!(answered_by, right.connection_id());

        let answered_by: String = right.call("whoami", &()).await.unwrap();
        assert_eq!(answered_by, left.connection_id());

        left.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_call_unknown_method() {
        let (left, right) = pair();
        right.router();
        right.register_request_handler(Arc::new(MethodNotFound));
        left.spawn();
        right.spawn();

        let err = left.call::<_, Value>("missing", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Rpc(ref e) if e.code() == -32601));
    }

    #[tokio::test]
    async fn test_session_belongs_to_connection() {
        let (left, right) = pair();
        left.session().set("role", json!("caller"));
        assert_eq!(left.session().get("role"), Some(json!("caller")));
        assert!(right.session().is_empty());
        assert_ne!(left.connection_id(), right.connection_id());
    }
}
