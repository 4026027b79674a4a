//! Handler trait definitions

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::{NotCtx, ReqCtx, ResCtx};
use crate::error::Error;

/// Outcome of a handler. An error aborts the rest of the chain and is
/// returned from dispatch.
pub type HandlerResult = Result<(), Error>;

/// Link in the request chain
///
/// A handler either stages a response on the context, passes control on
/// with [`ReqCtx::next`], or both. Returning without calling `next()`
/// short-circuits every handler registered after this one.
///
/// # Examples
///
/// ```rust
/// use duplex_json_rpc::middleware::{HandlerResult, RequestHandler};
/// use duplex_json_rpc::{ReqCtx, RpcError};
/// use async_trait::async_trait;
///
/// struct RequireLogin;
///
/// #[async_trait]
/// impl RequestHandler for RequireLogin {
///     async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult {
///         if ctx.session().contains_key("user") {
///             return ctx.next().await;
///         }
///         ctx.set_error(RpcError::server_error(-32001, "login required"));
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult;
}

/// Link in the notification chain
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, ctx: &mut NotCtx) -> HandlerResult;
}

/// Link in the response chain. The correlator that hands responses to their
/// pending callbacks always runs after every registered response handler.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn handle(&self, ctx: &mut ResCtx) -> HandlerResult;
}

/// Request handler backed by a closure, see [`request_fn`]
pub struct RequestFn<F> {
    f: F,
}

#[async_trait]
impl<F> RequestHandler for RequestFn<F>
where
    F: for<'a> Fn(&'a mut ReqCtx) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult {
        (self.f)(ctx).await
    }
}

/// Wrap a closure as a [`RequestHandler`]
///
/// ```rust
/// use duplex_json_rpc::middleware::request_fn;
///
/// let ping = request_fn(|ctx| {
///     Box::pin(async move {
///         ctx.set_result("pong")?;
///         ctx.next().await
///     })
/// });
/// # let _ = ping;
/// ```
pub fn request_fn<F>(f: F) -> Arc<dyn RequestHandler>
where
    F: for<'a> Fn(&'a mut ReqCtx) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(RequestFn { f })
}

/// Notification handler backed by a closure, see [`notification_fn`]
pub struct NotificationFn<F> {
    f: F,
}

#[async_trait]
impl<F> NotificationHandler for NotificationFn<F>
where
    F: for<'a> Fn(&'a mut NotCtx) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn handle(&self, ctx: &mut NotCtx) -> HandlerResult {
        (self.f)(ctx).await
    }
}

/// Wrap a closure as a [`NotificationHandler`]
pub fn notification_fn<F>(f: F) -> Arc<dyn NotificationHandler>
where
    F: for<'a> Fn(&'a mut NotCtx) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(NotificationFn { f })
}

/// Response handler backed by a closure, see [`response_fn`]
pub struct ResponseFn<F> {
    f: F,
}

#[async_trait]
impl<F> ResponseHandler for ResponseFn<F>
where
    F: for<'a> Fn(&'a mut ResCtx) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn handle(&self, ctx: &mut ResCtx) -> HandlerResult {
        (self.f)(ctx).await
    }
}

/// Wrap a closure as a [`ResponseHandler`]
pub fn response_fn<F>(f: F) -> Arc<dyn ResponseHandler>
where
    F: for<'a> Fn(&'a mut ResCtx) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(ResponseFn { f })
}
