//! Middleware chains for inbound messages
//!
//! Every endpoint keeps three independent, ordered handler lists: one for
//! requests, one for notifications and one for responses. An inbound message
//! runs through the list for its kind:
//!
//! - [`RequestHandler`]s may stage a result or an error on the [`ReqCtx`].
//!   A hidden terminal link writes whatever was staged back to the peer.
//! - [`NotificationHandler`]s observe notifications. Nothing is ever written
//!   back for a notification.
//! - [`ResponseHandler`]s observe responses before the correlator hands them
//!   to the callback registered when the request was sent.
//!
//! [`ReqCtx`]: crate::ReqCtx
//!
//! # Examples
//!
//! ```rust
//! use duplex_json_rpc::middleware::{HandlerResult, Middleware, RequestHandler};
//! use duplex_json_rpc::ReqCtx;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Timing;
//!
//! #[async_trait]
//! impl RequestHandler for Timing {
//!     async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult {
//!         let started = std::time::Instant::now();
//!         let outcome = ctx.next().await;
//!         tracing::debug!(method = %ctx.method(), elapsed = ?started.elapsed(), "handled");
//!         outcome
//!     }
//! }
//!
//! let middleware = Middleware::new();
//! middleware.register_request_handler(Arc::new(Timing));
//! ```

pub mod builtins;
pub mod stack;
pub mod traits;

pub use builtins::{Echo, MethodNotFound, TraceMiddleware};
pub use stack::Middleware;
pub use traits::{
    HandlerResult, NotificationFn, NotificationHandler, RequestFn, RequestHandler, ResponseFn,
    ResponseHandler, notification_fn, request_fn, response_fn,
};
