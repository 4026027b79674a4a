//! # Duplex JSON-RPC Prelude
//!
//! Re-exports of the types most handlers and applications need.
//!
//! ```rust
//! use duplex_json_rpc::prelude::*;
//! ```

// Composition roots
pub use crate::client::Client;
pub use crate::config::EndpointConfig;
pub use crate::endpoint::Endpoint;
pub use crate::server::Server;

// Connections
pub use crate::connection::{Connection, ConnectionError, MemoryConnection};
pub use crate::session::Session;

// Handlers
pub use crate::context::{NotCtx, ReqCtx, ResCtx};
pub use crate::middleware::{
    Echo, HandlerResult, MethodNotFound, Middleware, NotificationHandler, RequestHandler,
    ResponseHandler, TraceMiddleware, notification_fn, request_fn, response_fn,
};
pub use crate::router::Router;

// Messages and errors
pub use crate::error::{Error, ErrorCode, RpcError, RpcResult};
pub use crate::message::Message;
pub use crate::notification::Notification;
pub use crate::request::Request;
pub use crate::response::Response;
pub use crate::sender::{IdGenerator, Sender, SequentialIdGenerator};
