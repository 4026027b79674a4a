//! # Duplex JSON-RPC
//!
//! A transport-agnostic JSON-RPC engine for peers that both call and answer.
//! Either side of a connection may send requests and notifications, and
//! either side answers the requests it receives.
//!
//! ## Features
//! - Classification of inbound payloads into requests, responses and notifications
//! - Ordered middleware chains per message kind with explicit `next()` continuation
//! - Method routing with last-registration-wins semantics
//! - Request/response correlation with at-most-once callback delivery
//! - Lazily decoded params, results and error data
//! - Per-connection sessions
//! - Single-connection [`Client`] and multi-connection [`Server`]
//!
//! The crate never opens sockets. It drives anything that implements
//! [`Connection`]; [`MemoryConnection`] pairs are included for in-process use.
//!
//! ## Wire format
//!
//! Ids are strings and the `jsonrpc` version member is neither sent nor
//! required:
//!
//! ```text
//! {"id":"<id>","method":"<name>","params":<any>}
//! {"id":"<id>","result":<any>}
//! {"id":"<id>","error":{"code":<int>,"message":"<text>","data":<any>}}
//! {"method":"<name>","params":<any>}
//! ```
//!
//! ## Example
//!
//! ```rust
//! use duplex_json_rpc::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> RpcResult<()> {
//! let (server_side, client_side) = MemoryConnection::pair();
//!
//! let server = Server::new(EndpointConfig::default());
//! server.route_request("echo", request_fn(|ctx| {
//!     Box::pin(async move {
//!         let params: Option<serde_json::Value> = ctx.params()?;
//!         ctx.set_result(&params)?;
//!         ctx.next().await
//!     })
//! }));
//! server.spawn_connection(Arc::new(server_side));
//!
//! let client = Client::new(Arc::new(client_side), EndpointConfig::default());
//! client.spawn();
//!
//! let reply: serde_json::Value = client
//!     .call("echo", &serde_json::json!({"message": "hi"}))
//!     .await?;
//! assert_eq!(reply["message"], "hi");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod middleware;
pub mod notification;
pub mod prelude;
pub mod request;
pub mod response;
pub mod router;
pub mod sender;
pub mod server;
pub mod session;

// Re-export main types
pub use client::Client;
pub use config::EndpointConfig;
pub use connection::{Connection, ConnectionError, MemoryConnection};
pub use context::{NotCtx, ReqCtx, ResCtx};
pub use endpoint::Endpoint;
pub use error::{DecodeError, Error, ErrorCode, RpcError, RpcResult, SendError};
pub use message::{Message, MessageKind, classify};
pub use middleware::{HandlerResult, Middleware};
pub use notification::Notification;
pub use request::Request;
pub use response::Response;
pub use router::Router;
pub use sender::{IdGenerator, ResponseCallback, Sender, SequentialIdGenerator, UuidIdGenerator};
pub use server::Server;
pub use session::Session;
