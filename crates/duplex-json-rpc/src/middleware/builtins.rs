//! Ready-made handlers

use std::time::Instant;

use async_trait::async_trait;
use serde_json::value::RawValue;
use tracing::{debug, warn};

use super::{HandlerResult, NotificationHandler, RequestHandler, ResponseHandler};
use crate::context::{NotCtx, ReqCtx, ResCtx};
use crate::error::RpcError;

/// Answers every request it sees with the request's own params, then
/// continues the chain. A request without params is answered with `null`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Echo;

#[async_trait]
impl RequestHandler for Echo {
    async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult {
        let params: Option<Box<RawValue>> = ctx.raw_params().map(ToOwned::to_owned);
        match params {
            Some(params) => ctx.set_result(&params)?,
            None => ctx.set_result(&())?,
        }
        ctx.next().await
    }
}

/// Stages a "method not found" error (-32601) unless an earlier handler
/// already staged a response. Register it last, after the router.
#[derive(Debug, Default, Clone, Copy)]
pub struct MethodNotFound;

#[async_trait]
impl RequestHandler for MethodNotFound {
    async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult {
        if !ctx.has_response() {
            let error = RpcError::method_not_found(ctx.method());
            ctx.set_error(error);
        }
        ctx.next().await
    }
}

/// Logs every message that passes through, with the time spent in the rest
/// of the chain. Register it first so the timing covers every other link.
///
/// The same value can be registered for all three chains:
///
/// ```rust
/// use duplex_json_rpc::middleware::{Middleware, TraceMiddleware};
/// use std::sync::Arc;
///
/// let middleware = Middleware::new();
/// let trace = Arc::new(TraceMiddleware);
/// middleware.register_request_handler(trace.clone());
/// middleware.register_notification_handler(trace.clone());
/// middleware.register_response_handler(trace);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceMiddleware;

#[async_trait]
impl RequestHandler for TraceMiddleware {
    async fn handle(&self, ctx: &mut ReqCtx) -> HandlerResult {
        let started = Instant::now();
        debug!(conn_id = %ctx.connection_id(), request_id = %ctx.id(), method = %ctx.method(), "request received");

        let outcome = ctx.next().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(()) => debug!(
                conn_id = %ctx.connection_id(),
                request_id = %ctx.id(),
                method = %ctx.method(),
                elapsed_ms,
                responded = ctx.has_response(),
                is_error = ctx.staged_error().is_some(),
                "request handled"
            ),
            Err(e) => warn!(
                conn_id = %ctx.connection_id(),
                request_id = %ctx.id(),
                method = %ctx.method(),
                elapsed_ms,
                error = %e,
                "request handler failed"
            ),
        }
        outcome
    }
}

#[async_trait]
impl NotificationHandler for TraceMiddleware {
    async fn handle(&self, ctx: &mut NotCtx) -> HandlerResult {
        let started = Instant::now();
        let outcome = ctx.next().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(()) => debug!(conn_id = %ctx.connection_id(), method = %ctx.method(), elapsed_ms, "notification handled"),
            Err(e) => warn!(conn_id = %ctx.connection_id(), method = %ctx.method(), elapsed_ms, error = %e, "notification handler failed"),
        }
        outcome
    }
}

#[async_trait]
impl ResponseHandler for TraceMiddleware {
    async fn handle(&self, ctx: &mut ResCtx) -> HandlerResult {
        let started = Instant::now();
        let outcome = ctx.next().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(()) => debug!(
                conn_id = %ctx.connection_id(),
                request_id = %ctx.id(),
                elapsed_ms,
                is_error = ctx.is_error(),
                "response handled"
            ),
            Err(e) => warn!(conn_id = %ctx.connection_id(), request_id = %ctx.id(), elapsed_ms, error = %e, "response handler failed"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::connection::{Connection, MemoryConnection};
    use crate::middleware::{Middleware, request_fn};
    use crate::request::Request;
    use crate::sender::Sender;
    use serde_json::{Value, json};
    use std::sync::Arc;

    async fn roundtrip(middleware: &Middleware, request: Request) -> Value {
        let (conn, peer) = MemoryConnection::pair();
        let conn: Arc<dyn Connection> = Arc::new(conn);
        let sender = Sender::new(conn.clone(), EndpointConfig::default());
        middleware
            .dispatch(request.into(), &conn, &sender)
            .await
            .unwrap();
        serde_json::from_slice(&peer.read().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_echo_returns_params() {
        let middleware = Middleware::new();
        middleware.register_request_handler(Arc::new(Echo));

        let request = Request::with_params("e1", "anything", &json!({"message": "hi"})).unwrap();
        let reply = roundtrip(&middleware, request).await;
        assert_eq!(reply, json!({"id": "e1", "result": {"message": "hi"}}));

        let reply = roundtrip(&middleware, Request::new_no_params("e2", "anything")).await;
        assert_eq!(reply, json!({"id": "e2", "result": null}));
    }

    #[tokio::test]
    async fn test_method_not_found_only_when_unanswered() {
        let middleware = Middleware::new();
        middleware.register_request_handler(request_fn(|ctx| {
            Box::pin(async move {
                if ctx.method() == "known" {
                    ctx.set_result(&true)?;
                }
                ctx.next().await
            })
        }));
        middleware.register_request_handler(Arc::new(MethodNotFound));

        let reply = roundtrip(&middleware, Request::new_no_params("1", "known")).await;
        assert_eq!(reply["result"], true);

        let reply = roundtrip(&middleware, Request::new_no_params("2", "unknown")).await;
        assert_eq!(reply["error"]["code"], -32601);
        assert_eq!(reply["error"]["message"], "Method 'unknown' not found");
    }

    #[tokio::test]
    async fn test_trace_is_transparent() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("duplex_json_rpc=debug")
            .with_test_writer()
            .try_init();

        let middleware = Middleware::new();
        middleware.register_request_handler(Arc::new(TraceMiddleware));
        middleware.register_request_handler(Arc::new(Echo));

        let request = Request::with_params("t1", "echo", &json!([1, 2])).unwrap();
        let reply = roundtrip(&middleware, request).await;
        assert_eq!(reply["result"], json!([1, 2]));
    }
}
