//! Calculator over an in-memory connection
//!
//! A server exposes `add`, `subtract` and `divide`; a client calls them and
//! also answers a request the server sends back to it. Run with:
//!
//! ```text
//! RUST_LOG=debug cargo run -p duplex-json-rpc --example calculator
//! ```

use std::sync::Arc;

use duplex_json_rpc::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
struct Operands {
    a: f64,
    b: f64,
}

fn operands(ctx: &ReqCtx) -> Result<Option<Operands>, Error> {
    match ctx.params::<Operands>() {
        Ok(operands) => Ok(operands),
        Err(e) if e.is_decode_error() => Ok(None),
        Err(e) => Err(e),
    }
}

fn arithmetic(op: fn(f64, f64) -> Result<f64, RpcError>) -> Arc<dyn RequestHandler> {
    request_fn(move |ctx| {
        Box::pin(async move {
            match operands(ctx)? {
                Some(Operands { a, b }) => match op(a, b) {
                    Ok(value) => ctx.set_result(&json!({ "result": value }))?,
                    Err(error) => ctx.set_error(error),
                },
                None => ctx.set_error(RpcError::invalid_params(
                    "expected an object with numeric fields 'a' and 'b'",
                )),
            }
            ctx.next().await
        })
    })
}

fn build_server() -> Server {
    let server = Server::new(EndpointConfig::default().with_log_messages(true));

    server.register_request_handler(Arc::new(TraceMiddleware));
    server.register_notification_handler(Arc::new(TraceMiddleware));

    server.route_request("add", arithmetic(|a, b| Ok(a + b)));
    server.route_request("subtract", arithmetic(|a, b| Ok(a - b)));
    server.route_request(
        "divide",
        arithmetic(|a, b| {
            if b == 0.0 {
                Err(RpcError::invalid_params("division by zero"))
            } else {
                Ok(a / b)
            }
        }),
    );
    server.route_notification(
        "client.hello",
        notification_fn(|ctx| {
            Box::pin(async move {
                let name: Option<String> = ctx.params()?;
                if let Some(name) = name {
                    ctx.session().set("client_name", json!(name));
                }
                ctx.next().await
            })
        }),
    );

    server.register_request_handler(Arc::new(MethodNotFound));
    server
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let server = build_server();
    let (server_side, client_side) = MemoryConnection::pair();
    let conn_id = server_side.id().to_string();
    let serving = server.spawn_connection(Arc::new(server_side));

    let client = Client::new(Arc::new(client_side), EndpointConfig::default());
    client.route_request(
        "client.version",
        request_fn(|ctx| {
            Box::pin(async move {
                ctx.set_result(env!("CARGO_PKG_VERSION"))?;
                ctx.next().await
            })
        }),
    );
    client.spawn();

    client.send_notification("client.hello", "calculator-example").await?;

    for (method, a, b) in [("add", 5.0, 3.0), ("subtract", 10.0, 4.0), ("divide", 9.0, 3.0)] {
        let reply: serde_json::Value = client.call(method, &json!({ "a": a, "b": b })).await?;
        info!(method, a, b, result = %reply["result"], "calculated");
    }

    match client.call::<_, serde_json::Value>("divide", &json!({"a": 1, "b": 0})).await {
        Err(Error::Rpc(error)) => info!(code = error.code(), reason = error.message(), "divide rejected"),
        other => anyhow::bail!("expected a remote error, got {:?}", other),
    }

    match client.call::<_, serde_json::Value>("power", &json!({"a": 2, "b": 8})).await {
        Err(Error::Rpc(error)) => info!(code = error.code(), reason = error.message(), "unknown method"),
        other => anyhow::bail!("expected a remote error, got {:?}", other),
    }

    // the server can call back into the client over the same connection
    let version: String = server.call(&conn_id, "client.version", &()).await?;
    let name = server
        .session(&conn_id)
        .and_then(|session| session.get("client_name"));
    info!(version = %version, client = ?name, "client identified");

    client.close().await?;
    serving.await??;
    Ok(())
}
