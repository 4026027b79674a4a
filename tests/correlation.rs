//! Matching inbound responses to the requests that produced them

mod test_helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use duplex_json_rpc::middleware::response_fn;
use duplex_json_rpc::{
    Client, Connection, EndpointConfig, Error, MemoryConnection, SequentialIdGenerator,
};
use serde_json::{Value, json};
use test_helpers::{EventLog, recv_json, send_json};

fn sequential_client() -> (Client, MemoryConnection) {
    let (conn, peer) = MemoryConnection::pair();
    let client = Client::with_id_generator(
        Arc::new(conn),
        EndpointConfig::default(),
        Arc::new(SequentialIdGenerator::new()),
    );
    (client, peer)
}

#[tokio::test]
async fn test_duplicate_response_runs_callback_once() {
    let (client, peer) = sequential_client();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    let id = client
        .send_request("work", &json!({"n": 1}), move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        })
        .await
        .unwrap();
    assert_eq!(id, "1");

    let request = recv_json(&peer).await;
    assert_eq!(request, json!({"id": "1", "method": "work", "params": {"n": 1}}));

    let endpoint = client.endpoint().clone();
    for _ in 0..3 {
        endpoint.dispatch(br#"{"id":"1","result":"done"}"#).await.unwrap();
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!client.sender().is_pending("1"));
}

#[tokio::test]
async fn test_unmatched_response_is_dropped() {
    let (client, _peer) = sequential_client();
    let log = EventLog::new();
    let seen = log.clone();
    client.register_response_handler(response_fn(move |ctx| {
        let seen = seen.clone();
        Box::pin(async move {
            seen.push(ctx.id().to_string());
            ctx.next().await
        })
    }));

    // response middleware still sees it, then the correlator ignores it
    client
        .endpoint()
        .dispatch(br#"{"id":"ghost","result":1}"#)
        .await
        .unwrap();
    assert_eq!(log.events(), vec!["ghost"]);
    assert_eq!(client.sender().pending_count(), 0);
}

#[tokio::test]
async fn test_out_of_order_responses_reach_their_callers() {
    let (client, peer) = sequential_client();
    client.spawn();

    let caller = client.clone();
    let first = tokio::spawn(async move { caller.call::<_, String>("first", &()).await });
    let one = recv_json(&peer).await;

    let caller = client.clone();
    let second = tokio::spawn(async move { caller.call::<_, String>("second", &()).await });
    let two = recv_json(&peer).await;

    assert_eq!(one["method"], "first");
    assert_eq!(two["method"], "second");
    assert_eq!(client.sender().pending_count(), 2);

    // answer in reverse order
    send_json(&peer, json!({"id": two["id"], "result": "for second"})).await;
    send_json(&peer, json!({"id": one["id"], "result": "for first"})).await;

    assert_eq!(first.await.unwrap().unwrap(), "for first");
    assert_eq!(second.await.unwrap().unwrap(), "for second");
    assert_eq!(client.sender().pending_count(), 0);
}

#[tokio::test]
async fn test_error_response_reaches_callback() {
    let (client, _peer) = sequential_client();
    let log = EventLog::new();
    let seen = log.clone();

    client
        .send_request("risky", &(), move |ctx| {
            let summary = match ctx.error() {
                Some(error) => format!("error {} {}", error.code(), error.message()),
                None => "ok".to_string(),
            };
            seen.push(summary);
            Box::pin(async { Ok(()) })
        })
        .await
        .unwrap();

    client
        .endpoint()
        .dispatch(br#"{"id":"1","error":{"code":-32603,"message":"boom"}}"#)
        .await
        .unwrap();
    assert_eq!(log.events(), vec!["error -32603 boom"]);
}

#[tokio::test]
async fn test_failed_write_leaves_nothing_pending() {
    let (client, peer) = sequential_client();
    // nobody is left to read what the client writes
    drop(peer);

    let err = client
        .send_request("lost", &(), |_ctx| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();
    assert!(err.is_send_error(), "unexpected error: {}", err);
    assert_eq!(client.sender().pending_count(), 0);
}

#[tokio::test]
async fn test_cancelled_request_ignores_late_response() {
    let (client, peer) = sequential_client();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    let id = client
        .send_request("slow", &(), move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        })
        .await
        .unwrap();
    recv_json(&peer).await;

    assert!(client.sender().cancel(&id));
    assert!(!client.sender().cancel(&id));

    client
        .endpoint()
        .dispatch(br#"{"id":"1","result":null}"#)
        .await
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_call_decodes_missing_result_as_null() {
    let (client, peer) = sequential_client();
    client.spawn();

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call::<_, Option<Value>>("noop", &()).await });
    let request = recv_json(&peer).await;
    send_json(&peer, json!({"id": request["id"]})).await;

    assert_eq!(call.await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_call_with_wrong_result_shape_is_decode_error() {
    let (client, peer) = sequential_client();
    client.spawn();

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call::<_, u32>("count", &()).await });
    let request = recv_json(&peer).await;
    send_json(&peer, json!({"id": request["id"], "result": "many"})).await;

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_decode_error(), "unexpected error: {}", err);
    assert!(!matches!(err, Error::Rpc(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_and_duplicate_responses() {
    const REQUESTS: usize = 32;
    const COPIES: usize = 4;

    let (client, _peer) = sequential_client();
    let runs = Arc::new(AtomicUsize::new(0));

    let mut sends = Vec::new();
    for n in 0..REQUESTS {
        let client = client.clone();
        let counter = runs.clone();
        sends.push(tokio::spawn(async move {
            client
                .send_request("work", &json!({ "n": n }), move |_ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async { Ok(()) })
                })
                .await
        }));
    }
    let mut ids = Vec::new();
    for send in sends {
        ids.push(send.await.unwrap().unwrap());
    }
    assert_eq!(client.sender().pending_count(), REQUESTS);

    // every response arrives several times, each copy on its own task
    let mut deliveries = Vec::new();
    for id in &ids {
        let bytes = serde_json::to_vec(&json!({"id": id, "result": "done"})).unwrap();
        for _ in 0..COPIES {
            let endpoint = client.endpoint().clone();
            let bytes = bytes.clone();
            deliveries.push(tokio::spawn(async move { endpoint.dispatch(&bytes).await }));
        }
    }
    for delivery in deliveries {
        delivery.await.unwrap().unwrap();
    }

    assert_eq!(runs.load(Ordering::SeqCst), REQUESTS);
    assert_eq!(client.sender().pending_count(), 0);
}

#[tokio::test]
async fn test_send_after_peer_closed_is_an_error() {
    let (client, peer) = sequential_client();
    peer.close().await.unwrap();

    let err = client
        .send_request("orphan", &(), |_ctx| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();
    assert!(err.is_send_error(), "unexpected error: {}", err);
    assert_eq!(client.sender().pending_count(), 0);
}
