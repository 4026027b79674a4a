//! Request timeouts, pending limits and abandonment

mod test_helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use duplex_json_rpc::{
    Client, ConnectionError, EndpointConfig, Error, MemoryConnection, SequentialIdGenerator,
};
use serde_json::{Value, json};
use test_helpers::{recv_json, send_json};

fn client_with(config: EndpointConfig) -> (Client, MemoryConnection) {
    let (conn, peer) = MemoryConnection::pair();
    let client = Client::with_id_generator(
        Arc::new(conn),
        config,
        Arc::new(SequentialIdGenerator::new()),
    );
    (client, peer)
}

#[tokio::test(start_paused = true)]
async fn test_call_times_out_and_ignores_late_answer() {
    let config = EndpointConfig::new().with_request_timeout(Duration::from_secs(5));
    let (client, peer) = client_with(config);
    client.spawn();

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call::<_, Value>("slow", &()).await });
    let request = recv_json(&peer).await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Timeout(ref id) if id == "1"), "got {}", err);
    assert_eq!(client.sender().pending_count(), 0);

    // a late answer finds nothing to deliver to
    send_json(&peer, json!({"id": request["id"], "result": "late"})).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.sender().pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_call_answered_in_time() {
    let config = EndpointConfig::new().with_request_timeout(Duration::from_secs(5));
    let (client, peer) = client_with(config);
    client.spawn();

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call::<_, u32>("quick", &()).await });
    let request = recv_json(&peer).await;
    tokio::time::sleep(Duration::from_secs(4)).await;
    send_json(&peer, json!({"id": request["id"], "result": 7})).await;

    assert_eq!(call.await.unwrap().unwrap(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_send_request_callback_is_evicted() {
    let config = EndpointConfig::new().with_request_timeout(Duration::from_secs(1));
    let (client, peer) = client_with(config);
    client.spawn();

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
    assert!(client.sender().is_pending(&id));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!client.sender().is_pending(&id));

    send_json(&peer, json!({"id": id, "result": null})).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_timeout_by_default() {
    let (client, peer) = client_with(EndpointConfig::default());
    client.spawn();

    let id = client
        .send_request("patient", &(), |_ctx| Box::pin(async { Ok(()) }))
        .await
        .unwrap();
    recv_json(&peer).await;

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(client.sender().is_pending(&id));
}

#[tokio::test]
async fn test_close_abandons_outstanding_call() {
    let (client, peer) = client_with(EndpointConfig::default());
    client.spawn();

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call::<_, Value>("forever", &()).await });
    recv_json(&peer).await;

    client.close().await.unwrap();
    assert!(matches!(call.await.unwrap(), Err(Error::Abandoned(_))));
}

#[tokio::test]
async fn test_peer_hangup_abandons_outstanding_call() {
    let (client, peer) = client_with(EndpointConfig::default());
    let running = client.spawn();

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call::<_, Value>("forever", &()).await });
    recv_json(&peer).await;

    drop(peer);
    assert!(running.await.unwrap().is_ok());
    assert!(matches!(call.await.unwrap(), Err(Error::Abandoned(_))));
}

#[tokio::test]
async fn test_pending_limit() {
    let config = EndpointConfig::new().with_max_pending_requests(2);
    let (client, peer) = client_with(config);

    for _ in 0..2 {
        client
            .send_request("work", &(), |_ctx| Box::pin(async { Ok(()) }))
            .await
            .unwrap();
    }
    let err = client
        .send_request("work", &(), |_ctx| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TooManyPending(2)));
    // the rejected request never reached the wire
    recv_json(&peer).await;
    recv_json(&peer).await;
    test_helpers::expect_silence(&peer).await;

    client
        .endpoint()
        .dispatch(br#"{"id":"1","result":null}"#)
        .await
        .unwrap();
    client
        .send_request("work", &(), |_ctx| Box::pin(async { Ok(()) }))
        .await
        .unwrap();
    assert_eq!(client.sender().pending_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_read_deadline_ends_run_with_error() {
    let (client, _peer) = client_with(EndpointConfig::default());
    client.set_deadline(Some(Duration::from_millis(50)));

    let err = client.run().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::DeadlineExceeded)
    ));
}

#[tokio::test]
async fn test_oversized_message_is_rejected() {
    let config = EndpointConfig::new().with_max_message_size(32);
    let (client, _peer) = client_with(config);

    let big = format!(r#"{{"method":"note","params":"{}"}}"#, "x".repeat(64));
    let err = client.endpoint().dispatch(big.as_bytes()).await.unwrap_err();
    assert!(matches!(err, Error::MessageTooLarge { limit: 32, .. }));

    client
        .endpoint()
        .dispatch(br#"{"method":"note"}"#)
        .await
        .unwrap();
}
