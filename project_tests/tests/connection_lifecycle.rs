//! End-to-end lifecycle: open, upgrade, frame exchange over the callback
//! channel, clean close.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use lib_wsclient::{
    CallbackEvent, ConnectionStatus, Frame, OpenOptions, WsClient,
};
use project_tests::support::{wait_for_status, MockVenue, VenueBehavior};

#[tokio::test]
async fn open_upgrade_exchange_close() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let options = OpenOptions {
        callback: Some(events_tx),
        ..OpenOptions::default()
    };
    let id = client.open(&venue.url(), options).await.unwrap();

    assert!(
        wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await,
        "connection never reached websocket_connected"
    );

    // The callback recipient observed the lifecycle in order.
    let first = events_rx.recv().await.unwrap();
    assert!(
        matches!(first, CallbackEvent::ConnectionUp { ref protocol } if protocol == "http"),
        "expected connection_up first, got {:?}",
        first
    );
    let second = events_rx.recv().await.unwrap();
    assert!(
        matches!(second, CallbackEvent::WebsocketUpgrade { .. }),
        "expected websocket_upgrade second, got {:?}",
        second
    );

    // A data frame comes back from the echoing venue.
    let payload = json!({"op": "test", "seq": 1}).to_string();
    client.send_text(&id, &payload).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match events_rx.recv().await {
                Some(CallbackEvent::WebsocketFrame {
                    frame: Frame::Text(text),
                    ..
                }) => break text,
                Some(_) => continue,
                None => panic!("callback channel closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(echoed, payload);

    // Clean close releases the stable id.
    client.close(&id).await.unwrap();
    assert!(
        project_tests::support::wait_until(2_000, || {
            let status = client.status(&id);
            async move { status.await.is_err() }
        })
        .await,
        "closed connection still resolves"
    );
    venue.stop();
}

#[tokio::test]
async fn send_frame_requires_a_connection() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();
    let id = client
        .open(&venue.url(), OpenOptions::default())
        .await
        .unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    // Unknown ids fail fast.
    let ghost = lib_wsclient::ConnectionId::mint();
    let err = client.send_text(&ghost, "hello").await.unwrap_err();
    assert_eq!(err, lib_wsclient::ClientError::ConnectionNotFound);

    client.close(&id).await.unwrap();
    venue.stop();
}
