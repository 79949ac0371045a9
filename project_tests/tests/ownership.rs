//! Transport ownership transfer between two runtimes: the receiver takes
//! over event delivery and the sender steps aside without tearing the
//! socket down.

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use lib_wsclient::{CallbackEvent, ConnectionStatus, Frame, OpenOptions, WsClient};
use project_tests::support::{wait_for_status, MockVenue, VenueBehavior};

#[tokio::test]
async fn transfer_moves_the_live_socket() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();

    let source = client
        .open(&venue.url(), OpenOptions::default())
        .await
        .unwrap();
    let (target_events_tx, mut target_events_rx) = mpsc::unbounded_channel();
    let target = client
        .open(
            &venue.url(),
            OpenOptions {
                callback: Some(target_events_tx),
                ..OpenOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(wait_for_status(&client, &source, ConnectionStatus::WebsocketConnected, 3_000).await);
    assert!(wait_for_status(&client, &target, ConnectionStatus::WebsocketConnected, 3_000).await);

    client.transfer_ownership(&source, &target).await.unwrap();

    // The sender stepped aside; the receiver stayed connected on the
    // adopted socket.
    assert!(
        wait_for_status(&client, &source, ConnectionStatus::Disconnected, 2_000).await,
        "source did not release the transport"
    );
    assert_eq!(
        client.status(&target).await.unwrap(),
        ConnectionStatus::WebsocketConnected
    );

    // Traffic sent through the receiver flows over the adopted socket and
    // its echo is delivered to the receiver's callbacks.
    let payload = json!({"after": "handoff"}).to_string();
    client.send_text(&target, &payload).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match target_events_rx.recv().await {
                Some(CallbackEvent::WebsocketFrame {
                    frame: Frame::Text(text),
                    ..
                }) if text == payload => break text,
                Some(_) => continue,
                None => panic!("target callback channel closed"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(echoed, payload);

    client.close(&target).await.unwrap();
    client.close(&source).await.unwrap();
    venue.stop();
}
