//! Rate limiter behavior observed through the client API: synchronous
//! rejection, queue-then-drain, and queue overflow.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use lib_wsclient::{
    ClientError, ConnectionStatus, LimiterMode, OpenOptions, RateLimiterConfig, WsClient,
};
use project_tests::support::{wait_for_status, wait_until, MockVenue, VenueBehavior};

#[tokio::test]
async fn always_reject_surfaces_rate_limited() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();
    let options = OpenOptions {
        limiter: RateLimiterConfig {
            mode: LimiterMode::AlwaysReject,
            ..RateLimiterConfig::default()
        },
        ..OpenOptions::default()
    };
    let id = client.open(&venue.url(), options).await.unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    let err = client.send_text(&id, "{}").await.unwrap_err();
    assert_eq!(err, ClientError::RateLimited);

    client.close(&id).await.unwrap();
    venue.stop();
}

#[tokio::test]
async fn queued_sends_drain_on_refill() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();
    let options = OpenOptions {
        limiter: RateLimiterConfig {
            capacity: 1,
            refill_rate: 1,
            refill_interval: Duration::from_millis(100),
            queue_limit: 10,
            ..RateLimiterConfig::default()
        },
        ..OpenOptions::default()
    };
    let id = client.open(&venue.url(), options).await.unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    // Three sends against one token: the first goes straight out, the other
    // two wait for refills but complete within their deadline.
    let (a, b, c) = tokio::join!(
        client.send_frame_deadline(&id, lib_wsclient::Frame::Text("one".into()), Duration::from_secs(5)),
        client.send_frame_deadline(&id, lib_wsclient::Frame::Text("two".into()), Duration::from_secs(5)),
        client.send_frame_deadline(&id, lib_wsclient::Frame::Text("three".into()), Duration::from_secs(5)),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let stats = venue.stats.clone();
    assert!(
        wait_until(3_000, || {
            let stats = stats.clone();
            async move { stats.data_frames.load(Ordering::SeqCst) >= 3 }
        })
        .await,
        "queued frames never reached the venue"
    );

    client.close(&id).await.unwrap();
    venue.stop();
}

#[tokio::test]
async fn queue_overflow_is_rejected_synchronously() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = Arc::new(WsClient::new());
    let options = OpenOptions {
        limiter: RateLimiterConfig {
            // No tokens, ever: everything queues, and the queue holds one.
            capacity: 0,
            refill_rate: 0,
            refill_interval: Duration::from_secs(10),
            queue_limit: 1,
            ..RateLimiterConfig::default()
        },
        ..OpenOptions::default()
    };
    let id = client.open(&venue.url(), options).await.unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    // First send parks in the queue (and will only ever time out).
    let parked_client = Arc::clone(&client);
    let parked_id = id.clone();
    let parked = tokio::spawn(async move {
        parked_client
            .send_frame_deadline(
                &parked_id,
                lib_wsclient::Frame::Text("parked".into()),
                Duration::from_millis(400),
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Second send overflows the queue.
    let err = client.send_text(&id, "overflow").await.unwrap_err();
    assert_eq!(err, ClientError::QueueFull);

    // The parked send observes its deadline, not a silent drop.
    assert_eq!(parked.await.unwrap(), Err(ClientError::Timeout));

    client.close(&id).await.unwrap();
    venue.stop();
}
