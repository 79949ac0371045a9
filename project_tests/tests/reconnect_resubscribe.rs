//! Resilience: automatic reconnection with re-issued subscriptions, and
//! terminal-error classification that refuses to retry.

use std::sync::atomic::Ordering;

use serde_json::json;

use lib_wsclient::{
    BackoffType, ConnectionStatus, DownReason, OpenOptions, ReconnectPolicy, SubscriptionStatus,
    WsClient,
};
use project_tests::support::{wait_for_status, wait_until, MockVenue, VenueBehavior};

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        strategy: BackoffType::Linear,
        base_delay_ms: 50,
        max_delay_ms: 1_000,
        max_attempts: Some(10),
        jitter_factor: 0.0,
    }
}

#[tokio::test]
async fn confirmed_subscription_is_reissued_after_reconnect() {
    let venue = MockVenue::start(VenueBehavior {
        drop_first_conn_after_acks: Some(1),
        ..VenueBehavior::default()
    })
    .await;
    let client = WsClient::new();
    let options = OpenOptions {
        reconnection: Some(fast_policy()),
        ..OpenOptions::default()
    };
    let id = client.open(&venue.url(), options).await.unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    // Subscribe; the venue acks and then abruptly drops the socket.
    let sub = client
        .subscribe(&id, "book.BTC", json!({"depth": 10}))
        .await
        .unwrap();

    // The client reconnects on its own and re-issues the subscription.
    let stats = venue.stats.clone();
    assert!(
        wait_until(5_000, || {
            let stats = stats.clone();
            async move { stats.connections.load(Ordering::SeqCst) >= 2 }
        })
        .await,
        "no reconnection happened"
    );
    assert!(
        wait_until(5_000, || {
            let stats = stats.clone();
            async move { stats.subscribe_requests.load(Ordering::SeqCst) >= 2 }
        })
        .await,
        "subscription was not re-issued"
    );

    // And the subscription converges back to confirmed, history intact.
    assert!(
        wait_until(5_000, || {
            let client = &client;
            let id = &id;
            let sub = &sub;
            async move {
                match client.snapshot(id).await {
                    Ok(snapshot) => snapshot
                        .subscriptions
                        .iter()
                        .any(|s| &s.id == sub && s.status == SubscriptionStatus::Confirmed),
                    Err(_) => false,
                }
            }
        })
        .await,
        "subscription did not reconfirm"
    );
    let snapshot = client.snapshot(&id).await.unwrap();
    let record = snapshot
        .subscriptions
        .iter()
        .find(|s| s.id == sub)
        .unwrap();
    // pending -> confirmed -> pending (re-issue) -> confirmed
    let states: Vec<SubscriptionStatus> = record.history.iter().map(|(s, _)| *s).collect();
    assert_eq!(
        states,
        vec![
            SubscriptionStatus::Pending,
            SubscriptionStatus::Confirmed,
            SubscriptionStatus::Pending,
            SubscriptionStatus::Confirmed,
        ]
    );

    client.close(&id).await.unwrap();
    venue.stop();
}

#[tokio::test]
async fn connection_refused_is_terminal() {
    // Bind a port, then free it: connecting to it now gets ECONNREFUSED.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = WsClient::new();
    let options = OpenOptions {
        reconnection: Some(fast_policy()),
        ..OpenOptions::default()
    };
    let id = client
        .open(&format!("ws://{}", addr), options)
        .await
        .unwrap();

    // Terminal classification: one failed attempt, straight to error, no
    // retry loop.
    assert!(
        wait_for_status(&client, &id, ConnectionStatus::Error, 3_000).await,
        "refused connection did not reach the terminal error state"
    );
    let snapshot = client.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.last_error, Some(DownReason::ConnectionRefused));
}

#[tokio::test]
async fn pending_subscription_times_out() {
    let venue = MockVenue::start(VenueBehavior {
        ack_subscribes: false,
        ..VenueBehavior::default()
    })
    .await;
    let client = WsClient::new();
    let options = OpenOptions {
        subscription_timeout_secs: 1,
        ..OpenOptions::default()
    };
    let id = client.open(&venue.url(), options).await.unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    let sub = client.subscribe(&id, "book.BTC", json!({})).await.unwrap();
    assert!(
        wait_until(4_000, || {
            let client = &client;
            let id = &id;
            let sub = &sub;
            async move {
                match client.snapshot(id).await {
                    Ok(snapshot) => snapshot
                        .subscriptions
                        .iter()
                        .any(|s| &s.id == sub && s.status == SubscriptionStatus::Timeout),
                    Err(_) => false,
                }
            }
        })
        .await,
        "unanswered subscription never timed out"
    );

    client.close(&id).await.unwrap();
    venue.stop();
}

#[tokio::test]
async fn silent_connection_is_recycled_by_the_watchdog() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();
    let options = OpenOptions {
        reconnection: Some(fast_policy()),
        inactivity_timeout: Some(std::time::Duration::from_millis(500)),
        ..OpenOptions::default()
    };
    let id = client.open(&venue.url(), options).await.unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    // Nothing flows: the watchdog must recycle the transport.
    let stats = venue.stats.clone();
    assert!(
        wait_until(6_000, || {
            let stats = stats.clone();
            async move { stats.connections.load(Ordering::SeqCst) >= 2 }
        })
        .await,
        "watchdog never forced a reconnect"
    );

    client.close(&id).await.unwrap();
    venue.stop();
}

#[tokio::test]
async fn unsubscribe_releases_the_subscription() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();
    let id = client
        .open(&venue.url(), OpenOptions::default())
        .await
        .unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    let sub = client.subscribe(&id, "trades.ETH", json!({})).await.unwrap();
    assert!(
        wait_until(3_000, || {
            let client = &client;
            let id = &id;
            let sub = &sub;
            async move {
                match client.snapshot(id).await {
                    Ok(snapshot) => snapshot
                        .subscriptions
                        .iter()
                        .any(|s| &s.id == sub && s.status == SubscriptionStatus::Confirmed),
                    Err(_) => false,
                }
            }
        })
        .await
    );

    client.unsubscribe(&id, sub.clone()).await.unwrap();
    assert!(
        wait_until(3_000, || {
            let client = &client;
            let id = &id;
            let sub = &sub;
            async move {
                match client.snapshot(id).await {
                    Ok(snapshot) => snapshot
                        .subscriptions
                        .iter()
                        .any(|s| &s.id == sub && s.status == SubscriptionStatus::Unsubscribed),
                    Err(_) => false,
                }
            }
        })
        .await,
        "unsubscribe ack never landed"
    );

    // Unknown subscription ids are rejected.
    let err = client
        .unsubscribe(&id, lib_wsclient::SubscriptionId::from_raw("sub-bogus"))
        .await
        .unwrap_err();
    assert_eq!(err, lib_wsclient::ClientError::SubscriptionNotFound);

    client.close(&id).await.unwrap();
    venue.stop();
}
