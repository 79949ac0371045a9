//! Authentication exchange: positive acknowledgement resolves the caller,
//! rejection is critical (terminal state, no reconnection).

use std::time::Duration;

use lib_wsclient::behaviors::AuthError;
use lib_wsclient::{ClientError, ConnectionStatus, Credentials, OpenOptions, WsClient};
use project_tests::support::{wait_for_status, MockVenue, VenueBehavior};

fn credentials() -> Credentials {
    Credentials {
        api_key: Some("AK-TEST".to_string()),
        api_secret: Some("unused-in-default-handler".to_string()),
        token: None,
        extra: serde_json::Map::new(),
    }
}

#[tokio::test]
async fn successful_auth_resolves_the_caller() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();
    let id = client
        .open(&venue.url(), OpenOptions::default())
        .await
        .unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    client
        .authenticate(&id, Some(credentials()), Duration::from_secs(3))
        .await
        .unwrap();

    client.close(&id).await.unwrap();
    venue.stop();
}

#[tokio::test]
async fn rejected_auth_is_terminal() {
    let venue = MockVenue::start(VenueBehavior {
        auth_ok: false,
        ..VenueBehavior::default()
    })
    .await;
    let client = WsClient::new();
    let id = client
        .open(&venue.url(), OpenOptions::default())
        .await
        .unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    let err = client
        .authenticate(&id, Some(credentials()), Duration::from_secs(3))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ClientError::Auth(AuthError::Rejected("bad key".to_string()))
    );

    // Auth failures do not reconnect: the machine lands in error and stays.
    assert!(
        wait_for_status(&client, &id, ConnectionStatus::Error, 3_000).await,
        "auth rejection did not reach the terminal error state"
    );
    let snapshot = client.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.status, ConnectionStatus::Error);
    assert_eq!(venue.stats.connections.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_credentials_fail_fast() {
    let venue = MockVenue::start(VenueBehavior::default()).await;
    let client = WsClient::new();
    let id = client
        .open(&venue.url(), OpenOptions::default())
        .await
        .unwrap();
    assert!(wait_for_status(&client, &id, ConnectionStatus::WebsocketConnected, 3_000).await);

    let err = client
        .authenticate(&id, None, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::Auth(AuthError::MissingCredentials));

    client.close(&id).await.unwrap();
    venue.stop();
}
