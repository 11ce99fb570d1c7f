use std::time::Duration;

use outpost_protocol::packets::HeartbeatC2s;
use outpost_server::InMemoryAuthenticator;

use super::harness::{fast_config, start_server, TestClient};

/// Scenario: the third connection past a cap of two is closed without a
/// response frame.
#[tokio::test]
async fn connections_past_the_cap_are_refused() {
    let mut config = fast_config();
    config.network.max_connections = 2;

    let server = start_server(
        config,
        InMemoryAuthenticator::new()
            .with_user("u1", "p")
            .with_user("u2", "p"),
    )
    .await;

    let mut a = TestClient::connect(server.local_addr()).await;
    a.login("u1", "p").await;

    let mut b = TestClient::connect(server.local_addr()).await;
    b.login("u2", "p").await;

    let mut c = TestClient::connect(server.local_addr()).await;
    let err = c.recv_frame().await.unwrap_err();
    assert!(err.to_string().contains("connection closed"), "{err:#}");

    assert_eq!(server.active_session_count(), 2);

    server.shutdown().await;
}

/// Scenario: a session that never sends anything is timed out and closed.
#[tokio::test]
async fn silent_sessions_are_timed_out() {
    let mut config = fast_config();
    config.network.heartbeat_interval = Duration::from_millis(200);
    config.network.liveness_timeout = Duration::from_millis(500);

    let server = start_server(config, InMemoryAuthenticator::new()).await;

    let mut client = TestClient::connect(server.local_addr()).await;

    // Give the accept loop a moment to register the session.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.active_session_count(), 1);

    let err = client.recv_frame().await.unwrap_err();
    assert!(err.to_string().contains("connection closed"), "{err:#}");
    assert_eq!(server.active_session_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn heartbeats_keep_a_session_alive() {
    let mut config = fast_config();
    config.network.heartbeat_interval = Duration::from_millis(200);
    config.network.liveness_timeout = Duration::from_millis(500);

    let server = start_server(config, InMemoryAuthenticator::new()).await;

    let mut client = TestClient::connect(server.local_addr()).await;

    // Heartbeat for well past the timeout.
    for _ in 0..10 {
        client.send(&HeartbeatC2s).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    assert_eq!(server.active_session_count(), 1);

    // Go silent; the monitor reaps the session.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(server.active_session_count(), 0);

    server.shutdown().await;
}
