use std::time::Duration;

use glam::Vec3;
use outpost_protocol::packets::{
    MoveRequestC2s, ObjectDespawnS2c, ObjectKind, ObjectSpawnS2c, ObjectUpdateS2c,
    ReconnectRequestC2s, ReconnectResponseS2c,
};
use outpost_server::{InMemoryAuthenticator, MapDescriptor};

use super::harness::{fast_config, start_server, TestClient};

/// Scenario: a dropped session reconnects within the grace window and gets
/// its character back where it left it.
#[tokio::test]
async fn reconnect_within_grace_restores_the_character() {
    let mut config = fast_config();
    config.descriptor = Some(MapDescriptor::default());

    let server = start_server(
        config,
        InMemoryAuthenticator::new()
            .with_user("u1", "p")
            .with_user("u2", "p"),
    )
    .await;

    let mut a = TestClient::connect(server.local_addr()).await;
    let (_, login) = a.login("u1", "p").await;
    let token = login.token;

    let mut b = TestClient::connect(server.local_addr()).await;
    let (snapshot, _) = b.login("u2", "p").await;
    let a_id = snapshot
        .objects
        .iter()
        .find(|o| o.kind == ObjectKind::Character)
        .expect("A's character in B's snapshot")
        .id;

    // A walks somewhere identifiable, B confirms the arrival.
    a.send(&MoveRequestC2s {
        target: Vec3::new(3.0, 0.0, 3.0),
    })
    .await;

    loop {
        let update = b.expect::<ObjectUpdateS2c>().await;
        if update.id == a_id && update.position == Some(Vec3::new(3.0, 0.0, 3.0)) {
            break;
        }
    }

    // Transport drops without a logout.
    drop(a);

    let despawn = b.expect::<ObjectDespawnS2c>().await;
    assert_eq!(despawn.id, a_id);

    // Reconnect on a fresh connection with the old token.
    let mut a2 = TestClient::connect(server.local_addr()).await;
    a2.send(&ReconnectRequestC2s {
        token,
        username: "u1".into(),
    })
    .await;

    let response = a2.expect::<ReconnectResponseS2c>().await;
    assert!(response.success, "{}", response.message);
    assert!(!response.session_id.is_empty());

    // B sees the character come back, still at (3, 0, 3).
    let spawn = b.expect::<ObjectSpawnS2c>().await;
    assert_eq!(spawn.object.id, a_id);
    assert_eq!(spawn.object.position, Vec3::new(3.0, 0.0, 3.0));
    assert_eq!(server.service().parked_count(), 0);

    server.shutdown().await;
}

/// Scenario: past the grace window the character is gone and reconnecting
/// starts a new game.
#[tokio::test]
async fn expired_grace_starts_a_fresh_game() {
    let mut config = fast_config();
    config.descriptor = Some(MapDescriptor::default());
    config.game.grace_period = Duration::from_millis(300);
    config.game.park_sweep_interval = Duration::from_millis(100);

    let server = start_server(config, InMemoryAuthenticator::new().with_user("u", "p")).await;

    let mut a = TestClient::connect(server.local_addr()).await;
    let (_, login) = a.login("u", "p").await;
    let token = login.token;
    drop(a);

    // Outlive the grace window; the sweeper destroys the character.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(server.service().parked_count(), 0);

    let mut a2 = TestClient::connect(server.local_addr()).await;
    a2.send(&ReconnectRequestC2s {
        token,
        username: "u".into(),
    })
    .await;

    let response = a2.expect::<ReconnectResponseS2c>().await;
    assert!(response.success);
    assert!(
        response.session_id.is_empty(),
        "expected a fresh game, got a restored session"
    );

    server.shutdown().await;
}
