use std::time::Duration;

use outpost_protocol::packets::{
    LoginRequestC2s, LoginResponseS2c, ObjectKind, ObjectSpawnS2c,
};
use outpost_server::{InMemoryAuthenticator, MapDescriptor};

use super::harness::{fast_config, start_server, TestClient};

#[tokio::test]
async fn login_issues_a_token_and_a_view_snapshot() {
    let mut config = fast_config();
    config.descriptor = Some(MapDescriptor::default_map());

    let server = start_server(config, InMemoryAuthenticator::new().with_user("u", "p")).await;

    let mut client = TestClient::connect(server.local_addr()).await;
    let (snapshot, response) = client.login("u", "p").await;

    assert!(!response.token.is_empty());

    // The default map's diagonal puts three monsters inside the 50-unit view
    // circle of a character at the origin.
    assert_eq!(snapshot.objects.len(), 3);
    for object in &snapshot.objects {
        assert_eq!(object.kind, ObjectKind::Monster);
        assert!(object.position.length() <= 50.0);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn failed_login_keeps_the_session_open() {
    let server = start_server(
        fast_config(),
        InMemoryAuthenticator::new().with_user("u", "p"),
    )
    .await;

    let mut client = TestClient::connect(server.local_addr()).await;

    client
        .send(&LoginRequestC2s {
            username: "u".into(),
            password: "wrong".into(),
        })
        .await;

    let response = client.expect::<LoginResponseS2c>().await;
    assert!(!response.success);
    assert!(response.token.is_empty());

    // Same connection, right password.
    let (_, response) = client.login("u", "p").await;
    assert!(response.success);

    server.shutdown().await;
}

#[tokio::test]
async fn auto_register_turns_first_login_into_signup() {
    let mut config = fast_config();
    config.game.allow_auto_register = true;

    let server = start_server(config, InMemoryAuthenticator::new()).await;

    let mut client = TestClient::connect(server.local_addr()).await;
    let (_, response) = client.login("fresh", "secret").await;
    assert!(response.success);

    server.shutdown().await;
}

#[tokio::test]
async fn second_login_is_broadcast_to_the_first() {
    let server = start_server(
        fast_config(),
        InMemoryAuthenticator::new()
            .with_user("u1", "p")
            .with_user("u2", "p"),
    )
    .await;

    let mut a = TestClient::connect(server.local_addr()).await;
    a.login("u1", "p").await;

    let mut b = TestClient::connect(server.local_addr()).await;
    let (snapshot, _) = b.login("u2", "p").await;

    // B sees A's character in its initial snapshot...
    assert!(snapshot
        .objects
        .iter()
        .any(|o| o.kind == ObjectKind::Character));

    // ...and A hears about B's character as a spawn.
    let spawn = a.expect::<ObjectSpawnS2c>().await;
    assert_eq!(spawn.object.kind, ObjectKind::Character);

    server.shutdown().await;
}

#[tokio::test]
async fn unknown_packet_ids_disconnect_the_session() {
    let server = start_server(fast_config(), InMemoryAuthenticator::new()).await;

    let mut client = TestClient::connect(server.local_addr()).await;

    // A syntactically valid frame with an id nothing handles.
    client
        .send(&BogusPacket)
        .await;

    let err = loop {
        match client.recv_frame().await {
            Ok(_) => continue,
            Err(e) => break e,
        }
    };
    assert!(err.to_string().contains("connection closed"), "{err:#}");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.active_session_count(), 0);

    server.shutdown().await;
}

#[derive(Debug)]
struct BogusPacket;

impl outpost_protocol::Packet for BogusPacket {
    const ID: u16 = 4242;
    const NAME: &'static str = "BogusPacket";
    const SIDE: outpost_protocol::PacketSide = outpost_protocol::PacketSide::Serverbound;
}

impl outpost_protocol::Encode for BogusPacket {
    fn encode(&self, _w: impl std::io::Write) -> anyhow::Result<()> {
        Ok(())
    }
}
