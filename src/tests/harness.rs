//! A minimal client and server-in-a-task harness for the scenario tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use outpost_protocol::packets::{LoginRequestC2s, LoginResponseS2c, ObjectSnapshotS2c};
use outpost_protocol::{Decode, Encode, Packet, PacketDecoder, PacketEncoder, PacketFrame};
use outpost_server::{InMemoryAuthenticator, Server, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// How long a single `expect` may wait before the test fails.
pub(crate) const RECV_DEADLINE: Duration = Duration::from_secs(5);

/// Starts a server on an ephemeral local port.
pub(crate) async fn start_server(mut config: ServerConfig, auth: InMemoryAuthenticator) -> Server {
    config.network.address = "127.0.0.1:0".parse().unwrap();

    Server::start(config, Arc::new(auth))
        .await
        .expect("failed to start test server")
}

/// A config with a quick tick, so scenarios settle fast.
pub(crate) fn fast_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.game.tick_period = Duration::from_millis(20);
    config
}

pub(crate) struct TestClient {
    stream: TcpStream,
    dec: PacketDecoder,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("failed to connect");
        let _ = stream.set_nodelay(true);

        Self {
            stream,
            dec: PacketDecoder::new(),
        }
    }

    pub async fn send<P>(&mut self, pkt: &P)
    where
        P: Packet + Encode,
    {
        let mut enc = PacketEncoder::new();
        enc.append_packet(pkt).unwrap();
        self.stream
            .write_all(&enc.take())
            .await
            .expect("failed to send");
    }

    /// The next frame off the wire, or an error on close/deadline.
    pub async fn recv_frame(&mut self) -> anyhow::Result<PacketFrame> {
        let deadline = tokio::time::Instant::now() + RECV_DEADLINE;

        loop {
            if let Some(frame) = self.dec.try_next_packet()? {
                return Ok(frame);
            }

            self.dec.reserve(4096);
            let mut buf = self.dec.take_capacity();

            let read = tokio::time::timeout_at(deadline, self.stream.read_buf(&mut buf))
                .await
                .context("timed out waiting for a frame")??;

            if read == 0 {
                bail!("connection closed");
            }

            self.dec.queue_bytes(buf);
        }
    }

    /// Skips frames until one with `P`'s id arrives.
    pub async fn expect<P>(&mut self) -> P
    where
        P: Packet + for<'a> Decode<'a>,
    {
        loop {
            let frame = self
                .recv_frame()
                .await
                .unwrap_or_else(|e| panic!("while waiting for {}: {e:#}", P::NAME));

            if frame.id == P::ID {
                return frame.decode().expect(P::NAME);
            }
        }
    }

    /// Collects every frame that arrives within `window`.
    pub async fn drain_for(&mut self, window: Duration) -> Vec<PacketFrame> {
        let deadline = tokio::time::Instant::now() + window;
        let mut frames = vec![];

        loop {
            if let Some(frame) = self.dec.try_next_packet().expect("protocol error") {
                frames.push(frame);
                continue;
            }

            self.dec.reserve(4096);
            let mut buf = self.dec.take_capacity();

            match tokio::time::timeout_at(deadline, self.stream.read_buf(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(_)) => self.dec.queue_bytes(buf),
            }
        }

        frames
    }

    /// Logs in and returns the initial snapshot and the response. Panics if
    /// the server rejects the credentials.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
    ) -> (ObjectSnapshotS2c, LoginResponseS2c) {
        self.send(&LoginRequestC2s {
            username: username.into(),
            password: password.into(),
        })
        .await;

        let snapshot = self.expect::<ObjectSnapshotS2c>().await;
        let response = self.expect::<LoginResponseS2c>().await;
        assert!(response.success, "login failed: {}", response.message);

        (snapshot, response)
    }
}
