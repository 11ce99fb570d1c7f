use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, trace, warn};
use uuid::Uuid;

use crate::dispatch::PacketDispatcher;
use crate::registry::ConnectionRegistry;
use crate::session::{tune_socket, Session};

/// Settings for the network runtime.
#[derive(Clone, Debug)]
pub struct NetworkSettings {
    /// The socket address the server will be bound to.
    ///
    /// # Default Value
    ///
    /// `0.0.0.0:8888`, which will listen on every available network
    /// interface.
    pub address: SocketAddr,
    /// The maximum number of simultaneous connections. Connections past the
    /// cap are accepted and closed immediately without a response frame.
    ///
    /// # Default Value
    ///
    /// `1024`
    pub max_connections: usize,
    /// The capacity, in frames, of each session's outbound queue. Producers
    /// await when the queue is full.
    ///
    /// # Default Value
    ///
    /// `1000`
    pub send_queue_size: usize,
    /// The number of dispatcher workers handling inbound packets.
    ///
    /// # Default Value
    ///
    /// `4`
    pub worker_count: usize,
    /// How often the liveness monitor scans for stale sessions.
    ///
    /// # Default Value
    ///
    /// `30` seconds
    pub heartbeat_interval: Duration,
    /// How long a session may stay silent before it is closed.
    ///
    /// # Default Value
    ///
    /// `90` seconds
    pub liveness_timeout: Duration,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            address: SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), 8888).into(),
            max_connections: 1024,
            send_queue_size: 1000,
            worker_count: 4,
            heartbeat_interval: Duration::from_secs(30),
            liveness_timeout: Duration::from_secs(90),
        }
    }
}

/// Accepts new connections as they occur. Runs until the listener is closed
/// or the task is cancelled.
pub async fn do_accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<PacketDispatcher>,
    settings: NetworkSettings,
) {
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("failed to accept incoming connection: {e}");
                continue;
            }
        };

        trace!(%remote_addr, "handling connection");

        tune_socket(&stream);

        let id = Uuid::new_v4();
        let (session, outgoing_rx) = Session::new(id, remote_addr, settings.send_queue_size);

        if !registry.try_add(session.clone()) {
            // Capacity refusal: close without a response frame.
            warn!(%remote_addr, "connection cap reached, refusing connection");
            drop(stream);
            continue;
        }

        let cleanup_registry = registry.clone();
        session.start(
            stream,
            outgoing_rx,
            dispatcher.clone(),
            Box::new(move || {
                cleanup_registry.remove(id);
            }),
        );
    }
}
