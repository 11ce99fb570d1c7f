use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use outpost_network::{
    do_accept_loop, spawn_liveness_monitor, ConnectionRegistry, PacketDispatcher,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::auth::Authenticator;
use crate::config::ServerConfig;
use crate::descriptor::MapDescriptor;
use crate::game::GameService;
use crate::map::{spawn_tick_loop, Map};

/// How long shutdown waits for background tasks to settle.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running world server: the listener, the dispatcher workers, the map tick
/// loop, and the bookkeeping tasks, wired together and owned as one unit.
pub struct Server {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<PacketDispatcher>,
    service: Arc<GameService>,
    map: Arc<Map>,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Binds the listener and spawns every background task.
    pub async fn start(
        config: ServerConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.network.address)
            .await
            .with_context(|| format!("failed to bind {}", config.network.address))?;
        let local_addr = listener.local_addr()?;

        let (events_tx, events_rx) = flume::unbounded();
        let registry = Arc::new(ConnectionRegistry::new(
            config.network.max_connections,
            events_tx,
        ));

        let descriptor = config.descriptor.unwrap_or_else(MapDescriptor::default_map);
        let map = Arc::new(Map::from_descriptor(&descriptor, &config.game));

        let service = GameService::new(
            authenticator,
            map.clone(),
            registry.clone(),
            config.game.clone(),
        );

        let dispatcher = PacketDispatcher::start(service.clone(), config.network.worker_count);

        // Shutdown tears these down in push order: listener first, then the
        // simulation, then the bookkeeping tasks.
        let tasks = vec![
            tokio::spawn(do_accept_loop(
                listener,
                registry.clone(),
                dispatcher.clone(),
                config.network.clone(),
            )),
            spawn_tick_loop(map.clone(), service.clone()),
            service.spawn_event_pump(events_rx),
            service.spawn_parking_sweeper(),
            spawn_liveness_monitor(
                registry.clone(),
                config.network.heartbeat_interval,
                config.network.liveness_timeout,
            ),
        ];

        info!(addr = %local_addr, "server listening");

        Ok(Self {
            registry,
            dispatcher,
            service,
            map,
            local_addr,
            tasks,
        })
    }

    /// The address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_session_count(&self) -> usize {
        self.registry.session_count()
    }

    pub fn map(&self) -> &Arc<Map> {
        &self.map
    }

    pub fn service(&self) -> &Arc<GameService> {
        &self.service
    }

    /// Stops accepting, cancels the simulation, releases the dispatcher
    /// workers, disconnects every session, and waits briefly for the tasks to
    /// settle.
    pub async fn shutdown(mut self) {
        info!("shutting down");

        for task in &self.tasks {
            task.abort();
        }

        self.dispatcher.close();
        self.registry.disconnect_all();

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for task in self.tasks.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let _ = tokio::time::timeout(remaining, task).await;
        }
    }
}
