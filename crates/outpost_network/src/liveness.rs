use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::registry::ConnectionRegistry;

/// Spawns the task that closes sessions whose last activity is older than
/// `timeout`. The scan runs every `interval`.
pub fn spawn_liveness_monitor(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            for session in registry.snapshot() {
                let idle = session.idle_time();
                if idle > timeout {
                    warn!(
                        session = %session.id(),
                        idle_ms = idle.as_millis() as u64,
                        "session timed out"
                    );
                    session.disconnect();
                }
            }
        }
    })
}
