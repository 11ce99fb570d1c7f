use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use outpost_protocol::{dispatch_priority, PacketFrame};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;

use crate::session::Session;

/// Everything a handler needs to know about one inbound packet.
pub struct PacketContext {
    pub session: Session,
    pub frame: PacketFrame,
    pub received_at: Instant,
    pub priority: i32,
}

/// The single seam between the transport and the game: installed once, called
/// by every dispatcher worker. This trait uses [`mod@async_trait`].
#[async_trait]
pub trait PacketHandler: Send + Sync + 'static {
    async fn handle_packet(&self, ctx: PacketContext) -> anyhow::Result<()>;
}

struct QueuedPacket {
    ctx: PacketContext,
}

impl PartialEq for QueuedPacket {
    fn eq(&self, other: &Self) -> bool {
        self.ctx.priority == other.ctx.priority
    }
}

impl Eq for QueuedPacket {}

impl PartialOrd for QueuedPacket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedPacket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ctx.priority.cmp(&other.ctx.priority)
    }
}

/// A max-heap of inbound packets feeding a fixed pool of worker tasks.
///
/// Ordering is by priority only: packets of equal priority may be reordered,
/// and workers proceed in parallel. A handler that requires per-session order
/// must serialize within itself.
pub struct PacketDispatcher {
    queue: Mutex<BinaryHeap<QueuedPacket>>,
    /// One permit per queued packet. Closing it releases all workers, which
    /// is how shutdown is signalled.
    available: Arc<Semaphore>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PacketDispatcher {
    /// Creates the dispatcher and spawns `worker_count` workers running
    /// `handler`.
    pub fn start(handler: Arc<dyn PacketHandler>, worker_count: usize) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            queue: Mutex::new(BinaryHeap::new()),
            available: Arc::new(Semaphore::new(0)),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
        });

        let workers = (0..worker_count)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                let handler = handler.clone();

                tokio::spawn(async move {
                    loop {
                        let permit = match dispatcher.available.acquire().await {
                            Ok(permit) => permit,
                            // Closed semaphore indicates dispatcher shutdown.
                            Err(_) => return,
                        };
                        permit.forget();

                        let Some(item) = dispatcher.queue.lock().pop() else {
                            continue;
                        };

                        if let Err(e) = handler.handle_packet(item.ctx).await {
                            error!("packet handler failed: {e:#}");
                        }
                    }
                })
            })
            .collect();

        *dispatcher.workers.lock() = workers;

        dispatcher
    }

    /// Queues a frame for handling, with its priority derived from the packet
    /// id.
    pub fn enqueue(&self, session: Session, frame: PacketFrame, received_at: Instant) {
        let priority = dispatch_priority(frame.id);

        self.queue.lock().push(QueuedPacket {
            ctx: PacketContext {
                session,
                frame,
                received_at,
                priority,
            },
        });

        self.available.add_permits(1);
    }

    /// The number of packets waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Releases every worker and stops accepting work. Idempotent.
    pub fn close(&self) {
        self.available.close();
    }
}

impl Drop for PacketDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}
