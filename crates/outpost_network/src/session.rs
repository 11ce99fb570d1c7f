use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::bail;
use bytes::BytesMut;
use outpost_protocol::packets::HeartbeatC2s;
use outpost_protocol::{Encode, Packet, PacketDecoder, PacketEncoder};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dispatch::PacketDispatcher;

/// The opaque identity of one accepted connection, generated at accept time.
pub type SessionId = Uuid;

/// A callback run exactly once when the session disconnects, however the
/// disconnect was triggered.
pub type CleanupFn = Box<dyn FnOnce() + Send + Sync + 'static>;

const READ_BUF_SIZE: usize = 4096;

/// One accepted TCP connection.
///
/// A session owns its socket through two tokio tasks (read and write) and a
/// bounded outbound queue. Cloning is cheap and shares the connection.
/// [`disconnect`](Self::disconnect) is idempotent: the socket closes exactly
/// once, later sends turn into no-ops, and the cleanup callback fires on the
/// first call only.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    remote_addr: SocketAddr,
    outgoing: flume::Sender<BytesMut>,
    /// Milliseconds since `epoch`, stamped on every socket read.
    last_activity: AtomicU64,
    epoch: Instant,
    connected: AtomicBool,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    cleanup: Mutex<Option<CleanupFn>>,
}

impl Session {
    /// Creates the session half of a connection. The returned receiver is the
    /// consumer side of the outbound queue and must be passed back to
    /// [`start`](Self::start).
    pub(crate) fn new(
        id: SessionId,
        remote_addr: SocketAddr,
        send_queue_size: usize,
    ) -> (Self, flume::Receiver<BytesMut>) {
        let (outgoing, outgoing_rx) = flume::bounded(send_queue_size);

        let session = Self {
            inner: Arc::new(SessionInner {
                id,
                remote_addr,
                outgoing,
                last_activity: AtomicU64::new(0),
                epoch: Instant::now(),
                connected: AtomicBool::new(true),
                reader_task: Mutex::new(None),
                writer_task: Mutex::new(None),
                cleanup: Mutex::new(None),
            }),
        };

        (session, outgoing_rx)
    }

    /// Splits the stream and spawns the read and write loops.
    pub(crate) fn start(
        &self,
        stream: TcpStream,
        outgoing_rx: flume::Receiver<BytesMut>,
        dispatcher: Arc<PacketDispatcher>,
        cleanup: CleanupFn,
    ) {
        *self.inner.cleanup.lock() = Some(cleanup);

        let (mut reader, mut writer) = stream.into_split();

        let session = self.clone();
        let reader_task = tokio::spawn(async move {
            let mut dec = PacketDecoder::new();

            loop {
                let frame = match dec.try_next_packet() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        // Incomplete frame. Need more data.
                        dec.reserve(READ_BUF_SIZE);
                        let mut buf = dec.take_capacity();

                        match reader.read_buf(&mut buf).await {
                            Ok(0) => break, // Peer closed the connection.
                            Ok(_) => session.touch(),
                            Err(e) => {
                                debug!(session = %session.id(), "error reading from stream: {e}");
                                break;
                            }
                        }

                        dec.queue_bytes(buf);
                        continue;
                    }
                    Err(e) => {
                        warn!(session = %session.id(), "protocol error: {e:#}");
                        break;
                    }
                };

                let received_at = Instant::now();

                // Heartbeats exist only to refresh liveness, which every
                // received byte already did.
                if frame.id == HeartbeatC2s::ID {
                    continue;
                }

                dispatcher.enqueue(session.clone(), frame, received_at);
            }

            session.disconnect();
        });

        let session = self.clone();
        let writer_task = tokio::spawn(async move {
            loop {
                let bytes = match outgoing_rx.recv_async().await {
                    Ok(bytes) => bytes,
                    // Channel closed; the session is going away.
                    Err(_) => break,
                };

                if let Err(e) = writer.write_all(&bytes).await {
                    debug!(session = %session.id(), "error writing to stream: {e}");
                    break;
                }

                if let Err(e) = writer.flush().await {
                    debug!(session = %session.id(), "error flushing stream: {e}");
                    break;
                }
            }

            session.disconnect();
        });

        *self.inner.reader_task.lock() = Some(reader_task);
        *self.inner.writer_task.lock() = Some(writer_task);

        // A disconnect may have raced task registration; don't leave the
        // loops running for a session that is already gone.
        if !self.is_connected() {
            if let Some(task) = self.inner.reader_task.lock().take() {
                task.abort();
            }
            if let Some(task) = self.inner.writer_task.lock().take() {
                task.abort();
            }
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Stamps the last-activity timestamp with "now".
    pub fn touch(&self) {
        self.inner
            .last_activity
            .store(self.inner.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// How long ago the last frame arrived.
    pub fn idle_time(&self) -> Duration {
        let last = Duration::from_millis(self.inner.last_activity.load(Ordering::Relaxed));
        self.inner.epoch.elapsed().saturating_sub(last)
    }

    /// Serializes a packet into a frame and queues it for the write loop.
    /// Awaits when the queue is full; errors once the session disconnected.
    pub async fn send_packet<P>(&self, pkt: &P) -> anyhow::Result<()>
    where
        P: Packet + Encode,
    {
        let mut enc = PacketEncoder::new();
        enc.append_packet(pkt)?;
        self.send_bytes(enc.take()).await
    }

    /// Queues an already-framed byte run for the write loop.
    pub async fn send_bytes(&self, bytes: BytesMut) -> anyhow::Result<()> {
        if self.inner.outgoing.send_async(bytes).await.is_err() {
            bail!("session {} disconnected", self.inner.id);
        }
        Ok(())
    }

    /// Tears the connection down. Aborting the I/O tasks drops both socket
    /// halves, which closes the socket; the outbound queue loses its consumer
    /// so later sends drain to errors at the call site. Safe to call from any
    /// task, including the session's own I/O loops.
    pub fn disconnect(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        debug!(session = %self.inner.id, "disconnecting");

        if let Some(task) = self.inner.reader_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.inner.writer_task.lock().take() {
            task.abort();
        }

        if let Some(cleanup) = self.inner.cleanup.lock().take() {
            cleanup();
        }
    }
}

/// Best-effort socket tuning at accept time. Failures are logged, not fatal.
pub(crate) fn tune_socket(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("failed to set TCP_NODELAY: {e}");
    }

    let sock = socket2::SockRef::from(stream);

    if let Err(e) = sock.set_send_buffer_size(64 * 1024) {
        warn!("failed to set send buffer size: {e}");
    }
    if let Err(e) = sock.set_recv_buffer_size(64 * 1024) {
        warn!("failed to set receive buffer size: {e}");
    }

    if let Err(e) = sock.set_read_timeout(Some(Duration::from_secs(30))) {
        warn!("failed to set read timeout: {e}");
    }
    if let Err(e) = sock.set_write_timeout(Some(Duration::from_secs(30))) {
        warn!("failed to set write timeout: {e}");
    }

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10))
        .with_retries(3);

    if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
        warn!("failed to enable TCP keepalive: {e}");
    }
}
