//! The networking runtime of the outpost world server: per-connection
//! sessions with split read/write tasks, a capped connection registry, a
//! priority-dispatched worker pool, and a liveness monitor.
//!
//! Nothing in this crate knows about the game. Inbound frames are handed to a
//! [`PacketHandler`] installed by the caller; everything else is transport.

mod dispatch;
mod liveness;
mod registry;
mod server;
mod session;

pub use async_trait::async_trait;
pub use dispatch::{PacketContext, PacketDispatcher, PacketHandler};
pub use liveness::spawn_liveness_monitor;
pub use registry::{ConnectionRegistry, SessionEvent};
pub use server::{do_accept_loop, NetworkSettings};
pub use session::{CleanupFn, Session, SessionId};
