//! The world simulation and game service of the outpost server: entities and
//! monster AI, the spatial grid, per-session interest areas, delta tracking,
//! the map tick loop, and the login/reconnect/move handlers that tie them to
//! the network layer.

pub mod auth;
pub mod character;
pub mod config;
pub mod descriptor;
pub mod entity;
pub mod game;
pub mod grid;
pub mod interest;
pub mod map;
pub mod monster;
pub mod pool;
mod server;
pub mod tracker;

pub use auth::{Authenticator, InMemoryAuthenticator};
pub use config::{GameSettings, ServerConfig};
pub use descriptor::MapDescriptor;
pub use game::GameService;
pub use map::{spawn_tick_loop, Map, TickObserver};
pub use server::Server;
