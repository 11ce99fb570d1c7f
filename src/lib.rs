#![doc = include_str!("../README.md")]

pub use outpost_network as network;
pub use outpost_protocol as protocol;
pub use outpost_server as server;

#[cfg(test)]
mod tests;
