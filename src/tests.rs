mod connection;
mod harness;
mod login;
mod reconnect;
