//! echod: a bidirectional message echo service over Unix domain sockets.
//!
//! A client connects to a well-known socket path and sends structured
//! messages. Every message whose outer shape is a dictionary comes back
//! unmodified on the same connection; any other shape is dropped with a
//! logged diagnostic, and peer disconnects are detected and logged.
//!
//! The crate exposes both halves: [`Server`] runs the service,
//! [`EchoClient`] connects to one.

pub mod client;
pub mod config;
pub mod connection;
pub mod message;
pub mod server;
pub mod wire;

pub use client::EchoClient;
pub use config::Config;
pub use connection::{ConnectionHandler, Event, PeerConnection};
pub use message::Value;
pub use server::Server;
