//! Unix socket server for the echo service.
//!
//! The listener owns the named endpoint and nothing else. Each accepted
//! peer gets a fresh [`ConnectionHandler`] plus its own reader and writer
//! tasks, so peers never share state and one peer's traffic or failure
//! cannot reach another's.

use crate::config::Config;
use crate::connection::{ConnectionHandler, Event, PeerConnection};
use crate::message::Value;
use crate::wire::{self, ParseResult};
use bytes::{Buf, BytesMut};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Server instance
pub struct Server {
    config: Config,
    connection_limit: Arc<Semaphore>,
    next_peer_id: AtomicU64,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));

        Server {
            config,
            connection_limit,
            next_peer_id: AtomicU64::new(1),
        }
    }

    /// Bind the named endpoint and begin accepting peers
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = bind_socket(&self.config.socket_path)?;
        info!(path = %self.config.socket_path.display(), "Server listening");

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let peer_id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
                    debug!(peer = peer_id, "New connection");

                    tokio::spawn(async move {
                        handle_peer(stream, peer_id).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Bind a listener at `path`, clearing a stale socket file left behind by
/// a previous process.
fn bind_socket(path: &Path) -> std::io::Result<UnixListener> {
    if path.exists() {
        debug!(path = %path.display(), "Removing stale socket file");
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path)
}

/// Set up one accepted peer: a fresh handler, its outbound channel, and
/// the reader and writer tasks that deliver its events.
async fn handle_peer(stream: UnixStream, peer_id: u64) {
    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let peer = PeerConnection::new(peer_id, outbound_tx);
    let handler = ConnectionHandler::new();

    let writer = tokio::spawn(write_outbound(write_half, outbound_rx, peer_id));

    read_events(read_half, peer, handler).await;

    // read_events consumed the peer handle, so the outbound channel is
    // closed; the writer drains what was queued and exits.
    let _ = writer.await;
}

/// Deliver the peer's inbound events to its handler in arrival order.
///
/// EOF, transport errors, and undecodable frames all collapse into a
/// single terminal [`Event::ConnectionInvalid`]; nothing after it is
/// delivered.
async fn read_events(
    mut read_half: OwnedReadHalf,
    peer: PeerConnection,
    mut handler: ConnectionHandler,
) {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        match wire::parse(&buffer) {
            ParseResult::Complete(value, consumed) => {
                buffer.advance(consumed);
                trace!(peer = peer.id(), shape = value.type_name(), "Received message");
                handler.on_event(&peer, Event::Message(value));
                continue;
            }
            ParseResult::Incomplete => {}
            ParseResult::Error(e) => {
                warn!(peer = peer.id(), error = %e, "Undecodable frame, closing connection");
                break;
            }
        }

        match read_half.read_buf(&mut buffer).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(peer = peer.id(), error = %e, "Read error");
                break;
            }
        }
    }

    handler.on_event(&peer, Event::ConnectionInvalid);
}

/// Drain the peer's outbound queue onto the socket
async fn write_outbound(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Value>,
    peer_id: u64,
) {
    let mut buf = BytesMut::with_capacity(BUFFER_SIZE);

    while let Some(value) = outbound.recv().await {
        buf.clear();
        wire::encode_into(&value, &mut buf);

        if let Err(e) = write_half.write_all(&buf).await {
            debug!(peer = peer_id, error = %e, "Write error");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_creation() {
        let config = Config {
            socket_path: std::env::temp_dir().join("echod-test-creation.sock"),
            max_connections: 16,
            log_level: "info".to_string(),
        };

        let server = Server::new(config);
        assert_eq!(server.connection_limit.available_permits(), 16);
    }

    #[tokio::test]
    async fn test_bind_socket_replaces_stale_file() {
        let path = std::env::temp_dir().join(format!("echod-stale-{}.sock", std::process::id()));
        std::fs::write(&path, b"").unwrap();

        let listener = bind_socket(&path).unwrap();
        assert!(listener.local_addr().is_ok());

        drop(listener);
        let _ = std::fs::remove_file(&path);
    }
}
