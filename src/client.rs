//! Client connection to the echo service.
//!
//! Mirrors the server's model from the other side: sends are
//! fire-and-forget and inbound messages arrive through a [`Stream`] that
//! simply ends once the connection becomes invalid.

use crate::message::Value;
use crate::wire::{self, ParseResult};
use bytes::{Buf, BytesMut};
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// A client's connection to the service.
pub struct EchoClient {
    outbound: mpsc::UnboundedSender<Value>,
    inbound: mpsc::UnboundedReceiver<Value>,
}

impl EchoClient {
    /// Connect to the service listening at `path`.
    pub async fn connect<P: AsRef<Path>>(path: P) -> std::io::Result<EchoClient> {
        let stream = UnixStream::connect(path).await?;
        let (read_half, write_half) = stream.into_split();

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_requests(write_half, outbound_rx));
        tokio::spawn(read_replies(read_half, inbound_tx));

        Ok(EchoClient {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    /// Queue a message for delivery to the service.
    ///
    /// Fire-and-forget: a send after the connection became invalid is
    /// ignored, and the failure is observed as the end of the inbound
    /// stream instead.
    pub fn send(&self, value: Value) {
        let _ = self.outbound.send(value);
    }
}

impl Stream for EchoClient {
    type Item = Value;

    /// `Poll::Ready(None)` once the connection is invalid; invalidation is
    /// not recoverable, so there is no error item to observe.
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx)
    }
}

/// Drain queued messages onto the socket
async fn write_requests(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Value>,
) {
    let mut buf = BytesMut::with_capacity(BUFFER_SIZE);

    while let Some(value) = outbound.recv().await {
        buf.clear();
        wire::encode_into(&value, &mut buf);

        if let Err(e) = write_half.write_all(&buf).await {
            debug!(error = %e, "Write error");
            break;
        }
    }
}

/// Feed decoded replies into the inbound channel until the transport ends
async fn read_replies(mut read_half: OwnedReadHalf, inbound: mpsc::UnboundedSender<Value>) {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        match wire::parse(&buffer) {
            ParseResult::Complete(value, consumed) => {
                buffer.advance(consumed);
                if inbound.send(value).is_err() {
                    break;
                }
                continue;
            }
            ParseResult::Incomplete => {}
            ParseResult::Error(e) => {
                debug!(error = %e, "Undecodable reply, closing connection");
                break;
            }
        }

        match read_half.read_buf(&mut buffer).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Read error");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_missing_socket() {
        let path = std::env::temp_dir().join("echod-no-such-socket.sock");
        assert!(EchoClient::connect(&path).await.is_err());
    }
}
