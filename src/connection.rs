//! Per-peer connection handling.
//!
//! Each accepted peer gets its own [`ConnectionHandler`], a two-state
//! machine fed one [`Event`] at a time in arrival order. Dictionary
//! messages are echoed back on the same peer and any other shape is
//! dropped with a diagnostic. The disconnect sentinel closes the handler
//! for good.

use crate::message::Value;
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

/// A unit of notification delivered to a connection handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A message arrived from the peer
    Message(Value),
    /// The peer's channel is gone; no further events follow
    ConnectionInvalid,
}

/// Handler lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Processing events
    Active,
    /// Disconnect observed; all further events are ignored
    Closed,
}

/// One peer's live channel back to the service.
///
/// Holds the outbound half only; the peer's inbound traffic is delivered
/// to its handler as [`Event`]s by the connection tasks.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    id: u64,
    outbound: mpsc::UnboundedSender<Value>,
}

impl PeerConnection {
    pub fn new(id: u64, outbound: mpsc::UnboundedSender<Value>) -> Self {
        PeerConnection { id, outbound }
    }

    /// Process-wide id assigned at accept time
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a value for delivery to the peer.
    ///
    /// Fire-and-forget: delivery is not confirmed and a send after the
    /// writer is gone is ignored. That failure surfaces on the inbound
    /// side as a later [`Event::ConnectionInvalid`].
    pub fn send(&self, value: Value) {
        let _ = self.outbound.send(value);
    }
}

/// Per-peer echo and validation policy.
pub struct ConnectionHandler {
    state: HandlerState,
}

impl ConnectionHandler {
    pub fn new() -> Self {
        ConnectionHandler {
            state: HandlerState::Active,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == HandlerState::Closed
    }

    /// Process one event for this handler's peer.
    ///
    /// A dictionary message is sent back verbatim on the same peer, and
    /// any other message shape is dropped with a diagnostic. A disconnect
    /// closes the handler; once closed it ignores events for good, even
    /// ones delivered after the fact.
    pub fn on_event(&mut self, peer: &PeerConnection, event: Event) {
        if self.state == HandlerState::Closed {
            return;
        }

        match event {
            Event::ConnectionInvalid => {
                info!(peer = peer.id(), "Connection closed by remote end");
                self.state = HandlerState::Closed;
            }
            Event::Message(value) => {
                if value.is_dictionary() {
                    trace!(peer = peer.id(), shape = value.type_name(), "Echoing message");
                    peer.send(value);
                } else {
                    warn!(
                        peer = peer.id(),
                        shape = value.type_name(),
                        "Dropping message with unexpected shape"
                    );
                }
            }
        }
    }
}

impl Default for ConnectionHandler {
    fn default() -> Self {
        Self::new()
    }
}
