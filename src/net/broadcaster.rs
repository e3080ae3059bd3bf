//! Outbound fan-out abstraction.
//!
//! The simulation never talks to sockets. It hands frames to a
//! [`Broadcaster`], which a transport collaborator implements. Delivery is a
//! non-blocking enqueue onto a small bounded queue: a slow client drops its
//! own frames instead of stalling the tick loop or other clients.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;

use crate::game::constants::net::CLIENT_QUEUE;
use crate::net::protocol::{encode_message, ServerMessage};

/// One frame queued for delivery to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// JSON envelope text
    Text(Vec<u8>),
    /// Binary snapshot payload
    Binary(Vec<u8>),
}

/// Sink for messages leaving the simulation.
///
/// Two capability levels: structured send (the sink encodes) and raw-bytes
/// send (the caller already encoded, shared across recipients).
pub trait Broadcaster: Send + Sync {
    /// Send a structured message (encoded by the sink)
    fn send_message(&self, msg: &ServerMessage);
    /// Send pre-encoded envelope bytes
    fn send_raw(&self, data: &[u8]);
    /// Send a pre-encoded binary snapshot
    fn send_binary(&self, data: &[u8]);
}

/// Queue-backed broadcaster: frames land on a bounded channel drained by the
/// transport's writer task. Full queue = frame dropped.
pub struct ChannelClient {
    tx: Sender<OutboundFrame>,
}

impl ChannelClient {
    /// Create a client sink and the receiver its writer drains
    pub fn new() -> (Arc<Self>, Receiver<OutboundFrame>) {
        Self::with_capacity(CLIENT_QUEUE)
    }

    pub fn with_capacity(capacity: usize) -> (Arc<Self>, Receiver<OutboundFrame>) {
        let (tx, rx) = bounded(capacity);
        (Arc::new(Self { tx }), rx)
    }

    fn push(&self, frame: OutboundFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                // Client too slow; drop rather than stall the simulation
                tracing::debug!("client outbound queue full, dropping frame");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl Broadcaster for ChannelClient {
    fn send_message(&self, msg: &ServerMessage) {
        self.push(OutboundFrame::Text(encode_message(msg)));
    }

    fn send_raw(&self, data: &[u8]) {
        self.push(OutboundFrame::Text(data.to_vec()));
    }

    fn send_binary(&self, data: &[u8]) {
        self.push(OutboundFrame::Binary(data.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_arrive_in_order() {
        let (client, rx) = ChannelClient::new();
        client.send_raw(b"one");
        client.send_binary(b"two");

        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Text(b"one".to_vec()));
        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Binary(b"two".to_vec()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (client, rx) = ChannelClient::with_capacity(2);
        client.send_raw(b"a");
        client.send_raw(b"b");
        // Queue is full; this returns immediately and the frame is dropped
        client.send_raw(b"c");

        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Text(b"a".to_vec()));
        assert_eq!(rx.try_recv().unwrap(), OutboundFrame::Text(b"b".to_vec()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_message_encodes_envelope() {
        let (client, rx) = ChannelClient::new();
        client.send_message(&ServerMessage::CtrlOn);
        match rx.try_recv().unwrap() {
            OutboundFrame::Text(data) => {
                let v: serde_json::Value = serde_json::from_slice(&data).unwrap();
                assert_eq!(v["t"], "ctrl_on");
            }
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_disconnected_receiver_is_silent() {
        let (client, rx) = ChannelClient::new();
        drop(rx);
        // Must not panic
        client.send_raw(b"into the void");
    }
}
