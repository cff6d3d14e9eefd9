//! The transport boundary the core consumes (spec §6): a reliable,
//! total-order byte sink plus an advisory connection-status signal. Opening
//! the serial port, baud rate and raw read/write all live on the caller's
//! side; this crate only ever sees already-framed bytes going out and an
//! append-only byte stream coming in.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Advisory connection status. The core never changes behavior based on
/// this beyond logging it; callers may use it to drive reconnect logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Connected,
    Disconnected,
    Error(String),
}

/// Implemented by the caller-supplied serial transport.
///
/// Inbound bytes are not delivered through this trait; they are pushed into
/// the controller via the `mpsc::Receiver<Bytes>` supplied at construction,
/// which keeps the push direction out of the trait object and lets the
/// controller own its own read loop.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Writes one logical frame. Must preserve the order of calls and must
    /// not interleave two concurrent writes — from the core's perspective
    /// this is one atomic write, even if the transport fragments it on the
    /// wire.
    async fn send_bytes(&self, bytes: Bytes) -> Result<()>;
}
