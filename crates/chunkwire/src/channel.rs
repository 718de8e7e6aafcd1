//! The small-message transport chunkwire sends over.
//!
//! Implementations wrap whatever actually moves keyed messages between
//! the two endpoints. The core only needs an acknowledged send and a feed
//! of inbound messages; everything else is the adapter's business.

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use chunkwire_core::KeyedMessage;

use crate::error::ChannelError;

/// A message received from the other endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub payload: KeyedMessage,
}

impl From<KeyedMessage> for InboundMessage {
    fn from(payload: KeyedMessage) -> Self {
        Self { payload }
    }
}

/// Transport used by a [`Session`](crate::Session).
///
/// The channel may be shared with unrelated traffic, so subscribers see
/// every inbound message and must ignore what is not theirs.
pub trait ChannelAdapter: Send + Sync {
    /// Hand one message to the transport. The future resolves once the
    /// other side acknowledged it, or with the reason it was not.
    fn send_raw(&self, message: KeyedMessage) -> BoxFuture<'static, Result<(), ChannelError>>;

    /// Start receiving inbound messages. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<InboundMessage>;
}
