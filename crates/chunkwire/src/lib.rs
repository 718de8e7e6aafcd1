//! chunkwire — send large payloads over a channel that only carries small
//! messages.
//!
//! A [`Session`] discovers the receiver's chunk size once, then every send
//! serializes its payload, splits the token stream into chunks and hands
//! them to the [`ChannelAdapter`] strictly in order, one acknowledgment at
//! a time.

pub mod channel;
pub mod error;
pub mod handshake;
pub mod loopback;
pub mod receiver;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use channel::{ChannelAdapter, InboundMessage};
pub use error::{ChannelError, TransferError};
pub use handshake::{HandshakeManager, HandshakeState};
pub use loopback::LoopbackChannel;
pub use receiver::{Receiver, ReceiverError};
pub use session::Session;
pub use transfer::{Transfer, TransferState};
