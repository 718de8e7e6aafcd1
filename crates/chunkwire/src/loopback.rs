//! In-process channel that delivers straight into a [`Receiver`].

use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::broadcast;

use chunkwire_core::KeyedMessage;

use crate::channel::{ChannelAdapter, InboundMessage};
use crate::error::ChannelError;
use crate::receiver::Receiver;

const INBOUND_CAPACITY: usize = 64;

/// Every sent message is handled by the receiver before it is
/// acknowledged; the receiver's replies come back as inbound messages.
pub struct LoopbackChannel {
    receiver: Arc<Receiver>,
    inbound: broadcast::Sender<InboundMessage>,
}

impl LoopbackChannel {
    pub fn new(receiver: Arc<Receiver>) -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        Self { receiver, inbound }
    }

    /// Publish a message as if it came from the other endpoint.
    pub fn inject(&self, message: KeyedMessage) {
        // no subscribers is fine, nobody is listening yet
        let _ = self.inbound.send(message.into());
    }
}

impl ChannelAdapter for LoopbackChannel {
    fn send_raw(&self, message: KeyedMessage) -> BoxFuture<'static, Result<(), ChannelError>> {
        if let Some(reply) = self.receiver.handle(&message) {
            self.inject(reply);
        }
        future::ready(Ok(())).boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }
}
