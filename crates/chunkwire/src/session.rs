//! One sender's view of a channel.
//!
//! A session owns everything that outlives a single send: the channel,
//! the discovered chunk size, and the transmit queue that keeps the
//! chunks of concurrent sends from interleaving.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use chunkwire_core::config::ChunkwireConfig;
use chunkwire_core::{FieldMap, Payload};

use crate::channel::ChannelAdapter;
use crate::error::TransferError;
use crate::handshake::{HandshakeManager, HandshakeState};
use crate::transfer::{check_namespace, Transfer};

pub struct Session {
    pub(crate) channel: Arc<dyn ChannelAdapter>,
    pub(crate) fields: FieldMap,
    pub(crate) handshake: HandshakeManager,
    pub(crate) chunk_delay: Duration,
    /// Held for the whole transmission phase of a transfer. Tokio's mutex
    /// is fair, so waiting transfers go out in arrival order.
    pub(crate) queue: Mutex<()>,
}

impl Session {
    pub fn new(channel: Arc<dyn ChannelAdapter>, config: &ChunkwireConfig) -> Self {
        let fields = config.fields;
        Self {
            handshake: HandshakeManager::new(
                channel.clone(),
                fields,
                config.transfer.handshake_timeout(),
            ),
            channel,
            fields,
            chunk_delay: config.transfer.chunk_delay(),
            queue: Mutex::new(()),
        }
    }

    /// Use a chunk size known in advance instead of discovering it.
    pub fn with_chunk_size(self, chunk_size: NonZeroU32) -> Self {
        self.handshake.set_known(chunk_size);
        self
    }

    pub fn chunk_size(&self) -> Option<NonZeroU32> {
        self.handshake.known()
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.state()
    }

    /// Send `payload` under `namespace` and wait for the single outcome.
    pub async fn send(&self, namespace: &str, payload: &Payload) -> Result<(), TransferError> {
        let mut transfer = Transfer::new(namespace, payload)?;
        transfer.run(self).await
    }

    /// Callback form of [`Session::send`]. `on_done` runs exactly once:
    /// immediately, before this returns, if the namespace is rejected;
    /// otherwise from a spawned task when the transfer finishes. Must be
    /// called from within a tokio runtime.
    pub fn send_with<F>(self: &Arc<Self>, namespace: &str, payload: Payload, on_done: F)
    where
        F: FnOnce(Result<(), TransferError>) + Send + 'static,
    {
        if let Err(e) = check_namespace(namespace) {
            on_done(Err(e));
            return;
        }

        let session = Arc::clone(self);
        let namespace = namespace.to_string();
        tokio::spawn(async move {
            let result = session.send(&namespace, &payload).await;
            on_done(result);
        });
    }
}
