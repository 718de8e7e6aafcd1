//! One logical send, from namespace check to final outcome.
//!
//! A transfer walks a fixed pipeline:
//!
//! ```text
//! Idle → [Discovering] → Transmitting(0..total) → Done
//!                 ╲               ╲
//!                  → Failed        → Failed
//! ```
//!
//! Chunks go out strictly one after another; chunk i+1 is handed to the
//! channel only after chunk i was acknowledged, because the receiver
//! rebuilds the token stream by concatenation. The first failure ends the
//! transfer; nothing is retried.

use chunkwire_core::{plan, serialize, ChunkMessage, Payload, MAX_NAMESPACE_LEN};

use crate::error::TransferError;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Discovering,
    Transmitting { index: u32, total: u32 },
    Done,
    Failed,
}

pub(crate) fn check_namespace(namespace: &str) -> Result<(), TransferError> {
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(TransferError::NamespaceTooLong {
            len: namespace.len(),
            max: MAX_NAMESPACE_LEN,
        });
    }
    Ok(())
}

pub struct Transfer<'a> {
    namespace: &'a str,
    payload: &'a Payload,
    state: TransferState,
    transitions: Vec<TransferState>,
}

impl<'a> Transfer<'a> {
    /// Rejects a namespace longer than [`MAX_NAMESPACE_LEN`] bytes.
    pub fn new(namespace: &'a str, payload: &'a Payload) -> Result<Self, TransferError> {
        check_namespace(namespace)?;
        Ok(Self {
            namespace,
            payload,
            state: TransferState::Idle,
            transitions: vec![TransferState::Idle],
        })
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Every state this transfer has been in, oldest first.
    pub fn transitions(&self) -> &[TransferState] {
        &self.transitions
    }

    pub async fn run(&mut self, session: &Session) -> Result<(), TransferError> {
        let result = self.drive(session).await;
        match &result {
            Ok(()) => {
                self.enter(TransferState::Done);
                tracing::info!(namespace = %self.namespace, "transfer complete");
            }
            Err(e) => {
                self.enter(TransferState::Failed);
                tracing::warn!(namespace = %self.namespace, error = %e, "transfer failed");
            }
        }
        result
    }

    async fn drive(&mut self, session: &Session) -> Result<(), TransferError> {
        let chunk_size = match session.handshake.known() {
            Some(size) => size,
            None => {
                self.enter(TransferState::Discovering);
                session.handshake.chunk_size().await?
            }
        };

        let tokens = serialize(self.payload)?;
        let chunks = plan(&tokens, chunk_size);
        tracing::debug!(
            namespace = %self.namespace,
            tokens = tokens.len(),
            head = %hex::encode(&tokens[..tokens.len().min(16)]),
            chunk_size = chunk_size.get(),
            chunks = chunks.len(),
            "transfer planned"
        );

        let _queue = session.queue.lock().await;
        for (index, chunk) in chunks.into_iter().enumerate() {
            self.enter(TransferState::Transmitting {
                index: index as u32,
                total: chunk.total,
            });
            tokio::time::sleep(session.chunk_delay).await;

            let message = ChunkMessage {
                namespace: self.namespace.to_string(),
                remaining: chunk.remaining,
                total: chunk.total,
                data: chunk.data,
            }
            .to_message(&session.fields);
            session.channel.send_raw(message).await?;

            tracing::trace!(
                namespace = %self.namespace,
                remaining = chunk.remaining,
                total = chunk.total,
                "chunk acknowledged"
            );
        }
        Ok(())
    }

    fn enter(&mut self, state: TransferState) {
        tracing::trace!(namespace = %self.namespace, from = ?self.state, to = ?state, "transfer state");
        self.state = state;
        self.transitions.push(state);
    }
}
