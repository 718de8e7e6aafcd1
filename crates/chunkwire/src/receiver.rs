//! Receiving endpoint. Answers chunk size requests, reassembles chunks
//! and hands finished payloads to the handler registered for their
//! namespace.

use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use chunkwire_core::assembly::{Assembly, Progress};
use chunkwire_core::config::ChunkwireConfig;
use chunkwire_core::{deserialize, ChunkMessage, FieldMap, KeyedMessage, Payload, MAX_NAMESPACE_LEN};

/// Smallest inbox that can hold a chunk message: one u32 per key of the
/// four chunk fields, the namespace, the remaining and total counters, and
/// at least one byte of chunk data.
pub const MIN_INBOX_SIZE: u32 = 4 * 4 + MAX_NAMESPACE_LEN as u32 + 4 + 4 + 1;

/// Chunk size advertised for a given inbox size, if the inbox is big enough.
pub fn chunk_size_for_inbox(inbox_size: u32) -> Option<NonZeroU32> {
    inbox_size
        .checked_sub(MIN_INBOX_SIZE + 1)
        .and_then(NonZeroU32::new)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiverError {
    #[error("inbox of {inbox_size} bytes is too small, need more than {} bytes", MIN_INBOX_SIZE + 1)]
    InboxTooSmall { inbox_size: u32 },
    #[error("namespace is {len} bytes long, at most {max} are allowed")]
    NamespaceTooLong { len: usize, max: usize },
}

pub type MessageHandler = Arc<dyn Fn(&Payload) + Send + Sync>;

pub struct Receiver {
    fields: FieldMap,
    chunk_size: NonZeroU32,
    handlers: DashMap<String, MessageHandler>,
    assembly: Mutex<Assembly>,
}

impl Receiver {
    pub fn new(fields: FieldMap, inbox_size: u32) -> Result<Self, ReceiverError> {
        let chunk_size =
            chunk_size_for_inbox(inbox_size).ok_or(ReceiverError::InboxTooSmall { inbox_size })?;
        tracing::debug!(inbox_size, chunk_size = chunk_size.get(), "receiver ready");

        Ok(Self {
            fields,
            chunk_size,
            handlers: DashMap::new(),
            assembly: Mutex::new(Assembly::new(chunk_size.get())),
        })
    }

    pub fn from_config(config: &ChunkwireConfig) -> Result<Self, ReceiverError> {
        Self::new(config.fields, config.receiver.inbox_size)
    }

    pub fn chunk_size(&self) -> NonZeroU32 {
        self.chunk_size
    }

    /// Register (or replace) the handler for `namespace`.
    pub fn register<F>(&self, namespace: &str, handler: F) -> Result<(), ReceiverError>
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        if namespace.len() > MAX_NAMESPACE_LEN {
            return Err(ReceiverError::NamespaceTooLong {
                len: namespace.len(),
                max: MAX_NAMESPACE_LEN,
            });
        }
        self.handlers.insert(namespace.to_string(), Arc::new(handler));
        Ok(())
    }

    /// Returns true if a handler was registered.
    pub fn deregister(&self, namespace: &str) -> bool {
        self.handlers.remove(namespace).is_some()
    }

    /// Process one inbound message. Returns the reply to send back, if any.
    pub fn handle(&self, message: &KeyedMessage) -> Option<KeyedMessage> {
        if message.contains_key(&self.fields.chunk_size) {
            tracing::info!(chunk_size = self.chunk_size.get(), "answering chunk size request");
            return Some(self.fields.chunk_size_response(self.chunk_size.get()));
        }

        let chunk = match ChunkMessage::from_message(message, &self.fields) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed chunk");
                return None;
            }
        };

        if chunk.namespace.len() > MAX_NAMESPACE_LEN {
            tracing::warn!(len = chunk.namespace.len(), "ignoring chunk with oversized namespace");
            return None;
        }

        let handler = match self.handlers.get(&chunk.namespace) {
            Some(entry) => entry.value().clone(),
            None => {
                tracing::warn!(namespace = %chunk.namespace, "ignoring chunk for unknown namespace");
                return None;
            }
        };

        let progress = {
            let mut assembly = self.assembly.lock().unwrap_or_else(|e| e.into_inner());
            assembly.update(&chunk)
        };

        let tokens = match progress {
            Ok(Progress::Complete(tokens)) => tokens,
            Ok(Progress::Pending { remaining }) => {
                tracing::trace!(namespace = %chunk.namespace, remaining, "chunk assembled");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "unexpected chunk received");
                return None;
            }
        };

        match deserialize(&tokens) {
            Ok(payload) => {
                tracing::debug!(namespace = %chunk.namespace, fields = payload.len(), "payload delivered");
                handler(&payload);
            }
            Err(e) => tracing::warn!(namespace = %chunk.namespace, error = %e, "failed to deserialize payload"),
        }
        None
    }
}
