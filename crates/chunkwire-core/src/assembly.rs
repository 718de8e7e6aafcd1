//! Receiver-side assembly of chunked transfers.
//!
//! An assembly collects the chunks of one transfer, in order, until the
//! chunk with `remaining == 0` arrives. Any chunk that does not continue
//! the transfer in progress resets the assembly and is rejected; the
//! sender never reorders, so a gap means the transfer is lost. The one
//! exception is the first chunk of a new transfer, which replaces an
//! interrupted one instead of being dropped with it.

use bytes::{Bytes, BytesMut};

use crate::wire::ChunkMessage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("chunk for {namespace:?} does not continue the transfer in progress")]
    UnexpectedChunk { namespace: String },
    #[error("chunk header is inconsistent: remaining {remaining}, total {total}")]
    BadHeader { remaining: u32, total: u32 },
}

/// Most chunks an assembly reserves room for up front.
const PREALLOC_CHUNKS: usize = 64;

/// Result of feeding one chunk into an assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More chunks are expected.
    Pending { remaining: u32 },
    /// The transfer is complete; the full token stream.
    Complete(Bytes),
}

#[derive(Debug)]
struct InProgress {
    namespace: String,
    buffer: BytesMut,
    total: u32,
    remaining: u32,
}

/// In-order reassembly state for one receiver.
#[derive(Debug)]
pub struct Assembly {
    chunk_size: usize,
    state: Option<InProgress>,
}

impl Assembly {
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size as usize,
            state: None,
        }
    }

    /// Namespace of the transfer in progress, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.namespace.as_str())
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn update(&mut self, chunk: &ChunkMessage) -> Result<Progress, AssemblyError> {
        if chunk.total == 0 || chunk.remaining >= chunk.total {
            self.reset();
            return Err(AssemblyError::BadHeader {
                remaining: chunk.remaining,
                total: chunk.total,
            });
        }

        let opens = chunk.remaining + 1 == chunk.total;
        let continues = match &self.state {
            Some(s) => {
                s.namespace == chunk.namespace
                    && s.total == chunk.total
                    && s.remaining == chunk.remaining + 1
            }
            None => opens,
        };
        if !continues && opens {
            if let Some(stale) = self.state.take() {
                tracing::warn!(
                    namespace = %stale.namespace,
                    remaining = stale.remaining,
                    "abandoning interrupted transfer"
                );
            }
        } else if !continues {
            self.reset();
            return Err(AssemblyError::UnexpectedChunk {
                namespace: chunk.namespace.clone(),
            });
        }

        // `total` comes off the wire; grow past the cap as chunks arrive
        let capacity = self.chunk_size * (chunk.total as usize).min(PREALLOC_CHUNKS);
        let state = self.state.get_or_insert_with(|| InProgress {
            namespace: chunk.namespace.clone(),
            buffer: BytesMut::with_capacity(capacity),
            total: chunk.total,
            remaining: chunk.total,
        });
        state.buffer.extend_from_slice(&chunk.data);
        state.remaining -= 1;

        if state.remaining > 0 {
            return Ok(Progress::Pending {
                remaining: state.remaining,
            });
        }

        let done = self.state.take().map(|s| s.buffer.freeze()).unwrap_or_default();
        tracing::debug!(
            namespace = %chunk.namespace,
            total = chunk.total,
            bytes = done.len(),
            "assembly complete"
        );
        Ok(Progress::Complete(done))
    }
}
