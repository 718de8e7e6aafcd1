//! Chunk planning. Splits a token stream into ordered, bounded chunks.

use std::num::NonZeroU32;

use bytes::Bytes;

/// One planned slice of the token stream with its position metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChunk {
    pub data: Bytes,
    /// Chunks still to send after this one.
    pub remaining: u32,
    /// Number of chunks in the whole transfer.
    pub total: u32,
}

/// Partition `tokens` into groups of `chunk_size` tokens.
///
/// Only the final group may be shorter. An empty stream still yields one
/// empty chunk so the receiver sees at least one message per transfer.
pub fn plan(tokens: &[u8], chunk_size: NonZeroU32) -> Vec<PlannedChunk> {
    let tokens = Bytes::copy_from_slice(tokens);
    let size = chunk_size.get() as usize;

    let slices: Vec<Bytes> = if tokens.is_empty() {
        vec![Bytes::new()]
    } else {
        (0..tokens.len())
            .step_by(size)
            .map(|start| tokens.slice(start..(start + size).min(tokens.len())))
            .collect()
    };

    let total = slices.len() as u32;
    slices
        .into_iter()
        .enumerate()
        .map(|(index, data)| PlannedChunk {
            data,
            remaining: total - 1 - index as u32,
            total,
        })
        .collect()
}
