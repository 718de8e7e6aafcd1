use std::time::Duration;

use chunkwire_core::SerializationError;

/// Failure reported by a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel rejected message: {reason}")]
    Rejected { reason: String },
    #[error("channel closed")]
    Closed,
}

impl ChannelError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ChannelError::Rejected {
            reason: reason.into(),
        }
    }
}

/// Outcome of a failed send. Every failure of a transfer surfaces as one
/// of these, exactly once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("namespace is {len} bytes long, at most {max} are allowed")]
    NamespaceTooLong { len: usize, max: usize },
    #[error("request for chunk size timed out after {0:?}")]
    HandshakeTimeout(Duration),
    #[error("receiver reported an invalid chunk size: {0}")]
    InvalidChunkSize(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] SerializationError),
}
