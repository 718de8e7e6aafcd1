//! Chunk size discovery.
//!
//! The receiver's chunk size is asked for once per session: subscribe to
//! inbound messages, send a CHUNK_SIZE request, and wait for the first
//! inbound message carrying that field. The wait is bounded by the
//! handshake timeout, which covers both the acknowledgment of the request
//! and the reply. A failed attempt leaves the size unknown so the next
//! send tries again; a discovered size is kept for the session's lifetime.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use chunkwire_core::{FieldMap, FieldValue};

use crate::channel::ChannelAdapter;
use crate::error::{ChannelError, TransferError};

/// Where discovery currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unknown,
    Requesting,
    Known(NonZeroU32),
}

pub struct HandshakeManager {
    channel: Arc<dyn ChannelAdapter>,
    fields: FieldMap,
    timeout: Duration,
    chunk_size: OnceCell<NonZeroU32>,
    in_flight: AtomicBool,
}

impl HandshakeManager {
    pub fn new(channel: Arc<dyn ChannelAdapter>, fields: FieldMap, timeout: Duration) -> Self {
        Self {
            channel,
            fields,
            timeout,
            chunk_size: OnceCell::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> HandshakeState {
        match self.chunk_size.get() {
            Some(size) => HandshakeState::Known(*size),
            None if self.in_flight.load(Ordering::Acquire) => HandshakeState::Requesting,
            None => HandshakeState::Unknown,
        }
    }

    pub fn known(&self) -> Option<NonZeroU32> {
        self.chunk_size.get().copied()
    }

    /// Record a chunk size obtained out of band. Returns false if one is
    /// already established; an established size is never replaced.
    pub fn set_known(&self, size: NonZeroU32) -> bool {
        self.chunk_size.set(size).is_ok()
    }

    /// The session's chunk size, discovering it first if needed.
    ///
    /// Concurrent callers share one discovery: while a request is in
    /// flight, later callers wait for it instead of sending their own. If
    /// that attempt fails, its caller gets the error and the next waiter
    /// starts a fresh attempt.
    pub async fn chunk_size(&self) -> Result<NonZeroU32, TransferError> {
        self.chunk_size
            .get_or_try_init(|| self.discover())
            .await
            .copied()
    }

    async fn discover(&self) -> Result<NonZeroU32, TransferError> {
        let _flight = InFlight::enter(&self.in_flight);

        // subscribe before sending so a fast reply cannot be missed
        let mut inbox = self.channel.subscribe();
        tracing::debug!(timeout = ?self.timeout, "requesting chunk size");
        let request = self.channel.send_raw(self.fields.chunk_size_request());

        let exchange = async {
            if let Err(e) = request.await {
                tracing::warn!(error = %e, "failed to request chunk size");
                return Err(TransferError::from(e));
            }

            loop {
                match inbox.recv().await {
                    Ok(msg) => match msg.payload.get(&self.fields.chunk_size) {
                        Some(value) => return validate(value),
                        None => tracing::trace!("ignoring inbound message without chunk size"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "inbound messages dropped while waiting for chunk size");
                    }
                    Err(RecvError::Closed) => return Err(ChannelError::Closed.into()),
                }
            }
        };

        let result = match timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::HandshakeTimeout(self.timeout)),
        };

        match &result {
            Ok(size) => tracing::info!(chunk_size = size.get(), "chunk size discovered"),
            Err(e) => tracing::warn!(error = %e, "chunk size discovery failed"),
        }
        result
    }
}

fn validate(value: &FieldValue) -> Result<NonZeroU32, TransferError> {
    value
        .as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .and_then(NonZeroU32::new)
        .ok_or_else(|| TransferError::InvalidChunkSize(format!("{value:?}")))
}

/// Marks discovery as in flight for as long as it lives.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
