//! Failure paths: lost handshakes, bad chunk sizes, rejected chunks and
//! receivers that cannot be built.

use super::*;

use chunkwire::{HandshakeState, ReceiverError, TransferError};
use chunkwire_core::Value;
use tokio::sync::oneshot;

fn blob(len: usize) -> Payload {
    Payload::new().with("blob", vec![7u8; len])
}

/// Give a spawned send time to reach its wait for the chunk size reply.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ══════════════════════════════════════════════════════════════════════════════
// Handshake
// ══════════════════════════════════════════════════════════════════════════════

/// A lost size request times out, and the next send asks again.
#[tokio::test(start_paused = true)]
async fn lost_discovery_times_out_then_retries() -> Result<()> {
    let config = test_config(64);
    let (receiver, delivered) = receiver_for(&config, NS)?;
    let channel = FaultyChannel::new(receiver);
    channel.fault(0, Fault::Drop);
    let session = session_over(channel.clone(), &config);

    let err = session.send(NS, &blob(10)).await.unwrap_err();
    assert_eq!(err, TransferError::HandshakeTimeout(SHORT));
    assert_eq!(session.handshake_state(), HandshakeState::Unknown);
    assert!(delivered.lock().unwrap().is_empty());

    session.send(NS, &blob(10)).await?;
    assert_eq!(delivered.lock().unwrap().len(), 1);
    Ok(())
}

/// The timeout also covers a request that is delivered but never
/// acknowledged, even though the receiver answered it.
#[tokio::test(start_paused = true)]
async fn unacknowledged_discovery_times_out() -> Result<()> {
    let config = test_config(64);
    let (receiver, _delivered) = receiver_for(&config, NS)?;
    let channel = FaultyChannel::new(receiver);
    channel.fault(0, Fault::Silent);
    let session = session_over(channel.clone(), &config);

    let err = session.send(NS, &blob(10)).await.unwrap_err();
    assert_eq!(err, TransferError::HandshakeTimeout(SHORT));
    assert_eq!(session.chunk_size(), None);
    Ok(())
}

/// Inbound traffic without a chunk size does not end the handshake.
#[tokio::test(start_paused = true)]
async fn stray_inbound_messages_are_ignored() -> Result<()> {
    let config = test_config(64);
    let (receiver, delivered) = receiver_for(&config, NS)?;
    let channel = FaultyChannel::new(receiver);
    channel.fault(0, Fault::Swallow);
    let session = session_over(channel.clone(), &config);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.send(NS, &blob(30)).await }
    });
    settle().await;
    assert_eq!(session.handshake_state(), HandshakeState::Requesting);

    channel.inject(KeyedMessage::from([(99, FieldValue::Int(1))]));
    channel.inject(config.fields.chunk_size_response(22));

    task.await??;
    assert_eq!(session.chunk_size().map(|n| n.get()), Some(22));
    assert_eq!(delivered.lock().unwrap().len(), 1);
    Ok(())
}

/// A zero chunk size fails the send and leaves the session undiscovered.
#[tokio::test(start_paused = true)]
async fn invalid_chunk_size_is_recoverable() -> Result<()> {
    let config = test_config(64);
    let (receiver, delivered) = receiver_for(&config, NS)?;
    let channel = FaultyChannel::new(receiver);
    channel.fault(0, Fault::Swallow);
    let session = session_over(channel.clone(), &config);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.send(NS, &blob(30)).await }
    });
    settle().await;
    channel.inject(KeyedMessage::from([(config.fields.chunk_size, FieldValue::Int(0))]));

    let err = task.await?.unwrap_err();
    assert!(matches!(err, TransferError::InvalidChunkSize(_)), "{err:?}");
    assert_eq!(session.handshake_state(), HandshakeState::Unknown);

    // call 1 is a fresh request, answered by the receiver itself
    session.send(NS, &blob(30)).await?;
    assert_eq!(delivered.lock().unwrap().len(), 1);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Transmission
// ══════════════════════════════════════════════════════════════════════════════

/// A rejected chunk aborts the transfer; later chunks are never sent, and
/// the next transfer still gets through.
#[tokio::test(start_paused = true)]
async fn rejected_chunk_aborts_transfer() -> Result<()> {
    let config = test_config(64);
    let (receiver, delivered) = receiver_for(&config, NS)?;
    let channel = FaultyChannel::new(receiver);
    // call 0 is discovery, calls 1.. are chunks
    channel.fault(2, Fault::Reject("outbox full"));
    let session = session_over(channel.clone(), &config);

    let err = session.send(NS, &blob(100)).await.unwrap_err();
    assert_eq!(err, TransferError::Channel(ChannelError::rejected("outbox full")));
    assert_eq!(channel.calls(), 3);
    assert!(delivered.lock().unwrap().is_empty());

    session.send(NS, &blob(100)).await?;
    let got = delivered.lock().unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].get("blob"), Some(&Value::Data(vec![7u8; 100])));
    Ok(())
}

/// Payloads the codec cannot encode fail before anything is transmitted.
#[tokio::test(start_paused = true)]
async fn unencodable_payload_sends_no_chunks() -> Result<()> {
    let config = test_config(64);
    let (receiver, _delivered) = receiver_for(&config, NS)?;
    let channel = FaultyChannel::new(receiver);
    let session = session_over(channel.clone(), &config);

    let payload = Payload::new().with("big", i64::from(i32::MAX) + 1);
    let err = session.send(NS, &payload).await.unwrap_err();
    assert!(matches!(err, TransferError::Serialization(_)), "{err:?}");
    // only the discovery request went out
    assert_eq!(channel.calls(), 1);
    Ok(())
}

/// Chunks for a namespace nobody registered are acknowledged and dropped.
#[tokio::test(start_paused = true)]
async fn unregistered_namespace_is_dropped_by_receiver() -> Result<()> {
    let config = test_config(64);
    let (receiver, delivered) = receiver_for(&config, NS)?;
    let session = session_over(FaultyChannel::new(receiver), &config);

    session.send("ELSEWHERE", &blob(50)).await?;
    assert!(delivered.lock().unwrap().is_empty());
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Validation
// ══════════════════════════════════════════════════════════════════════════════

/// An over-long namespace fails synchronously and touches nothing.
#[tokio::test(start_paused = true)]
async fn long_namespace_fails_before_any_io() -> Result<()> {
    let config = test_config(64);
    let (receiver, _delivered) = receiver_for(&config, NS)?;
    let channel = FaultyChannel::new(receiver);
    let session = session_over(channel.clone(), &config);
    let namespace = "N".repeat(17);

    let err = session.send(&namespace, &blob(1)).await.unwrap_err();
    assert_eq!(err, TransferError::NamespaceTooLong { len: 17, max: 16 });

    let (tx, mut rx) = oneshot::channel();
    session.send_with(&namespace, blob(1), move |result| {
        let _ = tx.send(result);
    });
    // reported before send_with returned
    assert!(matches!(rx.try_recv(), Ok(Err(TransferError::NamespaceTooLong { .. }))));

    assert_eq!(channel.calls(), 0);
    assert_eq!(session.handshake_state(), HandshakeState::Unknown);
    Ok(())
}

/// A receiver whose inbox cannot hold a chunk header refuses to start.
#[test]
fn tiny_inbox_is_rejected() {
    let config = test_config(42);
    assert_eq!(
        Receiver::from_config(&config).err(),
        Some(ReceiverError::InboxTooSmall { inbox_size: 42 })
    );
    assert!(Receiver::from_config(&test_config(43)).is_ok());
}
