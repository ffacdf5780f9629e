//! Integration tests for DeviceCodec with Tokio streams.
//!
//! These tests drive the codec over in-memory duplex streams to check
//! request/reply exchanges, EMV tag payloads and recovery after corrupt
//! frames.

use futures::{SinkExt, StreamExt};
use poi_core::Amount;
use poi_protocol::{
    DeviceCodec, DeviceMessage, MessageId, ProtocolError, TagCollection, tlv::tags,
};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

/// Helper function to create a framed duplex stream for testing.
fn create_framed_duplex(
    buffer_size: usize,
) -> (
    Framed<DuplexStream, DeviceCodec>,
    Framed<DuplexStream, DeviceCodec>,
) {
    let (host, terminal) = tokio::io::duplex(buffer_size);
    (
        Framed::new(host, DeviceCodec::new()),
        Framed::new(terminal, DeviceCodec::new()),
    )
}

#[tokio::test]
async fn test_unit_data_exchange() {
    let (mut host, mut terminal) = create_framed_duplex(1024);

    host.send(DeviceMessage::new(MessageId::UnitData)).await.unwrap();
    let request = terminal.next().await.unwrap().unwrap();
    assert_eq!(request.id, MessageId::UnitData);

    let reply = DeviceMessage::ok(MessageId::UnitData).with_fields(["iPP350", "SN-0042", "23.1.0.4"]);
    terminal.send(reply.clone()).await.unwrap();

    let received = host.next().await.unwrap().unwrap();
    assert_eq!(received, reply);
    assert!(received.is_ok());
}

#[tokio::test]
async fn test_emv_tags_survive_transport() {
    let (mut host, mut terminal) = create_framed_duplex(4096);

    let mut collection = TagCollection::new();
    collection
        .set_amount_authorized(Amount::from_cents(4_250))
        .unwrap();
    collection
        .insert(tags::APPLICATION_CRYPTOGRAM, vec![0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0])
        .unwrap();

    let request = DeviceMessage::ok(MessageId::EmvAuthorizationRequest).with_tags(&collection);
    terminal.send(request).await.unwrap();

    let received = host.next().await.unwrap().unwrap();
    assert_eq!(received.id, MessageId::EmvAuthorizationRequest);
    let decoded = received.tags(1).unwrap();
    assert_eq!(decoded, collection);
    assert_eq!(decoded.amount_authorized(), Some(Amount::from_cents(4_250)));
}

#[tokio::test]
async fn test_multiple_messages_in_sequence() {
    let (mut host, mut terminal) = create_framed_duplex(4096);

    for i in 0..10 {
        let msg = DeviceMessage::new(MessageId::Print).with_field(format!("line {i}"));
        host.send(msg).await.unwrap();
    }

    for i in 0..10 {
        let received = terminal.next().await.unwrap().unwrap();
        assert_eq!(received.id, MessageId::Print);
        assert_eq!(received.field(0), Some(format!("line {i}").as_str()));
    }
}

#[tokio::test]
async fn test_small_buffer_splits_frames() {
    let (mut host, mut terminal) = create_framed_duplex(16);

    let long_line = "X".repeat(200);
    let send_task = tokio::spawn(async move {
        host.send(DeviceMessage::new(MessageId::Print).with_field(long_line))
            .await
            .unwrap();
    });

    let received = terminal.next().await.unwrap().unwrap();
    assert_eq!(received.field(0).map(str::len), Some(200));
    send_task.await.unwrap();
}

#[tokio::test]
async fn test_corrupt_frame_reports_lrc_error() {
    let (mut raw, terminal) = tokio::io::duplex(1024);
    let mut terminal = Framed::new(terminal, DeviceCodec::new());

    // "11" with a wrong LRC byte.
    raw.write_all(&[0x02, b'1', b'1', 0x03, 0x7F]).await.unwrap();

    let result = terminal.next().await.unwrap();
    assert!(matches!(
        result,
        Err(ProtocolError::LrcMismatch {
            expected: 0x03,
            actual: 0x7F
        })
    ));
}

#[tokio::test]
async fn test_stream_ends_when_peer_closes() {
    let (host, mut terminal) = create_framed_duplex(1024);
    drop(host);

    assert!(terminal.next().await.is_none());
}
