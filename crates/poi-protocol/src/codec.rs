//! Tokio codec for device message framing.
//!
//! Every message travels as a single frame:
//!
//! ```text
//! <STX> body <ETX> <LRC>
//! ```
//!
//! where `LRC` is the XOR of every body byte and the ETX marker. Bytes
//! received before an STX are discarded, so the decoder resynchronizes
//! after line noise.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use poi_protocol::{DeviceCodec, DeviceMessage, MessageId};
//! use futures::{SinkExt, StreamExt};
//!
//! # async fn example() -> Result<(), poi_protocol::ProtocolError> {
//! let stream = TcpStream::connect("127.0.0.1:12000").await?;
//! let mut framed = Framed::new(stream, DeviceCodec::new());
//!
//! framed.send(DeviceMessage::new(MessageId::UnitData)).await?;
//! if let Some(Ok(reply)) = framed.next().await {
//!     println!("Received: {reply}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # DoS Protection
//!
//! Frames larger than the configured limit (default 64 KB) are rejected,
//! both when decoding partially buffered input and when encoding.

use bytes::{Buf, BufMut, BytesMut};
use poi_core::constants::{END_BYTE, MAX_FRAME_SIZE, START_BYTE};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::message::DeviceMessage;

/// Longitudinal redundancy check over `bytes`.
///
/// # Examples
///
/// ```
/// use poi_protocol::codec::lrc;
///
/// assert_eq!(lrc(&[0x31, 0x31, 0x03]), 0x03);
/// ```
#[must_use]
pub fn lrc(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Tokio codec for [`DeviceMessage`] frames.
#[derive(Debug, Clone)]
pub struct DeviceCodec {
    /// Maximum allowed frame size in bytes, markers and LRC included.
    max_frame_size: usize,
}

impl DeviceCodec {
    /// Create a codec with the default 64 KB frame limit.
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom frame limit.
    ///
    /// ```
    /// use poi_protocol::DeviceCodec;
    ///
    /// let codec = DeviceCodec::with_max_frame_size(1024);
    /// assert_eq!(codec.max_frame_size(), 1024);
    /// ```
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for DeviceCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DeviceCodec {
    type Item = DeviceMessage;
    type Error = ProtocolError;

    /// Decode one frame from the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(message))` - A complete frame was decoded and consumed
    /// - `Ok(None)` - Need more data
    /// - `Err(_)` - Oversized frame, LRC mismatch or malformed body. The
    ///   offending bytes are consumed so the next call resumes after them.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(start) = src.iter().position(|b| *b == START_BYTE) else {
            if !src.is_empty() {
                trace!(discarded = src.len(), "discarding bytes without STX");
                src.clear();
            }
            return Ok(None);
        };
        if start > 0 {
            trace!(discarded = start, "discarding bytes before STX");
            src.advance(start);
        }

        let Some(end) = src.iter().position(|b| *b == END_BYTE) else {
            if src.len() > self.max_frame_size {
                let size = src.len();
                src.clear();
                return Err(ProtocolError::FrameTooLarge {
                    size,
                    max_size: self.max_frame_size,
                });
            }
            return Ok(None);
        };

        // STX .. ETX plus the trailing LRC byte.
        let frame_len = end + 2;
        if src.len() < frame_len {
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        if frame_len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: frame_len,
                max_size: self.max_frame_size,
            });
        }

        let expected = lrc(&frame[1..=end]);
        let actual = frame[end + 1];
        if expected != actual {
            return Err(ProtocolError::LrcMismatch { expected, actual });
        }

        DeviceMessage::from_body(&frame[1..end]).map(Some)
    }
}

impl Encoder<DeviceMessage> for DeviceCodec {
    type Error = ProtocolError;

    /// Frame a message into the destination buffer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidField` if a field contains a framing byte and
    /// `FrameTooLarge` if the frame would exceed the configured limit.
    fn encode(&mut self, item: DeviceMessage, dst: &mut BytesMut) -> Result<()> {
        item.validate()?;

        let body = item.to_body();
        let size = body.len() + 3;
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max_size: self.max_frame_size,
            });
        }

        let check = lrc(&body) ^ END_BYTE;
        dst.reserve(size);
        dst.put_u8(START_BYTE);
        dst.extend_from_slice(&body);
        dst.put_u8(END_BYTE);
        dst.put_u8(check);

        Ok(())
    }
}
