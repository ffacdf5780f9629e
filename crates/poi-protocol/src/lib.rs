pub mod codec;
pub mod error;
pub mod message;
pub mod tlv;

pub use codec::DeviceCodec;
pub use error::{ProtocolError, Result};
pub use message::{DeviceMessage, MessageId};
pub use tlv::{Tag, TagCollection};
