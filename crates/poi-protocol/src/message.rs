//! Device messages: an identifier plus separator-delimited text fields.
//!
//! Replies from the terminal carry a status code in their first field
//! ([`STATUS_OK`] on success). EMV messages carry their tag collection as a
//! hex-encoded BER-TLV field.

use std::fmt;
use std::str::FromStr;

use poi_core::constants::{END_BYTE, FIELD_SEPARATOR, START_BYTE, STATUS_OK};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::tlv::TagCollection;

/// Message identifiers understood by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    Offline,
    Online,
    SetPaymentType,
    UnitData,
    HealthStat,
    Reset,
    Ping,
    SetAmount,
    NumericInput,
    CardRead,
    ChoiceInput,
    YesNoInput,
    AlphaInput,
    PinEntry,
    EmvPreparation,
    EmvAuthorizationRequest,
    EmvAuthorizationResponse,
    EmvAuthorizationConfirmation,
    Print,
    PrintBarcode,
}

impl MessageId {
    pub const ALL: [MessageId; 20] = [
        MessageId::Offline,
        MessageId::Online,
        MessageId::SetPaymentType,
        MessageId::UnitData,
        MessageId::HealthStat,
        MessageId::Reset,
        MessageId::Ping,
        MessageId::SetAmount,
        MessageId::NumericInput,
        MessageId::CardRead,
        MessageId::ChoiceInput,
        MessageId::YesNoInput,
        MessageId::AlphaInput,
        MessageId::PinEntry,
        MessageId::EmvPreparation,
        MessageId::EmvAuthorizationRequest,
        MessageId::EmvAuthorizationResponse,
        MessageId::EmvAuthorizationConfirmation,
        MessageId::Print,
        MessageId::PrintBarcode,
    ];

    /// Wire form of the identifier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "00",
            Self::Online => "01",
            Self::SetPaymentType => "04",
            Self::UnitData => "07",
            Self::HealthStat => "08",
            Self::Reset => "10",
            Self::Ping => "11",
            Self::SetAmount => "13",
            Self::NumericInput => "21",
            Self::CardRead => "23",
            Self::ChoiceInput => "24",
            Self::YesNoInput => "26",
            Self::AlphaInput => "27",
            Self::PinEntry => "31",
            Self::EmvPreparation => "33.02",
            Self::EmvAuthorizationRequest => "33.03",
            Self::EmvAuthorizationResponse => "33.04",
            Self::EmvAuthorizationConfirmation => "33.05",
            Self::Print => "60",
            Self::PrintBarcode => "61",
        }
    }

    /// Keep-alive traffic generated by the session itself.
    #[must_use]
    pub fn is_keepalive(self) -> bool {
        matches!(self, Self::HealthStat | Self::Ping)
    }

    #[must_use]
    pub fn is_emv(self) -> bool {
        matches!(
            self,
            Self::EmvPreparation
                | Self::EmvAuthorizationRequest
                | Self::EmvAuthorizationResponse
                | Self::EmvAuthorizationConfirmation
        )
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownMessageId(s.to_string()))
    }
}

/// One message exchanged with the terminal.
///
/// # Examples
///
/// ```
/// use poi_protocol::{DeviceMessage, MessageId};
///
/// let msg = DeviceMessage::new(MessageId::SetAmount).with_field("1234");
/// assert_eq!(msg.to_body(), b"13\x1c1234".to_vec());
///
/// let parsed = DeviceMessage::from_body(&msg.to_body()).unwrap();
/// assert_eq!(parsed, msg);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMessage {
    pub id: MessageId,
    pub fields: Vec<String>,
}

impl DeviceMessage {
    pub fn new(id: MessageId) -> Self {
        Self {
            id,
            fields: Vec::new(),
        }
    }

    /// Reply with the given status code as its first field.
    pub fn reply(id: MessageId, status: impl Into<String>) -> Self {
        Self::new(id).with_field(status)
    }

    /// Successful reply.
    pub fn ok(id: MessageId) -> Self {
        Self::reply(id, STATUS_OK)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Append a tag collection as a hex TLV field.
    pub fn with_tags(self, tags: &TagCollection) -> Self {
        self.with_field(tags.to_hex())
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Status code of a reply (first field).
    pub fn status(&self) -> Option<&str> {
        self.field(0)
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status() == Some(STATUS_OK)
    }

    /// Decode the hex TLV field at `index`. A missing or empty field yields an
    /// empty collection.
    pub fn tags(&self, index: usize) -> Result<TagCollection> {
        match self.field(index) {
            Some(hex) if !hex.is_empty() => TagCollection::from_hex(hex),
            _ => Ok(TagCollection::new()),
        }
    }

    /// Check that no field contains a framing byte.
    pub fn validate(&self) -> Result<()> {
        for (index, field) in self.fields.iter().enumerate() {
            if let Some(byte) = field
                .bytes()
                .find(|b| matches!(*b, START_BYTE | END_BYTE | FIELD_SEPARATOR))
            {
                return Err(ProtocolError::InvalidField { index, byte });
            }
        }
        Ok(())
    }

    /// Frame body: the id followed by each field, separated by FS.
    #[must_use]
    pub fn to_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(
            self.id.as_str().len() + self.fields.iter().map(|f| f.len() + 1).sum::<usize>(),
        );
        body.extend_from_slice(self.id.as_str().as_bytes());
        for field in &self.fields {
            body.push(FIELD_SEPARATOR);
            body.extend_from_slice(field.as_bytes());
        }
        body
    }

    /// Parse a frame body.
    ///
    /// # Errors
    /// Returns `InvalidMessage` for empty or non UTF-8 bodies and
    /// `UnknownMessageId` for unrecognized identifiers.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Err(ProtocolError::InvalidMessage("empty body".into()));
        }
        let text = std::str::from_utf8(body)
            .map_err(|e| ProtocolError::InvalidMessage(format!("invalid UTF-8: {e}")))?;

        let mut parts = text.split(char::from(FIELD_SEPARATOR));
        let id: MessageId = parts.next().unwrap_or_default().parse()?;

        Ok(Self {
            id,
            fields: parts.map(str::to_string).collect(),
        })
    }
}

impl fmt::Display for DeviceMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.id)?;
        for field in &self.fields {
            write!(f, "|{field}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::tags;
    use rstest::rstest;

    #[test]
    fn test_message_id_roundtrip() {
        for id in MessageId::ALL {
            assert_eq!(id.as_str().parse::<MessageId>().unwrap(), id);
        }
    }

    #[rstest]
    #[case("33.03", MessageId::EmvAuthorizationRequest)]
    #[case("07", MessageId::UnitData)]
    #[case("61", MessageId::PrintBarcode)]
    fn test_message_id_parse(#[case] wire: &str, #[case] expected: MessageId) {
        assert_eq!(wire.parse::<MessageId>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_message_id() {
        let error = "99".parse::<MessageId>().unwrap_err();
        assert!(matches!(error, ProtocolError::UnknownMessageId(ref id) if id == "99"));
    }

    #[test]
    fn test_body_preserves_empty_fields() {
        let msg = DeviceMessage::new(MessageId::Print).with_fields(["", "A", ""]);
        let parsed = DeviceMessage::from_body(&msg.to_body()).unwrap();
        assert_eq!(parsed.fields, vec!["", "A", ""]);
    }

    #[test]
    fn test_body_without_fields() {
        let parsed = DeviceMessage::from_body(b"11").unwrap();
        assert_eq!(parsed.id, MessageId::Ping);
        assert_eq!(parsed.field_count(), 0);
        assert_eq!(parsed.status(), None);
        assert!(!parsed.is_ok());
    }

    #[test]
    fn test_from_body_rejects_invalid() {
        assert!(DeviceMessage::from_body(b"").is_err());
        assert!(DeviceMessage::from_body(&[0xFF, 0xFE]).is_err());
        assert!(DeviceMessage::from_body(b"ZZ\x1c0").is_err());
    }

    #[test]
    fn test_status_helpers() {
        assert!(DeviceMessage::ok(MessageId::Print).is_ok());
        let failed = DeviceMessage::reply(MessageId::Print, "3");
        assert!(!failed.is_ok());
        assert_eq!(failed.status(), Some("3"));
    }

    #[test]
    fn test_validate_rejects_framing_bytes() {
        let msg = DeviceMessage::new(MessageId::Print).with_field("ok").with_field("bad\x03");
        let error = msg.validate().unwrap_err();
        assert!(matches!(error, ProtocolError::InvalidField { index: 1, byte: 0x03 }));
    }

    #[test]
    fn test_tags_field() {
        let mut collection = TagCollection::new();
        collection.insert(tags::AUTHORIZATION_RESPONSE_CODE, b"00".to_vec()).unwrap();

        let msg = DeviceMessage::ok(MessageId::EmvAuthorizationResponse).with_tags(&collection);
        assert_eq!(msg.tags(1).unwrap(), collection);
        assert!(msg.tags(2).unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        let msg = DeviceMessage::ok(MessageId::UnitData).with_field("iSC250");
        assert_eq!(msg.to_string(), "07|0|iSC250");
    }
}
