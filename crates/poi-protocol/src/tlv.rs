//! BER-TLV tag collections carried by EMV messages.
//!
//! EMV data travels between the terminal and the host as a flat list of
//! tag/length/value objects. Tags are one to four bytes (the low five bits
//! of the first byte set to `0x1F` announce a multi-byte tag) and lengths use
//! the short form below 128 or the `0x81`/`0x82` long forms.
//!
//! ```text
//! 9F02 06 000000001234   amount authorized = 12.34
//! ^^^^ ^^ ^^^^^^^^^^^^
//! tag  len value
//! ```
//!
//! Constructed tags are not descended into; their value is kept as raw
//! bytes.

use std::fmt;
use std::str::FromStr;

use poi_core::{Amount, EmvData};

use crate::error::{ProtocolError, Result};

/// Largest value accepted in a single TLV object.
pub const MAX_VALUE_LEN: usize = 0xFFFF;

/// Largest amount representable in the `n12` BCD amount format.
const MAX_BCD_AMOUNT: u64 = 999_999_999_999;

/// A BER-TLV tag, stored as its big-endian byte value (e.g. `0x9F02`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u32);

impl Tag {
    pub const fn new(raw: u32) -> Self {
        Tag(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    fn byte_len(self) -> usize {
        match self.0 {
            0..=0xFF => 1,
            0x100..=0xFFFF => 2,
            0x1_0000..=0xFF_FFFF => 3,
            _ => 4,
        }
    }

    /// Wire bytes of the tag.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        self.0.to_be_bytes()[4 - self.byte_len()..].to_vec()
    }

    /// Parse a tag from the front of `input`, returning it with the number of
    /// bytes consumed.
    fn parse(input: &[u8]) -> Result<(Tag, usize)> {
        let first = *input
            .first()
            .ok_or_else(|| ProtocolError::InvalidTlv("truncated tag".into()))?;

        let mut raw = u32::from(first);
        let mut consumed = 1;

        if first & 0x1F == 0x1F {
            loop {
                if consumed == 4 {
                    return Err(ProtocolError::InvalidTlv(format!(
                        "tag {raw:X} longer than 4 bytes"
                    )));
                }
                let byte = *input
                    .get(consumed)
                    .ok_or_else(|| ProtocolError::InvalidTlv("truncated tag".into()))?;
                raw = (raw << 8) | u32::from(byte);
                consumed += 1;
                if byte & 0x80 == 0 {
                    break;
                }
            }
        }

        Ok((Tag(raw), consumed))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:0width$X}", self.0, width = self.byte_len() * 2)
    }
}

impl FromStr for Tag {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > 8 {
            return Err(ProtocolError::InvalidTlv(format!("invalid tag: {s}")));
        }
        u32::from_str_radix(s, 16)
            .map(Tag)
            .map_err(|_| ProtocolError::InvalidTlv(format!("invalid tag: {s}")))
    }
}

/// Well-known EMV tags.
pub mod tags {
    use super::Tag;

    pub const APPLICATION_IDENTIFIER: Tag = Tag::new(0x4F);
    pub const APPLICATION_LABEL: Tag = Tag::new(0x50);
    pub const PAN: Tag = Tag::new(0x5A);
    pub const AUTHORIZATION_RESPONSE_CODE: Tag = Tag::new(0x8A);
    pub const ISSUER_AUTHENTICATION_DATA: Tag = Tag::new(0x91);
    pub const TERMINAL_VERIFICATION_RESULTS: Tag = Tag::new(0x95);
    pub const TRANSACTION_DATE: Tag = Tag::new(0x9A);
    pub const TRANSACTION_STATUS_INFORMATION: Tag = Tag::new(0x9B);
    pub const TRANSACTION_TYPE: Tag = Tag::new(0x9C);
    pub const TRANSACTION_CURRENCY_CODE: Tag = Tag::new(0x5F2A);
    pub const AMOUNT_AUTHORIZED: Tag = Tag::new(0x9F02);
    pub const AMOUNT_OTHER: Tag = Tag::new(0x9F03);
    pub const APPLICATION_CRYPTOGRAM: Tag = Tag::new(0x9F26);
    pub const CRYPTOGRAM_INFORMATION_DATA: Tag = Tag::new(0x9F27);
}

/// Ordered collection of TLV objects, at most one per tag.
///
/// # Examples
///
/// ```
/// use poi_protocol::tlv::{TagCollection, tags};
///
/// let mut collection = TagCollection::new();
/// collection.insert(tags::AUTHORIZATION_RESPONSE_CODE, b"00".to_vec()).unwrap();
///
/// let hex = collection.to_hex();
/// assert_eq!(hex, "8A023030");
/// assert_eq!(TagCollection::from_hex(&hex).unwrap(), collection);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCollection {
    entries: Vec<(Tag, Vec<u8>)>,
}

impl TagCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, tag: Tag) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, value)| value.as_slice())
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.get(tag).is_some()
    }

    /// Insert a value, replacing any previous value for the same tag.
    ///
    /// # Errors
    /// Returns `InvalidTlv` if the value exceeds [`MAX_VALUE_LEN`].
    pub fn insert(&mut self, tag: Tag, value: Vec<u8>) -> Result<()> {
        if value.len() > MAX_VALUE_LEN {
            return Err(ProtocolError::InvalidTlv(format!(
                "value for tag {tag} is {} bytes (max: {MAX_VALUE_LEN})",
                value.len()
            )));
        }
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((tag, value)),
        }
        Ok(())
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Vec<u8>> {
        let index = self.entries.iter().position(|(t, _)| *t == tag)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &[u8])> {
        self.entries.iter().map(|(tag, value)| (*tag, value.as_slice()))
    }

    /// Merge `other` into this collection; values from `other` win.
    pub fn merge(&mut self, other: &TagCollection) {
        for (tag, value) in &other.entries {
            match self.entries.iter_mut().find(|(t, _)| t == tag) {
                Some(entry) => entry.1 = value.clone(),
                None => self.entries.push((*tag, value.clone())),
            }
        }
    }

    /// Serialize to BER-TLV bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (tag, value) in &self.entries {
            out.extend_from_slice(&tag.to_bytes());
            encode_length(value.len(), &mut out);
            out.extend_from_slice(value);
        }
        out
    }

    /// Parse BER-TLV bytes. Zero padding between objects is skipped and a
    /// repeated tag keeps its last value.
    ///
    /// # Errors
    /// Returns `InvalidTlv` on truncated tags, lengths or values, and on
    /// unsupported length forms.
    pub fn decode(mut input: &[u8]) -> Result<Self> {
        let mut collection = TagCollection::new();

        while !input.is_empty() {
            if input[0] == 0x00 {
                input = &input[1..];
                continue;
            }

            let (tag, tag_len) = Tag::parse(input)?;
            input = &input[tag_len..];

            let (len, len_len) = parse_length(input)?;
            input = &input[len_len..];

            if input.len() < len {
                return Err(ProtocolError::InvalidTlv(format!(
                    "value for tag {tag} truncated: need {len} bytes, have {}",
                    input.len()
                )));
            }
            collection.insert(tag, input[..len].to_vec())?;
            input = &input[len..];
        }

        Ok(collection)
    }

    /// Upper-case hex rendering of [`encode`](Self::encode).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.encode())
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes =
            hex::decode(text.trim()).map_err(|e| ProtocolError::InvalidTlv(e.to_string()))?;
        Self::decode(&bytes)
    }

    /// Amount authorized (tag 9F02), decoded from `n12` BCD.
    pub fn amount_authorized(&self) -> Option<Amount> {
        self.get(tags::AMOUNT_AUTHORIZED).and_then(decode_bcd_amount)
    }

    /// Store the amount authorized (tag 9F02) as `n12` BCD.
    pub fn set_amount_authorized(&mut self, amount: Amount) -> Result<()> {
        let bcd = encode_bcd_amount(amount)?;
        self.insert(tags::AMOUNT_AUTHORIZED, bcd.to_vec())
    }

    /// Receipt fields carried by this collection. Missing tags render empty.
    #[must_use]
    pub fn emv_data(&self) -> EmvData {
        let hex_of = |tag| self.get(tag).map(hex::encode_upper).unwrap_or_default();
        EmvData {
            application_identifier: hex_of(tags::APPLICATION_IDENTIFIER),
            application_label: self
                .get(tags::APPLICATION_LABEL)
                .map(|v| String::from_utf8_lossy(v).trim().to_string())
                .unwrap_or_default(),
            cryptogram: hex_of(tags::APPLICATION_CRYPTOGRAM),
            terminal_verification_results: hex_of(tags::TERMINAL_VERIFICATION_RESULTS),
            transaction_status_information: hex_of(tags::TRANSACTION_STATUS_INFORMATION),
        }
    }
}

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
}

fn parse_length(input: &[u8]) -> Result<(usize, usize)> {
    let truncated = || ProtocolError::InvalidTlv("truncated length".into());
    let first = *input.first().ok_or_else(truncated)?;

    match first {
        b if b < 0x80 => Ok((usize::from(b), 1)),
        0x81 => {
            let len = *input.get(1).ok_or_else(truncated)?;
            Ok((usize::from(len), 2))
        }
        0x82 => {
            let bytes = input.get(1..3).ok_or_else(truncated)?;
            Ok((usize::from(u16::from_be_bytes([bytes[0], bytes[1]])), 3))
        }
        other => Err(ProtocolError::InvalidTlv(format!(
            "unsupported length form {other:#04x}"
        ))),
    }
}

fn encode_bcd_amount(amount: Amount) -> Result<[u8; 6]> {
    let cents = amount.cents();
    if cents > MAX_BCD_AMOUNT {
        return Err(ProtocolError::InvalidTlv(format!(
            "amount {amount} does not fit in n12"
        )));
    }

    let digits = format!("{cents:012}");
    let mut out = [0u8; 6];
    for (slot, pair) in out.iter_mut().zip(digits.as_bytes().chunks(2)) {
        *slot = ((pair[0] - b'0') << 4) | (pair[1] - b'0');
    }
    Ok(out)
}

fn decode_bcd_amount(bytes: &[u8]) -> Option<Amount> {
    let mut cents: u64 = 0;
    for byte in bytes {
        let (high, low) = (byte >> 4, byte & 0x0F);
        if high > 9 || low > 9 {
            return None;
        }
        cents = cents.checked_mul(100)? + u64::from(high * 10 + low);
    }
    Some(Amount::from_cents(cents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0x4F], 0x4F, 1)]
    #[case(&[0x9F, 0x02], 0x9F02, 2)]
    #[case(&[0x5F, 0x2A, 0x01], 0x5F2A, 2)]
    #[case(&[0xDF, 0x81, 0x01], 0xDF8101, 3)]
    fn test_tag_parse(#[case] input: &[u8], #[case] raw: u32, #[case] consumed: usize) {
        let (tag, len) = Tag::parse(input).unwrap();
        assert_eq!(tag.raw(), raw);
        assert_eq!(len, consumed);
    }

    #[test]
    fn test_tag_parse_rejects_overlong() {
        assert!(Tag::parse(&[0x9F, 0x81, 0x81, 0x81, 0x01]).is_err());
        assert!(Tag::parse(&[0x9F]).is_err());
        assert!(Tag::parse(&[]).is_err());
    }

    #[test]
    fn test_tag_display_and_parse() {
        assert_eq!(tags::AMOUNT_AUTHORIZED.to_string(), "9F02");
        assert_eq!(tags::TRANSACTION_TYPE.to_string(), "9C");
        assert_eq!("9f26".parse::<Tag>().unwrap(), tags::APPLICATION_CRYPTOGRAM);
        assert!("".parse::<Tag>().is_err());
        assert!("XYZ".parse::<Tag>().is_err());
    }

    #[test]
    fn test_encode_known_bytes() {
        let mut collection = TagCollection::new();
        collection
            .set_amount_authorized(Amount::from_cents(1234))
            .unwrap();
        collection.insert(tags::TRANSACTION_TYPE, vec![0x00]).unwrap();

        assert_eq!(collection.to_hex(), "9F02060000000012349C0100");
    }

    #[rstest]
    #[case(5, "05")]
    #[case(0x7F, "7F")]
    #[case(0x80, "8180")]
    #[case(0xFF, "81FF")]
    #[case(0x100, "820100")]
    fn test_length_forms(#[case] len: usize, #[case] hex_prefix: &str) {
        let mut out = Vec::new();
        encode_length(len, &mut out);
        assert_eq!(hex::encode_upper(&out), hex_prefix);

        let (parsed, consumed) = parse_length(&out).unwrap();
        assert_eq!(parsed, len);
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn test_decode_rejects_truncated_value() {
        let error = TagCollection::from_hex("9F0206000000").unwrap_err();
        assert!(matches!(error, ProtocolError::InvalidTlv(_)));
    }

    #[test]
    fn test_decode_rejects_unsupported_length() {
        assert!(TagCollection::from_hex("4F83000001AA").is_err());
    }

    #[test]
    fn test_decode_skips_padding() {
        let collection = TagCollection::from_hex("00008A0230300000").unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get(tags::AUTHORIZATION_RESPONSE_CODE), Some(&b"00"[..]));
    }

    #[test]
    fn test_insert_replaces_and_preserves_order() {
        let mut collection = TagCollection::new();
        collection.insert(tags::APPLICATION_IDENTIFIER, vec![1]).unwrap();
        collection.insert(tags::APPLICATION_LABEL, vec![2]).unwrap();
        collection.insert(tags::APPLICATION_IDENTIFIER, vec![3]).unwrap();

        let order: Vec<Tag> = collection.iter().map(|(tag, _)| tag).collect();
        assert_eq!(order, vec![tags::APPLICATION_IDENTIFIER, tags::APPLICATION_LABEL]);
        assert_eq!(collection.get(tags::APPLICATION_IDENTIFIER), Some(&[3u8][..]));
    }

    #[test]
    fn test_insert_rejects_oversized_value() {
        let mut collection = TagCollection::new();
        assert!(collection.insert(tags::PAN, vec![0; MAX_VALUE_LEN + 1]).is_err());
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut a = TagCollection::new();
        a.insert(tags::AUTHORIZATION_RESPONSE_CODE, b"05".to_vec()).unwrap();
        let mut b = TagCollection::new();
        b.insert(tags::AUTHORIZATION_RESPONSE_CODE, b"00".to_vec()).unwrap();
        b.insert(tags::ISSUER_AUTHENTICATION_DATA, vec![0xAA]).unwrap();

        a.merge(&b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get(tags::AUTHORIZATION_RESPONSE_CODE), Some(&b"00"[..]));
    }

    #[test]
    fn test_amount_bcd() {
        let mut collection = TagCollection::new();
        collection
            .set_amount_authorized(Amount::from_cents(987_654))
            .unwrap();
        assert_eq!(
            collection.get(tags::AMOUNT_AUTHORIZED),
            Some(&[0x00, 0x00, 0x00, 0x98, 0x76, 0x54][..])
        );
        assert_eq!(collection.amount_authorized(), Some(Amount::from_cents(987_654)));

        assert!(
            collection
                .set_amount_authorized(Amount::from_cents(MAX_BCD_AMOUNT + 1))
                .is_err()
        );
        assert_eq!(decode_bcd_amount(&[0x1A]), None);
    }

    #[test]
    fn test_emv_data_extraction() {
        let mut collection = TagCollection::new();
        collection
            .insert(tags::APPLICATION_IDENTIFIER, vec![0xA0, 0x00, 0x00, 0x00, 0x03, 0x10, 0x10])
            .unwrap();
        collection.insert(tags::APPLICATION_LABEL, b"VISA CREDIT".to_vec()).unwrap();
        collection
            .insert(tags::TERMINAL_VERIFICATION_RESULTS, vec![0, 0, 0, 0x80, 0])
            .unwrap();

        let data = collection.emv_data();
        assert_eq!(data.application_identifier, "A0000000031010");
        assert_eq!(data.application_label, "VISA CREDIT");
        assert_eq!(data.terminal_verification_results, "0000008000");
        assert_eq!(data.cryptogram, "");
    }
}
