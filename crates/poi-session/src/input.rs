//! Input collectors: card, keyboard (alpha and numeric), PIN, choice and
//! yes/no.
//!
//! Each collector sends one request message and waits for the device to
//! reply with the same message id. Reply layout:
//!
//! ```text
//! <id> FS <status> FS <value fields...>
//! ```
//!
//! Requests are validated before anything reaches the device; the reply is
//! parsed by the slot that owns the pending result, so a malformed reply
//! fails that input with its kind's `...Unknown` code.

use std::collections::HashMap;
use std::fmt;

use poi_core::constants::STATUS_OK;
use poi_core::{Amount, CardData, EntryMode, ErrorCode, KeyboardPromptId, PinBlock, PoiError};
use poi_protocol::{DeviceMessage, MessageId};
use serde::{Deserialize, Serialize};

use crate::pending::Responder;

/// Device status: the customer pressed cancel.
pub const STATUS_CANCEL_KEY: &str = "1";
/// Device status: the card could not be read.
pub const STATUS_CARD_READ_ERROR: &str = "2";
/// Device status: the card was presented with a disallowed entry mode.
pub const STATUS_ENTRY_MODE_NOT_ACCEPTED: &str = "3";
/// Device status: swipe refused, chip fallback expected.
pub const STATUS_WAITING_FOR_FALLBACK_CHIP: &str = "4";
/// Device status: mobile wallet asks the customer to check the phone.
pub const STATUS_SEE_PHONE: &str = "5";

/// Collector kinds. At most one input of each kind is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Card,
    Alpha,
    Numeric,
    Pin,
    Choice,
    YesNo,
}

impl InputKind {
    pub const ALL: [InputKind; 6] = [
        InputKind::Card,
        InputKind::Alpha,
        InputKind::Numeric,
        InputKind::Pin,
        InputKind::Choice,
        InputKind::YesNo,
    ];

    /// Message carrying this kind's request and reply.
    pub fn message_id(self) -> MessageId {
        match self {
            Self::Card => MessageId::CardRead,
            Self::Alpha => MessageId::AlphaInput,
            Self::Numeric => MessageId::NumericInput,
            Self::Pin => MessageId::PinEntry,
            Self::Choice => MessageId::ChoiceInput,
            Self::YesNo => MessageId::YesNoInput,
        }
    }

    pub fn from_message_id(id: MessageId) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.message_id() == id)
    }

    /// Code reported when a reply of this kind cannot be understood.
    pub fn unknown_error_code(self) -> ErrorCode {
        match self {
            Self::Card => ErrorCode::CardInputUnknown,
            Self::Alpha | Self::Numeric => ErrorCode::KeyboardInputUnknown,
            Self::Pin => ErrorCode::PinInputUnknown,
            Self::Choice | Self::YesNo => ErrorCode::ChoiceInputUnknown,
        }
    }

    fn malformed(self, detail: impl Into<String>) -> PoiError {
        PoiError::with_description(self.unknown_error_code(), detail)
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Card => "card",
            Self::Alpha => "alpha",
            Self::Numeric => "numeric",
            Self::Pin => "pin",
            Self::Choice => "choice",
            Self::YesNo => "yes/no",
        };
        f.write_str(name)
    }
}

/// Map a non-OK reply status to an error for `kind`.
///
/// # Examples
///
/// ```
/// use poi_core::ErrorCode;
/// use poi_session::input::{InputKind, status_error};
///
/// assert_eq!(status_error(InputKind::Pin, "1").code(), ErrorCode::CancelledByUser);
/// assert_eq!(status_error(InputKind::Card, "2").code(), ErrorCode::CardReadError);
/// assert_eq!(status_error(InputKind::Pin, "2").code(), ErrorCode::PinInputUnknown);
/// ```
pub fn status_error(kind: InputKind, status: &str) -> PoiError {
    let code = match (kind, status) {
        (_, STATUS_CANCEL_KEY) => ErrorCode::CancelledByUser,
        (InputKind::Card, STATUS_CARD_READ_ERROR) => ErrorCode::CardReadError,
        (InputKind::Card, STATUS_ENTRY_MODE_NOT_ACCEPTED) => ErrorCode::CardInputTypeNotAccepted,
        (InputKind::Card, STATUS_WAITING_FOR_FALLBACK_CHIP) => ErrorCode::WaitingForFallbackChip,
        (InputKind::Card, STATUS_SEE_PHONE) => ErrorCode::PleaseSeePhoneForDetails,
        _ => kind.unknown_error_code(),
    };
    PoiError::with_description(code, format!("{kind} input status {status}"))
}

fn require(value: &str, name: &str) -> poi_core::Result<()> {
    if value.trim().is_empty() {
        return Err(PoiError::parameter_is_nil(name));
    }
    Ok(())
}

/// Ask for a card swipe, insert, tap or manual entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInputRequest {
    pub prompt: String,
    /// Accepted entry modes; empty accepts every mode.
    pub entry_modes: Vec<EntryMode>,
}

impl CardInputRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            entry_modes: Vec::new(),
        }
    }

    pub fn with_entry_modes(mut self, modes: impl IntoIterator<Item = EntryMode>) -> Self {
        self.entry_modes = modes.into_iter().collect();
        self
    }

    fn accepts(&self, mode: EntryMode) -> bool {
        self.entry_modes.is_empty() || self.entry_modes.contains(&mode)
    }
}

fn entry_code(mode: EntryMode) -> &'static str {
    match mode {
        EntryMode::Swiped => "S",
        EntryMode::Inserted => "C",
        EntryMode::Tapped => "T",
        EntryMode::Keyed => "M",
    }
}

/// Free-text entry on the terminal keyboard for a known prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaInputRequest {
    /// Raw prompt id, resolved with [`KeyboardPromptId::from_raw`].
    pub prompt_id: u32,
    pub max_length: u8,
}

/// Digit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericInputRequest {
    pub prompt: String,
    pub min_length: u8,
    pub max_length: u8,
}

/// Encrypted PIN entry for a card account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinInputRequest {
    pub account_number: String,
    pub amount: Amount,
}

/// Pick one of several labelled choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceInputRequest {
    pub prompt: String,
    pub choices: Vec<String>,
}

/// Answer a yes/no question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YesNoInputRequest {
    pub prompt: String,
}

/// A validated request ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRequest {
    Card(CardInputRequest),
    Alpha(AlphaInputRequest, KeyboardPromptId),
    Numeric(NumericInputRequest),
    Pin(PinInputRequest),
    Choice(ChoiceInputRequest),
    YesNo(YesNoInputRequest),
}

impl InputRequest {
    pub fn card(request: CardInputRequest) -> poi_core::Result<Self> {
        require(&request.prompt, "prompt")?;
        Ok(Self::Card(request))
    }

    pub fn alpha(request: AlphaInputRequest) -> poi_core::Result<Self> {
        let prompt = KeyboardPromptId::from_raw(request.prompt_id)?;
        if request.max_length == 0 {
            return Err(PoiError::parameter_is_nil("max_length"));
        }
        Ok(Self::Alpha(request, prompt))
    }

    pub fn numeric(request: NumericInputRequest) -> poi_core::Result<Self> {
        require(&request.prompt, "prompt")?;
        if request.max_length == 0 {
            return Err(PoiError::parameter_is_nil("max_length"));
        }
        if request.min_length > request.max_length {
            return Err(PoiError::with_description(
                ErrorCode::KeyboardInputUnknown,
                "min_length exceeds max_length",
            ));
        }
        Ok(Self::Numeric(request))
    }

    pub fn pin(request: PinInputRequest) -> poi_core::Result<Self> {
        require(&request.account_number, "account_number")?;
        Ok(Self::Pin(request))
    }

    pub fn choice(request: ChoiceInputRequest) -> poi_core::Result<Self> {
        require(&request.prompt, "prompt")?;
        if request.choices.is_empty() {
            return Err(PoiError::new(ErrorCode::ChoiceInputChoicesIsEmpty));
        }
        if request.choices.iter().any(|c| c.trim().is_empty()) {
            return Err(PoiError::parameter_is_nil("choices"));
        }
        Ok(Self::Choice(request))
    }

    pub fn yes_no(request: YesNoInputRequest) -> poi_core::Result<Self> {
        require(&request.prompt, "prompt")?;
        Ok(Self::YesNo(request))
    }

    pub fn kind(&self) -> InputKind {
        match self {
            Self::Card(_) => InputKind::Card,
            Self::Alpha(..) => InputKind::Alpha,
            Self::Numeric(_) => InputKind::Numeric,
            Self::Pin(_) => InputKind::Pin,
            Self::Choice(_) => InputKind::Choice,
            Self::YesNo(_) => InputKind::YesNo,
        }
    }

    /// Device message for this request.
    pub fn to_message(&self) -> DeviceMessage {
        let message = DeviceMessage::new(self.kind().message_id());
        match self {
            Self::Card(request) => {
                let modes: String = request.entry_modes.iter().map(|m| entry_code(*m)).collect();
                message.with_fields([request.prompt.clone(), modes])
            }
            Self::Alpha(request, prompt) => message.with_fields([
                prompt.device_prompt().to_string(),
                request.max_length.to_string(),
            ]),
            Self::Numeric(request) => message.with_fields([
                request.prompt.clone(),
                request.min_length.to_string(),
                request.max_length.to_string(),
            ]),
            Self::Pin(request) => message.with_fields([
                request.account_number.clone(),
                request.amount.cents().to_string(),
            ]),
            Self::Choice(request) => message
                .with_field(request.prompt.clone())
                .with_fields(request.choices.iter().cloned()),
            Self::YesNo(request) => message.with_field(request.prompt.clone()),
        }
    }
}

fn parse_card(request: &CardInputRequest, reply: &DeviceMessage) -> poi_core::Result<CardData> {
    let kind = InputKind::Card;
    let code = reply.field(1).ok_or_else(|| kind.malformed("missing entry mode"))?;
    let entry_mode =
        EntryMode::from_code(code).ok_or_else(|| kind.malformed(format!("entry mode {code}")))?;
    if !request.accepts(entry_mode) {
        return Err(PoiError::with_description(
            ErrorCode::CardInputTypeNotAccepted,
            format!("{entry_mode} not accepted"),
        ));
    }

    let pan = reply
        .field(2)
        .filter(|pan| !pan.is_empty())
        .ok_or_else(|| kind.malformed("missing account number"))?;
    let optional = |index| reply.field(index).filter(|v| !v.is_empty()).map(str::to_string);

    Ok(CardData {
        entry_mode,
        masked_pan: CardData::mask_pan(pan),
        cardholder_name: optional(3),
        expiration: optional(4),
        encrypted_track: optional(5),
    })
}

fn parse_text(kind: InputKind, reply: &DeviceMessage) -> poi_core::Result<String> {
    reply
        .field(1)
        .map(str::to_string)
        .ok_or_else(|| kind.malformed("missing value"))
}

fn parse_numeric(request: &NumericInputRequest, reply: &DeviceMessage) -> poi_core::Result<String> {
    let kind = InputKind::Numeric;
    let value = parse_text(kind, reply)?;
    let length = value.len();
    if !value.bytes().all(|b| b.is_ascii_digit())
        || length < usize::from(request.min_length)
        || length > usize::from(request.max_length)
    {
        return Err(kind.malformed(format!("invalid numeric value of length {length}")));
    }
    Ok(value)
}

fn parse_pin(reply: &DeviceMessage) -> poi_core::Result<PinBlock> {
    let kind = InputKind::Pin;
    match (reply.field(1), reply.field(2)) {
        (Some(block), Some(ksn)) if !block.is_empty() && !ksn.is_empty() => {
            Ok(PinBlock::new(block, ksn))
        }
        _ => Err(kind.malformed("missing PIN block")),
    }
}

fn parse_choice(request: &ChoiceInputRequest, reply: &DeviceMessage) -> poi_core::Result<usize> {
    let kind = InputKind::Choice;
    let raw = reply.field(1).ok_or_else(|| kind.malformed("missing selection"))?;
    raw.parse::<usize>()
        .ok()
        .filter(|index| *index < request.choices.len())
        .ok_or_else(|| kind.malformed(format!("selection {raw} out of range")))
}

fn parse_yes_no(reply: &DeviceMessage) -> poi_core::Result<bool> {
    match reply.field(1) {
        Some("Y") => Ok(true),
        Some("N") => Ok(false),
        other => Err(InputKind::YesNo.malformed(format!("answer {other:?}"))),
    }
}

/// An armed collector: the request it sent plus the caller's responder.
#[derive(Debug)]
pub(crate) enum ActiveInput {
    Card(CardInputRequest, Responder<CardData>),
    Alpha(Responder<String>),
    Numeric(NumericInputRequest, Responder<String>),
    Pin(Responder<PinBlock>),
    Choice(ChoiceInputRequest, Responder<usize>),
    YesNo(Responder<bool>),
}

impl ActiveInput {
    pub(crate) fn kind(&self) -> InputKind {
        match self {
            Self::Card(..) => InputKind::Card,
            Self::Alpha(_) => InputKind::Alpha,
            Self::Numeric(..) => InputKind::Numeric,
            Self::Pin(_) => InputKind::Pin,
            Self::Choice(..) => InputKind::Choice,
            Self::YesNo(_) => InputKind::YesNo,
        }
    }

    pub(crate) fn fail(self, error: PoiError) {
        match self {
            Self::Card(_, r) => r.fail(error),
            Self::Alpha(r) => r.fail(error),
            Self::Numeric(_, r) => r.fail(error),
            Self::Pin(r) => r.fail(error),
            Self::Choice(_, r) => r.fail(error),
            Self::YesNo(r) => r.fail(error),
        }
    }

    /// Resolve with the reply, mapping a failed status or malformed value
    /// to an error.
    pub(crate) fn complete(self, reply: &DeviceMessage) {
        let kind = self.kind();
        if let Some(status) = reply.status().filter(|s| *s != STATUS_OK) {
            self.fail(status_error(kind, status));
            return;
        }
        if reply.status().is_none() {
            self.fail(kind.malformed("missing status"));
            return;
        }

        match self {
            Self::Card(request, r) => r.resolve(parse_card(&request, reply)),
            Self::Alpha(r) => r.resolve(parse_text(kind, reply)),
            Self::Numeric(request, r) => r.resolve(parse_numeric(&request, reply)),
            Self::Pin(r) => r.resolve(parse_pin(reply)),
            Self::Choice(request, r) => r.resolve(parse_choice(&request, reply)),
            Self::YesNo(r) => r.resolve(parse_yes_no(reply)),
        }
    }
}

/// One slot per input kind.
#[derive(Debug, Default)]
pub(crate) struct InputSlots {
    active: HashMap<InputKind, ActiveInput>,
}

impl InputSlots {
    /// Store `input`, returning the input it displaced.
    pub(crate) fn insert(&mut self, input: ActiveInput) -> Option<ActiveInput> {
        self.active.insert(input.kind(), input)
    }

    pub(crate) fn take(&mut self, kind: InputKind) -> Option<ActiveInput> {
        self.active.remove(&kind)
    }

    pub(crate) fn fail_all(&mut self, error: &PoiError) {
        for (_, input) in self.active.drain() {
            input.fail(error.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::pending;
    use rstest::rstest;

    fn reply(kind: InputKind, fields: &[&str]) -> DeviceMessage {
        DeviceMessage::new(kind.message_id()).with_fields(fields.iter().copied())
    }

    #[test]
    fn test_message_id_mapping() {
        for kind in InputKind::ALL {
            assert_eq!(InputKind::from_message_id(kind.message_id()), Some(kind));
        }
        assert_eq!(InputKind::from_message_id(MessageId::Print), None);
    }

    #[rstest]
    #[case(InputKind::Card, "3", ErrorCode::CardInputTypeNotAccepted)]
    #[case(InputKind::Card, "4", ErrorCode::WaitingForFallbackChip)]
    #[case(InputKind::Card, "5", ErrorCode::PleaseSeePhoneForDetails)]
    #[case(InputKind::Card, "X", ErrorCode::CardInputUnknown)]
    #[case(InputKind::Numeric, "1", ErrorCode::CancelledByUser)]
    #[case(InputKind::Alpha, "9", ErrorCode::KeyboardInputUnknown)]
    #[case(InputKind::YesNo, "9", ErrorCode::ChoiceInputUnknown)]
    fn test_status_error(#[case] kind: InputKind, #[case] status: &str, #[case] code: ErrorCode) {
        assert_eq!(status_error(kind, status).code(), code);
    }

    #[rstest]
    #[case(InputRequest::card(CardInputRequest::new(" ")), ErrorCode::ParameterIsNil)]
    #[case(
        InputRequest::alpha(AlphaInputRequest { prompt_id: 9, max_length: 10 }),
        ErrorCode::KeyboardInputUnknownPromptId
    )]
    #[case(
        InputRequest::choice(ChoiceInputRequest { prompt: "Tip?".into(), choices: vec![] }),
        ErrorCode::ChoiceInputChoicesIsEmpty
    )]
    #[case(
        InputRequest::pin(PinInputRequest { account_number: "".into(), amount: Amount::ZERO }),
        ErrorCode::ParameterIsNil
    )]
    #[case(
        InputRequest::yes_no(YesNoInputRequest { prompt: "".into() }),
        ErrorCode::ParameterIsNil
    )]
    fn test_request_validation(
        #[case] request: poi_core::Result<InputRequest>,
        #[case] code: ErrorCode,
    ) {
        assert_eq!(request.unwrap_err().code(), code);
    }

    #[test]
    fn test_request_messages() {
        let card = InputRequest::card(
            CardInputRequest::new("SWIPE OR INSERT")
                .with_entry_modes([EntryMode::Swiped, EntryMode::Inserted]),
        )
        .unwrap();
        assert_eq!(card.to_message().to_string(), "23|SWIPE OR INSERT|SC");

        let alpha = InputRequest::alpha(AlphaInputRequest {
            prompt_id: 0,
            max_length: 10,
        })
        .unwrap();
        assert_eq!(alpha.to_message().to_string(), "27|POSTAL|10");

        let choice = InputRequest::choice(ChoiceInputRequest {
            prompt: "Tip".into(),
            choices: vec!["10%".into(), "15%".into()],
        })
        .unwrap();
        assert_eq!(choice.to_message().to_string(), "24|Tip|10%|15%");
    }

    #[tokio::test]
    async fn test_card_reply_is_masked() {
        let (responder, result) = pending();
        ActiveInput::Card(CardInputRequest::new("SWIPE"), responder).complete(&reply(
            InputKind::Card,
            &["0", "S", "4111111111111111", "DOE/JANE", "2812", ""],
        ));

        let card = result.await.unwrap();
        assert_eq!(card.entry_mode, EntryMode::Swiped);
        assert_eq!(card.masked_pan, "************1111");
        assert_eq!(card.cardholder_name.as_deref(), Some("DOE/JANE"));
        assert_eq!(card.expiration.as_deref(), Some("2812"));
        assert_eq!(card.encrypted_track, None);
    }

    #[tokio::test]
    async fn test_card_reply_with_disallowed_entry_mode() {
        let (responder, result) = pending();
        let request = CardInputRequest::new("INSERT").with_entry_modes([EntryMode::Inserted]);
        ActiveInput::Card(request, responder)
            .complete(&reply(InputKind::Card, &["0", "S", "4111111111111111"]));

        assert_eq!(
            result.await.unwrap_err().code(),
            ErrorCode::CardInputTypeNotAccepted
        );
    }

    #[tokio::test]
    async fn test_numeric_reply_length_checked() {
        let request = NumericInputRequest {
            prompt: "ZIP".into(),
            min_length: 5,
            max_length: 5,
        };

        let (responder, result) = pending();
        ActiveInput::Numeric(request.clone(), responder)
            .complete(&reply(InputKind::Numeric, &["0", "1234"]));
        assert_eq!(result.await.unwrap_err().code(), ErrorCode::KeyboardInputUnknown);

        let (responder, result) = pending();
        ActiveInput::Numeric(request, responder)
            .complete(&reply(InputKind::Numeric, &["0", "12345"]));
        assert_eq!(result.await.unwrap(), "12345");
    }

    #[tokio::test]
    async fn test_choice_and_yes_no_replies() {
        let request = ChoiceInputRequest {
            prompt: "Tip".into(),
            choices: vec!["10%".into(), "15%".into()],
        };
        let (responder, result) = pending();
        ActiveInput::Choice(request.clone(), responder)
            .complete(&reply(InputKind::Choice, &["0", "1"]));
        assert_eq!(result.await.unwrap(), 1);

        let (responder, result) = pending();
        ActiveInput::Choice(request, responder).complete(&reply(InputKind::Choice, &["0", "2"]));
        assert_eq!(result.await.unwrap_err().code(), ErrorCode::ChoiceInputUnknown);

        let (responder, result) = pending();
        ActiveInput::YesNo(responder).complete(&reply(InputKind::YesNo, &["0", "N"]));
        assert!(!result.await.unwrap());
    }

    #[tokio::test]
    async fn test_pin_reply() {
        let (responder, result) = pending();
        ActiveInput::Pin(responder).complete(&reply(InputKind::Pin, &["0", "A1B2C3", "FFFF01"]));
        assert_eq!(result.await.unwrap(), PinBlock::new("A1B2C3", "FFFF01"));

        let (responder, result) = pending();
        ActiveInput::Pin(responder).complete(&reply(InputKind::Pin, &[]));
        assert_eq!(result.await.unwrap_err().code(), ErrorCode::PinInputUnknown);
    }

    #[tokio::test]
    async fn test_slots_displace_same_kind_only() {
        let mut slots = InputSlots::default();
        let (first, first_pending) = pending();
        let (second, _second_pending) = pending();
        let (pin, _pin_pending) = pending();

        assert!(slots.insert(ActiveInput::YesNo(first)).is_none());
        assert!(slots.insert(ActiveInput::Pin(pin)).is_none());
        let displaced = slots.insert(ActiveInput::YesNo(second)).unwrap();
        displaced.fail(PoiError::cancelled_by_user());

        assert_eq!(first_pending.await.unwrap_err().code(), ErrorCode::CancelledByUser);
        assert_eq!(slots.take(InputKind::Pin).map(|i| i.kind()), Some(InputKind::Pin));
        assert_eq!(slots.take(InputKind::YesNo).map(|i| i.kind()), Some(InputKind::YesNo));
        assert!(slots.take(InputKind::YesNo).is_none());
    }
}
