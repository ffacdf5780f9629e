//! EMV transaction flow state machine.
//!
//! # States
//!
//! - `Idle`: no EMV message received yet
//! - `PreparationSent`: the terminal reported transaction preparation (33.02)
//! - `AuthorizationRequested`: the card asked for online authorization (33.03)
//! - `AuthorizationConfirmed`: the card confirmed the host response (33.05)
//! - `Complete`: completion status recorded
//! - `Aborted`: the flow ended with an error
//!
//! # Valid Transitions
//!
//! - Idle → PreparationSent → AuthorizationRequested → AuthorizationConfirmed → Complete
//! - AuthorizationRequested → Complete (Quick Chip only)
//! - any non-terminal state → Aborted
//!
//! An inbound EMV message that does not match the next expected step aborts
//! the flow with `EmvUnknown`; a failed device status aborts it with the
//! mapped EMV error.
//!
//! # Examples
//!
//! ```
//! use poi_protocol::{DeviceMessage, MessageId};
//! use poi_session::emv::{EmvFlow, EmvState};
//!
//! let mut flow = EmvFlow::new(false);
//! flow.on_message(&DeviceMessage::ok(MessageId::EmvPreparation)).unwrap();
//! assert_eq!(flow.state(), EmvState::PreparationSent);
//!
//! // Confirmation before the authorization request aborts the flow.
//! let result = flow.on_message(&DeviceMessage::ok(MessageId::EmvAuthorizationConfirmation));
//! assert!(result.is_err());
//! assert_eq!(flow.state(), EmvState::Aborted);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use poi_core::constants::MAX_EMV_HISTORY;
use poi_core::{Amount, ErrorCode, PaymentType, PoiError, Result};
use poi_protocol::tlv::tags;
use poi_protocol::{DeviceMessage, MessageId, TagCollection};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// Index of the hex TLV field in EMV messages (after the status).
pub const EMV_TAGS_FIELD: usize = 1;

/// Authorization response code sent when the host approved.
pub const APPROVED_RESPONSE_CODE: &[u8] = b"00";

/// Authorization response code sent when the host declined.
pub const DECLINED_RESPONSE_CODE: &[u8] = b"05";

/// Position in the EMV flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmvState {
    Idle,
    PreparationSent,
    AuthorizationRequested,
    AuthorizationConfirmed,
    Complete,
    Aborted,
}

impl fmt::Display for EmvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            EmvState::Idle => "Idle",
            EmvState::PreparationSent => "PreparationSent",
            EmvState::AuthorizationRequested => "AuthorizationRequested",
            EmvState::AuthorizationConfirmed => "AuthorizationConfirmed",
            EmvState::Complete => "Complete",
            EmvState::Aborted => "Aborted",
        };
        write!(f, "{}", state_str)
    }
}

impl EmvState {
    /// Check if transition to target state is valid from this state.
    ///
    /// ```
    /// use poi_session::emv::EmvState;
    ///
    /// assert!(EmvState::Idle.can_transition_to(&EmvState::PreparationSent));
    /// assert!(!EmvState::Idle.can_transition_to(&EmvState::AuthorizationConfirmed));
    /// assert!(!EmvState::Complete.can_transition_to(&EmvState::Aborted));
    /// ```
    pub fn can_transition_to(&self, target: &EmvState) -> bool {
        matches!(
            (self, target),
            (EmvState::Idle, EmvState::PreparationSent)
                | (EmvState::PreparationSent, EmvState::AuthorizationRequested)
                | (
                    EmvState::AuthorizationRequested,
                    EmvState::AuthorizationConfirmed | EmvState::Complete
                )
                | (EmvState::AuthorizationConfirmed, EmvState::Complete)
        ) || (!self.is_terminal() && *target == EmvState::Aborted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EmvState::Complete | EmvState::Aborted)
    }

    /// State reached by receiving `id`, if `id` drives the flow.
    fn entered_by(id: MessageId) -> Option<EmvState> {
        match id {
            MessageId::EmvPreparation => Some(EmvState::PreparationSent),
            MessageId::EmvAuthorizationRequest => Some(EmvState::AuthorizationRequested),
            MessageId::EmvAuthorizationConfirmation => Some(EmvState::AuthorizationConfirmed),
            _ => None,
        }
    }
}

/// Map a failed EMV status reported by the device.
///
/// ```
/// use poi_core::ErrorCode;
/// use poi_session::emv::status_error;
///
/// assert_eq!(status_error("1").code(), ErrorCode::EmvCardRemoved);
/// assert_eq!(status_error("zz").code(), ErrorCode::EmvUnknown);
/// ```
pub fn status_error(status: &str) -> PoiError {
    let code = match status {
        "1" => ErrorCode::EmvCardRemoved,
        "2" => ErrorCode::EmvCardBlocked,
        "3" => ErrorCode::EmvChipError,
        "4" => ErrorCode::EmvUseMagneticStripe,
        "5" => ErrorCode::EmvCardNotSupported,
        "6" => ErrorCode::EmvChipReaderErrorFallback,
        "7" => ErrorCode::EmvChipReaderError,
        "8" => ErrorCode::EmvCardDeclinedOfflineWithError,
        "9" => ErrorCode::EmvUnacceptedContactlessMsdDetected,
        _ => ErrorCode::EmvUnknown,
    };
    PoiError::with_description(code, format!("EMV status {status}"))
}

fn protocol_violation(detail: impl Into<String>) -> PoiError {
    PoiError::with_description(ErrorCode::EmvUnknown, detail)
}

/// Which steps of the flow have been reached. Each flag is set at most once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmvFlags {
    pub preparation: bool,
    pub authorization_request: bool,
    pub authorization_confirmation: bool,
    pub payment_type_set: bool,
    pub completion_status_set: bool,
}

/// A single state transition with timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmvTransition {
    pub from: EmvState,
    pub to: EmvState,

    /// Not serialized; set to the deserialization time when read back.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl EmvTransition {
    fn new(from: EmvState, to: EmvState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }
}

/// One EMV transaction in progress.
///
/// Not thread-safe; the session actor owns it.
#[derive(Debug)]
pub struct EmvFlow {
    transaction_id: Uuid,
    state: EmvState,
    flags: EmvFlags,
    amount: Option<Amount>,
    quick_chip: bool,
    abort_reason: Option<PoiError>,
    history: VecDeque<EmvTransition>,
}

impl EmvFlow {
    pub fn new(quick_chip: bool) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            state: EmvState::Idle,
            flags: EmvFlags::default(),
            amount: None,
            quick_chip,
            abort_reason: None,
            history: VecDeque::with_capacity(8),
        }
    }

    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    pub fn state(&self) -> EmvState {
        self.state
    }

    pub fn flags(&self) -> EmvFlags {
        self.flags
    }

    pub fn amount(&self) -> Option<Amount> {
        self.amount
    }

    pub fn is_quick_chip(&self) -> bool {
        self.quick_chip
    }

    /// Error that aborted the flow.
    pub fn abort_reason(&self) -> Option<&PoiError> {
        self.abort_reason.as_ref()
    }

    /// Transitions from oldest to newest, bounded to the last
    /// `MAX_EMV_HISTORY` entries.
    pub fn history(&self) -> &VecDeque<EmvTransition> {
        &self.history
    }

    /// Record the transaction amount. The amount can be captured once.
    pub fn capture_amount(&mut self, amount: Amount) -> Result<()> {
        if self.amount.is_some() {
            return Err(protocol_violation("amount already captured"));
        }
        self.amount = Some(amount);
        Ok(())
    }

    /// Apply an inbound EMV message and return its tag collection.
    ///
    /// # Errors
    ///
    /// Aborts the flow and returns the abort reason when the message is out
    /// of order, carries a failed status, or has an undecodable tag field.
    pub fn on_message(&mut self, message: &DeviceMessage) -> Result<TagCollection> {
        let Some(target) = EmvState::entered_by(message.id) else {
            return Err(protocol_violation(format!(
                "message {} does not drive the EMV flow",
                message.id
            )));
        };

        if self.state.is_terminal() {
            return Err(protocol_violation(format!(
                "message {} after the flow ended ({})",
                message.id, self.state
            )));
        }

        if let Some(status) = message.status().filter(|s| !message.is_ok() && !s.is_empty()) {
            return Err(self.abort(status_error(status)));
        }

        if !self.state.can_transition_to(&target) {
            return Err(self.abort(protocol_violation(format!(
                "unexpected {} in state {}",
                message.id, self.state
            ))));
        }

        let tags = match message.tags(EMV_TAGS_FIELD) {
            Ok(tags) => tags,
            Err(e) => return Err(self.abort(protocol_violation(format!("bad EMV tags: {e}")))),
        };

        self.transition(target);
        match target {
            EmvState::PreparationSent => self.flags.preparation = true,
            EmvState::AuthorizationRequested => self.flags.authorization_request = true,
            EmvState::AuthorizationConfirmed => self.flags.authorization_confirmation = true,
            _ => {}
        }
        Ok(tags)
    }

    /// Record that the payment type was sent to the device.
    ///
    /// A second call is rejected without aborting the flow.
    pub fn mark_payment_type_set(&mut self) -> Result<()> {
        if self.flags.payment_type_set {
            return Err(protocol_violation("payment type already set"));
        }
        self.flags.payment_type_set = true;
        Ok(())
    }

    /// Record the completion status.
    ///
    /// A second call is rejected without aborting the flow.
    pub fn mark_completion_status_set(&mut self) -> Result<()> {
        if self.flags.completion_status_set {
            return Err(protocol_violation("completion status already set"));
        }
        self.flags.completion_status_set = true;
        Ok(())
    }

    /// Finish the flow. Requires a confirmed authorization, or a requested
    /// one when Quick Chip is enabled.
    pub fn complete(&mut self) -> Result<()> {
        let allowed = match self.state {
            EmvState::AuthorizationConfirmed => true,
            EmvState::AuthorizationRequested => self.quick_chip,
            _ => false,
        };
        if !allowed {
            return Err(protocol_violation(format!(
                "cannot complete from state {}",
                self.state
            )));
        }
        self.mark_completion_status_set()?;
        self.transition(EmvState::Complete);
        Ok(())
    }

    /// Abort the flow with `reason` and return it. A terminal flow is left
    /// unchanged.
    pub fn abort(&mut self, reason: PoiError) -> PoiError {
        if self.state.is_terminal() {
            return reason;
        }
        warn!(
            transaction_id = %self.transaction_id,
            state = %self.state,
            %reason,
            "EMV flow aborted"
        );
        self.transition(EmvState::Aborted);
        self.abort_reason = Some(reason.clone());
        reason
    }

    fn transition(&mut self, to: EmvState) {
        debug!(transaction_id = %self.transaction_id, from = %self.state, %to, "EMV transition");
        self.history.push_back(EmvTransition::new(self.state, to));
        if self.history.len() > MAX_EMV_HISTORY {
            self.history.pop_front();
        }
        self.state = to;
    }
}

/// Request to start an EMV transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmvTransactionRequest {
    pub amount: Amount,
    pub payment_type: PaymentType,
}

impl EmvTransactionRequest {
    pub fn new(amount: Amount, payment_type: PaymentType) -> Self {
        Self {
            amount,
            payment_type,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.amount.is_zero() {
            return Err(PoiError::parameter_is_nil("amount"));
        }
        Ok(())
    }
}

/// The card's request for online authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub transaction_id: Uuid,
    pub tags: TagCollection,
    pub amount: Amount,
}

/// The host's answer, forwarded to the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub approved: bool,
    pub tags: TagCollection,
}

impl AuthorizationResponse {
    pub fn approved(tags: TagCollection) -> Self {
        Self {
            approved: true,
            tags,
        }
    }

    pub fn declined(tags: TagCollection) -> Self {
        Self {
            approved: false,
            tags,
        }
    }

    /// Message carrying the response. Tag 8A is filled in from `approved`
    /// unless the host supplied it.
    pub fn to_message(&self) -> Result<DeviceMessage> {
        let mut collection = self.tags.clone();
        if !collection.contains(tags::AUTHORIZATION_RESPONSE_CODE) {
            let code = if self.approved {
                APPROVED_RESPONSE_CODE
            } else {
                DECLINED_RESPONSE_CODE
            };
            collection
                .insert(tags::AUTHORIZATION_RESPONSE_CODE, code.to_vec())
                .map_err(PoiError::from)?;
        }
        Ok(DeviceMessage::new(MessageId::EmvAuthorizationResponse).with_tags(&collection))
    }
}

/// Result of submitting an authorization response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationOutcome {
    pub transaction_id: Uuid,
    pub approved: bool,
    /// Tags from the confirmation message; empty with Quick Chip.
    pub confirmation_tags: TagCollection,
    /// Whether the flow completed without waiting for the confirmation.
    pub quick_chip: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emv(id: MessageId) -> DeviceMessage {
        DeviceMessage::ok(id)
    }

    fn advance_to_requested(flow: &mut EmvFlow) {
        flow.on_message(&emv(MessageId::EmvPreparation)).unwrap();
        flow.on_message(&emv(MessageId::EmvAuthorizationRequest)).unwrap();
    }

    #[test]
    fn test_full_flow() {
        let mut flow = EmvFlow::new(false);
        flow.capture_amount(Amount::from_cents(1500)).unwrap();

        flow.on_message(&emv(MessageId::EmvPreparation)).unwrap();
        flow.mark_payment_type_set().unwrap();
        flow.on_message(&emv(MessageId::EmvAuthorizationRequest)).unwrap();
        flow.on_message(&emv(MessageId::EmvAuthorizationConfirmation)).unwrap();
        flow.complete().unwrap();

        assert_eq!(flow.state(), EmvState::Complete);
        assert_eq!(
            flow.flags(),
            EmvFlags {
                preparation: true,
                authorization_request: true,
                authorization_confirmation: true,
                payment_type_set: true,
                completion_status_set: true,
            }
        );
        assert_eq!(flow.history().len(), 4);
        assert_eq!(flow.amount(), Some(Amount::from_cents(1500)));
    }

    #[test]
    fn test_confirmation_before_request_aborts() {
        let mut flow = EmvFlow::new(false);
        flow.on_message(&emv(MessageId::EmvPreparation)).unwrap();

        let error = flow
            .on_message(&emv(MessageId::EmvAuthorizationConfirmation))
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::EmvUnknown);
        assert_eq!(flow.state(), EmvState::Aborted);
        assert!(flow.complete().is_err());
        assert_eq!(flow.state(), EmvState::Aborted);
    }

    #[test]
    fn test_repeated_message_aborts() {
        let mut flow = EmvFlow::new(false);
        flow.on_message(&emv(MessageId::EmvPreparation)).unwrap();
        assert!(flow.on_message(&emv(MessageId::EmvPreparation)).is_err());
        assert_eq!(flow.state(), EmvState::Aborted);
    }

    #[test]
    fn test_messages_after_abort_do_not_restart() {
        let mut flow = EmvFlow::new(false);
        flow.abort(PoiError::cancelled_by_user());
        assert!(flow.on_message(&emv(MessageId::EmvPreparation)).is_err());
        assert_eq!(flow.state(), EmvState::Aborted);
        assert_eq!(
            flow.abort_reason().map(PoiError::code),
            Some(ErrorCode::CancelledByUser)
        );
    }

    #[test]
    fn test_failed_status_maps_to_emv_error() {
        let mut flow = EmvFlow::new(false);
        let message = DeviceMessage::reply(MessageId::EmvPreparation, "2");
        assert_eq!(
            flow.on_message(&message).unwrap_err().code(),
            ErrorCode::EmvCardBlocked
        );
        assert_eq!(flow.state(), EmvState::Aborted);
    }

    #[test]
    fn test_flags_are_set_once_without_abort() {
        let mut flow = EmvFlow::new(false);
        flow.on_message(&emv(MessageId::EmvPreparation)).unwrap();
        flow.mark_payment_type_set().unwrap();

        let error = flow.mark_payment_type_set().unwrap_err();
        assert_eq!(error.code(), ErrorCode::EmvUnknown);
        assert_eq!(flow.state(), EmvState::PreparationSent);

        flow.mark_completion_status_set().unwrap();
        assert!(flow.mark_completion_status_set().is_err());
        assert_eq!(flow.state(), EmvState::PreparationSent);
    }

    #[test]
    fn test_amount_is_immutable() {
        let mut flow = EmvFlow::new(false);
        flow.capture_amount(Amount::from_cents(100)).unwrap();
        assert!(flow.capture_amount(Amount::from_cents(200)).is_err());
        assert_eq!(flow.amount(), Some(Amount::from_cents(100)));
    }

    #[test]
    fn test_quick_chip_completes_from_requested() {
        let mut flow = EmvFlow::new(true);
        advance_to_requested(&mut flow);
        flow.complete().unwrap();
        assert_eq!(flow.state(), EmvState::Complete);
        assert!(!flow.flags().authorization_confirmation);

        let mut flow = EmvFlow::new(false);
        advance_to_requested(&mut flow);
        assert!(flow.complete().is_err());
        assert_eq!(flow.state(), EmvState::AuthorizationRequested);
    }

    #[test]
    fn test_tags_are_returned() {
        let mut flow = EmvFlow::new(false);
        flow.on_message(&emv(MessageId::EmvPreparation)).unwrap();

        let mut collection = TagCollection::new();
        collection.set_amount_authorized(Amount::from_cents(2500)).unwrap();
        let message = DeviceMessage::ok(MessageId::EmvAuthorizationRequest).with_tags(&collection);

        let received = flow.on_message(&message).unwrap();
        assert_eq!(received.amount_authorized(), Some(Amount::from_cents(2500)));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut flow = EmvFlow::new(false);
        for _ in 0..(MAX_EMV_HISTORY + 10) {
            flow.transition(EmvState::Idle);
        }
        assert_eq!(flow.history().len(), MAX_EMV_HISTORY);
    }

    #[test]
    fn test_authorization_response_fills_response_code() {
        let message = AuthorizationResponse::declined(TagCollection::new())
            .to_message()
            .unwrap();
        let sent = message.tags(0).unwrap();
        assert_eq!(
            sent.get(tags::AUTHORIZATION_RESPONSE_CODE),
            Some(DECLINED_RESPONSE_CODE)
        );

        let mut host = TagCollection::new();
        host.insert(tags::AUTHORIZATION_RESPONSE_CODE, b"51".to_vec())
            .unwrap();
        let message = AuthorizationResponse::approved(host).to_message().unwrap();
        assert_eq!(
            message.tags(0).unwrap().get(tags::AUTHORIZATION_RESPONSE_CODE),
            Some(&b"51"[..])
        );
    }
}
