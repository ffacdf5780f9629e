//! Receipt content rendered by the printer.

use crate::financial::{HasAmounts, HasBase, HasCard, HasCardVerification, HasEmv, HasHost};
use crate::types::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// EMV values printed on chip receipts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmvData {
    /// Application identifier (tag 4F).
    pub application_identifier: String,
    /// Application label (tag 50).
    pub application_label: String,
    /// Application cryptogram (tag 9F26).
    pub cryptogram: String,
    /// Terminal verification results (tag 95).
    pub terminal_verification_results: String,
    /// Transaction status information (tag 9B).
    pub transaction_status_information: String,
}

/// Data needed to render a transaction receipt.
///
/// Every field is optional; the builder renders only what is present.
///
/// # Examples
///
/// ```
/// use poi_core::{Amount, ReceiptData};
///
/// let receipt = ReceiptData {
///     merchant_id: Some("M-001".into()),
///     transaction_amount: Some(Amount::from_cents(1999)),
///     ..Default::default()
/// };
/// assert!(receipt.emv_data.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptData {
    pub header_lines: Vec<String>,
    pub footer_lines: Vec<String>,
    pub merchant_id: Option<String>,
    pub terminal_id: Option<String>,
    pub reference_number: Option<String>,
    /// Masked account number.
    pub account_number: Option<String>,
    pub card_type: Option<String>,
    pub entry_type: Option<String>,
    pub transaction_id: Option<String>,
    pub approval_code: Option<String>,
    pub response_code: Option<String>,
    pub transaction_status: Option<String>,
    pub transaction_type: Option<String>,
    pub transaction_amount: Option<Amount>,
    pub approved_amount: Option<Amount>,
    pub cashback_amount: Option<Amount>,
    pub tip_amount: Option<Amount>,
    pub signature_required: bool,
    pub pin_verified: bool,
    pub emv_data: Option<EmvData>,
    pub date_time: Option<DateTime<Utc>>,
    /// "MERCHANT COPY", "CUSTOMER COPY", ...
    pub type_of_copy: Option<String>,
    pub signature_agreement_text: Option<String>,
}

impl ReceiptData {
    /// Derive receipt data from a financial response.
    ///
    /// Merchant-specific values (header, footer, merchant and terminal ids,
    /// copy type) are left empty for the caller to fill in.
    pub fn from_response<R>(response: &R, transaction_type: impl Into<String>) -> Self
    where
        R: HasBase + HasAmounts + HasCard + HasCardVerification + HasEmv + HasHost,
    {
        let base = response.base();
        let amounts = response.amounts();
        let card = response.card();
        let verification = response.card_verification();
        let host = response.host();

        Self {
            reference_number: host.reference_number.clone(),
            account_number: Some(card.card.masked_pan.clone()),
            card_type: Some(card.card_logo.clone()),
            entry_type: Some(card.card.entry_mode.to_string()),
            transaction_id: Some(base.transaction_id.clone()),
            approval_code: base.approval_code.clone(),
            response_code: Some(host.response_code.clone()),
            transaction_status: Some(if base.is_approved {
                "APPROVED".to_string()
            } else {
                "DECLINED".to_string()
            }),
            transaction_type: Some(transaction_type.into()),
            transaction_amount: Some(amounts.total_amount),
            approved_amount: Some(amounts.approved_amount),
            signature_required: verification.signature_required,
            pin_verified: verification.was_pin_verified,
            emv_data: response.emv().emv_data.clone(),
            date_time: Some(base.transaction_date_time),
            ..Default::default()
        }
    }
}
