//! Financial response composites.
//!
//! Each response type is a plain struct of named fragments. The fragments a
//! type carries are exposed through capability traits ([`HasBase`],
//! [`HasAmounts`], ...), so generic code can ask for "anything with a card
//! and amounts" without caring whether it holds a sale or a refund.
//!
//! | Response | Fragments |
//! |----------|-----------|
//! | [`AuthorizationResponse`] | base, amounts, tip, card, card verification, EMV, host, store-and-forward, surcharge, debit account, language |
//! | [`SaleResponse`] | authorization set plus cashback |
//! | [`RefundResponse`] | base, amounts, card, card verification, EMV, host, store-and-forward, debit account, language |
//! | [`PrereadResponse`] | card, payment type, PIN verified |
//! | [`EbtBalanceInquiryResponse`] | base, amounts, card, host, EMV |

use crate::receipt::EmvData;
use crate::types::{Amount, CardData, DebitAccountType, DeviceLanguage, PaymentType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseFragment {
    pub transaction_id: String,
    pub is_approved: bool,
    pub approval_code: Option<String>,
    pub transaction_date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountsFragment {
    pub total_amount: Amount,
    pub approved_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashbackFragment {
    pub cashback_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipFragment {
    pub tip_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFragment {
    pub card: CardData,
    /// Card brand, e.g. "Visa".
    pub card_logo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardVerificationFragment {
    pub was_pin_verified: bool,
    pub signature_required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmvFragment {
    pub emv_data: Option<EmvData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFragment {
    pub response_code: String,
    pub response_message: String,
    pub reference_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreAndForwardFragment {
    /// Whether the transaction was stored for later forwarding.
    pub was_stored: bool,
    pub store_and_forward_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurchargeFragment {
    pub surcharge_amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitAccountFragment {
    pub account_type: DebitAccountType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageFragment {
    pub language: DeviceLanguage,
}

pub trait HasBase {
    fn base(&self) -> &BaseFragment;
}

pub trait HasAmounts {
    fn amounts(&self) -> &AmountsFragment;
}

pub trait HasCashback {
    fn cashback(&self) -> &CashbackFragment;
}

pub trait HasTip {
    fn tip(&self) -> &TipFragment;
}

pub trait HasCard {
    fn card(&self) -> &CardFragment;
}

pub trait HasCardVerification {
    fn card_verification(&self) -> &CardVerificationFragment;
}

pub trait HasEmv {
    fn emv(&self) -> &EmvFragment;
}

pub trait HasHost {
    fn host(&self) -> &HostFragment;
}

pub trait HasStoreAndForward {
    fn store_and_forward(&self) -> &StoreAndForwardFragment;
}

pub trait HasSurcharge {
    fn surcharge(&self) -> &SurchargeFragment;
}

pub trait HasDebitAccount {
    fn debit_account(&self) -> &DebitAccountFragment;
}

pub trait HasLanguage {
    fn language(&self) -> &LanguageFragment;
}

/// Implement a capability trait by returning the field of the same name.
macro_rules! capability {
    ($trait_:ident :: $field:ident => $fragment:ty; $($response:ty),+ $(,)?) => {
        $(
            impl $trait_ for $response {
                fn $field(&self) -> &$fragment {
                    &self.$field
                }
            }
        )+
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub base: BaseFragment,
    pub amounts: AmountsFragment,
    pub tip: TipFragment,
    pub card: CardFragment,
    pub card_verification: CardVerificationFragment,
    pub emv: EmvFragment,
    pub host: HostFragment,
    pub store_and_forward: StoreAndForwardFragment,
    pub surcharge: SurchargeFragment,
    pub debit_account: DebitAccountFragment,
    pub language: LanguageFragment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleResponse {
    pub base: BaseFragment,
    pub amounts: AmountsFragment,
    pub cashback: CashbackFragment,
    pub tip: TipFragment,
    pub card: CardFragment,
    pub card_verification: CardVerificationFragment,
    pub emv: EmvFragment,
    pub host: HostFragment,
    pub store_and_forward: StoreAndForwardFragment,
    pub surcharge: SurchargeFragment,
    pub debit_account: DebitAccountFragment,
    pub language: LanguageFragment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub base: BaseFragment,
    pub amounts: AmountsFragment,
    pub card: CardFragment,
    pub card_verification: CardVerificationFragment,
    pub emv: EmvFragment,
    pub host: HostFragment,
    pub store_and_forward: StoreAndForwardFragment,
    pub debit_account: DebitAccountFragment,
    pub language: LanguageFragment,
}

/// Card read ahead of the amount being known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrereadResponse {
    pub card: CardFragment,
    pub payment_type: PaymentType,
    pub was_pin_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EbtBalanceInquiryResponse {
    pub base: BaseFragment,
    pub amounts: AmountsFragment,
    pub card: CardFragment,
    pub host: HostFragment,
    pub emv: EmvFragment,
}

capability!(HasBase::base => BaseFragment;
    AuthorizationResponse, SaleResponse, RefundResponse, EbtBalanceInquiryResponse);
capability!(HasAmounts::amounts => AmountsFragment;
    AuthorizationResponse, SaleResponse, RefundResponse, EbtBalanceInquiryResponse);
capability!(HasCashback::cashback => CashbackFragment; SaleResponse);
capability!(HasTip::tip => TipFragment; AuthorizationResponse, SaleResponse);
capability!(HasCard::card => CardFragment;
    AuthorizationResponse, SaleResponse, RefundResponse, PrereadResponse, EbtBalanceInquiryResponse);
capability!(HasCardVerification::card_verification => CardVerificationFragment;
    AuthorizationResponse, SaleResponse, RefundResponse);
capability!(HasEmv::emv => EmvFragment;
    AuthorizationResponse, SaleResponse, RefundResponse, EbtBalanceInquiryResponse);
capability!(HasHost::host => HostFragment;
    AuthorizationResponse, SaleResponse, RefundResponse, EbtBalanceInquiryResponse);
capability!(HasStoreAndForward::store_and_forward => StoreAndForwardFragment;
    AuthorizationResponse, SaleResponse, RefundResponse);
capability!(HasSurcharge::surcharge => SurchargeFragment; AuthorizationResponse, SaleResponse);
capability!(HasDebitAccount::debit_account => DebitAccountFragment;
    AuthorizationResponse, SaleResponse, RefundResponse);
capability!(HasLanguage::language => LanguageFragment;
    AuthorizationResponse, SaleResponse, RefundResponse);

impl SaleResponse {
    /// Total charged to the card: approved amount plus cashback and tip.
    #[must_use]
    pub fn total_with_extras(&self) -> Option<Amount> {
        self.amounts
            .approved_amount
            .checked_add(self.cashback.cashback_amount)?
            .checked_add(self.tip.tip_amount)
    }
}
