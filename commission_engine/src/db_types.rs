use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use commission_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

pub use crate::ledger::CommissionBalance;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        ---------------------------------------------------------
/// The order identifier assigned by the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        AdminId        ---------------------------------------------------------
/// The authenticated identity of the administrator performing a ledger operation. Recorded on every transaction the
/// administrator creates or corrects.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct AdminId(pub String);

impl AdminId {
    /// The actor used for operations the system performs on its own, such as releasing expired holds.
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl<S: Into<String>> From<S> for AdminId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

impl Display for AdminId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------     ReferralCode      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ReferralCode(pub String);

impl ReferralCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Referral codes are matched case-insensitively; they are always stored upper-case.
    pub fn normalized(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }
}

impl Display for ReferralCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------    CommissionRate     ---------------------------------------------------------
/// A commission rate expressed in basis points (1/100th of a percent). 10% is 1000 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct CommissionRate(i64);

pub const MAX_COMMISSION_RATE_BPS: i64 = 10_000;

impl CommissionRate {
    pub fn from_bps(bps: i64) -> Result<Self, ConversionError> {
        if (0..=MAX_COMMISSION_RATE_BPS).contains(&bps) {
            Ok(Self(bps))
        } else {
            let max = MAX_COMMISSION_RATE_BPS;
            Err(ConversionError(format!("Commission rate must be between 0 and {max} bps, got {bps}")))
        }
    }

    pub fn from_percent(percent: u32) -> Result<Self, ConversionError> {
        Self::from_bps(i64::from(percent) * 100)
    }

    pub fn bps(&self) -> i64 {
        self.0
    }

    /// `round(price * rate / 100)`, rounding half away from zero. Intermediate values are widened so that large prices
    /// cannot overflow.
    pub fn commission_for(&self, price: Cents) -> Cents {
        let product = i128::from(price.value()) * i128::from(self.0);
        let divisor = i128::from(MAX_COMMISSION_RATE_BPS);
        let half = divisor / 2;
        let rounded = if product >= 0 { (product + half) / divisor } else { (product - half) / divisor };
        #[allow(clippy::cast_possible_truncation)]
        Cents::from(rounded as i64)
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self(1_000)
    }
}

impl Display for CommissionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

//--------------------------------------    PartnerStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartnerStatus {
    /// Registered, but not yet approved. Referral links do not attribute orders.
    Pending,
    /// Approved and earning commission.
    Active,
    /// Temporarily barred from earning new commission. Existing balances are untouched.
    Suspended,
    /// Permanently retired. Partners are never deleted.
    Inactive,
}

impl Display for PartnerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartnerStatus::Pending => write!(f, "PENDING"),
            PartnerStatus::Active => write!(f, "ACTIVE"),
            PartnerStatus::Suspended => write!(f, "SUSPENDED"),
            PartnerStatus::Inactive => write!(f, "INACTIVE"),
        }
    }
}

impl FromStr for PartnerStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "SUSPENDED" => Ok(Self::Suspended),
            "INACTIVE" => Ok(Self::Inactive),
            s => Err(ConversionError(format!("Invalid partner status: {s}"))),
        }
    }
}

impl PartnerStatus {
    /// Soft-state lifecycle. `Inactive` is terminal.
    pub fn can_transition_to(&self, new_status: PartnerStatus) -> bool {
        use PartnerStatus::*;
        matches!(
            (self, new_status),
            (Pending, Active) | (Active, Suspended) | (Suspended, Active) | (Pending | Active | Suspended, Inactive)
        )
    }
}

//--------------------------------------        Partner        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Partner {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub referral_code: ReferralCode,
    pub status: PartnerStatus,
    pub commission_rate: CommissionRate,
    #[sqlx(flatten)]
    pub balance: CommissionBalance,
    pub referral_clicks: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Partner {
    pub fn is_active(&self) -> bool {
        self.status == PartnerStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewPartner {
    pub name: String,
    pub email: String,
    /// If `None`, the configured default rate is used.
    pub commission_rate: Option<CommissionRate>,
}

impl NewPartner {
    pub fn new<S: Into<String>>(name: S, email: S) -> Self {
        Self { name: name.into(), email: email.into(), commission_rate: None }
    }

    pub fn with_commission_rate(mut self, rate: CommissionRate) -> Self {
        self.commission_rate = Some(rate);
        self
    }
}

//--------------------------------------        Client         ---------------------------------------------------------
/// A customer who arrived through a partner's referral link.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub email: String,
    pub referred_by: i64,
    pub referred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been placed, and payment has not completed yet.
    Pending,
    /// The payment gateway reported a successful payment.
    Paid,
    /// The order was cancelled before payment completed.
    Cancelled,
    /// The payment failed.
    Failed,
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "PENDING"),
            OrderStatusType::Paid => write!(f, "PAID"),
            OrderStatusType::Cancelled => write!(f, "CANCELLED"),
            OrderStatusType::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "CANCELLED" => Ok(Self::Cancelled),
            "FAILED" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub client_email: Option<String>,
    pub original_price: Cents,
    pub currency: String,
    /// The partner whose referral linkage this order carries, if any.
    pub referred_by: Option<i64>,
    /// When the referral linkage was created (link click or client registration).
    pub referred_at: Option<DateTime<Utc>>,
    /// The partner that earns commission on this order, stamped once by attribution.
    pub attributed_partner_id: Option<i64>,
    pub attribution_resolved: bool,
    pub commission_processed: bool,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// The order id as assigned by the storefront
    pub order_id: OrderId,
    /// The email of the customer that placed the order. Used to find a referred client.
    pub client_email: Option<String>,
    /// The price of the order before any discounts, which commission is calculated on.
    pub original_price: Cents,
    pub currency: String,
    /// The referral code carried by the order (e.g. from a referral cookie), if any.
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, original_price: Cents) -> Self {
        Self {
            order_id,
            client_email: None,
            original_price,
            currency: commission_common::DEFAULT_CURRENCY_CODE.to_string(),
            referral_code: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_client_email<S: Into<String>>(mut self, email: S) -> Self {
        self.client_email = Some(email.into());
        self
    }

    pub fn with_referral_code<S: Into<String>>(mut self, code: S) -> Self {
        self.referral_code = Some(code.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------    TransactionType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Earned,
    PaidOut,
    Adjusted,
    Hold,
    HoldReleased,
    Bonus,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Earned => write!(f, "EARNED"),
            TransactionType::PaidOut => write!(f, "PAID_OUT"),
            TransactionType::Adjusted => write!(f, "ADJUSTED"),
            TransactionType::Hold => write!(f, "HOLD"),
            TransactionType::HoldReleased => write!(f, "HOLD_RELEASED"),
            TransactionType::Bonus => write!(f, "BONUS"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EARNED" => Ok(Self::Earned),
            "PAID_OUT" => Ok(Self::PaidOut),
            "ADJUSTED" => Ok(Self::Adjusted),
            "HOLD" => Ok(Self::Hold),
            "HOLD_RELEASED" => Ok(Self::HoldReleased),
            "BONUS" => Ok(Self::Bonus),
            s => Err(ConversionError(format!("Invalid transaction type: {s}"))),
        }
    }
}

//--------------------------------------   TransactionStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    OnHold,
    Cancelled,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Completed => write!(f, "COMPLETED"),
            TransactionStatus::Failed => write!(f, "FAILED"),
            TransactionStatus::OnHold => write!(f, "ON_HOLD"),
            TransactionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "ON_HOLD" => Ok(Self::OnHold),
            "CANCELLED" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

//--------------------------------------    AdjustmentType     ---------------------------------------------------------
/// The kinds of manual adjustment an administrator can make to a partner's commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Add,
    Deduct,
    Hold,
    ReleaseHold,
    Bonus,
}

impl AdjustmentType {
    /// The ledger entry type recorded for this adjustment.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            AdjustmentType::Add | AdjustmentType::Deduct => TransactionType::Adjusted,
            AdjustmentType::Hold => TransactionType::Hold,
            AdjustmentType::ReleaseHold => TransactionType::HoldReleased,
            AdjustmentType::Bonus => TransactionType::Bonus,
        }
    }
}

impl Display for AdjustmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdjustmentType::Add => write!(f, "ADD"),
            AdjustmentType::Deduct => write!(f, "DEDUCT"),
            AdjustmentType::Hold => write!(f, "HOLD"),
            AdjustmentType::ReleaseHold => write!(f, "RELEASE_HOLD"),
            AdjustmentType::Bonus => write!(f, "BONUS"),
        }
    }
}

impl FromStr for AdjustmentType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ADD" => Ok(Self::Add),
            "DEDUCT" => Ok(Self::Deduct),
            "HOLD" => Ok(Self::Hold),
            "RELEASE_HOLD" => Ok(Self::ReleaseHold),
            "BONUS" => Ok(Self::Bonus),
            s => Err(ConversionError(format!("Invalid adjustment type: {s}"))),
        }
    }
}

//--------------------------------------  CommissionTransaction -------------------------------------------------------
/// An immutable ledger entry. One is appended, in the same store transaction, for every change to a partner's balance.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CommissionTransaction {
    pub id: i64,
    pub partner_id: i64,
    pub order_id: Option<OrderId>,
    /// Always positive. The direction is implied by `tx_type` (and `adjustment_type` for `ADJUSTED` entries).
    pub amount: Cents,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub adjustment_type: Option<AdjustmentType>,
    pub description: String,
    pub admin_notes: Option<String>,
    pub admin_id: Option<AdminId>,
    pub payment_method: Option<String>,
    pub external_reference: Option<String>,
    /// Available commission immediately before this entry was applied.
    pub balance_before: Cents,
    /// Available commission immediately after this entry was applied.
    pub balance_after: Cents,
    /// For `HOLD_RELEASED` entries, the id of the `HOLD` entry being released.
    pub related_transaction_id: Option<i64>,
    pub hold_until: Option<DateTime<Utc>>,
    pub metadata: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommissionTransaction {
    /// The signed effect this entry had on the partner's available commission when it was applied.
    pub fn signed_effect(&self) -> Cents {
        match (self.tx_type, self.adjustment_type) {
            (TransactionType::Adjusted, Some(AdjustmentType::Deduct)) => -self.amount,
            (TransactionType::Earned | TransactionType::Bonus | TransactionType::Adjusted, _) => self.amount,
            (TransactionType::HoldReleased, _) => self.amount,
            (TransactionType::PaidOut | TransactionType::Hold, _) => -self.amount,
        }
    }

    /// True if the recorded snapshots agree with the entry's signed effect.
    pub fn snapshots_are_consistent(&self) -> bool {
        self.balance_after - self.balance_before == self.signed_effect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == TransactionStatus::Cancelled
    }
}

/// A ledger entry that has not been written yet. Only the ledger engine creates these, alongside the balance change
/// that they describe.
#[derive(Debug, Clone)]
pub(crate) struct NewCommissionTransaction {
    pub partner_id: i64,
    pub order_id: Option<OrderId>,
    pub amount: Cents,
    pub tx_type: TransactionType,
    pub adjustment_type: Option<AdjustmentType>,
    pub description: String,
    pub admin_notes: Option<String>,
    pub admin_id: Option<AdminId>,
    pub payment_method: Option<String>,
    pub external_reference: Option<String>,
    pub balance_before: Cents,
    pub balance_after: Cents,
    pub related_transaction_id: Option<i64>,
    pub hold_until: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl NewCommissionTransaction {
    pub fn new(partner_id: i64, tx_type: TransactionType, amount: Cents, description: String) -> Self {
        Self {
            partner_id,
            order_id: None,
            amount,
            tx_type,
            adjustment_type: None,
            description,
            admin_notes: None,
            admin_id: None,
            payment_method: None,
            external_reference: None,
            balance_before: Cents::default(),
            balance_after: Cents::default(),
            related_transaction_id: None,
            hold_until: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }
}
