use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Client, CommissionRate, NewPartner, Partner, PartnerStatus, ReferralCode};

#[derive(Debug, Clone, Error)]
pub enum PartnerApiError {
    #[error("Partner {0} does not exist.")]
    PartnerNotFound(String),
    #[error("A partner with email {0} is already registered.")]
    EmailAlreadyRegistered(String),
    #[error("The referral code {0} is already in use.")]
    ReferralCodeCollision(ReferralCode),
    #[error("Could not generate a unique referral code after {0} attempts.")]
    ReferralCodeExhausted(usize),
    #[error("Unknown referral code: {0}")]
    UnknownReferralCode(String),
    #[error("Partner #{id} cannot move from {from} to {to}.")]
    InvalidStatusTransition { id: i64, from: PartnerStatus, to: PartnerStatus },
    #[error("Partner #{0} is not active.")]
    PartnerNotActive(i64),
    #[error("A client with email {0} already exists.")]
    ClientAlreadyExists(String),
    #[error("Invalid request. {0}")]
    InvalidRequest(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for PartnerApiError {
    fn from(e: sqlx::Error) -> Self {
        PartnerApiError::DatabaseError(e.to_string())
    }
}

/// Partner and referred-client records. None of these methods touch partner balances; those are owned by
/// [`crate::traits::CommissionLedgerDatabase`].
#[allow(async_fn_in_trait)]
pub trait PartnerManagement {
    /// Stores a new partner with status `PENDING` and a zero balance.
    ///
    /// Fails with [`PartnerApiError::ReferralCodeCollision`] if `code` is taken, so that the caller can generate
    /// another one and try again.
    async fn insert_partner(
        &self,
        partner: NewPartner,
        rate: CommissionRate,
        code: ReferralCode,
    ) -> Result<Partner, PartnerApiError>;

    async fn fetch_partner(&self, partner_id: i64) -> Result<Option<Partner>, PartnerApiError>;

    async fn fetch_partner_by_email(&self, email: &str) -> Result<Option<Partner>, PartnerApiError>;

    async fn fetch_partner_by_referral_code(&self, code: &ReferralCode) -> Result<Option<Partner>, PartnerApiError>;

    async fn fetch_partners(&self, status: Option<PartnerStatus>) -> Result<Vec<Partner>, PartnerApiError>;

    /// Moves the partner to `status`, if the lifecycle allows it.
    async fn update_partner_status(&self, partner_id: i64, status: PartnerStatus) -> Result<Partner, PartnerApiError>;

    async fn update_commission_rate(&self, partner_id: i64, rate: CommissionRate) -> Result<Partner, PartnerApiError>;

    /// Increments the click counter of the partner owning `code`.
    async fn record_referral_click(&self, code: &ReferralCode) -> Result<Partner, PartnerApiError>;

    /// Registers a client referred by the partner owning `code`. The partner must be `ACTIVE`.
    async fn insert_client(
        &self,
        code: &ReferralCode,
        email: &str,
        referred_at: DateTime<Utc>,
    ) -> Result<Client, PartnerApiError>;

    async fn fetch_client_by_email(&self, email: &str) -> Result<Option<Client>, PartnerApiError>;
}
