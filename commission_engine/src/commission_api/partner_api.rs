use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    commission_api::config::PartnerConfig,
    db_types::{Client, CommissionRate, NewPartner, Partner, PartnerStatus, ReferralCode},
    helpers::{is_plausible_email, new_referral_code, normalize_email},
    traits::{PartnerApiError, PartnerManagement},
};

/// Partner registration, lifecycle and referral tracking.
pub struct PartnerApi<B> {
    db: B,
    config: PartnerConfig,
}

impl<B: Clone> Clone for PartnerApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), config: self.config }
    }
}

impl<B> Debug for PartnerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PartnerApi ({:?})", self.config)
    }
}

impl<B> PartnerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, config: PartnerConfig::default() }
    }

    pub fn with_config(mut self, config: PartnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> PartnerApi<B>
where B: PartnerManagement
{
    /// Registers a new partner in the `PENDING` state and assigns it a fresh referral code.
    ///
    /// Codes are derived from the partner's email and a random nonce, so a collision is resolved by simply trying
    /// again with a new nonce.
    pub async fn register_partner(&self, partner: NewPartner) -> Result<Partner, PartnerApiError> {
        let name = partner.name.trim().to_string();
        if name.is_empty() {
            return Err(PartnerApiError::InvalidRequest("The partner name is empty".into()));
        }
        let email = normalize_email(&partner.email);
        if !is_plausible_email(&email) {
            return Err(PartnerApiError::InvalidRequest(format!("{} is not a valid email address", partner.email)));
        }
        let rate = partner.commission_rate.unwrap_or(self.config.default_commission_rate);
        let partner = NewPartner { name, email, commission_rate: Some(rate) };
        for attempt in 1..=self.config.referral_code_attempts {
            let code = new_referral_code(&partner.email);
            match self.db.insert_partner(partner.clone(), rate, code).await {
                Err(PartnerApiError::ReferralCodeCollision(code)) => {
                    warn!("👤 Referral code {code} is taken (attempt {attempt}). Generating another one");
                },
                Ok(p) => {
                    let code = &p.referral_code;
                    info!("👤 Partner #{} ({}) registered with referral code {code} at {rate}", p.id, p.email);
                    return Ok(p);
                },
                Err(e) => return Err(e),
            }
        }
        error!("👤 Could not find a free referral code for {}", partner.email);
        Err(PartnerApiError::ReferralCodeExhausted(self.config.referral_code_attempts))
    }

    pub async fn fetch_partner(&self, partner_id: i64) -> Result<Option<Partner>, PartnerApiError> {
        self.db.fetch_partner(partner_id).await
    }

    pub async fn fetch_partner_by_email(&self, email: &str) -> Result<Option<Partner>, PartnerApiError> {
        self.db.fetch_partner_by_email(&normalize_email(email)).await
    }

    pub async fn fetch_partner_by_referral_code(&self, code: &str) -> Result<Option<Partner>, PartnerApiError> {
        self.db.fetch_partner_by_referral_code(&ReferralCode::normalized(code)).await
    }

    pub async fn list_partners(&self, status: Option<PartnerStatus>) -> Result<Vec<Partner>, PartnerApiError> {
        self.db.fetch_partners(status).await
    }

    pub async fn activate(&self, partner_id: i64) -> Result<Partner, PartnerApiError> {
        self.set_status(partner_id, PartnerStatus::Active).await
    }

    pub async fn suspend(&self, partner_id: i64) -> Result<Partner, PartnerApiError> {
        self.set_status(partner_id, PartnerStatus::Suspended).await
    }

    /// Deactivation is permanent. The partner keeps its ledger but can never earn again.
    pub async fn deactivate(&self, partner_id: i64) -> Result<Partner, PartnerApiError> {
        self.set_status(partner_id, PartnerStatus::Inactive).await
    }

    pub async fn set_status(&self, partner_id: i64, status: PartnerStatus) -> Result<Partner, PartnerApiError> {
        let partner = self.db.update_partner_status(partner_id, status).await?;
        info!("👤 Partner #{partner_id} is now {status}");
        Ok(partner)
    }

    /// Sets the partner's commission rate, in basis points. Commission already earned is not affected.
    pub async fn set_commission_rate(&self, partner_id: i64, bps: i64) -> Result<Partner, PartnerApiError> {
        let rate = CommissionRate::from_bps(bps).map_err(|e| PartnerApiError::InvalidRequest(e.to_string()))?;
        let partner = self.db.update_commission_rate(partner_id, rate).await?;
        info!("👤 Commission rate for partner #{partner_id} set to {rate}");
        Ok(partner)
    }

    pub async fn record_click(&self, code: &str) -> Result<Partner, PartnerApiError> {
        let partner = self.db.record_referral_click(&ReferralCode::normalized(code)).await?;
        trace!("👤 Referral click #{} for partner #{}", partner.referral_clicks, partner.id);
        Ok(partner)
    }

    /// Registers a customer who arrived through the partner's referral link. The linkage starts now.
    pub async fn register_client(&self, code: &str, email: &str) -> Result<Client, PartnerApiError> {
        let email = normalize_email(email);
        if !is_plausible_email(&email) {
            return Err(PartnerApiError::InvalidRequest(format!("{email} is not a valid email address")));
        }
        let client = self.db.insert_client(&ReferralCode::normalized(code), &email, Utc::now()).await?;
        info!("👤 Client {} registered as referred by partner #{}", client.email, client.referred_by);
        Ok(client)
    }

    pub async fn fetch_client_by_email(&self, email: &str) -> Result<Option<Client>, PartnerApiError> {
        self.db.fetch_client_by_email(&normalize_email(email)).await
    }
}
