use chrono::Utc;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{CommissionRate, NewPartner, Partner, PartnerStatus, ReferralCode},
    ledger::CommissionBalance,
};

pub async fn insert_partner(
    partner: &NewPartner,
    rate: CommissionRate,
    code: &ReferralCode,
    conn: &mut SqliteConnection,
) -> Result<Partner, sqlx::Error> {
    let now = Utc::now();
    let partner: Partner = sqlx::query_as(
        r#"
            INSERT INTO partners (name, email, referral_code, status, commission_rate, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(partner.name.as_str())
    .bind(partner.email.as_str())
    .bind(code)
    .bind(PartnerStatus::Pending)
    .bind(rate)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("👤 Partner #{} ({}) inserted with referral code {}", partner.id, partner.email, partner.referral_code);
    Ok(partner)
}

pub async fn fetch_partner(partner_id: i64, conn: &mut SqliteConnection) -> Result<Option<Partner>, sqlx::Error> {
    let partner = sqlx::query_as("SELECT * FROM partners WHERE id = $1").bind(partner_id).fetch_optional(conn).await?;
    Ok(partner)
}

pub async fn fetch_partner_by_email(email: &str, conn: &mut SqliteConnection) -> Result<Option<Partner>, sqlx::Error> {
    let partner = sqlx::query_as("SELECT * FROM partners WHERE email = $1").bind(email).fetch_optional(conn).await?;
    Ok(partner)
}

pub async fn fetch_partner_by_referral_code(
    code: &ReferralCode,
    conn: &mut SqliteConnection,
) -> Result<Option<Partner>, sqlx::Error> {
    let partner =
        sqlx::query_as("SELECT * FROM partners WHERE referral_code = $1").bind(code).fetch_optional(conn).await?;
    Ok(partner)
}

pub async fn fetch_partners(
    status: Option<PartnerStatus>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Partner>, sqlx::Error> {
    let partners = match status {
        Some(status) => {
            sqlx::query_as("SELECT * FROM partners WHERE status = $1 ORDER BY id").bind(status).fetch_all(conn).await?
        },
        None => sqlx::query_as("SELECT * FROM partners ORDER BY id").fetch_all(conn).await?,
    };
    Ok(partners)
}

pub async fn update_status(
    partner_id: i64,
    status: PartnerStatus,
    conn: &mut SqliteConnection,
) -> Result<Partner, sqlx::Error> {
    let partner =
        sqlx::query_as("UPDATE partners SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(status)
            .bind(Utc::now())
            .bind(partner_id)
            .fetch_one(conn)
            .await?;
    trace!("👤 Partner #{partner_id} status set to {status}");
    Ok(partner)
}

pub async fn update_commission_rate(
    partner_id: i64,
    rate: CommissionRate,
    conn: &mut SqliteConnection,
) -> Result<Option<Partner>, sqlx::Error> {
    let partner =
        sqlx::query_as("UPDATE partners SET commission_rate = $1, updated_at = $2 WHERE id = $3 RETURNING *")
            .bind(rate)
            .bind(Utc::now())
            .bind(partner_id)
            .fetch_optional(conn)
            .await?;
    Ok(partner)
}

pub async fn increment_referral_clicks(
    code: &ReferralCode,
    conn: &mut SqliteConnection,
) -> Result<Option<Partner>, sqlx::Error> {
    let partner = sqlx::query_as(
        r#"
            UPDATE partners SET referral_clicks = referral_clicks + 1, updated_at = $1
            WHERE referral_code = $2
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(code)
    .fetch_optional(conn)
    .await?;
    Ok(partner)
}

/// Writes a new balance for the partner, provided that nobody else has written one since `expected_version` was read.
///
/// Returns `false` if the version no longer matches, in which case nothing was written. This is the only function
/// that writes partner balance fields.
pub(in crate::sqlite) async fn write_balance(
    partner_id: i64,
    expected_version: i64,
    balance: &CommissionBalance,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE partners SET
                commission_earned = $1,
                commission_paid = $2,
                commission_on_hold = $3,
                version = version + 1,
                updated_at = $4
            WHERE id = $5 AND version = $6
        "#,
    )
    .bind(balance.earned())
    .bind(balance.paid())
    .bind(balance.on_hold())
    .bind(Utc::now())
    .bind(partner_id)
    .bind(expected_version)
    .execute(conn)
    .await?;
    let written = result.rows_affected() == 1;
    trace!(
        "🧾 Balance write for partner #{partner_id} at version {expected_version}: {}",
        if written { "ok" } else { "version mismatch" }
    );
    Ok(written)
}
