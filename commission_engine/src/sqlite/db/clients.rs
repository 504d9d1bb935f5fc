use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::Client;

pub async fn insert_client(
    email: &str,
    partner_id: i64,
    referred_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Client, sqlx::Error> {
    let client: Client = sqlx::query_as(
        r#"
            INSERT INTO clients (email, referred_by, referred_at, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(email)
    .bind(partner_id)
    .bind(referred_at)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!("👤 Client #{} ({email}) registered as referred by partner #{partner_id}", client.id);
    Ok(client)
}

pub async fn fetch_client_by_email(email: &str, conn: &mut SqliteConnection) -> Result<Option<Client>, sqlx::Error> {
    let client = sqlx::query_as("SELECT * FROM clients WHERE email = $1").bind(email).fetch_optional(conn).await?;
    Ok(client)
}

pub async fn count_referred_clients(partner_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients WHERE referred_by = $1")
        .bind(partner_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
