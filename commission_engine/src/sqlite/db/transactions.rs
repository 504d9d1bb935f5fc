use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{types::Json, QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    commission_api::transaction_objects::{Pagination, TransactionQueryFilter},
    db_types::{AdminId, Cents, CommissionTransaction, NewCommissionTransaction, TransactionStatus, TransactionType},
};

/// Appends a ledger entry. Only the ledger methods of the SQLite backend call this, in the same transaction as the
/// balance write it describes.
pub(in crate::sqlite) async fn insert_transaction(
    entry: NewCommissionTransaction,
    status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<CommissionTransaction, sqlx::Error> {
    let now = Utc::now();
    let tx: CommissionTransaction = sqlx::query_as(
        r#"
            INSERT INTO commission_transactions (
                partner_id,
                order_id,
                amount,
                tx_type,
                status,
                adjustment_type,
                description,
                admin_notes,
                admin_id,
                payment_method,
                external_reference,
                balance_before,
                balance_after,
                related_transaction_id,
                hold_until,
                metadata,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $17)
            RETURNING *;
        "#,
    )
    .bind(entry.partner_id)
    .bind(entry.order_id)
    .bind(entry.amount)
    .bind(entry.tx_type)
    .bind(status)
    .bind(entry.adjustment_type)
    .bind(entry.description)
    .bind(entry.admin_notes)
    .bind(entry.admin_id)
    .bind(entry.payment_method)
    .bind(entry.external_reference)
    .bind(entry.balance_before)
    .bind(entry.balance_after)
    .bind(entry.related_transaction_id)
    .bind(entry.hold_until)
    .bind(Json(entry.metadata))
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🧾 Ledger entry #{} ({} {}) appended for partner #{}", tx.id, tx.tx_type, tx.amount, tx.partner_id);
    Ok(tx)
}

pub async fn fetch_transaction(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<CommissionTransaction>, sqlx::Error> {
    let tx =
        sqlx::query_as("SELECT * FROM commission_transactions WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(tx)
}

/// The `HOLD_RELEASED` entry for the given hold, if it has been released.
pub async fn fetch_release_for_hold(
    hold_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<CommissionTransaction>, sqlx::Error> {
    let tx = sqlx::query_as(
        "SELECT * FROM commission_transactions WHERE tx_type = 'HOLD_RELEASED' AND related_transaction_id = $1",
    )
    .bind(hold_id)
    .fetch_optional(conn)
    .await?;
    Ok(tx)
}

/// Sets a new status on a ledger entry and appends `note` to its admin notes.
pub(in crate::sqlite) async fn update_status(
    id: i64,
    status: TransactionStatus,
    admin_id: Option<&AdminId>,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<CommissionTransaction, sqlx::Error> {
    let tx = sqlx::query_as(
        r#"
            UPDATE commission_transactions SET
                status = $1,
                admin_id = COALESCE($2, admin_id),
                admin_notes = CASE
                    WHEN admin_notes IS NULL OR admin_notes = '' THEN $3
                    ELSE admin_notes || char(10) || $3
                END,
                updated_at = $4
            WHERE id = $5
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(admin_id)
    .bind(note)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(tx)
}

pub async fn fetch_expired_holds(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<CommissionTransaction>, sqlx::Error> {
    let holds = sqlx::query_as(
        r#"
            SELECT h.* FROM commission_transactions h
            WHERE h.tx_type = 'HOLD'
              AND h.hold_until IS NOT NULL
              AND h.hold_until <= $1
              AND NOT EXISTS (
                SELECT 1 FROM commission_transactions r
                WHERE r.tx_type = 'HOLD_RELEASED' AND r.related_transaction_id = h.id
              )
            ORDER BY h.hold_until, h.id
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(holds)
}

/// Sums the amounts of a partner's entries of the given types, optionally ignoring entries with `exclude_status` and
/// entries created before `since`.
pub async fn sum_amounts(
    partner_id: i64,
    types: &[TransactionType],
    exclude_status: Option<TransactionStatus>,
    since: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<Cents, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Sqlite>::new("SELECT COALESCE(SUM(amount), 0) FROM commission_transactions WHERE ");
    let mut where_clause = builder.separated(" AND ");
    where_clause.push("partner_id = ");
    where_clause.push_bind_unseparated(partner_id);
    push_in_clause(&mut where_clause, "tx_type", types.iter().map(|t| t.to_string()));
    if let Some(status) = exclude_status {
        where_clause.push("status <> ");
        where_clause.push_bind_unseparated(status.to_string());
    }
    if let Some(since) = since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    let total: i64 = builder.build_query_scalar().fetch_one(conn).await?;
    Ok(Cents::from(total))
}

/// The partner's full ledger, oldest first.
pub async fn fetch_partner_history(
    partner_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<CommissionTransaction>, sqlx::Error> {
    let history = sqlx::query_as("SELECT * FROM commission_transactions WHERE partner_id = $1 ORDER BY id ASC")
        .bind(partner_id)
        .fetch_all(conn)
        .await?;
    Ok(history)
}

/// Fetches one page of the entries matching `filter`, newest first, along with the total number of matches.
pub async fn search_transactions(
    filter: &TransactionQueryFilter,
    pagination: &Pagination,
    conn: &mut SqliteConnection,
) -> Result<(Vec<CommissionTransaction>, i64), sqlx::Error> {
    let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM commission_transactions");
    push_filter(&mut count_query, filter);
    let total: i64 = count_query.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM commission_transactions");
    push_filter(&mut query, filter);
    query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    query.push_bind(pagination.limit());
    query.push(" OFFSET ");
    query.push_bind(pagination.offset());
    trace!("🧾 Executing query: {}", query.sql());
    let transactions = query.build_query_as::<CommissionTransaction>().fetch_all(&mut *conn).await?;
    Ok((transactions, total))
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &TransactionQueryFilter) {
    if filter.is_empty() {
        return;
    }
    builder.push(" WHERE ");
    let mut where_clause = builder.separated(" AND ");
    if let Some(partner_id) = filter.partner_id {
        where_clause.push("partner_id = ");
        where_clause.push_bind_unseparated(partner_id);
    }
    if let Some(order_id) = &filter.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.as_str().to_string());
    }
    push_in_clause(&mut where_clause, "tx_type", filter.tx_types.iter().map(|t| t.to_string()));
    push_in_clause(&mut where_clause, "status", filter.statuses.iter().map(|s| s.to_string()));
    if let Some(since) = filter.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = filter.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    if let Some(text) = &filter.search {
        let pattern = format!("%{}%", escape_like(text));
        where_clause.push("(description LIKE ");
        where_clause.push_bind_unseparated(pattern.clone());
        where_clause.push_unseparated(" ESCAPE '\\' OR admin_notes LIKE ");
        where_clause.push_bind_unseparated(pattern.clone());
        where_clause.push_unseparated(" ESCAPE '\\' OR order_id LIKE ");
        where_clause.push_bind_unseparated(pattern.clone());
        where_clause.push_unseparated(" ESCAPE '\\' OR external_reference LIKE ");
        where_clause.push_bind_unseparated(pattern);
        where_clause.push_unseparated(" ESCAPE '\\')");
    }
}

/// Escapes the `LIKE` wildcards in user-supplied search text, so that `%` and `_` match themselves.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_in_clause<'q, I>(
    where_clause: &mut sqlx::query_builder::Separated<'_, 'q, Sqlite, &'static str>,
    column: &str,
    values: I,
) where
    I: Iterator<Item = String>,
{
    let values = values.collect::<Vec<String>>();
    if values.is_empty() {
        return;
    }
    where_clause.push(format!("{column} IN ("));
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            where_clause.push_unseparated(", ");
        }
        where_clause.push_bind_unseparated(value);
    }
    where_clause.push_unseparated(")");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("WIRE-4471"), "WIRE-4471");
        assert_eq!(escape_like("10%"), "10\\%");
        assert_eq!(escape_like("promo_q3"), "promo\\_q3");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
