use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::db_types::{NewOrder, Order, OrderId, OrderStatusType};

/// The referral linkage an order is created with.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linkage {
    pub partner_id: Option<i64>,
    pub referred_at: Option<DateTime<Utc>>,
}

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
pub async fn idempotent_insert(
    order: &NewOrder,
    linkage: Linkage,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), sqlx::Error> {
    let inserted = match fetch_order_by_order_id(&order.order_id, conn).await? {
        Some(order) => (order, false),
        None => {
            let order = insert_order(order, linkage, conn).await?;
            debug!("🔗 Order [{}] inserted with id {}", order.order_id, order.id);
            (order, true)
        },
    };
    Ok(inserted)
}

/// Inserts a new order using the given connection. This is not atomic. Embed the call inside a transaction if you need
/// atomicity, and pass `&mut *tx` as the connection argument.
async fn insert_order(order: &NewOrder, linkage: Linkage, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                client_email,
                original_price,
                currency,
                referred_by,
                referred_at,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(&order.order_id)
    .bind(order.client_email.as_deref())
    .bind(order.original_price)
    .bind(order.currency.as_str())
    .bind(linkage.partner_id)
    .bind(linkage.referred_at)
    .bind(OrderStatusType::Pending)
    .bind(order.created_at)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn update_order_status(
    order_id: &OrderId,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as("UPDATE orders SET status = $1, updated_at = $2 WHERE order_id = $3 RETURNING *")
        .bind(status)
        .bind(Utc::now())
        .bind(order_id.as_str())
        .fetch_one(conn)
        .await?;
    trace!("🔗 Order {order_id} status set to {status}");
    Ok(order)
}

/// Writes the attribution result, but only if no result has been written before. Returns `true` if this call wrote
/// the stamp.
pub async fn stamp_attribution(
    order_id: &OrderId,
    partner_id: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE orders SET attributed_partner_id = $1, attribution_resolved = 1, updated_at = $2
            WHERE order_id = $3 AND attribution_resolved = 0
        "#,
    )
    .bind(partner_id)
    .bind(Utc::now())
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Marks the order as having had its commission processed. Returns `false` if it was already marked.
pub(in crate::sqlite) async fn mark_commission_processed(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders SET commission_processed = 1, updated_at = $1 WHERE order_id = $2 AND commission_processed = 0",
    )
    .bind(Utc::now())
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
