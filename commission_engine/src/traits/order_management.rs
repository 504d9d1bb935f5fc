use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    traits::LedgerError,
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Order {0} does not exist.")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} cannot move from {from} to {to}.")]
    InvalidOrderTransition { order_id: OrderId, from: OrderStatusType, to: OrderStatusType },
    #[error("Invalid order. {0}")]
    InvalidOrder(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

impl From<sqlx::Error> for OrderFlowError {
    fn from(e: sqlx::Error) -> Self {
        OrderFlowError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum InsertOrderResult {
    Inserted(Order),
    AlreadyExists(Order),
}

impl InsertOrderResult {
    pub fn order(&self) -> &Order {
        match self {
            InsertOrderResult::Inserted(o) | InsertOrderResult::AlreadyExists(o) => o,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            InsertOrderResult::Inserted(o) | InsertOrderResult::AlreadyExists(o) => o,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOrderResult::Inserted(_))
    }
}

/// The minimal order records kept by the commission system.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores the order if it does not exist yet.
    ///
    /// The referral linkage is taken from the order's referral code if it carries one. Otherwise, if the order was
    /// placed by a referred client, the client's linkage is used.
    async fn insert_order(&self, order: NewOrder) -> Result<InsertOrderResult, OrderFlowError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError>;

    /// Moves the order to `status`. Setting the current status again is a no-op. A `PAID` order can not be cancelled or
    /// failed.
    async fn update_order_status(&self, order_id: &OrderId, status: OrderStatusType) -> Result<Order, OrderFlowError>;

    /// Stamps the attribution result onto the order, unless it has been stamped already. Returns the order as stored,
    /// which carries the first stamp ever written.
    async fn stamp_attribution(&self, order_id: &OrderId, partner_id: Option<i64>) -> Result<Order, OrderFlowError>;
}
