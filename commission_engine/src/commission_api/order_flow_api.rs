use std::fmt::Debug;

use chrono::Duration;
use log::*;

use crate::{
    commission_api::{config::AttributionConfig, ledger_api::LedgerApi},
    db_types::{NewOrder, Order, OrderId, OrderStatusType, Partner, PartnerStatus},
    events::EventProducers,
    helpers::normalize_email,
    traits::{CommissionLedgerDatabase, LedgerUpdate, OrderFlowError, OrderManagement, PartnerManagement},
};

/// The outcome of resolving an order's referral linkage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionDecision {
    /// The order earns commission for this partner.
    Eligible(i64),
    NoReferral,
    PartnerNotFound(i64),
    PartnerNotActive(i64, PartnerStatus),
    LinkageExpired { partner_id: i64, age_days: i64 },
}

impl AttributionDecision {
    pub fn partner_id(&self) -> Option<i64> {
        match self {
            AttributionDecision::Eligible(id) => Some(*id),
            _ => None,
        }
    }
}

/// Decides whether `order` is commission-eligible.
///
/// An order is eligible when it carries a referral linkage to a partner that is `ACTIVE`, and the linkage was created
/// no more than `window` before the order was placed. An order without a linkage timestamp is treated as linked at
/// the time it was placed.
pub fn resolve_attribution(order: &Order, partner: Option<&Partner>, window: Duration) -> AttributionDecision {
    let Some(partner_id) = order.referred_by else {
        return AttributionDecision::NoReferral;
    };
    let partner = match partner {
        Some(p) if p.id == partner_id => p,
        _ => return AttributionDecision::PartnerNotFound(partner_id),
    };
    if !partner.is_active() {
        return AttributionDecision::PartnerNotActive(partner_id, partner.status);
    }
    let referred_at = order.referred_at.unwrap_or(order.created_at);
    let age = order.created_at - referred_at;
    if age > window {
        return AttributionDecision::LinkageExpired { partner_id, age_days: age.num_days() };
    }
    AttributionDecision::Eligible(partner_id)
}

/// `OrderFlowApi` handles the order events coming in from the storefront and payment gateway.
///
/// New orders are recorded with their referral linkage. When payment completes, attribution is resolved exactly once
/// and stamped onto the order, and the commission is credited through the ledger engine. Cancelled and failed payments
/// have no effect on the ledger.
pub struct OrderFlowApi<B> {
    db: B,
    ledger: LedgerApi<B>,
    attribution: AttributionConfig,
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), ledger: self.ledger.clone(), attribution: self.attribution }
    }
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi ({:?})", self.attribution)
    }
}

impl<B: Clone> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        let ledger = LedgerApi::new(db.clone(), producers);
        Self { db, ledger, attribution: AttributionConfig::default() }
    }

    /// Builds the order flow on top of an existing ledger engine, so that both share the same partner locks.
    pub fn with_ledger(ledger: LedgerApi<B>) -> Self {
        let db = ledger.db().clone();
        Self { db, ledger, attribution: AttributionConfig::default() }
    }

    pub fn with_attribution_config(mut self, config: AttributionConfig) -> Self {
        self.attribution = config;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn ledger(&self) -> &LedgerApi<B> {
        &self.ledger
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement + PartnerManagement + CommissionLedgerDatabase
{
    /// Records a new order. Submitting the same order id again returns the stored order unchanged.
    pub async fn process_new_order(&self, mut order: NewOrder) -> Result<Order, OrderFlowError> {
        if order.order_id.as_str().trim().is_empty() {
            return Err(OrderFlowError::InvalidOrder("The order id is empty".into()));
        }
        if order.original_price.is_negative() {
            return Err(OrderFlowError::InvalidOrder(format!(
                "Order {} has a negative price ({})",
                order.order_id, order.original_price
            )));
        }
        order.client_email = order.client_email.as_deref().map(normalize_email).filter(|e| !e.is_empty());
        let result = self.db.insert_order(order).await?;
        let inserted = result.was_inserted();
        let order = result.into_order();
        if inserted {
            match order.referred_by {
                Some(partner_id) => info!("🔗 New order {} linked to partner #{partner_id}", order.order_id),
                None => debug!("🔗 New order {} has no referral linkage", order.order_id),
            }
        } else {
            debug!("🔗 Order {} already exists. Nothing to do", order.order_id);
        }
        Ok(order)
    }

    /// Marks the order as paid, resolves its attribution and credits the partner's commission.
    ///
    /// Returns the resulting ledger update, or `None` if the order is not eligible or its commission has already been
    /// credited. This makes the call safe to repeat when the payment gateway retries its notification.
    pub async fn payment_completed(&self, order_id: &OrderId) -> Result<Option<LedgerUpdate>, OrderFlowError> {
        let order = self.db.update_order_status(order_id, OrderStatusType::Paid).await?;
        let order = if order.attribution_resolved {
            order
        } else {
            let decision = self.decide_attribution(&order).await?;
            self.db.stamp_attribution(order_id, decision.partner_id()).await?
        };
        if order.commission_processed {
            debug!("🔗 Commission for order {order_id} has already been credited");
            return Ok(None);
        }
        if order.attributed_partner_id.is_none() {
            debug!("🔗 Order {order_id} is not eligible for commission");
            return Ok(None);
        }
        let update = self.ledger.earn_commission(&order).await?;
        Ok(update)
    }

    pub async fn payment_cancelled(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.update_order_status(order_id, OrderStatusType::Cancelled).await?;
        info!("🔗 Payment for order {order_id} was cancelled");
        Ok(order)
    }

    pub async fn payment_failed(&self, order_id: &OrderId) -> Result<Order, OrderFlowError> {
        let order = self.db.update_order_status(order_id, OrderStatusType::Failed).await?;
        info!("🔗 Payment for order {order_id} failed");
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        self.db.fetch_order(order_id).await
    }

    async fn decide_attribution(&self, order: &Order) -> Result<AttributionDecision, OrderFlowError> {
        let partner = match order.referred_by {
            Some(id) => self.db.fetch_partner(id).await.map_err(|e| OrderFlowError::DatabaseError(e.to_string()))?,
            None => None,
        };
        let decision = resolve_attribution(order, partner.as_ref(), self.attribution.window);
        match decision {
            AttributionDecision::Eligible(id) => info!("🔗 Order {} is attributed to partner #{id}", order.order_id),
            AttributionDecision::NoReferral => trace!("🔗 Order {} has no referral", order.order_id),
            AttributionDecision::PartnerNotFound(id) => {
                warn!("🔗 Order {} refers to partner #{id}, who does not exist", order.order_id)
            },
            AttributionDecision::PartnerNotActive(id, status) => {
                info!("🔗 Order {} refers to partner #{id}, who is {status}. No commission is due", order.order_id)
            },
            AttributionDecision::LinkageExpired { partner_id, age_days } => info!(
                "🔗 Referral linkage of order {} to partner #{partner_id} is {age_days} days old and has expired",
                order.order_id
            ),
        }
        Ok(decision)
    }
}
