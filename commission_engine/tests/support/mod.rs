#![allow(dead_code)]

use commission_engine::{
    db_types::{CommissionRate, NewOrder, NewPartner, OrderId, Partner},
    events::EventProducers,
    ledger::CommissionBalance,
    test_utils::prepare_env::new_test_database,
    traits::{CommissionLedgerDatabase, LedgerUpdate},
    Cents,
    LedgerApi,
    OrderFlowApi,
    PartnerApi,
    PayoutApi,
    ReportingApi,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const ADMIN: &str = "admin-alice";

/// Every engine API wired to one throw-away database, sharing a single ledger engine.
pub struct TestSystem {
    pub ledger: LedgerApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub partners: PartnerApi<SqliteDatabase>,
    pub payouts: PayoutApi<SqliteDatabase>,
    pub reporting: ReportingApi<SqliteDatabase>,
}

impl TestSystem {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let db = new_test_database().await;
        let ledger = LedgerApi::new(db.clone(), producers);
        Self {
            orders: OrderFlowApi::with_ledger(ledger.clone()),
            partners: PartnerApi::new(db.clone()),
            payouts: PayoutApi::new(ledger.clone()),
            reporting: ReportingApi::new(db),
            ledger,
        }
    }

    pub fn db(&self) -> &SqliteDatabase {
        self.ledger.db()
    }

    /// Registers and activates a partner with the given rate in basis points.
    pub async fn active_partner(&self, name: &str, bps: i64) -> Partner {
        let email = format!("{}@example.com", name.to_lowercase());
        let rate = CommissionRate::from_bps(bps).expect("Invalid rate");
        let partner = NewPartner::new(name.to_string(), email).with_commission_rate(rate);
        let partner = self.partners.register_partner(partner).await.expect("Error registering partner");
        self.partners.activate(partner.id).await.expect("Error activating partner")
    }

    /// Places an order carrying the partner's referral code and completes its payment.
    pub async fn paid_referral_order(&self, order_id: &str, price: Cents, partner: &Partner) -> Option<LedgerUpdate> {
        let order = NewOrder::new(OrderId::from(order_id), price).with_referral_code(partner.referral_code.as_str());
        self.orders.process_new_order(order).await.expect("Error processing order");
        self.orders.payment_completed(&OrderId::from(order_id)).await.expect("Error completing payment")
    }

    /// Gives the partner an available balance of `amount` from a single paid order at 10%.
    pub async fn partner_with_balance(&self, name: &str, amount: Cents) -> Partner {
        let partner = self.active_partner(name, 1000).await;
        let order_id = format!("{name}-seed");
        self.paid_referral_order(&order_id, amount * 10, &partner).await.expect("No commission earned");
        partner
    }

    pub async fn balance(&self, partner_id: i64) -> CommissionBalance {
        self.ledger.balance(partner_id).await.expect("Error fetching balance")
    }

    pub async fn tear_down(self) {
        let mut db = self.db().clone();
        let url = db.url().to_string();
        if let Err(e) = db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        if let Err(e) = Sqlite::drop_database(&url).await {
            warn!("🚀️ Failed to remove database {url}: {e}");
        }
    }
}
