use std::{collections::HashMap, fmt::Debug};

use commission_engine::{
    db_types::Partner,
    events::EventProducers,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    LedgerApi,
    OrderFlowApi,
    PartnerApi,
    PayoutApi,
    ReportingApi,
    SqliteDatabase,
};
use cucumber::World;
use log::*;

#[derive(Default, Debug, World)]
pub struct CommissionWorld {
    pub system: Option<CommissionSystem>,
    pub partners: HashMap<String, Partner>,
    /// The outcome of the most recent admin request, as `Err(message)` if it was refused.
    pub last_result: Option<Result<i64, String>>,
    pub last_hold: Option<i64>,
    pub last_payout: Option<i64>,
}

pub struct CommissionSystem {
    pub db_path: String,
    pub ledger: LedgerApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub partners: PartnerApi<SqliteDatabase>,
    pub payouts: PayoutApi<SqliteDatabase>,
    pub reporting: ReportingApi<SqliteDatabase>,
}

impl Debug for CommissionSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CommissionSystem({})", self.db_path)
    }
}

impl CommissionWorld {
    pub fn system(&self) -> &CommissionSystem {
        self.system.as_ref().expect("Commission system not initialised")
    }

    pub fn partner(&self, name: &str) -> &Partner {
        self.partners.get(name).unwrap_or_else(|| panic!("Partner {name} has not been set up"))
    }

    pub fn partner_id(&self, name: &str) -> i64 {
        self.partner(name).id
    }
}

impl CommissionSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        let ledger = LedgerApi::new(db.clone(), EventProducers::default());
        Self {
            db_path: url,
            orders: OrderFlowApi::with_ledger(ledger.clone()),
            partners: PartnerApi::new(db.clone()),
            payouts: PayoutApi::new(ledger.clone()),
            reporting: ReportingApi::new(db),
            ledger,
        }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
