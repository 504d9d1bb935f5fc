use std::path::Path;

use commission_engine::{
    events::{EventHandlers, EventProducers},
    traits::CommissionLedgerDatabase,
    LedgerApi,
    OrderFlowApi,
    PartnerApi,
    PayoutApi,
    ReportingApi,
    SqliteDatabase,
};
use log::*;
use tokio::task::JoinHandle;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    hold_release_worker::start_hold_release_worker,
    notifications::notification_hooks,
};

pub(crate) const EVENT_BUFFER_SIZE: usize = 64;

/// Every engine API, wired to one database and sharing a single ledger engine, so that all balance changes made by
/// this process are serialised by the same partner locks.
#[derive(Clone)]
pub struct CommissionSystem {
    pub ledger: LedgerApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
    pub partners: PartnerApi<SqliteDatabase>,
    pub payouts: PayoutApi<SqliteDatabase>,
    pub reporting: ReportingApi<SqliteDatabase>,
}

impl CommissionSystem {
    pub async fn connect(config: &ServerConfig, producers: EventProducers) -> Result<Self, ServerError> {
        let db = open_database(config).await?;
        Ok(Self::new(db, config, producers))
    }

    pub fn new(db: SqliteDatabase, config: &ServerConfig, producers: EventProducers) -> Self {
        let db = db.with_write_timeout(config.ledger.transaction_timeout);
        let ledger = LedgerApi::new(db.clone(), producers).with_config(config.ledger);
        Self {
            orders: OrderFlowApi::with_ledger(ledger.clone()).with_attribution_config(config.attribution),
            partners: PartnerApi::new(db.clone()).with_config(config.partners),
            payouts: PayoutApi::new(ledger.clone()),
            reporting: ReportingApi::new(db),
            ledger,
        }
    }

    pub async fn shutdown(self) {
        let mut db = self.ledger.db().clone();
        if let Err(e) = db.close().await {
            error!("🚀️ Error closing the database: {e}");
        }
    }
}

/// Connects to the configured database, creating it and bringing the schema up to date if necessary.
pub async fn open_database(config: &ServerConfig) -> Result<SqliteDatabase, ServerError> {
    let url = config.database_url.as_str();
    if let Some(dir) = url.strip_prefix("sqlite://").map(Path::new).and_then(Path::parent) {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let db = SqliteDatabase::new_with_url(url, config.max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(format!("Could not connect to {url}. {e}")))?;
    db.run_migrations().await.map_err(|e| ServerError::InitializeError(format!("Migrations failed. {e}")))?;
    Ok(db)
}

/// Runs the hold-expiry worker and the notification hooks until the process receives Ctrl-C.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, notification_hooks());
    let producers = handlers.producers();
    let hooks = handlers.start_handlers().await;
    let system = CommissionSystem::connect(&config, producers).await?;
    info!("🚀️ Connected to {}", config.database_url);
    let worker = if config.disable_hold_release_worker {
        None
    } else {
        Some(start_hold_release_worker(system.ledger.clone(), config.hold_release_interval))
    };
    tokio::signal::ctrl_c().await?;
    info!("🚀️ Shutting down");
    if let Some(worker) = worker {
        worker.abort();
        // The worker holds event producers until its task has actually been dropped.
        let _ = worker.await;
    }
    system.shutdown().await;
    drain_events(hooks).await;
    Ok(())
}

/// Waits for the hook tasks to finish. They only finish once every producer is gone, so drop the
/// [`CommissionSystem`] first.
pub async fn drain_events(hooks: Vec<JoinHandle<()>>) {
    for hook in hooks {
        if let Err(e) = hook.await {
            warn!("📬 An event handler task failed: {e}");
        }
    }
    debug!("📬 All events have been handled");
}
