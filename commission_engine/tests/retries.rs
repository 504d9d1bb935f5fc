use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
        Mutex,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use commission_engine::{
    db_types::{AdminId, CommissionTransaction, OrderId},
    events::EventProducers,
    ledger::CommissionBalance,
    traits::{
        AdjustmentRequest,
        CommissionLedgerDatabase,
        ErrorKind,
        HoldRequest,
        LedgerError,
        LedgerUpdate,
        PayoutRequest,
        ReleaseHoldRequest,
        StatusCorrection,
        TransactionStatusChange,
    },
    Cents,
    LedgerApi,
    LedgerConfig,
    SqliteDatabase,
};

use crate::support::{TestSystem, ADMIN};

mod support;

/// Wraps the SQLite store and misbehaves on payouts: it can fail with queued errors before touching the store, stall
/// before the write, or stall after the write has committed.
#[derive(Clone)]
struct UnreliableStore {
    db: SqliteDatabase,
    failures: Arc<Mutex<Vec<LedgerError>>>,
    payout_calls: Arc<AtomicU32>,
    stall_before_write: Option<Duration>,
    stall_after_commit: Option<Duration>,
}

impl UnreliableStore {
    fn new(db: SqliteDatabase) -> Self {
        Self {
            db,
            failures: Arc::new(Mutex::new(Vec::new())),
            payout_calls: Arc::new(AtomicU32::new(0)),
            stall_before_write: None,
            stall_after_commit: None,
        }
    }

    fn failing_with(self, failures: Vec<LedgerError>) -> Self {
        *self.failures.lock().unwrap() = failures.into_iter().rev().collect();
        self
    }

    fn payout_calls(&self) -> u32 {
        self.payout_calls.load(Ordering::SeqCst)
    }
}

impl CommissionLedgerDatabase for UnreliableStore {
    fn url(&self) -> &str {
        self.db.url()
    }

    async fn earn_commission_for_order(&self, order_id: &OrderId) -> Result<Option<LedgerUpdate>, LedgerError> {
        self.db.earn_commission_for_order(order_id).await
    }

    async fn pay_out_commission(&self, request: &PayoutRequest) -> Result<LedgerUpdate, LedgerError> {
        self.payout_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().unwrap().pop();
        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(stall) = self.stall_before_write {
            tokio::time::sleep(stall).await;
        }
        let update = self.db.pay_out_commission(request).await?;
        if let Some(stall) = self.stall_after_commit {
            tokio::time::sleep(stall).await;
        }
        Ok(update)
    }

    async fn adjust_commission(&self, request: &AdjustmentRequest) -> Result<LedgerUpdate, LedgerError> {
        self.db.adjust_commission(request).await
    }

    async fn place_hold(&self, request: &HoldRequest) -> Result<LedgerUpdate, LedgerError> {
        self.db.place_hold(request).await
    }

    async fn release_hold(&self, request: &ReleaseHoldRequest) -> Result<LedgerUpdate, LedgerError> {
        self.db.release_hold(request).await
    }

    async fn update_transaction_status(
        &self,
        correction: &StatusCorrection,
    ) -> Result<TransactionStatusChange, LedgerError> {
        self.db.update_transaction_status(correction).await
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<CommissionTransaction>, LedgerError> {
        self.db.fetch_transaction(id).await
    }

    async fn fetch_partner_balance(&self, partner_id: i64) -> Result<CommissionBalance, LedgerError> {
        self.db.fetch_partner_balance(partner_id).await
    }

    async fn fetch_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<CommissionTransaction>, LedgerError> {
        self.db.fetch_expired_holds(now).await
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

fn config(timeout_ms: u64, max_retries: u32) -> LedgerConfig {
    LedgerConfig {
        transaction_timeout: Duration::from_millis(timeout_ms),
        max_retries,
        retry_backoff: Duration::from_millis(5),
    }
}

fn payout(partner_id: i64, cents: i64) -> PayoutRequest {
    PayoutRequest::new(partner_id, Cents::from(cents), AdminId::from(ADMIN))
}

#[tokio::test]
async fn a_slow_commit_acknowledgement_pays_out_once() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let mut store = UnreliableStore::new(sys.db().clone());
    store.stall_after_commit = Some(Duration::from_millis(300));
    let ledger = LedgerApi::new(store.clone(), EventProducers::default()).with_config(config(100, 3));

    let update = ledger.pay_out(payout(partner.id, 1_000)).await.expect("The payout committed");
    assert_eq!(update.transaction.amount, Cents::from(1_000));
    assert_eq!(store.payout_calls(), 1);
    let balance = sys.balance(partner.id).await;
    assert_eq!(balance.paid(), Cents::from(1_000));
    assert_eq!(balance.available(), Cents::from(9_000));
    sys.tear_down().await;
}

#[tokio::test]
async fn transient_failures_are_retried_until_they_succeed() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let failures = vec![LedgerError::Conflict(partner.id), LedgerError::StoreBusy("database is locked".into())];
    let store = UnreliableStore::new(sys.db().clone()).failing_with(failures);
    let ledger = LedgerApi::new(store.clone(), EventProducers::default()).with_config(config(1_000, 3));

    ledger.pay_out(payout(partner.id, 1_000)).await.expect("The third attempt succeeds");
    assert_eq!(store.payout_calls(), 3);
    assert_eq!(sys.balance(partner.id).await.paid(), Cents::from(1_000));
    sys.tear_down().await;
}

#[tokio::test]
async fn retries_stop_after_the_configured_limit() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let failures = (0..5).map(|_| LedgerError::Conflict(partner.id)).collect();
    let store = UnreliableStore::new(sys.db().clone()).failing_with(failures);
    let ledger = LedgerApi::new(store.clone(), EventProducers::default()).with_config(config(1_000, 2));

    let err = ledger.pay_out(payout(partner.id, 1_000)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(err.is_retryable());
    assert_eq!(store.payout_calls(), 3);
    assert_eq!(sys.balance(partner.id).await.paid(), Cents::zero());
    sys.tear_down().await;
}

#[tokio::test]
async fn business_rule_failures_are_not_retried() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let store = UnreliableStore::new(sys.db().clone());
    let ledger = LedgerApi::new(store.clone(), EventProducers::default()).with_config(config(1_000, 3));

    let err = ledger.pay_out(payout(partner.id, 12_000)).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::BusinessRule);
    assert_eq!(store.payout_calls(), 1);
    assert_eq!(sys.balance(partner.id).await.available(), Cents::from(10_000));
    sys.tear_down().await;
}

#[tokio::test]
async fn waiting_too_long_for_the_partner_lock_times_out() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let mut store = UnreliableStore::new(sys.db().clone());
    store.stall_before_write = Some(Duration::from_millis(300));
    let ledger = LedgerApi::new(store.clone(), EventProducers::default()).with_config(config(100, 0));

    let slow = ledger.clone();
    let partner_id = partner.id;
    let first = tokio::spawn(async move { slow.pay_out(payout(partner_id, 1_000)).await });
    tokio::time::sleep(Duration::from_millis(30)).await;
    let err = ledger.pay_out(payout(partner.id, 2_000)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Timeout(100)), "{err}");
    assert_eq!(err.kind(), ErrorKind::Transient);

    first.await.expect("task panicked").expect("The first payout holds the lock and succeeds");
    assert_eq!(store.payout_calls(), 1);
    assert_eq!(sys.balance(partner.id).await.paid(), Cents::from(1_000));
    sys.tear_down().await;
}

#[tokio::test]
async fn a_write_that_misses_its_deadline_is_rolled_back() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let db = sys.db().clone().with_write_timeout(Duration::from_millis(100));
    let ledger = LedgerApi::new(db, EventProducers::default()).with_config(config(1_000, 0));

    // Another connection holds the write lock, so the payout cannot reach its commit in time.
    let mut blocker = sys.db().pool().acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await.unwrap();
    let err = ledger.pay_out(payout(partner.id, 1_000)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Timeout(100)), "{err}");
    sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
    drop(blocker);

    let balance = sys.balance(partner.id).await;
    assert_eq!(balance.paid(), Cents::zero());
    assert_eq!(balance.available(), Cents::from(10_000));
    sys.tear_down().await;
}
