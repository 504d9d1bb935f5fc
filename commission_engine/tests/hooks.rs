use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use commission_engine::{
    db_types::{AdjustmentType, AdminId, TransactionStatus},
    events::{EventHandlers, EventHooks},
    traits::{AdjustmentRequest, PayoutRequest, StatusCorrection},
    Cents,
};
use log::*;

use crate::support::{TestSystem, ADMIN};

mod support;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI64>,
    total: Arc<AtomicI64>,
}

impl HookCalled {
    pub fn called(&self, amount: Cents) {
        self.called.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(amount.value(), Ordering::SeqCst);
    }

    pub fn count(&self) -> i64 {
        self.called.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> Cents {
        Cents::from(self.total.load(Ordering::SeqCst))
    }
}

/// Hooks run on their own tasks, so give them a moment to catch up.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn ledger_events_reach_their_hooks() {
    let earned = HookCalled::default();
    let paid = HookCalled::default();
    let adjusted = HookCalled::default();
    let changed = HookCalled::default();

    let mut hooks = EventHooks::default();
    let e = earned.clone();
    hooks.on_commission_earned(move |ev| {
        info!("🪝️ {ev:?}");
        e.called(ev.transaction.amount);
        Box::pin(async {})
    });
    let p = paid.clone();
    hooks.on_payout_completed(move |ev| {
        p.called(ev.transaction.amount);
        Box::pin(async {})
    });
    let a = adjusted.clone();
    hooks.on_ledger_adjusted(move |ev| {
        a.called(ev.transaction.amount);
        Box::pin(async {})
    });
    let c = changed.clone();
    hooks.on_status_changed(move |ev| {
        assert!(ev.payout_reversed);
        c.called(ev.transaction.amount);
        Box::pin(async {})
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let sys = TestSystem::with_producers(producers).await;
    let admin = AdminId::from(ADMIN);
    let partner = sys.active_partner("Alice", 1000).await;
    sys.paid_referral_order("1001", Cents::from_major(1000), &partner).await.unwrap();
    sys.orders.payment_completed(&"1001".into()).await.unwrap();
    let bonus = AdjustmentRequest::new(partner.id, Cents::from(250), AdjustmentType::Bonus, "Promo", admin.clone());
    sys.ledger.adjust(bonus).await.unwrap();
    let hold = AdjustmentRequest::new(partner.id, Cents::from(750), AdjustmentType::Hold, "Review", admin.clone());
    sys.ledger.adjust(hold).await.unwrap();
    let payout = sys.ledger.pay_out(PayoutRequest::new(partner.id, Cents::from(4_000), admin.clone())).await.unwrap();
    let rejected = sys.ledger.pay_out(PayoutRequest::new(partner.id, Cents::from(99_000), admin.clone())).await;
    assert!(rejected.is_err());
    let cancel = StatusCorrection::new(payout.transaction.id, TransactionStatus::Cancelled, admin);
    sys.ledger.correct_status(cancel).await.unwrap();
    settle().await;

    assert_eq!(earned.count(), 1);
    assert_eq!(earned.total(), Cents::from(10_000));
    assert_eq!(paid.count(), 1);
    assert_eq!(paid.total(), Cents::from(4_000));
    assert_eq!(adjusted.count(), 2);
    assert_eq!(adjusted.total(), Cents::from(1_000));
    assert_eq!(changed.count(), 1);
    sys.tear_down().await;
}
