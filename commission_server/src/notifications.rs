//! Post-commit notification hooks.
//!
//! The hooks only ever see events for changes that have already committed. They log each event and never feed back
//! into the ledger, so a hook that fails or falls behind cannot affect a balance.
use commission_engine::events::{
    CommissionEarnedEvent,
    EventHooks,
    LedgerAdjustedEvent,
    PayoutCompletedEvent,
    TransactionStatusChangedEvent,
};
use log::*;

pub fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_commission_earned(|ev| Box::pin(async move { notify_commission_earned(ev) }))
        .on_payout_completed(|ev| Box::pin(async move { notify_payout_completed(ev) }))
        .on_ledger_adjusted(|ev| Box::pin(async move { notify_ledger_adjusted(ev) }))
        .on_status_changed(|ev| Box::pin(async move { notify_status_changed(ev) }));
    hooks
}

fn notify_commission_earned(ev: CommissionEarnedEvent) {
    info!(
        "📬 Partner #{} earned {} on order {}. Available: {}",
        ev.partner_id,
        ev.transaction.amount,
        ev.order_id,
        ev.balance.available()
    );
}

fn notify_payout_completed(ev: PayoutCompletedEvent) {
    let reference = ev.transaction.external_reference.as_deref().unwrap_or("none");
    info!(
        "📬 Paid {} to partner #{} (reference: {reference}). Available: {}",
        ev.transaction.amount,
        ev.partner_id,
        ev.balance.available()
    );
}

fn notify_ledger_adjusted(ev: LedgerAdjustedEvent) {
    info!(
        "📬 {} of {} recorded for partner #{}: {}. On hold: {}. Available: {}",
        ev.transaction.tx_type,
        ev.transaction.amount,
        ev.partner_id,
        ev.transaction.description,
        ev.balance.on_hold(),
        ev.balance.available()
    );
}

fn notify_status_changed(ev: TransactionStatusChangedEvent) {
    let tx = &ev.transaction;
    if ev.payout_reversed {
        warn!(
            "📬 Payout #{} of {} to partner #{} was cancelled and returned to the partner's balance",
            tx.id, tx.amount, tx.partner_id
        );
    } else {
        info!("📬 Entry #{} moved from {} to {}", tx.id, ev.old_status, tx.status);
    }
}
