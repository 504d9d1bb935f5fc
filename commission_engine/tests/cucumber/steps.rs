use commission_engine::{
    db_types::{AdjustmentType, AdminId, NewOrder, OrderId, TransactionStatus},
    traits::{AdjustmentRequest, HoldRequest, LedgerUpdate, PayoutRequest, ReleaseHoldRequest, StatusCorrection},
    Cents,
};
use cucumber::{then, when};

use crate::cucumber::CommissionWorld;

const ADMIN: &str = "admin-cucumber";

fn admin() -> AdminId {
    AdminId::from(ADMIN)
}

fn record<E: std::fmt::Display>(world: &mut CommissionWorld, result: Result<LedgerUpdate, E>) -> Option<i64> {
    match result {
        Ok(update) => {
            let id = update.transaction.id;
            world.last_result = Some(Ok(id));
            Some(id)
        },
        Err(e) => {
            world.last_result = Some(Err(e.to_string()));
            None
        },
    }
}

#[when(expr = "order {word} for {int} cents referred by '{word}' is paid")]
async fn referred_order_paid(world: &mut CommissionWorld, order_id: String, price: i64, name: String) {
    let code = world.partner(&name).referral_code.as_str().to_string();
    let order = NewOrder::new(OrderId::from(order_id.as_str()), Cents::from(price)).with_referral_code(code);
    let sys = world.system();
    sys.orders.process_new_order(order).await.expect("Error processing order");
    let update = sys.orders.payment_completed(&OrderId::from(order_id)).await.expect("Error completing payment");
    world.last_result = update.map(|u| Ok(u.transaction.id));
}

#[when(expr = "payment for order {word} is confirmed again")]
async fn payment_confirmed_again(world: &mut CommissionWorld, order_id: String) {
    let update = world.system().orders.payment_completed(&OrderId::from(order_id)).await;
    let update = update.expect("Error completing payment");
    world.last_result = update.map(|u| Ok(u.transaction.id));
}

#[when(expr = "the admin pays out {int} cents to '{word}'")]
async fn pay_out(world: &mut CommissionWorld, amount: i64, name: String) {
    let request = PayoutRequest::new(world.partner_id(&name), Cents::from(amount), admin());
    let result = world.system().payouts.request_payout(request).await;
    if let Some(id) = record(world, result) {
        world.last_payout = Some(id);
    }
}

#[when(expr = "the admin places a hold of {int} cents on '{word}' for {string}")]
async fn place_hold(world: &mut CommissionWorld, amount: i64, name: String, reason: String) {
    let request = HoldRequest::new(world.partner_id(&name), Cents::from(amount), reason, admin());
    let result = world.system().ledger.place_hold(request).await;
    if let Some(id) = record(world, result) {
        world.last_hold = Some(id);
    }
}

#[when("the admin releases the hold")]
async fn release_hold(world: &mut CommissionWorld) {
    let hold_id = world.last_hold.expect("No hold has been placed");
    let result = world.system().ledger.release_hold(ReleaseHoldRequest::new(hold_id, admin())).await;
    record(world, result);
}

#[when(expr = "the admin makes a {word} adjustment of {int} cents to '{word}' for {string}")]
async fn adjust(world: &mut CommissionWorld, kind: String, amount: i64, name: String, reason: String) {
    let kind = kind.parse::<AdjustmentType>().expect("Unknown adjustment type");
    let request = AdjustmentRequest::new(world.partner_id(&name), Cents::from(amount), kind, reason, admin());
    let result = world.system().ledger.adjust(request).await;
    record(world, result);
}

#[when("the admin cancels the last payout")]
async fn cancel_last_payout(world: &mut CommissionWorld) {
    let payout_id = world.last_payout.expect("No payout has been made");
    let correction = StatusCorrection::new(payout_id, TransactionStatus::Cancelled, admin());
    let result = world.system().ledger.correct_status(correction).await;
    world.last_result = Some(result.map(|c| c.transaction.id).map_err(|e| e.to_string()));
}

#[when(expr = "{int} payouts of {int} cents to '{word}' are requested at the same time")]
async fn concurrent_payouts(world: &mut CommissionWorld, count: usize, amount: i64, name: String) {
    let partner_id = world.partner_id(&name);
    let mut tasks = Vec::with_capacity(count);
    for _ in 0..count {
        let payouts = world.system().payouts.clone();
        let request = PayoutRequest::new(partner_id, Cents::from(amount), admin());
        tasks.push(tokio::spawn(async move { payouts.request_payout(request).await }));
    }
    let mut succeeded = 0;
    for task in tasks {
        if task.await.expect("Payout task panicked").is_ok() {
            succeeded += 1;
        }
    }
    world.last_result = Some(Ok(succeeded));
}

#[then(expr = "'{word}' has earned {int}, paid {int} and holds {int} cents")]
async fn check_totals(world: &mut CommissionWorld, name: String, earned: i64, paid: i64, on_hold: i64) {
    let balance = world.system().ledger.balance(world.partner_id(&name)).await.expect("Error fetching balance");
    assert_eq!(balance.earned(), Cents::from(earned), "Earned commission is incorrect");
    assert_eq!(balance.paid(), Cents::from(paid), "Paid commission is incorrect");
    assert_eq!(balance.on_hold(), Cents::from(on_hold), "Commission on hold is incorrect");
}

#[then(expr = "'{word}' has {int} cents available and {int} cents withdrawable")]
async fn check_available(world: &mut CommissionWorld, name: String, available: i64, withdrawable: i64) {
    let balance = world.system().ledger.balance(world.partner_id(&name)).await.expect("Error fetching balance");
    assert_eq!(balance.available(), Cents::from(available), "Available commission is incorrect");
    assert_eq!(balance.withdrawable(), Cents::from(withdrawable), "Withdrawable commission is incorrect");
}

#[then(expr = "'{word}' has {int} ledger entries")]
async fn check_entry_count(world: &mut CommissionWorld, name: String, count: usize) {
    let audit = world.system().reporting.audit_partner(world.partner_id(&name)).await.expect("Error auditing ledger");
    assert_eq!(audit.entries_checked, count, "Unexpected number of ledger entries");
}

#[then(expr = "the ledger for '{word}' is consistent")]
async fn check_consistent(world: &mut CommissionWorld, name: String) {
    let audit = world.system().reporting.audit_partner(world.partner_id(&name)).await.expect("Error auditing ledger");
    assert!(audit.is_consistent(), "Ledger audit failed: {audit:?}");
}

#[then("the request succeeds")]
async fn request_succeeds(world: &mut CommissionWorld) {
    match &world.last_result {
        Some(Ok(_)) => {},
        Some(Err(e)) => panic!("Request was refused: {e}"),
        None => panic!("No ledger entry was created"),
    }
}

#[then("no commission is recorded")]
async fn no_commission(world: &mut CommissionWorld) {
    assert!(world.last_result.is_none(), "Unexpected ledger entry: {:?}", world.last_result);
}

#[then(expr = "the request is refused with {string}")]
async fn request_refused(world: &mut CommissionWorld, message: String) {
    match &world.last_result {
        Some(Err(e)) => assert!(e.contains(&message), "Expected \"{message}\" in \"{e}\""),
        other => panic!("Expected the request to be refused, got {other:?}"),
    }
}

#[then(expr = "{int} of the payouts succeeded")]
async fn check_concurrent_successes(world: &mut CommissionWorld, count: i64) {
    assert_eq!(world.last_result, Some(Ok(count)), "Unexpected number of successful payouts");
}
