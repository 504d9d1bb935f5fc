use chrono::{Duration, Utc};
use commission_engine::{
    commission_api::transaction_objects::{Pagination, TransactionQueryFilter},
    db_types::{AdjustmentType, AdminId, OrderId, TransactionStatus, TransactionType},
    traits::{AdjustmentRequest, HoldRequest, PayoutRequest, ReportingError},
    Cents,
};

use crate::support::{TestSystem, ADMIN};

mod support;

fn admin() -> AdminId {
    AdminId::from(ADMIN)
}

#[tokio::test]
async fn partner_summary() {
    let sys = TestSystem::new().await;
    let partner = sys.active_partner("Alice", 1000).await;
    for _ in 0..4 {
        sys.partners.record_click(partner.referral_code.as_str()).await.unwrap();
    }
    sys.partners.register_client(partner.referral_code.as_str(), "bob@example.com").await.unwrap();
    sys.paid_referral_order("1001", Cents::from_major(1000), &partner).await.unwrap();
    let bonus = AdjustmentRequest::new(partner.id, Cents::from(500), AdjustmentType::Bonus, "Launch bonus", admin());
    sys.ledger.adjust(bonus).await.unwrap();
    sys.ledger.place_hold(HoldRequest::new(partner.id, Cents::from(1_500), "Review", admin())).await.unwrap();
    let payout = sys.ledger.pay_out(PayoutRequest::new(partner.id, Cents::from(3_000), admin())).await.unwrap();
    sys.ledger.pay_out(PayoutRequest::new(partner.id, Cents::from(1_000), admin())).await.unwrap();
    sys.payouts.cancel_payout(payout.transaction.id, admin(), None).await.unwrap();

    let summary = sys.reporting.partner_summary(partner.id).await.unwrap();
    assert_eq!(summary.referral_code, partner.referral_code);
    assert_eq!(summary.earned, Cents::from(10_500));
    assert_eq!(summary.paid, Cents::from(1_000));
    assert_eq!(summary.on_hold, Cents::from(1_500));
    assert_eq!(summary.available, Cents::from(8_000));
    assert_eq!(summary.withdrawable, Cents::from(8_000));
    assert_eq!(summary.recent_earnings, Cents::from(10_500));
    assert_eq!(summary.lifetime_paid_out, Cents::from(1_000));
    assert_eq!(summary.referral_clicks, 4);
    assert_eq!(summary.referred_clients, 1);
    assert_eq!(summary.conversion_rate, 0.25);

    let missing = sys.reporting.partner_summary(9999).await.unwrap_err();
    assert!(matches!(missing, ReportingError::PartnerNotFound(9999)));
    sys.tear_down().await;
}

#[tokio::test]
async fn summary_without_clicks() {
    let sys = TestSystem::new().await;
    let partner = sys.active_partner("Alice", 1000).await;
    let summary = sys.reporting.partner_summary(partner.id).await.unwrap();
    assert_eq!(summary.conversion_rate, 0.0);
    assert_eq!(summary.available, Cents::zero());
    sys.tear_down().await;
}

#[tokio::test]
async fn paginated_history_is_newest_first() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    for i in 1..=5 {
        let request = PayoutRequest::new(partner.id, Cents::from(100 * i), admin())
            .with_external_reference(format!("BANK-{i:03}"));
        sys.ledger.pay_out(request).await.unwrap();
    }
    let filter = TransactionQueryFilter::for_partner(partner.id);
    let first = sys.reporting.transaction_history(&filter, &Pagination::new(1, 4)).await.unwrap();
    assert_eq!(first.total_count, 6);
    assert_eq!(first.total_pages(), 2);
    assert!(first.has_more());
    assert_eq!(first.transactions.len(), 4);
    assert_eq!(first.transactions[0].external_reference.as_deref(), Some("BANK-005"));
    assert!(first.transactions.windows(2).all(|w| w[0].id > w[1].id));
    let second = sys.reporting.transaction_history(&filter, &Pagination::new(2, 4)).await.unwrap();
    assert_eq!(second.transactions.len(), 2);
    assert!(!second.has_more());
    assert_eq!(second.transactions[1].tx_type, TransactionType::Earned);
    sys.tear_down().await;
}

#[tokio::test]
async fn filters_and_search() {
    let sys = TestSystem::new().await;
    let alice = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let bob = sys.partner_with_balance("Bob", Cents::from(5_000)).await;
    let request = PayoutRequest::new(alice.id, Cents::from(2_000), admin()).with_external_reference("WIRE-4471");
    let payout = sys.ledger.pay_out(request).await.unwrap();
    let hold = HoldRequest::new(bob.id, Cents::from(1_000), "Suspected duplicate order", admin());
    sys.ledger.place_hold(hold).await.unwrap();

    let all = TransactionQueryFilter::default();
    let page = sys.reporting.transaction_history(&all, &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 4);

    let payouts = TransactionQueryFilter::default().with_type(TransactionType::PaidOut);
    let page = sys.reporting.transaction_history(&payouts, &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.transactions[0].id, payout.transaction.id);

    let on_hold = TransactionQueryFilter::default().with_status(TransactionStatus::OnHold);
    let page = sys.reporting.transaction_history(&on_hold, &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.transactions[0].partner_id, bob.id);

    let by_reference = TransactionQueryFilter::default().with_search("4471");
    let page = sys.reporting.transaction_history(&by_reference, &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 1);
    let by_description = TransactionQueryFilter::default().with_search("duplicate");
    let page = sys.reporting.transaction_history(&by_description, &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 1);
    let by_order = TransactionQueryFilter::default().with_order_id(OrderId::from("Bob-seed"));
    let page = sys.reporting.transaction_history(&by_order, &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.transactions[0].partner_id, bob.id);

    let future = TransactionQueryFilter::default().since(Utc::now() + Duration::days(1));
    let page = sys.reporting.transaction_history(&future, &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 0);
    assert!(page.transactions.is_empty());

    let backwards = TransactionQueryFilter::default().since(Utc::now()).until(Utc::now() - Duration::days(1));
    let err = sys.reporting.transaction_history(&backwards, &Pagination::default()).await.unwrap_err();
    assert!(matches!(err, ReportingError::InvalidQuery(_)));
    sys.tear_down().await;
}

#[tokio::test]
async fn search_text_is_matched_literally() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let bonus = AdjustmentRequest::new(partner.id, Cents::from(500), AdjustmentType::Bonus, "Promo_Q3 launch", admin());
    sys.ledger.adjust(bonus).await.unwrap();
    let request = PayoutRequest::new(partner.id, Cents::from(1_000), admin()).with_external_reference("WIRE-100");
    sys.ledger.pay_out(request).await.unwrap();

    let search = |text: &str| TransactionQueryFilter::default().with_search(text);
    // Only the commission entry mentions the rate, e.g. "10.00%"
    let page = sys.reporting.transaction_history(&search("%"), &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.transactions[0].tx_type, TransactionType::Earned);
    let page = sys.reporting.transaction_history(&search("_"), &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.transactions[0].tx_type, TransactionType::Bonus);
    let page = sys.reporting.transaction_history(&search("%_"), &Pagination::default()).await.unwrap();
    assert_eq!(page.total_count, 0);
    sys.tear_down().await;
}

#[tokio::test]
async fn single_transaction_lookup() {
    let sys = TestSystem::new().await;
    let partner = sys.partner_with_balance("Alice", Cents::from(10_000)).await;
    let payout = sys.ledger.pay_out(PayoutRequest::new(partner.id, Cents::from(1_000), admin())).await.unwrap();
    let entry = sys.reporting.transaction(payout.transaction.id).await.unwrap();
    assert_eq!(entry.amount, Cents::from(1_000));
    assert_eq!(entry.tx_type, TransactionType::PaidOut);
    let missing = sys.reporting.transaction(9999).await.unwrap_err();
    assert!(matches!(missing, ReportingError::TransactionNotFound(9999)));
    sys.tear_down().await;
}
