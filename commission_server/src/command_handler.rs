//! Dispatches admin commands to the engine APIs and renders the results.
use std::str::FromStr;

use chrono::{Duration, Utc};
use commission_engine::{
    commission_api::{
        ledger_api::parse_adjustment_type,
        transaction_objects::{Pagination, TransactionQueryFilter},
    },
    db_types::{
        AdminId,
        CommissionRate,
        NewOrder,
        NewPartner,
        OrderId,
        PartnerStatus,
        TransactionStatus,
        TransactionType,
    },
    events::{EventHandlers, EventHooks},
    traits::{AdjustmentRequest, HoldRequest, PayoutRequest, ReleaseHoldRequest, StatusCorrection},
};
use log::*;

use crate::{
    cli::{AdjustParams, Command, HistoryParams, HoldParams, OrderCommand, PartnerCommand, PayoutParams},
    errors::ServerError,
    config::ServerConfig,
    formatting::*,
    server::{drain_events, CommissionSystem, EVENT_BUFFER_SIZE},
};

/// Runs a single admin command against the configured database with `hooks` attached. Returns once the hooks have
/// handled every event the command produced.
pub async fn run_command(config: &ServerConfig, command: Command, hooks: EventHooks) -> Result<String, ServerError> {
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    let tasks = handlers.start_handlers().await;
    let result = match CommissionSystem::connect(config, producers).await {
        Ok(system) => {
            let result = handle_command(&system, command).await;
            system.shutdown().await;
            result
        },
        Err(e) => Err(e),
    };
    drain_events(tasks).await;
    result
}

/// Runs a single admin command and returns the text to print. `serve`, `migrate` and `envs` are handled by the
/// binary, since they do not operate on the ledger.
pub async fn handle_command(system: &CommissionSystem, command: Command) -> Result<String, ServerError> {
    match command {
        Command::Serve | Command::Migrate | Command::Envs => {
            Err(ServerError::InvalidInput("This command is not a ledger operation".into()))
        },
        Command::Partner(cmd) => handle_partner_command(system, cmd).await,
        Command::Order(cmd) => handle_order_command(system, cmd).await,
        Command::Payout(params) => payout(system, params).await,
        Command::CancelPayout { transaction_id, admin, notes } => {
            let change = system.payouts.cancel_payout(transaction_id, AdminId::from(admin.admin_id), notes).await?;
            Ok(format_status_change(&change)?)
        },
        Command::Adjust(params) => adjust(system, params).await,
        Command::Hold(params) => hold(system, params).await,
        Command::Release { hold_id, admin, reason } => {
            let mut request = ReleaseHoldRequest::new(hold_id, AdminId::from(admin.admin_id));
            if let Some(reason) = reason {
                request = request.with_reason(reason);
            }
            let update = system.ledger.release_hold(request).await?;
            Ok(format_ledger_update(&update)?)
        },
        Command::ReleaseExpired => {
            let result = system.ledger.release_expired_holds(Utc::now()).await?;
            Ok(format_hold_release_result(&result)?)
        },
        Command::Status { transaction_id, status, admin, notes } => {
            let status = TransactionStatus::from_str(&status).map_err(|e| ServerError::InvalidInput(e.to_string()))?;
            let mut correction = StatusCorrection::new(transaction_id, status, AdminId::from(admin.admin_id));
            if let Some(notes) = notes {
                correction = correction.with_notes(notes);
            }
            let change = system.ledger.correct_status(correction).await?;
            Ok(format_status_change(&change)?)
        },
        Command::Summary { partner_id } => {
            let summary = system.reporting.partner_summary(partner_id).await?;
            Ok(format_summary(&summary)?)
        },
        Command::History(params) => history(system, params).await,
        Command::Transaction { id } => {
            let tx = system.reporting.transaction(id).await?;
            Ok(format_transaction(&tx)?)
        },
        Command::Audit { partner_id } => {
            let audit = system.reporting.audit_partner(partner_id).await?;
            Ok(format_audit(&audit)?)
        },
    }
}

async fn handle_partner_command(system: &CommissionSystem, command: PartnerCommand) -> Result<String, ServerError> {
    let api = &system.partners;
    match command {
        PartnerCommand::Register { name, email, rate } => {
            let mut partner = NewPartner::new(name, email);
            if let Some(bps) = rate {
                let rate = CommissionRate::from_bps(bps).map_err(|e| ServerError::InvalidInput(e.to_string()))?;
                partner = partner.with_commission_rate(rate);
            }
            let partner = api.register_partner(partner).await?;
            Ok(format_partner(&partner)?)
        },
        PartnerCommand::Activate { id } => Ok(format_partner(&api.activate(id).await?)?),
        PartnerCommand::Suspend { id } => Ok(format_partner(&api.suspend(id).await?)?),
        PartnerCommand::Deactivate { id } => Ok(format_partner(&api.deactivate(id).await?)?),
        PartnerCommand::Rate { id, bps } => Ok(format_partner(&api.set_commission_rate(id, bps).await?)?),
        PartnerCommand::Show { id } => {
            let partner =
                api.fetch_partner(id).await?.ok_or_else(|| ServerError::NoRecordFound(format!("Partner #{id}")))?;
            Ok(format_partner(&partner)?)
        },
        PartnerCommand::List { status } => {
            let status = status
                .map(|s| PartnerStatus::from_str(&s))
                .transpose()
                .map_err(|e| ServerError::InvalidInput(e.to_string()))?;
            let partners = api.list_partners(status).await?;
            Ok(format_partners(&partners))
        },
        PartnerCommand::Click { code } => {
            let partner = api.record_click(&code).await?;
            Ok(format!("Click recorded for {}. {} clicks so far.", partner.referral_code, partner.referral_clicks))
        },
        PartnerCommand::Client { code, email } => {
            let client = api.register_client(&code, &email).await?;
            Ok(format_client(&client)?)
        },
    }
}

async fn handle_order_command(system: &CommissionSystem, command: OrderCommand) -> Result<String, ServerError> {
    let api = &system.orders;
    match command {
        OrderCommand::New { order_id, price, email, referral_code, currency } => {
            let mut order = NewOrder::new(OrderId::from(order_id), price);
            if let Some(email) = email {
                order = order.with_client_email(email);
            }
            if let Some(code) = referral_code {
                order = order.with_referral_code(code);
            }
            if let Some(currency) = currency {
                order.currency = currency;
            }
            let order = api.process_new_order(order).await?;
            Ok(format_order(&order)?)
        },
        OrderCommand::Paid { order_id } => match api.payment_completed(&OrderId::from(order_id.as_str())).await? {
            Some(update) => Ok(format_ledger_update(&update)?),
            None => Ok(format!("Order {order_id} is paid. No commission was earned.")),
        },
        OrderCommand::Cancelled { order_id } => {
            let order = api.payment_cancelled(&OrderId::from(order_id)).await?;
            Ok(format_order(&order)?)
        },
        OrderCommand::Failed { order_id } => {
            let order = api.payment_failed(&OrderId::from(order_id)).await?;
            Ok(format_order(&order)?)
        },
        OrderCommand::Show { order_id } => {
            let order = api
                .fetch_order(&OrderId::from(order_id.as_str()))
                .await?
                .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id}")))?;
            Ok(format_order(&order)?)
        },
    }
}

async fn payout(system: &CommissionSystem, params: PayoutParams) -> Result<String, ServerError> {
    let mut request = PayoutRequest::new(params.partner_id, params.amount, AdminId::from(params.admin.admin_id));
    if let Some(method) = params.payment_method {
        request = request.with_payment_method(method);
    }
    if let Some(reference) = params.external_reference {
        request = request.with_external_reference(reference);
    }
    if let Some(notes) = params.notes {
        request = request.with_notes(notes);
    }
    let update = system.payouts.request_payout(request).await?;
    Ok(format_ledger_update(&update)?)
}

async fn adjust(system: &CommissionSystem, params: AdjustParams) -> Result<String, ServerError> {
    let adjustment_type = parse_adjustment_type(&params.adjustment_type)?;
    let admin = AdminId::from(params.admin.admin_id);
    let mut request = AdjustmentRequest::new(params.partner_id, params.amount, adjustment_type, params.reason, admin);
    if let Some(id) = params.hold_id {
        request = request.with_hold_transaction(id);
    }
    if let Some(order_id) = params.order_id {
        request = request.with_reference_order(OrderId::from(order_id));
    }
    if let Some(days) = params.hold_days {
        request = request.with_hold_until(hold_until(days)?);
    }
    if let Some(notes) = params.notes {
        request = request.with_notes(notes);
    }
    let update = system.ledger.adjust(request).await?;
    Ok(format_ledger_update(&update)?)
}

async fn hold(system: &CommissionSystem, params: HoldParams) -> Result<String, ServerError> {
    let admin = AdminId::from(params.admin.admin_id);
    let mut request = HoldRequest::new(params.partner_id, params.amount, params.reason, admin);
    if let Some(days) = params.hold_days {
        request = request.with_hold_until(hold_until(days)?);
    }
    let update = system.ledger.place_hold(request).await?;
    Ok(format_ledger_update(&update)?)
}

async fn history(system: &CommissionSystem, params: HistoryParams) -> Result<String, ServerError> {
    let filter = history_filter(&params)?;
    debug!("📊 Searching the ledger with {filter:?}");
    let page = system.reporting.transaction_history(&filter, &Pagination::new(params.page, params.page_size)).await?;
    if params.json {
        let json = serde_json::to_string_pretty(&page).map_err(|e| ServerError::FormattingError(e.into()))?;
        Ok(json)
    } else {
        Ok(format_transaction_page(&page)?)
    }
}

fn history_filter(params: &HistoryParams) -> Result<TransactionQueryFilter, ServerError> {
    let mut filter = TransactionQueryFilter { partner_id: params.partner_id, ..Default::default() };
    if let Some(tx_type) = &params.tx_type {
        let tx_type = TransactionType::from_str(tx_type).map_err(|e| ServerError::InvalidInput(e.to_string()))?;
        filter = filter.with_type(tx_type);
    }
    if let Some(status) = &params.status {
        let status = TransactionStatus::from_str(status).map_err(|e| ServerError::InvalidInput(e.to_string()))?;
        filter = filter.with_status(status);
    }
    if let Some(order_id) = &params.order_id {
        filter = filter.with_order_id(OrderId::from(order_id.as_str()));
    }
    if let Some(days) = params.days {
        if days <= 0 {
            return Err(ServerError::InvalidInput(format!("--days must be positive, got {days}")));
        }
        filter = filter.since(Utc::now() - Duration::days(days));
    }
    if let Some(search) = &params.search {
        filter = filter.with_search(search.as_str());
    }
    Ok(filter)
}

fn hold_until(days: i64) -> Result<chrono::DateTime<Utc>, ServerError> {
    if days <= 0 {
        return Err(ServerError::InvalidInput(format!("A hold must last at least one day, got {days}")));
    }
    Ok(Utc::now() + Duration::days(days))
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    };

    use clap::Parser;
    use commission_engine::{
        events::EventProducers,
        test_utils::prepare_env::{create_database, random_db_path, run_migrations},
        SqliteDatabase,
    };

    use super::*;
    use crate::cli::Arguments;

    async fn test_system() -> CommissionSystem {
        let url = random_db_path();
        create_database(&url).await;
        run_migrations(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        CommissionSystem::new(db, &ServerConfig::default(), EventProducers::default())
    }

    async fn run(system: &CommissionSystem, args: &[&str]) -> Result<String, ServerError> {
        let args = Arguments::try_parse_from(std::iter::once("cms").chain(args.iter().copied())).unwrap();
        handle_command(system, args.command).await
    }

    #[test]
    fn history_filters() {
        let args = Arguments::try_parse_from(["cms", "history", "-p", "3", "-t", "paid_out", "-q", "WIRE"]).unwrap();
        let Command::History(params) = args.command else { panic!("Expected a history command") };
        let filter = history_filter(&params).unwrap();
        assert_eq!(filter.partner_id, Some(3));
        assert_eq!(filter.tx_types, vec![TransactionType::PaidOut]);
        assert_eq!(filter.search.as_deref(), Some("WIRE"));

        let args = Arguments::try_parse_from(["cms", "history", "-s", "nonsense"]).unwrap();
        let Command::History(params) = args.command else { panic!("Expected a history command") };
        assert!(matches!(history_filter(&params), Err(ServerError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn admin_commands() {
        let sys = test_system().await;
        let out = run(&sys, &["partner", "register", "Alice", "alice@example.com", "--rate", "1000"]).await.unwrap();
        assert!(out.contains("PENDING"), "{out}");
        run(&sys, &["partner", "activate", "1"]).await.unwrap();
        let partner = sys.partners.fetch_partner(1).await.unwrap().unwrap();
        let code = partner.referral_code.as_str().to_string();

        run(&sys, &["order", "new", "1001", "1000.00", "--code", &code]).await.unwrap();
        let out = run(&sys, &["order", "paid", "1001"]).await.unwrap();
        assert!(out.contains("100.00"), "{out}");
        let out = run(&sys, &["order", "paid", "1001"]).await.unwrap();
        assert!(out.contains("No commission was earned"), "{out}");

        let err = run(&sys, &["payout", "1", "120.00", "--admin", "bob"]).await.unwrap_err();
        assert!(matches!(err, ServerError::Payout(_)), "{err}");
        run(&sys, &["hold", "1", "40.00", "Chargeback review", "--admin", "bob"]).await.unwrap();
        run(&sys, &["payout", "1", "60.00", "--admin", "bob", "-x", "WIRE-1"]).await.unwrap();
        let summary = sys.reporting.partner_summary(1).await.unwrap();
        assert_eq!(summary.available.value(), 0);

        let err = run(&sys, &["adjust", "1", "shrink", "1.00", "Oops", "--admin", "bob"]).await.unwrap_err();
        assert_eq!(err.exit_code(), 64);
        let out = run(&sys, &["audit", "1"]).await.unwrap();
        assert!(out.contains("The ledger is consistent"), "{out}");
        let err = run(&sys, &["transaction", "999"]).await.unwrap_err();
        assert_eq!(err.exit_code(), 66);
        sys.shutdown().await;
    }

    fn command(args: &[&str]) -> Command {
        Arguments::try_parse_from(std::iter::once("cms").chain(args.iter().copied())).unwrap().command
    }

    #[tokio::test]
    async fn one_shot_commands_notify_the_hooks() {
        let config = ServerConfig { database_url: random_db_path(), ..Default::default() };
        let paid = Arc::new(AtomicI64::new(0));
        let adjusted = Arc::new(AtomicI64::new(0));
        let hooks = || {
            let mut hooks = EventHooks::default();
            let p = paid.clone();
            hooks.on_payout_completed(move |ev| {
                p.fetch_add(ev.transaction.amount.value(), Ordering::SeqCst);
                Box::pin(async {})
            });
            let a = adjusted.clone();
            hooks.on_ledger_adjusted(move |ev| {
                a.fetch_add(ev.transaction.amount.value(), Ordering::SeqCst);
                Box::pin(async {})
            });
            hooks
        };
        let register = command(&["partner", "register", "Alice", "alice@example.com", "--rate", "1000"]);
        run_command(&config, register, hooks()).await.unwrap();
        run_command(&config, command(&["partner", "activate", "1"]), hooks()).await.unwrap();
        run_command(&config, command(&["adjust", "1", "bonus", "50.00", "Launch", "--admin", "bob"]), hooks())
            .await
            .unwrap();
        run_command(&config, command(&["payout", "1", "20.00", "--admin", "bob"]), hooks()).await.unwrap();
        assert_eq!(adjusted.load(Ordering::SeqCst), 5_000);
        assert_eq!(paid.load(Ordering::SeqCst), 2_000);

        let refused = run_command(&config, command(&["payout", "1", "99.00", "--admin", "bob"]), hooks()).await;
        assert!(refused.is_err());
        assert_eq!(paid.load(Ordering::SeqCst), 2_000);
    }
}
