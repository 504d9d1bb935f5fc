use std::fmt::Write;

use anyhow::Result;
use commission_engine::{
    commission_api::transaction_objects::{CommissionSummary, LedgerAudit, TransactionPage},
    db_types::{Client, CommissionTransaction, Order, Partner},
    ledger::CommissionBalance,
    traits::{HoldReleaseResult, LedgerUpdate, TransactionStatusChange},
};
use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

fn markdown_style(table: &mut Table) {
    table.set_format(markdown_format());
}

pub fn format_balance(balance: &CommissionBalance) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Earned:        {:>12}", balance.earned().to_string())?;
    writeln!(f, "Paid:          {:>12}", balance.paid().to_string())?;
    writeln!(f, "On hold:       {:>12}", balance.on_hold().to_string())?;
    writeln!(f, "Available:     {:>12}", balance.available().to_string())?;
    writeln!(f, "Withdrawable:  {:>12}", balance.withdrawable().to_string())?;
    Ok(f)
}

pub fn format_ledger_update(update: &LedgerUpdate) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "{}", format_transactions(std::slice::from_ref(&update.transaction)))?;
    write!(f, "{}", format_balance(&update.balance)?)?;
    Ok(f)
}

pub fn format_status_change(change: &TransactionStatusChange) -> Result<String> {
    let mut f = String::new();
    let tx = &change.transaction;
    writeln!(f, "Entry #{} moved from {} to {}", tx.id, change.old_status, tx.status)?;
    if change.payout_reversed {
        writeln!(f, "The payout of {} was returned to partner #{}", tx.amount, tx.partner_id)?;
    }
    write!(f, "{}", format_balance(&change.balance)?)?;
    Ok(f)
}

pub fn format_partner(partner: &Partner) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Partner #{}: {} <{}>", partner.id, partner.name, partner.email)?;
    writeln!(f, "Status:          {}", partner.status)?;
    writeln!(f, "Referral code:   {}", partner.referral_code)?;
    writeln!(f, "Commission rate: {}", partner.commission_rate)?;
    writeln!(f, "Referral clicks: {}", partner.referral_clicks)?;
    write!(f, "{}", format_balance(&partner.balance)?)?;
    Ok(f)
}

pub fn format_partners(partners: &[Partner]) -> String {
    if partners.is_empty() {
        return "No partners".to_string();
    }
    let mut table = Table::new();
    table.set_titles(row!["ID", "Name", "Email", "Code", "Status", "Rate", "Earned", "Paid", "On hold", "Available"]);
    partners.iter().for_each(|p| {
        table.add_row(row![
            p.id,
            p.name,
            p.email,
            p.referral_code,
            p.status,
            p.commission_rate,
            r -> p.balance.earned(),
            r -> p.balance.paid(),
            r -> p.balance.on_hold(),
            r -> p.balance.available()
        ]);
    });
    markdown_style(&mut table);
    format!("{table}")
}

pub fn format_client(client: &Client) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Client #{}: {}", client.id, client.email)?;
    writeln!(f, "Referred by partner #{} at {}", client.referred_by, client.referred_at)?;
    Ok(f)
}

pub fn format_order(order: &Order) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Order {} [#{}]", order.order_id, order.id)?;
    writeln!(f, "Status:      {}", order.status)?;
    writeln!(f, "Price:       {} {}", order.original_price, order.currency)?;
    writeln!(f, "Client:      {}", order.client_email.as_deref().unwrap_or("unknown"))?;
    let referred_by = order.referred_by.map(|id| format!("partner #{id}")).unwrap_or_else(|| "nobody".into());
    writeln!(f, "Referred by: {referred_by}")?;
    let attribution = match (order.attribution_resolved, order.attributed_partner_id) {
        (false, _) => "not yet resolved".to_string(),
        (true, Some(id)) => format!("partner #{id}"),
        (true, None) => "no eligible partner".to_string(),
    };
    writeln!(f, "Attributed:  {attribution}")?;
    writeln!(f, "Commission:  {}", if order.commission_processed { "recorded" } else { "not recorded" })?;
    Ok(f)
}

pub fn format_summary(summary: &CommissionSummary) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "===============================================================================")?;
    writeln!(
        f,
        "{name} (partner #{id}, {status})\nReferral code: {code}",
        name = summary.name,
        id = summary.partner_id,
        status = summary.status,
        code = summary.referral_code
    )?;
    writeln!(f, "===============================================================================")?;
    writeln!(f, "Earned:             {:>12}", summary.earned.to_string())?;
    writeln!(f, "Paid:               {:>12}", summary.paid.to_string())?;
    writeln!(f, "On hold:            {:>12}", summary.on_hold.to_string())?;
    writeln!(f, "Available:          {:>12}", summary.available.to_string())?;
    writeln!(f, "Withdrawable:       {:>12}", summary.withdrawable.to_string())?;
    writeln!(f, "Recent earnings:    {:>12}", summary.recent_earnings.to_string())?;
    writeln!(f, "Lifetime paid out:  {:>12}", summary.lifetime_paid_out.to_string())?;
    writeln!(f, "Referral clicks:    {:>12}", summary.referral_clicks)?;
    writeln!(f, "Referred clients:   {:>12}", summary.referred_clients)?;
    writeln!(f, "Conversion rate:    {:>11.1}%", summary.conversion_rate * 100.0)?;
    writeln!(f, "As of {}", summary.as_of)?;
    Ok(f)
}

pub fn format_transactions(transactions: &[CommissionTransaction]) -> String {
    if transactions.is_empty() {
        return "No ledger entries".to_string();
    }
    let mut table = Table::new();
    table.set_titles(row![
        "ID",
        "Partner",
        "Type",
        "Status",
        "Amount",
        "Before",
        "After",
        "Order",
        "Description",
        "Admin",
        "Reference",
        "Created At"
    ]);
    transactions.iter().for_each(|tx| {
        let tx_type = match &tx.adjustment_type {
            Some(adjustment) => format!("{} ({adjustment})", tx.tx_type),
            None => tx.tx_type.to_string(),
        };
        table.add_row(row![
            tx.id,
            tx.partner_id,
            tx_type,
            tx.status,
            r -> tx.amount,
            r -> tx.balance_before,
            r -> tx.balance_after,
            tx.order_id.as_ref().map(|o| o.to_string()).unwrap_or_default(),
            tx.description,
            tx.admin_id.as_ref().map(|a| a.to_string()).unwrap_or_default(),
            tx.external_reference.as_deref().unwrap_or_default(),
            tx.created_at.format("%Y-%m-%d %H:%M:%S")
        ]);
    });
    markdown_style(&mut table);
    format!("{table}")
}

pub fn format_transaction(tx: &CommissionTransaction) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "{}", format_transactions(std::slice::from_ref(tx)))?;
    if let Some(notes) = &tx.admin_notes {
        writeln!(f, "## Admin notes\n{notes}")?;
    }
    if let Some(related) = tx.related_transaction_id {
        writeln!(f, "Releases hold #{related}")?;
    }
    if let Some(until) = tx.hold_until {
        writeln!(f, "Held until {until}")?;
    }
    if let Some(method) = &tx.payment_method {
        writeln!(f, "Payment method: {method}")?;
    }
    Ok(f)
}

pub fn format_transaction_page(page: &TransactionPage) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "{}", format_transactions(&page.transactions))?;
    writeln!(f, "Page {} of {} ({} entries)", page.page, page.total_pages().max(1), page.total_count)?;
    Ok(f)
}

pub fn format_audit(audit: &LedgerAudit) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Ledger audit for partner #{} ({} entries checked)", audit.partner_id, audit.entries_checked)?;
    let mut table = Table::new();
    table.set_titles(row!["", "Stored", "Recomputed"]);
    table.add_row(row!["Earned", r -> audit.stored.earned(), r -> audit.recomputed.earned()]);
    table.add_row(row!["Paid", r -> audit.stored.paid(), r -> audit.recomputed.paid()]);
    table.add_row(row!["On hold", r -> audit.stored.on_hold(), r -> audit.recomputed.on_hold()]);
    table.add_row(row!["Available", r -> audit.stored.available(), r -> audit.recomputed.available()]);
    markdown_style(&mut table);
    writeln!(f, "{table}")?;
    if audit.is_consistent() {
        writeln!(f, "The ledger is consistent")?;
    } else {
        if audit.balance_drift() {
            writeln!(f, "The stored balance does not match the ledger history")?;
        }
        if !audit.inconsistent_entries.is_empty() {
            let ids = audit.inconsistent_entries.iter().map(|id| format!("#{id}")).collect::<Vec<_>>().join(", ");
            writeln!(f, "Entries with inconsistent balance snapshots: {ids}")?;
        }
    }
    Ok(f)
}

pub fn format_hold_release_result(result: &HoldReleaseResult) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "{} expired holds released", result.count())?;
    let released = result.released.iter().map(|u| u.transaction.clone()).collect::<Vec<_>>();
    if !released.is_empty() {
        writeln!(f, "{}", format_transactions(&released))?;
    }
    for (id, reason) in &result.failed {
        writeln!(f, "Hold #{id} could not be released. {reason}")?;
    }
    Ok(f)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn balances() {
        let s = format_balance(&CommissionBalance::default()).unwrap();
        assert!(s.contains("Earned:                0.00"));
        assert!(s.contains("Withdrawable:          0.00"));
    }

    #[test]
    fn empty_lists() {
        assert_eq!(format_transactions(&[]), "No ledger entries");
        assert_eq!(format_partners(&[]), "No partners");
    }
}
