use std::{env, env::VarError};

use clap::{Args, Parser, Subcommand};
use commission_common::Cents;

#[derive(Parser, Debug)]
#[command(version, about = "Commission ledger and payout engine for referral partners")]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the hold-expiry worker and notification hooks until interrupted
    Serve,
    /// Creates the database if necessary and applies any outstanding migrations
    Migrate,
    /// Prints the configuration environment variables and their current values
    Envs,
    #[command(subcommand)]
    /// Register, manage and look up referral partners
    Partner(PartnerCommand),
    #[command(subcommand)]
    /// Record storefront orders and their payment outcome
    Order(OrderCommand),
    /// Pay out commission to a partner
    Payout(PayoutParams),
    #[command(name = "cancel-payout")]
    /// Cancel a completed payout and return the amount to the partner's balance
    CancelPayout {
        #[arg(required = true, index = 1)]
        transaction_id: i64,
        #[command(flatten)]
        admin: AdminArgs,
        #[arg(short = 'n', long = "notes")]
        notes: Option<String>,
    },
    /// Make a manual ADD, DEDUCT, BONUS, HOLD or RELEASE_HOLD adjustment
    Adjust(AdjustParams),
    /// Place a hold on part of a partner's available commission
    Hold(HoldParams),
    /// Release a hold, returning the held amount to the partner's available commission
    Release {
        #[arg(required = true, index = 1)]
        hold_id: i64,
        #[command(flatten)]
        admin: AdminArgs,
        #[arg(short = 'r', long = "reason")]
        reason: Option<String>,
    },
    #[command(name = "release-expired")]
    /// Release every hold whose hold-until date has passed
    ReleaseExpired,
    /// Correct the status of a ledger entry
    Status {
        #[arg(required = true, index = 1)]
        transaction_id: i64,
        /// PENDING, COMPLETED, FAILED, CANCELLED or ON_HOLD
        #[arg(required = true, index = 2)]
        status: String,
        #[command(flatten)]
        admin: AdminArgs,
        #[arg(short = 'n', long = "notes")]
        notes: Option<String>,
    },
    /// Show a partner's commission summary
    Summary {
        #[arg(required = true, index = 1)]
        partner_id: i64,
    },
    /// Search the ledger
    History(HistoryParams),
    /// Show a single ledger entry
    Transaction {
        #[arg(required = true, index = 1)]
        id: i64,
    },
    /// Recompute a partner's balance from its ledger and compare it with the stored balance
    Audit {
        #[arg(required = true, index = 1)]
        partner_id: i64,
    },
}

#[derive(Debug, Args)]
pub struct AdminArgs {
    /// The id of the administrator making the request. Recorded against the ledger entry.
    #[arg(short = 'a', long = "admin", required = true)]
    pub admin_id: String,
}

#[derive(Debug, Subcommand)]
pub enum PartnerCommand {
    /// Register a new partner. Partners start out PENDING and must be activated before they earn commission.
    Register {
        #[arg(required = true, index = 1)]
        name: String,
        #[arg(required = true, index = 2)]
        email: String,
        /// Commission rate in basis points. 1000 is 10%.
        #[arg(short = 'r', long = "rate")]
        rate: Option<i64>,
    },
    Activate {
        #[arg(required = true, index = 1)]
        id: i64,
    },
    Suspend {
        #[arg(required = true, index = 1)]
        id: i64,
    },
    Deactivate {
        #[arg(required = true, index = 1)]
        id: i64,
    },
    /// Change a partner's commission rate. Only affects commission earned from now on.
    Rate {
        #[arg(required = true, index = 1)]
        id: i64,
        /// Basis points, from 0 to 10000
        #[arg(required = true, index = 2)]
        bps: i64,
    },
    Show {
        #[arg(required = true, index = 1)]
        id: i64,
    },
    List {
        /// Only list partners with this status
        #[arg(short = 's', long = "status")]
        status: Option<String>,
    },
    /// Record a click on a referral link
    Click {
        #[arg(required = true, index = 1)]
        code: String,
    },
    /// Register a client referred by the partner with the given code
    Client {
        #[arg(required = true, index = 1)]
        code: String,
        #[arg(required = true, index = 2)]
        email: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum OrderCommand {
    /// Record a new storefront order
    New {
        #[arg(required = true, index = 1)]
        order_id: String,
        /// The order price in major units, e.g. 40.00
        #[arg(required = true, index = 2)]
        price: Cents,
        #[arg(short = 'e', long = "email")]
        email: Option<String>,
        /// The referral code carried by the order
        #[arg(short = 'c', long = "code")]
        referral_code: Option<String>,
        #[arg(long = "currency")]
        currency: Option<String>,
    },
    /// The order's payment completed. Earns commission for the attributed partner.
    Paid {
        #[arg(required = true, index = 1)]
        order_id: String,
    },
    Cancelled {
        #[arg(required = true, index = 1)]
        order_id: String,
    },
    Failed {
        #[arg(required = true, index = 1)]
        order_id: String,
    },
    Show {
        #[arg(required = true, index = 1)]
        order_id: String,
    },
}

#[derive(Debug, Args)]
pub struct PayoutParams {
    #[arg(required = true, index = 1)]
    pub partner_id: i64,
    /// The amount in major units, e.g. 40.00
    #[arg(required = true, index = 2)]
    pub amount: Cents,
    #[command(flatten)]
    pub admin: AdminArgs,
    #[arg(short = 'm', long = "method")]
    pub payment_method: Option<String>,
    /// The bank or payment provider reference for the transfer
    #[arg(short = 'x', long = "reference")]
    pub external_reference: Option<String>,
    #[arg(short = 'n', long = "notes")]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct AdjustParams {
    #[arg(required = true, index = 1)]
    pub partner_id: i64,
    /// ADD, DEDUCT, BONUS, HOLD or RELEASE_HOLD
    #[arg(required = true, index = 2)]
    pub adjustment_type: String,
    /// The amount in major units, e.g. 40.00
    #[arg(required = true, index = 3)]
    pub amount: Cents,
    #[arg(required = true, index = 4)]
    pub reason: String,
    #[command(flatten)]
    pub admin: AdminArgs,
    /// The hold to release. Required for RELEASE_HOLD.
    #[arg(long = "hold-id")]
    pub hold_id: Option<i64>,
    /// The order this adjustment relates to
    #[arg(short = 'o', long = "order")]
    pub order_id: Option<String>,
    /// For HOLD adjustments, release the hold automatically after this many days
    #[arg(long = "hold-days")]
    pub hold_days: Option<i64>,
    #[arg(short = 'n', long = "notes")]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct HoldParams {
    #[arg(required = true, index = 1)]
    pub partner_id: i64,
    /// The amount in major units, e.g. 40.00
    #[arg(required = true, index = 2)]
    pub amount: Cents,
    #[arg(required = true, index = 3)]
    pub reason: String,
    #[command(flatten)]
    pub admin: AdminArgs,
    /// Release the hold automatically after this many days
    #[arg(short = 'd', long = "days")]
    pub hold_days: Option<i64>,
}

#[derive(Debug, Args)]
pub struct HistoryParams {
    #[arg(short = 'p', long = "partner")]
    pub partner_id: Option<i64>,
    /// EARNED, PAID_OUT, ADJUSTED, BONUS, HOLD or HOLD_RELEASED
    #[arg(short = 't', long = "type")]
    pub tx_type: Option<String>,
    #[arg(short = 's', long = "status")]
    pub status: Option<String>,
    #[arg(short = 'o', long = "order")]
    pub order_id: Option<String>,
    /// Only entries created in the last N days
    #[arg(short = 'd', long = "days")]
    pub days: Option<i64>,
    /// Free-text search over descriptions, notes, order ids and external references
    #[arg(short = 'q', long = "search")]
    pub search: Option<String>,
    #[arg(long = "page", default_value = "1")]
    pub page: u32,
    #[arg(long = "page-size", default_value = "20")]
    pub page_size: u32,
    /// Print the results as JSON instead of a table
    #[arg(long = "json")]
    pub json: bool,
}

pub fn display_envs() {
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "CMS_DATABASE_URL",
        "CMS_MAX_CONNECTIONS",
        "CMS_DEFAULT_COMMISSION_RATE",
        "CMS_ATTRIBUTION_WINDOW_DAYS",
        "CMS_TRANSACTION_TIMEOUT_MS",
        "CMS_MAX_RETRIES",
        "CMS_HOLD_RELEASE_INTERVAL_SECS",
        "CMS_DISABLE_HOLD_RELEASE_WORKER",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}

#[cfg(test)]
mod test {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn verify_cli() {
        Arguments::command().debug_assert();
    }

    #[test]
    fn parse_payout() {
        let args = Arguments::try_parse_from(["cms", "payout", "7", "40.5", "--admin", "alice", "-x", "WIRE-1"]);
        match args.map(|a| a.command) {
            Ok(Command::Payout(p)) => {
                assert_eq!(p.partner_id, 7);
                assert_eq!(p.amount, Cents::from(4050));
                assert_eq!(p.admin.admin_id, "alice");
                assert_eq!(p.external_reference.as_deref(), Some("WIRE-1"));
            },
            other => panic!("Unexpected parse result: {other:?}"),
        }
    }

    #[test]
    fn amounts_must_be_decimal() {
        assert!(Arguments::try_parse_from(["cms", "payout", "7", "40.555", "--admin", "alice"]).is_err());
        assert!(Arguments::try_parse_from(["cms", "payout", "7", "40.00"]).is_err());
    }
}
