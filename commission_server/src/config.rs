//! Server configuration.
//!
//! Every setting is read from a `CMS_*` environment variable. Missing or unparseable values fall back to the defaults
//! below, and the fallback is logged.
//!
//! | Variable                          | Default                             |
//! |-----------------------------------|-------------------------------------|
//! | `CMS_DATABASE_URL`                | `sqlite://data/commission_store.db` |
//! | `CMS_MAX_CONNECTIONS`             | 25                                  |
//! | `CMS_DEFAULT_COMMISSION_RATE`     | 1000 (basis points)                 |
//! | `CMS_ATTRIBUTION_WINDOW_DAYS`     | 30                                  |
//! | `CMS_TRANSACTION_TIMEOUT_MS`      | 5000                                |
//! | `CMS_MAX_RETRIES`                 | 3                                   |
//! | `CMS_HOLD_RELEASE_INTERVAL_SECS`  | 60                                  |
//! | `CMS_DISABLE_HOLD_RELEASE_WORKER` | false                               |
use std::{env, fmt::Display, str::FromStr, time::Duration};

use commission_common::parse_boolean_flag;
use commission_engine::{
    commission_api::config::{DEFAULT_ATTRIBUTION_WINDOW_DAYS, DEFAULT_MAX_RETRIES, DEFAULT_TRANSACTION_TIMEOUT},
    db_types::CommissionRate,
    AttributionConfig,
    LedgerConfig,
    PartnerConfig,
};
use log::*;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/commission_store.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 25;
pub const DEFAULT_HOLD_RELEASE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub ledger: LedgerConfig,
    pub attribution: AttributionConfig,
    pub partners: PartnerConfig,
    /// How often the hold-expiry worker looks for holds past their `hold_until` date.
    pub hold_release_interval: Duration,
    pub disable_hold_release_worker: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            ledger: LedgerConfig::default(),
            attribution: AttributionConfig::default(),
            partners: PartnerConfig::default(),
            hold_release_interval: DEFAULT_HOLD_RELEASE_INTERVAL,
            disable_hold_release_worker: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("CMS_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ CMS_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = parse_env("CMS_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let default_bps = parse_env("CMS_DEFAULT_COMMISSION_RATE", CommissionRate::default().bps());
        let default_commission_rate = CommissionRate::from_bps(default_bps).unwrap_or_else(|e| {
            let default = CommissionRate::default();
            error!("🪛️ CMS_DEFAULT_COMMISSION_RATE is out of range. {e} Using the default, {default}.");
            default
        });
        let window_days = parse_env("CMS_ATTRIBUTION_WINDOW_DAYS", DEFAULT_ATTRIBUTION_WINDOW_DAYS);
        let attribution = if window_days > 0 {
            AttributionConfig::with_window_days(window_days)
        } else {
            error!("🪛️ CMS_ATTRIBUTION_WINDOW_DAYS must be positive. Using {DEFAULT_ATTRIBUTION_WINDOW_DAYS} days.");
            AttributionConfig::default()
        };
        let default_timeout = u64::try_from(DEFAULT_TRANSACTION_TIMEOUT.as_millis()).unwrap_or(u64::MAX);
        let timeout_ms = parse_env("CMS_TRANSACTION_TIMEOUT_MS", default_timeout);
        let ledger = LedgerConfig {
            transaction_timeout: Duration::from_millis(timeout_ms),
            max_retries: parse_env("CMS_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            ..Default::default()
        };
        let interval_secs = parse_env("CMS_HOLD_RELEASE_INTERVAL_SECS", DEFAULT_HOLD_RELEASE_INTERVAL.as_secs()).max(1);
        let disable_hold_release_worker =
            parse_boolean_flag(env::var("CMS_DISABLE_HOLD_RELEASE_WORKER").ok(), false);
        if disable_hold_release_worker {
            warn!("🪛️ The hold-expiry worker is disabled. Expired holds will only be released on request.");
        }
        Self {
            database_url,
            max_connections,
            ledger,
            attribution,
            partners: PartnerConfig { default_commission_rate, ..Default::default() },
            hold_release_interval: Duration::from_secs(interval_secs),
            disable_hold_release_worker,
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_value(name, env::var(name).ok(), default)
}

fn parse_value<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_values() {
        assert_eq!(parse_value("CMS_MAX_RETRIES", Some("7".into()), 3u32), 7);
        assert_eq!(parse_value("CMS_MAX_RETRIES", Some(" 7 ".into()), 3u32), 7);
        assert_eq!(parse_value("CMS_MAX_RETRIES", Some("seven".into()), 3u32), 3);
        assert_eq!(parse_value("CMS_MAX_RETRIES", Some("-1".into()), 3u32), 3);
        assert_eq!(parse_value("CMS_MAX_RETRIES", None, 3u32), 3);
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.ledger.max_retries, 3);
        assert_eq!(config.ledger.transaction_timeout, Duration::from_secs(5));
        assert_eq!(config.attribution.window, chrono::Duration::days(30));
        assert_eq!(config.partners.default_commission_rate.bps(), 1000);
        assert_eq!(config.hold_release_interval, Duration::from_secs(60));
        assert!(!config.disable_hold_release_worker);
    }
}
