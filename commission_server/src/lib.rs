//! # Commission server
//!
//! The runtime shell around the commission engine. It is responsible for:
//! * Loading configuration from the environment.
//! * Running the hold-expiry worker, which releases holds whose `hold_until` date has passed.
//! * Publishing ledger events to the notification hooks once their changes have committed.
//! * Exposing the admin operations (payouts, adjustments, holds, status corrections and reports) on the command line.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
pub mod cli;
pub mod command_handler;
pub mod config;
pub mod errors;
pub mod formatting;
pub mod hold_release_worker;
pub mod notifications;
pub mod server;
