use commission_engine::{
    traits::{ErrorKind, LedgerError, OrderFlowError, PartnerApiError, ReportingError},
    PayoutError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Invalid input. {0}")]
    InvalidInput(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Payout(#[from] PayoutError),
    #[error("{0}")]
    Partner(#[from] PartnerApiError),
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
    #[error("{0}")]
    Reporting(#[from] ReportingError),
    #[error("Could not format the result. {0}")]
    FormattingError(#[from] anyhow::Error),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl ServerError {
    /// The process exit code for a failed command, following the `sysexits` conventions. Callers may retry a command
    /// that exits with 75 (`EX_TEMPFAIL`).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Ledger(e) => match e.kind() {
                ErrorKind::Transient => 75,
                ErrorKind::Validation => 64,
                ErrorKind::NotFound => 66,
                _ => 1,
            },
            Self::Payout(PayoutError::Retryable) => 75,
            Self::Payout(PayoutError::InvalidRequest(_)) => 64,
            Self::Payout(PayoutError::PartnerNotFound(_) | PayoutError::TransactionNotFound(_)) => 66,
            Self::Reporting(ReportingError::PartnerNotFound(_) | ReportingError::TransactionNotFound(_)) => 66,
            Self::Reporting(ReportingError::InvalidQuery(_)) => 64,
            Self::InvalidInput(_) | Self::ConfigurationError(_) => 64,
            Self::NoRecordFound(_) => 66,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use commission_engine::{
        traits::{LedgerError, ReportingError},
        Cents,
        PayoutError,
    };

    use super::ServerError;

    #[test]
    fn exit_codes() {
        assert_eq!(ServerError::from(LedgerError::Conflict(1)).exit_code(), 75);
        assert_eq!(ServerError::from(PayoutError::Retryable).exit_code(), 75);
        let insufficient = PayoutError::InsufficientFunds {
            requested: Cents::from(200),
            withdrawable: Cents::from(100),
            shortfall: Cents::from(100),
        };
        assert_eq!(ServerError::from(insufficient).exit_code(), 1);
        assert_eq!(ServerError::from(LedgerError::MissingReason).exit_code(), 64);
        assert_eq!(ServerError::InvalidInput("x".into()).exit_code(), 64);
        assert_eq!(ServerError::from(ReportingError::TransactionNotFound(4)).exit_code(), 66);
    }
}
