use serde::{Deserialize, Serialize};
use thiserror::Error;

use saber_catalog::TransitionError;
use saber_core::{AccountId, DomainError};
use saber_ledger::LedgerError;
use saber_pricing::ConfigError;

use crate::config::ConfigLoadError;
use crate::locks::LockTimeout;
use crate::store::StoreError;

/// Coarse error category, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    InsufficientFunds,
    UnknownAccount,
    Busy,
    ConfigurationError,
    Validation,
    Internal,
}

/// Every failure a rental operation can report.
///
/// A failed operation has no persistent effect, whatever the variant.
#[derive(Debug, Error)]
pub enum RentalError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("insufficient funds: account {account} holds {balance}, needs {required}")]
    InsufficientFunds {
        account: AccountId,
        balance: u64,
        required: u64,
    },

    #[error("unknown account {0}")]
    UnknownAccount(AccountId),

    /// Lock acquisition ran out of time. Safe to retry.
    #[error("busy: {0}")]
    Busy(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage failure or broken invariant. Never caused by caller input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RentalError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RentalError::NotFound(_) => ErrorKind::NotFound,
            RentalError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            RentalError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            RentalError::UnknownAccount(_) => ErrorKind::UnknownAccount,
            RentalError::Busy(_) => ErrorKind::Busy,
            RentalError::Configuration(_) => ErrorKind::ConfigurationError,
            RentalError::Validation(_) => ErrorKind::Validation,
            RentalError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RentalError::Busy(_))
    }

    /// The precise transition rule that was violated, if that is what failed.
    pub fn transition_error(&self) -> Option<TransitionError> {
        match self {
            RentalError::InvalidTransition(e) => Some(*e),
            _ => None,
        }
    }
}

impl From<LedgerError> for RentalError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientFunds {
                account,
                balance,
                required,
            } => RentalError::InsufficientFunds {
                account,
                balance,
                required,
            },
            LedgerError::UnknownAccount(id) => RentalError::UnknownAccount(id),
            other => RentalError::Internal(other.to_string()),
        }
    }
}

impl From<DomainError> for RentalError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                RentalError::Validation(msg)
            }
            DomainError::NotFound(what) => RentalError::NotFound(what),
            other => RentalError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for RentalError {
    fn from(value: StoreError) -> Self {
        RentalError::Internal(value.to_string())
    }
}

impl From<LockTimeout> for RentalError {
    fn from(value: LockTimeout) -> Self {
        RentalError::Busy(value.to_string())
    }
}

impl From<ConfigError> for RentalError {
    fn from(value: ConfigError) -> Self {
        RentalError::Configuration(value.to_string())
    }
}

impl From<ConfigLoadError> for RentalError {
    fn from(value: ConfigLoadError) -> Self {
        RentalError::Configuration(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_busy_is_retryable() {
        let busy = RentalError::from(LockTimeout {
            contended: vec![],
            waited: Duration::from_millis(5),
        });
        assert_eq!(busy.kind(), ErrorKind::Busy);
        assert!(busy.is_retryable());
        assert!(!RentalError::not_found("item").is_retryable());
        assert!(!RentalError::internal("boom").is_retryable());
    }

    #[test]
    fn ledger_shortfall_keeps_its_numbers() {
        let account = AccountId::new();
        let err = RentalError::from(LedgerError::InsufficientFunds {
            account,
            balance: 3,
            required: 7,
        });
        assert!(matches!(
            err,
            RentalError::InsufficientFunds {
                balance: 3,
                required: 7,
                ..
            }
        ));
        assert_eq!(
            RentalError::from(LedgerError::InvalidAmount).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn transition_errors_keep_their_subtype() {
        let err = RentalError::from(TransitionError::ReservedByOther);
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(
            err.transition_error(),
            Some(TransitionError::ReservedByOther)
        );
    }

    #[test]
    fn kinds_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ConfigurationError).unwrap(),
            "\"configuration_error\""
        );
    }
}
