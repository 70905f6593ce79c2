use thiserror::Error;

use crate::decimal::Money;
use crate::types::InstallmentStatus;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid payment mode: {mode}")]
    InvalidPaymentMode {
        mode: String,
    },

    #[error("invalid contract terms: {message}")]
    InvalidTerms {
        message: String,
    },

    #[error("installment not found: {id}")]
    NotFound {
        id: String,
    },

    #[error("installment {id} is already paid")]
    AlreadyPaid {
        id: String,
    },

    #[error("paid amount {paid} exceeds ceiling {ceiling} (expected {expected})")]
    AmountTolerance {
        expected: Money,
        paid: Money,
        ceiling: Money,
    },

    #[error("validation error: {message}")]
    Validation {
        message: String,
    },

    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: InstallmentStatus,
        to: InstallmentStatus,
    },

    #[error("contract {contract_id} has {paid_count} paid installment(s), refusing to discard them")]
    PaidHistory {
        contract_id: String,
        paid_count: usize,
    },

    #[error("conflict: {message}")]
    Conflict {
        message: String,
    },

    #[error("invalid date: {message}")]
    InvalidDate {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("storage error: {message}")]
    Storage {
        message: String,
    },
}

impl EngineError {
    /// errors a transport layer should surface as a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::AlreadyPaid { .. }
                | EngineError::PaidHistory { .. }
                | EngineError::Conflict { .. }
                | EngineError::InvalidTransition { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// caller-side input problems
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation { .. }
                | EngineError::AmountTolerance { .. }
                | EngineError::InvalidTerms { .. }
                | EngineError::InvalidPaymentMode { .. }
                | EngineError::InvalidDate { .. }
        )
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Storage {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
