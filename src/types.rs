use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{EngineError, Result};

/// identifier of the contract owning a schedule (e.g. `CTR-2024-0001`)
pub type ContractId = String;

/// identifier of a single installment (e.g. `CTR-2024-0001-003`)
pub type InstallmentId = String;

/// how a contract's total value is collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    /// single payment (à vista)
    #[serde(alias = "A_VISTA")]
    Cash,
    /// fixed number of installments (parcelado)
    #[serde(alias = "PARCELADO")]
    Installments,
    /// recurring monthly charge (mensalidade)
    #[serde(alias = "MENSALIDADE")]
    Subscription,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "CASH",
            PaymentMode::Installments => "INSTALLMENTS",
            PaymentMode::Subscription => "SUBSCRIPTION",
        }
    }

    /// whether schedules in this mode are pinned to a due day
    pub fn uses_due_day(&self) -> bool {
        !matches!(self, PaymentMode::Cash)
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CASH" | "A_VISTA" => Ok(PaymentMode::Cash),
            "INSTALLMENTS" | "PARCELADO" => Ok(PaymentMode::Installments),
            "SUBSCRIPTION" | "MENSALIDADE" => Ok(PaymentMode::Subscription),
            _ => Err(EngineError::InvalidPaymentMode {
                mode: s.to_string(),
            }),
        }
    }
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentStatus {
    /// generated and not yet due or paid (previsto)
    #[serde(alias = "PREVISTO")]
    Scheduled,
    /// payment recorded (pago)
    #[serde(alias = "PAGO")]
    Paid,
    /// past due and unpaid (atrasado)
    #[serde(alias = "ATRASADO")]
    Overdue,
    /// withdrawn from the schedule (cancelado)
    #[serde(alias = "CANCELADO")]
    Cancelled,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Scheduled => "SCHEDULED",
            InstallmentStatus::Paid => "PAID",
            InstallmentStatus::Overdue => "OVERDUE",
            InstallmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// no transition leaves these states
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallmentStatus::Paid | InstallmentStatus::Cancelled)
    }

    /// still owed by the client
    pub fn is_open(&self) -> bool {
        matches!(self, InstallmentStatus::Scheduled | InstallmentStatus::Overdue)
    }

    /// OVERDUE only returns to SCHEDULED when its due date moves out of the past
    pub fn can_transition_to(&self, next: InstallmentStatus) -> bool {
        use InstallmentStatus::*;
        matches!(
            (self, next),
            (Scheduled, Paid)
                | (Scheduled, Overdue)
                | (Scheduled, Cancelled)
                | (Overdue, Scheduled)
                | (Overdue, Paid)
                | (Overdue, Cancelled)
        )
    }
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallmentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" | "PREVISTO" => Ok(InstallmentStatus::Scheduled),
            "PAID" | "PAGO" => Ok(InstallmentStatus::Paid),
            "OVERDUE" | "ATRASADO" => Ok(InstallmentStatus::Overdue),
            "CANCELLED" | "CANCELADO" => Ok(InstallmentStatus::Cancelled),
            other => Err(EngineError::Validation {
                message: format!("unknown installment status '{}'", other),
            }),
        }
    }
}

/// how a payment was received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptMethod {
    Pix,
    #[serde(alias = "TRANSFERENCIA")]
    Transfer,
    /// bank slip (boleto)
    #[serde(alias = "BOLETO")]
    Invoice,
    #[serde(alias = "CHEQUE")]
    Check,
    #[serde(alias = "CARTAO")]
    Card,
}

impl ReceiptMethod {
    pub const ALL: [ReceiptMethod; 5] = [
        ReceiptMethod::Pix,
        ReceiptMethod::Transfer,
        ReceiptMethod::Invoice,
        ReceiptMethod::Check,
        ReceiptMethod::Card,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptMethod::Pix => "PIX",
            ReceiptMethod::Transfer => "TRANSFER",
            ReceiptMethod::Invoice => "INVOICE",
            ReceiptMethod::Check => "CHECK",
            ReceiptMethod::Card => "CARD",
        }
    }

    /// card receipts settle later through the card operator, so they do not hit cash on the payment date
    pub fn impacts_cash(&self) -> bool {
        !matches!(self, ReceiptMethod::Card)
    }
}

impl fmt::Display for ReceiptMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptMethod {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PIX" => Ok(ReceiptMethod::Pix),
            "TRANSFER" | "TRANSFERENCIA" => Ok(ReceiptMethod::Transfer),
            "INVOICE" | "BOLETO" => Ok(ReceiptMethod::Invoice),
            "CHECK" | "CHEQUE" => Ok(ReceiptMethod::Check),
            "CARD" | "CARTAO" | "CREDIT_CARD" => Ok(ReceiptMethod::Card),
            other => Err(EngineError::Validation {
                message: format!("unknown receipt method '{}'", other),
            }),
        }
    }
}
