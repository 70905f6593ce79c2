use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{ContractId, InstallmentId, InstallmentStatus, PaymentMode, ReceiptMethod};

/// all events that can be emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // schedule events
    ScheduleGenerated {
        contract_id: ContractId,
        payment_mode: PaymentMode,
        installment_count: u32,
        total_value: Money,
        timestamp: DateTime<Utc>,
    },
    ScheduleRegenerated {
        contract_id: ContractId,
        removed: usize,
        installment_count: u32,
        discarded_paid: usize,
        timestamp: DateTime<Utc>,
    },
    ScheduleDeleted {
        contract_id: ContractId,
        removed: usize,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        installment_id: InstallmentId,
        contract_id: ContractId,
        expected_amount: Money,
        paid_amount: Money,
        payment_date: NaiveDate,
        receipt_method: Option<ReceiptMethod>,
        timestamp: DateTime<Utc>,
    },
    /// cash ledger should post a receipt for this payment
    LedgerPostingRequested {
        installment_id: InstallmentId,
        contract_id: ContractId,
        amount: Money,
        date: NaiveDate,
        reference: Uuid,
    },

    // status events
    StatusChanged {
        installment_id: InstallmentId,
        old_status: InstallmentStatus,
        new_status: InstallmentStatus,
        days_overdue: u32,
        timestamp: DateTime<Utc>,
    },
    InstallmentCancelled {
        installment_id: InstallmentId,
        contract_id: ContractId,
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    InstallmentUpdated {
        installment_id: InstallmentId,
        fields: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// installment the event concerns, if it is about a single one
    pub fn installment_id(&self) -> Option<&str> {
        match self {
            Event::PaymentRecorded { installment_id, .. }
            | Event::LedgerPostingRequested { installment_id, .. }
            | Event::StatusChanged { installment_id, .. }
            | Event::InstallmentCancelled { installment_id, .. }
            | Event::InstallmentUpdated { installment_id, .. } => Some(installment_id),
            Event::ScheduleGenerated { .. }
            | Event::ScheduleRegenerated { .. }
            | Event::ScheduleDeleted { .. } => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
