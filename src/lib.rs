pub mod calendar;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ids;
pub mod installment;
pub mod lifecycle;
pub mod reconciliation;
pub mod schedule;
pub mod scheduler;
pub mod store;
pub mod types;

// re-export key types
pub use config::{EngineConfig, PaymentPolicy, ReconciliationSchedule, ScheduleDefaults};
pub use decimal::{Money, Rate};
pub use errors::{EngineError, Result};
pub use events::{Event, EventStore};
pub use installment::{Installment, InstallmentUpdate, PaymentInstruction};
pub use lifecycle::InstallmentService;
pub use reconciliation::{OverdueReconciler, ReconciliationReport};
pub use schedule::{generate_schedule, ContractTerms, ScheduleGenerator};
pub use scheduler::{
    create_reconciliation_status, spawn_reconciliation_task, ReconciliationStatus,
    SharedReconciliationStatus,
};
pub use store::{InstallmentFilter, InstallmentStore, MemoryStore};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
pub use types::{ContractId, InstallmentId, InstallmentStatus, PaymentMode, ReceiptMethod};

// re-export external dependencies that users will need
pub use async_trait::async_trait;
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
