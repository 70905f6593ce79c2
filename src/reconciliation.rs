use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::errors::Result;
use crate::installment::Installment;
use crate::store::InstallmentStore;
use crate::types::InstallmentId;

/// outcome of one overdue sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub as_of: NaiveDate,
    /// moved from SCHEDULED to OVERDUE in this run
    pub transitioned: Vec<InstallmentId>,
    /// already OVERDUE, days overdue recomputed to a new value
    pub refreshed: Vec<InstallmentId>,
    /// OVERDUE but due date moved to `as_of` or later, back to SCHEDULED
    #[serde(default)]
    pub reopened: Vec<InstallmentId>,
}

impl ReconciliationReport {
    pub fn changed(&self) -> usize {
        self.transitioned.len() + self.refreshed.len() + self.reopened.len()
    }

    pub fn is_noop(&self) -> bool {
        self.changed() == 0
    }
}

/// sweeps open installments so status and days overdue match the calendar
#[derive(Clone)]
pub struct OverdueReconciler {
    store: Arc<dyn InstallmentStore>,
}

impl OverdueReconciler {
    pub fn new(store: Arc<dyn InstallmentStore>) -> Self {
        Self { store }
    }

    /// mark past-due installments OVERDUE and recompute days overdue as of `as_of`.
    ///
    /// All changes are written in one batch; running twice for the same date
    /// writes nothing the second time.
    pub async fn reconcile_overdue(&self, as_of: NaiveDate) -> Result<ReconciliationReport> {
        let result = self.sweep(as_of).await;

        match &result {
            Ok(report) => info!(
                as_of = %as_of,
                transitioned = report.transitioned.len(),
                refreshed = report.refreshed.len(),
                reopened = report.reopened.len(),
                "overdue reconciliation finished"
            ),
            Err(e) => error!(as_of = %as_of, error = %e, "overdue reconciliation failed"),
        }

        result
    }

    async fn sweep(&self, as_of: NaiveDate) -> Result<ReconciliationReport> {
        let candidates = self.store.find_overdue_candidates(as_of).await?;

        let mut report = ReconciliationReport {
            as_of,
            transitioned: Vec::new(),
            refreshed: Vec::new(),
            reopened: Vec::new(),
        };
        let mut changes: Vec<(Installment, u64)> = Vec::new();
        let mut kinds: Vec<Change> = Vec::new();

        for mut installment in candidates {
            let read_version = installment.version;
            let kind = if installment.reopen_if_not_due(as_of) {
                Change::Reopened
            } else if installment.mark_overdue(as_of) {
                installment.refresh_days_overdue(as_of);
                Change::Transitioned
            } else if installment.refresh_days_overdue(as_of) {
                Change::Refreshed
            } else {
                continue;
            };
            changes.push((installment, read_version));
            kinds.push(kind);
        }

        if changes.is_empty() {
            return Ok(report);
        }

        // rows written by anyone since the read keep their new state
        let skipped = self.store.update_many_if_version(&changes).await?;
        if !skipped.is_empty() {
            debug!(skipped = skipped.len(), "installments changed during reconciliation");
        }

        for ((installment, _), kind) in changes.into_iter().zip(kinds) {
            if skipped.contains(&installment.installment_id) {
                continue;
            }
            let bucket = match kind {
                Change::Transitioned => &mut report.transitioned,
                Change::Refreshed => &mut report.refreshed,
                Change::Reopened => &mut report.reopened,
            };
            bucket.push(installment.installment_id);
        }

        Ok(report)
    }
}

enum Change {
    Transitioned,
    Refreshed,
    Reopened,
}
