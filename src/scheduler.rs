//! Daily trigger for the overdue sweep.
//!
//! The task runs once at startup (when configured) and then every day at the
//! configured UTC time, reading "today" from the time provider it was given.
//! A failed run is logged and recorded in the shared status; the task then
//! waits for the next slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use hourglass_rs::SafeTimeProvider;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ReconciliationSchedule;
use crate::errors::Result;
use crate::reconciliation::{OverdueReconciler, ReconciliationReport};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// what the last sweep did
#[derive(Debug, Clone, Default)]
pub struct ReconciliationStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_report: Option<ReconciliationReport>,
    pub last_error: Option<String>,
    pub runs: u64,
}

pub type SharedReconciliationStatus = Arc<RwLock<ReconciliationStatus>>;

pub fn create_reconciliation_status() -> SharedReconciliationStatus {
    Arc::new(RwLock::new(ReconciliationStatus::default()))
}

/// time from `now` until the next `run_at` (tomorrow if today's slot has passed)
pub fn duration_until_next_run(now: DateTime<Utc>, run_at: NaiveTime) -> Duration {
    let today_slot = now.date_naive().and_time(run_at).and_utc();
    let next = if today_slot > now {
        today_slot
    } else {
        today_slot + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// run one sweep as of the provider's today and record the outcome in `status`
pub async fn run_once(
    reconciler: &OverdueReconciler,
    time_provider: &SafeTimeProvider,
    status: &SharedReconciliationStatus,
) -> Result<ReconciliationReport> {
    let now = time_provider.now();
    let result = reconciler.reconcile_overdue(now.date_naive()).await;

    let mut s = status.write().await;
    s.last_run = Some(now);
    s.runs += 1;
    match &result {
        Ok(report) => {
            s.last_report = Some(report.clone());
            s.last_error = None;
        }
        Err(e) => s.last_error = Some(e.to_string()),
    }

    result
}

/// spawn the daily sweep; set `shutdown` to stop it
pub fn spawn_reconciliation_task(
    reconciler: OverdueReconciler,
    schedule: ReconciliationSchedule,
    time_provider: SafeTimeProvider,
    status: SharedReconciliationStatus,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            run_at = %schedule.run_at,
            run_on_startup = schedule.run_on_startup,
            "reconciliation task starting"
        );

        if schedule.run_on_startup {
            match run_once(&reconciler, &time_provider, &status).await {
                Ok(report) => info!(changed = report.changed(), "startup reconciliation finished"),
                Err(e) => error!(error = %e, "startup reconciliation failed, waiting for next slot"),
            }
        }

        loop {
            let wait = duration_until_next_run(time_provider.now(), schedule.run_at);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = wait_for_shutdown(&shutdown) => {
                    info!("reconciliation task interrupted by shutdown");
                    break;
                }
            }

            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            if let Err(e) = run_once(&reconciler, &time_provider, &status).await {
                error!(error = %e, "scheduled reconciliation failed, waiting for next slot");
            }
        }

        info!("reconciliation task stopped");
    })
}

async fn wait_for_shutdown(shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }
}
