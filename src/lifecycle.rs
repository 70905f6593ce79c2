use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hourglass_rs::SafeTimeProvider;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::installment::{Installment, InstallmentUpdate, PaymentInstruction};
use crate::schedule::{ContractTerms, ScheduleGenerator};
use crate::store::{InstallmentFilter, InstallmentStore};
use crate::types::InstallmentStatus;

/// compare-and-set attempts before giving up on a contended installment
const MAX_WRITE_ATTEMPTS: usize = 3;

/// creates schedules and moves installments through their lifecycle
pub struct InstallmentService {
    store: Arc<dyn InstallmentStore>,
    config: EngineConfig,
    generator: ScheduleGenerator,
    events: Mutex<EventStore>,
}

impl InstallmentService {
    pub fn new(store: Arc<dyn InstallmentStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            generator: ScheduleGenerator::new(config.schedule.clone()),
            config,
            events: Mutex::new(EventStore::new()),
        })
    }

    pub fn with_default_config(store: Arc<dyn InstallmentStore>) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            generator: ScheduleGenerator::new(config.schedule.clone()),
            config,
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn InstallmentStore> {
        Arc::clone(&self.store)
    }

    // schedule management

    /// generate and persist the schedule for a new contract
    pub async fn create_schedule(
        &self,
        contract_id: &str,
        terms: &ContractTerms,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<Installment>> {
        let now = time_provider.now();
        let schedule = self.generator.generate(contract_id, terms, time_provider)?;

        let existing = self.store.find_by_contract(contract_id).await?;
        if !existing.is_empty() {
            return Err(EngineError::Conflict {
                message: format!(
                    "contract {} already has {} installment(s)",
                    contract_id,
                    existing.len()
                ),
            });
        }

        self.store.insert_many(schedule.clone()).await?;

        info!(
            contract_id = %contract_id,
            mode = %terms.payment_mode,
            installments = schedule.len(),
            total = %terms.total_value,
            "schedule created"
        );
        self.emit(vec![Event::ScheduleGenerated {
            contract_id: contract_id.to_string(),
            payment_mode: terms.payment_mode,
            installment_count: schedule.len() as u32,
            total_value: terms.total_value,
            timestamp: now,
        }])
        .await;

        Ok(schedule)
    }

    /// replace a contract's schedule regardless of payment history
    pub async fn regenerate_schedule(
        &self,
        contract_id: &str,
        terms: &ContractTerms,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<Installment>> {
        let existing = self.store.find_by_contract(contract_id).await?;
        let paid = existing.iter().filter(|i| i.is_paid()).count();
        if paid > 0 {
            warn!(
                contract_id = %contract_id,
                paid_installments = paid,
                "regenerating schedule discards paid installments"
            );
        }
        self.replace_schedule(contract_id, terms, paid, time_provider)
            .await
    }

    /// replace a contract's schedule, refusing when any installment is already paid
    pub async fn regenerate_schedule_safe(
        &self,
        contract_id: &str,
        terms: &ContractTerms,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<Installment>> {
        let existing = self.store.find_by_contract(contract_id).await?;
        let paid = existing.iter().filter(|i| i.is_paid()).count();
        if paid > 0 {
            return Err(EngineError::PaidHistory {
                contract_id: contract_id.to_string(),
                paid_count: paid,
            });
        }
        self.replace_schedule(contract_id, terms, 0, time_provider)
            .await
    }

    async fn replace_schedule(
        &self,
        contract_id: &str,
        terms: &ContractTerms,
        discarded_paid: usize,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<Installment>> {
        let now = time_provider.now();
        let schedule = self.generator.generate(contract_id, terms, time_provider)?;
        let removed = self
            .store
            .replace_for_contract(contract_id, schedule.clone())
            .await?;

        info!(
            contract_id = %contract_id,
            removed,
            installments = schedule.len(),
            "schedule regenerated"
        );
        self.emit(vec![Event::ScheduleRegenerated {
            contract_id: contract_id.to_string(),
            removed,
            installment_count: schedule.len() as u32,
            discarded_paid,
            timestamp: now,
        }])
        .await;

        Ok(schedule)
    }

    /// remove every installment of a contract
    pub async fn delete_schedule(
        &self,
        contract_id: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<usize> {
        let now = time_provider.now();
        let removed = self.store.delete_all_for_contract(contract_id).await?;

        info!(contract_id = %contract_id, removed, "schedule deleted");
        self.emit(vec![Event::ScheduleDeleted {
            contract_id: contract_id.to_string(),
            removed,
            timestamp: now,
        }])
        .await;

        Ok(removed)
    }

    // installment transitions

    /// record a payment against an open installment
    pub async fn record_payment(
        &self,
        installment_id: &str,
        payment: PaymentInstruction,
        time_provider: &SafeTimeProvider,
    ) -> Result<Installment> {
        let now = time_provider.now();
        let tolerance = self.config.payment.overpayment_tolerance;

        let (before, after) = self
            .write_with_retry(installment_id, |inst| inst.record_payment(&payment, tolerance))
            .await?;

        info!(
            installment_id = %installment_id,
            paid = %payment.paid_amount,
            expected = %after.expected_amount,
            "payment recorded"
        );
        self.emit(self.payment_events(&before, &after, now)).await;

        Ok(after)
    }

    /// apply a partial update to an installment
    pub async fn update_installment(
        &self,
        installment_id: &str,
        update: InstallmentUpdate,
        time_provider: &SafeTimeProvider,
    ) -> Result<Installment> {
        if update.is_empty() {
            return self.find_installment(installment_id).await;
        }

        let now = time_provider.now();
        let today = now.date_naive();
        let tolerance = self.config.payment.overpayment_tolerance;

        let (before, after) = self
            .write_with_retry(installment_id, |inst| {
                inst.apply_update(&update, tolerance, today)
            })
            .await?;

        let mut events = vec![Event::InstallmentUpdated {
            installment_id: installment_id.to_string(),
            fields: updated_fields(&update),
            timestamp: now,
        }];
        if !before.is_paid() && after.is_paid() {
            events.extend(self.payment_events(&before, &after, now));
        } else if before.status != after.status {
            events.push(Event::StatusChanged {
                installment_id: installment_id.to_string(),
                old_status: before.status,
                new_status: after.status,
                days_overdue: after.days_overdue,
                timestamp: now,
            });
        }

        debug!(installment_id = %installment_id, status = %after.status, "installment updated");
        self.emit(events).await;

        Ok(after)
    }

    /// cancel an open installment
    pub async fn cancel_installment(
        &self,
        installment_id: &str,
        reason: Option<&str>,
        time_provider: &SafeTimeProvider,
    ) -> Result<Installment> {
        let now = time_provider.now();

        let (before, after) = self
            .write_with_retry(installment_id, |inst| inst.cancel(reason))
            .await?;

        info!(installment_id = %installment_id, "installment cancelled");
        self.emit(vec![
            Event::StatusChanged {
                installment_id: installment_id.to_string(),
                old_status: before.status,
                new_status: after.status,
                days_overdue: 0,
                timestamp: now,
            },
            Event::InstallmentCancelled {
                installment_id: installment_id.to_string(),
                contract_id: after.contract_id.clone(),
                reason: reason.map(str::to_string),
                timestamp: now,
            },
        ])
        .await;

        Ok(after)
    }

    /// load, mutate and compare-and-set on the version that was read.
    ///
    /// A lost race re-reads and re-applies the change against the fresh record, so
    /// a payment that lost to another payment fails with `AlreadyPaid` and a
    /// payment racing an amount edit is checked against the new amount.
    async fn write_with_retry<F>(
        &self,
        installment_id: &str,
        mut apply: F,
    ) -> Result<(Installment, Installment)>
    where
        F: FnMut(&mut Installment) -> Result<()>,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let before = self.find_installment(installment_id).await?;
            let mut after = before.clone();
            apply(&mut after)?;

            if self.store.update_if_version(&after, before.version).await? {
                after.version = before.version + 1;
                return Ok((before, after));
            }
            debug!(
                installment_id = %installment_id,
                attempt,
                "installment changed concurrently, retrying"
            );
        }

        warn!(installment_id = %installment_id, "giving up on contended installment");
        Err(EngineError::Conflict {
            message: format!("installment {} is being modified concurrently", installment_id),
        })
    }

    fn payment_events(
        &self,
        before: &Installment,
        after: &Installment,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let (Some(payment_date), Some(paid_amount)) = (after.payment_date, after.paid_amount)
        else {
            return Vec::new();
        };

        let mut events = vec![
            Event::StatusChanged {
                installment_id: after.installment_id.clone(),
                old_status: before.status,
                new_status: after.status,
                days_overdue: before.days_overdue,
                timestamp: now,
            },
            Event::PaymentRecorded {
                installment_id: after.installment_id.clone(),
                contract_id: after.contract_id.clone(),
                expected_amount: after.expected_amount,
                paid_amount,
                payment_date,
                receipt_method: after.receipt_method,
                timestamp: now,
            },
        ];

        if self.config.payment.posts_to_ledger(after.receipt_method) {
            events.push(Event::LedgerPostingRequested {
                installment_id: after.installment_id.clone(),
                contract_id: after.contract_id.clone(),
                amount: paid_amount,
                date: payment_date,
                reference: Uuid::new_v4(),
            });
        } else {
            debug!(
                installment_id = %after.installment_id,
                method = ?after.receipt_method,
                "deferred receipt, no ledger posting"
            );
        }

        events
    }

    // queries

    pub async fn find_installment(&self, installment_id: &str) -> Result<Installment> {
        self.store
            .find_by_id(installment_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                id: installment_id.to_string(),
            })
    }

    pub async fn list_installments(&self, filter: &InstallmentFilter) -> Result<Vec<Installment>> {
        self.store.find(filter).await
    }

    pub async fn installments_for_contract(&self, contract_id: &str) -> Result<Vec<Installment>> {
        self.store.find_by_contract(contract_id).await
    }

    pub async fn overdue_installments(&self) -> Result<Vec<Installment>> {
        self.store
            .find(&InstallmentFilter::default().with_status(InstallmentStatus::Overdue))
            .await
    }

    /// scheduled installments due from today up to `days` ahead (configured window when `None`)
    pub async fn upcoming_installments(
        &self,
        days: Option<u32>,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<Installment>> {
        let today = time_provider.now().date_naive();
        let days = days.unwrap_or(self.config.upcoming_window_days);
        let until = today + Duration::days(days as i64);

        self.store
            .find(
                &InstallmentFilter::default()
                    .with_status(InstallmentStatus::Scheduled)
                    .due_between(today, until),
            )
            .await
    }

    /// installments of one accounting month, from a `MM/YYYY` tag
    pub async fn installments_in_competencia(&self, tag: &str) -> Result<Vec<Installment>> {
        self.store
            .find(&InstallmentFilter::default().in_competencia_tag(tag)?)
            .await
    }

    /// days overdue summed over every OVERDUE installment, as of the last sweep
    pub async fn total_days_overdue(&self) -> Result<u64> {
        let overdue = self.overdue_installments().await?;
        Ok(overdue.iter().map(|i| i.days_overdue as u64).sum())
    }

    /// whether deleting the contract would discard payment history
    pub async fn has_paid_installments(&self, contract_id: &str) -> Result<bool> {
        let paid = self
            .store
            .find(&InstallmentFilter::for_contract(contract_id).with_status(InstallmentStatus::Paid))
            .await?;
        Ok(!paid.is_empty())
    }

    // events

    async fn emit(&self, events: Vec<Event>) {
        let mut store = self.events.lock().await;
        for event in events {
            store.emit(event);
        }
    }

    pub async fn take_events(&self) -> Vec<Event> {
        self.events.lock().await.take_events()
    }
}

fn updated_fields(update: &InstallmentUpdate) -> Vec<String> {
    [
        ("due_date", update.due_date.is_some()),
        ("expected_amount", update.expected_amount.is_some()),
        ("payment_date", update.payment_date.is_some()),
        ("paid_amount", update.paid_amount.is_some()),
        ("receipt_method", update.receipt_method.is_some()),
        ("notes", update.notes.is_some()),
    ]
    .into_iter()
    .filter(|(_, set)| *set)
    .map(|(name, _)| name.to_string())
    .collect()
}
