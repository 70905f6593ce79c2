//! Store wrappers for exercising races and outages in tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{InstallmentFilter, InstallmentStore, MemoryStore};
use crate::errors::{EngineError, Result};
use crate::installment::Installment;
use crate::types::InstallmentId;

/// memory store that commits a queued competing write right before the next
/// conditional write, i.e. between a caller's read and its compare-and-set
#[derive(Debug, Default)]
pub(crate) struct InterleavingStore {
    inner: MemoryStore,
    queued: Mutex<Option<Installment>>,
}

impl InterleavingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `edit` lands just before the next `update_if_version`/`update_many_if_version`
    pub(crate) fn interleave(&self, edit: Installment) {
        *self.queued.lock().unwrap() = Some(edit);
    }

    async fn land_queued(&self) -> Result<()> {
        let queued = self.queued.lock().unwrap().take();
        if let Some(edit) = queued {
            self.inner.update(&edit).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl InstallmentStore for InterleavingStore {
    async fn insert_many(&self, installments: Vec<Installment>) -> Result<()> {
        self.inner.insert_many(installments).await
    }

    async fn find_by_id(&self, installment_id: &str) -> Result<Option<Installment>> {
        self.inner.find_by_id(installment_id).await
    }

    async fn find_by_contract(&self, contract_id: &str) -> Result<Vec<Installment>> {
        self.inner.find_by_contract(contract_id).await
    }

    async fn find_overdue_candidates(&self, as_of: NaiveDate) -> Result<Vec<Installment>> {
        self.inner.find_overdue_candidates(as_of).await
    }

    async fn find(&self, filter: &InstallmentFilter) -> Result<Vec<Installment>> {
        self.inner.find(filter).await
    }

    async fn update(&self, installment: &Installment) -> Result<()> {
        self.inner.update(installment).await
    }

    async fn update_if_version(
        &self,
        installment: &Installment,
        expected_version: u64,
    ) -> Result<bool> {
        self.land_queued().await?;
        self.inner.update_if_version(installment, expected_version).await
    }

    async fn update_many_if_version(
        &self,
        changes: &[(Installment, u64)],
    ) -> Result<Vec<InstallmentId>> {
        self.land_queued().await?;
        self.inner.update_many_if_version(changes).await
    }

    async fn delete_all_for_contract(&self, contract_id: &str) -> Result<usize> {
        self.inner.delete_all_for_contract(contract_id).await
    }

    async fn replace_for_contract(
        &self,
        contract_id: &str,
        installments: Vec<Installment>,
    ) -> Result<usize> {
        self.inner.replace_for_contract(contract_id, installments).await
    }
}

/// every call fails as if the database were down
#[derive(Debug, Default)]
pub(crate) struct UnavailableStore;

fn unavailable<T>() -> Result<T> {
    Err(EngineError::Storage {
        message: "database unavailable".to_string(),
    })
}

#[async_trait]
impl InstallmentStore for UnavailableStore {
    async fn insert_many(&self, _installments: Vec<Installment>) -> Result<()> {
        unavailable()
    }

    async fn find_by_id(&self, _installment_id: &str) -> Result<Option<Installment>> {
        unavailable()
    }

    async fn find_by_contract(&self, _contract_id: &str) -> Result<Vec<Installment>> {
        unavailable()
    }

    async fn find_overdue_candidates(&self, _as_of: NaiveDate) -> Result<Vec<Installment>> {
        unavailable()
    }

    async fn find(&self, _filter: &InstallmentFilter) -> Result<Vec<Installment>> {
        unavailable()
    }

    async fn update(&self, _installment: &Installment) -> Result<()> {
        unavailable()
    }

    async fn update_if_version(
        &self,
        _installment: &Installment,
        _expected_version: u64,
    ) -> Result<bool> {
        unavailable()
    }

    async fn update_many_if_version(
        &self,
        _changes: &[(Installment, u64)],
    ) -> Result<Vec<InstallmentId>> {
        unavailable()
    }

    async fn delete_all_for_contract(&self, _contract_id: &str) -> Result<usize> {
        unavailable()
    }

    async fn replace_for_contract(
        &self,
        _contract_id: &str,
        _installments: Vec<Installment>,
    ) -> Result<usize> {
        unavailable()
    }
}
