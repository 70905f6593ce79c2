use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::{sort_installments, InstallmentFilter, InstallmentStore};
use crate::errors::{EngineError, Result};
use crate::installment::Installment;
use crate::types::{InstallmentId, InstallmentStatus};

/// in-process store keyed by installment id
#[derive(Debug, Default)]
pub struct MemoryStore {
    installments: RwLock<BTreeMap<String, Installment>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.installments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.installments.read().await.is_empty()
    }
}

#[async_trait]
impl InstallmentStore for MemoryStore {
    async fn insert_many(&self, installments: Vec<Installment>) -> Result<()> {
        let mut map = self.installments.write().await;

        // check everything before touching the map
        for (i, inst) in installments.iter().enumerate() {
            let duplicate_in_batch = installments[..i]
                .iter()
                .any(|other| other.installment_id == inst.installment_id);
            if duplicate_in_batch || map.contains_key(&inst.installment_id) {
                return Err(EngineError::Conflict {
                    message: format!("installment {} already exists", inst.installment_id),
                });
            }
        }

        for inst in installments {
            map.insert(inst.installment_id.clone(), inst);
        }
        Ok(())
    }

    async fn find_by_id(&self, installment_id: &str) -> Result<Option<Installment>> {
        Ok(self.installments.read().await.get(installment_id).cloned())
    }

    async fn find_by_contract(&self, contract_id: &str) -> Result<Vec<Installment>> {
        self.find(&InstallmentFilter::for_contract(contract_id)).await
    }

    async fn find_overdue_candidates(&self, as_of: NaiveDate) -> Result<Vec<Installment>> {
        let map = self.installments.read().await;
        let mut found: Vec<Installment> = map
            .values()
            .filter(|i| {
                (i.is_open() && i.due_date < as_of) || i.status == InstallmentStatus::Overdue
            })
            .cloned()
            .collect();
        sort_installments(&mut found);
        Ok(found)
    }

    async fn find(&self, filter: &InstallmentFilter) -> Result<Vec<Installment>> {
        let map = self.installments.read().await;
        let mut found: Vec<Installment> = map
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        sort_installments(&mut found);
        Ok(found)
    }

    async fn update(&self, installment: &Installment) -> Result<()> {
        let mut map = self.installments.write().await;
        match map.get_mut(&installment.installment_id) {
            Some(stored) => {
                store_next_version(stored, installment);
                Ok(())
            }
            None => Err(EngineError::NotFound {
                id: installment.installment_id.clone(),
            }),
        }
    }

    async fn update_if_version(
        &self,
        installment: &Installment,
        expected_version: u64,
    ) -> Result<bool> {
        let mut map = self.installments.write().await;
        match map.get_mut(&installment.installment_id) {
            Some(stored) if stored.version == expected_version => {
                store_next_version(stored, installment);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(EngineError::NotFound {
                id: installment.installment_id.clone(),
            }),
        }
    }

    async fn update_many_if_version(
        &self,
        changes: &[(Installment, u64)],
    ) -> Result<Vec<InstallmentId>> {
        let mut map = self.installments.write().await;
        let mut skipped = Vec::new();

        for (inst, expected_version) in changes {
            match map.get_mut(&inst.installment_id) {
                Some(stored) if stored.version == *expected_version => {
                    store_next_version(stored, inst)
                }
                _ => skipped.push(inst.installment_id.clone()),
            }
        }
        Ok(skipped)
    }

    async fn delete_all_for_contract(&self, contract_id: &str) -> Result<usize> {
        let mut map = self.installments.write().await;
        let before = map.len();
        map.retain(|_, i| i.contract_id != contract_id);
        Ok(before - map.len())
    }

    async fn replace_for_contract(
        &self,
        contract_id: &str,
        installments: Vec<Installment>,
    ) -> Result<usize> {
        if let Some(stray) = installments.iter().find(|i| i.contract_id != contract_id) {
            return Err(EngineError::Validation {
                message: format!(
                    "installment {} does not belong to contract {}",
                    stray.installment_id, contract_id
                ),
            });
        }

        let mut map = self.installments.write().await;
        let before = map.len();
        map.retain(|_, i| i.contract_id != contract_id);
        let removed = before - map.len();

        for inst in installments {
            map.insert(inst.installment_id.clone(), inst);
        }
        Ok(removed)
    }
}

fn store_next_version(stored: &mut Installment, installment: &Installment) {
    let version = stored.version + 1;
    *stored = installment.clone();
    stored.version = version;
}
