use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::errors::Result;
use crate::installment::Installment;
use crate::types::{InstallmentId, InstallmentStatus, ReceiptMethod};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

/// query over stored installments; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallmentFilter {
    pub contract_id: Option<String>,
    pub status: Option<InstallmentStatus>,
    /// `MM/YYYY`
    pub competencia: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    pub receipt_method: Option<ReceiptMethod>,
}

impl InstallmentFilter {
    pub fn for_contract(contract_id: &str) -> Self {
        Self {
            contract_id: Some(contract_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: InstallmentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn in_competencia(mut self, month: u32, year: i32) -> Self {
        self.competencia = Some(format!("{:02}/{}", month, year));
        self
    }

    /// same as `in_competencia`, from a `MM/YYYY` tag; `Validation` if malformed
    pub fn in_competencia_tag(self, tag: &str) -> Result<Self> {
        let (month, year) = calendar::parse_competencia(tag)?;
        Ok(self.in_competencia(month, year))
    }

    /// due date within `from..=to`
    pub fn due_between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.due_from = Some(from);
        self.due_to = Some(to);
        self
    }

    pub fn matches(&self, installment: &Installment) -> bool {
        self.contract_id
            .as_deref()
            .map_or(true, |c| installment.contract_id == c)
            && self.status.map_or(true, |s| installment.status == s)
            && self
                .competencia
                .as_deref()
                .map_or(true, |c| installment.competencia == c)
            && self.due_from.map_or(true, |d| installment.due_date >= d)
            && self.due_to.map_or(true, |d| installment.due_date <= d)
            && self
                .receipt_method
                .map_or(true, |m| installment.receipt_method == Some(m))
    }
}

/// persistence seam for installments.
///
/// Batch operations (`insert_many`, `replace_for_contract`) are all-or-nothing.
/// Results are ordered by due date, then sequence number. Every successful write
/// stores the installment with its version incremented.
#[async_trait]
pub trait InstallmentStore: Send + Sync {
    /// fails with `Conflict` if any id already exists
    async fn insert_many(&self, installments: Vec<Installment>) -> Result<()>;

    async fn find_by_id(&self, installment_id: &str) -> Result<Option<Installment>>;

    async fn find_by_contract(&self, contract_id: &str) -> Result<Vec<Installment>>;

    /// SCHEDULED or OVERDUE installments due strictly before `as_of`, plus every
    /// OVERDUE installment whatever its due date
    async fn find_overdue_candidates(&self, as_of: NaiveDate) -> Result<Vec<Installment>>;

    async fn find(&self, filter: &InstallmentFilter) -> Result<Vec<Installment>>;

    /// fails with `NotFound` if the installment does not exist
    async fn update(&self, installment: &Installment) -> Result<()>;

    /// write only if the stored version is still `expected_version`; returns
    /// whether it was written. `NotFound` if the installment does not exist
    async fn update_if_version(
        &self,
        installment: &Installment,
        expected_version: u64,
    ) -> Result<bool>;

    /// batch compare-and-set in one atomic write; entries whose stored version no
    /// longer matches (or that were deleted) are skipped and their ids returned
    async fn update_many_if_version(
        &self,
        changes: &[(Installment, u64)],
    ) -> Result<Vec<InstallmentId>>;

    /// returns how many installments were removed
    async fn delete_all_for_contract(&self, contract_id: &str) -> Result<usize>;

    /// delete and recreate a contract's schedule atomically; returns how many were removed
    async fn replace_for_contract(
        &self,
        contract_id: &str,
        installments: Vec<Installment>,
    ) -> Result<usize>;
}

pub(crate) fn sort_installments(installments: &mut [Installment]) {
    installments.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then_with(|| a.contract_id.cmp(&b.contract_id))
            .then_with(|| a.sequence_number.cmp(&b.sequence_number))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;

    #[test]
    fn test_filter_matching() {
        let due = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let inst = Installment::scheduled("CTR-2024-0001", 1, due, Money::from_major(50));

        assert!(InstallmentFilter::default().matches(&inst));
        assert!(InstallmentFilter::for_contract("CTR-2024-0001")
            .with_status(InstallmentStatus::Scheduled)
            .in_competencia(3, 2024)
            .matches(&inst));
        assert!(!InstallmentFilter::for_contract("CTR-2024-0002").matches(&inst));
        assert!(!InstallmentFilter::default().in_competencia(4, 2024).matches(&inst));
        assert!(InstallmentFilter::default()
            .due_between(due, due)
            .matches(&inst));
        assert!(!InstallmentFilter::default()
            .due_between(due.succ_opt().unwrap(), due.succ_opt().unwrap())
            .matches(&inst));
    }

    #[test]
    fn test_filter_from_competencia_tag() {
        let due = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let inst = Installment::scheduled("CTR-2024-0001", 1, due, Money::from_major(50));

        let filter = InstallmentFilter::default().in_competencia_tag("03/2024").unwrap();
        assert_eq!(filter.competencia.as_deref(), Some("03/2024"));
        assert!(filter.matches(&inst));

        // unpadded month is normalised
        let filter = InstallmentFilter::default().in_competencia_tag("3/2024").unwrap();
        assert!(filter.matches(&inst));

        assert!(InstallmentFilter::default()
            .in_competencia_tag("13/2024")
            .unwrap_err()
            .is_validation());
        assert!(InstallmentFilter::default().in_competencia_tag("2024-03").is_err());
    }
}
