use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Executor, PgPool, Postgres, Row};

use super::{InstallmentFilter, InstallmentStore};
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::installment::Installment;
use crate::types::InstallmentId;

const COLUMNS: &str = "installment_id, contract_id, competencia, sequence_number, due_date, \
    expected_amount, payment_date, paid_amount, status, days_overdue, receipt_method, notes, \
    version";

const ORDERING: &str = "ORDER BY due_date ASC, contract_id ASC, sequence_number ASC";

/// installments table in postgres (see `migrations/0001_installments.sql`)
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    async fn insert_one<'e, E>(executor: E, installment: &Installment) -> Result<()>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO installments (
                installment_id, contract_id, competencia, sequence_number, due_date,
                expected_amount, payment_date, paid_amount, status, days_overdue,
                receipt_method, notes, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&installment.installment_id)
        .bind(&installment.contract_id)
        .bind(&installment.competencia)
        .bind(installment.sequence_number as i32)
        .bind(installment.due_date)
        .bind(installment.expected_amount.as_decimal())
        .bind(installment.payment_date)
        .bind(installment.paid_amount.map(|m| m.as_decimal()))
        .bind(installment.status.as_str())
        .bind(installment.days_overdue as i32)
        .bind(installment.receipt_method.map(|m| m.as_str()))
        .bind(&installment.notes)
        .bind(installment.version as i64)
        .execute(executor)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                EngineError::Conflict {
                    message: format!("installment {} already exists", installment.installment_id),
                }
            } else {
                EngineError::from(e)
            }
        })?;

        Ok(())
    }

    /// write all mutable fields and bump the version; returns affected rows
    async fn write_one<'e, E>(
        executor: E,
        installment: &Installment,
        expected_version: Option<u64>,
    ) -> Result<u64>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE installments SET
                competencia = $2,
                due_date = $3,
                expected_amount = $4,
                payment_date = $5,
                paid_amount = $6,
                status = $7,
                days_overdue = $8,
                receipt_method = $9,
                notes = $10,
                version = version + 1,
                updated_at = NOW()
            WHERE installment_id = $1
              AND ($11::BIGINT IS NULL OR version = $11)
            "#,
        )
        .bind(&installment.installment_id)
        .bind(&installment.competencia)
        .bind(installment.due_date)
        .bind(installment.expected_amount.as_decimal())
        .bind(installment.payment_date)
        .bind(installment.paid_amount.map(|m| m.as_decimal()))
        .bind(installment.status.as_str())
        .bind(installment.days_overdue as i32)
        .bind(installment.receipt_method.map(|m| m.as_str()))
        .bind(&installment.notes)
        .bind(expected_version.map(|v| v as i64))
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    async fn exists(&self, installment_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM installments WHERE installment_id = $1")
            .bind(installment_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn row_to_installment(row: &PgRow) -> Result<Installment> {
    let status: String = row.try_get("status")?;
    let receipt_method: Option<String> = row.try_get("receipt_method")?;
    let sequence_number: i32 = row.try_get("sequence_number")?;
    let days_overdue: i32 = row.try_get("days_overdue")?;
    let expected_amount: Decimal = row.try_get("expected_amount")?;
    let paid_amount: Option<Decimal> = row.try_get("paid_amount")?;
    let version: i64 = row.try_get("version")?;

    Ok(Installment {
        installment_id: row.try_get("installment_id")?,
        contract_id: row.try_get("contract_id")?,
        competencia: row.try_get("competencia")?,
        sequence_number: sequence_number.max(0) as u32,
        due_date: row.try_get("due_date")?,
        expected_amount: Money::from_decimal(expected_amount),
        payment_date: row.try_get("payment_date")?,
        paid_amount: paid_amount.map(Money::from_decimal),
        status: status.parse()?,
        days_overdue: days_overdue.max(0) as u32,
        receipt_method: receipt_method.map(|m| m.parse()).transpose()?,
        notes: row.try_get("notes")?,
        version: version.max(0) as u64,
    })
}

fn rows_to_installments(rows: &[PgRow]) -> Result<Vec<Installment>> {
    rows.iter().map(row_to_installment).collect()
}

#[async_trait]
impl InstallmentStore for PostgresStore {
    async fn insert_many(&self, installments: Vec<Installment>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for installment in &installments {
            Self::insert_one(&mut *tx, installment).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, installment_id: &str) -> Result<Option<Installment>> {
        let sql = format!("SELECT {} FROM installments WHERE installment_id = $1", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(installment_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_installment).transpose()
    }

    async fn find_by_contract(&self, contract_id: &str) -> Result<Vec<Installment>> {
        self.find(&InstallmentFilter::for_contract(contract_id)).await
    }

    async fn find_overdue_candidates(&self, as_of: NaiveDate) -> Result<Vec<Installment>> {
        let sql = format!(
            "SELECT {} FROM installments \
             WHERE (status IN ('SCHEDULED', 'OVERDUE') AND due_date < $1) \
                OR status = 'OVERDUE' {}",
            COLUMNS, ORDERING
        );
        let rows = sqlx::query(&sql).bind(as_of).fetch_all(&self.pool).await?;
        rows_to_installments(&rows)
    }

    async fn find(&self, filter: &InstallmentFilter) -> Result<Vec<Installment>> {
        let sql = format!(
            r#"
            SELECT {} FROM installments
            WHERE ($1::TEXT IS NULL OR contract_id = $1)
              AND ($2::TEXT IS NULL OR status = $2)
              AND ($3::TEXT IS NULL OR competencia = $3)
              AND ($4::DATE IS NULL OR due_date >= $4)
              AND ($5::DATE IS NULL OR due_date <= $5)
              AND ($6::TEXT IS NULL OR receipt_method = $6)
            {}
            "#,
            COLUMNS, ORDERING
        );
        let rows = sqlx::query(&sql)
            .bind(filter.contract_id.as_deref())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.competencia.as_deref())
            .bind(filter.due_from)
            .bind(filter.due_to)
            .bind(filter.receipt_method.map(|m| m.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows_to_installments(&rows)
    }

    async fn update(&self, installment: &Installment) -> Result<()> {
        let affected = Self::write_one(&self.pool, installment, None).await?;
        if affected == 0 {
            return Err(EngineError::NotFound {
                id: installment.installment_id.clone(),
            });
        }
        Ok(())
    }

    async fn update_if_version(
        &self,
        installment: &Installment,
        expected_version: u64,
    ) -> Result<bool> {
        let affected = Self::write_one(&self.pool, installment, Some(expected_version)).await?;
        if affected == 0 && !self.exists(&installment.installment_id).await? {
            return Err(EngineError::NotFound {
                id: installment.installment_id.clone(),
            });
        }
        Ok(affected > 0)
    }

    async fn update_many_if_version(
        &self,
        changes: &[(Installment, u64)],
    ) -> Result<Vec<InstallmentId>> {
        let mut tx = self.pool.begin().await?;
        let mut skipped = Vec::new();
        for (installment, expected_version) in changes {
            let affected = Self::write_one(&mut *tx, installment, Some(*expected_version)).await?;
            if affected == 0 {
                skipped.push(installment.installment_id.clone());
            }
        }
        tx.commit().await?;
        Ok(skipped)
    }

    async fn delete_all_for_contract(&self, contract_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM installments WHERE contract_id = $1")
            .bind(contract_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
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

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM installments WHERE contract_id = $1")
            .bind(contract_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        for installment in &installments {
            Self::insert_one(&mut *tx, installment).await?;
        }
        tx.commit().await?;

        Ok(removed as usize)
    }
}
