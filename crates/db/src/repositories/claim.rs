use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::Row;

use claimflow_core::domain::claim::{
    ApprovalStep, Claim, ClaimId, ClaimStatus, StepStatus,
};
use claimflow_core::domain::company::CompanyId;
use claimflow_core::domain::user::UserId;

use super::company::parse_timestamp;
use super::{ClaimRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_steps(&self, claim_id: &str) -> Result<Vec<ApprovalStep>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT step, approver_id, status, comment, decided_at
             FROM claim_step WHERE claim_id = ? ORDER BY step ASC",
        )
        .bind(claim_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()
    }

    async fn hydrate(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Claim, RepositoryError> {
        let mut claim = row_to_claim(row)?;
        claim.steps = self.load_steps(&claim.id.0).await?;
        Ok(claim)
    }
}

fn claim_status_as_str(status: ClaimStatus) -> &'static str {
    match status {
        ClaimStatus::Pending => "pending",
        ClaimStatus::Approved => "approved",
        ClaimStatus::Rejected => "rejected",
    }
}

fn parse_claim_status(raw: &str) -> Result<ClaimStatus, RepositoryError> {
    match raw {
        "pending" => Ok(ClaimStatus::Pending),
        "approved" => Ok(ClaimStatus::Approved),
        "rejected" => Ok(ClaimStatus::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown claim status `{other}`"))),
    }
}

fn step_status_as_str(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "pending",
        StepStatus::Approved => "approved",
        StepStatus::Rejected => "rejected",
    }
}

fn parse_step_status(raw: &str) -> Result<StepStatus, RepositoryError> {
    match raw {
        "pending" => Ok(StepStatus::Pending),
        "approved" => Ok(StepStatus::Approved),
        "rejected" => Ok(StepStatus::Rejected),
        other => Err(RepositoryError::Decode(format!("unknown step status `{other}`"))),
    }
}

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("bad {column} amount `{raw}`: {e}")))
}

const CLAIM_COLUMNS: &str = "id, company_id, employee_id, amount_original, currency_original,
                             amount_company, currency_company, category, description, spent_on,
                             status, current_step, version, created_at, updated_at";

fn row_to_claim(row: &sqlx::sqlite::SqliteRow) -> Result<Claim, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let employee_id: String =
        row.try_get("employee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_original: String =
        row.try_get("amount_original").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency_original: String =
        row.try_get("currency_original").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount_company: String =
        row.try_get("amount_company").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency_company: String =
        row.try_get("currency_company").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let category: String =
        row.try_get("category").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let spent_on_str: String =
        row.try_get("spent_on").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let current_step: i64 =
        row.try_get("current_step").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let spent_on = NaiveDate::from_str(&spent_on_str)
        .map_err(|e| RepositoryError::Decode(format!("bad spent_on date `{spent_on_str}`: {e}")))?;

    Ok(Claim {
        id: ClaimId(id),
        company_id: CompanyId(company_id),
        employee_id: UserId(employee_id),
        amount_original: parse_decimal(&amount_original, "amount_original")?,
        currency_original,
        amount_company: parse_decimal(&amount_company, "amount_company")?,
        currency_company,
        category,
        description,
        spent_on,
        status: parse_claim_status(&status_str)?,
        current_step: current_step as u32,
        steps: Vec::new(),
        version,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let step: i64 = row.try_get("step").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approver_id: String =
        row.try_get("approver_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let comment: Option<String> =
        row.try_get("comment").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let decided_at_str: Option<String> =
        row.try_get("decided_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let decided_at = decided_at_str
        .map(|raw| parse_timestamp(&raw, "decided_at"))
        .transpose()?;

    Ok(ApprovalStep {
        approver_id: UserId(approver_id),
        step: step as u32,
        status: parse_step_status(&status_str)?,
        comment,
        decided_at,
    })
}

#[async_trait::async_trait]
impl ClaimRepository for SqlClaimRepository {
    async fn insert(&self, claim: &Claim) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO claim (id, company_id, employee_id, amount_original, currency_original,
                                amount_company, currency_company, category, description, spent_on,
                                status, current_step, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&claim.id.0)
        .bind(&claim.company_id.0)
        .bind(&claim.employee_id.0)
        .bind(claim.amount_original.to_string())
        .bind(&claim.currency_original)
        .bind(claim.amount_company.to_string())
        .bind(&claim.currency_company)
        .bind(&claim.category)
        .bind(&claim.description)
        .bind(claim.spent_on.to_string())
        .bind(claim_status_as_str(claim.status))
        .bind(claim.current_step as i64)
        .bind(claim.version)
        .bind(claim.created_at.to_rfc3339())
        .bind(claim.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for step in &claim.steps {
            sqlx::query(
                "INSERT INTO claim_step (claim_id, step, approver_id, status, comment, decided_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&claim.id.0)
            .bind(step.step as i64)
            .bind(&step.approver_id.0)
            .bind(step_status_as_str(step.status))
            .bind(step.comment.as_deref())
            .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let query = format!("SELECT {CLAIM_COLUMNS} FROM claim WHERE id = ?");
        let row = sqlx::query(&query).bind(&id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(self.hydrate(r).await?)),
            None => Ok(None),
        }
    }

    async fn apply_decision(
        &self,
        claim: &Claim,
        decided_step: u32,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let Some(step) = claim.steps.iter().find(|s| s.step == decided_step) else {
            return Err(RepositoryError::Decode(format!(
                "claim {} carries no step {decided_step}",
                claim.id.0
            )));
        };

        let mut tx = self.pool.begin().await?;

        // The version predicate makes the commit conditional on the state
        // the deciding request read; a racing decision that won bumps the
        // version and this update matches zero rows.
        let updated = sqlx::query(
            "UPDATE claim
             SET status = ?, current_step = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(claim_status_as_str(claim.status))
        .bind(claim.current_step as i64)
        .bind(claim.updated_at.to_rfc3339())
        .bind(&claim.id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE claim_step SET status = ?, comment = ?, decided_at = ?
             WHERE claim_id = ? AND step = ?",
        )
        .bind(step_status_as_str(step.status))
        .bind(step.comment.as_deref())
        .bind(step.decided_at.map(|dt| dt.to_rfc3339()))
        .bind(&claim.id.0)
        .bind(decided_step as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
        employee_id: Option<&UserId>,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = if let Some(employee_id) = employee_id {
            let query = format!(
                "SELECT {CLAIM_COLUMNS} FROM claim
                 WHERE company_id = ? AND employee_id = ?
                 ORDER BY created_at DESC"
            );
            sqlx::query(&query)
                .bind(&company_id.0)
                .bind(&employee_id.0)
                .fetch_all(&self.pool)
                .await?
        } else {
            let query = format!(
                "SELECT {CLAIM_COLUMNS} FROM claim WHERE company_id = ? ORDER BY created_at DESC"
            );
            sqlx::query(&query).bind(&company_id.0).fetch_all(&self.pool).await?
        };

        let mut claims = Vec::with_capacity(rows.len());
        for row in &rows {
            claims.push(self.hydrate(row).await?);
        }
        Ok(claims)
    }

    async fn list_pending_for_approver(
        &self,
        company_id: &CompanyId,
        approver_id: &UserId,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let query = format!(
            "SELECT {CLAIM_COLUMNS} FROM claim c
             WHERE c.company_id = ? AND c.status = 'pending'
               AND EXISTS (SELECT 1 FROM claim_step s
                           WHERE s.claim_id = c.id AND s.approver_id = ? AND s.status = 'pending')
             ORDER BY c.created_at DESC"
        );
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&query)
            .bind(&company_id.0)
            .bind(&approver_id.0)
            .fetch_all(&self.pool)
            .await?;

        let mut claims = Vec::with_capacity(rows.len());
        for row in &rows {
            claims.push(self.hydrate(row).await?);
        }
        Ok(claims)
    }
}
