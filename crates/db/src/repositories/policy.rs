use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::Row;

use claimflow_core::domain::company::CompanyId;
use claimflow_core::domain::policy::{ApprovalPolicy, PolicyId, SequenceStep};
use claimflow_core::domain::user::UserId;

use super::company::parse_timestamp;
use super::{PolicyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPolicyRepository {
    pool: DbPool,
}

impl SqlPolicyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const POLICY_COLUMNS: &str = "id, company_id, sequence_json, percent_threshold,
                              specific_approvers_json, hybrid_or, created_at, updated_at";

fn row_to_policy(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalPolicy, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_id: String =
        row.try_get("company_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sequence_json: String =
        row.try_get("sequence_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let percent_threshold: Option<String> =
        row.try_get("percent_threshold").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let specific_json: String = row
        .try_get("specific_approvers_json")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let hybrid_or: bool =
        row.try_get("hybrid_or").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let sequence: Vec<SequenceStep> = serde_json::from_str(&sequence_json)
        .map_err(|e| RepositoryError::Decode(format!("bad sequence json: {e}")))?;
    let specific_approver_ids: Vec<UserId> = serde_json::from_str(&specific_json)
        .map_err(|e| RepositoryError::Decode(format!("bad specific approvers json: {e}")))?;
    let percent_threshold = percent_threshold
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|e| RepositoryError::Decode(format!("bad percent threshold `{raw}`: {e}")))
        })
        .transpose()?;

    Ok(ApprovalPolicy {
        id: PolicyId(id),
        company_id: CompanyId(company_id),
        sequence,
        percent_threshold,
        specific_approver_ids,
        hybrid_or,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl PolicyRepository for SqlPolicyRepository {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let query = format!("SELECT {POLICY_COLUMNS} FROM approval_policy WHERE id = ?");
        let row = sqlx::query(&query).bind(&id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_policy(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let query = format!("SELECT {POLICY_COLUMNS} FROM approval_policy WHERE company_id = ?");
        let row = sqlx::query(&query).bind(&company_id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_policy(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        let sequence_json = serde_json::to_string(&policy.sequence)
            .map_err(|e| RepositoryError::Decode(format!("encode sequence: {e}")))?;
        let specific_json = serde_json::to_string(&policy.specific_approver_ids)
            .map_err(|e| RepositoryError::Decode(format!("encode specific approvers: {e}")))?;

        sqlx::query(
            "INSERT INTO approval_policy (id, company_id, sequence_json, percent_threshold,
                                          specific_approvers_json, hybrid_or, created_at,
                                          updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 sequence_json = excluded.sequence_json,
                 percent_threshold = excluded.percent_threshold,
                 specific_approvers_json = excluded.specific_approvers_json,
                 hybrid_or = excluded.hybrid_or,
                 updated_at = excluded.updated_at",
        )
        .bind(&policy.id.0)
        .bind(&policy.company_id.0)
        .bind(sequence_json)
        .bind(policy.percent_threshold.map(|t| t.to_string()))
        .bind(specific_json)
        .bind(policy.hybrid_or)
        .bind(policy.created_at.to_rfc3339())
        .bind(policy.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
