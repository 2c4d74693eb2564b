use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Approve,
    Reject,
}

/// One approver's slot in a claim's ordered approval list.
///
/// Step numbers are 1-based and contiguous; the list is created whole at
/// submission and never reordered or resized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    pub approver_id: UserId,
    pub step: u32,
    pub status: StepStatus,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// An employee expense claim moving through its approval sequence.
///
/// `current_step` points at the single active `ApprovalStep` (0 when the
/// claim required no approvers and was born approved). `version` backs the
/// optimistic-concurrency check on decision commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: ClaimId,
    pub company_id: CompanyId,
    pub employee_id: UserId,
    pub amount_original: Decimal,
    pub currency_original: String,
    pub amount_company: Decimal,
    pub currency_company: String,
    pub category: String,
    pub description: String,
    pub spent_on: NaiveDate,
    pub status: ClaimStatus,
    pub current_step: u32,
    pub steps: Vec<ApprovalStep>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    pub fn is_terminal(&self) -> bool {
        self.status != ClaimStatus::Pending
    }

    /// The step whose number equals `current_step`, if any.
    pub fn active_step(&self) -> Option<&ApprovalStep> {
        let current = self.current_step;
        self.steps.iter().find(|step| step.step == current)
    }

    pub fn has_rejected_step(&self) -> bool {
        self.steps.iter().any(|step| step.status == StepStatus::Rejected)
    }
}
