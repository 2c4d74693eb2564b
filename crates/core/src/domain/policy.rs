use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::user::{Role, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

/// One slot in a policy's ordered approver sequence: either every company
/// user holding a role, or one specific user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceStep {
    Role(Role),
    User(UserId),
}

/// Company-level approval configuration: the ordered sequence plus the
/// conditional short-circuit rule.
///
/// `percent_threshold` and `specific_approver_ids` are independently
/// optional. An unset threshold and an empty approver set both mean "not
/// configured", which the evaluator treats as inapplicable rather than
/// failing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalPolicy {
    pub id: PolicyId,
    pub company_id: CompanyId,
    /// Order is significant and preserved end to end.
    pub sequence: Vec<SequenceStep>,
    /// Short-circuit once approved/total reaches this percentage, in [0, 100].
    pub percent_threshold: Option<Decimal>,
    /// Unordered; an approval by any member can short-circuit.
    pub specific_approver_ids: Vec<UserId>,
    /// true: threshold OR specific approver suffices; false: every
    /// configured condition must hold.
    pub hybrid_or: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalPolicy {
    /// Administrative writes go through this before persisting.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(threshold) = self.percent_threshold {
            if threshold < Decimal::ZERO || threshold > Decimal::from(100) {
                return Err(format!("percent threshold {threshold} is outside [0, 100]"));
            }
        }
        Ok(())
    }
}
