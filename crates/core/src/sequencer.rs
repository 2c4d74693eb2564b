//! Claim lifecycle: step list creation at submission and per-decision state
//! transitions.
//!
//! Pure functions over `Claim` values; callers own persistence and must
//! commit results under an optimistic version check.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::claim::{
    ApprovalStep, Claim, ClaimId, ClaimStatus, DecisionAction, StepStatus,
};
use crate::domain::company::CompanyId;
use crate::domain::policy::ApprovalPolicy;
use crate::domain::user::UserId;
use crate::rules::{evaluate_conditional_rule, RuleVerdict};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewClaimInput {
    pub company_id: CompanyId,
    pub employee_id: UserId,
    pub amount_original: Decimal,
    pub currency_original: String,
    pub amount_company: Decimal,
    pub currency_company: String,
    pub category: String,
    pub description: String,
    pub spent_on: NaiveDate,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("claim {claim_id} is already finalized as {status:?}")]
    TerminalState { claim_id: ClaimId, status: ClaimStatus },
    #[error("claim {claim_id} is not awaiting a decision from approver {approver_id}")]
    NotActiveApprover { claim_id: ClaimId, approver_id: UserId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    /// The step the decision was recorded on.
    pub step: u32,
    pub action: DecisionAction,
    /// Claim status after the transition.
    pub status: ClaimStatus,
    /// True when the conditional rule finalized the claim ahead of the
    /// remaining steps.
    pub short_circuited: bool,
}

/// Create a claim with its full approval step list.
///
/// All N steps are created pending, numbered 1..N in approver-list order,
/// and the list is never resized afterward. With no approvers the claim is
/// born approved with `current_step = 0`.
pub fn new_claim(input: NewClaimInput, approvers: Vec<UserId>, now: DateTime<Utc>) -> Claim {
    let steps: Vec<ApprovalStep> = approvers
        .into_iter()
        .enumerate()
        .map(|(index, approver_id)| ApprovalStep {
            approver_id,
            step: index as u32 + 1,
            status: StepStatus::Pending,
            comment: None,
            decided_at: None,
        })
        .collect();

    let (status, current_step) = if steps.is_empty() {
        (ClaimStatus::Approved, 0)
    } else {
        (ClaimStatus::Pending, 1)
    };

    Claim {
        id: ClaimId(Uuid::new_v4().to_string()),
        company_id: input.company_id,
        employee_id: input.employee_id,
        amount_original: input.amount_original,
        currency_original: input.currency_original,
        amount_company: input.amount_company,
        currency_company: input.currency_company,
        category: input.category,
        description: input.description,
        spent_on: input.spent_on,
        status,
        current_step,
        steps,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

/// Record one approver's decision on the active step and transition the
/// claim.
///
/// Preconditions: the claim is pending and the active step belongs to
/// `approver_id` with a pending status; violations leave the claim
/// untouched. After recording, the conditional rule is consulted:
/// - rule satisfied: finalize approved immediately, parking the pointer at
///   the last step; undecided later steps stay pending and are moot;
/// - otherwise, a non-final step advances the pointer (a rejection here does
///   NOT reject the claim — the rule could still be satisfied later);
/// - at the final step the rule gets one last look, then the claim
///   finalizes: rejected if any step rejected, approved otherwise.
pub fn apply_decision(
    claim: &mut Claim,
    approver_id: &UserId,
    action: DecisionAction,
    comment: Option<String>,
    policy: Option<&ApprovalPolicy>,
    now: DateTime<Utc>,
) -> Result<DecisionOutcome, DecisionError> {
    if claim.status != ClaimStatus::Pending {
        return Err(DecisionError::TerminalState {
            claim_id: claim.id.clone(),
            status: claim.status,
        });
    }

    let claim_id = claim.id.clone();
    let decided_step = claim.current_step;
    let total = claim.steps.len() as u32;

    {
        let active = claim.steps.iter_mut().find(|step| step.step == decided_step);
        let Some(step) = active else {
            return Err(DecisionError::NotActiveApprover {
                claim_id,
                approver_id: approver_id.clone(),
            });
        };
        if step.approver_id != *approver_id || step.status != StepStatus::Pending {
            return Err(DecisionError::NotActiveApprover {
                claim_id,
                approver_id: approver_id.clone(),
            });
        }

        step.status = match action {
            DecisionAction::Approve => StepStatus::Approved,
            DecisionAction::Reject => StepStatus::Rejected,
        };
        step.comment = comment;
        step.decided_at = Some(now);
    }

    let mut short_circuited = false;
    match evaluate_conditional_rule(&claim.steps, policy) {
        RuleVerdict::Approved => {
            claim.status = ClaimStatus::Approved;
            claim.current_step = total;
            short_circuited = true;
        }
        RuleVerdict::Undecided if claim.current_step < total => {
            claim.current_step += 1;
        }
        RuleVerdict::Undecided => {
            // Last step decided and still inconclusive: one final look at the
            // rule, then default-approve unless something explicitly rejected.
            claim.status = match evaluate_conditional_rule(&claim.steps, policy) {
                RuleVerdict::Approved => ClaimStatus::Approved,
                RuleVerdict::Undecided if claim.has_rejected_step() => ClaimStatus::Rejected,
                RuleVerdict::Undecided => ClaimStatus::Approved,
            };
        }
    }
    claim.updated_at = now;

    Ok(DecisionOutcome { step: decided_step, action, status: claim.status, short_circuited })
}
