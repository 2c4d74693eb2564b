//! Conditional short-circuit evaluation over a claim's decision set.

use rust_decimal::Decimal;

use crate::domain::claim::{ApprovalStep, StepStatus};
use crate::domain::policy::ApprovalPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleVerdict {
    /// Accumulated decisions already satisfy the policy; the claim can be
    /// finalized regardless of remaining steps.
    Approved,
    /// No verdict yet; the sequence continues.
    Undecided,
}

/// Evaluate the conditional rule against the full (possibly partial) step
/// list. Pure: same inputs always yield the same verdict.
///
/// Each condition is tri-state. `None` means "not configured" and is
/// distinct from "configured but failing": in OR mode an unconfigured
/// condition cannot satisfy the rule, in AND mode it is vacuously satisfied.
/// With neither condition configured, AND mode never short-circuits and the
/// sequencer's end-of-sequence default decides. Without a policy at all the
/// verdict is always `Undecided`.
pub fn evaluate_conditional_rule(
    steps: &[ApprovalStep],
    policy: Option<&ApprovalPolicy>,
) -> RuleVerdict {
    let Some(policy) = policy else {
        return RuleVerdict::Undecided;
    };

    let total = steps.len();
    let approved: Vec<&ApprovalStep> =
        steps.iter().filter(|step| step.status == StepStatus::Approved).collect();

    let percent = if total > 0 {
        Decimal::from(approved.len() as u64 * 100) / Decimal::from(total as u64)
    } else {
        Decimal::ZERO
    };

    let percent_pass = policy.percent_threshold.map(|threshold| percent >= threshold);
    let specific_pass = if policy.specific_approver_ids.is_empty() {
        None
    } else {
        Some(approved.iter().any(|step| policy.specific_approver_ids.contains(&step.approver_id)))
    };

    let satisfied = if policy.hybrid_or {
        percent_pass == Some(true) || specific_pass == Some(true)
    } else {
        (percent_pass.is_some() || specific_pass.is_some())
            && percent_pass.unwrap_or(true)
            && specific_pass.unwrap_or(true)
    };

    if satisfied {
        RuleVerdict::Approved
    } else {
        RuleVerdict::Undecided
    }
}
