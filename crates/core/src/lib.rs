pub mod approvers;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod fx;
pub mod rules;
pub mod sequencer;

pub use approvers::{build_approver_list, RoleDirectory, RoleRosters};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::claim::{ApprovalStep, Claim, ClaimId, ClaimStatus, DecisionAction, StepStatus};
pub use domain::company::{is_valid_currency_code, Company, CompanyId};
pub use domain::policy::{ApprovalPolicy, PolicyId, SequenceStep};
pub use domain::user::{Role, User, UserId};
pub use errors::EngineError;
pub use fx::{Clock, FxCache, FxError, RateFetchError, RateFetcher, RateTable, SystemClock};
pub use rules::{evaluate_conditional_rule, RuleVerdict};
pub use sequencer::{apply_decision, new_claim, DecisionError, DecisionOutcome, NewClaimInput};
