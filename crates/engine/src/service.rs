//! Claim orchestration: the submission and decision entry points plus the
//! company-scoped listings, wired over the repositories, the FX cache, and
//! the audit sink.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use claimflow_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use claimflow_core::domain::claim::{Claim, ClaimId, DecisionAction};
use claimflow_core::domain::company::{is_valid_currency_code, Company, CompanyId};
use claimflow_core::domain::policy::{ApprovalPolicy, SequenceStep};
use claimflow_core::domain::user::{Role, UserId};
use claimflow_core::errors::EngineError;
use claimflow_core::fx::{Clock, FxCache};
use claimflow_core::sequencer::{apply_decision, new_claim, DecisionError, NewClaimInput};
use claimflow_core::{build_approver_list, RoleRosters};
use claimflow_db::repositories::{
    ClaimRepository, CompanyRepository, PolicyRepository, RepositoryError, UserRepository,
};

/// Authenticated request context, supplied by the transport edge and
/// trusted as-is; the engine performs authorization, not authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitClaimRequest {
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    pub description: String,
    pub spent_on: NaiveDate,
}

/// Audit sink that forwards events to the tracing pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        tracing::info!(
            event_name = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            claim_id = event.claim_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            "audit event"
        );
    }
}

pub struct ClaimService {
    companies: Arc<dyn CompanyRepository>,
    users: Arc<dyn UserRepository>,
    policies: Arc<dyn PolicyRepository>,
    claims: Arc<dyn ClaimRepository>,
    fx: Arc<FxCache>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl ClaimService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        companies: Arc<dyn CompanyRepository>,
        users: Arc<dyn UserRepository>,
        policies: Arc<dyn PolicyRepository>,
        claims: Arc<dyn ClaimRepository>,
        fx: Arc<FxCache>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { companies, users, policies, claims, fx, clock, audit }
    }

    /// Submission entry point.
    ///
    /// Validates input, normalizes the amount into the company currency,
    /// derives the approver list, and persists the claim with its full step
    /// list in one write. Any upstream failure (rate fetch, roster lookup)
    /// aborts before anything is persisted.
    pub async fn submit(
        &self,
        caller: &Identity,
        request: SubmitClaimRequest,
    ) -> Result<Claim, EngineError> {
        let correlation_id = Uuid::new_v4().to_string();
        validate_submission(&request)?;
        let currency = request.currency.trim().to_ascii_uppercase();

        let company = self.load_company(&caller.company_id).await?;
        let employee = self
            .users
            .find_by_id(&caller.user_id)
            .await
            .map_err(storage_error)?
            .filter(|user| user.company_id == company.id)
            .ok_or_else(|| EngineError::NotFound(format!("employee {}", caller.user_id.0)))?;
        let policy = self.load_policy(&company).await?;

        let amount_company = if currency == company.currency_code {
            request.amount
        } else {
            self.fx
                .convert(request.amount, &currency, &company.currency_code)
                .await
                .map_err(|error| EngineError::Upstream(error.to_string()))?
        };

        let rosters = self.load_rosters(&company.id, policy.as_ref()).await?;
        let approvers = build_approver_list(&company, &employee, policy.as_ref(), &rosters);

        let claim = new_claim(
            NewClaimInput {
                company_id: company.id.clone(),
                employee_id: employee.id.clone(),
                amount_original: request.amount,
                currency_original: currency,
                amount_company,
                currency_company: company.currency_code.clone(),
                category: request.category.trim().to_string(),
                description: request.description.trim().to_string(),
                spent_on: request.spent_on,
            },
            approvers,
            self.clock.now(),
        );
        self.claims.insert(&claim).await.map_err(storage_error)?;

        self.audit.emit(
            AuditEvent::new(
                Some(claim.id.clone()),
                correlation_id.clone(),
                "claim.submitted",
                AuditCategory::Submission,
                employee.id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("steps", claim.steps.len().to_string())
            .with_metadata("amount_company", claim.amount_company.to_string()),
        );
        if claim.steps.is_empty() {
            self.audit.emit(AuditEvent::new(
                Some(claim.id.clone()),
                correlation_id,
                "claim.auto_approved",
                AuditCategory::Policy,
                employee.id.0.clone(),
                AuditOutcome::Success,
            ));
        }

        Ok(claim)
    }

    /// Decision entry point.
    ///
    /// The transition is computed on the snapshot this request read and
    /// committed conditionally on that snapshot's version; a concurrent
    /// decision that lands first turns this commit into a `Conflict` the
    /// caller may retry.
    pub async fn decide(
        &self,
        caller: &Identity,
        claim_id: &ClaimId,
        action: DecisionAction,
        comment: Option<String>,
    ) -> Result<Claim, EngineError> {
        let correlation_id = Uuid::new_v4().to_string();
        if !caller.role.can_decide() {
            return Err(EngineError::Authorization(format!(
                "role {} may not decide claims",
                caller.role.as_str()
            )));
        }

        let mut claim = self
            .claims
            .find_by_id(claim_id)
            .await
            .map_err(storage_error)?
            .filter(|claim| claim.company_id == caller.company_id)
            .ok_or_else(|| EngineError::NotFound(format!("claim {}", claim_id.0)))?;

        let company = self.load_company(&claim.company_id).await?;
        let policy = self.load_policy(&company).await?;

        let expected_version = claim.version;
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        let outcome = apply_decision(
            &mut claim,
            &caller.user_id,
            action,
            comment,
            policy.as_ref(),
            self.clock.now(),
        )
        .map_err(|error| match error {
            DecisionError::TerminalState { .. } => EngineError::Conflict(error.to_string()),
            DecisionError::NotActiveApprover { .. } => {
                EngineError::Authorization(error.to_string())
            }
        })?;

        let committed = self
            .claims
            .apply_decision(&claim, outcome.step, expected_version)
            .await
            .map_err(storage_error)?;
        if !committed {
            self.audit.emit(AuditEvent::new(
                Some(claim.id.clone()),
                correlation_id,
                "claim.decision_conflict",
                AuditCategory::Decision,
                caller.user_id.0.clone(),
                AuditOutcome::Rejected,
            ));
            return Err(EngineError::Conflict(format!(
                "claim {} changed concurrently; re-read and retry",
                claim.id.0
            )));
        }
        claim.version = expected_version + 1;

        self.audit.emit(
            AuditEvent::new(
                Some(claim.id.clone()),
                correlation_id.clone(),
                "claim.decision_applied",
                AuditCategory::Decision,
                caller.user_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("step", outcome.step.to_string())
            .with_metadata("action", format!("{:?}", outcome.action))
            .with_metadata("status", format!("{:?}", outcome.status)),
        );
        if claim.is_terminal() {
            self.audit.emit(
                AuditEvent::new(
                    Some(claim.id.clone()),
                    correlation_id,
                    "claim.finalized",
                    AuditCategory::Decision,
                    caller.user_id.0.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("status", format!("{:?}", claim.status))
                .with_metadata("short_circuited", outcome.short_circuited.to_string()),
            );
        }

        Ok(claim)
    }

    /// Claims of the caller's company, newest first; `mine` restricts the
    /// listing to the caller's own submissions.
    pub async fn list_claims(
        &self,
        caller: &Identity,
        mine: bool,
    ) -> Result<Vec<Claim>, EngineError> {
        let employee_filter = mine.then(|| caller.user_id.clone());
        self.claims
            .list_for_company(&caller.company_id, employee_filter.as_ref())
            .await
            .map_err(storage_error)
    }

    /// Pending claims carrying a pending step assigned to the caller.
    pub async fn pending_inbox(&self, caller: &Identity) -> Result<Vec<Claim>, EngineError> {
        if !caller.role.can_decide() {
            return Err(EngineError::Authorization(format!(
                "role {} has no approver inbox",
                caller.role.as_str()
            )));
        }
        self.claims
            .list_pending_for_approver(&caller.company_id, &caller.user_id)
            .await
            .map_err(storage_error)
    }

    async fn load_company(&self, company_id: &CompanyId) -> Result<Company, EngineError> {
        self.companies
            .find_by_id(company_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| EngineError::NotFound(format!("company {}", company_id.0)))
    }

    async fn load_policy(&self, company: &Company) -> Result<Option<ApprovalPolicy>, EngineError> {
        let Some(policy_id) = &company.approval_policy_id else {
            return Ok(None);
        };
        let policy = self
            .policies
            .find_by_id(policy_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| EngineError::NotFound(format!("approval policy {}", policy_id.0)))?;
        Ok(Some(policy))
    }

    async fn load_rosters(
        &self,
        company_id: &CompanyId,
        policy: Option<&ApprovalPolicy>,
    ) -> Result<RoleRosters, EngineError> {
        let mut rosters = RoleRosters::default();
        let Some(policy) = policy else {
            return Ok(rosters);
        };

        let roles: BTreeSet<Role> = policy
            .sequence
            .iter()
            .filter_map(|step| match step {
                SequenceStep::Role(role) => Some(*role),
                SequenceStep::User(_) => None,
            })
            .collect();
        for role in roles {
            let users = self.users.list_by_role(company_id, role).await.map_err(|error| {
                EngineError::Upstream(format!("role roster lookup failed: {error}"))
            })?;
            rosters.insert(role, users.into_iter().map(|user| user.id).collect());
        }
        Ok(rosters)
    }
}

fn validate_submission(request: &SubmitClaimRequest) -> Result<(), EngineError> {
    if request.amount <= Decimal::ZERO {
        return Err(EngineError::Validation(format!(
            "amount must be positive, got {}",
            request.amount
        )));
    }
    let currency = request.currency.trim().to_ascii_uppercase();
    if !is_valid_currency_code(&currency) {
        return Err(EngineError::Validation(format!(
            "currency `{}` is not a 3-letter code",
            request.currency
        )));
    }
    if request.category.trim().is_empty() {
        return Err(EngineError::Validation("category must not be empty".to_string()));
    }
    Ok(())
}

fn storage_error(error: RepositoryError) -> EngineError {
    EngineError::Upstream(format!("storage failure: {error}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use claimflow_core::audit::InMemoryAuditSink;
    use claimflow_core::domain::claim::{Claim, ClaimId, ClaimStatus, DecisionAction, StepStatus};
    use claimflow_core::domain::company::{Company, CompanyId};
    use claimflow_core::domain::policy::{ApprovalPolicy, PolicyId, SequenceStep};
    use claimflow_core::domain::user::{Role, User, UserId};
    use claimflow_core::errors::EngineError;
    use claimflow_core::fx::{FxCache, RateFetchError, RateFetcher, RateTable, SystemClock};
    use claimflow_db::repositories::{
        ClaimRepository, CompanyRepository, InMemoryClaimRepository, InMemoryCompanyRepository,
        InMemoryPolicyRepository, InMemoryUserRepository, PolicyRepository, RepositoryError,
        UserRepository,
    };

    use super::{ClaimService, Identity, SubmitClaimRequest};

    struct FixedRateFetcher;

    #[async_trait::async_trait]
    impl RateFetcher for FixedRateFetcher {
        async fn fetch(&self, base: &str) -> Result<RateTable, RateFetchError> {
            let mut rates = HashMap::new();
            if base == "EUR" {
                rates.insert("USD".to_string(), Decimal::new(11, 1)); // 1.1
            }
            Ok(RateTable { base: base.to_string(), rates })
        }
    }

    struct Fixture {
        service: ClaimService,
        claims: Arc<InMemoryClaimRepository>,
        audit: InMemoryAuditSink,
    }

    struct FixtureConfig {
        manager_first: bool,
        sequence: Vec<SequenceStep>,
        percent_threshold: Option<i64>,
        specific: Vec<&'static str>,
        hybrid_or: bool,
        with_policy: bool,
    }

    impl Default for FixtureConfig {
        fn default() -> Self {
            Self {
                manager_first: false,
                sequence: vec![SequenceStep::Role(Role::Manager)],
                percent_threshold: None,
                specific: Vec::new(),
                hybrid_or: true,
                with_policy: true,
            }
        }
    }

    fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }

    async fn fixture(config: FixtureConfig) -> Fixture {
        let companies = Arc::new(InMemoryCompanyRepository::default());
        let users = Arc::new(InMemoryUserRepository::default());
        let policies = Arc::new(InMemoryPolicyRepository::default());
        let claims = Arc::new(InMemoryClaimRepository::default());
        let audit = InMemoryAuditSink::default();

        companies
            .save(Company {
                id: CompanyId("co-1".to_string()),
                name: "Initech".to_string(),
                country: "United States".to_string(),
                currency_code: "USD".to_string(),
                manager_approver_first: config.manager_first,
                approval_policy_id: config
                    .with_policy
                    .then(|| PolicyId("pol-1".to_string())),
                created_at: now(),
                updated_at: now(),
            })
            .await
            .expect("save company");

        let roster = [
            ("u-emp", Role::Employee, Some("u-mgr")),
            ("u-mgr", Role::Manager, None),
            ("u-fin", Role::Manager, None),
            ("u-cfo", Role::Admin, None),
        ];
        for (id, role, manager) in roster {
            users
                .save(User {
                    id: UserId(id.to_string()),
                    company_id: CompanyId("co-1".to_string()),
                    name: format!("User {id}"),
                    email: format!("{id}@initech.test"),
                    role,
                    manager_id: manager.map(|m| UserId(m.to_string())),
                    created_at: now(),
                    updated_at: now(),
                })
                .await
                .expect("save user");
        }

        if config.with_policy {
            policies
                .save(ApprovalPolicy {
                    id: PolicyId("pol-1".to_string()),
                    company_id: CompanyId("co-1".to_string()),
                    sequence: config.sequence,
                    percent_threshold: config.percent_threshold.map(Decimal::from),
                    specific_approver_ids: config
                        .specific
                        .iter()
                        .map(|id| UserId(id.to_string()))
                        .collect(),
                    hybrid_or: config.hybrid_or,
                    created_at: now(),
                    updated_at: now(),
                })
                .await
                .expect("save policy");
        }

        let fx = Arc::new(FxCache::new(Arc::new(FixedRateFetcher), Arc::new(SystemClock)));
        let service = ClaimService::new(
            companies,
            users,
            policies,
            claims.clone(),
            fx,
            Arc::new(SystemClock),
            Arc::new(audit.clone()),
        );

        Fixture { service, claims, audit }
    }

    fn employee() -> Identity {
        Identity {
            user_id: UserId("u-emp".to_string()),
            company_id: CompanyId("co-1".to_string()),
            role: Role::Employee,
        }
    }

    fn approver(id: &str) -> Identity {
        Identity {
            user_id: UserId(id.to_string()),
            company_id: CompanyId("co-1".to_string()),
            role: Role::Manager,
        }
    }

    fn request(amount: i64, currency: &str) -> SubmitClaimRequest {
        SubmitClaimRequest {
            amount: Decimal::new(amount, 2),
            currency: currency.to_string(),
            category: "travel".to_string(),
            description: "conference".to_string(),
            spent_on: NaiveDate::from_ymd_opt(2026, 6, 10).expect("valid date"),
        }
    }

    #[tokio::test]
    async fn submission_builds_the_step_list_from_the_policy() {
        let fixture = fixture(FixtureConfig {
            manager_first: true,
            ..FixtureConfig::default()
        })
        .await;

        let claim = fixture
            .service
            .submit(&employee(), request(50_00, "USD"))
            .await
            .expect("submit succeeds");

        // Manager first, then the manager roster (u-fin, u-mgr ascending)
        // deduplicated against the manager slot.
        let approvers: Vec<&str> = claim.steps.iter().map(|s| s.approver_id.0.as_str()).collect();
        assert_eq!(approvers, vec!["u-mgr", "u-fin"]);
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.current_step, 1);

        let events = fixture.audit.events();
        assert!(events.iter().any(|e| e.event_type == "claim.submitted"));
    }

    #[tokio::test]
    async fn submission_converts_into_the_company_currency() {
        let fixture = fixture(FixtureConfig::default()).await;

        let claim = fixture
            .service
            .submit(&employee(), request(100_00, "eur"))
            .await
            .expect("submit succeeds");

        assert_eq!(claim.currency_original, "EUR");
        assert_eq!(claim.currency_company, "USD");
        assert_eq!(claim.amount_company, Decimal::new(110_000, 3)); // 100 * 1.1
    }

    #[tokio::test]
    async fn missing_rate_aborts_the_submission_without_persisting() {
        let fixture = fixture(FixtureConfig::default()).await;

        let error = fixture
            .service
            .submit(&employee(), request(100_00, "GBP"))
            .await
            .expect_err("no GBP table");

        assert_eq!(error.kind(), "upstream");
        let listed = fixture
            .service
            .list_claims(&employee(), false)
            .await
            .expect("listing works");
        assert!(listed.is_empty(), "no partial claim may exist");
    }

    #[tokio::test]
    async fn invalid_submissions_are_rejected_up_front() {
        let fixture = fixture(FixtureConfig::default()).await;

        let zero = fixture.service.submit(&employee(), request(0, "USD")).await;
        assert!(matches!(zero, Err(EngineError::Validation(_))));

        let mut bad_currency = request(10_00, "DOLLARS");
        bad_currency.currency = "DOLLARS".to_string();
        let bad = fixture.service.submit(&employee(), bad_currency).await;
        assert!(matches!(bad, Err(EngineError::Validation(_))));

        let mut no_category = request(10_00, "USD");
        no_category.category = "  ".to_string();
        let bad = fixture.service.submit(&employee(), no_category).await;
        assert!(matches!(bad, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_approver_list_auto_approves_at_creation() {
        // Empty policy sequence, manager-first disabled: no approvers.
        let fixture = fixture(FixtureConfig {
            sequence: Vec::new(),
            manager_first: false,
            ..FixtureConfig::default()
        })
        .await;

        let claim = fixture
            .service
            .submit(&employee(), request(25_00, "USD"))
            .await
            .expect("submit succeeds");

        assert_eq!(claim.status, ClaimStatus::Approved);
        assert_eq!(claim.current_step, 0);
        assert!(claim.steps.is_empty());
        let events = fixture.audit.events();
        assert!(events.iter().any(|e| e.event_type == "claim.auto_approved"));
    }

    #[tokio::test]
    async fn decide_requires_an_approver_role() {
        let fixture = fixture(FixtureConfig::default()).await;
        let claim = fixture
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        let error = fixture
            .service
            .decide(&employee(), &claim.id, DecisionAction::Approve, None)
            .await
            .expect_err("employees cannot decide");
        assert_eq!(error.kind(), "authorization");
    }

    #[tokio::test]
    async fn decide_rejects_out_of_turn_approvers() {
        let fixture = fixture(FixtureConfig::default()).await;
        let claim = fixture
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        // Step 1 belongs to u-fin (ascending id order); u-mgr is step 2.
        let error = fixture
            .service
            .decide(&approver("u-mgr"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect_err("not their turn");
        assert_eq!(error.kind(), "authorization");
    }

    #[tokio::test]
    async fn full_sequence_default_approves_when_no_step_rejected() {
        let fixture = fixture(FixtureConfig::default()).await;
        let claim = fixture
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        fixture
            .service
            .decide(&approver("u-fin"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect("step 1");
        let decided = fixture
            .service
            .decide(&approver("u-mgr"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect("step 2");

        assert_eq!(decided.status, ClaimStatus::Approved);
        let events = fixture.audit.events();
        assert!(events.iter().any(|e| e.event_type == "claim.finalized"));
    }

    #[tokio::test]
    async fn three_step_and_mode_threshold_finalizes_only_on_the_last_step() {
        let fixture = fixture(FixtureConfig {
            sequence: vec![
                SequenceStep::User(UserId("u-mgr".to_string())),
                SequenceStep::User(UserId("u-fin".to_string())),
                SequenceStep::User(UserId("u-cfo".to_string())),
            ],
            percent_threshold: Some(67),
            hybrid_or: false,
            ..FixtureConfig::default()
        })
        .await;
        let claim = fixture
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        let after_first = fixture
            .service
            .decide(&approver("u-mgr"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect("step 1");
        assert_eq!(after_first.status, ClaimStatus::Pending);

        let after_second = fixture
            .service
            .decide(&approver("u-fin"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect("step 2");
        assert_eq!(after_second.status, ClaimStatus::Pending, "2/3 stays under 67%");

        let after_third = fixture
            .service
            .decide(&approver("u-cfo"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect("step 3");
        assert_eq!(after_third.status, ClaimStatus::Approved);
    }

    #[tokio::test]
    async fn or_mode_specific_approver_short_circuits() {
        let fixture = fixture(FixtureConfig {
            sequence: vec![
                SequenceStep::User(UserId("u-cfo".to_string())),
                SequenceStep::User(UserId("u-mgr".to_string())),
                SequenceStep::User(UserId("u-fin".to_string())),
            ],
            percent_threshold: Some(50),
            specific: vec!["u-cfo"],
            hybrid_or: true,
            ..FixtureConfig::default()
        })
        .await;
        let claim = fixture
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        let decided = fixture
            .service
            .decide(&approver("u-cfo"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect("cfo decision");

        assert_eq!(decided.status, ClaimStatus::Approved);
        assert_eq!(decided.current_step, 3);
        assert_eq!(decided.steps[1].status, StepStatus::Pending);
        assert_eq!(decided.steps[2].status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn decisions_on_finalized_claims_conflict() {
        let fixture = fixture(FixtureConfig {
            sequence: vec![SequenceStep::User(UserId("u-mgr".to_string()))],
            ..FixtureConfig::default()
        })
        .await;
        let claim = fixture
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        fixture
            .service
            .decide(&approver("u-mgr"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect("finalizing decision");

        let error = fixture
            .service
            .decide(&approver("u-mgr"), &claim.id, DecisionAction::Reject, None)
            .await
            .expect_err("claim is terminal");
        assert_eq!(error.kind(), "conflict");
        assert!(error.retryable());
    }

    /// A read double that always serves the snapshot taken at first read,
    /// simulating two requests that both read the claim before either
    /// committed.
    struct StaleReadClaimRepository {
        inner: Arc<InMemoryClaimRepository>,
        snapshot: tokio::sync::Mutex<Option<Claim>>,
    }

    #[async_trait::async_trait]
    impl ClaimRepository for StaleReadClaimRepository {
        async fn insert(&self, claim: &Claim) -> Result<(), RepositoryError> {
            self.inner.insert(claim).await
        }

        async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
            let mut snapshot = self.snapshot.lock().await;
            if let Some(cached) = snapshot.as_ref() {
                if cached.id == *id {
                    return Ok(Some(cached.clone()));
                }
            }
            let fresh = self.inner.find_by_id(id).await?;
            *snapshot = fresh.clone();
            Ok(fresh)
        }

        async fn apply_decision(
            &self,
            claim: &Claim,
            decided_step: u32,
            expected_version: i64,
        ) -> Result<bool, RepositoryError> {
            self.inner.apply_decision(claim, decided_step, expected_version).await
        }

        async fn list_for_company(
            &self,
            company_id: &CompanyId,
            employee_id: Option<&UserId>,
        ) -> Result<Vec<Claim>, RepositoryError> {
            self.inner.list_for_company(company_id, employee_id).await
        }

        async fn list_pending_for_approver(
            &self,
            company_id: &CompanyId,
            approver_id: &UserId,
        ) -> Result<Vec<Claim>, RepositoryError> {
            self.inner.list_pending_for_approver(company_id, approver_id).await
        }
    }

    #[tokio::test]
    async fn racing_decisions_on_one_step_leave_exactly_one_commit() {
        let base = fixture(FixtureConfig {
            sequence: vec![
                SequenceStep::User(UserId("u-mgr".to_string())),
                SequenceStep::User(UserId("u-fin".to_string())),
            ],
            ..FixtureConfig::default()
        })
        .await;

        // Rebuild the service over a stale-read wrapper so both decide calls
        // observe the same pre-decision snapshot.
        let stale = Arc::new(StaleReadClaimRepository {
            inner: base.claims.clone(),
            snapshot: tokio::sync::Mutex::new(None),
        });
        let claim = base
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        let service = rebuild_with_claims(&base, stale.clone()).await;

        service
            .decide(&approver("u-mgr"), &claim.id, DecisionAction::Approve, None)
            .await
            .expect("first decision commits");

        let error = service
            .decide(&approver("u-mgr"), &claim.id, DecisionAction::Reject, None)
            .await
            .expect_err("second decision saw a stale snapshot");
        assert_eq!(error.kind(), "conflict");

        // The store holds exactly one decided step.
        let stored = base.claims.find_by_id(&claim.id).await.expect("find").expect("exists");
        assert_eq!(stored.version, 2);
        assert_eq!(stored.steps[0].status, StepStatus::Approved);
        assert_eq!(stored.steps[1].status, StepStatus::Pending);
    }

    async fn rebuild_with_claims(
        base: &Fixture,
        claims: Arc<dyn ClaimRepository>,
    ) -> ClaimService {
        // Shares nothing with `base` except the claim store wrapper; the
        // reference data is reseeded into fresh in-memory repositories.
        let companies = Arc::new(InMemoryCompanyRepository::default());
        let users = Arc::new(InMemoryUserRepository::default());
        let policies = Arc::new(InMemoryPolicyRepository::default());

        companies
            .save(Company {
                id: CompanyId("co-1".to_string()),
                name: "Initech".to_string(),
                country: "United States".to_string(),
                currency_code: "USD".to_string(),
                manager_approver_first: false,
                approval_policy_id: None,
                created_at: now(),
                updated_at: now(),
            })
            .await
            .expect("save company");
        for id in ["u-mgr", "u-fin"] {
            users
                .save(User {
                    id: UserId(id.to_string()),
                    company_id: CompanyId("co-1".to_string()),
                    name: format!("User {id}"),
                    email: format!("{id}@initech.test"),
                    role: Role::Manager,
                    manager_id: None,
                    created_at: now(),
                    updated_at: now(),
                })
                .await
                .expect("save user");
        }

        let fx = Arc::new(FxCache::new(Arc::new(FixedRateFetcher), Arc::new(SystemClock)));
        ClaimService::new(
            companies,
            users,
            policies,
            claims,
            fx,
            Arc::new(SystemClock),
            Arc::new(base.audit.clone()),
        )
    }

    #[tokio::test]
    async fn claims_from_other_companies_stay_invisible() {
        let fixture = fixture(FixtureConfig::default()).await;
        let claim = fixture
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        let outsider = Identity {
            user_id: UserId("u-other".to_string()),
            company_id: CompanyId("co-2".to_string()),
            role: Role::Admin,
        };
        let error = fixture
            .service
            .decide(&outsider, &claim.id, DecisionAction::Approve, None)
            .await
            .expect_err("cross-company access is a not-found");
        assert_eq!(error.kind(), "not_found");
    }

    #[tokio::test]
    async fn pending_inbox_is_scoped_to_the_caller() {
        let fixture = fixture(FixtureConfig::default()).await;
        fixture
            .service
            .submit(&employee(), request(10_00, "USD"))
            .await
            .expect("submit");

        let inbox = fixture
            .service
            .pending_inbox(&approver("u-fin"))
            .await
            .expect("inbox for step-1 approver");
        assert_eq!(inbox.len(), 1);

        let employee_inbox = fixture.service.pending_inbox(&employee()).await;
        assert!(matches!(employee_inbox, Err(EngineError::Authorization(_))));
    }
}
