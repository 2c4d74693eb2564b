use async_trait::async_trait;
use thiserror::Error;

use claimflow_core::domain::claim::{Claim, ClaimId};
use claimflow_core::domain::company::{Company, CompanyId};
use claimflow_core::domain::policy::{ApprovalPolicy, PolicyId};
use claimflow_core::domain::user::{Role, User, UserId};

pub mod claim;
pub mod company;
pub mod memory;
pub mod policy;
pub mod user;

pub use claim::SqlClaimRepository;
pub use company::SqlCompanyRepository;
pub use memory::{
    InMemoryClaimRepository, InMemoryCompanyRepository, InMemoryPolicyRepository,
    InMemoryUserRepository,
};
pub use policy::SqlPolicyRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    async fn save(&self, company: Company) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    /// All users of a company holding `role`, in ascending identity order.
    /// The order is part of the contract: it feeds approver-list
    /// deduplication, so it must be stable across calls and stores.
    async fn list_by_role(
        &self,
        company_id: &CompanyId,
        role: Role,
    ) -> Result<Vec<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError>;
    async fn find_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalPolicy>, RepositoryError>;
    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ClaimRepository: Send + Sync {
    /// Persist a freshly submitted claim together with its full step list,
    /// atomically.
    async fn insert(&self, claim: &Claim) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError>;

    /// Commit one decision: the claim header and the decided step row are
    /// written in a single transaction, conditional on `expected_version`
    /// still being the stored version. Returns `false` when the version
    /// moved underneath the caller (a concurrent decision won the race) and
    /// nothing was written.
    async fn apply_decision(
        &self,
        claim: &Claim,
        decided_step: u32,
        expected_version: i64,
    ) -> Result<bool, RepositoryError>;

    /// Claims of a company, newest first, optionally restricted to one
    /// employee's submissions.
    async fn list_for_company(
        &self,
        company_id: &CompanyId,
        employee_id: Option<&UserId>,
    ) -> Result<Vec<Claim>, RepositoryError>;

    /// Approver inbox: pending claims carrying a pending step assigned to
    /// `approver_id`, newest first.
    async fn list_pending_for_approver(
        &self,
        company_id: &CompanyId,
        approver_id: &UserId,
    ) -> Result<Vec<Claim>, RepositoryError>;
}
