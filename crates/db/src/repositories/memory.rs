use std::collections::HashMap;

use tokio::sync::RwLock;

use claimflow_core::domain::claim::{Claim, ClaimId, StepStatus};
use claimflow_core::domain::company::{Company, CompanyId};
use claimflow_core::domain::policy::{ApprovalPolicy, PolicyId};
use claimflow_core::domain::user::{Role, User, UserId};

use super::{
    ClaimRepository, CompanyRepository, PolicyRepository, RepositoryError, UserRepository,
};

#[derive(Default)]
pub struct InMemoryCompanyRepository {
    companies: RwLock<HashMap<String, Company>>,
}

#[async_trait::async_trait]
impl CompanyRepository for InMemoryCompanyRepository {
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id.0).cloned())
    }

    async fn save(&self, company: Company) -> Result<(), RepositoryError> {
        let mut companies = self.companies.write().await;
        companies.insert(company.id.0.clone(), company);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn list_by_role(
        &self,
        company_id: &CompanyId,
        role: Role,
    ) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut matching: Vec<User> = users
            .values()
            .filter(|user| user.company_id == *company_id && user.role == role)
            .cloned()
            .collect();
        // Same contract as the SQL store: ascending identity order.
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matching)
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPolicyRepository {
    policies: RwLock<HashMap<String, ApprovalPolicy>>,
}

#[async_trait::async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn find_by_id(&self, id: &PolicyId) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let policies = self.policies.read().await;
        Ok(policies.get(&id.0).cloned())
    }

    async fn find_by_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Option<ApprovalPolicy>, RepositoryError> {
        let policies = self.policies.read().await;
        Ok(policies.values().find(|policy| policy.company_id == *company_id).cloned())
    }

    async fn save(&self, policy: ApprovalPolicy) -> Result<(), RepositoryError> {
        let mut policies = self.policies.write().await;
        policies.insert(policy.id.0.clone(), policy);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryClaimRepository {
    claims: RwLock<HashMap<String, Claim>>,
}

#[async_trait::async_trait]
impl ClaimRepository for InMemoryClaimRepository {
    async fn insert(&self, claim: &Claim) -> Result<(), RepositoryError> {
        let mut claims = self.claims.write().await;
        claims.insert(claim.id.0.clone(), claim.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let claims = self.claims.read().await;
        Ok(claims.get(&id.0).cloned())
    }

    async fn apply_decision(
        &self,
        claim: &Claim,
        _decided_step: u32,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        // Compare-and-swap under the write lock, mirroring the SQL store's
        // conditional update.
        let mut claims = self.claims.write().await;
        let Some(stored) = claims.get_mut(&claim.id.0) else {
            return Ok(false);
        };
        if stored.version != expected_version {
            return Ok(false);
        }
        let mut next = claim.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(true)
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
        employee_id: Option<&UserId>,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let claims = self.claims.read().await;
        let mut matching: Vec<Claim> = claims
            .values()
            .filter(|claim| claim.company_id == *company_id)
            .filter(|claim| employee_id.map_or(true, |id| claim.employee_id == *id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn list_pending_for_approver(
        &self,
        company_id: &CompanyId,
        approver_id: &UserId,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let claims = self.claims.read().await;
        let mut matching: Vec<Claim> = claims
            .values()
            .filter(|claim| claim.company_id == *company_id && !claim.is_terminal())
            .filter(|claim| {
                claim.steps.iter().any(|step| {
                    step.approver_id == *approver_id && step.status == StepStatus::Pending
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}
