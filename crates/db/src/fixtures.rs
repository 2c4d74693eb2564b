//! Deterministic demo dataset for local operation and smoke checks.
//!
//! Ids are fixed so reruns upsert instead of multiplying rows, and so
//! operator tooling can reference the seeded entities by name.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use claimflow_core::domain::company::{Company, CompanyId};
use claimflow_core::domain::policy::{ApprovalPolicy, PolicyId, SequenceStep};
use claimflow_core::domain::user::{Role, User, UserId};

use crate::repositories::{
    CompanyRepository, PolicyRepository, RepositoryError, SqlCompanyRepository,
    SqlPolicyRepository, SqlUserRepository, UserRepository,
};
use crate::DbPool;

pub const DEMO_COMPANY_ID: &str = "co-demo";
pub const DEMO_ADMIN_ID: &str = "u-demo-admin";
pub const DEMO_MANAGER_ID: &str = "u-demo-manager";
pub const DEMO_CFO_ID: &str = "u-demo-cfo";
pub const DEMO_EMPLOYEE_ID: &str = "u-demo-employee";
pub const DEMO_POLICY_ID: &str = "pol-demo";

#[derive(Clone, Debug, Serialize)]
pub struct SeedSummary {
    pub company_id: String,
    pub policy_id: String,
    pub users: u32,
}

/// Seed one company with an approval policy and a small user roster:
/// an admin, a manager (the employee's manager), a CFO, and an employee.
///
/// The policy routes claims through all managers and then the CFO, with an
/// OR-mode rule: 60% approval or a CFO approval finalizes early.
pub async fn seed_demo_dataset(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
    let now = Utc::now();

    let companies = SqlCompanyRepository::new(pool.clone());
    let users = SqlUserRepository::new(pool.clone());
    let policies = SqlPolicyRepository::new(pool.clone());

    companies
        .save(Company {
            id: CompanyId(DEMO_COMPANY_ID.to_string()),
            name: "Acme Robotics".to_string(),
            country: "United States".to_string(),
            currency_code: "USD".to_string(),
            manager_approver_first: true,
            approval_policy_id: Some(PolicyId(DEMO_POLICY_ID.to_string())),
            created_at: now,
            updated_at: now,
        })
        .await?;

    let roster = [
        (DEMO_ADMIN_ID, "Avery Admin", "admin@acme.test", Role::Admin, None),
        (DEMO_MANAGER_ID, "Morgan Manager", "manager@acme.test", Role::Manager, None),
        (DEMO_CFO_ID, "Casey Finance", "cfo@acme.test", Role::Manager, None),
        (
            DEMO_EMPLOYEE_ID,
            "Emery Employee",
            "employee@acme.test",
            Role::Employee,
            Some(DEMO_MANAGER_ID),
        ),
    ];
    for (id, name, email, role, manager) in roster {
        users
            .save(User {
                id: UserId(id.to_string()),
                company_id: CompanyId(DEMO_COMPANY_ID.to_string()),
                name: name.to_string(),
                email: email.to_string(),
                role,
                manager_id: manager.map(|m| UserId(m.to_string())),
                created_at: now,
                updated_at: now,
            })
            .await?;
    }

    policies
        .save(ApprovalPolicy {
            id: PolicyId(DEMO_POLICY_ID.to_string()),
            company_id: CompanyId(DEMO_COMPANY_ID.to_string()),
            sequence: vec![
                SequenceStep::Role(Role::Manager),
                SequenceStep::User(UserId(DEMO_CFO_ID.to_string())),
            ],
            percent_threshold: Some(Decimal::from(60)),
            specific_approver_ids: vec![UserId(DEMO_CFO_ID.to_string())],
            hybrid_or: true,
            created_at: now,
            updated_at: now,
        })
        .await?;

    Ok(SeedSummary {
        company_id: DEMO_COMPANY_ID.to_string(),
        policy_id: DEMO_POLICY_ID.to_string(),
        users: roster.len() as u32,
    })
}
