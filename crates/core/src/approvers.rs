//! Approver list derivation for a claim at submission time.

use std::collections::{BTreeMap, HashSet};

use crate::domain::company::Company;
use crate::domain::policy::{ApprovalPolicy, SequenceStep};
use crate::domain::user::{Role, User, UserId};

/// Resolves role-tagged sequence steps to concrete users.
///
/// Implementations must return users in ascending identity order: the order
/// feeds deduplication and therefore approver precedence, so it has to be
/// deterministic.
pub trait RoleDirectory {
    fn users_with_role(&self, role: Role) -> Vec<UserId>;
}

/// A prefetched role directory, built by the service layer from one roster
/// query per distinct role in the policy sequence.
#[derive(Clone, Debug, Default)]
pub struct RoleRosters {
    rosters: BTreeMap<Role, Vec<UserId>>,
}

impl RoleRosters {
    pub fn insert(&mut self, role: Role, mut users: Vec<UserId>) {
        // Sort on insert so callers cannot accidentally feed an unstable order.
        users.sort();
        self.rosters.insert(role, users);
    }
}

impl RoleDirectory for RoleRosters {
    fn users_with_role(&self, role: Role) -> Vec<UserId> {
        self.rosters.get(&role).cloned().unwrap_or_default()
    }
}

/// Build the ordered, deduplicated approver list for one claim.
///
/// Candidates accumulate as: the employee's manager first (when the company
/// toggle is on and a manager is set), then each policy sequence step in
/// order. Deduplication keeps the first occurrence, so an identity reached
/// through the manager slot and again through a ROLE or USER step approves
/// at its earliest position only.
///
/// An empty result is the auto-approval path, not an error.
pub fn build_approver_list(
    company: &Company,
    employee: &User,
    policy: Option<&ApprovalPolicy>,
    directory: &dyn RoleDirectory,
) -> Vec<UserId> {
    let mut candidates = Vec::new();

    if company.manager_approver_first {
        if let Some(manager_id) = &employee.manager_id {
            candidates.push(manager_id.clone());
        }
    }

    if let Some(policy) = policy {
        for step in &policy.sequence {
            match step {
                SequenceStep::Role(role) => candidates.extend(directory.users_with_role(*role)),
                SequenceStep::User(user_id) => candidates.push(user_id.clone()),
            }
        }
    }

    let mut seen = HashSet::new();
    candidates.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
