use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::policy::PolicyId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

/// A company scopes users, the approval policy, and the reporting currency
/// every claim amount is normalized into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub country: String,
    pub currency_code: String,
    /// When set, an employee's direct manager becomes the first approver
    /// candidate on every claim, ahead of the policy sequence.
    pub manager_approver_first: bool,
    pub approval_policy_id: Option<PolicyId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A currency code is three ASCII uppercase letters (ISO 4217 shape; the
/// engine does not keep a currency registry).
pub fn is_valid_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::is_valid_currency_code;

    #[test]
    fn accepts_three_letter_uppercase_codes() {
        assert!(is_valid_currency_code("USD"));
        assert!(is_valid_currency_code("EUR"));
    }

    #[test]
    fn rejects_malformed_codes() {
        assert!(!is_valid_currency_code("usd"));
        assert!(!is_valid_currency_code("US"));
        assert!(!is_valid_currency_code("DOLL"));
        assert!(!is_valid_currency_code("U1D"));
        assert!(!is_valid_currency_code(""));
    }
}
