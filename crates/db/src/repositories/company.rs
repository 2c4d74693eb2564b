use chrono::{DateTime, Utc};
use sqlx::Row;

use claimflow_core::domain::company::{Company, CompanyId};
use claimflow_core::domain::policy::PolicyId;

use super::{CompanyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCompanyRepository {
    pool: DbPool,
}

impl SqlCompanyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("bad {column} timestamp `{raw}`: {e}")))
}

fn row_to_company(row: &sqlx::sqlite::SqliteRow) -> Result<Company, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let country: String =
        row.try_get("country").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let currency_code: String =
        row.try_get("currency_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_approver_first: bool = row
        .try_get("manager_approver_first")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approval_policy_id: Option<String> =
        row.try_get("approval_policy_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Company {
        id: CompanyId(id),
        name,
        country,
        currency_code,
        manager_approver_first,
        approval_policy_id: approval_policy_id.map(PolicyId),
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl CompanyRepository for SqlCompanyRepository {
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, country, currency_code, manager_approver_first,
                    approval_policy_id, created_at, updated_at
             FROM company WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_company(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, company: Company) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO company (id, name, country, currency_code, manager_approver_first,
                                  approval_policy_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 country = excluded.country,
                 currency_code = excluded.currency_code,
                 manager_approver_first = excluded.manager_approver_first,
                 approval_policy_id = excluded.approval_policy_id,
                 updated_at = excluded.updated_at",
        )
        .bind(&company.id.0)
        .bind(&company.name)
        .bind(&company.country)
        .bind(&company.currency_code)
        .bind(company.manager_approver_first)
        .bind(company.approval_policy_id.as_ref().map(|p| p.0.clone()))
        .bind(company.created_at.to_rfc3339())
        .bind(company.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use claimflow_core::domain::company::{Company, CompanyId};
    use claimflow_core::domain::policy::PolicyId;

    use super::SqlCompanyRepository;
    use crate::repositories::CompanyRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_company(id: &str) -> Company {
        let now = Utc::now();
        Company {
            id: CompanyId(id.to_string()),
            name: "Globex".to_string(),
            country: "Germany".to_string(),
            currency_code: "EUR".to_string(),
            manager_approver_first: true,
            approval_policy_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let pool = setup().await;
        let repo = SqlCompanyRepository::new(pool);

        let company = sample_company("co-1");
        repo.save(company.clone()).await.expect("save");

        let found = repo
            .find_by_id(&CompanyId("co-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.name, company.name);
        assert_eq!(found.currency_code, "EUR");
        assert!(found.manager_approver_first);
        assert_eq!(found.approval_policy_id, None);
    }

    #[tokio::test]
    async fn save_upserts_policy_reference() {
        let pool = setup().await;
        let repo = SqlCompanyRepository::new(pool);

        let mut company = sample_company("co-1");
        repo.save(company.clone()).await.expect("save");

        company.approval_policy_id = Some(PolicyId("pol-1".to_string()));
        company.updated_at = Utc::now();
        repo.save(company).await.expect("upsert");

        let found = repo
            .find_by_id(&CompanyId("co-1".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(found.approval_policy_id, Some(PolicyId("pol-1".to_string())));
    }

    #[tokio::test]
    async fn missing_company_is_none() {
        let pool = setup().await;
        let repo = SqlCompanyRepository::new(pool);

        let found = repo.find_by_id(&CompanyId("co-missing".to_string())).await.expect("find");
        assert!(found.is_none());
    }
}
