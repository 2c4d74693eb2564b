use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use claimflow_core::config::{AppConfig, ConfigError, LoadOptions};
use claimflow_core::fx::{FxCache, SystemClock};
use claimflow_db::repositories::{
    SqlClaimRepository, SqlCompanyRepository, SqlPolicyRepository, SqlUserRepository,
};
use claimflow_db::{connect_with_settings, migrations, DbPool};
use claimflow_engine::{ClaimService, TracingAuditSink};
use claimflow_rates::HttpRateFetcher;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<ClaimService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("rate client initialization failed: {0}")]
    RateClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let fetcher = HttpRateFetcher::new(config.rates.base_url.clone(), config.rates.timeout_secs)
        .map_err(BootstrapError::RateClient)?;
    let fx = Arc::new(FxCache::new(Arc::new(fetcher), Arc::new(SystemClock)));

    let service = Arc::new(ClaimService::new(
        Arc::new(SqlCompanyRepository::new(db_pool.clone())),
        Arc::new(SqlUserRepository::new(db_pool.clone())),
        Arc::new(SqlPolicyRepository::new(db_pool.clone())),
        Arc::new(SqlClaimRepository::new(db_pool.clone())),
        fx,
        Arc::new(SystemClock),
        Arc::new(TracingAuditSink),
    ));

    Ok(Application { config, db_pool, service })
}
