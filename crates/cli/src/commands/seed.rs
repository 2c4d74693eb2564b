use claimflow_core::config::{AppConfig, LoadOptions};
use claimflow_db::{connect_with_settings, migrations, seed_demo_dataset};

use crate::commands::{block_on, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let outcome = match block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        let summary = seed_demo_dataset(&pool)
            .await
            .map_err(|error| ("seed", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(summary)
    }) {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::failure("seed", "runtime_init", error, 3),
    };

    match outcome {
        Ok(summary) => CommandResult::success(
            "seed",
            format!(
                "seeded company {} with policy {} and {} users",
                summary.company_id, summary.policy_id, summary.users
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
