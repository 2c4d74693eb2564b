use claimflow_core::config::{AppConfig, LoadOptions};
use serde_json::json;

/// Print the effective configuration after all overlays. There are no
/// credentials in the config, so nothing needs redaction.
pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => serde_json::to_string_pretty(&json!({
            "command": "config",
            "status": "ok",
            "effective": config,
        }))
        .unwrap_or_else(|error| format!("{{\"status\":\"error\",\"message\":\"{error}\"}}")),
        Err(error) => serde_json::to_string_pretty(&json!({
            "command": "config",
            "status": "error",
            "error_class": "config_validation",
            "message": error.to_string(),
        }))
        .unwrap_or_else(|error| format!("{{\"status\":\"error\",\"message\":\"{error}\"}}")),
    }
}
