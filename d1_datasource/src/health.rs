use crate::d1::D1Client;
use crate::settings::PluginSettings;
use common::models::CheckHealthResult;
use log::warn;
use std::time::Duration;

pub const HEALTH_QUERY: &str = "SELECT 1;";
pub const HEALTH_OK_MESSAGE: &str = "Successfully connected to Cloudflare D1 and executed test query.";

/// Validates settings, then sends a `SELECT 1;` probe. Never retried.
pub async fn check_health(
    client: &D1Client,
    settings: &PluginSettings,
    timeout: Duration,
) -> CheckHealthResult {
    match client.raw_query(settings, HEALTH_QUERY, timeout).await {
        Ok(_) => CheckHealthResult::ok(HEALTH_OK_MESSAGE),
        Err(err) => {
            warn!("Health check failed: {err}");
            CheckHealthResult::error(err.to_string())
        }
    }
}
