mod d1;
mod datasource;
mod frame;
mod health;
mod instance;
mod routes;
mod settings;
#[cfg(test)]
mod test_support;

use crate::d1::{D1Client, DEFAULT_API_BASE_URL};
use crate::datasource::Timeouts;
use crate::instance::InstanceManager;
use env_logger::Env;
use log::{error, info};
use serde::Deserialize;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_redoc::Redoc;
use utoipa_redoc::Servable;

fn get_default_port() -> u16 {
    8080
}

fn get_default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn get_default_query_timeout_secs() -> u64 {
    30
}

fn get_default_health_timeout_secs() -> u64 {
    10
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(default = "get_default_port")]
    port: u16,
    #[serde(default = "get_default_api_base_url")]
    api_base_url: String,
    #[serde(default = "get_default_query_timeout_secs")]
    query_timeout_secs: u64,
    #[serde(default = "get_default_health_timeout_secs")]
    health_timeout_secs: u64,
}

#[derive(Debug, Clone)]
struct AppState {
    instances: Arc<InstanceManager>,
}

#[derive(OpenApi)]
#[openapi(info(description = "Grafana data source backend for Cloudflare D1"))]
struct ApiDoc;

async fn run() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let config = envy::from_env::<Config>()?;

    let instances = Arc::new(InstanceManager::new(
        D1Client::new(config.api_base_url.clone()),
        Timeouts {
            query: Duration::from_secs(config.query_timeout_secs),
            health: Duration::from_secs(config.health_timeout_secs),
        },
    ));

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(routes::query_data))
        .routes(routes!(routes::check_health))
        .split_for_parts();

    info!(
        "Starting on port {} against {}",
        config.port, config.api_base_url
    );
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    axum::serve(
        listener,
        router
            .merge(Redoc::with_url("/redoc", api))
            .with_state(AppState { instances }),
    )
    .await?;

    Ok(())
}

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            exit(1)
        }
    };

    if let Err(err) = rt.block_on(run()) {
        error!("{}", err);
        exit(1)
    }
}
