use crate::AppState;
use crate::datasource::DataQuery;
use crate::settings::{InstanceSettings, SettingsError};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::models::{CheckHealthResult, DataResponse};
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    pub data_source_instance_settings: InstanceSettings,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryDataRequest {
    pub plugin_context: PluginContext,
    #[serde(default)]
    pub queries: Vec<DataQuery>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryDataResponse {
    pub responses: BTreeMap<String, DataResponse>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckHealthRequest {
    pub plugin_context: PluginContext,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RouteError {
    pub location: &'static str,
    pub error: String,
}

type GenerateErrorResponse = (StatusCode, Json<RouteError>);

#[utoipa::path(post, path = "/api/v1/query", request_body = QueryDataRequest, responses((status = OK, body = QueryDataResponse), (status = UNPROCESSABLE_ENTITY, body = RouteError)), description = "Execute queries against the configured D1 database")]
pub async fn query_data(
    state: State<AppState>,
    body: Json<QueryDataRequest>,
) -> Result<Json<QueryDataResponse>, GenerateErrorResponse> {
    let datasource = state
        .instances
        .get(&body.plugin_context.data_source_instance_settings)
        .await
        .map_err(|err| {
            error!("Error while handling query request: {err}");
            err_to_response(err)
        })?;
    let responses = datasource.query_data(&body.queries).await;
    Ok(Json(QueryDataResponse { responses }))
}

#[utoipa::path(post, path = "/api/v1/health", request_body = CheckHealthRequest, responses((status = OK, body = CheckHealthResult)), description = "Check connectivity to the configured D1 database")]
pub async fn check_health(
    state: State<AppState>,
    body: Json<CheckHealthRequest>,
) -> Json<CheckHealthResult> {
    match state
        .instances
        .get(&body.plugin_context.data_source_instance_settings)
        .await
    {
        Ok(datasource) => Json(datasource.check_health().await),
        Err(err) => {
            error!("Error while handling health request: {err}");
            Json(CheckHealthResult::error(format!(
                "Plugin settings not loaded correctly: {err}"
            )))
        }
    }
}

fn err_to_response(err: SettingsError) -> GenerateErrorResponse {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(RouteError {
            location: "settings",
            error: err.to_string(),
        }),
    )
}
