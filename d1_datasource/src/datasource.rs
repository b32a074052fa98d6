use crate::d1::{D1Client, D1Error};
use crate::frame::to_frame;
use crate::health::check_health;
use crate::settings::{InstanceSettings, PluginSettings, SettingsError};
use common::models::{CheckHealthResult, DataResponse, Frame};
use futures::future::join_all;
use log::{debug, error};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Copy, Clone)]
pub struct Timeouts {
    pub query: Duration,
    pub health: Duration,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub ref_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub json: serde_json::Value,
}

/// Query editor model. Text that is empty or only whitespace is rejected before any
/// request is sent, which is stricter than rejecting only `""`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryModel {
    #[serde(default)]
    query_text: String,
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("json unmarshal query: {0}")]
    InvalidQuery(#[source] serde_json::Error),
    #[error("empty query text")]
    EmptyQuery,
    #[error(transparent)]
    D1(#[from] D1Error),
}

/// One configured data source. Immutable once built.
#[derive(Debug)]
pub struct Datasource {
    settings: PluginSettings,
    updated: i64,
    client: D1Client,
    timeouts: Timeouts,
}

impl Datasource {
    pub fn new(
        source: &InstanceSettings,
        client: D1Client,
        timeouts: Timeouts,
    ) -> Result<Self, SettingsError> {
        Ok(Datasource {
            settings: PluginSettings::load(source)?,
            updated: source.updated,
            client,
            timeouts,
        })
    }

    pub fn updated(&self) -> i64 {
        self.updated
    }

    /// Runs every query independently; a failure only affects its own response.
    pub async fn query_data(&self, queries: &[DataQuery]) -> BTreeMap<String, DataResponse> {
        join_all(queries.iter().map(|query| async move {
            let response = match self.query(query).await {
                Ok(frame) => DataResponse::ok(frame),
                Err(err) => {
                    error!("Query {} failed: {err}", query.ref_id);
                    DataResponse::error(err.to_string())
                }
            };
            (query.ref_id.clone(), response)
        }))
        .await
        .into_iter()
        .collect()
    }

    pub async fn query(&self, query: &DataQuery) -> Result<Frame, QueryError> {
        let model: QueryModel =
            serde_json::from_value(query.json.clone()).map_err(QueryError::InvalidQuery)?;
        if model.query_text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        debug!("Executing query {}: {}", query.ref_id, model.query_text);
        let response = self
            .client
            .raw_query(&self.settings, &model.query_text, self.timeouts.query)
            .await?;
        Ok(to_frame(&query.ref_id, &model.query_text, &response))
    }

    pub async fn check_health(&self) -> CheckHealthResult {
        check_health(&self.client, &self.settings, self.timeouts.health).await
    }
}
