pub mod types;

use crate::d1::types::{ApiMessage, QueryRequest, RawResponse};
use crate::settings::{MissingField, PluginSettings};
use log::{debug, error};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Clone)]
pub struct D1Client {
    http: Client,
    base_url: String,
}

impl D1Client {
    pub fn new(base_url: impl Into<String>) -> Self {
        D1Client {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn raw_query_url(&self, settings: &PluginSettings) -> String {
        format!(
            "{}/accounts/{}/d1/database/{}/raw",
            self.base_url, settings.account_id, settings.database_id
        )
    }

    /// Runs one statement against the `/raw` endpoint. One call is one attempt.
    pub async fn raw_query(
        &self,
        settings: &PluginSettings,
        sql: &str,
        timeout: Duration,
    ) -> Result<RawResponse, D1Error> {
        settings.validate()?;
        let body = serde_json::to_vec(&QueryRequest { sql }).map_err(D1Error::Marshal)?;

        debug!(
            "Executing D1 query on account {} database {}",
            settings.account_id, settings.database_id
        );
        let res = self
            .http
            .post(self.raw_query_url(settings))
            .bearer_auth(settings.secrets.api_token.expose())
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(D1Error::Transport)?;

        let status = res.status();
        let body = res.text().await.map_err(D1Error::Transport)?;
        if !status.is_success() {
            error!("D1 API request failed with status {status}: {body}");
            return Err(D1Error::UpstreamHttp { status, body });
        }

        let response: RawResponse = match serde_json::from_str(&body) {
            Ok(response) => response,
            Err(source) => {
                error!("Error decoding D1 response: {source}");
                return Err(D1Error::Decode { source, body });
            }
        };
        for message in &response.messages {
            debug!("D1 message {}: {}", message.code, message.message);
        }
        if !response.success {
            let err = D1Error::UpstreamApi(response.errors);
            error!("{err}");
            return Err(err);
        }
        Ok(response)
    }
}

#[derive(Error, Debug)]
pub enum D1Error {
    #[error("missing configuration: {0}")]
    Config(#[from] MissingField),
    #[error("error marshalling D1 query payload: {0}")]
    Marshal(#[source] serde_json::Error),
    #[error("error executing D1 API request: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("D1 API request failed with status {status}. Response: {body}")]
    UpstreamHttp { status: StatusCode, body: String },
    #[error("D1 API error: {}", join_api_errors(.0))]
    UpstreamApi(Vec<ApiMessage>),
    #[error("error decoding D1 API response: {source}. Body: {body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

fn join_api_errors(errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return "request was not successful".to_string();
    }
    errors
        .iter()
        .map(|err| format!("Code {}: {}", err.code, err.message))
        .collect::<Vec<_>>()
        .join("; ")
}
