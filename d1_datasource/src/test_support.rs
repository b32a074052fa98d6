use crate::settings::{ApiToken, PluginSettings, SecretPluginSettings};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::routing::post;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub fn settings_for(account_id: &str, database_id: &str, token: &str) -> PluginSettings {
    PluginSettings {
        account_id: account_id.to_string(),
        database_id: database_id.to_string(),
        secrets: SecretPluginSettings {
            api_token: ApiToken::new(token),
        },
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Clone)]
struct UpstreamState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    replies: Arc<dyn Fn(&serde_json::Value) -> (StatusCode, String) + Send + Sync>,
    delay: Duration,
}

/// In-process stand-in for the D1 `/raw` endpoint.
pub struct MockUpstream {
    base_url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockUpstream {
    pub async fn start(status: StatusCode, body: &str) -> Self {
        Self::start_delayed(status, body, Duration::ZERO).await
    }

    pub async fn start_delayed(status: StatusCode, body: &str, delay: Duration) -> Self {
        let body = body.to_string();
        Self::start_with(move |_| (status, body.clone()), delay).await
    }

    /// Replies based on the decoded JSON body of each request.
    pub async fn start_with<F>(replies: F, delay: Duration) -> Self
    where
        F: Fn(&serde_json::Value) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let calls = Arc::new(Mutex::new(vec![]));
        let state = UpstreamState {
            calls: calls.clone(),
            replies: Arc::new(replies),
            delay,
        };
        let router = Router::new()
            .route("/accounts/{account}/d1/database/{database}/raw", post(raw))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        MockUpstream {
            base_url: format!("http://{addr}"),
            calls,
        }
    }

    pub async fn unreachable_base_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    pub fn base_url(&self) -> String {
        self.base_url.clone()
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }
}

async fn raw(
    State(state): State<UpstreamState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
    };
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state.calls.lock().await.push(RecordedCall {
        path: uri.path().to_string(),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body: body.clone(),
    });
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (state.replies)(&body)
}
