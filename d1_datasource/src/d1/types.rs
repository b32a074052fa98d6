use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// D1 sends `"result": null` on some failures
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest<'a> {
    pub sql: &'a str,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ApiMessage {
    pub code: i64,
    pub message: String,
}

/// Top level body of the `/raw` endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: Vec<RawResultItem>,
    pub success: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<ApiMessage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<ApiMessage>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[allow(dead_code)]
pub struct RawResultItem {
    // absent for statements that produce no rows
    #[serde(default)]
    pub results: Option<RawResults>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: Meta,
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawResults {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
#[allow(dead_code)]
pub struct Meta {
    pub served_by: Option<String>,
    pub duration: Option<f64>,
    pub changes: Option<u64>,
    pub last_row_id: Option<i64>,
    pub changed_db: Option<bool>,
    pub size_after: Option<u64>,
    pub rows_read: Option<u64>,
    pub rows_written: Option<u64>,
}
