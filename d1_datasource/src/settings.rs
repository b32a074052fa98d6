use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

pub const API_TOKEN_KEY: &str = "apiToken";

/// Data source settings as delivered by the host with every request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    pub uid: String,
    #[serde(default)]
    pub updated: i64,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub json_data: Map<String, Value>,
    #[serde(default)]
    pub decrypted_secure_json_data: HashMap<String, String>,
}

#[derive(Clone, PartialEq, Eq, Default)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        ApiToken(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("ApiToken(<empty>)")
        } else {
            f.write_str("ApiToken(<redacted>)")
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretPluginSettings {
    pub api_token: ApiToken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub database_id: String,
    #[serde(skip)]
    pub secrets: SecretPluginSettings,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("could not unmarshal plugin settings json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum MissingField {
    #[error("Account ID is missing")]
    AccountId,
    #[error("Database ID is missing")]
    DatabaseId,
    #[error("API Token is missing")]
    ApiToken,
}

impl PluginSettings {
    pub fn load(source: &InstanceSettings) -> Result<Self, SettingsError> {
        let mut settings: PluginSettings =
            serde_json::from_value(Value::Object(source.json_data.clone()))?;
        if let Some(token) = source.decrypted_secure_json_data.get(API_TOKEN_KEY) {
            settings.secrets.api_token = ApiToken::new(token.as_str());
        }
        Ok(settings)
    }

    /// Reports the first required field that is empty.
    pub fn validate(&self) -> Result<(), MissingField> {
        if self.account_id.is_empty() {
            return Err(MissingField::AccountId);
        }
        if self.database_id.is_empty() {
            return Err(MissingField::DatabaseId);
        }
        if self.secrets.api_token.is_empty() {
            return Err(MissingField::ApiToken);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance(json_data: Value, token: Option<&str>) -> InstanceSettings {
        InstanceSettings {
            uid: "d1".to_string(),
            updated: 1,
            json_data: json_data.as_object().cloned().unwrap_or_default(),
            decrypted_secure_json_data: token
                .map(|t| HashMap::from([(API_TOKEN_KEY.to_string(), t.to_string())]))
                .unwrap_or_default(),
        }
    }

    #[test]
    fn loads_plain_and_secret_fields() {
        let settings = PluginSettings::load(&instance(
            json!({"accountId": "acc", "databaseId": "db"}),
            Some("secret-token"),
        ))
        .unwrap();
        assert_eq!(settings.account_id, "acc");
        assert_eq!(settings.database_id, "db");
        assert_eq!(settings.secrets.api_token.expose(), "secret-token");
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn missing_fields_are_reported_in_order() {
        let settings = PluginSettings::load(&instance(json!({}), None)).unwrap();
        assert_eq!(settings.validate(), Err(MissingField::AccountId));

        let settings =
            PluginSettings::load(&instance(json!({"accountId": "acc"}), None)).unwrap();
        assert_eq!(settings.validate(), Err(MissingField::DatabaseId));

        let settings = PluginSettings::load(&instance(
            json!({"accountId": "acc", "databaseId": "db"}),
            Some(""),
        ))
        .unwrap();
        assert_eq!(settings.validate(), Err(MissingField::ApiToken));
    }

    #[test]
    fn malformed_json_data_is_rejected() {
        let err = PluginSettings::load(&instance(json!({"accountId": 42}), None)).unwrap_err();
        assert!(err.to_string().starts_with("could not unmarshal plugin settings json"));
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let settings = PluginSettings::load(&instance(
            json!({"accountId": "acc", "databaseId": "db"}),
            Some("super-secret"),
        ))
        .unwrap();
        let printed = format!("{settings:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn instance_settings_decode_from_host_json() {
        let source: InstanceSettings = serde_json::from_value(json!({
            "uid": "abc",
            "updated": 1700000000,
            "jsonData": {"accountId": "acc", "databaseId": "db"},
            "decryptedSecureJsonData": {"apiToken": "t"}
        }))
        .unwrap();
        assert_eq!(source.uid, "abc");
        assert_eq!(PluginSettings::load(&source).unwrap().database_id, "db");
    }
}
