use crate::d1::D1Client;
use crate::datasource::{Datasource, Timeouts};
use crate::settings::{InstanceSettings, SettingsError};
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Caches one datasource per uid and rebuilds it when the host reports newer settings.
///
/// A rebuilt instance replaces the old entry under the same uid, so the map holds at most
/// one instance per data source the host has asked about. Entries for data sources deleted
/// on the host are kept until the process restarts, the same as the Grafana SDK's
/// instance manager, which is never told about deletions either.
#[derive(Debug)]
pub struct InstanceManager {
    client: D1Client,
    timeouts: Timeouts,
    instances: Mutex<HashMap<String, Arc<Datasource>>>,
}

impl InstanceManager {
    pub fn new(client: D1Client, timeouts: Timeouts) -> Self {
        InstanceManager {
            client,
            timeouts,
            instances: Default::default(),
        }
    }

    pub async fn get(&self, source: &InstanceSettings) -> Result<Arc<Datasource>, SettingsError> {
        let mut instances = self.instances.lock().await;
        if let Some(existing) = instances.get(&source.uid) {
            if existing.updated() == source.updated {
                return Ok(existing.clone());
            }
        }

        let datasource = Arc::new(Datasource::new(
            source,
            self.client.clone(),
            self.timeouts,
        )?);
        if instances
            .insert(source.uid.clone(), datasource.clone())
            .is_some()
        {
            info!("Settings of datasource {} changed, disposing old instance", source.uid);
        } else {
            info!("Created datasource instance {}", source.uid);
        }
        Ok(datasource)
    }

    #[cfg(test)]
    async fn cached(&self) -> usize {
        self.instances.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> InstanceManager {
        InstanceManager::new(
            D1Client::new("http://127.0.0.1:9"),
            Timeouts {
                query: Duration::from_secs(1),
                health: Duration::from_secs(1),
            },
        )
    }

    fn source(uid: &str, updated: i64, json_data: serde_json::Value) -> InstanceSettings {
        InstanceSettings {
            uid: uid.to_string(),
            updated,
            json_data: json_data.as_object().cloned().unwrap_or_default(),
            decrypted_secure_json_data: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn reuses_instance_for_unchanged_settings() {
        let manager = manager();
        let a = manager
            .get(&source("one", 1, json!({"accountId": "acc"})))
            .await
            .unwrap();
        let b = manager
            .get(&source("one", 1, json!({"accountId": "acc"})))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn rebuilds_instance_when_settings_change() {
        let manager = manager();
        let a = manager.get(&source("one", 1, json!({}))).await.unwrap();
        let b = manager.get(&source("one", 2, json!({}))).await.unwrap();
        let c = manager.get(&source("two", 2, json!({}))).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&b, &c));
        assert_eq!(b.updated(), 2);
    }

    #[tokio::test]
    async fn replaced_instances_do_not_accumulate() {
        let manager = manager();
        for updated in 1..=5 {
            manager.get(&source("one", updated, json!({}))).await.unwrap();
        }
        assert_eq!(manager.cached().await, 1);

        manager.get(&source("two", 1, json!({}))).await.unwrap();
        assert_eq!(manager.cached().await, 2);
    }

    #[tokio::test]
    async fn malformed_settings_are_not_cached() {
        let manager = manager();
        assert!(
            manager
                .get(&source("one", 1, json!({"databaseId": []})))
                .await
                .is_err()
        );
        assert!(manager.get(&source("one", 1, json!({}))).await.is_ok());
    }
}
