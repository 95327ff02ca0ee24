//! # Synced Configuration Cache
//!
//! Process-wide cache over a durable store, replicated to peer processes
//! by broadcasting every write on the [`CONFIG_CHANNEL`] channel. Peers
//! apply remote updates to their own cache without re-persisting; only the
//! originating process touches the store.

use crate::error::ConfigError;
use crate::store::ConfigStore;
use crate::value::ConfigValue;
use crate::CONFIG_CHANNEL;
use relay_broker::Broker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// The change-notification payload: `{"key": ..., "value": <stringified>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigUpdate {
    key: String,
    value: String,
}

/// Cross-process configuration cache.
///
/// Cloning yields another handle to the same cache; clones are what the
/// background persist and listener tasks hold.
#[derive(Clone)]
pub struct SyncedConfig {
    store: Arc<dyn ConfigStore>,
    broker: Arc<dyn Broker>,
    cache: Arc<RwLock<HashMap<String, ConfigValue>>>,
}

impl SyncedConfig {
    /// Create an empty cache over a store and a broker handle.
    pub fn new(store: Arc<dyn ConfigStore>, broker: Arc<dyn Broker>) -> Self {
        Self {
            store,
            broker,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ConfigValue>> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ConfigValue>> {
        self.cache
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load all rows from the durable store into the cache.
    ///
    /// Each stored string is coerced once through [`ConfigValue::parse`].
    /// Returns a snapshot of the resulting cache.
    pub async fn load(&self) -> Result<HashMap<String, ConfigValue>, ConfigError> {
        let rows = self.store.list_all().await?;
        let mut cache = self.write_cache();
        for (key, raw) in rows {
            cache.insert(key, ConfigValue::parse(&raw));
        }
        Ok(cache.clone())
    }

    /// Read a value from the local cache.
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        self.read_cache().get(key).cloned()
    }

    /// Integer convenience accessor with a default.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.as_int()).unwrap_or(default)
    }

    /// Float convenience accessor with a default.
    pub fn get_float(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.as_float()).unwrap_or(default)
    }

    /// Boolean convenience accessor with a default.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Durably persist a value and broadcast the change to peers.
    pub async fn persist(&self, key: &str, value: &ConfigValue) -> Result<(), ConfigError> {
        let stringified = value.to_string();
        self.store.upsert(key, &stringified).await?;

        let update = ConfigUpdate {
            key: key.to_string(),
            value: stringified,
        };
        let payload = serde_json::to_string(&update)?;
        self.broker.publish(CONFIG_CHANNEL, &payload).await?;
        debug!(key, "Config change broadcast");
        Ok(())
    }

    /// Update the local cache now; persist and broadcast in the background.
    ///
    /// The returned handle is the persist task: callers may await it to
    /// observe persistence failure, or drop it for fire-and-forget. The
    /// task logs its own failure either way.
    pub fn set(&self, key: &str, value: impl Into<ConfigValue>) -> JoinHandle<Result<(), ConfigError>> {
        let value = value.into();
        self.write_cache().insert(key.to_string(), value.clone());

        let this = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let result = this.persist(&key, &value).await;
            if let Err(e) = &result {
                error!(key = %key, error = %e, "Background config persist failed");
            }
            result
        })
    }

    /// Subscribe to peer updates and apply them to the local cache.
    ///
    /// Each received `{key, value}` payload is coerced and applied; a
    /// malformed payload is logged and dropped without stopping the
    /// listener. The task ends when the broker side closes.
    pub async fn start_listener(&self) -> Result<JoinHandle<()>, ConfigError> {
        let mut subscription = self.broker.subscribe(CONFIG_CHANNEL).await?;
        let this = self.clone();

        Ok(tokio::spawn(async move {
            while let Some(raw) = subscription.recv().await {
                match serde_json::from_str::<ConfigUpdate>(&raw) {
                    Ok(update) => {
                        let value = ConfigValue::parse(&update.value);
                        this.write_cache().insert(update.key, value);
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropped malformed config update");
                    }
                }
            }
            debug!("Config listener stopped");
        }))
    }
}
