//! Durable configuration store seam.

use crate::error::ConfigError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Durable `{key -> stringified value}` storage.
///
/// Read wholesale at startup, upserted on every write. Implementations
/// connect to the actual database; [`MemoryConfigStore`] serves tests and
/// single-node setups.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// All rows, for the startup load.
    async fn list_all(&self) -> Result<Vec<(String, String)>, ConfigError>;

    /// Insert or replace one row.
    async fn upsert(&self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// In-memory store for tests and single-node operation.
#[derive(Default)]
pub struct MemoryConfigStore {
    rows: Mutex<BTreeMap<String, String>>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with rows.
    pub fn with_rows(rows: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            rows: Mutex::new(rows.into_iter().collect()),
        }
    }

    fn rows(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, ConfigError> {
        self.rows.lock().map_err(|_| ConfigError::Store {
            reason: "config store poisoned".to_string(),
        })
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn list_all(&self) -> Result<Vec<(String, String)>, ConfigError> {
        let rows = self.rows()?;
        Ok(rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    async fn upsert(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut rows = self.rows()?;
        rows.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
