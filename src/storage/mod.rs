use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::{fs::DirBuilder, sync::Mutex};

use crate::error::StoreError;

mod preferences;

pub(crate) use preferences::{Preferences, Settings};


/// A small persistent key-value store. Absent keys are simply missing from the result of `get`.
#[async_trait]
pub(crate) trait KvStore: Send + Sync {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError>;
    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError>;
}


/// Keeps every key in a single json object on disk.
pub(crate) struct JsonFileStore {
    path: PathBuf,
    // serializes read-modify-write cycles within this process
    write_lock: Mutex<()>
}


impl JsonFileStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into())
        }
    }
}


#[async_trait]
impl KvStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let mut all = self.read_all().await?;
        Ok(keys
            .iter()
            .filter_map(|key| all.remove(*key).map(|value| (key.to_string(), value)))
            .collect())
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read_all().await?;
        all.extend(entries);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            DirBuilder::new().recursive(true).create(parent).await?;
        }
        // write next to the target and rename, so readers never see half a file
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(&all)?).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}


#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryStore {
    entries: Mutex<Map<String, Value>>
}


#[cfg(test)]
#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let entries = self.entries.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError> {
        self.entries.lock().await.extend(entries);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entries(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.get(&["refreshMinutes"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_merges_keys_and_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::new(&path);
        store.set(entries(json!({ "refreshMinutes": 5, "keywords": ["rust"] }))).await.unwrap();
        store.set(entries(json!({ "scrapePaused": true }))).await.unwrap();

        let reopened = JsonFileStore::new(&path);
        let values = reopened.get(&["refreshMinutes", "scrapePaused", "missing"]).await.unwrap();
        assert_eq!(Value::Object(values), json!({ "refreshMinutes": 5, "scrapePaused": true }));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(&path).get(&["keywords"]).await.unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[tokio::test]
    async fn memory_store_behaves_like_the_file_store() {
        let store = MemoryStore::default();
        store.set(entries(json!({ "a": 1, "b": 2 }))).await.unwrap();
        store.set(entries(json!({ "a": 3 }))).await.unwrap();
        assert_eq!(Value::Object(store.get(&["a", "b", "c"]).await.unwrap()), json!({ "a": 3, "b": 2 }));
    }
}
