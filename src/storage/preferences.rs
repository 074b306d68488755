use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::{error::StoreError, shortlist::KeywordSet};

use super::KvStore;

const REFRESH_MINUTES_KEY: &str = "refreshMinutes";
const PAUSED_KEY: &str = "scrapePaused";
const KEYWORDS_KEY: &str = "keywords";
const DEFAULT_REFRESH_MINUTES: u32 = 10;


/// User controlled scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub(crate) struct Settings {
    /// Minutes between two scheduled scrapes
    #[validate(range(min = 1))]
    pub(crate) refresh_minutes: u32,
    /// When set, the scheduler does not trigger any scrape
    pub(crate) paused: bool
}


impl Default for Settings {
    fn default() -> Self {
        Self { refresh_minutes: DEFAULT_REFRESH_MINUTES, paused: false }
    }
}


impl Settings {
    pub(crate) fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_minutes) * 60)
    }
}


/// Settings and keywords, persisted in a [`KvStore`] and shared by every component that needs them.
#[derive(Clone)]
pub(crate) struct Preferences {
    store: Arc<dyn KvStore>
}


impl Preferences {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn settings(&self) -> Result<Settings, StoreError> {
        let values = self.store.get(&[REFRESH_MINUTES_KEY, PAUSED_KEY]).await?;
        let defaults = Settings::default();
        Ok(Settings {
            refresh_minutes: values
                .get(REFRESH_MINUTES_KEY)
                .and_then(Value::as_u64)
                .and_then(|minutes| u32::try_from(minutes).ok())
                .filter(|minutes| *minutes >= 1)
                .unwrap_or(defaults.refresh_minutes),
            paused: values
                .get(PAUSED_KEY)
                .and_then(Value::as_bool)
                .unwrap_or(defaults.paused)
        })
    }

    /// Rejects intervals shorter than a minute.
    pub(crate) async fn set_refresh_minutes(&self, minutes: u32) -> anyhow::Result<Settings> {
        let settings = Settings { refresh_minutes: minutes, ..self.settings().await? };
        settings.validate()?;
        self.put(REFRESH_MINUTES_KEY, json!(minutes)).await?;
        Ok(settings)
    }

    pub(crate) async fn set_paused(&self, paused: bool) -> Result<(), StoreError> {
        self.put(PAUSED_KEY, json!(paused)).await
    }

    pub(crate) async fn keywords(&self) -> Result<KeywordSet, StoreError> {
        let mut values = self.store.get(&[KEYWORDS_KEY]).await?;
        Ok(values
            .remove(KEYWORDS_KEY)
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default())
    }

    pub(crate) async fn save_keywords(&self, keywords: &KeywordSet) -> Result<(), StoreError> {
        self.put(KEYWORDS_KEY, serde_json::to_value(keywords)?).await
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = Map::new();
        entries.insert(key.to_string(), value);
        self.store.set(entries).await
    }
}
