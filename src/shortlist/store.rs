use std::sync::Arc;

use chrono::{DateTime, Utc};
use fxhash::FxHashMap;
use serde_json::Map;

use crate::{error::StoreError, page_scrapers::JobRecord, storage::KvStore};

const SHORTLIST_KEY: &str = "shortlist";
const UPDATED_AT_KEY: &str = "shortlistUpdatedAt";


/// Shortlisted jobs, at most one per id, in the order their ids were first stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Shortlist {
    records: Vec<JobRecord>,
    index: FxHashMap<String, usize>
}


/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MergeReport {
    /// Records whose id was not stored before
    pub(crate) added: Vec<JobRecord>,
    /// Number of stored records that were replaced
    pub(crate) replaced: usize
}


impl Shortlist {
    pub(crate) fn from_records(records: Vec<JobRecord>) -> Self {
        let mut shortlist = Self::default();
        shortlist.merge(records);
        shortlist
    }

    /// Inserts every incoming record under its key. An incoming record replaces a stored
    /// one with the same key entirely, keeping its position.
    pub(crate) fn merge(&mut self, incoming: impl IntoIterator<Item = JobRecord>) -> MergeReport {
        let mut report = MergeReport::default();
        for mut record in incoming {
            let key = record.key();
            record.id = key.clone();
            match self.index.get(&key) {
                Some(&position) => {
                    self.records[position] = record;
                    report.replaced += 1;
                }
                None => {
                    self.index.insert(key, self.records.len());
                    self.records.push(record.clone());
                    report.added.push(record);
                }
            }
        }
        report
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: &str) -> Option<&JobRecord> {
        self.index.get(id).map(|&position| &self.records[position])
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// At most `limit` records, oldest first.
    pub(crate) fn preview(&self, limit: usize) -> &[JobRecord] {
        &self.records[..limit.min(self.records.len())]
    }
}


/// The [`Shortlist`] as persisted in a [`KvStore`], with the time it last changed.
#[derive(Clone)]
pub(crate) struct ShortlistStore {
    store: Arc<dyn KvStore>
}


impl ShortlistStore {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn load(&self) -> Result<Shortlist, StoreError> {
        let mut values = self.store.get(&[SHORTLIST_KEY]).await?;
        let records: Vec<JobRecord> = values
            .remove(SHORTLIST_KEY)
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(Shortlist::from_records(records))
    }

    /// Merges `incoming` into the stored shortlist and persists the result.
    pub(crate) async fn merge(&self, incoming: Vec<JobRecord>) -> Result<MergeReport, StoreError> {
        let mut shortlist = self.load().await?;
        let report = shortlist.merge(incoming);
        self.persist(&shortlist).await?;
        Ok(report)
    }

    pub(crate) async fn clear(&self) -> Result<(), StoreError> {
        self.persist(&Shortlist::default()).await
    }

    pub(crate) async fn preview(&self, limit: usize) -> Result<Vec<JobRecord>, StoreError> {
        Ok(self.load().await?.preview(limit).to_vec())
    }

    pub(crate) async fn updated_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut values = self.store.get(&[UPDATED_AT_KEY]).await?;
        Ok(values
            .remove(UPDATED_AT_KEY)
            .map(serde_json::from_value)
            .transpose()?)
    }

    async fn persist(&self, shortlist: &Shortlist) -> Result<(), StoreError> {
        let mut entries = Map::new();
        entries.insert(SHORTLIST_KEY.to_string(), serde_json::to_value(&shortlist.records)?);
        entries.insert(UPDATED_AT_KEY.to_string(), serde_json::to_value(Utc::now())?);
        self.store.set(entries).await
    }
}
