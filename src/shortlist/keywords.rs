use serde::{Deserialize, Serialize};

use crate::page_scrapers::JobRecord;


/// Keywords the user is looking for, in the order they were added.
///
/// Matching and deduplication ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct KeywordSet(Vec<String>);


impl KeywordSet {
    /// Adds a trimmed keyword. Returns false if it is blank or already present in any case.
    pub(crate) fn insert(&mut self, keyword: &str) -> bool {
        let keyword = keyword.trim();
        if keyword.is_empty() || self.position(keyword).is_some() {
            return false;
        }
        self.0.push(keyword.to_string());
        true
    }

    pub(crate) fn remove(&mut self, keyword: &str) -> bool {
        match self.position(keyword.trim()) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false
        }
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn position(&self, keyword: &str) -> Option<usize> {
        let keyword = keyword.to_lowercase();
        self.0.iter().position(|existing| existing.to_lowercase() == keyword)
    }

    /// An empty set accepts everything. Otherwise some keyword must occur in the
    /// title, snippet or skills of `job`.
    pub(crate) fn matches(&self, job: &JobRecord) -> bool {
        if self.is_empty() {
            return true;
        }
        let haystack = format!("{} {} {}", job.title, job.snippet, job.skills.join(" ")).to_lowercase();
        self.0.iter().any(|keyword| haystack.contains(&keyword.to_lowercase()))
    }
}


impl<S: AsRef<str>> FromIterator<S> for KeywordSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut keywords = Self::default();
        for keyword in iter {
            keywords.insert(keyword.as_ref());
        }
        keywords
    }
}


/// The records of `batch` that match `keywords`, in their original order.
pub(crate) fn shortlist(batch: &[JobRecord], keywords: &KeywordSet) -> Vec<JobRecord> {
    batch.iter().filter(|job| keywords.matches(job)).cloned().collect()
}
