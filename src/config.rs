use std::{
    path::{Path, PathBuf},
    time::Duration
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;
use validator::Validate;


/// How the listing page is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum PageSourceKind {
    /// A real browser, needed for pages rendered on the client
    #[default]
    Chrome,
    /// A plain http request
    Http
}


/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Deserialize, Validate)]
#[serde(default)]
pub(crate) struct Config {
    /// The job search page to watch
    #[validate(url)]
    pub(crate) target_url: String,
    /// Where settings, keywords and the shortlist are kept
    pub(crate) store_path: PathBuf,
    pub(crate) page_source: PageSourceKind,
    /// Hide the browser window
    pub(crate) headless: bool,
    #[validate(range(min = 1))]
    pub(crate) page_load_timeout_secs: u64,
    /// Number of jobs listed after each scrape
    #[validate(range(min = 1))]
    pub(crate) preview_limit: usize,
    /// Number of jobs listed by `shortlist show`
    #[validate(range(min = 1))]
    pub(crate) shortlist_preview_limit: usize,
    /// If set, notifications are POSTed here as json instead of being logged
    #[validate(url)]
    pub(crate) webhook_url: Option<String>,
    /// Wait before redelivering an unacknowledged message
    pub(crate) retry_delay_ms: u64
}


impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: "https://www.upwork.com/nx/search/jobs/".to_string(),
            store_path: PathBuf::from("shortlister.json"),
            page_source: PageSourceKind::Chrome,
            headless: true,
            page_load_timeout_secs: 60,
            preview_limit: 5,
            shortlist_preview_limit: 50,
            webhook_url: None,
            retry_delay_ms: 1000
        }
    }
}


impl Config {
    /// Reads and validates the config file. A missing file means all defaults.
    pub(crate) async fn load(path: &Path) -> anyhow::Result<Self> {
        let config = match tokio::fs::read_to_string(path).await {
            Ok(contents) => Self::parse(&contents).with_context(|| format!("Invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} not found, using the default configuration", path.display());
                Self::default()
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display()))
        };
        Ok(config)
    }

    fn parse(contents: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub(crate) fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.target_url, "https://www.upwork.com/nx/search/jobs/");
        assert_eq!(config.page_source, PageSourceKind::Chrome);
        assert_eq!(config.page_load_timeout(), Duration::from_secs(60));
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::parse(r#"
            target_url = "https://www.upwork.com/nx/search/jobs/?q=rust"
            store_path = "data/jobs.json"
            page_source = "http"
            headless = false
            preview_limit = 10
            webhook_url = "https://hooks.example.com/jobs"
        "#).unwrap();
        assert_eq!(config.page_source, PageSourceKind::Http);
        assert_eq!(config.store_path, PathBuf::from("data/jobs.json"));
        assert!(!config.headless);
        assert_eq!(config.preview_limit, 10);
        assert_eq!(config.webhook_url.as_deref(), Some("https://hooks.example.com/jobs"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Config::parse(r#"target_url = "not a url""#).is_err());
        assert!(Config::parse("page_load_timeout_secs = 0").is_err());
        assert!(Config::parse(r#"page_source = "firefox""#).is_err());
    }

    #[tokio::test]
    async fn missing_file_is_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).await.unwrap();
        assert_eq!(config.preview_limit, 5);
    }
}
