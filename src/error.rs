use std::time::Duration;

use thiserror::Error;


/// Failures of a single scrape cycle.
#[derive(Debug, Error)]
pub(crate) enum ScrapeError {
    /// The page that was handed to the scraper is not the listing page.
    ///
    /// The display text is shown to the user as is.
    #[error("Please open {expected} and run again.")]
    NotListingPage {
        expected: String,
        actual: String
    },
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector {
        selector: String,
        reason: String
    },
    #[error("card link `{href}` could not be resolved")]
    MalformedUrl {
        href: String,
        #[source]
        source: url::ParseError
    },
    #[error("page did not finish loading within {0:?}")]
    PageLoadTimeout(Duration),
    #[error("failed to load the listing page")]
    Browser(#[source] anyhow::Error)
}


#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("failed to access the store file: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contents are not valid json: {0}")]
    Json(#[from] serde_json::Error)
}
