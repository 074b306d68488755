use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::ScrapeError,
    messaging::{EventBus, ScrapeEvent},
    notify::{Notification, Notifier}
};

use self::{
    cards::{CardLocator, CardStrategy},
    fields::{FieldExtractor, FieldRule}
};

mod cards;
mod fields;
pub(crate) mod upwork;


/// Cards processed between two voluntary yields back to the runtime.
const YIELD_EVERY: usize = 15;
pub(crate) const NOTIFICATION_TITLE: &str = "Job Shortlister";


/// One job posting as it was rendered on the listing page.
///
/// Every field is free text taken straight from the page. Missing fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct JobRecord {
    /// Deduplication key, see [`JobRecord::derive_id`]
    pub(crate) id: String,
    /// The unique id the marketplace attaches to a card, if any
    pub(crate) job_uid: String,
    pub(crate) title: String,
    pub(crate) url: String,
    pub(crate) snippet: String,
    pub(crate) payment: String,
    pub(crate) budget: String,
    pub(crate) hourly: String,
    pub(crate) posted: String,
    pub(crate) experience_level: String,
    pub(crate) duration: String,
    pub(crate) workload: String,
    pub(crate) location_requirement: String,
    pub(crate) num_proposals: String,
    /// Skill tokens in the order they appear, without exact duplicates
    pub(crate) skills: Vec<String>,
    pub(crate) client_country: String,
    pub(crate) client_payment_verified: String,
    pub(crate) client_payment_status: String,
    pub(crate) client_spend: String,
    pub(crate) client_jobs_posted: String,
    pub(crate) client_hire_rate: String,
    pub(crate) client_rating: String
}


impl JobRecord {
    /// Computes the deduplication key: the marketplace id, else the url, else the title.
    ///
    /// As a last resort the whole record is serialized. That key changes whenever any
    /// field renders slightly differently, so such records may be stored more than once.
    pub(crate) fn derive_id(&self) -> String {
        [&self.job_uid, &self.url, &self.title]
            .into_iter()
            .find(|candidate| !candidate.is_empty())
            .cloned()
            .unwrap_or_else(|| serde_json::to_string(self).unwrap_or_default())
    }

    /// The key to store this record under. An explicit id always wins.
    pub(crate) fn key(&self) -> String {
        if self.id.is_empty() {
            self.derive_id()
        } else {
            self.id.clone()
        }
    }
}


/// A rendered page handed over by the page lifecycle collaborator.
#[derive(Debug, Clone)]
pub(crate) struct ListingPage {
    /// The address the page reports after loading
    pub(crate) url: String,
    pub(crate) html: String
}


/// The listing page this tool watches, together with the pattern that recognises it.
#[derive(Debug, Clone)]
pub(crate) struct ListingTarget {
    url: Url,
    pattern: Regex
}


impl ListingTarget {
    /// Pages are recognised by origin and path. The query and fragment of `url` only
    /// matter for navigation.
    pub(crate) fn new(url: Url) -> anyhow::Result<Self> {
        let base = regex::escape(&format!(
            "{}{}",
            url.origin().ascii_serialization(),
            url.path().trim_end_matches('/')
        ));
        let pattern = Regex::new(&format!("^{base}(?:[/?#].*)?$"))?;
        Ok(Self { url, pattern })
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    /// True if `address` is the listing page, optionally followed by any path or query suffix.
    pub(crate) fn matches(&self, address: &str) -> bool {
        self.pattern.is_match(address)
    }
}


/// The selectors that describe one marketplace's listing page.
pub(crate) trait PageScraper {
    const NAME: &'static str;
    /// Card location tiers, tried in order until one finds something
    const CARDS: &'static [CardStrategy];
    /// Field extraction table
    const FIELDS: &'static [FieldRule];
    /// Skill token selectors, the first one that finds any token wins
    const SKILLS: &'static [&'static str];
}


/// A [`PageScraper`] with all of its selectors parsed.
pub(crate) struct ListingScraper {
    name: &'static str,
    locator: CardLocator,
    extractor: FieldExtractor
}


impl ListingScraper {
    pub(crate) fn for_site<S: PageScraper>() -> Result<Self, ScrapeError> {
        Ok(Self {
            name: S::NAME,
            locator: CardLocator::compile(S::CARDS)?,
            extractor: FieldExtractor::compile(S::FIELDS, S::SKILLS)?
        })
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScrapeState {
    Idle,
    Running,
    Done,
    Failed
}


/// A single pass over a listing page.
///
/// A run cannot be restarted; every invocation builds a new one.
pub(crate) struct ScrapeRun<'s> {
    scraper: &'s ListingScraper,
    state: ScrapeState
}


impl<'s> ScrapeRun<'s> {
    pub(crate) fn new(scraper: &'s ListingScraper) -> Self {
        Self { scraper, state: ScrapeState::Idle }
    }

    fn transition(&mut self, next: ScrapeState) {
        info!(scraper = self.scraper.name, from = ?self.state, to = ?next, "scrape state changed");
        self.state = next;
    }

    /// Extracts every job card on `page`.
    ///
    /// Cards are processed one after another, yielding to the runtime every few cards.
    /// A card that fails to parse, or has no title, is left out of the batch.
    pub(crate) async fn run(
        mut self,
        page: &ListingPage,
        target: &ListingTarget,
        events: &EventBus,
        notifier: &dyn Notifier
    ) -> Result<Vec<JobRecord>, ScrapeError> {
        self.transition(ScrapeState::Running);

        if !target.matches(&page.url) {
            let err = ScrapeError::NotListingPage {
                expected: target.url().to_string(),
                actual: page.url.clone()
            };
            warn!("{err}");
            self.transition(ScrapeState::Failed);
            return Err(err);
        }

        let base = Url::parse(&page.url).unwrap_or_else(|_| target.url().clone());
        let document = Html::parse_document(&page.html);
        let cards = self.scraper.locator.locate(document.root_element());
        let total = cards.len();
        info!("Parsing {total} job cards...");

        let mut batch = Vec::with_capacity(total);
        for (index, card) in cards.into_iter().enumerate() {
            match self.scraper.extractor.extract(card, &base) {
                Ok(record) if !record.title.is_empty() => {
                    debug!(?record, "job parsed");
                    batch.push(record);
                }
                Ok(_) => debug!(index, "card has no title, skipping"),
                Err(e) => debug!(index, error = %e, "failed to parse job card")
            }
            events.emit(ScrapeEvent::Progress { current: index + 1, total });

            if index % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }
        }

        events.deliver(ScrapeEvent::Completed(batch.clone().into())).await;

        let done = Notification::new(NOTIFICATION_TITLE, format!("Scraping complete. Collected {} jobs.", batch.len()));
        if let Err(e) = notifier.notify(&done).await {
            warn!("Notification could not be shown: {e:#}");
        }

        self.transition(ScrapeState::Done);
        Ok(batch)
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::{notify::tests::RecordingNotifier, page_scrapers::upwork::UpworkScraper};

    pub(crate) const LISTING_URL: &str = "https://www.upwork.com/nx/search/jobs/";

    /// Three cards: two with titles, one without.
    pub(crate) const THREE_CARDS: &str = r#"
        <html><body><section data-test="job-tile-list">
          <article data-ev-job-uid="111">
            <a data-test="job-tile-title-link" href="/jobs/~111">Senior Python Developer</a>
            <div data-test="UpCLineClamp JobDescription">Build data pipelines</div>
            <ul data-test="job-type-label"><li>Hourly: $40-$60</li></ul>
          </article>
          <article data-ev-job-uid="222">
            <a data-test="job-tile-title-link" href="/jobs/~222">React Frontend Engineer</a>
            <div data-test="UpCLineClamp JobDescription">Dashboard work</div>
          </article>
          <article data-ev-job-uid="333">
            <div data-test="UpCLineClamp JobDescription">Card without a title</div>
          </article>
        </section></body></html>
    "#;

    pub(crate) fn listing_page(html: &str) -> ListingPage {
        ListingPage { url: format!("{LISTING_URL}?q=rust"), html: html.to_string() }
    }

    pub(crate) fn target() -> ListingTarget {
        ListingTarget::new(Url::parse(LISTING_URL).unwrap()).unwrap()
    }

    #[test]
    fn target_matches_suffixes_only() {
        let target = target();
        assert!(target.matches("https://www.upwork.com/nx/search/jobs/"));
        assert!(target.matches("https://www.upwork.com/nx/search/jobs"));
        assert!(target.matches("https://www.upwork.com/nx/search/jobs/?q=rust&sort=recency"));
        assert!(!target.matches("https://www.upwork.com/nx/search/jobsboard"));
        assert!(!target.matches("https://www.upwork.com/freelancers/"));
        assert!(!target.matches("http://www.upwork.com/nx/search/jobs/"));

        let searched = ListingTarget::new(Url::parse("https://www.upwork.com/nx/search/jobs/?q=rust").unwrap()).unwrap();
        assert_eq!(searched.url().query(), Some("q=rust"));
        assert!(searched.matches("https://www.upwork.com/nx/search/jobs/?q=rust"));
        assert!(searched.matches("https://www.upwork.com/nx/search/jobs/?q=rust&sort=recency"));
        assert!(searched.matches("https://www.upwork.com/nx/search/jobs/?q=python"));
        assert!(searched.matches("https://www.upwork.com/nx/search/jobs/"));
        assert!(!searched.matches("https://www.upwork.com/nx/search/jobsboard?q=rust"));
    }

    #[test]
    fn id_falls_back_through_uid_url_title() {
        let mut record = JobRecord { title: "Rust dev".into(), ..Default::default() };
        assert_eq!(record.derive_id(), "Rust dev");
        record.url = "https://example.com/jobs/1".into();
        assert_eq!(record.derive_id(), "https://example.com/jobs/1");
        record.job_uid = "42".into();
        assert_eq!(record.derive_id(), "42");

        let empty = JobRecord { snippet: "only a snippet".into(), ..Default::default() };
        assert!(empty.derive_id().contains("only a snippet"));
    }

    #[tokio::test]
    async fn scrape_keeps_titled_cards_in_document_order() {
        let scraper = ListingScraper::for_site::<UpworkScraper>().unwrap();
        let events = EventBus::new(Duration::ZERO);
        let mut progress = events.subscribe();
        let notifier = RecordingNotifier::default();

        let batch = ScrapeRun::new(&scraper)
            .run(&listing_page(THREE_CARDS), &target(), &events, &notifier)
            .await
            .unwrap();

        let titles: Vec<_> = batch.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Senior Python Developer", "React Frontend Engineer"]);
        assert_eq!(batch[0].id, "111");
        assert_eq!(batch[0].url, "https://www.upwork.com/jobs/~111");

        let mut seen = Vec::new();
        loop {
            match progress.try_recv() {
                Ok(ScrapeEvent::Progress { current, total }) => seen.push((current, total)),
                Ok(ScrapeEvent::Completed(done)) => {
                    assert_eq!(done.len(), 2);
                    break;
                }
                Err(TryRecvError::Empty) => panic!("completion event missing"),
                Err(e) => panic!("unexpected {e:?}")
            }
        }
        assert_eq!(seen, [(1, 3), (2, 3), (3, 3)]);

        let sent = notifier.sent();
        assert_eq!(sent, [Notification::new(NOTIFICATION_TITLE, "Scraping complete. Collected 2 jobs.")]);
    }

    #[tokio::test]
    async fn wrong_page_fails_without_extracting() {
        let scraper = ListingScraper::for_site::<UpworkScraper>().unwrap();
        let events = EventBus::new(Duration::ZERO);
        let mut progress = events.subscribe();
        let notifier = RecordingNotifier::default();
        let page = ListingPage {
            url: "https://www.upwork.com/freelancers/".into(),
            html: THREE_CARDS.into()
        };

        let err = ScrapeRun::new(&scraper)
            .run(&page, &target(), &events, &notifier)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), format!("Please open {LISTING_URL} and run again."));
        assert!(matches!(progress.try_recv(), Err(TryRecvError::Empty)));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn failing_notification_still_succeeds() {
        let scraper = ListingScraper::for_site::<UpworkScraper>().unwrap();
        let events = EventBus::new(Duration::ZERO);
        let notifier = RecordingNotifier::denied();

        let batch = ScrapeRun::new(&scraper)
            .run(&listing_page(THREE_CARDS), &target(), &events, &notifier)
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn page_without_cards_is_an_empty_batch() {
        let scraper = ListingScraper::for_site::<UpworkScraper>().unwrap();
        let events = EventBus::new(Duration::ZERO);
        let notifier = RecordingNotifier::default();

        let batch = ScrapeRun::new(&scraper)
            .run(&listing_page("<html><body><p>No results</p></body></html>"), &target(), &events, &notifier)
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_card_link_skips_only_that_card() {
        let html = r#"
            <article data-ev-job-uid="1"><a data-test="job-tile-title-link" href="http://[::1">Broken</a></article>
            <article data-ev-job-uid="2"><a data-test="job-tile-title-link" href="/jobs/~2">Fine</a></article>
        "#;
        let scraper = ListingScraper::for_site::<UpworkScraper>().unwrap();
        let events = EventBus::new(Duration::ZERO);
        let notifier = RecordingNotifier::default();

        let batch = ScrapeRun::new(&scraper)
            .run(&listing_page(html), &target(), &events, &notifier)
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].title, "Fine");
    }
}
