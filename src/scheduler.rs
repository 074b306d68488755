use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::Instant
};
use tracing::{debug, error, info, warn};

use crate::{
    browser::PageSource,
    messaging::{deliver_with_retry, Command, EventBus},
    notify::{job_notification, Notifier},
    page_scrapers::{ListingScraper, ListingTarget, ScrapeRun},
    shortlist::{shortlist, ShortlistStore},
    storage::{Preferences, Settings}
};

/// How often the timer re-reads the settings, so edits apply without a restart.
const SETTINGS_POLL: Duration = Duration::from_secs(30);


/// Counts from one scrape cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CycleReport {
    pub(crate) scraped: usize,
    pub(crate) shortlisted: usize,
    pub(crate) added: usize
}


/// Everything a scrape cycle needs: load the page, scrape it, shortlist, merge, notify.
pub(crate) struct Pipeline {
    pub(crate) source: Box<dyn PageSource>,
    pub(crate) scraper: ListingScraper,
    pub(crate) target: ListingTarget,
    pub(crate) preferences: Preferences,
    pub(crate) shortlist: ShortlistStore,
    pub(crate) events: EventBus,
    pub(crate) notifier: Arc<dyn Notifier>
}


impl Pipeline {
    pub(crate) async fn run_cycle(&self) -> anyhow::Result<CycleReport> {
        let page = self.source.load(&self.target).await?;
        let batch = ScrapeRun::new(&self.scraper)
            .run(&page, &self.target, &self.events, self.notifier.as_ref())
            .await?;

        let keywords = self.preferences.keywords().await?;
        let shortlisted = shortlist(&batch, &keywords);
        let shortlisted_count = shortlisted.len();
        let report = self.shortlist.merge(shortlisted).await?;

        for job in &report.added {
            if let Err(e) = self.notifier.notify(&job_notification(job)).await {
                warn!("Notification could not be shown: {e:#}");
            }
        }

        Ok(CycleReport {
            scraped: batch.len(),
            shortlisted: shortlisted_count,
            added: report.added.len()
        })
    }
}


/// Runs one cycle per command, never two at once. Returns when every sender is gone.
pub(crate) async fn serve(pipeline: &Pipeline, mut commands: mpsc::Receiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::StartScrape => match pipeline.run_cycle().await {
                Ok(report) => info!(
                    scraped = report.scraped,
                    shortlisted = report.shortlisted,
                    added = report.added,
                    "scrape cycle finished"
                ),
                Err(e) => error!("Scrape cycle failed: {e:#}")
            }
        }
    }
}


fn is_due(settings: &Settings, since_last: Duration) -> bool {
    !settings.paused && since_last >= settings.refresh_interval()
}


/// Sends a start command whenever the refresh interval has passed and scraping is not paused.
pub(crate) fn spawn_timer(preferences: Preferences, commands: mpsc::Sender<Command>, retry_delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_run = Instant::now();
        loop {
            tokio::time::sleep(SETTINGS_POLL).await;
            if commands.is_closed() {
                break;
            }

            let settings = match preferences.settings().await {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Could not read settings, using defaults: {e}");
                    Settings::default()
                }
            };
            if settings.paused {
                debug!("scraping is paused");
                continue;
            }
            if !is_due(&settings, last_run.elapsed()) {
                continue;
            }

            last_run = Instant::now();
            deliver_with_retry("startScrape", retry_delay, || commands.try_send(Command::StartScrape)).await;
        }
    })
}
