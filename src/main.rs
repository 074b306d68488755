use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use crate::{
    browser::{ChromePageSource, HttpPageSource, PageSource},
    config::{Config, PageSourceKind},
    messaging::{spawn_console_listener, Command, EventBus},
    notify::{LogNotifier, Notifier, WebhookNotifier},
    page_scrapers::{upwork::UpworkScraper, ListingScraper, ListingTarget},
    scheduler::{serve, spawn_timer, Pipeline},
    shortlist::ShortlistStore,
    storage::{JsonFileStore, KvStore, Preferences}
};

mod browser;
mod config;
mod error;
mod messaging;
mod notify;
mod page_scrapers;
mod scheduler;
mod shortlist;
mod storage;


#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    action: Action
}


#[derive(Subcommand)]
enum Action {
    /// Resume scraping, scrape now, then keep scraping on the refresh interval
    Run,
    /// Scrape once and exit
    Scrape,
    /// Stop scheduled scrapes
    Pause,
    /// Allow scheduled scrapes again
    Resume,
    /// Show settings, keywords and the shortlist size
    Status,
    /// Show or change the refresh interval
    Settings {
        #[arg(long)]
        refresh_minutes: Option<u32>
    },
    /// Manage the keywords jobs are shortlisted by
    Keywords {
        #[command(subcommand)]
        action: KeywordsAction
    },
    /// Inspect or empty the shortlist
    Shortlist {
        #[command(subcommand)]
        action: ShortlistAction
    }
}


#[derive(Subcommand)]
enum KeywordsAction {
    List,
    Add { keywords: Vec<String> },
    Remove { keywords: Vec<String> },
    Clear
}


#[derive(Subcommand)]
enum ShortlistAction {
    Show {
        #[arg(long)]
        limit: Option<usize>
    },
    Clear
}


fn build_pipeline(config: &Config, store: Arc<dyn KvStore>) -> anyhow::Result<Pipeline> {
    let target_url = Url::parse(&config.target_url).context("target_url is not a valid url")?;
    let source: Box<dyn PageSource> = match config.page_source {
        PageSourceKind::Chrome => Box::new(ChromePageSource::launch(config.headless, config.page_load_timeout())?),
        PageSourceKind::Http => Box::new(HttpPageSource::new(config.page_load_timeout())?)
    };
    let notifier: Arc<dyn Notifier> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(Url::parse(url).context("webhook_url is not a valid url")?)),
        None => Arc::new(LogNotifier)
    };

    Ok(Pipeline {
        source,
        scraper: ListingScraper::for_site::<UpworkScraper>()?,
        target: ListingTarget::new(target_url)?,
        preferences: Preferences::new(store.clone()),
        shortlist: ShortlistStore::new(store),
        events: EventBus::new(config.retry_delay()),
        notifier
    })
}


async fn run(config: &Config, store: Arc<dyn KvStore>) -> anyhow::Result<()> {
    let preferences = Preferences::new(store.clone());
    preferences.set_paused(false).await?;
    let settings = preferences.settings().await?;

    let pipeline = build_pipeline(config, store)?;
    let listener = spawn_console_listener(pipeline.events.subscribe(), config.preview_limit);

    let (sender, receiver) = mpsc::channel(1);
    sender.send(Command::StartScrape).await?;
    let timer = spawn_timer(preferences, sender, config.retry_delay());
    info!("Scraping every {} minute(s). Press Ctrl+C to stop.", settings.refresh_minutes);

    tokio::select! {
        _ = serve(&pipeline, receiver) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Shutting down");
        }
    }

    timer.abort();
    drop(pipeline);
    if let Err(e) = listener.await {
        warn!("Console listener stopped abnormally: {e}");
    }
    Ok(())
}


async fn scrape_once(config: &Config, store: Arc<dyn KvStore>) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config, store)?;
    let listener = spawn_console_listener(pipeline.events.subscribe(), config.preview_limit);
    let report = pipeline.run_cycle().await;
    drop(pipeline);
    if let Err(e) = listener.await {
        warn!("Console listener stopped abnormally: {e}");
    }

    let report = report?;
    println!(
        "Scraped {} jobs, {} matched your keywords, {} new.",
        report.scraped, report.shortlisted, report.added
    );
    Ok(())
}


#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,job_shortlister=debug".into())
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config).await?;
    let store: Arc<dyn KvStore> = Arc::new(JsonFileStore::new(&config.store_path));
    let preferences = Preferences::new(store.clone());

    match cli.action {
        Action::Run => run(&config, store).await?,
        Action::Scrape => scrape_once(&config, store).await?,
        Action::Pause => {
            preferences.set_paused(true).await?;
            println!("Scraping paused.");
        }
        Action::Resume => {
            preferences.set_paused(false).await?;
            println!("Scraping resumed.");
        }
        Action::Status => {
            let settings = preferences.settings().await?;
            let keywords = preferences.keywords().await?;
            let shortlist = ShortlistStore::new(store);
            let updated_at = shortlist
                .updated_at()
                .await?
                .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
            println!("Refresh interval: {} minute(s)", settings.refresh_minutes);
            println!("Paused: {}", settings.paused);
            println!("Keywords ({}): {}", keywords.len(), keywords.iter().collect::<Vec<_>>().join(", "));
            println!("Shortlisted jobs: {}", shortlist.load().await?.len());
            println!("Shortlist updated: {updated_at}");
        }
        Action::Settings { refresh_minutes } => {
            let settings = match refresh_minutes {
                Some(minutes) => preferences
                    .set_refresh_minutes(minutes)
                    .await
                    .context("Please enter a valid refresh interval (minutes >= 1).")?,
                None => preferences.settings().await?
            };
            println!("Refresh interval: {} minute(s)", settings.refresh_minutes);
        }
        Action::Keywords { action } => {
            let mut keywords = preferences.keywords().await?;
            let changed = !matches!(action, KeywordsAction::List);
            match action {
                KeywordsAction::List => {}
                KeywordsAction::Add { keywords: added } => {
                    for keyword in &added {
                        if !keywords.insert(keyword) {
                            println!("Skipped \"{keyword}\", it is blank or already present.");
                        }
                    }
                }
                KeywordsAction::Remove { keywords: removed } => {
                    for keyword in &removed {
                        if !keywords.remove(keyword) {
                            println!("\"{keyword}\" is not a keyword.");
                        }
                    }
                }
                KeywordsAction::Clear => keywords.clear()
            }
            if changed {
                preferences.save_keywords(&keywords).await?;
            }
            if keywords.is_empty() {
                println!("No keywords, every job is shortlisted.");
            }
            for keyword in keywords.iter() {
                println!("{keyword}");
            }
        }
        Action::Shortlist { action } => {
            let shortlist = ShortlistStore::new(store);
            match action {
                ShortlistAction::Show { limit } => {
                    let jobs = shortlist
                        .preview(limit.unwrap_or(config.shortlist_preview_limit))
                        .await?;
                    if jobs.is_empty() {
                        println!("The shortlist is empty.");
                    }
                    for job in jobs {
                        println!("{} - {}", job.title, job.url);
                        let details = [&job.payment, &job.budget, &job.experience_level, &job.posted]
                            .into_iter()
                            .filter(|part| !part.is_empty())
                            .map(String::as_str)
                            .collect::<Vec<_>>();
                        if !details.is_empty() {
                            println!("    {}", details.join(" | "));
                        }
                    }
                }
                ShortlistAction::Clear => {
                    shortlist.clear().await?;
                    println!("Shortlist cleared.");
                }
            }
        }
    }
    Ok(())
}
