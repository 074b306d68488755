use std::{fmt::Display, sync::Arc, time::Duration};

use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle
};
use tracing::{debug, info, trace};

use crate::page_scrapers::JobRecord;

const EVENT_CAPACITY: usize = 256;


/// What a scrape reports to whoever is listening.
#[derive(Debug, Clone)]
pub(crate) enum ScrapeEvent {
    Progress {
        current: usize,
        total: usize
    },
    Completed(Arc<[JobRecord]>)
}


/// Commands accepted by the scrape worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    StartScrape
}


/// Tries `attempt` once, and if it is not acknowledged, exactly once more after `delay`.
///
/// Returns `None` if both attempts failed. The message is then dropped.
pub(crate) async fn deliver_with_retry<T, E: Display>(
    what: &str,
    delay: Duration,
    mut attempt: impl FnMut() -> Result<T, E>
) -> Option<T> {
    match attempt() {
        Ok(ack) => return Some(ack),
        Err(e) => debug!(what, error = %e, "delivery failed, retrying once")
    }
    tokio::time::sleep(delay).await;
    match attempt() {
        Ok(ack) => Some(ack),
        Err(e) => {
            debug!(what, error = %e, "delivery failed again, dropping");
            None
        }
    }
}


#[derive(Clone)]
pub(crate) struct EventBus {
    sender: broadcast::Sender<ScrapeEvent>,
    retry_delay: Duration
}


impl EventBus {
    pub(crate) fn new(retry_delay: Duration) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender, retry_delay }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ScrapeEvent> {
        self.sender.subscribe()
    }

    /// Fire and forget.
    pub(crate) fn emit(&self, event: ScrapeEvent) {
        if self.sender.send(event).is_err() {
            trace!("no listener attached, event dropped");
        }
    }

    /// Like [`EventBus::emit`], but waits for a listener to attach once before giving up.
    pub(crate) async fn deliver(&self, event: ScrapeEvent) -> bool {
        deliver_with_retry("scrape event", self.retry_delay, || self.sender.send(event.clone()))
            .await
            .is_some()
    }
}


/// Lists the first `limit` records of a batch, one per line.
pub(crate) fn render_preview(batch: &[JobRecord], limit: usize) -> String {
    let mut preview = batch
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, job)| {
            let title = if job.title.is_empty() { "(no title)" } else { &job.title };
            format!("{}. {title} - {}", i + 1, job.url)
        })
        .collect::<Vec<_>>()
        .join("\n");
    if batch.len() > limit {
        preview.push_str(&format!("\n...and {} more.", batch.len() - limit));
    }
    preview
}


/// Writes scrape progress and a preview of every finished batch to the log.
///
/// The task ends once every [`EventBus`] handle has been dropped.
pub(crate) fn spawn_console_listener(mut events: broadcast::Receiver<ScrapeEvent>, preview_limit: usize) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ScrapeEvent::Progress { current, total }) => info!("Progress: {current}/{total}"),
                Ok(ScrapeEvent::Completed(batch)) => {
                    info!("Scraping finished. Collected {} jobs.", batch.len());
                    if !batch.is_empty() {
                        info!("Preview:\n{}", render_preview(&batch, preview_limit));
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "console listener fell behind"),
                Err(RecvError::Closed) => break
            }
        }
    })
}


#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tokio::sync::mpsc;

    use super::*;

    fn job(title: &str, url: &str) -> JobRecord {
        JobRecord { title: title.into(), url: url.into(), ..Default::default() }
    }

    #[tokio::test]
    async fn first_attempt_success_does_not_retry() {
        let calls = Cell::new(0);
        let result = deliver_with_retry("test", Duration::from_secs(3600), || {
            calls.set(calls.get() + 1);
            Ok::<_, String>(7)
        })
        .await;
        assert_eq!(result, Some(7));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn retries_exactly_once() {
        let calls = Cell::new(0);
        let result = deliver_with_retry("test", Duration::ZERO, || {
            calls.set(calls.get() + 1);
            if calls.get() == 2 { Ok(()) } else { Err("not attached") }
        })
        .await;
        assert_eq!(result, Some(()));

        calls.set(0);
        let result = deliver_with_retry("test", Duration::ZERO, || {
            calls.set(calls.get() + 1);
            Err::<(), _>("not attached")
        })
        .await;
        assert_eq!(result, None);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn full_command_queue_is_dropped_after_one_retry() {
        let (sender, mut receiver) = mpsc::channel(1);
        sender.try_send(Command::StartScrape).unwrap();

        let queued = deliver_with_retry("startScrape", Duration::ZERO, || sender.try_send(Command::StartScrape)).await;
        assert!(queued.is_none());
        assert_eq!(receiver.try_recv().unwrap(), Command::StartScrape);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn deliver_without_listener_gives_up() {
        let bus = EventBus::new(Duration::ZERO);
        assert!(!bus.deliver(ScrapeEvent::Progress { current: 1, total: 1 }).await);

        let mut listener = bus.subscribe();
        assert!(bus.deliver(ScrapeEvent::Progress { current: 1, total: 2 }).await);
        assert!(matches!(listener.recv().await, Ok(ScrapeEvent::Progress { current: 1, total: 2 })));
    }

    #[test]
    fn preview_caps_and_counts_the_rest() {
        let batch: Vec<_> = (1..=7).map(|i| job(&format!("Job {i}"), &format!("u{i}"))).collect();
        let preview = render_preview(&batch, 5);
        assert_eq!(preview.lines().count(), 6);
        assert!(preview.starts_with("1. Job 1 - u1\n"));
        assert!(preview.ends_with("5. Job 5 - u5\n...and 2 more."));

        assert_eq!(render_preview(&[job("", "u")], 5), "1. (no title) - u");
    }
}
