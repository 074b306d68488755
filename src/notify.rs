use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::page_scrapers::JobRecord;


/// A short message for the user, optionally pointing at the job it is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Notification {
    pub(crate) title: String,
    pub(crate) body: String,
    /// Opened when the user follows the notification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) url: Option<String>
}


impl Notification {
    pub(crate) fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { title: title.into(), body: body.into(), url: None }
    }
}


/// Shows a short message to the user. Callers treat failures as non-fatal.
#[async_trait]
pub(crate) trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}


/// Writes notifications to the log.
pub(crate) struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        match &notification.url {
            Some(url) => info!(target: "notification", %url, "{}: {}", notification.title, notification.body),
            None => info!(target: "notification", "{}: {}", notification.title, notification.body)
        }
        Ok(())
    }
}


/// POSTs every notification as json to a webhook.
pub(crate) struct WebhookNotifier {
    client: reqwest::Client,
    url: Url
}


impl WebhookNotifier {
    pub(crate) fn new(url: Url) -> Self {
        Self { client: reqwest::Client::new(), url }
    }
}


#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await
            .context("Failed to reach the notification webhook")?
            .error_for_status()
            .context("Notification webhook refused the message")?;
        Ok(())
    }
}


/// Announces a newly shortlisted job, linking to it when its url is known.
pub(crate) fn job_notification(job: &JobRecord) -> Notification {
    let title = if job.title.is_empty() { "New job".to_string() } else { job.title.clone() };
    let body = [&job.payment, &job.experience_level, &job.posted]
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" • ");
    let body = if body.is_empty() { "New shortlisted job".to_string() } else { body };
    Notification {
        title,
        body,
        url: (!job.url.is_empty()).then(|| job.url.clone())
    }
}
