use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use crate::{
    error::ScrapeError,
    page_scrapers::{ListingPage, ListingTarget}
};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";


/// Brings the listing page up to date and hands over what it rendered.
///
/// Implementations wait until the page is ready, but no longer than their load timeout.
#[async_trait]
pub(crate) trait PageSource: Send + Sync {
    async fn load(&self, target: &ListingTarget) -> Result<ListingPage, ScrapeError>;
}


/// Drives a real Chrome instance, so pages that render on the client work too.
pub(crate) struct ChromePageSource {
    browser: Browser,
    timeout: Duration
}


impl ChromePageSource {
    pub(crate) fn launch(headless: bool, timeout: Duration) -> anyhow::Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(headless)
            .build()
            .context("Invalid browser launch options")?;
        let browser = Browser::new(options).context("Failed to launch Chrome. Is it installed?")?;
        Ok(Self { browser, timeout })
    }
}


/// Focuses the tab already showing the listing page, or opens a new one on it.
///
/// The returned flag tells whether the tab already existed.
fn open_or_focus(browser: &Browser, target: &ListingTarget) -> anyhow::Result<(Arc<Tab>, bool)> {
    let existing = browser
        .get_tabs()
        .lock()
        .map_err(|_| anyhow!("Browser tab list is poisoned"))?
        .iter()
        .find(|tab| target.matches(&tab.get_url()))
        .cloned();

    match existing {
        Some(tab) => {
            debug!(url = %tab.get_url(), "focusing existing listing tab");
            tab.activate()?;
            Ok((tab, true))
        }
        None => {
            info!(url = %target.url(), "opening listing page");
            let tab = browser.new_tab()?;
            tab.navigate_to(target.url().as_str())?;
            Ok((tab, false))
        }
    }
}


#[async_trait]
impl PageSource for ChromePageSource {
    async fn load(&self, target: &ListingTarget) -> Result<ListingPage, ScrapeError> {
        let browser = self.browser.clone();
        let target = target.clone();
        let timeout = self.timeout;

        let load = tokio_rayon::spawn(move || -> anyhow::Result<ListingPage> {
            let (tab, existed) = open_or_focus(&browser, &target)?;
            tab.set_default_timeout(timeout);
            if existed {
                tab.reload(false, None)?;
            }
            tab.wait_until_navigated()?;
            Ok(ListingPage { url: tab.get_url(), html: tab.get_content()? })
        });

        match tokio::time::timeout(timeout, load).await {
            Ok(page) => page.map_err(ScrapeError::Browser),
            Err(_) => Err(ScrapeError::PageLoadTimeout(timeout))
        }
    }
}


/// Fetches the listing page over plain http. Only sees what the server renders.
pub(crate) struct HttpPageSource {
    client: reqwest::Client,
    timeout: Duration
}


impl HttpPageSource {
    pub(crate) fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create http client")?;
        Ok(Self { client, timeout })
    }
}


#[async_trait]
impl PageSource for HttpPageSource {
    async fn load(&self, target: &ListingTarget) -> Result<ListingPage, ScrapeError> {
        let fetch = async {
            let response = self
                .client
                .get(target.url().clone())
                .send()
                .await?
                .error_for_status()?;
            let url = response.url().to_string();
            let html = response.text().await?;
            Ok::<_, reqwest::Error>(ListingPage { url, html })
        };

        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(page) => page.map_err(|e| ScrapeError::Browser(e.into())),
            Err(_) => Err(ScrapeError::PageLoadTimeout(self.timeout))
        }
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use tokio::net::TcpListener;
    use url::Url;

    use super::*;

    /// Serves the same page every time.
    pub(crate) struct StaticPage(pub(crate) ListingPage);

    #[async_trait]
    impl PageSource for StaticPage {
        async fn load(&self, _target: &ListingTarget) -> Result<ListingPage, ScrapeError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn silent_server_hits_the_load_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let source = HttpPageSource {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            timeout: Duration::from_millis(50)
        };
        let target = ListingTarget::new(Url::parse(&format!("http://{address}/nx/search/jobs/")).unwrap()).unwrap();

        let result = source.load(&target).await;
        assert!(matches!(result, Err(ScrapeError::PageLoadTimeout(timeout)) if timeout == Duration::from_millis(50)));
        server.abort();
    }
}
