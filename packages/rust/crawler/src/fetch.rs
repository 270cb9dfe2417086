//! HTTP fetching with a desktop browser identity.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use refinery_shared::{CrawlerConfig, RefineryError, Result};

/// Some sites refuse non-browser agents, so crawl as desktop Chrome.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/61.0.3163.100 Safari/537.36";

/// A downloaded document.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub html: String,
}

/// Shared HTTP client for page and text downloads.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RefineryError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Download `url` and require a 200 response.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn crawl_and_parse(&self, url: &Url) -> Result<FetchedPage> {
        let page = self.fetch_text(url).await?;
        if page.status != 200 {
            return Err(RefineryError::Network(format!(
                "{url}: HTTP {}",
                page.status
            )));
        }
        debug!(bytes = page.html.len(), "fetched page");
        Ok(page)
    }

    /// Download `url` whatever its status; only transport failures are errors.
    pub async fn fetch_text(&self, url: &Url) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| RefineryError::Network(format!("{url}: {e}")))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| RefineryError::Network(format!("{url}: body read failed: {e}")))?;

        Ok(FetchedPage {
            url: final_url,
            status,
            html,
        })
    }
}
