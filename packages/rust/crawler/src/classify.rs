//! Content classification through the Natural Language `classifyText` API.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use refinery_shared::{RefineryError, Result};
use refinery_storage::TokenSource;

/// Category reported when the API returns nothing usable.
pub const NO_CATEGORY: &str = "No Category Available";

/// The API rejects documents with fewer tokens than this.
pub const MIN_TOKENS: usize = 20;

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    name: String,
    #[serde(default)]
    confidence: f64,
}

/// Client for `documents:classifyText`.
pub struct ContentClassifier {
    client: Client,
    endpoint: String,
    tokens: Arc<TokenSource>,
}

impl ContentClassifier {
    pub fn new(client: Client, endpoint: &str, tokens: Arc<TokenSource>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// `(category, confidence)` pairs, never empty.
    #[instrument(skip_all, fields(chars = content.len()))]
    pub async fn classify(&self, content: &str) -> Result<Vec<(String, f64)>> {
        if content.split_whitespace().count() < MIN_TOKENS {
            debug!("too little text to classify");
            return Ok(vec![(NO_CATEGORY.to_string(), 0.0)]);
        }

        let token = self.tokens.token().await?;
        let body = json!({
            "document": { "type": "PLAIN_TEXT", "content": content }
        });

        let response = self
            .client
            .post(format!("{}/v1/documents:classifyText", self.endpoint))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RefineryError::Network(format!("classifyText: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RefineryError::api(status.as_u16(), text));
        }

        let parsed: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| RefineryError::parse(format!("classifyText response: {e}")))?;

        if parsed.categories.is_empty() {
            return Ok(vec![(NO_CATEGORY.to_string(), 0.0)]);
        }
        Ok(parsed
            .categories
            .into_iter()
            .map(|c| (c.name, c.confidence))
            .collect())
    }
}

/// The best category split into up to three tiers.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub tier1: Option<String>,
    pub tier2: Option<String>,
    pub tier3: Option<String>,
    pub confidence: f64,
}

impl Classification {
    pub fn unavailable() -> Self {
        Self {
            tier1: Some(NO_CATEGORY.to_string()),
            tier2: None,
            tier3: None,
            confidence: 0.0,
        }
    }

    /// Pick the highest-confidence `/A/B/C` category.
    pub fn from_categories(categories: &[(String, f64)]) -> Self {
        let Some((name, confidence)) = categories
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            return Self::unavailable();
        };

        let mut tiers = name
            .split('/')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);

        Self {
            tier1: tiers.next(),
            tier2: tiers.next(),
            tier3: tiers.next(),
            confidence: *confidence,
        }
    }
}
