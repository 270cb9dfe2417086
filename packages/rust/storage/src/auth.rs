//! OAuth access tokens for the Google REST APIs.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use refinery_shared::{GcpConfig, RefineryError, Result};

/// Refresh this long before the metadata server says the token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where bearer tokens come from.
pub enum TokenSource {
    /// A fixed token (env var, tests).
    Static(String),
    /// The GCE/Cloud Functions metadata server, cached until near expiry.
    MetadataServer {
        client: Client,
        url: String,
        cached: Mutex<Option<(String, Instant)>>,
    },
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

impl TokenSource {
    /// Use the env var named in config when it is set, the metadata server otherwise.
    pub fn from_config(config: &GcpConfig, client: Client) -> Self {
        match std::env::var(&config.access_token_env) {
            Ok(token) if !token.trim().is_empty() => {
                debug!(var = %config.access_token_env, "using static access token");
                Self::Static(token.trim().to_string())
            }
            _ => Self::metadata_server(client, &config.metadata_token_url),
        }
    }

    pub fn metadata_server(client: Client, url: &str) -> Self {
        Self::MetadataServer {
            client,
            url: url.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// A bearer token valid for at least [`EXPIRY_MARGIN`].
    pub async fn token(&self) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::MetadataServer {
                client,
                url,
                cached,
            } => {
                let mut guard = cached.lock().await;
                if let Some((token, expires)) = guard.as_ref() {
                    if Instant::now() + EXPIRY_MARGIN < *expires {
                        return Ok(token.clone());
                    }
                }

                let response = client
                    .get(url.as_str())
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| RefineryError::Network(format!("metadata token: {e}")))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(RefineryError::api(
                        status.as_u16(),
                        format!("metadata token request failed: {status}"),
                    ));
                }

                let body: MetadataToken = response
                    .json()
                    .await
                    .map_err(|e| RefineryError::parse(format!("metadata token body: {e}")))?;

                let expires = Instant::now() + Duration::from_secs(body.expires_in);
                *guard = Some((body.access_token.clone(), expires));
                debug!(expires_in = body.expires_in, "refreshed access token");
                Ok(body.access_token)
            }
        }
    }
}
