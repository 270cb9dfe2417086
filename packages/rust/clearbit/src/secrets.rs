//! Locating the enrichment API key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use refinery_shared::{AppConfig, KmsConfig, RefineryError, Result};
use refinery_storage::{ObjectStore, TokenSource};

#[derive(Debug, Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

/// The API key from the environment, or from the KMS-encrypted blob.
#[instrument(skip_all)]
pub async fn resolve_api_key(
    config: &AppConfig,
    client: &Client,
    objects: &dyn ObjectStore,
    tokens: &TokenSource,
) -> Result<String> {
    let var = &config.clearbit.api_key_env;
    if let Ok(key) = std::env::var(var) {
        if !key.trim().is_empty() {
            debug!(var = %var, "api key from environment");
            return Ok(key.trim().to_string());
        }
    }

    let Some(kms) = &config.clearbit.kms else {
        return Err(RefineryError::config(format!(
            "API key not found. Set the {var} environment variable or configure [clearbit.kms]."
        )));
    };

    let ciphertext = objects
        .download_bytes(&config.objects.bucket, &kms.ciphertext_blob)
        .await?;
    decrypt_with_kms(client, tokens, &config.gcp.project_id, kms, &ciphertext).await
}

/// Decrypt `ciphertext` with the configured crypto key.
pub async fn decrypt_with_kms(
    client: &Client,
    tokens: &TokenSource,
    project_id: &str,
    kms: &KmsConfig,
    ciphertext: &[u8],
) -> Result<String> {
    let url = format!(
        "{}/v1/projects/{project_id}/locations/{}/keyRings/{}/cryptoKeys/{}:decrypt",
        kms.endpoint.trim_end_matches('/'),
        kms.location_id,
        kms.key_ring_id,
        kms.crypto_key_id
    );
    let token = tokens.token().await?;

    let response = client
        .post(&url)
        .bearer_auth(token)
        .json(&json!({ "ciphertext": STANDARD.encode(ciphertext) }))
        .send()
        .await
        .map_err(|e| RefineryError::Network(format!("kms decrypt: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RefineryError::api(status.as_u16(), body));
    }

    let body: DecryptResponse = response
        .json()
        .await
        .map_err(|e| RefineryError::parse(format!("kms decrypt response: {e}")))?;

    let bytes = STANDARD
        .decode(body.plaintext.trim())
        .map_err(|e| RefineryError::Decode(format!("kms plaintext is not base64: {e}")))?;
    let plaintext = String::from_utf8(bytes)
        .map_err(|e| RefineryError::Decode(format!("kms plaintext is not UTF-8: {e}")))?;

    Ok(plaintext.trim_matches('\n').to_string())
}
