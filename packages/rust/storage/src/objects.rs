//! Object store for raw JSON payloads.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use refinery_shared::{RefineryError, Result};

use crate::auth::TokenSource;

/// Blob storage keyed by bucket and object name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload_bytes(&self, bucket: &str, name: &str, content_type: &str, data: Vec<u8>)
    -> Result<()>;

    async fn download_bytes(&self, bucket: &str, name: &str) -> Result<Vec<u8>>;

    async fn upload_json(&self, bucket: &str, name: &str, payload: &Value) -> Result<()> {
        let data = serde_json::to_vec(payload)
            .map_err(|e| RefineryError::parse(format!("serialize {name}: {e}")))?;
        self.upload_bytes(bucket, name, "application/json", data).await
    }

    async fn download_json(&self, bucket: &str, name: &str) -> Result<Value> {
        let data = self.download_bytes(bucket, name).await?;
        serde_json::from_slice(&data)
            .map_err(|e| RefineryError::parse(format!("object {bucket}/{name}: {e}")))
    }
}

/// Object name for a service payload: `{file_name}_{suffix}.json`.
pub fn payload_object_name(file_name: &str, suffix: &str) -> String {
    format!("{file_name}_{suffix}.json")
}

/// Store `payload` under [`payload_object_name`] and return the name used.
pub async fn upload_payload(
    store: &dyn ObjectStore,
    bucket: &str,
    file_name: &str,
    suffix: &str,
    payload: &Value,
) -> Result<String> {
    let name = payload_object_name(file_name, suffix);
    store.upload_json(bucket, &name, payload).await?;
    Ok(name)
}

/// Google Cloud Storage over the JSON API.
pub struct GcsObjectStore {
    client: Client,
    endpoint: String,
    tokens: Arc<TokenSource>,
}

impl GcsObjectStore {
    pub fn new(client: Client, endpoint: &str, tokens: Arc<TokenSource>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    #[instrument(skip_all, fields(bucket = %bucket, name = %name))]
    async fn upload_bytes(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let url = format!(
            "{}/upload/storage/v1/b/{bucket}/o?uploadType=media&name={}",
            self.endpoint,
            encode_component(name)
        );
        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| RefineryError::Network(format!("upload {bucket}/{name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefineryError::api(status.as_u16(), body));
        }
        debug!(bucket, name, "uploaded object");
        Ok(())
    }

    #[instrument(skip_all, fields(bucket = %bucket, name = %name))]
    async fn download_bytes(&self, bucket: &str, name: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/storage/v1/b/{bucket}/o/{}?alt=media",
            self.endpoint,
            encode_component(name)
        );
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RefineryError::Network(format!("download {bucket}/{name}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefineryError::api(status.as_u16(), body));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RefineryError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Files under `<root>/<bucket>/<name>`.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, bucket: &str, name: &str) -> PathBuf {
        self.root.join(bucket).join(name)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload_bytes(
        &self,
        bucket: &str,
        name: &str,
        _content_type: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let path = self.path_for(bucket, name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RefineryError::io(parent, e))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| RefineryError::io(&path, e))?;
        debug!(path = %path.display(), "wrote object");
        Ok(())
    }

    async fn download_bytes(&self, bucket: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(bucket, name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| RefineryError::io(&path, e))
    }
}

fn encode_component(name: &str) -> String {
    url::form_urlencoded::byte_serialize(name.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn payload_names() {
        assert_eq!(payload_object_name("r1", "clearbit"), "r1_clearbit.json");
        assert_eq!(
            payload_object_name("abc", "mobile_friendly"),
            "abc_mobile_friendly.json"
        );
    }

    #[test]
    fn object_names_are_percent_encoded() {
        assert_eq!(encode_component("a/b c.json"), "a%2Fb%20c.json");
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let root = std::env::temp_dir().join(format!("refinery_objects_{}", Uuid::now_v7()));
        let store = LocalObjectStore::new(&root);

        let name = upload_payload(&store, "the_refinery", "r1", "crawler", &json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(name, "r1_crawler.json");
        assert!(root.join("the_refinery").join("r1_crawler.json").exists());

        let back = store.download_json("the_refinery", &name).await.unwrap();
        assert_eq!(back, json!({"a": 1}));
    }

    #[tokio::test]
    async fn local_download_missing_is_io_error() {
        let store = LocalObjectStore::new(std::env::temp_dir().join("refinery_missing_root"));
        let err = store.download_bytes("b", "nope.json").await.unwrap_err();
        assert!(matches!(err, RefineryError::Io { .. }));
    }

    #[tokio::test]
    async fn gcs_upload_posts_media() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/the_refinery/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "r1_clearbit.json"))
            .and(header("authorization", "Bearer t"))
            .and(body_json(json!({"person": null})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "r1_clearbit.json"})))
            .expect(1)
            .mount(&server)
            .await;

        let store = GcsObjectStore::new(
            Client::new(),
            &server.uri(),
            Arc::new(TokenSource::Static("t".into())),
        );
        upload_payload(&store, "the_refinery", "r1", "clearbit", &json!({"person": null}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn gcs_download_reads_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/secrets/o/key.enc"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cipher".to_vec()))
            .mount(&server)
            .await;

        let store = GcsObjectStore::new(
            Client::new(),
            &server.uri(),
            Arc::new(TokenSource::Static("t".into())),
        );
        let bytes = store.download_bytes("secrets", "key.enc").await.unwrap();
        assert_eq!(bytes, b"cipher");
    }

    #[tokio::test]
    async fn gcs_error_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let store = GcsObjectStore::new(
            Client::new(),
            &server.uri(),
            Arc::new(TokenSource::Static("t".into())),
        );
        let err = store.download_bytes("b", "x.json").await.unwrap_err();
        assert!(matches!(err, RefineryError::Api { status: 403, .. }));
    }
}
