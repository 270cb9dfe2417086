//! Application configuration for the Refinery.
//!
//! Config lives at `~/.refinery/refinery.toml`. A missing file means defaults,
//! and the defaults reproduce the production deployment (BigQuery, GCS,
//! Pub/Sub in `us-central1`). Secrets are never stored here, only the names
//! of the env vars or KMS keys that hold them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RefineryError, Result};
use crate::retry::{MAX_RETRIES, SLEEP_LENGTH_SECS};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "refinery.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".refinery";

// ---------------------------------------------------------------------------
// Config structs (matching refinery.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gcp: GcpConfig,

    /// Columnar analytics store.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Object store for raw payloads.
    #[serde(default)]
    pub objects: ObjectsConfig,

    /// Message bus.
    #[serde(default)]
    pub pubsub: PubSubConfig,

    #[serde(default)]
    pub tables: TablesConfig,

    #[serde(default)]
    pub topics: TopicsConfig,

    /// Retry defaults for external calls.
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub clearbit: ClearbitConfig,

    #[serde(default)]
    pub mobile: MobileConfig,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub wordpress: WordPressConfig,

    #[serde(default)]
    pub email_provider: EmailProviderConfig,

    /// Service lookup: publisher name -> service name -> topic.
    #[serde(default = "default_publishers")]
    pub publishers: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gcp: GcpConfig::default(),
            warehouse: WarehouseConfig::default(),
            objects: ObjectsConfig::default(),
            pubsub: PubSubConfig::default(),
            tables: TablesConfig::default(),
            topics: TopicsConfig::default(),
            retry: RetryConfig::default(),
            clearbit: ClearbitConfig::default(),
            mobile: MobileConfig::default(),
            crawler: CrawlerConfig::default(),
            wordpress: WordPressConfig::default(),
            email_provider: EmailProviderConfig::default(),
            publishers: default_publishers(),
        }
    }
}

fn default_publishers() -> BTreeMap<String, BTreeMap<String, String>> {
    let topics = TopicsConfig::default();
    let analytics: BTreeMap<String, String> = [
        ("clearbit_service", topics.clearbit_service),
        ("crawler_service", topics.crawler_service),
        ("mobile_friendly_service", topics.mobile_friendly_service),
        ("wordpress_plugin_lookup_service", topics.wordpress_plugin_lookup_service),
        ("email_provider_lookup_service", topics.email_provider_lookup_service),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut publishers = BTreeMap::new();
    publishers.insert("analytics".to_string(), analytics);
    publishers
}

/// `[gcp]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    #[serde(default = "default_project_id")]
    pub project_id: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Env var holding a static OAuth access token. When unset at runtime
    /// the metadata server is used instead.
    #[serde(default = "default_token_env")]
    pub access_token_env: String,

    #[serde(default = "default_metadata_url")]
    pub metadata_token_url: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            region: default_region(),
            access_token_env: default_token_env(),
            metadata_token_url: default_metadata_url(),
        }
    }
}

fn default_project_id() -> String {
    "infusionsoft-looker-poc".into()
}
fn default_region() -> String {
    "us-central1".into()
}
fn default_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".into()
}
fn default_metadata_url() -> String {
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
        .into()
}

/// Which analytics store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackend {
    BigQuery,
    Local,
}

/// `[warehouse]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    #[serde(default = "default_warehouse_backend")]
    pub backend: WarehouseBackend,

    #[serde(default = "default_dataset")]
    pub dataset: String,

    #[serde(default = "default_bigquery_endpoint")]
    pub endpoint: String,

    /// libSQL file used by the local backend.
    #[serde(default = "default_local_warehouse")]
    pub local_path: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            backend: default_warehouse_backend(),
            dataset: default_dataset(),
            endpoint: default_bigquery_endpoint(),
            local_path: default_local_warehouse(),
        }
    }
}

fn default_warehouse_backend() -> WarehouseBackend {
    WarehouseBackend::BigQuery
}
fn default_dataset() -> String {
    "the_refinery".into()
}
fn default_bigquery_endpoint() -> String {
    "https://bigquery.googleapis.com".into()
}
fn default_local_warehouse() -> String {
    "var/refinery/warehouse.db".into()
}

/// Which object store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectsBackend {
    Gcs,
    Local,
}

/// `[objects]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectsConfig {
    #[serde(default = "default_objects_backend")]
    pub backend: ObjectsBackend,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_gcs_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_local_objects")]
    pub local_root: String,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            backend: default_objects_backend(),
            bucket: default_bucket(),
            endpoint: default_gcs_endpoint(),
            local_root: default_local_objects(),
        }
    }
}

fn default_objects_backend() -> ObjectsBackend {
    ObjectsBackend::Gcs
}
fn default_bucket() -> String {
    "the_refinery".into()
}
fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".into()
}
fn default_local_objects() -> String {
    "var/refinery/objects".into()
}

/// Which publisher implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PubSubBackend {
    PubSub,
    Memory,
}

/// `[pubsub]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubConfig {
    #[serde(default = "default_pubsub_backend")]
    pub backend: PubSubBackend,

    #[serde(default = "default_pubsub_endpoint")]
    pub endpoint: String,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            backend: default_pubsub_backend(),
            endpoint: default_pubsub_endpoint(),
        }
    }
}

fn default_pubsub_backend() -> PubSubBackend {
    PubSubBackend::PubSub
}
fn default_pubsub_endpoint() -> String {
    "https://pubsub.googleapis.com".into()
}

/// `[tables]` section: analytics-store table names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    pub clearbit_company: String,
    pub clearbit_person: String,
    pub tags_history: String,
    pub tech_history: String,
    pub crawler: String,
    pub crawler_tech: String,
    pub mobile_friendly: String,
    pub wordpress_plugins: String,
    pub email_providers: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            clearbit_company: "clearbit_company".into(),
            clearbit_person: "clearbit_person".into(),
            tags_history: "tags_history".into(),
            tech_history: "tech_history".into(),
            crawler: "crawler".into(),
            crawler_tech: "crawler_tech_history".into(),
            mobile_friendly: "mobile_friendly".into(),
            wordpress_plugins: "wordpress_plugins".into(),
            email_providers: "email_providers".into(),
        }
    }
}

/// `[topics]` section: trigger topic of each service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub the_refinery: String,
    pub clearbit_service: String,
    pub crawler_service: String,
    pub mobile_friendly_service: String,
    pub wordpress_plugin_lookup_service: String,
    pub email_provider_lookup_service: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            the_refinery: "the_refinery".into(),
            clearbit_service: "the_refinery_clearbit_service".into(),
            crawler_service: "the_refinery_crawler_service".into(),
            mobile_friendly_service: "the_refinery_mobile_friendly_service".into(),
            wordpress_plugin_lookup_service: "the_refinery_wordpress_plugin_lookup_service"
                .into(),
            email_provider_lookup_service: "the_refinery_email_provider_lookup_service".into(),
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts, in seconds.
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            sleep_secs: default_sleep_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    MAX_RETRIES
}
fn default_sleep_secs() -> f64 {
    SLEEP_LENGTH_SECS
}

/// `[clearbit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearbitConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_clearbit_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_person_url")]
    pub person_url: String,

    #[serde(default = "default_company_url")]
    pub company_url: String,

    #[serde(default = "default_reveal_url")]
    pub reveal_url: String,

    #[serde(default = "default_person_version")]
    pub person_version: String,

    #[serde(default = "default_company_version")]
    pub company_version: String,

    #[serde(default = "default_reveal_version")]
    pub reveal_version: String,

    /// Upper bound on a single rate-limit wait, in seconds.
    #[serde(default = "default_max_rate_limit_wait")]
    pub max_rate_limit_wait_secs: u64,

    /// Encrypted key stored in the object store, decrypted with KMS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms: Option<KmsConfig>,
}

impl Default for ClearbitConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_clearbit_key_env(),
            person_url: default_person_url(),
            company_url: default_company_url(),
            reveal_url: default_reveal_url(),
            person_version: default_person_version(),
            company_version: default_company_version(),
            reveal_version: default_reveal_version(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait(),
            kms: None,
        }
    }
}

fn default_clearbit_key_env() -> String {
    "CLEARBIT_API_KEY".into()
}
fn default_person_url() -> String {
    "https://person-stream.clearbit.com".into()
}
fn default_company_url() -> String {
    "https://company-stream.clearbit.com".into()
}
fn default_reveal_url() -> String {
    "https://reveal.clearbit.com".into()
}
fn default_person_version() -> String {
    "2018-06-06".into()
}
fn default_company_version() -> String {
    "2017-09-12".into()
}
fn default_reveal_version() -> String {
    "2018-03-28".into()
}
fn default_max_rate_limit_wait() -> u64 {
    60
}

/// `[clearbit.kms]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmsConfig {
    pub location_id: String,
    pub key_ring_id: String,
    pub crypto_key_id: String,
    /// Object name of the ciphertext inside `objects.bucket`.
    pub ciphertext_blob: String,
    #[serde(default = "default_kms_endpoint")]
    pub endpoint: String,
}

fn default_kms_endpoint() -> String {
    "https://cloudkms.googleapis.com".into()
}

/// `[mobile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileConfig {
    #[serde(default = "default_mobile_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_mobile_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_mobile_attempts")]
    pub max_attempts: u32,

    /// Pause before the first request, to stay under the API's rate limit.
    #[serde(default = "default_mobile_pause")]
    pub pause_ms: u64,
}

impl Default for MobileConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_mobile_key_env(),
            endpoint: default_mobile_endpoint(),
            max_attempts: default_mobile_attempts(),
            pause_ms: default_mobile_pause(),
        }
    }
}

fn default_mobile_key_env() -> String {
    "MOBILE_FRIENDLY_API_KEY".into()
}
fn default_mobile_endpoint() -> String {
    "https://searchconsole.googleapis.com/v1/urlTestingTools/mobileFriendlyTest:run".into()
}
fn default_mobile_attempts() -> u32 {
    5
}
fn default_mobile_pause() -> u64 {
    1000
}

/// `[crawler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default = "default_crawl_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Whether to classify page text with the language API.
    #[serde(default = "default_true")]
    pub classify: bool,

    #[serde(default = "default_language_endpoint")]
    pub language_endpoint: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_crawl_timeout(),
            max_redirects: default_max_redirects(),
            classify: true,
            language_endpoint: default_language_endpoint(),
        }
    }
}

fn default_crawl_timeout() -> u64 {
    30
}
fn default_max_redirects() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_language_endpoint() -> String {
    "https://language.googleapis.com".into()
}

/// `[wordpress]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordPressConfig {
    #[serde(default = "default_svn_base")]
    pub svn_base: String,
}

impl Default for WordPressConfig {
    fn default() -> Self {
        Self {
            svn_base: default_svn_base(),
        }
    }
}

fn default_svn_base() -> String {
    "http://plugins.svn.wordpress.org".into()
}

/// `[email_provider]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailProviderConfig {
    #[serde(default = "default_mx_retries")]
    pub max_retries: u32,

    /// Resolver timeout per query, in seconds.
    #[serde(default = "default_mx_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailProviderConfig {
    fn default() -> Self {
        Self {
            max_retries: default_mx_retries(),
            timeout_secs: default_mx_timeout(),
        }
    }
}

fn default_mx_retries() -> u32 {
    15
}
fn default_mx_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.refinery/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| RefineryError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.refinery/refinery.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RefineryError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RefineryError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RefineryError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RefineryError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RefineryError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named `var_name`.
pub fn api_key_from_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(RefineryError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
