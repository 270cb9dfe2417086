//! Shared types, error model, and configuration for the Refinery.
//!
//! This crate is the foundation depended on by all other Refinery crates.
//! It provides:
//! - [`RefineryError`]: the unified error type
//! - Domain types ([`RefineryRequest`], [`Record`])
//! - Configuration ([`AppConfig`], config loading)
//! - [`RetryPolicy`] for bounded external-call retries
//! - [`fields`]: declarative payload flattening
//! - [`deployment`]: cloud function descriptors

pub mod config;
pub mod deployment;
pub mod error;
pub mod fields;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClearbitConfig, CrawlerConfig, EmailProviderConfig, GcpConfig, KmsConfig,
    MobileConfig, ObjectsBackend, ObjectsConfig, PubSubBackend, PubSubConfig, RetryConfig,
    TablesConfig, TopicsConfig, WarehouseBackend, WarehouseConfig, WordPressConfig,
    api_key_from_env, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{RefineryError, Result};
pub use fields::{FieldSpec, Transform, copy_request_fields, flatten};
pub use retry::{Delay, MAX_RETRIES, RetryPolicy, SLEEP_LENGTH_SECS};
pub use types::{LIST_DELIMITER, Record, RefineryRequest, identity_record, join_list};
