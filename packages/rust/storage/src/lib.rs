//! Storage backends for the Refinery.
//!
//! Services write through three seams, each an `async_trait` so offline runs
//! and tests can swap the cloud implementation for a local one:
//! - [`Warehouse`]: columnar analytics store (BigQuery REST or local libSQL)
//! - [`ObjectStore`]: raw JSON payloads (GCS REST or local files)
//! - [`Publisher`]: hand-off messages (Pub/Sub REST or in-memory)
//!
//! Table layouts live in [`schema`].

pub mod auth;
pub mod event;
pub mod local;
pub mod objects;
pub mod pubsub;
pub mod schema;
pub mod warehouse;

pub use auth::TokenSource;
pub use event::{decode_event, encode_message, event_from_message};
pub use local::LocalWarehouse;
pub use objects::{
    GcsObjectStore, LocalObjectStore, ObjectStore, payload_object_name, upload_payload,
};
pub use pubsub::{MemoryPublisher, PubSubPublisher, Publisher};
pub use schema::{FieldType, Mode, SchemaField, TableSchema};
pub use warehouse::{
    BigQueryWarehouse, InsertReport, PendingRow, RowError, Warehouse, insert_rows,
};
