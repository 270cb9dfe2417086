//! Firmographic enrichment: the Clearbit API client and payload builders.
//!
//! - [`client`]: person/company/reveal lookups with retry and rate-limit handling
//! - [`status`]: what each response status means
//! - [`payload`]: flattening responses into analytics rows
//! - [`secrets`]: API key from the environment or KMS

pub mod client;
pub mod payload;
pub mod secrets;
pub mod status;

pub use client::{ClearbitClient, Lookup, RateLimitWindow};
pub use payload::{
    make_company_payload, make_person_payload, make_tags_payload, make_tech_payload, tag_rows,
    tech_rows,
};
pub use secrets::{decrypt_with_kms, resolve_api_key};
pub use status::{ErrorPayload, is_retryable};
