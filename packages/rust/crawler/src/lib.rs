//! Website crawling and HTML extraction.
//!
//! This crate provides:
//! - [`validate`]: turning a domain into a URL that answers
//! - [`fetch`]: page downloads with a browser identity
//! - [`extract`]: links, contacts, meta tags and WordPress assets
//! - [`classify`]: page text classification
//! - [`profile`]: the crawler payload and tech rows for one site

pub mod classify;
pub mod extract;
pub mod fetch;
pub mod profile;
pub mod validate;

pub use classify::{Classification, ContentClassifier, NO_CATEGORY};
pub use extract::Hrefs;
pub use fetch::{BROWSER_USER_AGENT, FetchedPage, Fetcher};
pub use profile::SiteProfile;
pub use validate::{INVALID_DOMAIN, UrlCheck, get_valid_url, is_valid_domain};
