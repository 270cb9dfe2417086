//! Service orchestration for the Refinery.
//!
//! This crate ties the lookups, the crawler and the storage backends
//! together into the deployable services and the dispatcher that fans
//! requests out to them.

pub mod context;
pub mod params;
pub mod progress;
pub mod services;

pub use context::ServiceContext;
pub use params::{ServiceParams, get_service_params};
pub use progress::{ProgressReporter, SilentProgress};
pub use services::{RejectedRow, ServiceKind, ServiceReport, run_service};
