//! Service handlers: one per cloud function, plus the dispatcher.
//!
//! Every handler follows the same shape: call out (with retries), reshape
//! the response into payloads, write payloads to the object store, insert
//! rows, and publish follow-up requests where needed.

mod clearbit;
mod crawler;
mod dispatch;
mod email_provider;
mod mobile;
mod wordpress;

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use tracing::{info, instrument};

use refinery_shared::deployment::{self, FunctionDeployment};
use refinery_shared::{Record, RefineryError, RefineryRequest, Result};
use refinery_storage::{TableSchema, decode_event, insert_rows, upload_payload};

use crate::context::ServiceContext;
use crate::progress::ProgressReporter;

pub use clearbit::{clearbit, clearbit_with_client};
pub use crawler::crawler;
pub use dispatch::dispatch;
pub use email_provider::{email_provider_lookup, email_provider_lookup_with};
pub use mobile::{mobile_friendly, mobile_friendly_with_key};
pub use wordpress::wordpress_plugin_lookup;

/// The six deployable functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Dispatch,
    Clearbit,
    Crawler,
    MobileFriendly,
    WordPressPluginLookup,
    EmailProviderLookup,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 6] = [
        Self::Dispatch,
        Self::Clearbit,
        Self::Crawler,
        Self::MobileFriendly,
        Self::WordPressPluginLookup,
        Self::EmailProviderLookup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dispatch => "the_refinery",
            Self::Clearbit => "clearbit",
            Self::Crawler => "crawler",
            Self::MobileFriendly => "mobile_friendly",
            Self::WordPressPluginLookup => "wordpress_plugin_lookup",
            Self::EmailProviderLookup => "email_provider_lookup",
        }
    }

    pub fn deployment(&self) -> FunctionDeployment {
        match self {
            Self::Dispatch => deployment::DISPATCH,
            Self::Clearbit => deployment::CLEARBIT,
            Self::Crawler => deployment::CRAWLER,
            Self::MobileFriendly => deployment::MOBILE_FRIENDLY,
            Self::WordPressPluginLookup => deployment::WORDPRESS_PLUGIN_LOOKUP,
            Self::EmailProviderLookup => deployment::EMAIL_PROVIDER_LOOKUP,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServiceKind {
    type Err = RefineryError;

    /// Accepts short names (`crawler`), service names (`crawler_service`)
    /// and function names (`the_refinery_crawler_service`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "the_refinery" || s == "dispatch" {
            return Ok(Self::Dispatch);
        }
        let short = s.strip_prefix("the_refinery_").unwrap_or(s);
        let short = short.strip_suffix("_service").unwrap_or(short);
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == short)
            .ok_or_else(|| RefineryError::validation(format!("unknown service: {s}")))
    }
}

/// A row the analytics store (or local validation) refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub table: String,
    pub index: usize,
    pub message: String,
}

/// What one service run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceReport {
    pub service: String,
    pub rows_inserted: usize,
    pub row_errors: Vec<RejectedRow>,
    /// Object names written to the bucket.
    pub objects_written: Vec<String>,
    /// Message ids returned by the publisher.
    pub messages_published: Vec<String>,
}

impl ServiceReport {
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            service: kind.name().to_string(),
            ..Self::default()
        }
    }
}

/// Decode a pub/sub `event` and run `kind` on the request inside it.
#[instrument(skip_all, fields(service = %kind))]
pub async fn run_service(
    kind: ServiceKind,
    ctx: &ServiceContext,
    event: &Value,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    progress.phase("Decoding event");
    let request = decode_event(event)?;

    let report = match kind {
        ServiceKind::Dispatch => dispatch(ctx, request, progress).await?,
        ServiceKind::Clearbit => clearbit(ctx, request, progress).await?,
        ServiceKind::Crawler => crawler(ctx, request, progress).await?,
        ServiceKind::MobileFriendly => mobile_friendly(ctx, request, progress).await?,
        ServiceKind::WordPressPluginLookup => {
            wordpress_plugin_lookup(ctx, request, progress).await?
        }
        ServiceKind::EmailProviderLookup => {
            email_provider_lookup(ctx, request, progress).await?
        }
    };

    info!(
        rows = report.rows_inserted,
        row_errors = report.row_errors.len(),
        objects = report.objects_written.len(),
        messages = report.messages_published.len(),
        "service finished"
    );
    progress.done(&report);
    Ok(report)
}

// ---------------------------------------------------------------------------
// Helpers shared by the handlers
// ---------------------------------------------------------------------------

/// Insert `rows` into `table` and fold the outcome into `report`.
async fn insert(
    ctx: &ServiceContext,
    progress: &dyn ProgressReporter,
    report: &mut ServiceReport,
    table: &str,
    schema: &TableSchema,
    rows: &[Record],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let outcome = insert_rows(
        ctx.warehouse.as_ref(),
        table,
        schema,
        rows,
        &ctx.insert_policy(),
    )
    .await?;

    progress.rows_inserted(table, outcome.inserted, outcome.row_errors.len());
    report.rows_inserted += outcome.inserted;
    report
        .row_errors
        .extend(outcome.row_errors.into_iter().map(|e| RejectedRow {
            table: table.to_string(),
            index: e.index,
            message: e.message,
        }));
    Ok(())
}

/// Write `payload` as `<file_name>_<suffix>.json`.
async fn upload(
    ctx: &ServiceContext,
    report: &mut ServiceReport,
    file_name: &str,
    suffix: &str,
    payload: &Record,
) -> Result<()> {
    let name = upload_payload(
        ctx.objects.as_ref(),
        &ctx.config.objects.bucket,
        file_name,
        suffix,
        &Value::Object(payload.clone()),
    )
    .await?;
    report.objects_written.push(name);
    Ok(())
}

async fn publish(
    ctx: &ServiceContext,
    report: &mut ServiceReport,
    topic: &str,
    request: &RefineryRequest,
) -> Result<()> {
    let id = ctx
        .publisher
        .publish(topic, &Value::Object(request.to_record()))
        .await?;
    report.messages_published.push(id);
    Ok(())
}

/// Object names are keyed by the request's row id.
fn file_name(request: &RefineryRequest) -> Result<String> {
    request
        .row_id()
        .map(String::from)
        .ok_or_else(|| RefineryError::validation("request has no refinery_id"))
}
