use tracing::{info, instrument};

use refinery_crawler::validate::candidate_url;
use refinery_lookups::{MobileFriendlyClient, mobile_row};
use refinery_shared::{RefineryError, RefineryRequest, Result, api_key_from_env};
use refinery_storage::schema::MOBILE_FRIENDLY_SCHEMA;

use super::{ServiceKind, ServiceReport, insert};
use crate::context::ServiceContext;
use crate::progress::ProgressReporter;

/// Run the mobile-friendly test for the request's URL.
pub async fn mobile_friendly(
    ctx: &ServiceContext,
    request: RefineryRequest,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    let api_key = api_key_from_env(&ctx.config.mobile.api_key_env)?;
    mobile_friendly_with_key(ctx, request, &api_key, progress).await
}

/// [`mobile_friendly`] with an explicit API key.
#[instrument(skip_all, fields(url = ?request.url))]
pub async fn mobile_friendly_with_key(
    ctx: &ServiceContext,
    mut request: RefineryRequest,
    api_key: &str,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    let mut report = ServiceReport::new(ServiceKind::MobileFriendly);

    if request.url.is_none() {
        request.url = request
            .domain
            .as_deref()
            .and_then(candidate_url)
            .map(|u| u.to_string());
    }
    let url = request
        .url
        .clone()
        .ok_or_else(|| RefineryError::validation("request has no url or domain"))?;

    progress.phase("Running mobile-friendly test");
    let client = MobileFriendlyClient::new(ctx.http.clone(), &ctx.config.mobile, api_key);
    let results = client.check(&url).await;
    info!(%results, "mobile-friendly test done");

    insert(
        ctx,
        progress,
        &mut report,
        &ctx.config.tables.mobile_friendly,
        &MOBILE_FRIENDLY_SCHEMA,
        &[mobile_row(&request, &results)],
    )
    .await?;

    Ok(report)
}
