use tracing::instrument;

use refinery_lookups::{DnsResolver, MxResolver, email_provider_row, get_email_provider};
use refinery_shared::{RefineryError, RefineryRequest, Result};
use refinery_storage::schema::EMAIL_PROVIDER_SCHEMA;

use super::{ServiceKind, ServiceReport, insert};
use crate::context::ServiceContext;
use crate::progress::ProgressReporter;

/// Look up the domain's email providers through DNS.
pub async fn email_provider_lookup(
    ctx: &ServiceContext,
    request: RefineryRequest,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    let resolver = DnsResolver::new(&ctx.config.email_provider);
    email_provider_lookup_with(ctx, request, &resolver, progress).await
}

/// [`email_provider_lookup`] against any resolver.
#[instrument(skip_all, fields(domain = ?request.domain))]
pub async fn email_provider_lookup_with(
    ctx: &ServiceContext,
    request: RefineryRequest,
    resolver: &dyn MxResolver,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    let mut report = ServiceReport::new(ServiceKind::EmailProviderLookup);
    let domain = request
        .domain
        .clone()
        .ok_or_else(|| RefineryError::validation("request has no domain"))?;

    progress.phase("Looking up MX records");
    let providers =
        get_email_provider(resolver, &domain, ctx.config.email_provider.max_retries).await;

    insert(
        ctx,
        progress,
        &mut report,
        &ctx.config.tables.email_providers,
        &EMAIL_PROVIDER_SCHEMA,
        &[email_provider_row(&request, &providers)],
    )
    .await?;

    Ok(report)
}
