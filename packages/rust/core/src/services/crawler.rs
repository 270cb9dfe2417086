use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use refinery_crawler::{
    Classification, ContentClassifier, Fetcher, INVALID_DOMAIN, SiteProfile, UrlCheck,
    get_valid_url,
};
use refinery_shared::{RefineryError, RefineryRequest, Result};
use refinery_storage::schema::{CRAWLER_SCHEMA, CRAWLER_TECH_SCHEMA};

use super::{ServiceKind, ServiceReport, file_name, insert, publish, upload};
use crate::context::ServiceContext;
use crate::progress::ProgressReporter;

/// Crawl the request's site, store what it says about itself, and hand any
/// WordPress plugins to the plugin lookup.
#[instrument(skip_all, fields(domain = ?request.domain))]
pub async fn crawler(
    ctx: &ServiceContext,
    request: RefineryRequest,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    let mut report = ServiceReport::new(ServiceKind::Crawler);
    let id = file_name(&request)?;
    let target = request
        .domain
        .clone()
        .or_else(|| request.url.clone())
        .ok_or_else(|| RefineryError::validation("request has no domain or url"))?;

    let fetcher = Fetcher::new(&ctx.config.crawler)?;

    progress.phase("Validating URL");
    let check = get_valid_url(fetcher.client(), &target).await;

    let (profile, classification) = match &check {
        UrlCheck::Invalid => {
            info!(%target, "domain is invalid or unreachable");
            (SiteProfile::unreachable(INVALID_DOMAIN), Classification::unavailable())
        }
        UrlCheck::Valid(url) => {
            progress.phase("Crawling");
            let profile = match fetcher.crawl_and_parse(url).await {
                Ok(page) => SiteProfile::analyze(&page.url, &page.html),
                Err(e) => {
                    warn!(error = %e, "crawl failed");
                    SiteProfile::unreachable(url.as_str())
                }
            };
            progress.phase("Classifying content");
            let classification = classify(ctx, &profile).await;
            (profile, classification)
        }
    };

    progress.phase("Writing payloads");
    let payload = profile.crawler_payload(&request, &classification);
    upload(ctx, &mut report, &id, "crawler", &payload).await?;

    let tables = &ctx.config.tables;
    insert(
        ctx,
        progress,
        &mut report,
        &tables.crawler,
        &CRAWLER_SCHEMA,
        &[payload],
    )
    .await?;

    insert(
        ctx,
        progress,
        &mut report,
        &tables.crawler_tech,
        &CRAWLER_TECH_SCHEMA,
        &profile.tech_rows(&request),
    )
    .await?;

    if !profile.wp_plugins.is_empty() {
        progress.phase("Requesting plugin lookups");
        let mut follow_up = request;
        follow_up
            .extra
            .insert("wp_plugins".into(), Value::from(profile.wp_plugins.clone()));
        debug!(plugins = profile.wp_plugins.len(), "publishing plugin lookup");
        publish(
            ctx,
            &mut report,
            &ctx.config.topics.wordpress_plugin_lookup_service,
            &follow_up,
        )
        .await?;
    }

    Ok(report)
}

async fn classify(ctx: &ServiceContext, profile: &SiteProfile) -> Classification {
    if !ctx.config.crawler.classify {
        return Classification::unavailable();
    }

    let classifier = ContentClassifier::new(
        ctx.http.clone(),
        &ctx.config.crawler.language_endpoint,
        ctx.tokens.clone(),
    );
    match classifier.classify(&profile.text).await {
        Ok(categories) => Classification::from_categories(&categories),
        Err(e) => {
            warn!(error = %e, "classification failed");
            Classification::unavailable()
        }
    }
}
