use tracing::{debug, instrument};

use refinery_crawler::Fetcher;
use refinery_shared::{RefineryRequest, Result};
use refinery_storage::schema::WORDPRESS_PLUGIN_SCHEMA;
use refinery_wordpress::PluginLookup;

use super::{ServiceKind, ServiceReport, insert};
use crate::context::ServiceContext;
use crate::progress::ProgressReporter;

/// Look up every plugin in the request's `wp_plugins` and store one row each.
#[instrument(skip_all, fields(domain = ?request.domain))]
pub async fn wordpress_plugin_lookup(
    ctx: &ServiceContext,
    request: RefineryRequest,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    let mut report = ServiceReport::new(ServiceKind::WordPressPluginLookup);
    let plugins = request.extra_strings("wp_plugins");
    if plugins.is_empty() {
        debug!("no plugins to look up");
        return Ok(report);
    }

    let lookup = PluginLookup::new(
        Fetcher::new(&ctx.config.crawler)?,
        ctx.config.wordpress.svn_base.clone(),
        ctx.retry_policy(),
    );

    progress.phase("Looking up plugins");
    let mut rows = Vec::with_capacity(plugins.len());
    for plugin in &plugins {
        let info = lookup.get_plugin_info(plugin).await;
        rows.push(info.to_row(&request));
    }

    insert(
        ctx,
        progress,
        &mut report,
        &ctx.config.tables.wordpress_plugins,
        &WORDPRESS_PLUGIN_SCHEMA,
        &rows,
    )
    .await?;

    Ok(report)
}
