use tracing::{info, instrument};

use refinery_shared::{RefineryRequest, Result};

use super::{ServiceKind, ServiceReport, publish};
use crate::context::ServiceContext;
use crate::params::get_service_params;
use crate::progress::ProgressReporter;

/// Stamp the request and fan it out to every requested service's topic.
#[instrument(skip_all, fields(publisher = ?request.publisher))]
pub async fn dispatch(
    ctx: &ServiceContext,
    mut request: RefineryRequest,
    progress: &dyn ProgressReporter,
) -> Result<ServiceReport> {
    let mut report = ServiceReport::new(ServiceKind::Dispatch);

    request.stamp();
    let params = get_service_params(&ctx.config, &request)?;

    progress.phase("Publishing to services");
    for (service, topic) in params.services.iter().zip(&params.endpoints) {
        info!(%service, %topic, "dispatching");
        publish(ctx, &mut report, topic, &request).await?;
    }

    Ok(report)
}
