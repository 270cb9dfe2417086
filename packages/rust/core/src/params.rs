//! Which services a request asks for, and where their triggers live.

use refinery_shared::{AppConfig, RefineryError, RefineryRequest, Result};

/// The dispatcher's routing decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceParams {
    pub publisher: String,
    pub services: Vec<String>,
    /// Trigger topic of each entry in `services`, in the same order.
    pub endpoints: Vec<String>,
}

/// Resolve the request's `services_requested` through `[publishers.<publisher>]`.
pub fn get_service_params(config: &AppConfig, request: &RefineryRequest) -> Result<ServiceParams> {
    let publisher = request
        .publisher
        .as_deref()
        .ok_or_else(|| RefineryError::validation("request has no publisher"))?;

    let lookup = config.publishers.get(publisher).ok_or_else(|| {
        RefineryError::validation(format!("unknown publisher: {publisher}"))
    })?;

    let endpoints = request
        .services_requested
        .iter()
        .map(|service| {
            lookup.get(service).cloned().ok_or_else(|| {
                RefineryError::validation(format!(
                    "publisher {publisher} has no service named {service}"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ServiceParams {
        publisher: publisher.to_string(),
        services: request.services_requested.clone(),
        endpoints,
    })
}
