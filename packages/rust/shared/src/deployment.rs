//! Deployment descriptors for each cloud function.

use serde::Serialize;

/// How one function is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunctionDeployment {
    pub name: &'static str,
    pub region: &'static str,
    pub timeout: &'static str,
    pub memory: &'static str,
    /// Topic that triggers the function.
    pub trigger: &'static str,
    pub entry_point: &'static str,
    pub source: &'static str,
}

impl FunctionDeployment {
    const fn new(name: &'static str, entry_point: &'static str, source: &'static str) -> Self {
        Self {
            name,
            region: "us-central1",
            timeout: "540s",
            memory: "512MB",
            trigger: name,
            entry_point,
            source,
        }
    }

    /// Fully qualified resource name within `project`.
    pub fn full_name(&self, project: &str) -> String {
        format!(
            "projects/{project}/locations/{}/functions/{}",
            self.region, self.name
        )
    }
}

pub const DISPATCH: FunctionDeployment = FunctionDeployment::new(
    "the_refinery",
    "run_the_refinery",
    "/cloud_functions/services/the_refinery/",
);

pub const CLEARBIT: FunctionDeployment = FunctionDeployment::new(
    "the_refinery_clearbit_service",
    "run_clearbit_service",
    "/cloud_functions/services/clearbit_service/",
);

pub const CRAWLER: FunctionDeployment = FunctionDeployment::new(
    "the_refinery_crawler_service",
    "run_crawler_service",
    "/cloud_functions/services/crawler_service/",
);

pub const MOBILE_FRIENDLY: FunctionDeployment = FunctionDeployment::new(
    "the_refinery_mobile_friendly_service",
    "run_mobile_friendly_service",
    "/cloud_functions/services/mobile_friendly_service/",
);

pub const WORDPRESS_PLUGIN_LOOKUP: FunctionDeployment = FunctionDeployment::new(
    "the_refinery_wordpress_plugin_lookup_service",
    "run_wordpress_plugin_lookup_service",
    "/cloud_functions/services/wordpress_plugin_lookup_service/",
);

pub const EMAIL_PROVIDER_LOOKUP: FunctionDeployment = FunctionDeployment::new(
    "the_refinery_email_provider_lookup_service",
    "run_email_provider_lookup_service",
    "/cloud_functions/services/email_provider_lookup_service/",
);

/// Every deployed function, dispatcher first.
pub const ALL: [FunctionDeployment; 6] = [
    DISPATCH,
    CLEARBIT,
    CRAWLER,
    MOBILE_FRIENDLY,
    WORDPRESS_PLUGIN_LOOKUP,
    EMAIL_PROVIDER_LOOKUP,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_includes_region() {
        assert_eq!(
            CRAWLER.full_name("my-project"),
            "projects/my-project/locations/us-central1/functions/the_refinery_crawler_service"
        );
    }

    #[test]
    fn triggers_match_names() {
        for d in ALL {
            assert_eq!(d.trigger, d.name);
            assert_eq!(d.timeout, "540s");
        }
    }
}
