//! Client for the mobile-friendly URL test.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use refinery_shared::{MobileConfig, Record, RefineryRequest, identity_record};

pub struct MobileFriendlyClient {
    client: Client,
    endpoint: String,
    api_key: String,
    max_attempts: u32,
    pause: Duration,
}

impl MobileFriendlyClient {
    pub fn new(client: Client, config: &MobileConfig, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            max_attempts: config.max_attempts.max(1),
            pause: Duration::from_millis(config.pause_ms),
        }
    }

    /// Run the test for `url` and describe the outcome in one string.
    ///
    /// Gives the lowercased verdict (`mobile_friendly`) when the test
    /// completed, the test status otherwise, and `"<code>: <reason>"` when
    /// the API never answered successfully.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn check(&self, url: &str) -> String {
        if !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }

        let mut last_status: Option<StatusCode> = None;
        let mut last_error: Option<String> = None;

        for attempt in 0..self.max_attempts {
            let sent = self
                .client
                .post(&self.endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(&json!({ "url": url }))
                .send()
                .await;

            let response = match sent {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "mobile test request failed");
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                warn!(attempt = attempt + 1, %status, "mobile test attempt failed");
                last_status = Some(status);
                continue;
            }

            match response.json::<Value>().await {
                Ok(body) => {
                    debug!("mobile test answered");
                    return interpret(&body);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "mobile test body unreadable");
                    last_error = Some(e.to_string());
                }
            }
        }

        match (last_status, last_error) {
            (Some(status), _) => format!(
                "{}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown")
            ),
            (None, Some(error)) => format!("unknown: {error}"),
            (None, None) => "unknown".to_string(),
        }
    }
}

/// Error statuses also come back as 200s, so the body decides.
fn interpret(body: &Value) -> String {
    let test_status = &body["testStatus"];
    let status = test_status["status"].as_str().unwrap_or_default();

    if status == "COMPLETE" {
        return body["mobileFriendliness"]
            .as_str()
            .unwrap_or_default()
            .to_lowercase();
    }

    match test_status["details"].as_str() {
        Some(details) => format!("{status} : {details}"),
        None => status.to_string(),
    }
}

/// A mobile friendly table row.
pub fn mobile_row(request: &RefineryRequest, results: &str) -> Record {
    let mut row = identity_record(request);
    row.insert("test_results".into(), Value::String(results.to_string()));
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> MobileFriendlyClient {
        let config = MobileConfig {
            endpoint: format!("{}/v1/mobileFriendlyTest:run", server.uri()),
            pause_ms: 0,
            ..MobileConfig::default()
        };
        MobileFriendlyClient::new(Client::new(), &config, "k")
    }

    #[test]
    fn interprets_bodies() {
        let complete = json!({
            "testStatus": {"status": "COMPLETE"},
            "mobileFriendliness": "MOBILE_FRIENDLY"
        });
        assert_eq!(interpret(&complete), "mobile_friendly");

        let failed = json!({
            "testStatus": {"status": "PAGE_UNREACHABLE", "details": "Timed out"}
        });
        assert_eq!(interpret(&failed), "PAGE_UNREACHABLE : Timed out");

        let bare = json!({ "testStatus": {"status": "INTERNAL_ERROR"} });
        assert_eq!(interpret(&bare), "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn completed_test() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("key", "k"))
            .and(body_json(json!({ "url": "http://www.example.com/" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "testStatus": {"status": "COMPLETE"},
                "mobileFriendliness": "NOT_MOBILE_FRIENDLY"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).check("http://www.example.com/").await;
        assert_eq!(result, "not_mobile_friendly");
    }

    #[tokio::test]
    async fn gives_up_after_five_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(5)
            .mount(&server)
            .await;

        let result = client(&server).check("http://www.example.com/").await;
        assert_eq!(result, "502: Bad Gateway");
    }

    #[tokio::test]
    async fn transport_failures_are_unknown() {
        let config = MobileConfig {
            endpoint: "http://127.0.0.1:9/run".into(),
            max_attempts: 2,
            pause_ms: 0,
            ..MobileConfig::default()
        };
        let result = MobileFriendlyClient::new(Client::new(), &config, "k")
            .check("http://www.example.com/")
            .await;
        assert!(result.starts_with("unknown: "), "{result}");
    }

    #[test]
    fn row_shape() {
        let request = RefineryRequest {
            refinery_id: Some("r1".into()),
            url: Some("http://www.example.com/".into()),
            ..RefineryRequest::default()
        };
        let row = mobile_row(&request, "mobile_friendly");
        assert_eq!(row["url"], "http://www.example.com/");
        assert_eq!(row["test_results"], "mobile_friendly");
    }
}
