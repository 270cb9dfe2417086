//! Enrichment API client with bounded retries and rate-limit windows.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use refinery_shared::{ClearbitConfig, RefineryError, Result, RetryPolicy};

use crate::status::{ErrorPayload, is_retryable};

/// Reset values above this are epoch seconds; below, seconds remaining.
const EPOCH_THRESHOLD: u64 = 1_000_000_000;

/// Result of one lookup after retries.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Value),
    Missing(ErrorPayload),
}

impl Lookup {
    pub fn found(&self) -> Option<&Value> {
        match self {
            Self::Found(value) => Some(value),
            Self::Missing(_) => None,
        }
    }
}

/// The quota window reported in `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<u64>,
}

impl RateLimitWindow {
    /// `None` when the response carries no rate-limit headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let window = Self {
            limit: header_u64(headers, "x-ratelimit-limit"),
            remaining: header_u64(headers, "x-ratelimit-remaining"),
            reset: header_u64(headers, "x-ratelimit-reset"),
        };
        (window.limit.is_some() || window.remaining.is_some() || window.reset.is_some())
            .then_some(window)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Time until the window resets, measured from `now` (epoch seconds).
    pub fn until_reset(&self, now: u64) -> Option<Duration> {
        self.reset.map(|reset| reset_wait(reset, now))
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.ceil() as u64)
}

fn reset_wait(reset: u64, now: u64) -> Duration {
    if reset > EPOCH_THRESHOLD {
        Duration::from_secs(reset.saturating_sub(now))
    } else {
        Duration::from_secs(reset)
    }
}

fn now_epoch() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

/// A window together with the instant its reset falls due.
#[derive(Debug, Clone, Copy)]
struct SeenWindow {
    window: RateLimitWindow,
    deadline: Option<Instant>,
}

impl SeenWindow {
    fn observed(window: RateLimitWindow, now: u64) -> Self {
        let deadline = window.until_reset(now).map(|wait| Instant::now() + wait);
        Self { window, deadline }
    }

    fn remaining(&self) -> Duration {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }
}

/// Wait requested by a 429: `Retry-After`, else the window reset.
fn throttle_wait(headers: &HeaderMap, now: u64) -> Option<Duration> {
    header_u64(headers, "retry-after")
        .map(Duration::from_secs)
        .or_else(|| RateLimitWindow::from_headers(headers).and_then(|w| w.until_reset(now)))
}

/// Client for the person, company and reveal endpoints.
pub struct ClearbitClient {
    client: Client,
    api_key: String,
    config: ClearbitConfig,
    policy: RetryPolicy,
    max_wait: Duration,
    window: Mutex<Option<SeenWindow>>,
}

impl ClearbitClient {
    pub fn new(client: Client, api_key: String, config: ClearbitConfig, policy: RetryPolicy) -> Self {
        let max_wait = Duration::from_secs(config.max_rate_limit_wait_secs);
        Self {
            client,
            api_key,
            config,
            policy,
            max_wait,
            window: Mutex::new(None),
        }
    }

    /// Person and company by email (`{"person": .., "company": ..}`).
    pub async fn find_combined(&self, email: &str) -> Result<Lookup> {
        let url = format!("{}/v2/combined/find", self.config.person_url.trim_end_matches('/'));
        self.lookup(&url, &self.config.person_version, ("email", email))
            .await
    }

    /// Company by domain.
    pub async fn find_company(&self, domain: &str) -> Result<Lookup> {
        let url = format!("{}/v2/companies/find", self.config.company_url.trim_end_matches('/'));
        self.lookup(&url, &self.config.company_version, ("domain", domain))
            .await
    }

    /// Company behind an IP address.
    pub async fn reveal(&self, ip: &str) -> Result<Lookup> {
        let url = format!("{}/v1/companies/find", self.config.reveal_url.trim_end_matches('/'));
        self.lookup(&url, &self.config.reveal_version, ("ip", ip)).await
    }

    /// The last window seen, if any.
    pub async fn window(&self) -> Option<RateLimitWindow> {
        self.window.lock().await.map(|seen| seen.window)
    }

    async fn wait_for_window(&self) {
        let mut guard = self.window.lock().await;
        let Some(seen) = guard.as_ref().filter(|s| s.window.is_exhausted()) else {
            return;
        };
        let wait = seen.remaining().min(self.max_wait);
        *guard = None;
        drop(guard);

        if !wait.is_zero() {
            info!(wait_secs = wait.as_secs(), "rate-limit window exhausted, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    #[instrument(skip_all, fields(url = %url, param = query.0))]
    async fn lookup(&self, url: &str, version: &str, query: (&str, &str)) -> Result<Lookup> {
        let mut last_status: Option<u16> = None;

        for attempt in 0..self.policy.max_attempts {
            self.wait_for_window().await;

            let sent = self
                .client
                .get(url)
                .query(&[query])
                .bearer_auth(&self.api_key)
                .header("API-Version", version)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "lookup transport error");
                    self.policy.pause(attempt).await;
                    continue;
                }
            };

            let status = response.status().as_u16();
            last_status = Some(status);
            if let Some(window) = RateLimitWindow::from_headers(response.headers()) {
                *self.window.lock().await = Some(SeenWindow::observed(window, now_epoch()));
            }

            match status {
                200 => {
                    let body: Value = response
                        .json()
                        .await
                        .map_err(|e| RefineryError::parse(format!("lookup body: {e}")))?;
                    debug!(attempt, "lookup found");
                    return Ok(Lookup::Found(body));
                }
                429 => {
                    let wait = throttle_wait(response.headers(), now_epoch())
                        .unwrap_or_else(|| self.policy.delay_for(attempt))
                        .min(self.max_wait);
                    warn!(attempt, wait_secs = wait.as_secs(), "rate limited");
                    if !self.policy.is_last(attempt) {
                        if !wait.is_zero() {
                            tokio::time::sleep(wait).await;
                        }
                        *self.window.lock().await = None;
                    }
                }
                s if is_retryable(s) => {
                    debug!(attempt, status = s, "lookup not ready, retrying");
                    self.policy.pause(attempt).await;
                }
                s => {
                    debug!(status = s, "lookup missing");
                    return Ok(Lookup::Missing(ErrorPayload::for_status(s)));
                }
            }
        }

        warn!(attempts = self.policy.max_attempts, ?last_status, "lookup attempts exhausted");
        Ok(Lookup::Missing(match last_status {
            Some(status) => ErrorPayload::for_status(status),
            None => ErrorPayload::unknown("unknown"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, attempts: u32) -> ClearbitClient {
        client_waiting(server, attempts, 0)
    }

    fn client_waiting(server: &MockServer, attempts: u32, max_wait_secs: u64) -> ClearbitClient {
        let config = ClearbitConfig {
            person_url: server.uri(),
            company_url: server.uri(),
            reveal_url: server.uri(),
            max_rate_limit_wait_secs: max_wait_secs,
            ..ClearbitConfig::default()
        };
        ClearbitClient::new(
            Client::new(),
            "sk_test".into(),
            config,
            RetryPolicy::immediate(attempts),
        )
    }

    #[test]
    fn window_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(RateLimitWindow::from_headers(&headers).is_none());

        headers.insert("X-RateLimit-Limit", HeaderValue::from_static("600"));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
        headers.insert("X-RateLimit-Reset", HeaderValue::from_static("12"));
        let window = RateLimitWindow::from_headers(&headers).unwrap();
        assert_eq!(window.limit, Some(600));
        assert!(window.is_exhausted());
        assert_eq!(window.until_reset(1_600_000_000), Some(Duration::from_secs(12)));
    }

    #[test]
    fn epoch_reset_is_relative_to_now() {
        assert_eq!(reset_wait(1_600_000_030, 1_600_000_000), Duration::from_secs(30));
        assert_eq!(reset_wait(1_500_000_000, 1_600_000_000), Duration::ZERO);
        assert_eq!(reset_wait(45, 1_600_000_000), Duration::from_secs(45));
    }

    #[test]
    fn retry_after_wins_over_reset() {
        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", HeaderValue::from_static("3"));
        headers.insert("X-RateLimit-Reset", HeaderValue::from_static("50"));
        assert_eq!(throttle_wait(&headers, 0), Some(Duration::from_secs(3)));

        headers.remove("Retry-After");
        assert_eq!(throttle_wait(&headers, 0), Some(Duration::from_secs(50)));
    }

    #[tokio::test]
    async fn company_found_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/companies/find"))
            .and(query_param("domain", "example.com"))
            .and(header("authorization", "Bearer sk_test"))
            .and(header("API-Version", "2017-09-12"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-RateLimit-Remaining", "599")
                    .set_body_json(json!({"id": "c1", "name": "Example"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 3);
        let lookup = client.find_company("example.com").await.unwrap();
        assert_eq!(lookup.found().unwrap()["name"], "Example");
        assert_eq!(client.window().await.unwrap().remaining, Some(599));
    }

    #[tokio::test]
    async fn queued_then_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/combined/find"))
            .respond_with(ResponseTemplate::new(202))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/combined/find"))
            .and(header("API-Version", "2018-06-06"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"person": {"id": "p1"}, "company": null})),
            )
            .mount(&server)
            .await;

        let lookup = client_for(&server, 3)
            .find_combined("alex@example.com")
            .await
            .unwrap();
        assert_eq!(lookup.found().unwrap()["person"]["id"], "p1");
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let lookup = client_for(&server, 3).find_company("nope.example").await.unwrap();
        assert_eq!(lookup, Lookup::Missing(ErrorPayload::for_status(404)));
    }

    #[tokio::test]
    async fn server_errors_exhaust_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let lookup = client_for(&server, 3).reveal("203.0.113.7").await.unwrap();
        assert_eq!(lookup, Lookup::Missing(ErrorPayload::for_status(503)));
    }

    #[tokio::test]
    async fn rate_limited_then_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/companies/find"))
            .and(query_param("ip", "203.0.113.7"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("X-RateLimit-Remaining", "0")
                    .insert_header("X-RateLimit-Reset", "1"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/companies/find"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"domain": "example.com"})))
            .mount(&server)
            .await;

        let client = client_for(&server, 2);
        let lookup = client.reveal("203.0.113.7").await.unwrap();
        assert_eq!(lookup.found().unwrap()["domain"], "example.com");
        assert_eq!(client.window().await, None);
    }

    #[tokio::test]
    async fn rate_limit_reset_is_waited_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/companies/find"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("X-RateLimit-Remaining", "0")
                    .insert_header("X-RateLimit-Reset", "1"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/companies/find"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "c1"})))
            .mount(&server)
            .await;

        let client = client_waiting(&server, 3, 10);
        let started = std::time::Instant::now();
        let lookup = client.find_company("example.com").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(lookup.found().unwrap()["id"], "c1");
        assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1800), "{elapsed:?}");
    }

    #[tokio::test]
    async fn stale_window_waits_only_what_is_left() {
        let server = MockServer::start().await;
        let client = client_waiting(&server, 1, 10);
        let window = RateLimitWindow {
            limit: Some(600),
            remaining: Some(0),
            reset: Some(5),
        };
        *client.window.lock().await = Some(SeenWindow {
            window,
            deadline: Some(Instant::now() + Duration::from_millis(200)),
        });

        let started = std::time::Instant::now();
        client.wait_for_window().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(client.window().await, None);

        let seen = SeenWindow::observed(window, now_epoch());
        assert!(seen.remaining() <= Duration::from_secs(5));
        assert!(seen.remaining() > Duration::from_secs(4));
    }

    #[tokio::test]
    async fn transport_errors_are_unknown() {
        let config = ClearbitConfig {
            company_url: "http://127.0.0.1:1".into(),
            ..ClearbitConfig::default()
        };
        let client = ClearbitClient::new(
            Client::new(),
            "k".into(),
            config,
            RetryPolicy::immediate(2),
        );
        let lookup = client.find_company("example.com").await.unwrap();
        assert_eq!(lookup, Lookup::Missing(ErrorPayload::unknown("unknown")));
    }
}
