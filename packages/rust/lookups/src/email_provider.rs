//! Email provider detection from a domain's MX records.

use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use refinery_shared::{EmailProviderConfig, Record, RefineryRequest, identity_record, join_list};

/// One MX answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub preference: u16,
    /// Mail exchanger host, usually fully qualified (`aspmx.l.google.com.`).
    pub exchange: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxError {
    /// The name exists without MX records, or does not exist at all.
    NoRecords,
    Timeout,
    Other(String),
}

impl std::fmt::Display for MxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRecords => f.write_str("no MX records"),
            Self::Timeout => f.write_str("timed out"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

#[async_trait]
pub trait MxResolver: Send + Sync {
    async fn mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxError>;
}

/// System-configured DNS resolver.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    pub fn new(config: &EmailProviderConfig) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);
        opts.attempts = 1;
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
        }
    }
}

#[async_trait]
impl MxResolver for DnsResolver {
    async fn mx(&self, domain: &str) -> Result<Vec<MxRecord>, MxError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| MxRecord {
                    preference: mx.preference(),
                    exchange: mx.exchange().to_string(),
                })
                .collect()),
            Err(e) => Err(match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => MxError::NoRecords,
                ResolveErrorKind::Timeout => MxError::Timeout,
                _ => MxError::Other(e.to_string()),
            }),
        }
    }
}

/// Outcome of an email provider lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailProviders {
    Found {
        providers: Vec<String>,
        mx_records: Vec<String>,
    },
    /// Every attempt failed.
    Error,
}

impl EmailProviders {
    fn columns(&self) -> (String, String) {
        match self {
            Self::Found {
                providers,
                mx_records,
            } => (join_list(providers), join_list(mx_records)),
            Self::Error => ("error".into(), "error".into()),
        }
    }
}

/// The provider domain behind an exchange: its last two labels.
pub fn provider_for(exchange: &str) -> String {
    let labels: Vec<&str> = exchange.trim_end_matches('.').split('.').collect();
    let start = labels.len().saturating_sub(2);
    labels[start..].join(".")
}

/// Look up `domain`'s MX records, retrying timeouts and resolver failures.
#[instrument(skip(resolver))]
pub async fn get_email_provider(
    resolver: &dyn MxResolver,
    domain: &str,
    max_retries: u32,
) -> EmailProviders {
    let attempts = max_retries.max(1);
    for attempt in 0..attempts {
        match resolver.mx(domain).await {
            Ok(records) => {
                let mx_records: Vec<String> =
                    records.into_iter().map(|r| r.exchange).collect();
                let mut providers: Vec<String> = Vec::new();
                for exchange in &mx_records {
                    let provider = provider_for(exchange);
                    if !provider.is_empty() && !providers.contains(&provider) {
                        providers.push(provider);
                    }
                }
                debug!(providers = providers.len(), "mx lookup done");
                return EmailProviders::Found {
                    providers,
                    mx_records,
                };
            }
            Err(MxError::NoRecords) => {
                debug!("no MX records");
                return EmailProviders::Found {
                    providers: Vec::new(),
                    mx_records: Vec::new(),
                };
            }
            Err(e) => warn!(attempt = attempt + 1, error = %e, "mx lookup failed"),
        }
    }
    EmailProviders::Error
}

/// An email providers table row.
pub fn email_provider_row(request: &RefineryRequest, providers: &EmailProviders) -> Record {
    let (providers, mx_records) = providers.columns();
    let mut row = identity_record(request);
    row.insert("email_providers".into(), Value::String(providers));
    row.insert("mx_records".into(), Value::String(mx_records));
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned answers, then repeats the last one.
    struct ScriptedResolver {
        answers: Mutex<Vec<Result<Vec<MxRecord>, MxError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedResolver {
        fn new(answers: Vec<Result<Vec<MxRecord>, MxError>>) -> Self {
            Self {
                answers: Mutex::new(answers),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl MxResolver for ScriptedResolver {
        async fn mx(&self, _domain: &str) -> Result<Vec<MxRecord>, MxError> {
            *self.calls.lock().unwrap() += 1;
            let mut answers = self.answers.lock().unwrap();
            if answers.len() > 1 {
                answers.remove(0)
            } else {
                answers[0].clone()
            }
        }
    }

    fn mx(preference: u16, exchange: &str) -> MxRecord {
        MxRecord {
            preference,
            exchange: exchange.into(),
        }
    }

    #[test]
    fn provider_is_last_two_labels() {
        assert_eq!(provider_for("aspmx.l.google.com."), "google.com");
        assert_eq!(provider_for("example-com.mail.protection.outlook.com"), "outlook.com");
        assert_eq!(provider_for("localhost."), "localhost");
    }

    #[tokio::test]
    async fn dedups_providers() {
        let resolver = ScriptedResolver::new(vec![Ok(vec![
            mx(1, "aspmx.l.google.com."),
            mx(5, "alt1.aspmx.l.google.com."),
            mx(10, "mx.zoho.com."),
        ])]);

        let result = get_email_provider(&resolver, "example.com", 3).await;
        assert_eq!(
            result,
            EmailProviders::Found {
                providers: vec!["google.com".into(), "zoho.com".into()],
                mx_records: vec![
                    "aspmx.l.google.com.".into(),
                    "alt1.aspmx.l.google.com.".into(),
                    "mx.zoho.com.".into(),
                ],
            }
        );
    }

    #[tokio::test]
    async fn no_records_is_not_retried() {
        let resolver = ScriptedResolver::new(vec![Err(MxError::NoRecords)]);
        let result = get_email_provider(&resolver, "nowhere.invalid", 15).await;
        assert_eq!(
            result,
            EmailProviders::Found {
                providers: vec![],
                mx_records: vec![]
            }
        );
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn retries_timeouts_then_succeeds() {
        let resolver = ScriptedResolver::new(vec![
            Err(MxError::Timeout),
            Err(MxError::Other("SERVFAIL".into())),
            Ok(vec![mx(1, "mx.example.net.")]),
        ]);
        let result = get_email_provider(&resolver, "example.com", 15).await;
        assert!(matches!(result, EmailProviders::Found { .. }));
        assert_eq!(resolver.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_give_error() {
        let resolver = ScriptedResolver::new(vec![Err(MxError::Timeout)]);
        let result = get_email_provider(&resolver, "example.com", 4).await;
        assert_eq!(result, EmailProviders::Error);
        assert_eq!(resolver.calls(), 4);

        let row = email_provider_row(&RefineryRequest::default(), &result);
        assert_eq!(row["email_providers"], "error");
        assert_eq!(row["mx_records"], "error");
    }

    #[test]
    fn found_row_joins_lists() {
        let found = EmailProviders::Found {
            providers: vec!["google.com".into()],
            mx_records: vec!["aspmx.l.google.com.".into(), "alt1.aspmx.l.google.com.".into()],
        };
        let row = email_provider_row(&RefineryRequest::default(), &found);
        assert_eq!(row["email_providers"], "google.com");
        assert_eq!(row["mx_records"], "aspmx.l.google.com. >>> alt1.aspmx.l.google.com.");
    }
}
