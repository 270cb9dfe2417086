//! Turning a user-supplied domain into a URL that actually answers.

use std::fmt;

use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

/// Written in place of a URL when none could be resolved.
pub const INVALID_DOMAIN: &str = "the_supplied_domain_is_invalid";

/// Outcome of [`get_valid_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlCheck {
    Valid(Url),
    Invalid,
}

impl UrlCheck {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Valid(url) => url.as_str(),
            Self::Invalid => INVALID_DOMAIN,
        }
    }

    pub fn url(&self) -> Option<&Url> {
        match self {
            Self::Valid(url) => Some(url),
            Self::Invalid => None,
        }
    }
}

impl fmt::Display for UrlCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve `domain` (a URL or a bare domain) to a URL that returns 200.
#[instrument(skip(client))]
pub async fn get_valid_url(client: &Client, domain: &str) -> UrlCheck {
    let Some(candidate) = candidate_url(domain) else {
        debug!("not a url or domain");
        return UrlCheck::Invalid;
    };

    match client.get(candidate.as_str()).send().await {
        Ok(response) if response.status().as_u16() == 200 => UrlCheck::Valid(candidate),
        Ok(response) => {
            debug!(status = response.status().as_u16(), "candidate did not answer 200");
            UrlCheck::Invalid
        }
        Err(e) => {
            debug!(error = %e, "candidate unreachable");
            UrlCheck::Invalid
        }
    }
}

/// The URL to probe for `domain`, before any network check.
pub fn candidate_url(domain: &str) -> Option<Url> {
    let domain = domain.trim();

    if let Ok(url) = Url::parse(domain) {
        let has_dotted_host = url.host_str().is_some_and(|host| host.contains('.'));
        if matches!(url.scheme(), "http" | "https") && has_dotted_host {
            return Some(url);
        }
    }

    if !is_valid_domain(domain) {
        return None;
    }

    let lower = domain.to_lowercase();
    let constructed = if lower.starts_with("www.") {
        format!("http://{lower}")
    } else {
        format!("http://www.{lower}")
    };
    Url::parse(&constructed).ok()
}

/// Syntactic domain check: dotted labels, alphabetic or punycode TLD.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    let tld = labels[labels.len() - 1];
    let tld_ok = tld.chars().all(|c| c.is_ascii_alphabetic())
        || (tld.len() > 4 && tld.to_ascii_lowercase().starts_with("xn--"));

    labels_ok && tld_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn domain_syntax() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("www.my-site.co.uk"));
        assert!(is_valid_domain("xn--bcher-kva.xn--p1ai"));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("-bad.com"));
        assert!(!is_valid_domain("bad-.com"));
        assert!(!is_valid_domain("example.c0m"));
        assert!(!is_valid_domain("exa mple.com"));
        assert!(!is_valid_domain("example..com"));
        assert!(!is_valid_domain(&format!("{}.com", "a".repeat(64))));
    }

    #[test]
    fn candidates() {
        assert_eq!(
            candidate_url("Example.com").unwrap().as_str(),
            "http://www.example.com/"
        );
        assert_eq!(
            candidate_url("WWW.example.com").unwrap().as_str(),
            "http://www.example.com/"
        );
        assert_eq!(
            candidate_url("https://shop.example.com/about").unwrap().as_str(),
            "https://shop.example.com/about"
        );
        assert!(candidate_url("not a domain").is_none());
        assert!(candidate_url("ftp://example.com").is_none());
    }

    #[test]
    fn invalid_renders_sentinel() {
        assert_eq!(UrlCheck::Invalid.to_string(), "the_supplied_domain_is_invalid");
        assert!(UrlCheck::Invalid.url().is_none());
    }

    #[tokio::test]
    async fn live_url_is_valid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let check = get_valid_url(&Client::new(), &server.uri()).await;
        assert!(matches!(check, UrlCheck::Valid(_)));
    }

    #[tokio::test]
    async fn non_200_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let check = get_valid_url(&Client::new(), &server.uri()).await;
        assert_eq!(check, UrlCheck::Invalid);
    }

    #[tokio::test]
    async fn garbage_is_invalid_without_request() {
        let check = get_valid_url(&Client::new(), "definitely not valid").await;
        assert_eq!(check, UrlCheck::Invalid);
    }
}
