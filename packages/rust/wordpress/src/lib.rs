//! WordPress plugin metadata lookup.
//!
//! The crawler reports plugin slugs it saw under `wp-content/plugins/`.
//! For each slug we read the plugin's `readme.txt` from the public SVN
//! mirror and keep its display name, description and tags.

mod readme;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use refinery_crawler::Fetcher;
use refinery_shared::{
    Record, RefineryError, RefineryRequest, Result, RetryPolicy, identity_record, join_list,
};

pub use readme::{Readme, parse_readme};

static README_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*=".txt"]"#).expect("valid selector"));

/// What we know about one plugin. Everything but the slug may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginInfo {
    pub slug: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl PluginInfo {
    pub fn empty(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            ..Self::default()
        }
    }

    fn from_readme(slug: &str, readme: Readme) -> Self {
        Self {
            slug: slug.to_string(),
            name: readme.name,
            description: readme.description,
            tags: readme.tags,
        }
    }

    /// A wordpress plugins table row.
    pub fn to_row(&self, request: &RefineryRequest) -> Record {
        let mut row = identity_record(request);
        row.insert("plugin".into(), Value::String(self.slug.clone()));
        row.insert("plugin_name".into(), opt(self.name.as_deref()));
        row.insert("plugin_description".into(), opt(self.description.as_deref()));
        row.insert("plugin_tags".into(), Value::String(join_list(&self.tags)));
        row
    }
}

fn opt(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}

/// Reads plugin readmes from the SVN mirror.
pub struct PluginLookup {
    fetcher: Fetcher,
    svn_base: String,
    policy: RetryPolicy,
}

impl PluginLookup {
    pub fn new(fetcher: Fetcher, svn_base: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            svn_base: svn_base.into().trim_end_matches('/').to_string(),
            policy,
        }
    }

    /// Metadata for `slug`. Never fails: lookups that go nowhere give empty info.
    #[instrument(skip_all, fields(plugin = %slug))]
    pub async fn get_plugin_info(&self, slug: &str) -> PluginInfo {
        for attempt in 0..self.policy.max_attempts {
            match self.try_lookup(slug).await {
                Ok(info) => return info,
                Err(e) => {
                    warn!(attempt, error = %e, "plugin lookup failed");
                    self.policy.pause(attempt).await;
                }
            }
        }
        PluginInfo::empty(slug)
    }

    async fn try_lookup(&self, slug: &str) -> Result<PluginInfo> {
        let trunk = self.trunk_url(slug)?;
        let listing = self.fetcher.fetch_text(&trunk).await?;
        if listing.status != 200 {
            debug!(status = listing.status, "no trunk listing");
            return Ok(PluginInfo::empty(slug));
        }

        let Some(file_name) = readme_file_name(&listing.html) else {
            debug!("no readme in trunk listing");
            return Ok(PluginInfo::empty(slug));
        };

        let readme_url = trunk
            .join(&file_name)
            .map_err(|e| RefineryError::parse(format!("readme url for {slug}: {e}")))?;
        let readme = self.fetcher.fetch_text(&readme_url).await?;
        if readme.status != 200 {
            debug!(status = readme.status, "readme not readable");
            return Ok(PluginInfo::empty(slug));
        }

        Ok(PluginInfo::from_readme(slug, parse_readme(&readme.html)))
    }

    fn trunk_url(&self, slug: &str) -> Result<Url> {
        let raw = format!("{}/{slug}/trunk/", self.svn_base);
        Url::parse(&raw).map_err(|e| RefineryError::parse(format!("{raw}: {e}")))
    }
}

/// Text of the first `.txt` link in an SVN directory listing.
fn readme_file_name(listing: &str) -> Option<String> {
    let document = Html::parse_document(listing);
    document
        .select(&README_LINK)
        .next()
        .map(|a| a.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinery_shared::CrawlerConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LISTING: &str = r#"<html><body><ul>
        <li><a href="../">..</a></li>
        <li><a href="akismet.php">akismet.php</a></li>
        <li><a href="readme.txt">readme.txt</a></li>
        <li><a href="changelog.txt">changelog.txt</a></li>
    </ul></body></html>"#;

    const README: &str = "=== Akismet Anti-Spam ===\nTags: comments, spam\n\n== Description ==\n\nStops spam.\n\n== Installation ==\n";

    fn lookup(server: &MockServer) -> PluginLookup {
        let fetcher = Fetcher::new(&CrawlerConfig::default()).unwrap();
        PluginLookup::new(fetcher, server.uri(), RetryPolicy::immediate(2))
    }

    #[test]
    fn finds_first_txt_link() {
        assert_eq!(readme_file_name(LISTING).as_deref(), Some("readme.txt"));
        assert_eq!(readme_file_name("<a href=\"x.php\">x.php</a>"), None);
    }

    #[tokio::test]
    async fn reads_readme_from_trunk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/akismet/trunk/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(LISTING))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/akismet/trunk/readme.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(README))
            .mount(&server)
            .await;

        let info = lookup(&server).get_plugin_info("akismet").await;
        assert_eq!(info.slug, "akismet");
        assert_eq!(info.name.as_deref(), Some("Akismet Anti-Spam"));
        assert_eq!(info.description.as_deref(), Some("Stops spam."));
        assert_eq!(info.tags, vec!["comments", "spam"]);
    }

    #[tokio::test]
    async fn missing_plugin_gives_empty_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let info = lookup(&server).get_plugin_info("nope").await;
        assert_eq!(info, PluginInfo::empty("nope"));
    }

    #[tokio::test]
    async fn unreachable_mirror_retries_then_gives_empty_info() {
        let fetcher = Fetcher::new(&CrawlerConfig::default()).unwrap();
        let lookup = PluginLookup::new(fetcher, "http://127.0.0.1:9", RetryPolicy::immediate(2));
        let info = lookup.get_plugin_info("akismet").await;
        assert_eq!(info, PluginInfo::empty("akismet"));
    }

    #[test]
    fn row_joins_tags() {
        let request = RefineryRequest {
            refinery_id: Some("r1".into()),
            domain: Some("example.com".into()),
            ..RefineryRequest::default()
        };
        let info = PluginInfo {
            slug: "akismet".into(),
            name: Some("Akismet".into()),
            description: None,
            tags: vec!["comments".into(), "spam".into()],
        };
        let row = info.to_row(&request);
        assert_eq!(row["refinery_id"], "r1");
        assert_eq!(row["plugin"], "akismet");
        assert_eq!(row["plugin_tags"], "comments >>> spam");
        assert_eq!(row["plugin_description"], Value::Null);
    }
}
