//! Everything the crawler learns about one page, and the rows built from it.

use scraper::Html;
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use refinery_shared::{Record, RefineryRequest, copy_request_fields, identity_record, join_list};

use crate::classify::Classification;
use crate::extract::{self, Hrefs};

/// Extraction results for a crawled page.
#[derive(Debug, Clone, Default)]
pub struct SiteProfile {
    /// The crawled URL, or the invalid-domain sentinel.
    pub url: String,
    pub all_links: Vec<String>,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,
    pub hrefs: Hrefs,
    pub keywords: Vec<String>,
    pub description: Option<String>,
    pub wp_plugins: Vec<String>,
    pub wp_themes: Vec<String>,
    /// Visible text, fed to the classifier.
    pub text: String,
    pub html: String,
}

impl SiteProfile {
    /// Run every extractor over `html`.
    pub fn analyze(url: &Url, html: &str) -> Self {
        let document = Html::parse_document(html);

        let all_links = extract::get_all_links(&document);
        let internal_links = extract::get_internal_links(url, &all_links);
        let external_links = extract::get_external_links(&internal_links, &all_links);
        let (keywords, description) = extract::get_keywords_and_description(&document);

        Self {
            url: url.to_string(),
            hrefs: extract::get_hrefs(&document),
            wp_plugins: extract::get_wp_plugins(&document),
            wp_themes: extract::get_wp_themes(&document),
            text: extract::get_text(&document),
            html: html.to_string(),
            all_links,
            internal_links,
            external_links,
            keywords,
            description,
        }
    }

    /// A profile with nothing extracted, for sites that never answered.
    pub fn unreachable(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn is_wordpress(&self) -> bool {
        !self.wp_plugins.is_empty() || !self.wp_themes.is_empty()
    }

    pub fn html_sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.html.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The crawler payload: a crawler-table row plus object-store extras
    /// (`html_sha256`, `wp_plugins`, `wp_themes`).
    pub fn crawler_payload(
        &self,
        request: &RefineryRequest,
        classification: &Classification,
    ) -> Record {
        let mut payload = identity_record(request);
        payload.insert("url".into(), Value::String(self.url.clone()));
        copy_request_fields(&mut payload, request, &["sfdc_lead_id", "sfdc_contact_id"]);

        let lists = [
            ("all_links", &self.all_links),
            ("internal_links", &self.internal_links),
            ("external_links", &self.external_links),
            ("href_emails", &self.hrefs.emails),
            ("href_phones", &self.hrefs.phones),
            ("href_socials", &self.hrefs.socials),
            ("meta_keywords", &self.keywords),
        ];
        for (key, items) in lists {
            payload.insert(key.into(), Value::String(join_list(items)));
        }

        payload.insert("meta_description".into(), opt(self.description.as_deref()));
        payload.insert("tier1_classification".into(), opt(classification.tier1.as_deref()));
        payload.insert("tier2_classification".into(), opt(classification.tier2.as_deref()));
        payload.insert("tier3_classification".into(), opt(classification.tier3.as_deref()));
        payload.insert(
            "classification_confidence".into(),
            Value::from(classification.confidence),
        );
        payload.insert("html_string".into(), Value::String(self.html.clone()));
        payload.insert("html_sha256".into(), Value::String(self.html_sha256()));
        payload.insert("wp_plugins".into(), Value::from(self.wp_plugins.clone()));
        payload.insert("wp_themes".into(), Value::from(self.wp_themes.clone()));
        payload
    }

    /// One crawler-tech row per theme, then one per plugin.
    pub fn tech_rows(&self, request: &RefineryRequest) -> Vec<Record> {
        let themes = self.wp_themes.iter().map(|t| (t, "theme"));
        let plugins = self.wp_plugins.iter().map(|p| (p, "plugin"));

        themes
            .chain(plugins)
            .map(|(asset, kind)| {
                let mut row = identity_record(request);
                row.insert("url".into(), Value::String(self.url.clone()));
                row.insert("asset".into(), Value::String(asset.clone()));
                row.insert("type".into(), Value::String(kind.to_string()));
                row
            })
            .collect()
    }
}

fn opt(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::String(s.to_string()))
}
