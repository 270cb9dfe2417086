//! Pure extractors over a parsed HTML document.
//!
//! Every list is deduplicated and keeps first-seen order.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));
static ASSET_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("link[href], script[src]").expect("valid selector"));
static KEYWORDS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="keywords"]"#).expect("valid selector"));
static DESCRIPTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).expect("valid selector"));

static ANGLE_EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+)>").expect("valid regex")
});

// North American numbers with optional country code and extension.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:(?:\+?([1-9]|[0-9][0-9]|[0-9][0-9][0-9])",
        r"\s*(?:[.-]\s*)?)?(?:\(\s*([2-9]1[02-9]|[2-9][02-8]1|[2-9]",
        r"[02-8][02-9])\s*\)|([0-9][1-9]|[0-9]1[02-9]|[2-9][02-8]1|",
        r"[2-9][02-8][02-9]))\s*(?:[.-]\s*)?)?([2-9]1[02-9]|[2-9]",
        r"[02-9]1|[2-9][02-9]{2})\s*(?:[.-]\s*)?([0-9]{4})(?:\s*",
        r"(?:#|x\.?|ext\.?|extension)\s*(\d+))?",
    ))
    .expect("valid regex")
});

static EXTERNAL_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(http|ftp|https)://([\w_-]+(?:(?:\.[\w_-]+)+))([\w.,@?^=%&:/~+#-]*[\w@?^=%&/~+#-])?")
        .expect("valid regex")
});

static WP_PLUGIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"wp-content/plugins/([^/]+)/").expect("valid regex"));
static WP_THEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"wp-content/themes/([^/]+)/").expect("valid regex"));

const SOCIAL_NETWORKS: [&str; 4] = ["facebook", "twitter", "pinterest", "linkedin"];

/// Contact details found in anchors and text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hrefs {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub socials: Vec<String>,
}

fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn hrefs(document: &Html) -> impl Iterator<Item = &str> {
    document
        .select(&ANCHOR_SEL)
        .filter_map(|a| a.value().attr("href"))
}

/// `mailto:` targets plus `<user@host>` addresses in the text.
pub fn get_emails(document: &Html) -> Vec<String> {
    let from_links = hrefs(document).filter_map(|href| {
        let idx = href.find("mailto:")?;
        let address = &href[idx + "mailto:".len()..];
        let address = address.split('?').next().unwrap_or(address).trim();
        (!address.is_empty()).then(|| address.to_string())
    });

    let text = document.root_element().text().collect::<String>();
    let from_text: Vec<String> = ANGLE_EMAIL_RE
        .captures_iter(&text)
        .map(|caps| caps[1].to_string())
        .collect();

    dedup(from_links.chain(from_text))
}

/// Phone numbers in the text plus `tel:` link targets.
pub fn get_phones(document: &Html) -> Vec<String> {
    let text = document.root_element().text().collect::<String>();
    let from_text: Vec<String> = PHONE_RE
        .captures_iter(&text)
        .map(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect::<String>()
        })
        .collect();

    let from_links = hrefs(document)
        .filter(|href| href.contains("tel:"))
        .map(|href| {
            let trimmed = href.trim();
            trimmed
                .strip_prefix("tel:")
                .unwrap_or(trimmed)
                .trim()
                .to_string()
        });

    dedup(from_text.into_iter().chain(from_links))
}

/// Links to the major social networks.
pub fn get_socials(document: &Html) -> Vec<String> {
    dedup(
        hrefs(document)
            .filter(|href| SOCIAL_NETWORKS.iter().any(|net| href.contains(net)))
            .map(String::from),
    )
}

pub fn get_hrefs(document: &Html) -> Hrefs {
    Hrefs {
        emails: get_emails(document),
        phones: get_phones(document),
        socials: get_socials(document),
    }
}

/// Every anchor target except empty ones and the bare root.
pub fn get_all_links(document: &Html) -> Vec<String> {
    dedup(
        hrefs(document)
            .filter(|href| !href.is_empty() && *href != "/")
            .map(String::from),
    )
}

/// Second-level labels that registries put under a two-letter country code.
const COUNTRY_SECOND_LEVELS: &[&str] = &["ac", "co", "com", "edu", "gov", "ltd", "net", "org"];

/// The registrable part of `host`: `shop.example.com` gives `example.com`,
/// `www.example.co.uk` gives `example.co.uk`.
fn site_domain(host: &str) -> &str {
    let labels: Vec<&str> = host.split('.').collect();
    let n = labels.len();
    let keep = if n >= 3
        && labels[n - 1].len() == 2
        && COUNTRY_SECOND_LEVELS.contains(&labels[n - 2])
    {
        3
    } else {
        2
    };
    if n <= keep {
        return host;
    }
    let skip: usize = labels[..n - keep].iter().map(|l| l.len() + 1).sum();
    &host[skip..]
}

fn on_site(link_host: &str, site: &str) -> bool {
    link_host == site
        || link_host
            .strip_suffix(site)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Links that stay on the site, relative ones resolved against `url`.
pub fn get_internal_links(url: &Url, links: &[String]) -> Vec<String> {
    let host = url.host_str().unwrap_or_default();
    let site = site_domain(host);

    let internal = links.iter().filter_map(|link| {
        if link.starts_with('#') {
            return None;
        }
        match Url::parse(link) {
            Ok(absolute) => {
                let link_host = absolute.host_str()?;
                let same_site = link_host == host || on_site(link_host, site);
                same_site.then(|| link.clone())
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                url.join(link).ok().map(|resolved| resolved.to_string())
            }
            Err(_) => None,
        }
    });

    dedup(internal)
}

/// Links off the site, normalized to `scheme://host/path`.
///
/// Anything not shaped like an http/ftp URL (`tel:`, `javascript:`,
/// relative paths) is dropped.
pub fn get_external_links(internal_links: &[String], all_links: &[String]) -> Vec<String> {
    let internal: HashSet<&str> = internal_links.iter().map(String::as_str).collect();

    let external = all_links
        .iter()
        .filter(|link| !internal.contains(link.as_str()))
        .filter_map(|link| {
            let caps = EXTERNAL_LINK_RE.captures(link)?;
            Some(format!(
                "{}://{}{}",
                &caps[1],
                &caps[2],
                caps.get(3).map_or("", |m| m.as_str())
            ))
        });

    dedup(external)
}

fn meta_content<'a>(document: &'a Html, selector: &Selector) -> Option<&'a str> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
}

/// `meta[name=keywords]` split on commas, and `meta[name=description]`.
pub fn get_keywords_and_description(document: &Html) -> (Vec<String>, Option<String>) {
    let keywords = meta_content(document, &KEYWORDS_SEL)
        .map(|content| {
            dedup(
                content
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from),
            )
        })
        .unwrap_or_default();

    let description =
        meta_content(document, &DESCRIPTION_SEL).map(|content| content.replace('\r', " "));

    (keywords, description)
}

fn wp_assets(document: &Html, pattern: &Regex) -> Vec<String> {
    let assets = document.select(&ASSET_SEL).filter_map(|el| {
        let target = el.value().attr("href").or_else(|| el.value().attr("src"))?;
        pattern.captures(target).map(|caps| caps[1].to_string())
    });
    dedup(assets)
}

/// Plugin directory names under `wp-content/plugins/`.
pub fn get_wp_plugins(document: &Html) -> Vec<String> {
    wp_assets(document, &WP_PLUGIN_RE)
}

/// Theme directory names under `wp-content/themes/`.
pub fn get_wp_themes(document: &Html) -> Vec<String> {
    wp_assets(document, &WP_THEME_RE)
}

/// Visible text with whitespace collapsed; script and style bodies skipped.
pub fn get_text(document: &Html) -> String {
    let mut words: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|parent| {
                matches!(parent.value().name(), "script" | "style" | "noscript" | "template")
            });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<html><head>
        <meta name="keywords" content="crm, email marketing ,  automation,crm">
        <meta name="description" content="Small business&#13;growth">
        <link rel="stylesheet" href="https://example.com/wp-content/themes/astra/style.css">
        <link rel="stylesheet" href="/wp-content/plugins/contact-form-7/includes/css/styles.css">
        <script src="https://example.com/wp-content/plugins/akismet/_inc/form.js"></script>
        <script>var ignored = "(555) 987-6543";</script>
        <style>.x { color: red }</style>
    </head><body>
        <h1>Welcome</h1>
        <p>Call us at (555) 234-5678. Write to &lt;sales@example.com&gt;.</p>
        <a href="mailto:info@example.com?subject=Hi">Email</a>
        <a href="tel:+1-800-555-0199">Phone</a>
        <a href="https://www.facebook.com/example">Facebook</a>
        <a href="https://twitter.com/example">Twitter</a>
        <a href="/">Home</a>
        <a href="">Empty</a>
        <a href="/about">About</a>
        <a href="#top">Top</a>
        <a href="https://blog.example.com/post">Blog</a>
        <a href="https://partner.org/path?q=1">Partner</a>
        <a href="javascript:void(0)">JS</a>
    </body></html>"##;

    fn doc() -> Html {
        Html::parse_document(PAGE)
    }

    #[test]
    fn static_patterns_compile() {
        LazyLock::force(&ANCHOR_SEL);
        LazyLock::force(&ASSET_SEL);
        LazyLock::force(&KEYWORDS_SEL);
        LazyLock::force(&DESCRIPTION_SEL);
        LazyLock::force(&ANGLE_EMAIL_RE);
        LazyLock::force(&PHONE_RE);
        LazyLock::force(&EXTERNAL_LINK_RE);
        LazyLock::force(&WP_PLUGIN_RE);
        LazyLock::force(&WP_THEME_RE);
    }

    #[test]
    fn emails_from_mailto_and_angle_brackets() {
        let emails = get_emails(&doc());
        assert_eq!(emails, vec!["info@example.com", "sales@example.com"]);
    }

    #[test]
    fn phones_from_text_and_tel_links() {
        let phones = get_phones(&doc());
        assert!(phones.contains(&"5552345678".to_string()));
        assert!(phones.contains(&"+1-800-555-0199".to_string()));
    }

    #[test]
    fn tel_prefix_is_stripped_only_as_prefix() {
        let html = Html::parse_document(r#"<a href="tel:555-0100-tel">x</a>"#);
        assert!(get_phones(&html).contains(&"555-0100-tel".to_string()));
    }

    #[test]
    fn socials() {
        assert_eq!(
            get_socials(&doc()),
            vec!["https://www.facebook.com/example", "https://twitter.com/example"]
        );
    }

    #[test]
    fn all_links_skip_empty_and_root() {
        let links = get_all_links(&doc());
        assert!(!links.contains(&"/".to_string()));
        assert!(!links.contains(&String::new()));
        assert!(links.contains(&"/about".to_string()));
        assert!(links.contains(&"mailto:info@example.com?subject=Hi".to_string()));
    }

    #[test]
    fn internal_and_external_links() {
        let page = Url::parse("http://www.example.com/").unwrap();
        let all = get_all_links(&doc());
        let internal = get_internal_links(&page, &all);

        assert!(internal.contains(&"http://www.example.com/about".to_string()));
        assert!(internal.contains(&"https://blog.example.com/post".to_string()));
        assert!(!internal.iter().any(|l| l.contains("partner.org")));
        assert!(!internal.iter().any(|l| l.contains('#')));

        let external = get_external_links(&internal, &all);
        assert!(external.contains(&"https://partner.org/path?q=1".to_string()));
        assert!(external.contains(&"https://www.facebook.com/example".to_string()));
        assert!(!external.iter().any(|l| l.starts_with("mailto:")));
        assert!(!external.iter().any(|l| l.starts_with("javascript:")));
        assert!(!external.contains(&"/about".to_string()));
        assert!(!external.contains(&"https://blog.example.com/post".to_string()));
    }

    #[test]
    fn country_code_domains_stay_on_site() {
        let page = Url::parse("http://www.example.co.uk/").unwrap();
        let all = vec![
            "https://shop.example.co.uk/cart".to_string(),
            "https://twitter.com/acme".to_string(),
            "https://www.facebook.com/acme".to_string(),
            "https://notexample.co.uk/".to_string(),
        ];

        let internal = get_internal_links(&page, &all);
        assert_eq!(internal, vec!["https://shop.example.co.uk/cart".to_string()]);

        let external = get_external_links(&internal, &all);
        assert!(external.contains(&"https://twitter.com/acme".to_string()));
        assert!(external.contains(&"https://www.facebook.com/acme".to_string()));
        assert!(external.contains(&"https://notexample.co.uk/".to_string()));
    }

    #[test]
    fn site_domain_drops_subdomains() {
        assert_eq!(site_domain("www.example.com"), "example.com");
        assert_eq!(site_domain("example.com"), "example.com");
        assert_eq!(site_domain("a.b.example.com.au"), "example.com.au");
        assert_eq!(site_domain("localhost"), "localhost");
    }

    #[test]
    fn bare_domain_covers_subdomains() {
        let page = Url::parse("http://example.com/").unwrap();
        let links = vec!["https://shop.example.com/cart".to_string()];
        assert_eq!(get_internal_links(&page, &links), links);
    }

    #[test]
    fn keywords_and_description() {
        let (keywords, description) = get_keywords_and_description(&doc());
        assert_eq!(keywords, vec!["crm", "email marketing", "automation"]);
        let description = description.unwrap();
        assert!(description.starts_with("Small business"));
        assert!(!description.contains('\r'));
    }

    #[test]
    fn missing_meta() {
        let (keywords, description) =
            get_keywords_and_description(&Html::parse_document("<html></html>"));
        assert!(keywords.is_empty());
        assert!(description.is_none());
    }

    #[test]
    fn wordpress_assets() {
        assert_eq!(get_wp_plugins(&doc()), vec!["contact-form-7", "akismet"]);
        assert_eq!(get_wp_themes(&doc()), vec!["astra"]);
    }

    #[test]
    fn visible_text_skips_scripts() {
        let text = get_text(&doc());
        assert!(text.starts_with("Welcome Call us at (555) 234-5678."));
        assert!(!text.contains("ignored"));
        assert!(!text.contains("color: red"));
    }
}
