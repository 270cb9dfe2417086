//! Parser for plugin `readme.txt` files.
//!
//! The header looks like:
//!
//! ```text
//! === Plugin Name ===
//! Contributors: someone
//! Tags: spam, comments
//!
//! == Description ==
//!
//! Free text until the next section.
//! ```

use std::sync::LazyLock;

use regex::Regex;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^===\s*(.+?)\s*=").expect("valid regex"));

static TAGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^Tags:\s*(.+?)\r?$").expect("valid regex"));

static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^== Description ==\s*(.+?)\s+^=").expect("valid regex")
});

/// Fields pulled out of a readme. Missing sections stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Readme {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

pub fn parse_readme(text: &str) -> Readme {
    let name = NAME_RE
        .captures(text)
        .map(|c| single_line(&c[1]))
        .filter(|s| !s.is_empty());

    let tags = TAGS_RE
        .captures(text)
        .map(|c| {
            c[1].split(',')
                .map(|t| t.replace(['\r', '\n'], "").trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let description = DESCRIPTION_RE
        .captures(text)
        .map(|c| single_line(&c[1]))
        .filter(|s| !s.is_empty());

    Readme {
        name,
        description,
        tags,
    }
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const README: &str = "=== Akismet Anti-Spam ===\n\
        Contributors: matt, automattic\n\
        Tags: comments, spam , antispam\n\
        Stable tag: 4.1\n\
        \n\
        Used by millions.\n\
        \n\
        == Description ==\n\
        \n\
        Akismet checks your comments\n\
        against the service.\n\
        \n\
        == Installation ==\n\
        \n\
        Upload and activate.\n";

    #[test]
    fn parses_header_and_description() {
        let readme = parse_readme(README);
        assert_eq!(readme.name.as_deref(), Some("Akismet Anti-Spam"));
        assert_eq!(readme.tags, vec!["comments", "spam", "antispam"]);
        assert_eq!(
            readme.description.as_deref(),
            Some("Akismet checks your comments against the service.")
        );
    }

    #[test]
    fn crlf_line_endings() {
        let readme = parse_readme(&README.replace('\n', "\r\n"));
        assert_eq!(readme.name.as_deref(), Some("Akismet Anti-Spam"));
        assert_eq!(readme.tags, vec!["comments", "spam", "antispam"]);
        let description = readme.description.unwrap();
        assert!(description.starts_with("Akismet checks your comments"));
        assert!(description.ends_with("against the service."));
    }

    #[test]
    fn missing_sections_stay_empty() {
        let readme = parse_readme("just some text\nwith no header\n");
        assert_eq!(readme, Readme::default());
    }
}
