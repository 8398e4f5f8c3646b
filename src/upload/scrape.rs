//! Pattern matching over the file host's HTML.

use regex::Regex;
use std::sync::LazyLock;

/// The `sid` hidden field, in either attribute order
static SESSION_TOKEN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)name=["']sid["']\s+value=["']([^"']+)["']"#,
        r#"(?i)name=["']sid["'][^>]*value=["']([^"']+)["']"#,
        r#"(?i)value=["']([^"']+)["']\s+name=["']sid["']"#,
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("session token pattern is valid"))
    .collect()
});

static AUDIO_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(mp3|m4a|ogg|wav|aac)$").expect("audio extension pattern is valid"));

/// How to pick one link out of all matches of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    /// First match with an audio extension, else the first match
    PreferAudio,
    First,
    /// Capture group 1 of the first match
    Captured,
}

struct LinkPattern {
    name: &'static str,
    regex: Regex,
    selection: Selection,
}

/// Result-page link patterns, highest priority first
static LINK_CASCADE: LazyLock<Vec<LinkPattern>> = LazyLock::new(|| {
    [
        (
            "direct media",
            r"https?://[a-z]\.top4top\.io/[mp]_[a-zA-Z0-9]+\.[a-zA-Z0-9_]{2,4}",
            Selection::PreferAudio,
        ),
        (
            "download page",
            r"https?://(?:www\.)?top4top\.io/downloadf-[a-zA-Z0-9]+",
            Selection::First,
        ),
        (
            "file link",
            r#"https?://[a-z]\.top4top\.io/[dpf]_[a-zA-Z0-9]+[^"'\s<]*"#,
            Selection::First,
        ),
        (
            "input value",
            r#"value="(https?://[^"]*top4top[^"]*)""#,
            Selection::Captured,
        ),
    ]
    .into_iter()
    .map(|(name, pattern, selection)| LinkPattern {
        name,
        regex: Regex::new(pattern).expect("link pattern is valid"),
        selection,
    })
    .collect()
});

/// Pull the upload session token out of the landing page
pub fn extract_session_token(html: &str) -> Option<String> {
    SESSION_TOKEN_PATTERNS
        .iter()
        .find_map(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// `name=value` pairs from `Set-Cookie` headers, joined for a `Cookie` header
pub fn cookie_header(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .filter_map(|c| c.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Find the best link to the uploaded file; the first pattern that matches wins
pub fn extract_direct_link(html: &str) -> Option<String> {
    LINK_CASCADE.iter().find_map(|pattern| {
        let link = select(pattern, html)?;
        tracing::debug!(pattern = pattern.name, link = %link, "Result link matched");
        Some(link)
    })
}

fn select(pattern: &LinkPattern, html: &str) -> Option<String> {
    match pattern.selection {
        Selection::Captured => pattern
            .regex
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
        Selection::First => pattern.regex.find(html).map(|m| m.as_str().to_string()),
        Selection::PreferAudio => {
            let matches: Vec<&str> = pattern.regex.find_iter(html).map(|m| m.as_str()).collect();
            matches
                .iter()
                .find(|link| AUDIO_EXTENSION.is_match(link))
                .or_else(|| matches.first())
                .map(|link| link.to_string())
        }
    }
}
