use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::LazyLock;

pub mod runner;
pub mod youtube;

use crate::{Result, Yt2SampError};

/// Accepted YouTube link shapes, scheme optional
static SOURCE_URL_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("youtube.com/watch?v=ID", r"^(https?://)?(www\.)?youtube\.com/watch\?v=[\w-]+"),
        ("youtube.com/shorts/ID", r"^(https?://)?(www\.)?youtube\.com/shorts/[\w-]+"),
        ("youtu.be/ID", r"^(https?://)?youtu\.be/[\w-]+"),
        ("youtube.com/embed/ID", r"^(https?://)?(www\.)?youtube\.com/embed/[\w-]+"),
        ("m.youtube.com/watch?v=ID", r"^(https?://)?m\.youtube\.com/watch\?v=[\w-]+"),
    ]
    .into_iter()
    .map(|(shape, pattern)| (shape, Regex::new(pattern).expect("source URL pattern is valid")))
    .collect()
});

/// A YouTube link that matched one of the accepted shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceUrl(String);

impl SourceUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if SOURCE_URL_PATTERNS.iter().any(|(_, re)| re.is_match(trimmed)) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(Yt2SampError::InvalidSourceUrl(trimmed.to_string()))
        }
    }

    /// Human-readable list of accepted shapes
    pub fn accepted_shapes() -> Vec<&'static str> {
        SOURCE_URL_PATTERNS.iter().map(|(shape, _)| *shape).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated request from one user
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    source: SourceUrl,
    user_id: String,
}

impl ExtractionRequest {
    pub fn new(url: &str, user_id: &str) -> Result<Self> {
        Ok(Self {
            source: SourceUrl::parse(url)?,
            user_id: user_id.to_string(),
        })
    }

    pub fn source(&self) -> &SourceUrl {
        &self.source
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Audio file produced by a successful extraction
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    /// Local file, owned by the caller until deleted
    pub file_path: PathBuf,

    /// Directory created for this request; holds `file_path` and is removed with it
    pub work_dir: PathBuf,

    pub title: String,

    /// Whole seconds
    pub duration_secs: u64,

    /// YouTube video id
    pub source_id: String,
}

/// Credential sources tried in order when YouTube asks for a sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStrategy {
    Anonymous,
    CookiesFile(PathBuf),
    Browser(String),
}

impl CredentialStrategy {
    pub fn label(&self) -> String {
        match self {
            CredentialStrategy::Anonymous => "no cookies".to_string(),
            CredentialStrategy::CookiesFile(path) => format!("cookies file {}", path.display()),
            CredentialStrategy::Browser(name) => format!("browser {}", name),
        }
    }

    /// Extra yt-dlp flags for this strategy
    pub fn args(&self) -> Vec<String> {
        match self {
            CredentialStrategy::Anonymous => Vec::new(),
            CredentialStrategy::CookiesFile(path) => {
                vec!["--cookies".to_string(), path.to_string_lossy().into_owned()]
            }
            CredentialStrategy::Browser(name) => {
                vec!["--cookies-from-browser".to_string(), name.clone()]
            }
        }
    }
}

/// Trait for turning a validated request into a local audio file
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult>;
}

const DIAGNOSTIC_EXCERPT_CHARS: usize = 200;

/// YouTube wants a signed-in session; another credential strategy may get through
pub fn is_bot_detection(stderr: &str) -> bool {
    stderr.contains("Sign in to confirm") || stderr.contains("not a bot")
}

/// Map yt-dlp diagnostics onto a user-facing error
pub fn classify_failure(stderr: &str) -> Yt2SampError {
    if is_bot_detection(stderr) {
        return Yt2SampError::BotDetected;
    }
    if stderr.contains("Private video") {
        return Yt2SampError::PrivateVideo;
    }
    if stderr.contains("Video unavailable") || stderr.contains("not available") {
        return Yt2SampError::VideoUnavailable;
    }
    if stderr.contains("confirm your age") || (stderr.contains("Sign in") && stderr.contains("age")) {
        return Yt2SampError::AgeRestricted;
    }
    if stderr.contains("is not a valid URL") || stderr.contains("Unsupported URL") {
        return Yt2SampError::UnsupportedUrl;
    }
    Yt2SampError::ToolFailed(crate::utils::truncate_chars(stderr.trim(), DIAGNOSTIC_EXCERPT_CHARS).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_all_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "youtube.com/shorts/abc-DEF_123",
            "https://youtu.be/abc123XYZ_",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
        ] {
            assert!(SourceUrl::parse(url).is_ok(), "{} should be accepted", url);
        }
    }

    #[test]
    fn test_rejects_other_links() {
        for url in [
            "",
            "https://vimeo.com/12345",
            "https://www.youtube.com/playlist?list=PL123",
            "https://youtube.com/channel/UC123",
            "ftp://youtu.be/abc",
            "https://evil.example/?u=https://youtu.be/abc",
            "https://music.youtube.com/watch?v=abc",
        ] {
            assert!(
                matches!(SourceUrl::parse(url), Err(Yt2SampError::InvalidSourceUrl(_))),
                "{} should be rejected",
                url
            );
        }
    }

    #[test]
    fn test_request_keeps_user() {
        let request = ExtractionRequest::new("  https://youtu.be/abc  ", "42").unwrap();
        assert_eq!(request.source().as_str(), "https://youtu.be/abc");
        assert_eq!(request.user_id(), "42");
    }

    #[test]
    fn test_strategy_args() {
        assert!(CredentialStrategy::Anonymous.args().is_empty());
        assert_eq!(
            CredentialStrategy::CookiesFile(PathBuf::from("cookies.txt")).args(),
            vec!["--cookies", "cookies.txt"]
        );
        assert_eq!(
            CredentialStrategy::Browser("firefox".into()).args(),
            vec!["--cookies-from-browser", "firefox"]
        );
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("ERROR: Sign in to confirm you're not a bot"),
            Yt2SampError::BotDetected
        ));
        assert!(matches!(classify_failure("ERROR: Private video"), Yt2SampError::PrivateVideo));
        assert!(matches!(
            classify_failure("ERROR: Video unavailable"),
            Yt2SampError::VideoUnavailable
        ));
        assert!(matches!(
            classify_failure("Sign in to view this video, its age is restricted"),
            Yt2SampError::AgeRestricted
        ));
        assert!(matches!(
            classify_failure("ERROR: Unsupported URL: https://x"),
            Yt2SampError::UnsupportedUrl
        ));

        let long = "x".repeat(500);
        match classify_failure(&long) {
            Yt2SampError::ToolFailed(excerpt) => assert_eq!(excerpt.len(), 200),
            other => panic!("unexpected {:?}", other),
        }
    }
}
