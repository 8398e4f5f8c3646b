//! yt2samp - Turn YouTube links into direct audio URLs for the SA-MP boombox
//!
//! This library extracts audio from YouTube with yt-dlp (escalating through cookie
//! strategies when YouTube asks for a sign-in), uploads the result to top4top.io
//! through its HTML upload form, and hands back a link a game client can stream.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod guard;
pub mod pipeline;
pub mod upload;
pub mod utils;

use std::path::PathBuf;
use std::time::Duration;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{AudioExtractor, ExtractionRequest, ExtractionResult, SourceUrl};
pub use guard::{AdmissionPermit, ConcurrencyGuard};
pub use pipeline::{ConversionOutcome, ConversionPipeline};
pub use upload::{UploadClient, UploadResult, Uploader};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Yt2SampError>;

/// Broad category of a failure, used for log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Admission,
    Extraction,
    Upload,
    Transport,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Admission => write!(f, "admission"),
            ErrorKind::Extraction => write!(f, "extraction"),
            ErrorKind::Upload => write!(f, "upload"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Io => write!(f, "io"),
        }
    }
}

/// Classified failures. The `Display` text of every variant is what the end user sees.
#[derive(thiserror::Error, Debug)]
pub enum Yt2SampError {
    #[error("Invalid URL. Only youtube.com and youtu.be links are supported: {0}")]
    InvalidSourceUrl(String),

    #[error("Rate limited, wait {} seconds before the next request.", utils::ceil_secs(*.remaining))]
    RateLimited { remaining: Duration },

    #[error("Still processing your previous request. Wait until it finishes.")]
    Busy,

    #[error("YouTube blocked the request. Put a cookies.txt file in place or set COOKIES_BROWSER.")]
    BotDetected,

    #[error("This video is private and cannot be accessed.")]
    PrivateVideo,

    #[error("This video is unavailable or has been removed.")]
    VideoUnavailable,

    #[error("This video is age-restricted.")]
    AgeRestricted,

    #[error("yt-dlp rejected the URL as invalid or unsupported.")]
    UnsupportedUrl,

    #[error("Video is too long ({}). Maximum is {}.", utils::format_duration(*.duration), utils::format_duration(*.max))]
    DurationExceeded { duration: u64, max: u64 },

    #[error("Audio file not found after download (id {id}).")]
    ArtifactMissing { id: String },

    #[error("File is too large ({}). Maximum is {}.", utils::format_file_size(*.size), utils::format_file_size(*.max))]
    FileTooLarge { size: u64, max: u64 },

    #[error("yt-dlp timed out after {}s.", .0.as_secs())]
    ExtractionTimeout(Duration),

    #[error("Could not start {program}: {source}")]
    ToolLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yt-dlp failed: {0}")]
    ToolFailed(String),

    #[error("Could not parse metadata from yt-dlp output.")]
    MetadataParse,

    #[error("File to upload not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid upload base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Could not open the file host (HTTP {0}).")]
    LandingPageStatus(u16),

    #[error("Could not find the session id (sid) on the file host page. The upload form may have changed.")]
    SessionTokenNotFound,

    #[error("Upload may have succeeded, but no download link was found. Check {} for the result page.", .snapshot.display())]
    LinkNotFound { snapshot: PathBuf },

    #[error("Too many redirects while resolving the upload result.")]
    TooManyRedirects,

    #[error("Network timeout during {phase}.")]
    NetworkTimeout { phase: &'static str },

    #[error("Network error during {phase}: {source}")]
    Transport {
        phase: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Yt2SampError {
    /// Classify a `reqwest` failure for the given protocol phase
    pub fn transport(phase: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Yt2SampError::NetworkTimeout { phase }
        } else {
            Yt2SampError::Transport { phase, source }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use Yt2SampError::*;
        match self {
            InvalidSourceUrl(_) => ErrorKind::Validation,
            RateLimited { .. } | Busy => ErrorKind::Admission,
            BotDetected | PrivateVideo | VideoUnavailable | AgeRestricted | UnsupportedUrl
            | DurationExceeded { .. } | ArtifactMissing { .. } | FileTooLarge { .. }
            | ExtractionTimeout(_) | ToolLaunch { .. } | ToolFailed(_) | MetadataParse => {
                ErrorKind::Extraction
            }
            FileNotFound(_) | InvalidBaseUrl(_) | LandingPageStatus(_) | SessionTokenNotFound
            | LinkNotFound { .. } | TooManyRedirects => ErrorKind::Upload,
            NetworkTimeout { .. } | Transport { .. } => ErrorKind::Transport,
            Io(_) => ErrorKind::Io,
        }
    }
}
