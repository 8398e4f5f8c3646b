use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use super::runner::{CommandOutcome, CommandRunner, TokioCommandRunner};
use super::{classify_failure, is_bot_detection, AudioExtractor, CredentialStrategy, ExtractionRequest, ExtractionResult};
use crate::config::ExtractionConfig;
use crate::{utils, Result, Yt2SampError};

const AUDIO_EXTENSION: &str = "mp3";

/// One `--print-json` line from yt-dlp; only the fields we use
#[derive(Debug, Deserialize)]
struct VideoMetadata {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

/// Output directory of one extraction, removed on drop unless kept
struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    fn create(root: &Path) -> Result<Self> {
        let path = root.join(Uuid::new_v4().simple().to_string());
        fs_err::create_dir_all(&path)?;
        Ok(Self { path, keep: false })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.keep {
            utils::cleanup_dir(&self.path);
        }
    }
}

/// YouTube audio extractor using yt-dlp with cookie escalation
pub struct YoutubeExtractor {
    settings: ExtractionConfig,
    runner: Arc<dyn CommandRunner>,
}

impl YoutubeExtractor {
    pub fn new(settings: ExtractionConfig) -> Self {
        Self::with_runner(settings, Arc::new(TokioCommandRunner))
    }

    pub fn with_runner(settings: ExtractionConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    /// Credential strategies available right now, in the order they are tried
    pub fn strategies(&self) -> Vec<CredentialStrategy> {
        let mut strategies = vec![CredentialStrategy::Anonymous];

        if self.settings.cookies_file.is_file() {
            strategies.push(CredentialStrategy::CookiesFile(self.settings.cookies_file.clone()));
        }

        if let Some(browser) = self.settings.cookies_browser.as_deref().filter(|b| !b.is_empty()) {
            strategies.push(CredentialStrategy::Browser(browser.to_string()));
        }

        strategies
    }

    fn build_args(&self, url: &str, strategy: &CredentialStrategy, work_dir: &Path) -> Vec<String> {
        let template = work_dir.join("%(id)s.%(ext)s");

        let mut args: Vec<String> = [
            "-x",
            "--audio-format",
            AUDIO_EXTENSION,
            "--audio-quality",
            "0",
            "-f",
            "ba/b",
            "--print-json",
            "--no-playlist",
            "--no-warnings",
            "-o",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.push(template.to_string_lossy().into_owned());
        args.extend(strategy.args());
        args.push(url.to_string());
        args
    }

    /// Apply duration and size policy to a finished download in `work_dir`.
    ///
    /// Rejected files are left in place; the caller owns the directory.
    fn finalize(&self, stdout: &str, work_dir: &Path) -> Result<ExtractionResult> {
        let metadata = parse_metadata(stdout).ok_or(Yt2SampError::MetadataParse)?;

        let title = metadata
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Unknown Title".to_string());
        let duration = metadata
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);
        let source_id = metadata
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        if duration > self.settings.max_duration_secs as f64 {
            return Err(Yt2SampError::DurationExceeded {
                duration: duration.ceil() as u64,
                max: self.settings.max_duration_secs,
            });
        }
        let duration_secs = duration.floor() as u64;

        let file_path = locate_artifact(work_dir, &source_id)?;

        let size = fs_err::metadata(&file_path)?.len();
        if size > self.settings.max_file_size_bytes {
            return Err(Yt2SampError::FileTooLarge {
                size,
                max: self.settings.max_file_size_bytes,
            });
        }

        tracing::info!(
            title = %title,
            duration = %utils::format_duration(duration_secs),
            file = %file_path.display(),
            "Extraction finished"
        );

        Ok(ExtractionResult {
            file_path,
            work_dir: work_dir.to_path_buf(),
            title,
            duration_secs,
            source_id,
        })
    }
}

/// Exact `<id>.mp3` first, otherwise any file in `work_dir` whose name contains the id
fn locate_artifact(work_dir: &Path, source_id: &str) -> Result<PathBuf> {
    let expected = work_dir.join(format!("{}.{}", source_id, AUDIO_EXTENSION));
    if expected.is_file() {
        return Ok(expected);
    }

    find_by_substring(work_dir, source_id)?.ok_or_else(|| Yt2SampError::ArtifactMissing {
        id: source_id.to_string(),
    })
}

fn find_by_substring(dir: &Path, needle: &str) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().contains(needle) && entry.path().is_file() {
            return Ok(Some(entry.path()));
        }
    }

    Ok(None)
}

/// The last line that parses as metadata wins; progress lines are skipped
fn parse_metadata(stdout: &str) -> Option<VideoMetadata> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<VideoMetadata>(line).ok())
}

#[async_trait]
impl AudioExtractor for YoutubeExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult> {
        utils::ensure_temp_dir(&self.settings.temp_dir)?;

        // Concurrent requests for the same video must not share output files
        let work_dir = WorkDir::create(&self.settings.temp_dir)?;

        let url = request.source().as_str();
        let timeout = self.settings.timeout();
        let mut last_stderr = String::new();

        tracing::info!(url, user = request.user_id(), dir = %work_dir.path().display(), "Starting audio extraction");

        for strategy in self.strategies() {
            let label = strategy.label();
            tracing::info!(strategy = %label, "Trying yt-dlp");

            let args = self.build_args(url, &strategy, work_dir.path());
            let output = match self.runner.run(&self.settings.yt_dlp_path, &args, timeout).await? {
                CommandOutcome::Exited(output) => output,
                CommandOutcome::TimedOut => return Err(Yt2SampError::ExtractionTimeout(timeout)),
            };

            if output.success {
                let result = self.finalize(&output.stdout, work_dir.path())?;
                work_dir.keep();
                return Ok(result);
            }

            tracing::warn!(strategy = %label, exit_code = ?output.exit_code, "yt-dlp attempt failed");

            let bot_detected = is_bot_detection(&output.stderr);
            last_stderr = output.stderr;

            if !bot_detected {
                break;
            }

            tracing::info!("Bot detection hit, escalating to the next credential strategy");
        }

        Err(classify_failure(&last_stderr))
    }
}
