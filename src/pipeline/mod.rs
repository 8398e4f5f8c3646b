use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::extractors::youtube::YoutubeExtractor;
use crate::extractors::{AudioExtractor, ExtractionRequest};
use crate::guard::ConcurrencyGuard;
use crate::upload::{UploadClient, Uploader};
use crate::{utils, Result};

/// What a finished conversion hands back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionOutcome {
    pub title: String,

    /// `M:SS`
    pub duration: String,

    pub direct_link: String,

    pub page_link: String,

    pub source_url: String,
}

/// Downloaded audio plus its request directory, both deleted when dropped
#[derive(Debug)]
struct TempArtifact {
    path: PathBuf,
    work_dir: PathBuf,
}

impl TempArtifact {
    fn new(path: PathBuf, work_dir: PathBuf) -> Self {
        Self { path, work_dir }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        utils::cleanup_file(&self.path);
        utils::cleanup_dir(&self.work_dir);
    }
}

/// Guard -> extraction -> upload -> cleanup
pub struct ConversionPipeline {
    guard: ConcurrencyGuard,
    extractor: Arc<dyn AudioExtractor>,
    uploader: Arc<dyn Uploader>,
}

impl ConversionPipeline {
    /// Create a new pipeline backed by yt-dlp and the file host
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_components(
            ConcurrencyGuard::from_config(&config.limits),
            Arc::new(YoutubeExtractor::new(config.extraction.clone())),
            Arc::new(
                UploadClient::new(config.upload.clone())?.with_snapshot_dir(config.extraction.temp_dir.clone()),
            ),
        ))
    }

    pub fn with_components(
        guard: ConcurrencyGuard,
        extractor: Arc<dyn AudioExtractor>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            guard,
            extractor,
            uploader,
        }
    }

    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// Convert `url` on behalf of `user_id`.
    ///
    /// The busy marker and the downloaded file are released on every exit path,
    /// including when this future is dropped mid-flight.
    #[tracing::instrument(skip(self))]
    pub async fn process(&self, url: &str, user_id: &str) -> Result<ConversionOutcome> {
        let request = ExtractionRequest::new(url, user_id)?;
        let _permit = self.guard.admit(user_id)?;

        tracing::info!("Step 1/2: extracting audio");
        let extracted = self.extractor.extract(&request).await?;
        let artifact = TempArtifact::new(extracted.file_path.clone(), extracted.work_dir.clone());

        tracing::info!("Step 2/2: uploading");
        let uploaded = self.uploader.upload(artifact.path()).await?;

        tracing::info!(title = %extracted.title, link = %uploaded.direct_link, "Conversion finished");

        Ok(ConversionOutcome {
            title: extracted.title,
            duration: utils::format_duration(extracted.duration_secs),
            direct_link: uploaded.direct_link,
            page_link: uploaded.page_link,
            source_url: request.source().to_string(),
        })
    }
}
