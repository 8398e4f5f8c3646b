use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub mod http;
pub mod multipart;
pub mod scrape;

use crate::config::UploadConfig;
use crate::{utils, Result, Yt2SampError};
use http::ResolvedHttpClient;
use multipart::MultipartForm;

const SESSION_FIELD: &str = "sid";
const SUBMIT_FIELD: &str = "submitr";
const FILE_FIELD: &str = "file_1_";
const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Links to an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    /// Link the audio can be streamed from
    pub direct_link: String,

    /// Redirect target after upload, or the direct link when there was none
    pub page_link: String,
}

/// Session scraped from the landing page, valid for one upload
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub token: String,
    pub cookie_header: String,
}

/// Trait for publishing a local file and returning its public links
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, file_path: &Path) -> Result<UploadResult>;
}

/// top4top.io upload through its HTML form
pub struct UploadClient {
    http: ResolvedHttpClient,
    settings: UploadConfig,
    snapshot_dir: Option<PathBuf>,
}

impl UploadClient {
    pub fn new(settings: UploadConfig) -> Result<Self> {
        let http = ResolvedHttpClient::new(&settings)?;
        Ok(Self {
            http,
            settings,
            snapshot_dir: None,
        })
    }

    /// Keep result-page snapshots in `dir` instead of next to the uploaded file
    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.snapshot_dir = Some(dir);
        self
    }

    /// Fetch the landing page for a session token and cookies
    pub async fn acquire_session(&self) -> Result<UploadSession> {
        let base = self.http.base_url().as_str();
        let page = self
            .http
            .get(base, None, self.settings.page_timeout(), "session")
            .await?;

        if page.status.as_u16() != 200 {
            return Err(Yt2SampError::LandingPageStatus(page.status.as_u16()));
        }

        let token = scrape::extract_session_token(&page.body).ok_or_else(|| {
            tracing::error!(
                snippet = utils::truncate_chars(&page.body, 500),
                "Session token missing from landing page"
            );
            Yt2SampError::SessionTokenNotFound
        })?;

        let cookie_header = scrape::cookie_header(&page.cookies);

        tracing::debug!(
            sid = utils::truncate_chars(&token, 20),
            cookies = utils::truncate_chars(&cookie_header, 50),
            "Upload session acquired"
        );

        Ok(UploadSession { token, cookie_header })
    }

    /// Write the result page next to the uploaded file for later inspection
    async fn save_snapshot(&self, dir: &Path, html: &str) -> PathBuf {
        let path = dir.join(format!(
            "debug-result-{}.html",
            chrono::Utc::now().timestamp_millis()
        ));

        match tokio::fs::write(&path, html).await {
            Ok(()) => tracing::info!(file = %path.display(), "Result page saved"),
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "Could not save result page"),
        }

        path
    }
}

#[async_trait]
impl Uploader for UploadClient {
    async fn upload(&self, file_path: &Path) -> Result<UploadResult> {
        if !file_path.is_file() {
            return Err(Yt2SampError::FileNotFound(file_path.to_path_buf()));
        }

        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        tracing::info!(file = %file_name, "Starting upload");

        let session = self.acquire_session().await?;

        let data = tokio::fs::read(file_path).await?;
        let form = MultipartForm::new()
            .text(SESSION_FIELD, &session.token)
            .text(SUBMIT_FIELD, &self.settings.submit_label)
            .file(FILE_FIELD, &file_name, AUDIO_CONTENT_TYPE, &data);
        drop(data);

        let base = self.http.base_url().as_str();
        let cookie = Some(session.cookie_header.as_str());
        let response = self
            .http
            .post_multipart(base, form, cookie, self.settings.upload_timeout())
            .await?;

        tracing::info!(status = response.status.as_u16(), "Upload POST answered");

        let location = response.redirect_target().map(str::to_string);
        let (html, redirect_page) = match location {
            Some(location) => {
                let page_link = self.http.absolute_url(&location);
                let (_, result) = self
                    .http
                    .follow_redirects(&location, cookie, self.settings.page_timeout())
                    .await?;
                (result.body, Some(page_link))
            }
            None => (response.body, None),
        };

        let snapshot_dir = self
            .snapshot_dir
            .as_deref()
            .or_else(|| file_path.parent())
            .unwrap_or_else(|| Path::new("."));
        let snapshot = self.save_snapshot(snapshot_dir, &html).await;

        let direct_link = match scrape::extract_direct_link(&html) {
            Some(link) => link,
            None => {
                tracing::error!(
                    snippet = utils::truncate_chars(&html, 1000),
                    "No link found on result page"
                );
                return Err(Yt2SampError::LinkNotFound { snapshot });
            }
        };

        let page_link = redirect_page.unwrap_or_else(|| direct_link.clone());

        tracing::info!(direct = %direct_link, page = %page_link, "Upload finished");

        Ok(UploadResult {
            direct_link,
            page_link,
        })
    }
}
