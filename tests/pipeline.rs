use async_trait::async_trait;
use mockito::Server;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use yt2samp::config::{ExtractionConfig, UploadConfig};
use yt2samp::extractors::runner::{CommandOutcome, CommandOutput, CommandRunner};
use yt2samp::extractors::youtube::YoutubeExtractor;
use yt2samp::{
    AudioExtractor, ConcurrencyGuard, ConversionPipeline, ExtractionRequest, ExtractionResult, UploadClient,
    UploadResult, Uploader, Yt2SampError,
};

/// Pretends to be yt-dlp: writes the mp3 next to the `-o` template and prints its metadata
struct FakeYtDlp {
    stderr: Option<&'static str>,
    calls: AtomicUsize,
}

#[async_trait]
impl CommandRunner for FakeYtDlp {
    async fn run(&self, _program: &str, args: &[String], _timeout: Duration) -> yt2samp::Result<CommandOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/abc123XYZ_"));

        if let Some(stderr) = self.stderr {
            return Ok(CommandOutcome::Exited(CommandOutput {
                success: false,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }));
        }

        let template = args.iter().skip_while(|a| a.as_str() != "-o").nth(1).unwrap();
        std::fs::write(Path::new(template).with_file_name("abc123XYZ_.mp3"), b"ID3 fake audio").unwrap();
        Ok(CommandOutcome::Exited(CommandOutput {
            success: true,
            exit_code: Some(0),
            stdout: r#"{"id":"abc123XYZ_","title":"Test Song","duration":125}"#.to_string(),
            stderr: String::new(),
        }))
    }
}

fn extraction_settings(temp_dir: &Path) -> ExtractionConfig {
    ExtractionConfig {
        temp_dir: temp_dir.to_path_buf(),
        cookies_file: temp_dir.join("no-cookies.txt"),
        cookies_browser: None,
        ..ExtractionConfig::default()
    }
}

fn fake_ytdlp(stderr: Option<&'static str>) -> Arc<FakeYtDlp> {
    Arc::new(FakeYtDlp {
        stderr,
        calls: AtomicUsize::new(0),
    })
}

struct StaticUploader;

#[async_trait]
impl Uploader for StaticUploader {
    async fn upload(&self, _file_path: &Path) -> yt2samp::Result<UploadResult> {
        Ok(UploadResult {
            direct_link: "http://e.top4top.io/m_test123.mp3".to_string(),
            page_link: "http://e.top4top.io/m_test123.mp3".to_string(),
        })
    }
}

/// Takes a while, then reads the file it was handed
struct SlowReadingUploader;

#[async_trait]
impl Uploader for SlowReadingUploader {
    async fn upload(&self, file_path: &Path) -> yt2samp::Result<UploadResult> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let data = tokio::fs::read(file_path).await?;
        assert_eq!(data, b"ID3 fake audio");
        Ok(UploadResult {
            direct_link: "http://e.top4top.io/m_test123.mp3".to_string(),
            page_link: "http://e.top4top.io/m_test123.mp3".to_string(),
        })
    }
}

struct HangingExtractor;

#[async_trait]
impl AudioExtractor for HangingExtractor {
    async fn extract(&self, _request: &ExtractionRequest) -> yt2samp::Result<ExtractionResult> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_end_to_end_conversion() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("set-cookie", "PHPSESSID=e2e; path=/")
        .with_body(r#"<input type="hidden" name="sid" value="e2e-token">"#)
        .create_async()
        .await;
    let post = server
        .mock("POST", "/")
        .match_header("cookie", "PHPSESSID=e2e")
        .with_status(200)
        .with_body(r#"<div><input value="http://e.top4top.io/m_test123.mp3"></div>"#)
        .create_async()
        .await;

    let temp = tempfile::tempdir().unwrap();
    let runner = fake_ytdlp(None);
    let extractor = YoutubeExtractor::with_runner(extraction_settings(temp.path()), runner.clone());
    let uploader = UploadClient::new(UploadConfig {
        base_url: format!("{}/", server.url()),
        ..UploadConfig::default()
    })
    .unwrap();

    let pipeline = ConversionPipeline::with_components(
        ConcurrencyGuard::new(2, Duration::from_secs(600)),
        Arc::new(extractor),
        Arc::new(uploader),
    );

    let outcome = pipeline.process("https://youtu.be/abc123XYZ_", "player-1").await.unwrap();

    post.assert_async().await;
    assert_eq!(outcome.title, "Test Song");
    assert_eq!(outcome.duration, "2:05");
    assert_eq!(outcome.direct_link, "http://e.top4top.io/m_test123.mp3");
    assert_eq!(outcome.page_link, outcome.direct_link);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    assert!(!pipeline.guard().is_busy("player-1"));
}

#[tokio::test]
async fn test_same_video_for_two_users_at_once() {
    let temp = tempfile::tempdir().unwrap();
    let runner = fake_ytdlp(None);
    let pipeline = ConversionPipeline::with_components(
        ConcurrencyGuard::new(2, Duration::from_secs(600)),
        Arc::new(YoutubeExtractor::with_runner(extraction_settings(temp.path()), runner.clone())),
        Arc::new(SlowReadingUploader),
    );

    let alice = pipeline.process("https://youtu.be/abc123XYZ_", "alice");
    let bob = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        pipeline.process("https://youtu.be/abc123XYZ_", "bob").await
    };
    let (alice, bob) = tokio::join!(alice, bob);

    assert_eq!(alice.unwrap().direct_link, "http://e.top4top.io/m_test123.mp3");
    assert_eq!(bob.unwrap().direct_link, "http://e.top4top.io/m_test123.mp3");
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_extraction_failure_releases_user() {
    let temp = tempfile::tempdir().unwrap();
    let runner = fake_ytdlp(Some("ERROR: [youtube] abc123XYZ_: Private video"));
    let pipeline = ConversionPipeline::with_components(
        ConcurrencyGuard::new(2, Duration::from_secs(600)),
        Arc::new(YoutubeExtractor::with_runner(extraction_settings(temp.path()), runner.clone())),
        Arc::new(StaticUploader),
    );

    let err = pipeline.process("https://youtu.be/abc123XYZ_", "player-1").await.unwrap_err();

    assert!(matches!(err, Yt2SampError::PrivateVideo));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    assert!(!pipeline.guard().is_busy("player-1"));
}

#[tokio::test]
async fn test_cancelled_request_releases_user() {
    let pipeline = ConversionPipeline::with_components(
        ConcurrencyGuard::new(5, Duration::from_secs(600)),
        Arc::new(HangingExtractor),
        Arc::new(StaticUploader),
    );

    let attempt = tokio::time::timeout(
        Duration::from_millis(50),
        pipeline.process("https://youtu.be/abc123XYZ_", "player-1"),
    )
    .await;

    assert!(attempt.is_err());
    assert!(!pipeline.guard().is_busy("player-1"));
    assert_eq!(pipeline.guard().active_count(), 0);
}

#[tokio::test]
async fn test_request_over_quota_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let runner = fake_ytdlp(None);
    let pipeline = ConversionPipeline::with_components(
        ConcurrencyGuard::new(2, Duration::from_secs(600)),
        Arc::new(YoutubeExtractor::with_runner(extraction_settings(temp.path()), runner.clone())),
        Arc::new(StaticUploader),
    );

    for _ in 0..2 {
        pipeline.process("https://youtu.be/abc123XYZ_", "player-1").await.unwrap();
    }

    let err = pipeline.process("https://youtu.be/abc123XYZ_", "player-1").await.unwrap_err();
    assert!(matches!(err, Yt2SampError::RateLimited { .. }));
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);

    // Another player has a separate quota
    pipeline.process("https://youtu.be/abc123XYZ_", "player-2").await.unwrap();
}
