use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// yt-dlp extraction settings
    pub extraction: ExtractionConfig,

    /// File host upload settings
    pub upload: UploadConfig,

    /// Per-user request limits
    pub limits: LimitsConfig,

    /// Temp directory sweep
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// Where downloaded audio and result snapshots are written
    pub temp_dir: PathBuf,

    /// Netscape cookies file, used only when it exists
    pub cookies_file: PathBuf,

    /// Browser profile for `--cookies-from-browser`
    pub cookies_browser: Option<String>,

    /// Wall-clock limit for one yt-dlp run
    pub timeout_secs: u64,

    pub max_duration_secs: u64,

    pub max_file_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Landing page and form target
    pub base_url: String,

    /// Host (and its subdomains) resolved to `pinned_ip` instead of DNS
    pub pinned_host: String,

    pub pinned_ip: Ipv4Addr,

    /// Expected value of the form's submit button
    pub submit_label: String,

    pub page_timeout_secs: u64,

    pub upload_timeout_secs: u64,

    /// The pinned address does not present a certificate clients can verify
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Requests allowed per user inside one window
    pub max_requests: u32,

    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_secs: u64,

    /// Files older than this are removed by the sweep
    pub max_age_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            temp_dir: PathBuf::from("temp"),
            cookies_file: PathBuf::from("cookies.txt"),
            cookies_browser: None,
            timeout_secs: 120,
            max_duration_secs: 600,
            max_file_size_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: "https://top4top.io/".to_string(),
            pinned_host: "top4top.io".to_string(),
            pinned_ip: Ipv4Addr::new(188, 165, 137, 170),
            submit_label: "[ رفع الملفات ]".to_string(),
            page_timeout_secs: 60,
            upload_timeout_secs: 300,
            accept_invalid_certs: true,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests: 2,
            window_secs: 600,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30 * 60,
            max_age_secs: 60 * 60,
        }
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl UploadConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

impl LimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Config {
    /// Load configuration from file or create default, then apply environment overrides
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str(&content).context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save().await?;
            config
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("yt2samp").join("config.yaml"))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("YT2SAMP_TEMP_DIR") {
            self.extraction.temp_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("YT2SAMP_COOKIES_FILE") {
            self.extraction.cookies_file = PathBuf::from(file);
        }
        if let Some(path) = lookup("YT_DLP_PATH") {
            self.extraction.yt_dlp_path = path;
        }
        if let Some(browser) = lookup("COOKIES_BROWSER") {
            let browser = browser.trim();
            self.extraction.cookies_browser = match browser {
                "" | "none" => None,
                name => Some(name.to_string()),
            };
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.extraction.timeout_secs == 0 {
            anyhow::bail!("extraction.timeout_secs must be greater than zero");
        }
        if self.extraction.max_duration_secs == 0 || self.extraction.max_file_size_bytes == 0 {
            anyhow::bail!("extraction limits must be greater than zero");
        }
        if self.limits.max_requests == 0 || self.limits.window_secs == 0 {
            anyhow::bail!("limits.max_requests and limits.window_secs must be greater than zero");
        }
        if self.upload.pinned_host.is_empty() {
            anyhow::bail!("upload.pinned_host must be configured");
        }

        Url::parse(&self.upload.base_url)
            .with_context(|| format!("upload.base_url is not a valid URL: {}", self.upload.base_url))?;

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  yt-dlp: {}", self.extraction.yt_dlp_path);
        println!("  Temp Dir: {}", self.extraction.temp_dir.display());
        println!("  Cookies File: {}", self.extraction.cookies_file.display());
        println!(
            "  Cookies Browser: {}",
            self.extraction.cookies_browser.as_deref().unwrap_or("none")
        );
        println!("  Max Duration: {}s", self.extraction.max_duration_secs);
        println!(
            "  Max File Size: {}",
            crate::utils::format_file_size(self.extraction.max_file_size_bytes)
        );
        println!(
            "  Upload Host: {} (pinned to {})",
            self.upload.base_url, self.upload.pinned_ip
        );
        println!(
            "  Rate Limit: {} requests per {}s",
            self.limits.max_requests, self.limits.window_secs
        );
    }
}
