use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "yt2samp",
    about = "yt2samp - Turn YouTube links into direct audio URLs for the SA-MP boombox",
    version,
    long_about = "Downloads the audio of a YouTube video with yt-dlp, uploads it to top4top.io and prints a direct link that the SA-MP boombox can stream. Retries with cookies when YouTube asks for a sign-in."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one YouTube link into a boombox URL
    Convert {
        /// YouTube link (youtube.com/watch, youtu.be, shorts, embed, m.youtube.com)
        #[arg(value_name = "URL")]
        url: String,

        /// Identity the rate limit is applied to
        #[arg(short, long, value_name = "ID", default_value = "local", env = "YT2SAMP_USER")]
        user: String,
    },

    /// Read `<user-id> <url>` requests from stdin, one per line, and answer each on stdout
    Serve,

    /// Delete stale files from the temp directory
    Sweep {
        /// Remove files older than this many seconds (defaults to the configured age)
        #[arg(long, value_name = "SECS")]
        max_age_secs: Option<u64>,
    },

    /// Show or write out the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List accepted YouTube link formats
    Formats,
}
