use super::app_config::LogLevel;
use crate::domain::entities::{FormatPreference, ImageOptions, NetworkClass, PlaceholderKind, Priority};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "imgcache",
    version,
    about = "Image resource cache with format negotiation and bounded persistent storage",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Directory of the durable store.
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Effective connection type (slow-2g, 2g, 3g, 4g, unknown).
    #[arg(long, global = true)]
    pub network: Option<NetworkClass>,

    /// Base URL relative sources are resolved against.
    #[arg(long, env = "IMGCACHE_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Keep the cache in memory only.
    #[arg(long, global = true)]
    pub no_persist: bool,

    /// Size budget override in bytes.
    #[arg(long, value_name = "BYTES", global = true)]
    pub max_cache_size: Option<u64>,

    /// Maximum entry age override in seconds.
    #[arg(long, value_name = "SECS", global = true)]
    pub max_cache_age: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve a source through the cache.
    Get {
        /// Image source (path or URL).
        src: String,

        #[command(flatten)]
        image: ImageArgs,

        /// Write the payload to this file.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Resolve several sources concurrently.
    Preload {
        /// Image sources.
        #[arg(required = true)]
        srcs: Vec<String>,

        #[command(flatten)]
        image: ImageArgs,
    },

    /// Print the srcset of a source.
    Srcset {
        /// Image source.
        src: String,

        /// Comma-separated widths; defaults to the configured list.
        #[arg(long, value_delimiter = ',')]
        widths: Vec<u32>,

        #[command(flatten)]
        image: ImageArgs,
    },

    /// Print the decoded metadata of a source.
    Metadata {
        /// Image source.
        src: String,
    },

    /// Print a placeholder data URI for a source.
    Placeholder {
        /// Image source.
        src: String,

        /// Placeholder kind (blur, color, gradient, none).
        #[arg(long, default_value = "blur")]
        kind: PlaceholderKind,
    },

    /// Print the detected encoding support.
    Probe,

    /// Print cache statistics.
    Stats,

    /// Empty the cache.
    Clear,
}

impl CliArgs {
    /// Budget overrides applied when the cache is built.
    #[must_use]
    pub fn budget_overrides(&self) -> ImageOptions {
        ImageOptions {
            max_cache_size: self.max_cache_size,
            max_cache_age: self.max_cache_age.map(Duration::from_secs),
            ..ImageOptions::default()
        }
    }
}

/// Per-request image options.
#[derive(Debug, Clone, Default, Args)]
pub struct ImageArgs {
    /// Target width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Explicit quality (0-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub quality: Option<u8>,

    /// Requested encoding (auto, webp, avif).
    #[arg(long)]
    pub format: Option<FormatPreference>,

    /// Fetch priority (high, medium, low).
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Bypass the cache index.
    #[arg(long)]
    pub no_cache: bool,
}

impl ImageArgs {
    /// Builds the request options.
    #[must_use]
    pub fn to_options(&self) -> ImageOptions {
        ImageOptions {
            quality: self.quality,
            format: self.format.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            cache: !self.no_cache,
            width: self.width,
            ..ImageOptions::default()
        }
    }
}
