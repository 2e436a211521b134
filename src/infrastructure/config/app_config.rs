//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::entities::NetworkClass;
use crate::infrastructure::image::cache_manager::{
    CacheConfig, DEFAULT_CLEANUP_EVERY_INSERTS, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_CACHE_AGE,
    DEFAULT_MAX_CACHE_SIZE,
};
use crate::infrastructure::image::optimizer::{DEFAULT_REWRITABLE_PATTERN, OptimizerConfig};

const APP_NAME: &str = "imgcache";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "imgcache";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, read from `config.toml` and merged with CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Base URL relative sources are resolved against.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Resource cache configuration.
    #[serde(default)]
    pub cache: CacheSection,

    /// Network configuration.
    #[serde(default)]
    pub network: NetworkSection,

    /// Optimizer configuration.
    #[serde(default)]
    pub optimizer: OptimizerSection,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSection {
    /// Directory of the durable store; defaults to the user cache dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Size budget in bytes.
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Maximum entry age in seconds.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Interval of the periodic cleanup in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Insertions between opportunistic cleanups.
    #[serde(default = "default_cleanup_every_inserts")]
    pub cleanup_every_inserts: usize,

    /// Mirror entries into the durable store.
    #[serde(default = "default_true")]
    pub persistent: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            dir: None,
            max_size: default_max_size(),
            max_age_secs: default_max_age_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            cleanup_every_inserts: default_cleanup_every_inserts(),
            persistent: true,
        }
    }
}

impl CacheSection {
    /// Converts the section into the cache manager configuration.
    #[must_use]
    pub const fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_size: self.max_size,
            max_age: Duration::from_secs(self.max_age_secs),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs),
            cleanup_every_inserts: self.cleanup_every_inserts,
        }
    }
}

/// `[network]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Effective connection type assumed at startup.
    #[serde(default)]
    pub class: NetworkClass,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            class: NetworkClass::Unknown,
        }
    }
}

/// `[optimizer]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerSection {
    /// Regex of the mutable-asset namespace.
    #[serde(default = "default_rewritable_pattern")]
    pub rewritable_pattern: String,

    /// Memoized metadata results.
    #[serde(default = "default_metadata_cache_size")]
    pub metadata_cache_size: usize,

    /// Resource hint lifetime in milliseconds.
    #[serde(default = "default_hint_ttl_ms")]
    pub hint_ttl_ms: u64,

    /// Widths used by `srcset` when none are given.
    #[serde(default = "default_srcset_widths")]
    pub srcset_widths: Vec<u32>,
}

impl Default for OptimizerSection {
    fn default() -> Self {
        Self {
            rewritable_pattern: default_rewritable_pattern(),
            metadata_cache_size: default_metadata_cache_size(),
            hint_ttl_ms: default_hint_ttl_ms(),
            srcset_widths: default_srcset_widths(),
        }
    }
}

impl OptimizerSection {
    /// Converts the section into the optimizer configuration.
    #[must_use]
    pub fn to_optimizer_config(&self, network: NetworkClass) -> OptimizerConfig {
        OptimizerConfig {
            rewritable_pattern: self.rewritable_pattern.clone(),
            metadata_cache_size: self.metadata_cache_size,
            hint_ttl: Duration::from_millis(self.hint_ttl_ms),
            initial_network: network,
        }
    }
}

const fn default_max_size() -> u64 {
    DEFAULT_MAX_CACHE_SIZE
}

const fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_CACHE_AGE.as_secs()
}

const fn default_cleanup_interval_secs() -> u64 {
    DEFAULT_CLEANUP_INTERVAL.as_secs()
}

const fn default_cleanup_every_inserts() -> usize {
    DEFAULT_CLEANUP_EVERY_INSERTS
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_rewritable_pattern() -> String {
    DEFAULT_REWRITABLE_PATTERN.to_string()
}

const fn default_metadata_cache_size() -> usize {
    256
}

const fn default_hint_ttl_ms() -> u64 {
    3000
}

fn default_srcset_widths() -> Vec<u32> {
    vec![320, 640, 960, 1280, 1920]
}

const fn default_true() -> bool {
    true
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.dir = Some(cache_dir.clone());
        }
        if let Some(network) = args.network {
            self.network.class = network;
        }
        if let Some(base_url) = &args.base_url {
            self.base_url = Some(base_url.clone());
        }
        if args.no_persist {
            self.cache.persistent = false;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("imgcache.log"))
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            base_url: None,
            cache: CacheSection::default(),
            network: NetworkSection::default(),
            optimizer: OptimizerSection::default(),
        }
    }
}
