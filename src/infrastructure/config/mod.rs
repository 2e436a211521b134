//! Application configuration.

pub mod app_config;
pub mod args;
pub mod storage;

pub use app_config::{AppConfig, CacheSection, LogLevel, NetworkSection, OptimizerSection};
pub use args::{CliArgs, Command, ImageArgs};
pub use storage::{ConfigError, StorageManager};
