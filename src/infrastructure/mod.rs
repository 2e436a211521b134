//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image handling (optimization, caching, fetching).
pub mod image;

pub use config::{AppConfig, CliArgs, LogLevel, StorageManager};
pub use image::{
    CacheConfig, CacheState, CacheStats, DiskEntryStore, EvictionReport, HttpResourceFetcher,
    ImageCacheManager, ImageOptimizer, OptimizerConfig,
};
