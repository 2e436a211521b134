//! Image handling infrastructure.
//!
//! This module provides:
//! - Encoding capability probes and metadata extraction
//! - Capability-aware URL optimization and placeholders
//! - The resource cache with a disk-backed durable store
//! - The HTTP fetch primitive

pub mod analysis;
pub mod cache_manager;
pub mod capabilities;
pub mod disk_store;
pub mod fetcher;
pub mod optimizer;
pub mod placeholder;

pub use cache_manager::{CacheConfig, CacheState, CacheStats, EvictionReport, ImageCacheManager};
pub use capabilities::detect_supported_formats;
pub use disk_store::{DiskEntryStore, NullEntryStore, default_cache_dir};
pub use fetcher::HttpResourceFetcher;
pub use optimizer::{ImageOptimizer, OptimizerConfig};
pub use placeholder::{fallback_placeholder, generate_placeholder};
