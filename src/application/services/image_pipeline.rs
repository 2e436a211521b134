//! Composition root of the image resource cache.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::entities::ImageOptions;
use crate::domain::ports::{CacheResult, EntryStorePort, ResourceFetcherPort};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::image::{
    CacheState, DiskEntryStore, HttpResourceFetcher, ImageCacheManager, ImageOptimizer,
    NullEntryStore, default_cache_dir,
};

/// Wires the fetcher, optimizer, durable store and cache together.
#[derive(Debug)]
pub struct ImagePipeline {
    optimizer: Arc<ImageOptimizer>,
    cache: ImageCacheManager,
    srcset_widths: Vec<u32>,
}

impl ImagePipeline {
    /// Builds and starts a pipeline from configuration.
    ///
    /// `overrides` may carry `max_cache_size` / `max_cache_age` budget overrides.
    /// An unusable cache directory degrades to a memory-only cache.
    ///
    /// # Errors
    /// Returns error if the fetcher or optimizer configuration is invalid.
    pub async fn bootstrap(config: &AppConfig, overrides: &ImageOptions) -> CacheResult<Self> {
        let fetcher: Arc<dyn ResourceFetcherPort> = Arc::new(HttpResourceFetcher::new(
            config.base_url.as_deref(),
            Duration::from_secs(config.network.timeout_secs),
        )?);

        let store: Arc<dyn EntryStorePort> = if config.cache.persistent {
            let dir = config.cache.dir.clone().unwrap_or_else(default_cache_dir);
            match DiskEntryStore::new(dir).await {
                Ok(store) => {
                    info!(dir = %store.cache_dir().display(), "Using disk entry store");
                    Arc::new(store)
                }
                Err(e) => {
                    warn!(error = %e, "Disk entry store unavailable, caching in memory only");
                    Arc::new(NullEntryStore)
                }
            }
        } else {
            Arc::new(NullEntryStore)
        };

        let pipeline = Self::from_parts(config, overrides, fetcher, store)?;
        pipeline.start().await;
        Ok(pipeline)
    }

    /// Builds a pipeline from explicit adapters without starting it.
    ///
    /// # Errors
    /// Returns error if the optimizer configuration is invalid.
    pub fn from_parts(
        config: &AppConfig,
        overrides: &ImageOptions,
        fetcher: Arc<dyn ResourceFetcherPort>,
        store: Arc<dyn EntryStorePort>,
    ) -> CacheResult<Self> {
        let optimizer = Arc::new(ImageOptimizer::new(
            &config.optimizer.to_optimizer_config(config.network.class),
            Arc::clone(&fetcher),
        )?);
        let cache_config = config.cache.to_cache_config().apply_options(overrides);
        let cache = ImageCacheManager::new(cache_config, Arc::clone(&optimizer), fetcher, store);

        Ok(Self {
            optimizer,
            cache,
            srcset_widths: config.optimizer.srcset_widths.clone(),
        })
    }

    /// Detects capabilities, hydrates the cache and starts periodic cleanup.
    pub async fn start(&self) -> CacheState {
        self.optimizer.initialize().await;
        let state = self.cache.initialize().await;
        self.cache.start_cleanup_task();
        info!(state = %state, network = %self.optimizer.network_class(), "Image pipeline ready");
        state
    }

    /// The optimizer.
    #[must_use]
    pub const fn optimizer(&self) -> &Arc<ImageOptimizer> {
        &self.optimizer
    }

    /// The resource cache.
    #[must_use]
    pub const fn cache(&self) -> &ImageCacheManager {
        &self.cache
    }

    /// Configured default srcset widths.
    #[must_use]
    pub fn srcset_widths(&self) -> &[u32] {
        &self.srcset_widths
    }

    /// Stops background work.
    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
        info!("Image pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::NetworkClass;
    use crate::domain::ports::mocks::{MemoryEntryStore, StaticFetcher, png_bytes};

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.network.class = NetworkClass::TwoG;
        config
    }

    #[tokio::test]
    async fn test_from_parts_applies_overrides() {
        let overrides = ImageOptions {
            max_cache_size: Some(1024),
            ..ImageOptions::default()
        };
        let pipeline = ImagePipeline::from_parts(
            &test_config(),
            &overrides,
            Arc::new(StaticFetcher::new()),
            Arc::new(MemoryEntryStore::new()),
        )
        .unwrap();

        assert_eq!(pipeline.cache().config().max_size, 1024);
        assert_eq!(pipeline.optimizer().default_quality(), 50);
        assert_eq!(pipeline.cache().state(), CacheState::Uninitialized);
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let fetcher = Arc::new(
            StaticFetcher::new().with_resource("/uploads/a.png", png_bytes(2, 2, [5, 5, 5])),
        );
        let pipeline = ImagePipeline::from_parts(
            &test_config(),
            &ImageOptions::default(),
            fetcher,
            Arc::new(MemoryEntryStore::new()),
        )
        .unwrap();

        assert_eq!(pipeline.start().await, CacheState::Ready);
        assert!(pipeline.optimizer().is_ready());
        assert!(pipeline.cache().cleanup_task_running());

        let resolved = pipeline
            .cache()
            .get("/uploads/a.png", &ImageOptions::default())
            .await;
        assert!(resolved.is_cached());
        assert!(resolved.src().contains("quality=50"));

        pipeline.shutdown().await;
        assert!(!pipeline.cache().cleanup_task_running());
    }

    #[tokio::test]
    async fn test_bootstrap_with_disk_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = test_config();
        config.cache.dir = Some(dir.path().join("entries"));
        config.base_url = Some("http://127.0.0.1:9/".to_string());

        let pipeline = ImagePipeline::bootstrap(&config, &ImageOptions::default())
            .await
            .unwrap();

        assert_eq!(pipeline.cache().state(), CacheState::Ready);
        assert!(pipeline.cache().is_persistent());
        assert!(dir.path().join("entries").exists());
        pipeline.shutdown().await;
    }
}
