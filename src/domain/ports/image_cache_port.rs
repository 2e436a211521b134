//! Port definitions for the image resource cache.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::domain::entities::{CachedEntry, ResourceLocator};

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// Resource not found.
    #[error("Image not found: {0}")]
    NotFound(String),
    /// Failed to decode image.
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// I/O error during a store operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// Network error during download.
    #[error("Network error: {0}")]
    NetworkError(String),
    /// A persisted record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Bytes returned by a fetch.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Response body.
    pub bytes: Bytes,
    /// `Content-Type` header, when present.
    pub content_type: Option<String>,
}

/// Port for the binary fetch primitive.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceFetcherPort: Send + Sync {
    /// Fetches the resource behind `locator`.
    /// Non-success statuses are errors.
    async fn fetch(&self, locator: &str) -> CacheResult<FetchedResource>;
}

/// Port for the durable entry store.
/// Implementations must be thread-safe.
#[async_trait::async_trait]
pub trait EntryStorePort: Send + Sync {
    /// Loads every stored entry, ordered by `last_accessed_at` ascending.
    async fn load_all(&self) -> CacheResult<Vec<CachedEntry>>;

    /// Stores an entry, replacing any entry with the same locator.
    async fn put(&self, entry: &CachedEntry) -> CacheResult<()>;

    /// Persists updated access fields of an existing entry.
    async fn touch(
        &self,
        locator: &ResourceLocator,
        last_accessed_at: DateTime<Utc>,
        access_count: u64,
    ) -> CacheResult<()>;

    /// Removes an entry. Removing a missing entry is not an error.
    async fn delete(&self, locator: &ResourceLocator) -> CacheResult<()>;

    /// Removes every entry.
    async fn clear(&self) -> CacheResult<()>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    /// Encodes a solid-color PNG.
    pub fn png_bytes(width: u32, height: u32, rgb: [u8; 3]) -> Bytes {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb(rgb),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        Bytes::from(out)
    }

    /// Fetcher serving a fixed set of resources.
    /// Sources are matched on the path before the query string.
    #[derive(Default)]
    pub struct StaticFetcher {
        resources: Mutex<HashMap<String, Bytes>>,
        failing: Mutex<HashSet<String>>,
        delay: Option<Duration>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl StaticFetcher {
        /// Creates an empty fetcher; every request fails with `NotFound`.
        pub fn new() -> Self {
            Self::default()
        }

        /// Serves `bytes` for `path`.
        pub fn with_resource(self, path: &str, bytes: Bytes) -> Self {
            self.resources.lock().insert(path.to_string(), bytes);
            self
        }

        /// Fails with a network error for `path`.
        pub fn with_failure(self, path: &str) -> Self {
            self.failing.lock().insert(path.to_string());
            self
        }

        /// Sleeps before answering each request.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Locators requested so far.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        /// Number of requests so far.
        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait::async_trait]
    impl ResourceFetcherPort for StaticFetcher {
        async fn fetch(&self, locator: &str) -> CacheResult<FetchedResource> {
            self.calls.lock().push(locator.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let path = locator.split('?').next().unwrap_or(locator);
            if self.failing.lock().contains(path) {
                return Err(CacheError::NetworkError(format!("HTTP 500 for {path}")));
            }
            self.resources
                .lock()
                .get(path)
                .cloned()
                .map(|bytes| FetchedResource {
                    bytes,
                    content_type: None,
                })
                .ok_or_else(|| CacheError::NotFound(path.to_string()))
        }
    }

    /// In-memory entry store.
    #[derive(Default)]
    pub struct MemoryEntryStore {
        entries: Mutex<HashMap<ResourceLocator, CachedEntry>>,
        unavailable: AtomicBool,
        writes: AtomicUsize,
        load_delay: Option<Duration>,
    }

    impl MemoryEntryStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates a store whose every operation fails.
        pub fn unavailable() -> Self {
            let store = Self::default();
            store.unavailable.store(true, Ordering::SeqCst);
            store
        }

        /// Delays every `load_all` call.
        pub fn with_load_delay(mut self, delay: Duration) -> Self {
            self.load_delay = Some(delay);
            self
        }

        /// Seeds an entry without counting a write.
        pub fn seed(&self, entry: CachedEntry) {
            self.entries.lock().insert(entry.locator.clone(), entry);
        }

        /// Returns true if the locator is stored.
        pub fn contains(&self, locator: &str) -> bool {
            self.entries.lock().contains_key(&ResourceLocator::new(locator))
        }

        /// Returns a stored entry.
        pub fn get(&self, locator: &str) -> Option<CachedEntry> {
            self.entries
                .lock()
                .get(&ResourceLocator::new(locator))
                .cloned()
        }

        /// Number of stored entries.
        pub fn len(&self) -> usize {
            self.entries.lock().len()
        }

        /// Number of `put` calls.
        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        fn check(&self) -> CacheResult<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                Err(CacheError::IoError("store unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl EntryStorePort for MemoryEntryStore {
        async fn load_all(&self) -> CacheResult<Vec<CachedEntry>> {
            self.check()?;
            let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
            if let Some(delay) = self.load_delay {
                tokio::time::sleep(delay).await;
            }
            entries.sort_by_key(|e| e.last_accessed_at);
            Ok(entries)
        }

        async fn put(&self, entry: &CachedEntry) -> CacheResult<()> {
            self.check()?;
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.seed(entry.clone());
            Ok(())
        }

        async fn touch(
            &self,
            locator: &ResourceLocator,
            last_accessed_at: DateTime<Utc>,
            access_count: u64,
        ) -> CacheResult<()> {
            self.check()?;
            if let Some(entry) = self.entries.lock().get_mut(locator) {
                entry.last_accessed_at = last_accessed_at;
                entry.access_count = access_count;
            }
            Ok(())
        }

        async fn delete(&self, locator: &ResourceLocator) -> CacheResult<()> {
            self.check()?;
            self.entries.lock().remove(locator);
            Ok(())
        }

        async fn clear(&self) -> CacheResult<()> {
            self.check()?;
            self.entries.lock().clear();
            Ok(())
        }
    }
}
