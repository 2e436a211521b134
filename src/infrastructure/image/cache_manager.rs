//! Process-wide resource cache.
//!
//! Maps optimized locators to fetched payloads. The in-memory index is mirrored
//! into a durable [`EntryStorePort`], bounded by a size and age budget, and
//! evicted both periodically and after every Nth insertion.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared, join_all};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    CachedEntry, CachedImage, EntryMetadata, ImageFormat, ImageOptions, ImageSource,
    ResolvedImage, ResourceLocator, UNIVERSAL_FALLBACK,
};
use crate::domain::ports::{
    CacheError, CacheResult, EntryStorePort, FetchedResource, ResourceFetcherPort,
};
use crate::domain::services::{EvictionPlan, EvictionPolicy};

use super::analysis::analyze_async;
use super::optimizer::ImageOptimizer;

/// Default size budget (50 MiB).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 50 * 1024 * 1024;

/// Default maximum entry age (7 days).
pub const DEFAULT_MAX_CACHE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default interval of the periodic cleanup task.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default number of insertions between opportunistic cleanups.
pub const DEFAULT_CLEANUP_EVERY_INSERTS: usize = 10;

/// Cache budget and maintenance schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Size budget in bytes.
    pub max_size: u64,
    /// Maximum entry age.
    pub max_age: Duration,
    /// Interval of the periodic cleanup task.
    pub cleanup_interval: Duration,
    /// Run a cleanup after every this many insertions; 0 disables it.
    pub cleanup_every_inserts: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_CACHE_SIZE,
            max_age: DEFAULT_MAX_CACHE_AGE,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            cleanup_every_inserts: DEFAULT_CLEANUP_EVERY_INSERTS,
        }
    }
}

impl CacheConfig {
    /// Applies the `max_cache_size` / `max_cache_age` overrides of `options`.
    #[must_use]
    pub fn apply_options(mut self, options: &ImageOptions) -> Self {
        if let Some(size) = options.max_cache_size {
            self.max_size = size;
        }
        if let Some(age) = options.max_cache_age {
            self.max_age = age;
        }
        self
    }

    /// Eviction policy for this budget.
    #[must_use]
    pub fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::new(self.max_size, self.max_age)
    }
}

/// Lifecycle of the cache as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Nothing loaded from the durable store yet.
    Uninitialized,
    /// Hydration from the durable store is running.
    Hydrating,
    /// Hydration finished or was abandoned.
    Ready,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Hydrating => write!(f, "hydrating"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of live entries.
    pub entries: usize,
    /// Bytes retained by live entries.
    pub size: u64,
    /// Number of lookups served from the index.
    pub hits: u64,
    /// Number of lookups that needed a fetch.
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 without requests.
    pub hit_ratio: f64,
}

impl std::fmt::Display for CacheStats {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} entries, {:.1} KiB, {:.1}% hit rate ({} hits, {} misses)",
            self.entries,
            self.size as f64 / 1024.0,
            self.hit_ratio * 100.0,
            self.hits,
            self.misses
        )
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries removed for exceeding the maximum age.
    pub expired: Vec<ResourceLocator>,
    /// Entries removed to fit the size budget.
    pub evicted: Vec<ResourceLocator>,
    /// Bytes retained afterwards.
    pub retained_bytes: u64,
}

impl EvictionReport {
    /// Total number of removed entries.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.expired.len() + self.evicted.len()
    }
}

impl From<EvictionPlan> for EvictionReport {
    fn from(plan: EvictionPlan) -> Self {
        Self {
            expired: plan.expired,
            evicted: plan.over_budget,
            retained_bytes: plan.retained_bytes,
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, CacheResult<CachedImage>>>;

struct CleanupTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct CacheInner {
    config: CacheConfig,
    policy: EvictionPolicy,
    optimizer: Arc<ImageOptimizer>,
    fetcher: Arc<dyn ResourceFetcherPort>,
    store: Arc<dyn EntryStorePort>,
    index: RwLock<HashMap<ResourceLocator, CachedEntry>>,
    in_flight: Mutex<HashMap<ResourceLocator, SharedFetch>>,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicUsize,
    epoch: AtomicU64,
    removed_while_hydrating: Mutex<HashSet<ResourceLocator>>,
    state: RwLock<CacheState>,
    persistence: AtomicBool,
    cleanup_task: Mutex<Option<CleanupTask>>,
}

/// Get-or-fetch-and-cache front for optimized image variants.
///
/// Cheap to clone; clones share one index. Lookups work in every [`CacheState`]:
/// hydration only adds entries the index does not already hold.
#[derive(Clone)]
pub struct ImageCacheManager {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for ImageCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCacheManager")
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ImageCacheManager {
    /// Creates an empty, uninitialized cache.
    #[must_use]
    pub fn new(
        config: CacheConfig,
        optimizer: Arc<ImageOptimizer>,
        fetcher: Arc<dyn ResourceFetcherPort>,
        store: Arc<dyn EntryStorePort>,
    ) -> Self {
        let policy = config.policy();
        Self {
            inner: Arc::new(CacheInner {
                config,
                policy,
                optimizer,
                fetcher,
                store,
                index: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                insertions: AtomicUsize::new(0),
                epoch: AtomicU64::new(0),
                removed_while_hydrating: Mutex::new(HashSet::new()),
                state: RwLock::new(CacheState::Uninitialized),
                persistence: AtomicBool::new(true),
                cleanup_task: Mutex::new(None),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CacheState {
        *self.inner.state.read()
    }

    /// Returns true while entries are mirrored into the durable store.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.inner.persistence.load(Ordering::Relaxed)
    }

    /// Configured budget.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Optimizer used to resolve locators.
    #[must_use]
    pub fn optimizer(&self) -> &Arc<ImageOptimizer> {
        &self.inner.optimizer
    }

    /// Hydrates the index from the durable store and runs a first cleanup.
    ///
    /// Expired records are dropped (and deleted from the store). Entries already
    /// present in memory win over persisted ones. Records cleared or evicted while
    /// the store was being read are not restored. A store failure switches the
    /// cache to memory-only operation; it never fails the caller.
    pub async fn initialize(&self) -> CacheState {
        {
            let mut state = self.inner.state.write();
            if *state != CacheState::Uninitialized {
                return *state;
            }
            *state = CacheState::Hydrating;
        }

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        match self.inner.store.load_all().await {
            Ok(records) => {
                let now = Utc::now();
                let mut expired = Vec::new();
                let mut loaded = 0usize;
                let mut skipped = 0usize;
                {
                    let mut index = self.inner.index.write();
                    let cleared = self.inner.epoch.load(Ordering::Acquire) != epoch;
                    let removed = std::mem::take(&mut *self.inner.removed_while_hydrating.lock());
                    for record in records {
                        if self.inner.policy.is_expired(&record, now) {
                            expired.push(record.locator);
                            continue;
                        }
                        if cleared || removed.contains(&record.locator) {
                            skipped += 1;
                            continue;
                        }
                        index.entry(record.locator.clone()).or_insert(record);
                        loaded += 1;
                    }
                    *self.inner.state.write() = CacheState::Ready;
                }

                for locator in &expired {
                    if let Err(e) = self.inner.store.delete(locator).await {
                        warn!(locator = %locator, error = %e, "Failed to delete expired record");
                    }
                }

                info!(loaded, skipped, expired = expired.len(), "Hydrated image cache");
            }
            Err(e) => {
                self.inner.persistence.store(false, Ordering::Relaxed);
                warn!(error = %e, "Durable store unavailable, continuing memory-only");
                let _index = self.inner.index.write();
                self.inner.removed_while_hydrating.lock().clear();
                *self.inner.state.write() = CacheState::Ready;
            }
        }

        self.inner.cleanup().await;
        CacheState::Ready
    }

    /// Resolves `src` to its optimized variant, falling back to `src` itself.
    ///
    /// Never fails: a fetch error yields [`ResolvedImage::Original`].
    pub async fn get(&self, src: &str, options: &ImageOptions) -> ResolvedImage {
        match self.try_get(src, options).await {
            Ok(image) => ResolvedImage::Cached(image),
            Err(e) => {
                warn!(src = %src, error = %e, "Image fetch failed, serving original source");
                ResolvedImage::Original(src.to_string())
            }
        }
    }

    /// Resolves `src` to its optimized variant.
    ///
    /// A hit updates the entry's access fields and counts a hit. A miss counts a
    /// miss and joins (or starts) the single in-flight fetch for the locator.
    /// With `options.cache == false` the index is bypassed entirely.
    ///
    /// # Errors
    /// Returns the fetch error; no entry is created in that case.
    pub async fn try_get(&self, src: &str, options: &ImageOptions) -> CacheResult<CachedImage> {
        let locator = self.inner.optimizer.generate_optimized_src(src, options);

        if !options.cache {
            trace!(locator = %locator, "Bypassing cache index");
            let fetched = self.inner.fetcher.fetch(locator.as_str()).await?;
            let entry = build_entry(locator, fetched).await;
            return Ok(entry.to_image(ImageSource::Network));
        }

        if let Some(image) = self.inner.lookup(&locator).await {
            return Ok(image);
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        trace!(locator = %locator, "Image cache miss");
        CacheInner::fetch_shared(&self.inner, locator).await
    }

    /// Resolves every source independently; one failure never affects the others.
    pub async fn preload(&self, urls: &[String], options: &ImageOptions) -> Vec<ResolvedImage> {
        let results = join_all(urls.iter().map(|src| self.get(src, options))).await;
        debug!(
            requested = urls.len(),
            cached = results.iter().filter(|r| r.is_cached()).count(),
            "Preloaded images"
        );
        results
    }

    /// Returns an entry without touching its access fields or the counters.
    #[must_use]
    pub fn peek(&self, locator: &ResourceLocator) -> Option<CachedEntry> {
        self.inner.index.read().get(locator).cloned()
    }

    /// Empties the index, resets the counters and clears the durable store.
    pub async fn clear(&self) {
        {
            let mut index = self.inner.index.write();
            index.clear();
            self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        }
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);

        if self.is_persistent()
            && let Err(e) = self.inner.store.clear().await
        {
            warn!(error = %e, "Failed to clear durable store");
        }
        debug!("Cleared image cache");
    }

    /// Returns cache statistics. Expired entries awaiting cleanup are not counted.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let (entries, size) = {
            let index = self.inner.index.read();
            index
                .values()
                .filter(|e| !self.inner.policy.is_expired(e, now))
                .fold((0usize, 0u64), |(count, bytes), e| (count + 1, bytes + e.size_bytes()))
        };
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_ratio = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            entries,
            size,
            hits,
            misses,
            hit_ratio,
        }
    }

    /// Runs one eviction pass now.
    pub async fn cleanup(&self) -> EvictionReport {
        self.inner.cleanup().await
    }

    /// Starts the periodic cleanup task. Does nothing if it already runs.
    pub fn start_cleanup_task(&self) {
        let mut slot = self.inner.cleanup_task.lock();
        if slot.is_some() {
            return;
        }

        let period = self.inner.config.cleanup_interval;
        if period.is_zero() {
            debug!("Cleanup interval is zero, periodic cleanup disabled");
            return;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else {
                            break;
                        };
                        inner.cleanup().await;
                    }
                }
            }
            debug!("Cache cleanup task stopped");
        });

        *slot = Some(CleanupTask { token, handle });
        info!(interval_secs = period.as_secs(), "Started cache cleanup task");
    }

    /// Returns true while the periodic cleanup task runs.
    #[must_use]
    pub fn cleanup_task_running(&self) -> bool {
        self.inner
            .cleanup_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Stops the periodic cleanup task and waits for it to finish.
    pub async fn shutdown(&self) {
        let task = self.inner.cleanup_task.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Cleanup task ended abnormally");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn insert_entry(&self, entry: CachedEntry) {
        self.inner
            .index
            .write()
            .insert(entry.locator.clone(), entry);
    }
}

impl CacheInner {
    async fn lookup(&self, locator: &ResourceLocator) -> Option<CachedImage> {
        let (image, last_accessed_at, access_count) = {
            let mut index = self.index.write();
            let entry = index.get_mut(locator)?;
            entry.record_access(Utc::now());
            (
                entry.to_image(ImageSource::Memory),
                entry.last_accessed_at,
                entry.access_count,
            )
        };

        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!(locator = %locator, access_count, "Image cache hit");

        if self.persistence.load(Ordering::Relaxed)
            && let Err(e) = self.store.touch(locator, last_accessed_at, access_count).await
        {
            warn!(locator = %locator, error = %e, "Failed to persist access time");
        }
        Some(image)
    }

    /// Joins the in-flight fetch for `locator`, starting one if none runs.
    ///
    /// The fetch runs as its own task so it completes and populates the cache
    /// even if every waiting caller goes away.
    fn fetch_shared(this: &Arc<Self>, locator: ResourceLocator) -> SharedFetch {
        let mut in_flight = this.in_flight.lock();
        if let Some(pending) = in_flight.get(&locator) {
            trace!(locator = %locator, "Joining in-flight fetch");
            return pending.clone();
        }

        let inner = Arc::clone(this);
        let key = locator.clone();
        let task = tokio::spawn(async move {
            let result = inner.fetch_and_store(&key).await;
            inner.in_flight.lock().remove(&key);
            result
        });

        let shared = async move {
            task.await
                .unwrap_or_else(|e| Err(CacheError::NetworkError(format!("Fetch task failed: {e}"))))
        }
        .boxed()
        .shared();

        in_flight.insert(locator, shared.clone());
        shared
    }

    async fn fetch_and_store(&self, locator: &ResourceLocator) -> CacheResult<CachedImage> {
        let fetched = self.fetcher.fetch(locator.as_str()).await?;
        let entry = build_entry(locator.clone(), fetched).await;
        let image = entry.to_image(ImageSource::Network);

        self.index.write().insert(locator.clone(), entry.clone());
        debug!(locator = %locator, size = entry.size_bytes(), "Stored image in cache");

        if self.persistence.load(Ordering::Relaxed)
            && let Err(e) = self.store.put(&entry).await
        {
            warn!(locator = %locator, error = %e, "Failed to persist cache entry");
        }

        let every = self.config.cleanup_every_inserts;
        let inserted = self.insertions.fetch_add(1, Ordering::Relaxed) + 1;
        if every > 0 && inserted % every == 0 {
            self.cleanup().await;
        }

        Ok(image)
    }

    async fn cleanup(&self) -> EvictionReport {
        let plan = {
            let mut index = self.index.write();
            let plan = self.policy.plan(index.values(), Utc::now());
            for locator in plan.removals() {
                index.remove(locator);
            }
            if *self.state.read() == CacheState::Hydrating {
                self.removed_while_hydrating
                    .lock()
                    .extend(plan.removals().cloned());
            }
            plan
        };

        if plan.is_empty() {
            trace!(retained_bytes = plan.retained_bytes, "Cache within budget");
            return plan.into();
        }

        debug!(
            expired = plan.expired.len(),
            evicted = plan.over_budget.len(),
            retained_bytes = plan.retained_bytes,
            max_size = self.policy.max_size(),
            "Evicted cache entries"
        );

        if self.persistence.load(Ordering::Relaxed) {
            for locator in plan.removals() {
                if let Err(e) = self.store.delete(locator).await {
                    warn!(locator = %locator, error = %e, "Failed to delete evicted entry");
                }
            }
        }

        plan.into()
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.get_mut().take() {
            task.token.cancel();
        }
    }
}

/// Builds a cache entry, decoding the payload for its metadata when possible.
async fn build_entry(locator: ResourceLocator, fetched: FetchedResource) -> CachedEntry {
    let size = fetched.bytes.len() as u64;
    let declared = fetched
        .content_type
        .as_deref()
        .and_then(ImageFormat::from_content_type)
        .or_else(|| ImageFormat::from_path(locator.as_str()))
        .unwrap_or(UNIVERSAL_FALLBACK);

    let metadata = match analyze_async(fetched.bytes.clone()).await {
        Ok(decoded) => EntryMetadata::from_decoded(&decoded, declared, size),
        Err(e) => {
            warn!(locator = %locator, error = %e, "Cached payload is not decodable");
            EntryMetadata::opaque(declared, size)
        }
    };

    CachedEntry::new(locator, fetched.bytes, metadata, Utc::now())
}
