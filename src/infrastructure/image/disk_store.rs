//! Disk-backed durable entry store.
//!
//! Each entry is two files named by the locator's storage key: the raw payload
//! (`<key>.img`) and a JSON record with the locator, metadata and timestamps
//! (`<key>.json`). Records are written to a temporary file and renamed so a
//! crash never leaves a half-written record behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::domain::entities::{CachedEntry, ResourceLocator};
use crate::domain::ports::{CacheError, CacheResult, EntryStorePort};

const PAYLOAD_EXT: &str = "img";
const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// Entry store persisting payloads and records under one directory.
#[derive(Debug, Clone)]
pub struct DiskEntryStore {
    cache_dir: PathBuf,
}

impl DiskEntryStore {
    /// Opens the store, creating the directory if needed.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created.
    pub async fn new(cache_dir: PathBuf) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;
        Ok(Self { cache_dir })
    }

    /// Directory holding the entry files.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.{PAYLOAD_EXT}"))
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.{RECORD_EXT}"))
    }

    async fn write_record(&self, key: &str, entry: &CachedEntry) -> CacheResult<()> {
        let json = serde_json::to_vec(entry)
            .map_err(|e| CacheError::Serialization(format!("Failed to encode record: {e}")))?;

        let final_path = self.record_path(key);
        let temp_path = self.cache_dir.join(format!("{key}.{RECORD_EXT}.{TEMP_EXT}"));
        write_file(&temp_path, &json).await?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to commit record: {e}")))
    }

    async fn read_record(&self, key: &str) -> CacheResult<CachedEntry> {
        let raw = fs::read(self.record_path(key))
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read record: {e}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| CacheError::Serialization(format!("Failed to decode record: {e}")))
    }

    /// Loads one entry, or `None` if its files are corrupt or incomplete.
    async fn load_entry(&self, key: &str) -> Option<CachedEntry> {
        let mut entry = match self.read_record(key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping unreadable cache record");
                return None;
            }
        };

        if entry.locator.storage_key() != key {
            warn!(key = %key, locator = %entry.locator, "Dropping misnamed cache record");
            return None;
        }

        match fs::read(self.payload_path(key)).await {
            Ok(bytes) => {
                entry.payload = bytes.into();
                Some(entry)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping cache record without payload");
                None
            }
        }
    }

    async fn remove_key(&self, key: &str) {
        for path in [self.payload_path(key), self.record_path(key)] {
            if let Err(e) = fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
    }
}

#[async_trait::async_trait]
impl EntryStorePort for DiskEntryStore {
    async fn load_all(&self) -> CacheResult<Vec<CachedEntry>> {
        let mut dir = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        let mut records = Vec::new();
        let mut payloads = Vec::new();

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read entry: {e}")))?
        {
            let path = item.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            match path.extension().and_then(|e| e.to_str()) {
                Some(RECORD_EXT) => records.push(stem),
                Some(PAYLOAD_EXT) => payloads.push(stem),
                Some(TEMP_EXT) => {
                    trace!(path = %path.display(), "Removing stale temporary record");
                    let _ = fs::remove_file(&path).await;
                }
                _ => {}
            }
        }

        let mut entries = Vec::with_capacity(records.len());
        for key in &records {
            match self.load_entry(key).await {
                Some(entry) => entries.push(entry),
                None => self.remove_key(key).await,
            }
        }

        for key in payloads.iter().filter(|k| !records.contains(k)) {
            debug!(key = %key, "Removing orphaned payload");
            self.remove_key(key).await;
        }

        entries.sort_by_key(|e| e.last_accessed_at);
        debug!(count = entries.len(), dir = %self.cache_dir.display(), "Loaded cache entries");
        Ok(entries)
    }

    async fn put(&self, entry: &CachedEntry) -> CacheResult<()> {
        let key = entry.locator.storage_key();
        write_file(&self.payload_path(&key), &entry.payload).await?;
        self.write_record(&key, entry).await?;

        trace!(locator = %entry.locator, size = entry.payload.len(), "Persisted cache entry");
        Ok(())
    }

    async fn touch(
        &self,
        locator: &ResourceLocator,
        last_accessed_at: DateTime<Utc>,
        access_count: u64,
    ) -> CacheResult<()> {
        let key = locator.storage_key();
        if !fs::try_exists(self.record_path(&key)).await.unwrap_or(false) {
            return Ok(());
        }

        let mut entry = self.read_record(&key).await?;
        entry.last_accessed_at = last_accessed_at;
        entry.access_count = access_count;
        self.write_record(&key, &entry).await
    }

    async fn delete(&self, locator: &ResourceLocator) -> CacheResult<()> {
        self.remove_key(&locator.storage_key()).await;
        trace!(locator = %locator, "Deleted cache entry");
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut dir = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read entry: {e}")))?
        {
            let path = item.path();
            let ours = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| [PAYLOAD_EXT, RECORD_EXT, TEMP_EXT].contains(&e));
            if ours && fs::remove_file(&path).await.is_err() {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }

        debug!("Cleared disk entry store");
        Ok(())
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| CacheError::IoError(format!("Failed to create cache file: {e}")))?;
    file.write_all(bytes)
        .await
        .map_err(|e| CacheError::IoError(format!("Failed to write cache file: {e}")))?;
    file.flush()
        .await
        .map_err(|e| CacheError::IoError(format!("Failed to flush cache file: {e}")))
}

/// Entry store that keeps nothing; used when persistence is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEntryStore;

#[async_trait::async_trait]
impl EntryStorePort for NullEntryStore {
    async fn load_all(&self) -> CacheResult<Vec<CachedEntry>> {
        Ok(Vec::new())
    }

    async fn put(&self, _entry: &CachedEntry) -> CacheResult<()> {
        Ok(())
    }

    async fn touch(
        &self,
        _locator: &ResourceLocator,
        _last_accessed_at: DateTime<Utc>,
        _access_count: u64,
    ) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _locator: &ResourceLocator) -> CacheResult<()> {
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Returns the default entry directory.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "imgcache", "imgcache").map_or_else(
        || std::env::temp_dir().join("imgcache").join("entries"),
        |dirs| dirs.cache_dir().join("entries"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntryMetadata, ImageFormat};
    use bytes::Bytes;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    async fn create_test_store() -> (DiskEntryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskEntryStore::new(temp_dir.path().to_path_buf())
            .await
            .unwrap();
        (store, temp_dir)
    }

    fn entry(locator: &str, payload: &'static [u8], accessed: DateTime<Utc>) -> CachedEntry {
        let mut entry = CachedEntry::new(
            ResourceLocator::new(locator),
            Bytes::from_static(payload),
            EntryMetadata::opaque(ImageFormat::Webp, payload.len() as u64),
            accessed,
        );
        entry.last_accessed_at = accessed;
        entry
    }

    #[tokio::test]
    async fn test_put_and_load() {
        let (store, _temp) = create_test_store().await;
        let now = Utc::now();
        store.put(&entry("/uploads/a.png?format=webp", b"aaaa", now)).await.unwrap();

        let loaded = store.load_all().await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].locator.as_str(), "/uploads/a.png?format=webp");
        assert_eq!(loaded[0].payload.as_ref(), b"aaaa");
        assert_eq!(loaded[0].metadata.size_bytes, 4);
    }

    #[tokio::test]
    async fn test_load_orders_by_last_access() {
        let (store, _temp) = create_test_store().await;
        let now = Utc::now();
        store.put(&entry("/new", b"1", now)).await.unwrap();
        store.put(&entry("/old", b"2", now - TimeDelta::hours(1))).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        let order: Vec<_> = loaded.iter().map(|e| e.locator.as_str()).collect();

        assert_eq!(order, vec!["/old", "/new"]);
    }

    #[tokio::test]
    async fn test_touch_persists_access_fields() {
        let (store, _temp) = create_test_store().await;
        let now = Utc::now();
        let e = entry("/a", b"x", now);
        store.put(&e).await.unwrap();

        let later = now + TimeDelta::minutes(5);
        store.touch(&e.locator, later, 7).await.unwrap();
        let loaded = store.load_all().await.unwrap();

        assert_eq!(loaded[0].last_accessed_at, later);
        assert_eq!(loaded[0].access_count, 7);
    }

    #[tokio::test]
    async fn test_touch_missing_is_noop() {
        let (store, _temp) = create_test_store().await;
        assert!(store.touch(&ResourceLocator::new("/nope"), Utc::now(), 2).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let (store, _temp) = create_test_store().await;
        let now = Utc::now();
        let a = entry("/a", b"a", now);
        store.put(&a).await.unwrap();
        store.put(&entry("/b", b"b", now)).await.unwrap();

        store.delete(&a.locator).await.unwrap();
        store.delete(&a.locator).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);

        store.clear().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_dropped() {
        let (store, temp) = create_test_store().await;
        let now = Utc::now();
        store.put(&entry("/good", b"g", now)).await.unwrap();

        let bad_key = ResourceLocator::new("/bad").storage_key();
        fs::write(temp.path().join(format!("{bad_key}.json")), b"{not json")
            .await
            .unwrap();
        fs::write(temp.path().join(format!("{bad_key}.img")), b"x")
            .await
            .unwrap();

        let loaded = store.load_all().await.unwrap();

        assert_eq!(loaded.len(), 1);
        assert!(!temp.path().join(format!("{bad_key}.json")).exists());
        assert!(!temp.path().join(format!("{bad_key}.img")).exists());
    }

    #[tokio::test]
    async fn test_orphaned_payload_is_removed() {
        let (store, temp) = create_test_store().await;
        let orphan = temp.path().join("deadbeef.img");
        fs::write(&orphan, b"orphan").await.unwrap();

        assert!(store.load_all().await.unwrap().is_empty());
        assert!(!orphan.exists());
    }

    #[tokio::test]
    async fn test_record_without_payload_is_dropped() {
        let (store, temp) = create_test_store().await;
        let e = entry("/a", b"a", Utc::now());
        store.put(&e).await.unwrap();
        fs::remove_file(temp.path().join(format!("{}.img", e.locator.storage_key())))
            .await
            .unwrap();

        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_null_store_keeps_nothing() {
        let store = NullEntryStore;
        let e = entry("/a", b"a", Utc::now());

        tokio_test::block_on(async {
            store.put(&e).await.unwrap();
            store.touch(&e.locator, Utc::now(), 3).await.unwrap();
            assert!(store.load_all().await.unwrap().is_empty());
            store.delete(&e.locator).await.unwrap();
            store.clear().await.unwrap();
        });
    }
}
