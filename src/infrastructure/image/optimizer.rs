//! Capability-aware image URL optimization.
//!
//! Rewrites references in the mutable-asset namespace into concrete variant
//! locators (format, quality, width, priority), builds `srcset` strings, derives
//! metadata and placeholders, and issues resource hints.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::domain::entities::{
    CapabilityProfile, FormatPreference, FormatSupport, ImageFormat, ImageMetadata, ImageOptions,
    NetworkClass, PlaceholderKind, Priority, ResourceLocator, UNIVERSAL_FALLBACK, clamp_quality,
};
use crate::domain::ports::{CacheError, CacheResult, ResourceFetcherPort};

use super::analysis::analyze_async;
use super::capabilities::detect_supported_formats;
use super::placeholder::generate_placeholder;

/// Default pattern of the mutable-asset namespace.
pub const DEFAULT_REWRITABLE_PATTERN: &str = r"^(?:https?://[^/]+)?/uploads/";

/// Widths above this lose [`LARGE_WIDTH_DEDUCTION`] quality points in a srcset.
pub const LARGE_WIDTH: u32 = 1200;

/// Widths above this lose [`MEDIUM_WIDTH_DEDUCTION`] quality points in a srcset.
pub const MEDIUM_WIDTH: u32 = 800;

const LARGE_WIDTH_DEDUCTION: u8 = 20;
const MEDIUM_WIDTH_DEDUCTION: u8 = 10;

/// Lowest quality a srcset entry may get.
pub const SRCSET_QUALITY_FLOOR: u8 = 30;

/// Parameters owned by the optimizer; existing values are replaced.
const OWNED_PARAMS: [&str; 4] = ["format", "quality", "width", "priority"];

/// Optimizer configuration.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Regex matching sources that may be rewritten.
    pub rewritable_pattern: String,
    /// Number of memoized metadata results.
    pub metadata_cache_size: usize,
    /// How long a resource hint stays registered at most.
    pub hint_ttl: Duration,
    /// Network class assumed until one is reported.
    pub initial_network: NetworkClass,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            rewritable_pattern: DEFAULT_REWRITABLE_PATTERN.to_string(),
            metadata_cache_size: 256,
            hint_ttl: Duration::from_secs(3),
            initial_network: NetworkClass::Unknown,
        }
    }
}

/// Turns logical image references into optimized variant locators.
///
/// Format detection is an explicit async step ([`ImageOptimizer::initialize`]).
/// Until it completes the optimizer is "not ready": negotiation keeps the
/// original encoding (or the universal fallback) instead of guessing.
pub struct ImageOptimizer {
    rewritable: Regex,
    formats: OnceLock<FormatSupport>,
    network: RwLock<NetworkClass>,
    fetcher: Arc<dyn ResourceFetcherPort>,
    metadata_cache: Mutex<LruCache<String, ImageMetadata>>,
    hints: Arc<Mutex<HashMap<ResourceLocator, usize>>>,
    hint_ttl: Duration,
}

impl std::fmt::Debug for ImageOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageOptimizer")
            .field("rewritable", &self.rewritable.as_str())
            .field("profile", &self.profile())
            .finish_non_exhaustive()
    }
}

impl ImageOptimizer {
    /// Creates an optimizer that is not ready yet.
    ///
    /// # Errors
    /// Returns error if the rewritable pattern is not a valid regex.
    pub fn new(config: &OptimizerConfig, fetcher: Arc<dyn ResourceFetcherPort>) -> CacheResult<Self> {
        let rewritable = Regex::new(&config.rewritable_pattern)
            .map_err(|e| CacheError::Config(format!("Invalid rewritable pattern: {e}")))?;
        let cap = NonZeroUsize::new(config.metadata_cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            rewritable,
            formats: OnceLock::new(),
            network: RwLock::new(config.initial_network),
            fetcher,
            metadata_cache: Mutex::new(LruCache::new(cap)),
            hints: Arc::new(Mutex::new(HashMap::new())),
            hint_ttl: config.hint_ttl,
        })
    }

    /// Uses a fixed format profile instead of probing.
    #[must_use]
    pub fn with_format_support(self, support: FormatSupport) -> Self {
        let _ = self.formats.set(support);
        self
    }

    /// Probes the supported encodings. Later calls keep the first result.
    pub async fn initialize(&self) -> &FormatSupport {
        if let Some(support) = self.formats.get() {
            return support;
        }
        let detected = detect_supported_formats().await;
        let support = self.formats.get_or_init(|| detected);
        info!(
            supported = ?support
                .probes()
                .iter()
                .filter(|(_, ok)| *ok)
                .map(|(f, _)| f.as_param())
                .collect::<Vec<_>>(),
            "Image capabilities detected"
        );
        support
    }

    /// Returns true once format detection completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.formats.get().is_some()
    }

    /// Snapshot of the capability profile.
    #[must_use]
    pub fn profile(&self) -> CapabilityProfile {
        CapabilityProfile {
            formats: self.formats.get().cloned(),
            network: self.network_class(),
        }
    }

    /// Current network class.
    #[must_use]
    pub fn network_class(&self) -> NetworkClass {
        *self.network.read()
    }

    /// Records a network class change; later calls use the new default quality.
    pub fn set_network_class(&self, class: NetworkClass) {
        let previous = std::mem::replace(&mut *self.network.write(), class);
        if previous != class {
            debug!(from = %previous, to = %class, "Network class changed");
        }
    }

    /// Default quality for the current network class.
    #[must_use]
    pub fn default_quality(&self) -> u8 {
        clamp_quality(self.network_class().default_quality())
    }

    /// Highest-priority supported encoding for an image in `original`.
    #[must_use]
    pub fn best_format(&self, original: Option<ImageFormat>) -> ImageFormat {
        match self.formats.get() {
            Some(support) => support.best_format(original),
            None => original.unwrap_or(UNIVERSAL_FALLBACK),
        }
    }

    /// Returns true if `src` belongs to the mutable-asset namespace.
    #[must_use]
    pub fn is_rewritable(&self, src: &str) -> bool {
        self.rewritable.is_match(src)
    }

    /// Rewrites `src` into the locator of the requested variant.
    ///
    /// Sources outside the mutable-asset namespace pass through unchanged.
    #[must_use]
    pub fn generate_optimized_src(&self, src: &str, options: &ImageOptions) -> ResourceLocator {
        if !self.is_rewritable(src) {
            return ResourceLocator::new(src);
        }

        let (base, existing) = match src.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (src, None),
        };

        let format = self.target_format(src, options.format);
        let quality = options
            .quality
            .map_or_else(|| self.default_quality(), clamp_quality);

        let mut params = vec![format!("format={format}"), format!("quality={quality}")];
        if let Some(width) = options.width {
            params.push(format!("width={width}"));
        }
        if options.priority == Priority::High {
            params.push("priority=high".to_string());
        }

        if let Some(existing) = existing {
            for param in existing.split('&').filter(|p| !p.is_empty()) {
                let key = param.split('=').next().unwrap_or("");
                if !OWNED_PARAMS.contains(&key) {
                    params.push(param.to_string());
                }
            }
        }

        ResourceLocator::new(format!("{}?{}", base, params.join("&")))
    }

    /// Builds a `srcset` value with one locator per width.
    ///
    /// Wider variants get progressively lower quality.
    #[must_use]
    pub fn generate_src_set(&self, src: &str, widths: &[u32], options: &ImageOptions) -> String {
        let base_quality = options
            .quality
            .map_or_else(|| self.default_quality(), clamp_quality);

        widths
            .iter()
            .map(|&width| {
                let variant = options
                    .clone()
                    .with_width(width)
                    .with_quality(srcset_quality(base_quality, width));
                format!("{} {width}w", self.generate_optimized_src(src, &variant))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Decodes `src` and derives its metadata, memoized by source.
    ///
    /// # Errors
    /// Fails if the image cannot be fetched or decoded; callers treat this as
    /// "no metadata available".
    pub async fn image_metadata(&self, src: &str) -> CacheResult<ImageMetadata> {
        if let Some(meta) = self.metadata_cache.lock().get(src) {
            trace!(src = %src, "Metadata memo hit");
            return Ok(meta.clone());
        }

        let fetched = self.fetcher.fetch(src).await?;
        let meta = analyze_async(fetched.bytes).await?;

        self.metadata_cache.lock().put(src.to_string(), meta.clone());
        debug!(src = %src, width = meta.width, height = meta.height, "Derived image metadata");
        Ok(meta)
    }

    /// Builds a placeholder surrogate; see [`generate_placeholder`].
    #[must_use]
    pub fn generate_placeholder(
        &self,
        metadata: Option<&ImageMetadata>,
        kind: PlaceholderKind,
    ) -> Option<String> {
        generate_placeholder(metadata, kind)
    }

    /// Issues a resource hint for the optimized variant of `src`.
    ///
    /// The hint warms the network path without writing to the cache. It stays
    /// registered until the warm fetch settles or the hint TTL elapses.
    pub fn preload_image(&self, src: &str, options: &ImageOptions) -> JoinHandle<()> {
        let locator = self.generate_optimized_src(src, options);
        let fetcher = Arc::clone(&self.fetcher);
        let hints = Arc::clone(&self.hints);
        let ttl = self.hint_ttl;

        *hints.lock().entry(locator.clone()).or_insert(0) += 1;
        debug!(locator = %locator, priority = ?options.priority, "Issued resource hint");

        tokio::spawn(async move {
            match tokio::time::timeout(ttl, fetcher.fetch(locator.as_str())).await {
                Ok(Ok(_)) => trace!(locator = %locator, "Resource hint warmed"),
                Ok(Err(e)) => debug!(locator = %locator, error = %e, "Resource hint fetch failed"),
                Err(_) => trace!(locator = %locator, "Resource hint expired"),
            }

            let mut hints = hints.lock();
            if let Some(count) = hints.get_mut(&locator) {
                *count -= 1;
                if *count == 0 {
                    hints.remove(&locator);
                }
            }
        })
    }

    /// Number of distinct locators with a live resource hint.
    #[must_use]
    pub fn active_hints(&self) -> usize {
        self.hints.lock().len()
    }

    fn target_format(&self, src: &str, preference: FormatPreference) -> ImageFormat {
        let original = ImageFormat::from_path(src);
        let requested = match preference {
            FormatPreference::Auto => None,
            FormatPreference::Webp => Some(ImageFormat::Webp),
            FormatPreference::Avif => Some(ImageFormat::Avif),
        };

        match (requested, self.formats.get()) {
            (Some(format), Some(support)) if support.supports(format) => format,
            _ => self.best_format(original),
        }
    }
}

/// Quality of a srcset entry of `width` pixels.
#[must_use]
pub fn srcset_quality(base: u8, width: u32) -> u8 {
    let deduction = if width > LARGE_WIDTH {
        LARGE_WIDTH_DEDUCTION
    } else if width > MEDIUM_WIDTH {
        MEDIUM_WIDTH_DEDUCTION
    } else {
        0
    };
    base.saturating_sub(deduction).max(SRCSET_QUALITY_FLOOR)
}
