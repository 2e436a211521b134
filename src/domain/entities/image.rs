//! Domain types for cached image variants.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resolved key identifying one cached image variant.
///
/// A locator is the fully rewritten source: base path plus the format, quality,
/// width and priority parameters. Two variants of the same logical image are two
/// different locators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLocator(String);

impl ResourceLocator {
    /// Creates a new `ResourceLocator` from any string-like input.
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// Returns a filesystem-safe key derived by hashing the locator.
    #[must_use]
    pub fn storage_key(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceLocator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceLocator {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Image encodings known to the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// AV1 image file format.
    Avif,
    /// WebP.
    Webp,
    /// JPEG.
    Jpeg,
    /// PNG.
    Png,
    /// GIF. Recognised as a source format, never negotiated.
    Gif,
}

impl ImageFormat {
    /// Value used for the `format` locator parameter.
    #[must_use]
    pub const fn as_param(self) -> &'static str {
        match self {
            Self::Avif => "avif",
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
        }
    }

    /// Guesses the encoding from a path or URL extension, ignoring any query string.
    #[must_use]
    pub fn from_path(src: &str) -> Option<Self> {
        let path = src.split(['?', '#']).next().unwrap_or(src);
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "avif" => Some(Self::Avif),
            "webp" => Some(Self::Webp),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Maps a `Content-Type` header value to an encoding.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        match mime {
            "image/avif" => Some(Self::Avif),
            "image/webp" => Some(Self::Webp),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_param())
    }
}

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Mixes the color toward white by `amount` (0.0 keeps it, 1.0 is white).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn lighten(self, amount: f64) -> Self {
        let amount = amount.clamp(0.0, 1.0);
        let mix = |c: u8| (f64::from(c) + (255.0 - f64::from(c)) * amount).round() as u8;
        Self::new(mix(self.r), mix(self.g), mix(self.b))
    }

    /// Returns the `#rrggbb` form.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Descriptive data derived by decoding an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    /// Natural width in pixels.
    pub width: u32,
    /// Natural height in pixels.
    pub height: u32,
    /// Width divided by height.
    pub aspect_ratio: f64,
    /// Most frequent opaque color, if any pixel was opaque enough to count.
    pub dominant_color: Option<Rgb>,
    /// Encoding detected from the bytes.
    pub format: Option<ImageFormat>,
    /// Uncompressed size estimate (`width * height * 3`).
    pub estimated_bytes: u64,
}

/// Metadata stored alongside a cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// Width in pixels, 0 when the payload could not be decoded.
    pub width: u32,
    /// Height in pixels, 0 when the payload could not be decoded.
    pub height: u32,
    /// Encoding of the payload.
    pub format: ImageFormat,
    /// Bytes retained by this entry, counted against the size budget.
    pub size_bytes: u64,
    /// Width divided by height, 1.0 when unknown.
    pub aspect_ratio: f64,
    /// Dominant color when the payload was decodable.
    pub dominant_color: Option<Rgb>,
}

impl EntryMetadata {
    /// Builds entry metadata from decoded image metadata and the payload size.
    #[must_use]
    pub fn from_decoded(decoded: &ImageMetadata, fallback: ImageFormat, size_bytes: u64) -> Self {
        Self {
            width: decoded.width,
            height: decoded.height,
            format: decoded.format.unwrap_or(fallback),
            size_bytes,
            aspect_ratio: decoded.aspect_ratio,
            dominant_color: decoded.dominant_color,
        }
    }

    /// Metadata for a payload whose pixels are unknown.
    #[must_use]
    pub const fn opaque(format: ImageFormat, size_bytes: u64) -> Self {
        Self {
            width: 0,
            height: 0,
            format,
            size_bytes,
            aspect_ratio: 1.0,
            dominant_color: None,
        }
    }
}

/// One entry of the resource cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEntry {
    /// Primary key.
    pub locator: ResourceLocator,
    /// Fetched payload. Persisted separately from the record.
    #[serde(skip)]
    pub payload: Bytes,
    /// Descriptive metadata.
    pub metadata: EntryMetadata,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last hit time; never earlier than `created_at`.
    pub last_accessed_at: DateTime<Utc>,
    /// Number of hits, including the creating fetch.
    pub access_count: u64,
}

impl CachedEntry {
    /// Creates a fresh entry.
    #[must_use]
    pub fn new(
        locator: ResourceLocator,
        payload: Bytes,
        metadata: EntryMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            locator,
            payload,
            metadata,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
        }
    }

    /// Records a hit. `last_accessed_at` never moves backwards.
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Age of the entry at `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::TimeDelta {
        now.signed_duration_since(self.created_at)
    }

    /// Bytes counted against the size budget.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.metadata.size_bytes
    }

    /// Returns a cheap handle on the payload for callers.
    #[must_use]
    pub fn to_image(&self, source: ImageSource) -> CachedImage {
        CachedImage {
            locator: self.locator.clone(),
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            source,
        }
    }
}

/// Where a resolved payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Served from the in-memory index.
    Memory,
    /// Downloaded from the network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A payload handed out by the cache.
#[derive(Debug, Clone)]
pub struct CachedImage {
    /// Locator the payload was fetched from.
    pub locator: ResourceLocator,
    /// Shared payload bytes.
    pub payload: Bytes,
    /// Metadata recorded for the entry.
    pub metadata: EntryMetadata,
    /// Memory hit or network fetch.
    pub source: ImageSource,
}

/// Result of a cache lookup that never fails.
#[derive(Debug, Clone)]
pub enum ResolvedImage {
    /// The optimized variant, cached or freshly fetched.
    Cached(CachedImage),
    /// The fetch failed; the original, unoptimized source.
    Original(String),
}

impl ResolvedImage {
    /// Source usable directly as an image reference.
    #[must_use]
    pub fn src(&self) -> &str {
        match self {
            Self::Cached(image) => image.locator.as_str(),
            Self::Original(src) => src,
        }
    }

    /// Returns true if the optimized variant was resolved.
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}
