//! Per-request image options.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Requested output encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatPreference {
    /// Negotiate the best supported encoding.
    #[default]
    Auto,
    /// Prefer WebP when supported.
    Webp,
    /// Prefer AVIF when supported.
    Avif,
}

impl FromStr for FormatPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "webp" => Ok(Self::Webp),
            "avif" => Ok(Self::Avif),
            other => Err(format!("unknown format preference: {other}")),
        }
    }
}

/// Fetch priority of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Above-the-fold images; adds a priority hint to the locator.
    High,
    /// Default priority.
    #[default]
    Medium,
    /// Deferred images.
    Low,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Kind of placeholder surrogate shown while loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderKind {
    /// Soft surrogate sized to the true aspect ratio.
    #[default]
    Blur,
    /// Flat fill of the dominant color.
    Color,
    /// Diagonal gradient from the dominant color to a lighter variant.
    Gradient,
    /// No placeholder.
    None,
}

impl FromStr for PlaceholderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blur" => Ok(Self::Blur),
            "color" => Ok(Self::Color),
            "gradient" => Ok(Self::Gradient),
            "none" => Ok(Self::None),
            other => Err(format!("unknown placeholder kind: {other}")),
        }
    }
}

/// Options recognised by every optimizer and cache operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageOptions {
    /// Explicit quality (0-100); defaults from the network class.
    pub quality: Option<u8>,
    /// Requested encoding.
    pub format: FormatPreference,
    /// Fetch priority.
    pub priority: Priority,
    /// Placeholder surrogate kind.
    pub placeholder: PlaceholderKind,
    /// Issue a resource hint before the image is requested.
    pub preload: bool,
    /// Route the request through the cache index.
    pub cache: bool,
    /// Target width in pixels.
    pub width: Option<u32>,
    /// Size budget override in bytes.
    pub max_cache_size: Option<u64>,
    /// Maximum age override.
    #[serde(with = "duration_ms_opt")]
    pub max_cache_age: Option<Duration>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            quality: None,
            format: FormatPreference::Auto,
            priority: Priority::Medium,
            placeholder: PlaceholderKind::Blur,
            preload: false,
            cache: true,
            width: None,
            max_cache_size: None,
            max_cache_age: None,
        }
    }
}

impl ImageOptions {
    /// Sets the target width.
    #[must_use]
    pub const fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    /// Sets an explicit quality.
    #[must_use]
    pub const fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the format preference.
    #[must_use]
    pub const fn with_format(mut self, format: FormatPreference) -> Self {
        self.format = format;
        self
    }

    /// Sets the placeholder kind.
    #[must_use]
    pub const fn with_placeholder(mut self, placeholder: PlaceholderKind) -> Self {
        self.placeholder = placeholder;
        self
    }
}

mod duration_ms_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ImageOptions::default();
        assert!(options.cache);
        assert!(!options.preload);
        assert_eq!(options.placeholder, PlaceholderKind::Blur);
        assert_eq!(options.format, FormatPreference::Auto);
    }

    #[test]
    fn test_parse_options_json() {
        let options: ImageOptions = serde_json::from_str(
            r#"{"quality": 60, "format": "avif", "priority": "high", "maxCacheAge": 1500}"#,
        )
        .unwrap();

        assert_eq!(options.quality, Some(60));
        assert_eq!(options.format, FormatPreference::Avif);
        assert_eq!(options.priority, Priority::High);
        assert_eq!(options.max_cache_age, Some(Duration::from_millis(1500)));
        assert!(options.cache);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Gradient".parse(), Ok(PlaceholderKind::Gradient));
        assert_eq!("low".parse(), Ok(Priority::Low));
        assert!("jpeg2000".parse::<FormatPreference>().is_err());
    }
}
