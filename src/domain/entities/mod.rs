//! Domain entity definitions.

mod capability;
mod image;
mod options;

pub use capability::{
    CapabilityProfile, FormatSupport, MAX_QUALITY, MIN_QUALITY, NEXT_GEN_FORMATS, NetworkClass,
    PROBE_CANDIDATES, UNIVERSAL_FALLBACK, clamp_quality,
};
pub use image::{
    CachedEntry, CachedImage, EntryMetadata, ImageFormat, ImageMetadata, ImageSource,
    ResolvedImage, ResourceLocator, Rgb,
};
pub use options::{FormatPreference, ImageOptions, PlaceholderKind, Priority};
