//! Off-thread decoding and pixel sampling.

use std::collections::HashMap;

use crate::domain::entities::{ImageMetadata, Rgb};
use crate::domain::ports::{CacheError, CacheResult};

use super::capabilities::format_from_codec;

/// Every Nth pixel is sampled for the dominant color.
pub const SAMPLE_STRIDE: usize = 10;

/// Pixels with alpha below this are ignored.
pub const MIN_ALPHA: u8 = 125;

/// Decodes `bytes` and derives its metadata. CPU-bound; call from the blocking pool.
///
/// # Errors
/// Returns `DecodeError` if the bytes are not a decodable image.
pub fn analyze(bytes: &[u8]) -> CacheResult<ImageMetadata> {
    let format = image::guess_format(bytes).ok().and_then(format_from_codec);
    let img = image::load_from_memory(bytes)
        .map_err(|e| CacheError::DecodeError(format!("Failed to decode image: {e}")))?;

    let (width, height) = (img.width(), img.height());
    let rgba = img.to_rgba8();

    Ok(ImageMetadata {
        width,
        height,
        aspect_ratio: aspect_ratio(width, height),
        dominant_color: dominant_color(rgba.as_raw()),
        format,
        estimated_bytes: u64::from(width) * u64::from(height) * 3,
    })
}

/// Runs [`analyze`] on the blocking pool.
///
/// # Errors
/// Returns `DecodeError` if decoding fails or the task panicked.
pub async fn analyze_async(bytes: bytes::Bytes) -> CacheResult<ImageMetadata> {
    tokio::task::spawn_blocking(move || analyze(&bytes))
        .await
        .map_err(|e| CacheError::DecodeError(format!("Decode task panicked: {e}")))?
}

/// Width divided by height, 1.0 for degenerate sizes.
#[must_use]
pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    if width == 0 || height == 0 {
        1.0
    } else {
        f64::from(width) / f64::from(height)
    }
}

/// Most frequent opaque color among sampled RGBA pixels.
///
/// Ties go to the color that reached the winning count first.
#[must_use]
pub fn dominant_color(rgba: &[u8]) -> Option<Rgb> {
    let mut counts: HashMap<[u8; 3], u32> = HashMap::new();
    let mut best: Option<([u8; 3], u32)> = None;

    for px in rgba.chunks_exact(4).step_by(SAMPLE_STRIDE) {
        if px[3] < MIN_ALPHA {
            continue;
        }
        let key = [px[0], px[1], px[2]];
        let count = counts.entry(key).or_insert(0);
        *count += 1;
        if best.is_none_or(|(_, n)| *count > n) {
            best = Some((key, *count));
        }
    }

    best.map(|([r, g, b], _)| Rgb::new(r, g, b))
}
