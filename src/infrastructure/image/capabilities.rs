//! Encoding capability probes.

use std::io::Cursor;

use tracing::{debug, trace};

use crate::domain::entities::{FormatSupport, ImageFormat, PROBE_CANDIDATES};

/// Probes every candidate encoding once, in priority order.
///
/// Runs the round trips on the blocking pool. Never fails: a probe that errors or
/// panics counts as unsupported.
pub async fn detect_supported_formats() -> FormatSupport {
    let probes = tokio::task::spawn_blocking(|| {
        PROBE_CANDIDATES
            .iter()
            .map(|format| (*format, probe_format(*format)))
            .collect::<Vec<_>>()
    })
    .await
    .unwrap_or_else(|e| {
        debug!(error = %e, "Format probe task failed, assuming no support");
        PROBE_CANDIDATES.iter().map(|f| (*f, false)).collect()
    });

    debug!(?probes, "Detected supported image formats");
    FormatSupport::from_probes(probes)
}

/// Encodes a 1x1 image in `format` and decodes it back.
#[must_use]
pub fn probe_format(format: ImageFormat) -> bool {
    let Some(codec) = codec_for(format) else {
        return false;
    };

    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        1,
        1,
        image::Rgb([255, 255, 255]),
    ));
    let mut buf = Vec::new();
    if let Err(e) = img.write_to(&mut Cursor::new(&mut buf), codec) {
        trace!(format = %format, error = %e, "Encode probe failed");
        return false;
    }

    match image::load_from_memory_with_format(&buf, codec) {
        Ok(decoded) => decoded.width() == 1 && decoded.height() == 1,
        Err(e) => {
            trace!(format = %format, error = %e, "Decode probe failed");
            false
        }
    }
}

/// Maps a domain encoding to the `image` crate codec.
#[must_use]
pub const fn codec_for(format: ImageFormat) -> Option<image::ImageFormat> {
    match format {
        ImageFormat::Avif => Some(image::ImageFormat::Avif),
        ImageFormat::Webp => Some(image::ImageFormat::WebP),
        ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
        ImageFormat::Png => Some(image::ImageFormat::Png),
        ImageFormat::Gif => Some(image::ImageFormat::Gif),
    }
}

/// Maps an `image` crate codec back to a domain encoding.
#[must_use]
pub const fn format_from_codec(codec: image::ImageFormat) -> Option<ImageFormat> {
    match codec {
        image::ImageFormat::Avif => Some(ImageFormat::Avif),
        image::ImageFormat::WebP => Some(ImageFormat::Webp),
        image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
        image::ImageFormat::Png => Some(ImageFormat::Png),
        image::ImageFormat::Gif => Some(ImageFormat::Gif),
        _ => None,
    }
}
