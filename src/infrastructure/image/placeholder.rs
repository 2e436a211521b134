//! Inline SVG placeholder surrogates.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::domain::entities::{ImageMetadata, PlaceholderKind, Rgb};

/// Width of generated surrogates in pixels.
pub const PLACEHOLDER_WIDTH: u32 = 40;

/// Fill of the fallback surrogate.
pub const FALLBACK_COLOR: &str = "#e0e0e0";

/// Amount the gradient's light stop is mixed toward white.
const GRADIENT_LIGHTEN: f64 = 0.3;

/// Color used when the image had no opaque pixels.
const NEUTRAL: Rgb = Rgb::new(0xe0, 0xe0, 0xe0);

/// Builds a placeholder data URI.
///
/// Without metadata the fixed 10x10 neutral-gray surrogate is returned, whatever
/// the requested kind. `PlaceholderKind::None` yields `None`.
#[must_use]
pub fn generate_placeholder(
    metadata: Option<&ImageMetadata>,
    kind: PlaceholderKind,
) -> Option<String> {
    if kind == PlaceholderKind::None {
        return None;
    }

    let Some(meta) = metadata else {
        return Some(fallback_placeholder());
    };

    let color = meta.dominant_color.unwrap_or(NEUTRAL);
    let (w, h) = surrogate_size(meta.aspect_ratio);

    let svg = match kind {
        PlaceholderKind::Color => format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><rect width="100%" height="100%" fill="{}"/></svg>"#,
            color.to_hex()
        ),
        PlaceholderKind::Gradient => format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><defs><linearGradient id="g" x1="0" y1="0" x2="1" y2="1"><stop offset="0%" stop-color="{}"/><stop offset="100%" stop-color="{}"/></linearGradient></defs><rect width="100%" height="100%" fill="url(#g)"/></svg>"#,
            color.to_hex(),
            color.lighten(GRADIENT_LIGHTEN).to_hex()
        ),
        // The blur filter softens edges only; a flat fill stays flat.
        PlaceholderKind::Blur | PlaceholderKind::None => format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><defs><filter id="b"><feGaussianBlur stdDeviation="2"/></filter></defs><rect width="{w}" height="{h}" fill="{}" filter="url(#b)"/></svg>"#,
            color.to_hex()
        ),
    };

    Some(svg_data_uri(&svg))
}

/// The fixed neutral-gray 10x10 surrogate.
#[must_use]
pub fn fallback_placeholder() -> String {
    svg_data_uri(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10" viewBox="0 0 10 10"><rect width="10" height="10" fill="{FALLBACK_COLOR}"/></svg>"#
    ))
}

/// Surrogate dimensions for an aspect ratio.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn surrogate_size(aspect_ratio: f64) -> (u32, u32) {
    let ratio = if aspect_ratio.is_finite() && aspect_ratio > 0.0 {
        aspect_ratio
    } else {
        1.0
    };
    let height = (f64::from(PLACEHOLDER_WIDTH) / ratio).round().clamp(1.0, 4096.0) as u32;
    (PLACEHOLDER_WIDTH, height)
}

fn svg_data_uri(svg: &str) -> String {
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(uri: &str) -> String {
        let payload = uri.strip_prefix("data:image/svg+xml;base64,").unwrap();
        String::from_utf8(STANDARD.decode(payload).unwrap()).unwrap()
    }

    fn meta(color: Option<Rgb>, aspect_ratio: f64) -> ImageMetadata {
        ImageMetadata {
            width: 800,
            height: 400,
            aspect_ratio,
            dominant_color: color,
            format: None,
            estimated_bytes: 800 * 400 * 3,
        }
    }

    #[test]
    fn test_missing_metadata_uses_fallback_for_every_kind() {
        for kind in [
            PlaceholderKind::Blur,
            PlaceholderKind::Color,
            PlaceholderKind::Gradient,
        ] {
            assert_eq!(
                generate_placeholder(None, kind),
                Some(fallback_placeholder())
            );
        }
        let svg = decode(&fallback_placeholder());
        assert!(svg.contains(r#"width="10" height="10""#));
        assert!(svg.contains(FALLBACK_COLOR));
    }

    #[test]
    fn test_none_kind_yields_nothing() {
        assert_eq!(generate_placeholder(None, PlaceholderKind::None), None);
    }

    #[test]
    fn test_color_fill() {
        let m = meta(Some(Rgb::new(255, 0, 0)), 2.0);
        let svg = decode(&generate_placeholder(Some(&m), PlaceholderKind::Color).unwrap());

        assert!(svg.contains(r##"fill="#ff0000""##));
        assert!(svg.contains(r#"width="40" height="20""#));
    }

    #[test]
    fn test_gradient_stops() {
        let m = meta(Some(Rgb::new(0, 0, 0)), 1.0);
        let svg = decode(&generate_placeholder(Some(&m), PlaceholderKind::Gradient).unwrap());

        assert!(svg.contains("linearGradient"));
        assert!(svg.contains(r##"stop-color="#000000""##));
        assert!(svg.contains(r##"stop-color="#4d4d4d""##));
    }

    #[test]
    fn test_blur_sized_to_aspect_ratio() {
        let m = meta(Some(Rgb::new(1, 2, 3)), 0.5);
        let svg = decode(&generate_placeholder(Some(&m), PlaceholderKind::Blur).unwrap());

        assert!(svg.contains("feGaussianBlur"));
        assert!(svg.contains(r#"width="40" height="80""#));
    }

    #[test]
    fn test_surrogate_size_guards_bad_ratio() {
        assert_eq!(surrogate_size(0.0), (40, 40));
        assert_eq!(surrogate_size(f64::NAN), (40, 40));
        assert_eq!(surrogate_size(1000.0), (40, 1));
    }
}
