//! Runtime capability profile: decodable encodings and network class.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::image::ImageFormat;

/// Lowest quality any request may resolve to.
pub const MIN_QUALITY: u8 = 20;

/// Highest quality any request may resolve to.
pub const MAX_QUALITY: u8 = 95;

/// Candidate encodings, in probe and negotiation priority order.
pub const PROBE_CANDIDATES: [ImageFormat; 4] = [
    ImageFormat::Avif,
    ImageFormat::Webp,
    ImageFormat::Jpeg,
    ImageFormat::Png,
];

/// Encodings that are preferred over the original one when supported.
pub const NEXT_GEN_FORMATS: [ImageFormat; 2] = [ImageFormat::Avif, ImageFormat::Webp];

/// Encoding every client decodes.
pub const UNIVERSAL_FALLBACK: ImageFormat = ImageFormat::Jpeg;

/// Observed effective connection type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkClass {
    /// Very slow cellular.
    #[serde(rename = "slow-2g")]
    SlowTwoG,
    /// 2G.
    #[serde(rename = "2g")]
    TwoG,
    /// 3G.
    #[serde(rename = "3g")]
    ThreeG,
    /// 4G or better.
    #[serde(rename = "4g")]
    FourG,
    /// Connection type not reported.
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl NetworkClass {
    /// Default quality for requests without an explicit one.
    #[must_use]
    pub const fn default_quality(self) -> u8 {
        match self {
            Self::SlowTwoG => 30,
            Self::TwoG => 50,
            Self::ThreeG => 70,
            Self::FourG => 85,
            Self::Unknown => 80,
        }
    }
}

impl FromStr for NetworkClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow-2g" => Ok(Self::SlowTwoG),
            "2g" => Ok(Self::TwoG),
            "3g" => Ok(Self::ThreeG),
            "4g" => Ok(Self::FourG),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown network class: {other}")),
        }
    }
}

impl std::fmt::Display for NetworkClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SlowTwoG => "slow-2g",
            Self::TwoG => "2g",
            Self::ThreeG => "3g",
            Self::FourG => "4g",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Clamps a quality value into `[MIN_QUALITY, MAX_QUALITY]`.
#[must_use]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// Result of probing each candidate encoding once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatSupport {
    probes: Vec<(ImageFormat, bool)>,
}

impl FormatSupport {
    /// Builds support from probe results, kept in probe order.
    #[must_use]
    pub fn from_probes(probes: Vec<(ImageFormat, bool)>) -> Self {
        Self { probes }
    }

    /// Builds support where exactly the listed encodings are decodable.
    #[must_use]
    pub fn only(supported: &[ImageFormat]) -> Self {
        Self::from_probes(
            PROBE_CANDIDATES
                .iter()
                .map(|f| (*f, supported.contains(f)))
                .collect(),
        )
    }

    /// Returns true if the encoding probed as supported.
    #[must_use]
    pub fn supports(&self, format: ImageFormat) -> bool {
        self.probes.iter().any(|(f, ok)| *f == format && *ok)
    }

    /// Probe results in priority order.
    #[must_use]
    pub fn probes(&self) -> &[(ImageFormat, bool)] {
        &self.probes
    }

    /// Highest-priority supported encoding for an image originally in `original`.
    ///
    /// Next-generation encodings win when supported; otherwise the original
    /// encoding is kept if supported, else the universal fallback.
    #[must_use]
    pub fn best_format(&self, original: Option<ImageFormat>) -> ImageFormat {
        NEXT_GEN_FORMATS
            .iter()
            .copied()
            .find(|f| self.supports(*f))
            .or_else(|| original.filter(|f| self.supports(*f)))
            .unwrap_or(UNIVERSAL_FALLBACK)
    }
}

/// Snapshot of the process-wide capability profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityProfile {
    /// Probe results, `None` until detection completed.
    pub formats: Option<FormatSupport>,
    /// Current network class.
    pub network: NetworkClass,
}

impl CapabilityProfile {
    /// Returns true once format detection has completed.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.formats.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(NetworkClass::SlowTwoG => 30 ; "slow 2g")]
    #[test_case(NetworkClass::TwoG => 50 ; "2g")]
    #[test_case(NetworkClass::ThreeG => 70 ; "3g")]
    #[test_case(NetworkClass::FourG => 85 ; "4g")]
    #[test_case(NetworkClass::Unknown => 80 ; "unknown")]
    fn test_quality_table(class: NetworkClass) -> u8 {
        class.default_quality()
    }

    #[test]
    fn test_quality_tiers_are_ordered() {
        let tiers = [
            NetworkClass::SlowTwoG,
            NetworkClass::TwoG,
            NetworkClass::ThreeG,
            NetworkClass::FourG,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0].default_quality() < pair[1].default_quality());
        }
    }

    #[test]
    fn test_clamp_quality() {
        assert_eq!(clamp_quality(0), MIN_QUALITY);
        assert_eq!(clamp_quality(100), MAX_QUALITY);
        assert_eq!(clamp_quality(60), 60);
    }

    #[test]
    fn test_best_format_prefers_next_gen() {
        let support = FormatSupport::only(&[ImageFormat::Webp, ImageFormat::Jpeg]);
        for _ in 0..5 {
            assert_eq!(support.best_format(Some(ImageFormat::Png)), ImageFormat::Webp);
        }
    }

    #[test]
    fn test_best_format_keeps_supported_original() {
        let support = FormatSupport::only(&[ImageFormat::Jpeg, ImageFormat::Png]);
        assert_eq!(support.best_format(Some(ImageFormat::Png)), ImageFormat::Png);
    }

    #[test]
    fn test_best_format_universal_fallback() {
        let support = FormatSupport::only(&[]);
        assert_eq!(support.best_format(Some(ImageFormat::Gif)), ImageFormat::Jpeg);
        assert_eq!(support.best_format(None), ImageFormat::Jpeg);
    }

    #[test]
    fn test_network_class_parse() {
        assert_eq!("slow-2g".parse(), Ok(NetworkClass::SlowTwoG));
        assert_eq!("4G".parse(), Ok(NetworkClass::FourG));
        assert!("5g".parse::<NetworkClass>().is_err());
    }
}
