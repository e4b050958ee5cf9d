//! Distortion profiles
//!
//! A distortion profile bundles the jitter ranges for one realism level.
//! Level 1 is the most "handwritten" looking, level 3 the tidiest.

use serde::Serialize;

/// Safe band for the baseline jitter range
pub const BASELINE_JITTER_BAND: (f32, f32) = (0.08, 0.65);

/// Safe band for the slant jitter range (degrees)
pub const SLANT_JITTER_BAND: (f32, f32) = (0.0, 3.0);

/// Safe band for the color variation intensity
pub const COLOR_VARIATION_BAND: (f32, f32) = (0.0, 0.35);

/// Safe band for the micro tilt range (degrees)
pub const MICRO_TILT_BAND: (f32, f32) = (0.0, 1.5);

/// Realism level of a rendered page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DistortionLevel {
    /// Strong jitter, strongest blend passes
    High = 1,
    /// Moderate jitter
    Balanced = 2,
    /// Light jitter, weakest blend passes
    Low = 3,
}

impl DistortionLevel {
    /// Convert a numeric level, clamping to 1..=3
    pub fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => DistortionLevel::High,
            2 => DistortionLevel::Balanced,
            _ => DistortionLevel::Low,
        }
    }

    /// Numeric level (1, 2 or 3)
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Immutable bundle of jitter ranges
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistortionProfile {
    /// Human readable name of the profile
    pub name: &'static str,
    /// Realism level the profile belongs to
    pub level: DistortionLevel,
    /// Vertical/horizontal wobble, relative to font size
    pub baseline_jitter_range: f32,
    /// Maximum glyph rotation in degrees
    pub slant_jitter_range: f32,
    /// Maximum ink lightness drift (0.0 to 0.35)
    pub color_variation_intensity: f32,
    /// Extra per-glyph tilt in degrees, layered on top of slant
    pub micro_tilt_range: f32,
}

impl DistortionProfile {
    /// Build a profile, clamping every range into its safe band
    pub fn new(
        name: &'static str,
        level: DistortionLevel,
        baseline_jitter_range: f32,
        slant_jitter_range: f32,
        color_variation_intensity: f32,
        micro_tilt_range: f32,
    ) -> Self {
        Self {
            name,
            level,
            baseline_jitter_range: clamp_band(baseline_jitter_range, BASELINE_JITTER_BAND),
            slant_jitter_range: clamp_band(slant_jitter_range, SLANT_JITTER_BAND),
            color_variation_intensity: clamp_band(
                color_variation_intensity,
                COLOR_VARIATION_BAND,
            ),
            micro_tilt_range: clamp_band(micro_tilt_range, MICRO_TILT_BAND),
        }
    }

    /// The preset profile for a realism level
    pub fn for_level(level: DistortionLevel) -> Self {
        match level {
            DistortionLevel::High => Self::new("high-realism", level, 0.46, 0.9, 0.18, 0.6),
            DistortionLevel::Balanced => Self::new("balanced", level, 0.30, 0.6, 0.12, 0.4),
            DistortionLevel::Low => Self::new("low-realism", level, 0.16, 0.3, 0.06, 0.2),
        }
    }

    /// The preset profile for a numeric level (clamped to 1..=3)
    pub fn from_level(level: u8) -> Self {
        Self::for_level(DistortionLevel::from_level(level))
    }
}

impl Default for DistortionProfile {
    fn default() -> Self {
        Self::for_level(DistortionLevel::Balanced)
    }
}

fn clamp_band(value: f32, (min, max): (f32, f32)) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
