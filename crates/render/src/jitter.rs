//! Deterministic per-glyph jitter
//!
//! Offsets come from a stateless sine hash of (line, position, codepoint),
//! so a page renders identically every time it is drawn. There is no RNG
//! state to seed or thread through the renderer.

use crate::distortion::{DistortionProfile, BASELINE_JITTER_BAND};

/// Offsets applied to a single glyph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphOffsets {
    /// Horizontal displacement in pixels
    pub jitter_x: f32,
    /// Vertical displacement in pixels (positive is down)
    pub jitter_y: f32,
    /// Slant rotation in degrees
    pub rotation: f32,
    /// Extra tilt in degrees
    pub micro_tilt: f32,
    /// Ink lightness drift, within +/- color variation intensity
    pub color_drift: f32,
    /// Multiplier on the glyph's advance width
    pub advance_factor: f32,
}

impl GlyphOffsets {
    /// Total rotation (slant plus tilt) in radians
    pub fn total_rotation_radians(&self) -> f32 {
        (self.rotation + self.micro_tilt).to_radians()
    }
}

/// Combine glyph coordinates into a seed
pub fn seed(line_index: usize, char_index: usize, codepoint: u32) -> i64 {
    (line_index as i64 + 1) * 9973 + (char_index as i64 + 1) * 7919 + codepoint as i64 * 131
}

/// Map a seed onto [0, 1): frac(sin(seed) * 10000)
pub fn rand(seed: i64) -> f64 {
    let value = (seed as f64).sin() * 10_000.0;
    let fract = value - value.floor();
    // floor() of a value just below an integer can round fract up to 1.0
    if fract >= 1.0 {
        0.0
    } else {
        fract
    }
}

/// Generates glyph offsets for one profile at one font size
#[derive(Debug, Clone, Copy)]
pub struct GlyphJitterEngine {
    profile: DistortionProfile,
    font_size: f32,
}

impl GlyphJitterEngine {
    pub fn new(profile: DistortionProfile, font_size: f32) -> Self {
        Self { profile, font_size }
    }

    pub fn profile(&self) -> &DistortionProfile {
        &self.profile
    }

    /// Offsets for the glyph at (line, position) with the given character
    pub fn offsets(&self, line_index: usize, char_index: usize, ch: char) -> GlyphOffsets {
        let s = seed(line_index, char_index, ch as u32);
        let channel = |k: i64| rand(s + k) as f32 - 0.5;

        let p = &self.profile;
        let relative_jitter = p.baseline_jitter_range / BASELINE_JITTER_BAND.1;

        GlyphOffsets {
            jitter_x: channel(0) * p.baseline_jitter_range * self.font_size * 0.18,
            jitter_y: channel(1) * p.baseline_jitter_range * self.font_size * 0.35,
            rotation: channel(2) * 2.0 * p.slant_jitter_range,
            micro_tilt: channel(3) * 2.0 * p.micro_tilt_range,
            color_drift: channel(4) * 2.0 * p.color_variation_intensity,
            advance_factor: 1.0 + channel(5) * 0.08 * relative_jitter,
        }
    }

    /// Jittered width of a space at (line, position)
    pub fn space_advance(&self, line_index: usize, char_index: usize) -> f32 {
        let r = rand(seed(line_index, char_index, ' ' as u32)) as f32 - 0.5;
        0.32 * self.font_size * (1.0 + r * 0.3 * self.profile.baseline_jitter_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::DistortionLevel;

    #[test]
    fn test_rand_range() {
        for s in -5000..5000 {
            let r = rand(s);
            assert!((0.0..1.0).contains(&r), "seed {s} gave {r}");
        }
    }

    #[test]
    fn test_rand_matches_sine_formula() {
        let s = seed(0, 0, 'a' as u32);
        let expected = {
            let v = (s as f64).sin() * 10_000.0;
            v - v.floor()
        };
        assert_eq!(rand(s), expected);
        assert_eq!(s, 9973 + 7919 + 97 * 131);
    }

    #[test]
    fn test_offsets_are_deterministic() {
        let profile = DistortionProfile::for_level(DistortionLevel::High);
        let a = GlyphJitterEngine::new(profile, 24.0);
        let b = GlyphJitterEngine::new(profile, 24.0);
        for line in 0..4 {
            for (pos, ch) in "Dear diary, ünïcode ok".chars().enumerate() {
                assert_eq!(a.offsets(line, pos, ch), b.offsets(line, pos, ch));
            }
        }
    }

    #[test]
    fn test_offsets_vary_between_positions() {
        let engine = GlyphJitterEngine::new(DistortionProfile::from_level(1), 24.0);
        let first = engine.offsets(0, 0, 'e');
        let second = engine.offsets(0, 1, 'e');
        let next_line = engine.offsets(1, 0, 'e');
        assert_ne!(first, second);
        assert_ne!(first, next_line);
    }

    #[test]
    fn test_offsets_respect_profile_ranges() {
        let profile = DistortionProfile::from_level(1);
        let engine = GlyphJitterEngine::new(profile, 30.0);
        for pos in 0..500 {
            let o = engine.offsets(pos / 40, pos % 40, char::from(b'a' + (pos % 26) as u8));
            assert!(o.rotation.abs() <= profile.slant_jitter_range);
            assert!(o.micro_tilt.abs() <= profile.micro_tilt_range);
            assert!(o.color_drift.abs() <= profile.color_variation_intensity);
            assert!(o.jitter_x.abs() <= profile.baseline_jitter_range * 30.0 * 0.09 + 1e-4);
            assert!(o.jitter_y.abs() <= profile.baseline_jitter_range * 30.0 * 0.175 + 1e-4);
            assert!((0.95..=1.05).contains(&o.advance_factor));
        }
    }

    #[test]
    fn test_low_realism_is_calmer() {
        let high = GlyphJitterEngine::new(DistortionProfile::from_level(1), 24.0);
        let low = GlyphJitterEngine::new(DistortionProfile::from_level(3), 24.0);
        let spread = |engine: &GlyphJitterEngine| -> f32 {
            (0..200)
                .map(|i| engine.offsets(0, i, 'x').rotation.abs())
                .sum::<f32>()
        };
        assert!(spread(&high) > spread(&low));
    }

    #[test]
    fn test_space_advance_is_near_a_third_of_font_size() {
        let engine = GlyphJitterEngine::new(DistortionProfile::from_level(1), 20.0);
        for pos in 0..50 {
            let advance = engine.space_advance(2, pos);
            assert!(advance > 20.0 * 0.32 * 0.9 && advance < 20.0 * 0.32 * 1.1);
        }
    }
}
