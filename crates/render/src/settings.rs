//! Quality settings consumed by the compositor and the surface pool

use serde::{Deserialize, Serialize};

/// Allowed range of `render_scale`
pub const RENDER_SCALE_RANGE: (f32, f32) = (0.5, 2.0);
/// Allowed range of `texture_scale`
pub const TEXTURE_SCALE_RANGE: (f32, f32) = (0.25, 1.0);
/// Allowed range of `max_texture_size`
pub const MAX_TEXTURE_SIZE_RANGE: (u32, u32) = (512, 8192);
/// Allowed range of `concurrency_limit`
pub const CONCURRENCY_RANGE: (usize, usize) = (1, 16);
/// Highest `compression_level`
pub const MAX_COMPRESSION_LEVEL: u8 = 9;

/// Rendering quality knobs
///
/// Values are always kept inside the preset envelope; use [`clamped`](Self::clamped)
/// after building settings by hand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Device pixels per page pixel
    pub render_scale: f32,
    /// Downsampling applied to decoded paper textures
    pub texture_scale: f32,
    /// Smooth glyph edges and bilinear texture sampling
    pub antialiasing: bool,
    /// Run the multiply/overlay/screen passes
    pub blending: bool,
    /// Longest edge of a decoded texture
    pub max_texture_size: u32,
    /// Renders allowed in flight at once
    pub concurrency_limit: usize,
    /// PNG compression effort, 0 (fastest) to 9 (smallest)
    pub compression_level: u8,
}

impl QualitySettings {
    /// Clamp every field into the allowed envelope
    pub fn clamped(self) -> Self {
        let scale = |value: f32, (min, max): (f32, f32)| {
            if value.is_finite() {
                value.clamp(min, max)
            } else {
                max
            }
        };
        Self {
            render_scale: scale(self.render_scale, RENDER_SCALE_RANGE),
            texture_scale: scale(self.texture_scale, TEXTURE_SCALE_RANGE),
            antialiasing: self.antialiasing,
            blending: self.blending,
            max_texture_size: self
                .max_texture_size
                .clamp(MAX_TEXTURE_SIZE_RANGE.0, MAX_TEXTURE_SIZE_RANGE.1),
            concurrency_limit: self
                .concurrency_limit
                .clamp(CONCURRENCY_RANGE.0, CONCURRENCY_RANGE.1),
            compression_level: self.compression_level.min(MAX_COMPRESSION_LEVEL),
        }
    }

    /// Whether every field lies inside the envelope
    pub fn is_within_envelope(&self) -> bool {
        *self == self.clamped()
    }

    /// Surface size for a page of the given size at this render scale
    pub fn scaled_size(&self, width: u32, height: u32) -> (u32, u32) {
        let w = (width as f32 * self.render_scale).round().max(1.0) as u32;
        let h = (height as f32 * self.render_scale).round().max(1.0) as u32;
        (w, h)
    }
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            render_scale: 1.0,
            texture_scale: 1.0,
            antialiasing: true,
            blending: true,
            max_texture_size: 4096,
            concurrency_limit: 4,
            compression_level: 6,
        }
    }
}
