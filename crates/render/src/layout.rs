//! Page layout metrics
//!
//! Margins and line spacing grow with the font size and with how much the
//! glyphs are allowed to wander, so jittered strokes never run off the page.

use crate::distortion::{DistortionLevel, BASELINE_JITTER_BAND};
use serde::Serialize;

/// Smallest canvas edge the layout will work with, in pixels
pub const MIN_CANVAS_EDGE: u32 = 240;

/// Smallest font size the layout will work with, in pixels
pub const MIN_FONT_SIZE: f32 = 12.0;

/// Bounds of the compensated jitter influence
pub const JITTER_INFLUENCE_BAND: (f32, f32) = (0.08, 0.85);

const MIN_VERTICAL_MARGIN: f32 = 40.0;
const MIN_SIDE_MARGIN: f32 = 36.0;
const MIN_WORDS_PER_PAGE: u32 = 120;
const AVG_CHARS_PER_WORD: f32 = 5.5;

/// Input to the layout calculation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutInput {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub font_size: f32,
    pub baseline_jitter_range: f32,
    pub level: DistortionLevel,
}

/// Computed page layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutMetrics {
    pub top_margin: f32,
    pub bottom_margin: f32,
    pub side_margin: f32,
    pub line_spacing: f32,
    pub lines_per_page: u32,
    pub words_per_page: u32,
    /// Width available to a line of text
    pub available_width: f32,
    /// Jitter range after level compensation, clamped to [0.08, 0.85]
    pub jitter_influence: f32,
}

impl LayoutMetrics {
    /// Compute layout metrics. Never fails: inputs are clamped.
    pub fn compute(input: &LayoutInput) -> Self {
        let width = input.canvas_width.max(MIN_CANVAS_EDGE) as f32;
        let height = input.canvas_height.max(MIN_CANVAS_EDGE) as f32;
        let font_size = if input.font_size.is_finite() {
            input.font_size.max(MIN_FONT_SIZE)
        } else {
            MIN_FONT_SIZE
        };

        let jitter = if input.baseline_jitter_range.is_finite() {
            input
                .baseline_jitter_range
                .clamp(BASELINE_JITTER_BAND.0, BASELINE_JITTER_BAND.1)
        } else {
            BASELINE_JITTER_BAND.0
        };
        let influence = jitter_influence(jitter, input.level);

        let top_margin = (font_size * (1.15 + influence * 0.28)).max(MIN_VERTICAL_MARGIN);
        let bottom_margin = (font_size * (1.30 + influence * 0.32)).max(MIN_VERTICAL_MARGIN);
        let side_margin = (font_size * (1.10 + influence * 0.25)).max(MIN_SIDE_MARGIN);
        let line_spacing = font_size * (1.35 + influence * 0.40);

        let writable_height = (height - top_margin - bottom_margin).max(0.0);
        let lines_per_page = ((writable_height / line_spacing).floor() as u32).max(1);

        let available_width = (width - 2.0 * side_margin).max(font_size);
        let avg_glyph_width = font_size * 0.52 * (1.0 + influence * 0.12);
        let chars_per_line = (available_width / avg_glyph_width).floor();
        let words_per_line = (chars_per_line / AVG_CHARS_PER_WORD).max(1.0);
        let words_per_page = ((words_per_line * lines_per_page as f32 * 0.9).round() as u32)
            .max(MIN_WORDS_PER_PAGE);

        Self {
            top_margin,
            bottom_margin,
            side_margin,
            line_spacing,
            lines_per_page,
            words_per_page,
            available_width,
            jitter_influence: influence,
        }
    }

    /// Baseline y coordinate of a line, in unscaled page pixels
    pub fn baseline(&self, line_index: usize, font_size: f32) -> f32 {
        self.top_margin + font_size + line_index as f32 * self.line_spacing
    }
}

/// Level compensation: level 1 pages get more room, level 3 less
pub fn compensation(level: DistortionLevel) -> f32 {
    match level {
        DistortionLevel::High => 1.12,
        DistortionLevel::Balanced => 1.0,
        DistortionLevel::Low => 0.94,
    }
}

/// Compensated jitter influence, always within [0.08, 0.85]
pub fn jitter_influence(jitter_range: f32, level: DistortionLevel) -> f32 {
    let raw = jitter_range * compensation(level);
    if raw.is_finite() {
        raw.clamp(JITTER_INFLUENCE_BAND.0, JITTER_INFLUENCE_BAND.1)
    } else {
        JITTER_INFLUENCE_BAND.0
    }
}
