//! Paper compositor
//!
//! Draws one page onto a borrowed surface: paper background, jittered ink,
//! then the aging blend passes. Lines are always drawn top to bottom.

use crate::blend::{page_passes, source_over};
use crate::error::{RenderError, RenderResult};
use crate::font::{FontFace, FontRegistry, GlyphBitmap};
use crate::jitter::GlyphJitterEngine;
use crate::layout::{LayoutInput, LayoutMetrics};
use crate::paper::{paint_flat, paint_texture, PaperTexture};
use crate::request::{InkColor, PaperKind, RenderRequest};
use crate::settings::QualitySettings;
use crate::surface::DrawingSurface;
use crate::text::{measure, wrap_text};
use image::RgbaImage;
use std::sync::Arc;

/// Message drawn when no paper template is selected
pub const PLACEHOLDER_MESSAGE: &str = "Choose a paper to start writing";

const PLACEHOLDER_INK: InkColor = InkColor::rgb(150, 150, 150);

/// Which path produced a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    /// Texture, ink and blend passes
    Full,
    /// Flat paper and ink only
    Simplified,
    /// No paper selected; placeholder message only
    Placeholder,
    /// Flat paper without ink, used when every ink path failed
    PaperOnly,
}

/// Summary of a composited page
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeOutcome {
    pub mode: CompositeMode,
    pub layout: LayoutMetrics,
    pub lines_drawn: usize,
    /// Wrapped lines that did not fit above the bottom margin
    pub overflow_lines: usize,
    pub glyphs_drawn: usize,
    pub used_texture: bool,
    pub blended: bool,
}

/// Composites handwritten pages
pub struct PaperCompositor {
    fonts: Arc<FontRegistry>,
}

impl PaperCompositor {
    pub fn new(fonts: Arc<FontRegistry>) -> Self {
        Self { fonts }
    }

    pub fn fonts(&self) -> &Arc<FontRegistry> {
        &self.fonts
    }

    /// Render the full page: texture (if any), ink and blend passes
    pub fn compose(
        &self,
        request: &RenderRequest,
        surface: &mut DrawingSurface,
        texture: Option<&PaperTexture>,
        settings: &QualitySettings,
    ) -> RenderResult<CompositeOutcome> {
        self.run(request, surface, texture, settings, false)
    }

    /// Render flat paper and ink only, skipping textures and blend passes
    pub fn compose_simplified(
        &self,
        request: &RenderRequest,
        surface: &mut DrawingSurface,
        settings: &QualitySettings,
    ) -> RenderResult<CompositeOutcome> {
        self.run(request, surface, None, settings, true)
    }

    /// Paint flat paper with no ink; cannot fail
    pub fn compose_paper_only(
        &self,
        request: &RenderRequest,
        surface: &mut DrawingSurface,
    ) -> CompositeOutcome {
        let request = request.sanitized();
        let scale = surface.width() as f32 / request.width as f32;
        let layout = page_layout(&request);
        paint_flat(
            surface.image_mut(),
            paper_kind(&request),
            &layout,
            request.font_size,
            scale,
        );
        CompositeOutcome {
            mode: CompositeMode::PaperOnly,
            layout,
            lines_drawn: 0,
            overflow_lines: 0,
            glyphs_drawn: 0,
            used_texture: false,
            blended: false,
        }
    }

    fn run(
        &self,
        request: &RenderRequest,
        surface: &mut DrawingSurface,
        texture: Option<&PaperTexture>,
        settings: &QualitySettings,
        simplified: bool,
    ) -> RenderResult<CompositeOutcome> {
        let request = request.sanitized();
        let scale = surface.width() as f32 / request.width as f32;
        let font_size = request.font_size;
        let profile = request.distortion;

        let layout = page_layout(&request);
        let face = self.fonts.resolve(&request.font_family);

        let texture = if simplified { None } else { texture };
        if let Some(texture) = texture.filter(|t| !t.is_loaded()) {
            return Err(RenderError::Composite(format!(
                "texture '{}' has no pixels",
                texture.template_id()
            )));
        }
        match texture {
            Some(texture) => paint_texture(surface.image_mut(), texture, settings.antialiasing),
            None => paint_flat(
                surface.image_mut(),
                paper_kind(&request),
                &layout,
                font_size,
                scale,
            ),
        }

        if request.paper.is_none() {
            draw_placeholder(surface.image_mut(), face.as_ref(), &request, scale, settings)?;
            return Ok(CompositeOutcome {
                mode: CompositeMode::Placeholder,
                layout,
                lines_drawn: 0,
                overflow_lines: 0,
                glyphs_drawn: 0,
                used_texture: false,
                blended: false,
            });
        }

        let jitter = GlyphJitterEngine::new(profile, font_size);
        let lines = wrap_text(&request.text, face.as_ref(), font_size, layout.available_width);
        let floor = request.height as f32 - layout.bottom_margin;

        let mut lines_drawn = 0;
        let mut glyphs_drawn = 0;
        for (line_index, line) in lines.iter().enumerate() {
            let baseline = layout.baseline(line_index, font_size);
            if baseline > floor {
                break;
            }

            let mut pen_x = layout.side_margin;
            for (char_index, ch) in line.chars().enumerate() {
                if ch == ' ' {
                    pen_x += jitter.space_advance(line_index, char_index);
                    continue;
                }
                let offsets = jitter.offsets(line_index, char_index, ch);
                let glyph = face.rasterize(ch, font_size * scale);
                if !glyph.is_consistent() {
                    return Err(RenderError::Composite(format!(
                        "glyph {ch:?} from face '{}' has {} coverage bytes for {}x{}",
                        face.name(),
                        glyph.coverage.len(),
                        glyph.width,
                        glyph.height
                    )));
                }

                let ink = request.ink_color.drifted(offsets.color_drift);
                draw_glyph(
                    surface.image_mut(),
                    &glyph,
                    (pen_x + offsets.jitter_x) * scale,
                    (baseline + offsets.jitter_y) * scale,
                    offsets.total_rotation_radians(),
                    ink,
                    settings.antialiasing,
                );
                if !glyph.is_empty() {
                    glyphs_drawn += 1;
                }
                pen_x += face.advance(ch, font_size) * offsets.advance_factor;
            }
            lines_drawn += 1;
        }

        let blended = settings.blending && !simplified;
        if blended {
            for pass in page_passes(profile.level) {
                pass.apply(surface.image_mut());
            }
        }

        let mode = if simplified {
            CompositeMode::Simplified
        } else {
            CompositeMode::Full
        };
        tracing::debug!(
            ?mode,
            lines = lines_drawn,
            overflow = lines.len() - lines_drawn,
            glyphs = glyphs_drawn,
            "page composited"
        );

        Ok(CompositeOutcome {
            mode,
            layout,
            lines_drawn,
            overflow_lines: lines.len() - lines_drawn,
            glyphs_drawn,
            used_texture: texture.is_some(),
            blended,
        })
    }
}

fn page_layout(request: &RenderRequest) -> LayoutMetrics {
    LayoutMetrics::compute(&LayoutInput {
        canvas_width: request.width,
        canvas_height: request.height,
        font_size: request.font_size,
        baseline_jitter_range: request.distortion.baseline_jitter_range,
        level: request.distortion.level,
    })
}

fn paper_kind(request: &RenderRequest) -> PaperKind {
    request
        .paper
        .as_ref()
        .map(|p| p.kind)
        .unwrap_or(PaperKind::Blank)
}

fn draw_placeholder(
    target: &mut RgbaImage,
    face: &dyn FontFace,
    request: &RenderRequest,
    scale: f32,
    settings: &QualitySettings,
) -> RenderResult<()> {
    let font_size = request.font_size.min(28.0);
    let width = measure(face, PLACEHOLDER_MESSAGE, font_size);
    let mut pen_x = ((request.width as f32 - width) / 2.0).max(0.0);
    let baseline = request.height as f32 / 2.0;

    for ch in PLACEHOLDER_MESSAGE.chars() {
        let glyph = face.rasterize(ch, font_size * scale);
        if !glyph.is_consistent() {
            return Err(RenderError::Composite(format!(
                "placeholder glyph {ch:?} is malformed"
            )));
        }
        draw_glyph(
            target,
            &glyph,
            pen_x * scale,
            baseline * scale,
            0.0,
            PLACEHOLDER_INK,
            settings.antialiasing,
        );
        pen_x += face.advance(ch, font_size);
    }
    Ok(())
}

/// Draw a coverage mask rotated by `angle` radians around the pen origin
pub fn draw_glyph(
    target: &mut RgbaImage,
    glyph: &GlyphBitmap,
    origin_x: f32,
    origin_y: f32,
    angle: f32,
    ink: InkColor,
    antialiasing: bool,
) {
    if glyph.is_empty() || !glyph.is_consistent() {
        return;
    }
    let (sin, cos) = angle.sin_cos();
    let (tw, th) = target.dimensions();

    // Bounding box of the rotated mask in target space
    let left = glyph.left as f32;
    let top = glyph.top as f32;
    let right = left + glyph.width as f32;
    let bottom = top + glyph.height as f32;
    let corners = [(left, top), (right, top), (left, bottom), (right, bottom)];
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for (x, y) in corners {
        let rx = x * cos - y * sin + origin_x;
        let ry = x * sin + y * cos + origin_y;
        min_x = min_x.min(rx);
        min_y = min_y.min(ry);
        max_x = max_x.max(rx);
        max_y = max_y.max(ry);
    }

    let x0 = min_x.floor().max(0.0) as u32;
    let y0 = min_y.floor().max(0.0) as u32;
    let x1 = (max_x.ceil().max(0.0) as u32).min(tw);
    let y1 = (max_y.ceil().max(0.0) as u32).min(th);
    let ink_alpha = ink.a as f32 / 255.0;
    let color = [ink.r, ink.g, ink.b];

    for ty in y0..y1 {
        for tx in x0..x1 {
            let u = tx as f32 + 0.5 - origin_x;
            let v = ty as f32 + 0.5 - origin_y;
            // Inverse rotation back into mask space
            let gx = u * cos + v * sin - left;
            let gy = -u * sin + v * cos - top;

            let coverage = if antialiasing {
                sample_bilinear(glyph, gx - 0.5, gy - 0.5)
            } else {
                let c = glyph.at(gx.floor() as i64, gy.floor() as i64);
                if c >= 128 {
                    1.0
                } else {
                    0.0
                }
            };
            if coverage > 0.0 {
                source_over(target.get_pixel_mut(tx, ty), color, coverage * ink_alpha);
            }
        }
    }
}

fn sample_bilinear(glyph: &GlyphBitmap, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let c = |dx: i64, dy: i64| glyph.at(x0 + dx, y0 + dy) as f32 / 255.0;
    let top = c(0, 0) * (1.0 - fx) + c(1, 0) * fx;
    let bottom = c(0, 1) * (1.0 - fx) + c(1, 1) * fx;
    top * (1.0 - fy) + bottom * fy
}
