//! Paper backgrounds: decoded textures and flat fallbacks

use crate::blend::source_over;
use crate::layout::LayoutMetrics;
use crate::request::PaperKind;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Flat paper color used when no texture is available
pub const PAPER_COLOR: Rgba<u8> = Rgba([252, 250, 244, 255]);

/// Ruling color for lined flat paper
pub const RULE_COLOR: [u8; 3] = [176, 196, 222];

/// A decoded paper texture
#[derive(Debug, Clone)]
pub struct PaperTexture {
    template_id: String,
    image: RgbaImage,
    lines: Option<RgbaImage>,
    /// Downsampling applied at decode time (1.0 = full resolution)
    scale: f32,
}

impl PaperTexture {
    pub fn new(template_id: impl Into<String>, image: RgbaImage, scale: f32) -> Self {
        Self {
            template_id: template_id.into(),
            image,
            lines: None,
            scale,
        }
    }

    pub fn with_lines(mut self, lines: RgbaImage) -> Self {
        self.lines = Some(lines);
        self
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn lines(&self) -> Option<&RgbaImage> {
        self.lines.as_ref()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Whether the texture holds decoded pixels
    pub fn is_loaded(&self) -> bool {
        self.image.width() > 0 && self.image.height() > 0
    }

    /// Estimated decoded size in bytes (texture plus lines overlay)
    pub fn byte_size(&self) -> usize {
        let estimate = |img: &RgbaImage| img.width() as usize * img.height() as usize * 4;
        estimate(&self.image) + self.lines.as_ref().map(estimate).unwrap_or(0)
    }
}

/// Scale `source` to cover `width` x `height` and crop the center
pub fn aspect_fill(source: &RgbaImage, width: u32, height: u32, smooth: bool) -> RgbaImage {
    let (sw, sh) = source.dimensions();
    if (sw, sh) == (width, height) {
        return source.clone();
    }
    let scale = (width as f32 / sw as f32).max(height as f32 / sh as f32);
    let nw = ((sw as f32 * scale).ceil() as u32).max(width);
    let nh = ((sh as f32 * scale).ceil() as u32).max(height);
    let filter = if smooth {
        FilterType::Triangle
    } else {
        FilterType::Nearest
    };
    let resized = imageops::resize(source, nw, nh, filter);
    let x = (nw - width) / 2;
    let y = (nh - height) / 2;
    imageops::crop_imm(&resized, x, y, width, height).to_image()
}

/// Paint a texture (and its lines overlay) over the whole image
pub fn paint_texture(target: &mut RgbaImage, texture: &PaperTexture, smooth: bool) {
    let (width, height) = target.dimensions();
    fill(target, PAPER_COLOR);
    let background = aspect_fill(texture.image(), width, height, smooth);
    imageops::overlay(target, &background, 0, 0);
    if let Some(lines) = texture.lines() {
        let lines = aspect_fill(lines, width, height, smooth);
        imageops::overlay(target, &lines, 0, 0);
    }
}

/// Paint flat paper, ruled to the text baselines when the paper is lined
pub fn paint_flat(
    target: &mut RgbaImage,
    kind: PaperKind,
    metrics: &LayoutMetrics,
    font_size: f32,
    scale: f32,
) {
    fill(target, PAPER_COLOR);
    if kind != PaperKind::Lined {
        return;
    }

    let (width, height) = target.dimensions();
    let thickness = scale.round().max(1.0) as u32;
    for line in 0..=metrics.lines_per_page as usize {
        let y = ((metrics.baseline(line, font_size) + font_size * 0.15) * scale).round() as u32;
        for dy in 0..thickness {
            let row = y + dy;
            if row >= height {
                break;
            }
            for x in 0..width {
                source_over(target.get_pixel_mut(x, row), RULE_COLOR, 0.9);
            }
        }
    }
}

fn fill(target: &mut RgbaImage, color: Rgba<u8>) {
    for pixel in target.pixels_mut() {
        *pixel = color;
    }
}
