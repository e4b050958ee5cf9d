//! Pixel blending
//!
//! Channel math works on normalized `f32` values; results are rounded back
//! to `u8` once per pixel.

use crate::distortion::DistortionLevel;
use image::{Rgba, RgbaImage};

/// Separable blend modes used by the page passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Darkens: base * top
    Multiply,
    /// Contrast-preserving tint
    Overlay,
    /// Brightens: 1 - (1 - base)(1 - top)
    Screen,
}

impl BlendMode {
    /// Blend one normalized channel
    pub fn channel(self, base: f32, top: f32) -> f32 {
        match self {
            BlendMode::Multiply => base * top,
            BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            BlendMode::Overlay => {
                if base <= 0.5 {
                    2.0 * base * top
                } else {
                    1.0 - 2.0 * (1.0 - base) * (1.0 - top)
                }
            }
        }
    }
}

/// One full-surface translucent pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendPass {
    pub mode: BlendMode,
    pub color: [u8; 3],
    pub alpha: f32,
}

impl BlendPass {
    /// Apply the pass to every pixel of the image, keeping its alpha
    pub fn apply(&self, image: &mut RgbaImage) {
        if self.alpha <= 0.0 {
            return;
        }
        let alpha = self.alpha.min(1.0);
        let top = self.color.map(|c| c as f32 / 255.0);
        for pixel in image.pixels_mut() {
            for (channel, &t) in pixel.0.iter_mut().take(3).zip(top.iter()) {
                let base = *channel as f32 / 255.0;
                let blended = self.mode.channel(base, t);
                let out = base + (blended - base) * alpha;
                *channel = to_u8(out);
            }
        }
    }
}

/// Base alpha of the multiply, overlay and screen passes at level 1
const PASS_ALPHAS: [f32; 3] = [0.10, 0.08, 0.05];

/// The three aging passes for a realism level; weaker as the level rises
pub fn page_passes(level: DistortionLevel) -> [BlendPass; 3] {
    let strength = (4 - level.as_u8()) as f32 / 3.0;
    [
        BlendPass {
            mode: BlendMode::Multiply,
            color: [222, 214, 200],
            alpha: PASS_ALPHAS[0] * strength,
        },
        BlendPass {
            mode: BlendMode::Overlay,
            color: [250, 226, 188],
            alpha: PASS_ALPHAS[1] * strength,
        },
        BlendPass {
            mode: BlendMode::Screen,
            color: [255, 252, 240],
            alpha: PASS_ALPHAS[2] * strength,
        },
    ]
}

/// Composite `color` over `dst` with the given coverage alpha (0.0 to 1.0)
pub fn source_over(dst: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let alpha = alpha.min(1.0);
    let dst_alpha = dst.0[3] as f32 / 255.0;
    let out_alpha = alpha + dst_alpha * (1.0 - alpha);
    if out_alpha <= f32::EPSILON {
        return;
    }
    for i in 0..3 {
        let src = color[i] as f32 / 255.0;
        let base = dst.0[i] as f32 / 255.0;
        let out = (src * alpha + base * dst_alpha * (1.0 - alpha)) / out_alpha;
        dst.0[i] = to_u8(out);
    }
    dst.0[3] = to_u8(out_alpha);
}

/// Composite `src` over `dst` pixel by pixel at the given offset
pub fn draw_image(dst: &mut RgbaImage, src: &RgbaImage, offset_x: i64, offset_y: i64) {
    let (dw, dh) = dst.dimensions();
    for (x, y, pixel) in src.enumerate_pixels() {
        let tx = x as i64 + offset_x;
        let ty = y as i64 + offset_y;
        if tx < 0 || ty < 0 || tx >= dw as i64 || ty >= dh as i64 {
            continue;
        }
        let alpha = pixel.0[3] as f32 / 255.0;
        let target = dst.get_pixel_mut(tx as u32, ty as u32);
        source_over(target, [pixel.0[0], pixel.0[1], pixel.0[2]], alpha);
    }
}

fn to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_math() {
        assert_eq!(BlendMode::Multiply.channel(0.5, 0.5), 0.25);
        assert_eq!(BlendMode::Screen.channel(0.5, 0.5), 0.75);
        assert_eq!(BlendMode::Overlay.channel(0.25, 0.5), 0.25);
        assert_eq!(BlendMode::Overlay.channel(1.0, 0.0), 1.0);
    }

    #[test]
    fn test_multiply_darkens_and_screen_brightens() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([200, 200, 200, 255]));
        BlendPass {
            mode: BlendMode::Multiply,
            color: [128, 128, 128],
            alpha: 1.0,
        }
        .apply(&mut image);
        let darkened = image.get_pixel(0, 0).0[0];
        assert!(darkened < 200);

        BlendPass {
            mode: BlendMode::Screen,
            color: [128, 128, 128],
            alpha: 1.0,
        }
        .apply(&mut image);
        assert!(image.get_pixel(0, 0).0[0] > darkened);
        assert_eq!(image.get_pixel(1, 1).0[3], 255);
    }

    #[test]
    fn test_zero_alpha_pass_is_noop() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let before = image.clone();
        BlendPass {
            mode: BlendMode::Overlay,
            color: [255, 0, 0],
            alpha: 0.0,
        }
        .apply(&mut image);
        assert_eq!(image, before);
    }

    #[test]
    fn test_passes_weaken_with_level() {
        let strong = page_passes(DistortionLevel::High);
        let weak = page_passes(DistortionLevel::Low);
        for (s, w) in strong.iter().zip(weak.iter()) {
            assert_eq!(s.mode, w.mode);
            assert!(s.alpha > w.alpha);
            assert!((s.alpha / w.alpha - 3.0).abs() < 1e-4);
        }
        assert_eq!(strong[0].mode, BlendMode::Multiply);
        assert_eq!(strong[1].mode, BlendMode::Overlay);
        assert_eq!(strong[2].mode, BlendMode::Screen);
    }

    #[test]
    fn test_source_over() {
        let mut dst = Rgba([255, 255, 255, 255]);
        source_over(&mut dst, [0, 0, 0], 1.0);
        assert_eq!(dst, Rgba([0, 0, 0, 255]));

        let mut dst = Rgba([255, 255, 255, 255]);
        source_over(&mut dst, [0, 0, 0], 0.5);
        assert_eq!(dst, Rgba([128, 128, 128, 255]));

        let mut transparent = Rgba([0, 0, 0, 0]);
        source_over(&mut transparent, [10, 20, 30], 1.0);
        assert_eq!(transparent, Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_draw_image_clips_to_bounds() {
        let mut dst = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let src = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        draw_image(&mut dst, &src, 2, -1);
        assert_eq!(dst.get_pixel(3, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(dst.get_pixel(3, 1), &Rgba([0, 0, 0, 255]));
        assert_eq!(dst.get_pixel(1, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(dst.get_pixel(3, 2), &Rgba([255, 255, 255, 255]));
    }
}
