//! Off-screen drawing surfaces

use crate::error::{RenderError, RenderResult};
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest surface the renderer will allocate, in pixels
pub const MAX_SURFACE_PIXELS: u64 = 8192 * 8192;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// An RGBA rasterization target
///
/// Surfaces are owned by the pool and lent out for one render at a time.
/// The `id` lets the pool recognise its own surfaces when they come back.
#[derive(Debug)]
pub struct DrawingSurface {
    id: u64,
    image: RgbaImage,
    busy: bool,
}

impl DrawingSurface {
    /// Allocate a new transparent surface
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::AllocationFailure {
                width,
                height,
                reason: "surface dimensions must be non-zero".into(),
            });
        }
        if width as u64 * height as u64 > MAX_SURFACE_PIXELS {
            return Err(RenderError::AllocationFailure {
                width,
                height,
                reason: format!("exceeds {MAX_SURFACE_PIXELS} pixels"),
            });
        }

        Ok(Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            image: RgbaImage::new(width, height),
            busy: false,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Estimated memory footprint in bytes
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    /// Fill the whole surface with one color
    pub fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    /// Reset to fully transparent
    pub fn clear(&mut self) {
        self.fill(Rgba([0, 0, 0, 0]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_surface() {
        let surface = DrawingSurface::new(64, 32).unwrap();
        assert_eq!(surface.dimensions(), (64, 32));
        assert_eq!(surface.byte_size(), 64 * 32 * 4);
        assert!(!surface.is_busy());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = DrawingSurface::new(8, 8).unwrap();
        let b = DrawingSurface::new(8, 8).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(matches!(
            DrawingSurface::new(0, 10),
            Err(RenderError::AllocationFailure { .. })
        ));
        assert!(DrawingSurface::new(100_000, 100_000).is_err());
    }

    #[test]
    fn test_fill_and_clear() {
        let mut surface = DrawingSurface::new(4, 4).unwrap();
        surface.fill(Rgba([1, 2, 3, 255]));
        assert_eq!(surface.image().get_pixel(3, 3), &Rgba([1, 2, 3, 255]));
        surface.clear();
        assert_eq!(surface.image().get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }
}
