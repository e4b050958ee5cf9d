//! Font faces used to draw glyphs
//!
//! A [`FontFace`] only has to answer two questions: how far the pen moves
//! for a character, and what coverage mask the character leaves. Real fonts
//! go through `fontdue`; [`SketchFace`] draws procedural pen loops and is
//! used whenever a family has not been registered.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Anti-aliased coverage mask for one glyph
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    /// Row-major coverage, one byte per pixel
    pub coverage: Vec<u8>,
    /// Offset from the pen position to the left edge of the mask
    pub left: i32,
    /// Offset from the baseline to the top edge of the mask (negative is above)
    pub top: i32,
}

impl GlyphBitmap {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the coverage buffer matches the stated dimensions
    pub fn is_consistent(&self) -> bool {
        self.coverage.len() == self.width * self.height
    }

    /// Coverage at integer coordinates, 0 outside the mask
    pub fn at(&self, x: i64, y: i64) -> u8 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0;
        }
        self.coverage[y as usize * self.width + x as usize]
    }
}

/// A source of glyph metrics and coverage masks
pub trait FontFace: Send + Sync {
    /// Name used in log output
    fn name(&self) -> &str;

    /// Horizontal advance of `ch` at `px` pixels per em
    fn advance(&self, ch: char, px: f32) -> f32;

    /// Coverage mask of `ch` at `px` pixels per em
    fn rasterize(&self, ch: char, px: f32) -> GlyphBitmap;
}

/// Errors loading a font file
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("font parse error: {0}")]
    Parse(String),
}

/// TrueType/OpenType face rasterized by `fontdue`
pub struct FontdueFace {
    name: String,
    font: fontdue::Font,
}

impl FontdueFace {
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, FontError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| FontError::Parse(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            font,
        })
    }

    pub fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, FontError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(name, &bytes)
    }
}

impl fmt::Debug for FontdueFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontdueFace").field("name", &self.name).finish()
    }
}

impl FontFace for FontdueFace {
    fn name(&self) -> &str {
        &self.name
    }

    fn advance(&self, ch: char, px: f32) -> f32 {
        self.font.metrics(ch, px).advance_width
    }

    fn rasterize(&self, ch: char, px: f32) -> GlyphBitmap {
        let (metrics, coverage) = self.font.rasterize(ch, px);
        GlyphBitmap {
            width: metrics.width,
            height: metrics.height,
            coverage,
            left: metrics.xmin,
            top: -(metrics.ymin + metrics.height as i32),
        }
    }
}

/// Procedural pen face
///
/// Every glyph is an inked loop sized by its character class (x-height,
/// ascender, descender, punctuation), with a stem for letters that have one.
/// It keeps rendering usable with no font files at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct SketchFace;

#[derive(Debug, Clone, Copy)]
struct SketchShape {
    width: f32,
    ascent: f32,
    descent: f32,
    stem: Stem,
    loop_: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stem {
    None,
    Up,
    Down,
}

impl SketchFace {
    fn shape(ch: char, px: f32) -> Option<SketchShape> {
        if ch.is_whitespace() || ch.is_control() {
            return None;
        }
        let narrow = matches!(ch, 'i' | 'j' | 'l' | 'I' | '1' | 't' | 'f' | 'r');
        let wide = matches!(ch, 'm' | 'w' | 'M' | 'W');
        let width = if narrow {
            0.28
        } else if wide {
            0.74
        } else {
            0.5
        } * px;

        if ch.is_ascii_punctuation() {
            let tall = matches!(ch, '!' | '?' | '\'' | '"' | '/' | '(' | ')' | '|');
            return Some(SketchShape {
                width: 0.22 * px,
                ascent: if tall { 0.7 * px } else { 0.14 * px },
                descent: if matches!(ch, ',' | ';') { 0.12 * px } else { 0.0 },
                stem: if tall { Stem::Up } else { Stem::None },
                loop_: !tall,
            });
        }

        let descender = matches!(ch, 'g' | 'j' | 'p' | 'q' | 'y');
        let ascender = ch.is_uppercase()
            || ch.is_ascii_digit()
            || matches!(ch, 'b' | 'd' | 'f' | 'h' | 'k' | 'l' | 't');
        Some(SketchShape {
            width,
            ascent: if ascender { 0.72 * px } else { 0.5 * px },
            descent: if descender { 0.24 * px } else { 0.0 },
            stem: if descender {
                Stem::Down
            } else if ascender {
                Stem::Up
            } else {
                Stem::None
            },
            loop_: true,
        })
    }
}

impl FontFace for SketchFace {
    fn name(&self) -> &str {
        "sketch"
    }

    fn advance(&self, ch: char, px: f32) -> f32 {
        match Self::shape(ch, px) {
            Some(shape) => shape.width + 0.1 * px,
            None => 0.32 * px,
        }
    }

    fn rasterize(&self, ch: char, px: f32) -> GlyphBitmap {
        let Some(shape) = Self::shape(ch, px) else {
            return GlyphBitmap::default();
        };

        let stroke = (px / 14.0).max(1.0);
        let pad = stroke.ceil() as i32 + 1;
        let width = shape.width.ceil() as i32 + 2 * pad;
        let height = (shape.ascent + shape.descent).ceil() as i32 + 2 * pad;
        if width <= 0 || height <= 0 {
            return GlyphBitmap::default();
        }

        // Loop occupies the x-height band (or the whole body for short marks)
        let body = shape.ascent.min(0.5 * px).max(stroke * 2.0);
        let cx = pad as f32 + shape.width / 2.0;
        let baseline = pad as f32 + shape.ascent;
        let cy = baseline - body / 2.0;
        let squish = 0.85 + (ch as u32 % 7) as f32 * 0.03;
        let rx = (shape.width / 2.0 * squish).max(stroke);
        let ry = (body / 2.0).max(stroke);
        let stem_x = pad as f32 + shape.width * 0.85;
        let (stem_top, stem_bottom) = match shape.stem {
            Stem::Up => (baseline - shape.ascent, baseline),
            Stem::Down => (baseline - body, baseline + shape.descent),
            Stem::None => (0.0, 0.0),
        };

        let mut coverage = vec![0u8; (width * height) as usize];
        for y in 0..height {
            for x in 0..width {
                let px_x = x as f32 + 0.5;
                let px_y = y as f32 + 0.5;
                let mut distance = f32::MAX;

                if shape.loop_ {
                    let nx = (px_x - cx) / rx;
                    let ny = (px_y - cy) / ry;
                    let r = (nx * nx + ny * ny).sqrt();
                    distance = distance.min((r - 1.0).abs() * rx.min(ry));
                }
                if shape.stem != Stem::None {
                    let dy = if px_y < stem_top {
                        stem_top - px_y
                    } else if px_y > stem_bottom {
                        px_y - stem_bottom
                    } else {
                        0.0
                    };
                    let dx = px_x - stem_x;
                    distance = distance.min((dx * dx + dy * dy).sqrt());
                }

                let c = (stroke / 2.0 + 0.5 - distance).clamp(0.0, 1.0);
                coverage[(y * width + x) as usize] = (c * 255.0).round() as u8;
            }
        }

        GlyphBitmap {
            width: width as usize,
            height: height as usize,
            coverage,
            left: -pad,
            top: -(shape.ascent.ceil() as i32) - pad,
        }
    }
}

/// Font faces by family name
///
/// Lookups are case-insensitive and fall back to [`SketchFace`].
pub struct FontRegistry {
    faces: RwLock<HashMap<String, Arc<dyn FontFace>>>,
    fallback: Arc<dyn FontFace>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            faces: RwLock::new(HashMap::new()),
            fallback: Arc::new(SketchFace),
        }
    }

    /// Register a face under a family name, replacing any previous face
    pub fn register(&self, family: &str, face: Arc<dyn FontFace>) {
        let mut faces = self.faces.write().unwrap_or_else(|e| e.into_inner());
        faces.insert(family.trim().to_lowercase(), face);
    }

    /// Load a font file through fontdue and register it
    pub fn load_file(&self, family: &str, path: impl AsRef<Path>) -> Result<(), FontError> {
        let face = FontdueFace::from_file(family, path)?;
        self.register(family, Arc::new(face));
        Ok(())
    }

    /// Face for a family, or the sketch face if none is registered
    pub fn resolve(&self, family: &str) -> Arc<dyn FontFace> {
        let faces = self.faces.read().unwrap_or_else(|e| e.into_inner());
        faces
            .get(&family.trim().to_lowercase())
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn contains(&self, family: &str) -> bool {
        let faces = self.faces.read().unwrap_or_else(|e| e.into_inner());
        faces.contains_key(&family.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.faces.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}
