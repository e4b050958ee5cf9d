//! Render request value types

use crate::distortion::DistortionProfile;
use crate::layout::{MIN_CANVAS_EDGE, MIN_FONT_SIZE};
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest canvas edge accepted before clamping, in pixels
pub const MAX_CANVAS_EDGE: u32 = 8192;

/// Paper ruling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperKind {
    #[default]
    Blank,
    Lined,
}

/// Paper template descriptor from the caller's catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaperTemplate {
    /// Stable identifier, used as the texture cache key
    pub id: String,
    /// Texture image, relative to the assets directory
    pub filename: Option<String>,
    /// Optional ruling overlay drawn over the texture
    pub lines_filename: Option<String>,
    pub kind: PaperKind,
}

impl PaperTemplate {
    /// A template without a texture image
    pub fn flat(id: impl Into<String>, kind: PaperKind) -> Self {
        Self {
            id: id.into(),
            filename: None,
            lines_filename: None,
            kind,
        }
    }

    /// A template backed by a texture image
    pub fn textured(id: impl Into<String>, filename: impl Into<String>, kind: PaperKind) -> Self {
        Self {
            id: id.into(),
            filename: Some(filename.into()),
            lines_filename: None,
            kind,
        }
    }

    pub fn with_lines(mut self, lines_filename: impl Into<String>) -> Self {
        self.lines_filename = Some(lines_filename.into());
        self
    }

    /// Whether the template needs a texture from the cache
    pub fn has_texture(&self) -> bool {
        self.filename.is_some()
    }
}

/// Ink color (sRGB with alpha)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InkColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl InkColor {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Default blue-black ballpoint ink
    pub const BALLPOINT: InkColor = InkColor::rgb(0x1b, 0x2a, 0x4a);

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }

    /// Lighten (positive drift) or darken (negative drift) the ink
    pub fn drifted(self, drift: f32) -> Self {
        let shift = |c: u8| -> u8 {
            let c = c as f32;
            let out = if drift >= 0.0 {
                c + (255.0 - c) * drift
            } else {
                c * (1.0 + drift)
            };
            out.round().clamp(0.0, 255.0) as u8
        };
        Self {
            r: shift(self.r),
            g: shift(self.g),
            b: shift(self.b),
            a: self.a,
        }
    }
}

impl Default for InkColor {
    fn default() -> Self {
        Self::BALLPOINT
    }
}

/// Error parsing an ink color
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ink color '{0}', expected #rrggbb or #rrggbbaa")]
pub struct ParseInkColorError(String);

impl FromStr for InkColor {
    type Err = ParseInkColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let err = || ParseInkColorError(s.to_string());
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(err());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        Ok(Self {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 8 { byte(6)? } else { 255 },
        })
    }
}

impl fmt::Display for InkColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

/// A single page to render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub text: String,
    pub font_family: String,
    pub font_size: f32,
    pub ink_color: InkColor,
    pub distortion: DistortionProfile,
    /// `None` renders the "choose a paper" placeholder
    pub paper: Option<PaperTemplate>,
    pub width: u32,
    pub height: u32,
}

impl RenderRequest {
    pub fn new(text: impl Into<String>, paper: Option<PaperTemplate>) -> Self {
        Self {
            text: text.into(),
            font_family: String::new(),
            font_size: 24.0,
            ink_color: InkColor::default(),
            distortion: DistortionProfile::default(),
            paper,
            width: 800,
            height: 1000,
        }
    }

    pub fn with_font(mut self, family: impl Into<String>, size: f32) -> Self {
        self.font_family = family.into();
        self.font_size = size;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_ink(mut self, ink_color: InkColor) -> Self {
        self.ink_color = ink_color;
        self
    }

    pub fn with_distortion(mut self, distortion: DistortionProfile) -> Self {
        self.distortion = distortion;
        self
    }

    /// Copy of the request with dimensions and font size clamped to safe values
    pub fn sanitized(&self) -> Self {
        let font_size = if self.font_size.is_finite() {
            self.font_size.max(MIN_FONT_SIZE)
        } else {
            MIN_FONT_SIZE
        };
        Self {
            width: self.width.clamp(MIN_CANVAS_EDGE, MAX_CANVAS_EDGE),
            height: self.height.clamp(MIN_CANVAS_EDGE, MAX_CANVAS_EDGE),
            font_size,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ink_color() {
        let ink: InkColor = "#1b2a4a".parse().unwrap();
        assert_eq!(ink, InkColor::BALLPOINT);
        let translucent: InkColor = "102030c0".parse().unwrap();
        assert_eq!(translucent.a, 0xc0);
        assert_eq!(translucent.to_string(), "#102030c0");
        assert!("#12345".parse::<InkColor>().is_err());
        assert!("#gg0000".parse::<InkColor>().is_err());
    }

    #[test]
    fn test_drift_direction() {
        let ink = InkColor::rgb(100, 100, 100);
        let lighter = ink.drifted(0.2);
        let darker = ink.drifted(-0.2);
        assert!(lighter.r > ink.r);
        assert!(darker.r < ink.r);
        assert_eq!(ink.drifted(0.0), ink);
    }

    #[test]
    fn test_sanitized_clamps_dimensions() {
        let request = RenderRequest::new("hi", None)
            .with_size(0, 100_000)
            .with_font("", -3.0);
        let clean = request.sanitized();
        assert_eq!(clean.width, MIN_CANVAS_EDGE);
        assert_eq!(clean.height, MAX_CANVAS_EDGE);
        assert_eq!(clean.font_size, MIN_FONT_SIZE);
        assert_eq!(clean.text, "hi");
    }
}
