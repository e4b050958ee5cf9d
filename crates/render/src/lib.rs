//! Scrawl Render Library
//!
//! Handwriting page renderer: realism profiles, page layout, per-glyph
//! jitter, font faces, paper backgrounds and the compositor that draws them
//! onto pooled surfaces.

pub mod blend;
pub mod compositor;
pub mod distortion;
pub mod error;
pub mod font;
pub mod jitter;
pub mod layout;
pub mod paper;
pub mod request;
pub mod settings;
pub mod surface;
pub mod text;

pub use blend::{page_passes, BlendMode, BlendPass};
pub use compositor::{CompositeMode, CompositeOutcome, PaperCompositor, PLACEHOLDER_MESSAGE};
pub use distortion::{DistortionLevel, DistortionProfile};
pub use error::{RenderError, RenderResult};
pub use font::{FontError, FontFace, FontRegistry, FontdueFace, GlyphBitmap, SketchFace};
pub use jitter::{GlyphJitterEngine, GlyphOffsets};
pub use layout::{LayoutInput, LayoutMetrics};
pub use paper::PaperTexture;
pub use request::{InkColor, PaperKind, PaperTemplate, ParseInkColorError, RenderRequest};
pub use settings::QualitySettings;
pub use surface::DrawingSurface;
