//! Engine context
//!
//! [`Scrawl`] owns the shared services (surface pool, texture cache, quality
//! manager, performance monitor, memory manager) and runs the render
//! pipeline: settings snapshot, texture, surface, composite, timing.

use crate::config::EngineConfig;
use crate::host::{HostProbe, SystemProbe};
use crate::memory::{MemoryLevel, MemoryManager, MemoryManagerConfig, MemoryStatus, MonitorHandle};
use crate::perf::{HistoryLimits, PerformanceMonitor, PerformanceReport};
use crate::quality::{DeviceSignals, QualityManager, QualityOverride, QualityProfile};
use scrawl_cache::{
    DrawingSurfacePool, FsTextureSource, PoolError, SurfaceLease, TextureCache,
    TextureLoadOptions, TextureSource,
};
use scrawl_render::{
    CompositeOutcome, DrawingSurface, FontRegistry, PaperCompositor, PaperTexture,
    QualitySettings, RenderError, RenderRequest,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Operation names recorded with the performance monitor
pub const OP_RENDER: &str = "render";
pub const OP_FALLBACK: &str = "fallback";

/// A rendered page and how it was produced
pub struct RenderedPage {
    pub surface: SurfaceLease,
    pub outcome: CompositeOutcome,
    /// Settings snapshot the page was rendered with
    pub settings: QualitySettings,
    /// The full path failed and the simplified path drew the page
    pub fallback: bool,
    pub elapsed: Duration,
}

/// Builder for [`Scrawl`]
pub struct ScrawlBuilder {
    config: EngineConfig,
    probe: Option<Arc<dyn HostProbe>>,
    source: Option<Arc<dyn TextureSource>>,
    fonts: Option<Arc<FontRegistry>>,
    signals: Option<DeviceSignals>,
    profile: Option<QualityProfile>,
}

impl ScrawlBuilder {
    pub fn with_probe(mut self, probe: Arc<dyn HostProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_texture_source(mut self, source: Arc<dyn TextureSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_fonts(mut self, fonts: Arc<FontRegistry>) -> Self {
        self.fonts = Some(fonts);
        self
    }

    /// Detect the quality profile from these signals instead of the probe
    pub fn with_signals(mut self, signals: DeviceSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Skip detection and start from a fixed profile
    pub fn with_profile(mut self, profile: QualityProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn build(self) -> Scrawl {
        let config = self.config;
        let probe = self.probe.unwrap_or_else(|| Arc::new(SystemProbe));
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(FsTextureSource::new(&config.textures.assets_dir)));
        let fonts = self.fonts.unwrap_or_default();

        let quality = Arc::new(match self.profile {
            Some(profile) => QualityManager::with_profile(profile),
            None => QualityManager::new(
                self.signals
                    .unwrap_or_else(|| DeviceSignals::from_probe(probe.as_ref())),
            ),
        });
        let pool = Arc::new(DrawingSurfacePool::new(config.pool_config()));
        let textures = Arc::new(TextureCache::new(source, config.texture_cache_config()));
        let perf = Arc::new(PerformanceMonitor::new(HistoryLimits {
            render: config.performance.render_history,
            memory: config.performance.memory_history,
            frame: config.performance.frame_history,
        }));
        let memory = Arc::new(MemoryManager::new(
            Arc::clone(&pool),
            Arc::clone(&textures),
            Arc::clone(&quality),
            Arc::clone(&perf),
            probe,
            MemoryManagerConfig {
                thresholds: config.memory_thresholds(),
                heap_limit_bytes: config.heap_limit_bytes(),
                trim_target_mb: config.textures.trim_target_mb,
                texture_max_age: config.texture_max_age(),
                surface_idle_ttl: config.pool_config().idle_ttl,
                cleanup_interval: config.cleanup_interval(),
                pressure_interval: config.pressure_interval(),
            },
        ));

        tracing::debug!(
            profile = %quality.profile(),
            max_surfaces = config.pool.max_surfaces,
            texture_budget_mb = config.textures.budget_mb,
            "engine ready"
        );

        Scrawl {
            compositor: PaperCompositor::new(fonts),
            config,
            pool,
            textures,
            quality,
            perf,
            memory,
        }
    }
}

/// Handwriting engine context
pub struct Scrawl {
    config: EngineConfig,
    compositor: PaperCompositor,
    pool: Arc<DrawingSurfacePool>,
    textures: Arc<TextureCache>,
    quality: Arc<QualityManager>,
    perf: Arc<PerformanceMonitor>,
    memory: Arc<MemoryManager>,
}

impl Scrawl {
    /// Engine reading the running host and the configured assets directory
    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> ScrawlBuilder {
        ScrawlBuilder {
            config,
            probe: None,
            source: None,
            fonts: None,
            signals: None,
            profile: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fonts(&self) -> &Arc<FontRegistry> {
        self.compositor.fonts()
    }

    pub fn pool(&self) -> &Arc<DrawingSurfacePool> {
        &self.pool
    }

    pub fn textures(&self) -> &Arc<TextureCache> {
        &self.textures
    }

    pub fn quality(&self) -> &Arc<QualityManager> {
        &self.quality
    }

    pub fn performance(&self) -> &Arc<PerformanceMonitor> {
        &self.perf
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Patch the effective quality settings until cleared
    pub fn override_settings(&self, patch: QualityOverride) -> QualitySettings {
        self.quality.override_settings(patch)
    }

    /// Render a page, returning the surface lease
    pub fn render(&self, request: &RenderRequest) -> Result<SurfaceLease, RenderError> {
        self.render_page(request).map(|page| page.surface)
    }

    /// Render a page, keeping the composite outcome alongside the surface
    pub fn render_page(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError> {
        let started = Instant::now();
        let request = request.sanitized();
        let settings = self.quality.settings_for_level(request.distortion.level);
        self.fit_pool_to(&settings);

        // Texture before surface: a surface is never held across a load
        let texture = self.texture_for(&request, &settings);

        let (width, height) = settings.scaled_size(request.width, request.height);
        let mut surface = self.acquire_surface(width, height)?;

        let (outcome, fallback) =
            match self
                .compositor
                .compose(&request, &mut surface, texture.as_deref(), &settings)
            {
                Ok(outcome) => (outcome, false),
                Err(e) => {
                    tracing::warn!(error = %e, "composite failed, using simplified render");
                    surface.clear();
                    let outcome = self
                        .compositor
                        .compose_simplified(&request, &mut surface, &settings)
                        .unwrap_or_else(|e| {
                            tracing::warn!(error = %e, "simplified render failed, drawing paper only");
                            surface.clear();
                            self.compositor.compose_paper_only(&request, &mut surface)
                        });
                    (outcome, true)
                }
            };

        let elapsed = started.elapsed();
        let op = if fallback { OP_FALLBACK } else { OP_RENDER };
        self.perf.record_render_time(op, elapsed);
        tracing::debug!(
            width,
            height,
            mode = ?outcome.mode,
            lines = outcome.lines_drawn,
            overflow = outcome.overflow_lines,
            pooled = surface.is_pooled(),
            ?elapsed,
            "page rendered"
        );

        Ok(RenderedPage {
            surface,
            outcome,
            settings,
            fallback,
            elapsed,
        })
    }

    /// Pool cap follows the configured maximum, narrowed by the concurrency limit
    fn fit_pool_to(&self, settings: &QualitySettings) {
        let cap = self
            .config
            .pool
            .max_surfaces
            .min(settings.concurrency_limit.saturating_mul(2))
            .max(1);
        if self.pool.max_surfaces() != cap {
            self.pool.set_max_surfaces(cap);
        }
    }

    fn texture_for(
        &self,
        request: &RenderRequest,
        settings: &QualitySettings,
    ) -> Option<Arc<PaperTexture>> {
        let paper = request.paper.as_ref().filter(|p| p.has_texture())?;
        match self.textures.get(paper, TextureLoadOptions::from(settings)) {
            Ok(texture) => Some(texture),
            Err(e) => {
                tracing::warn!(template = %paper.id, error = %e, "using flat paper");
                None
            }
        }
    }

    fn acquire_surface(&self, width: u32, height: u32) -> Result<SurfaceLease, RenderError> {
        match self.pool.acquire(width, height) {
            Ok(lease) => Ok(lease),
            Err(PoolError::Exhausted { max }) => {
                let critical = self.memory.last_level() == Some(MemoryLevel::Critical);
                if critical {
                    let status = self.memory.handle_memory_pressure();
                    tracing::warn!(
                        max,
                        pressure = status.pressure,
                        "pool exhausted under critical memory pressure"
                    );
                }
                tracing::debug!(max, width, height, "pool exhausted, rendering detached");
                match DrawingSurface::new(width, height) {
                    Ok(surface) => Ok(SurfaceLease::detached(surface)),
                    Err(_) if critical => Err(RenderError::MemoryCritical),
                    Err(e) => Err(e),
                }
            }
            Err(PoolError::Allocation(e)) => {
                tracing::warn!(error = %e, "pooled allocation failed, retrying detached");
                Ok(SurfaceLease::detached(DrawingSurface::new(width, height)?))
            }
        }
    }

    pub fn memory_status(&self) -> MemoryStatus {
        self.memory.check_memory_status()
    }

    pub fn performance_report(&self) -> PerformanceReport {
        self.perf.report()
    }

    pub fn record_frame(&self, frame: Duration) {
        self.perf.record_frame_sample(frame);
    }

    /// Start the background cleanup and pressure timers
    pub fn start_monitoring(&self) -> std::io::Result<MonitorHandle> {
        self.memory.start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticProbe;
    use crate::quality::QualityState;
    use image::{Rgba, RgbaImage};
    use scrawl_cache::TextureError;
    use scrawl_render::paper::PAPER_COLOR;
    use scrawl_render::{
        CompositeMode, DistortionProfile, FontFace, GlyphBitmap, PaperKind, PaperTemplate,
    };

    struct Solid;

    impl TextureSource for Solid {
        fn load(&self, filename: &str) -> Result<RgbaImage, TextureError> {
            match filename {
                "empty.png" => Ok(RgbaImage::new(0, 0)),
                "missing.png" => Err(TextureError::Missing(filename.to_string())),
                _ => Ok(RgbaImage::from_pixel(64, 80, Rgba([235, 225, 200, 255]))),
            }
        }
    }

    fn engine(config: EngineConfig) -> Scrawl {
        Scrawl::builder(config)
            .with_probe(Arc::new(StaticProbe::new(Some(16 << 30), Some(8))))
            .with_texture_source(Arc::new(Solid))
            .with_profile(QualityProfile::DesktopHigh)
            .build()
    }

    fn page(paper: PaperTemplate) -> RenderRequest {
        RenderRequest::new("Dear diary,\nthe quick brown fox", Some(paper)).with_size(200, 240)
    }

    #[test]
    fn test_render_uses_scaled_pooled_surface() {
        let engine = engine(EngineConfig::default());
        let request = page(PaperTemplate::textured("kraft", "kraft.png", PaperKind::Blank));

        let rendered = engine.render_page(&request).unwrap();
        // DesktopHigh renders at 2x
        assert_eq!(rendered.surface.dimensions(), (400, 480));
        assert!(rendered.surface.is_pooled());
        assert_eq!(rendered.outcome.mode, CompositeMode::Full);
        assert!(rendered.outcome.used_texture);
        assert!(!rendered.fallback);
        assert!(engine.textures().contains("kraft"));
        drop(rendered);

        let stats = engine.pool().stats();
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.busy, 0);
        assert_eq!(engine.performance_report().render_count, 1);
    }

    #[test]
    fn test_render_is_deterministic() {
        let engine = engine(EngineConfig::default());
        let request = page(PaperTemplate::flat("lined", PaperKind::Lined));
        let first = engine.render(&request).unwrap().image().clone();
        let second = engine.render(&request).unwrap().image().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_texture_failure_falls_back_to_flat_paper() {
        let engine = engine(EngineConfig::default());
        let request = page(PaperTemplate::textured("gone", "missing.png", PaperKind::Lined));

        let rendered = engine.render_page(&request).unwrap();
        assert_eq!(rendered.outcome.mode, CompositeMode::Full);
        assert!(!rendered.outcome.used_texture);
        assert!(!rendered.fallback);
        assert_eq!(engine.textures().stats().load_failures, 1);
    }

    #[test]
    fn test_composite_error_retries_simplified() {
        let engine = engine(EngineConfig::default());
        let request = page(PaperTemplate::textured("blank", "empty.png", PaperKind::Blank));

        let rendered = engine.render_page(&request).unwrap();
        assert!(rendered.fallback);
        assert_eq!(rendered.outcome.mode, CompositeMode::Simplified);
        assert!(!rendered.outcome.blended);

        let report = engine.performance_report();
        assert_eq!(report.operations[OP_FALLBACK].count, 1);
        assert!(!report.operations.contains_key(OP_RENDER));
    }

    #[test]
    fn test_exhausted_pool_renders_detached() {
        let engine = engine(EngineConfig::default().with_max_surfaces(1));
        let request = page(PaperTemplate::flat("plain", PaperKind::Blank));

        let held = engine.render(&request).unwrap();
        let extra = engine.render(&request).unwrap();
        assert!(held.is_pooled());
        assert!(!extra.is_pooled());
        assert_eq!(engine.pool().stats().count, 1);
    }

    #[test]
    fn test_exhausted_pool_under_critical_pressure_degrades_and_renders() {
        let probe = Arc::new(StaticProbe::new(Some(1000), Some(8)));
        probe.set_resident(990);
        let engine = Scrawl::builder(EngineConfig::default().with_max_surfaces(1))
            .with_probe(probe)
            .with_texture_source(Arc::new(Solid))
            .with_profile(QualityProfile::DesktopHigh)
            .build();
        let request = page(PaperTemplate::flat("plain", PaperKind::Blank));

        let _held = engine.render(&request).unwrap();
        assert_eq!(engine.memory_status().level, MemoryLevel::Critical);

        let extra = engine.render(&request).unwrap();
        assert!(!extra.is_pooled());
        assert_eq!(engine.quality().state(), QualityState::Degraded(3));
        assert_eq!(engine.textures().stats().clears, 1);
        assert_eq!(engine.pool().stats().count, 1);
    }

    #[test]
    fn test_failed_simplified_render_falls_back_to_paper() {
        struct Smudged;
        impl FontFace for Smudged {
            fn name(&self) -> &str {
                "smudged"
            }
            fn advance(&self, _ch: char, px: f32) -> f32 {
                px / 2.0
            }
            fn rasterize(&self, _ch: char, _px: f32) -> GlyphBitmap {
                GlyphBitmap {
                    width: 3,
                    height: 3,
                    coverage: vec![255; 2],
                    left: 0,
                    top: -3,
                }
            }
        }

        let fonts = Arc::new(FontRegistry::new());
        fonts.register("smudged", Arc::new(Smudged));
        let engine = Scrawl::builder(EngineConfig::default())
            .with_probe(Arc::new(StaticProbe::new(Some(16 << 30), Some(8))))
            .with_texture_source(Arc::new(Solid))
            .with_fonts(fonts)
            .with_profile(QualityProfile::DesktopHigh)
            .build();
        let request = page(PaperTemplate::flat("plain", PaperKind::Blank)).with_font("smudged", 20.0);

        let rendered = engine.render_page(&request).unwrap();
        assert!(rendered.fallback);
        assert_eq!(rendered.outcome.mode, CompositeMode::PaperOnly);
        assert_eq!(rendered.outcome.glyphs_drawn, 0);
        assert_eq!(rendered.surface.image().get_pixel(0, 0), &PAPER_COLOR);
        assert_eq!(engine.performance_report().operations[OP_FALLBACK].count, 1);
    }

    #[test]
    fn test_oversized_heap_limit_builds() {
        let engine = engine(EngineConfig::default().with_heap_limit_mb(u64::MAX));
        let status = engine.memory_status();
        assert_eq!(status.heap_limit_bytes, u64::MAX);
        assert!((0.0..=1.0).contains(&status.pressure));
    }

    #[test]
    fn test_placeholder_without_paper() {
        let engine = engine(EngineConfig::default());
        let request = RenderRequest::new("ignored", None).with_size(200, 240);
        let rendered = engine.render_page(&request).unwrap();
        assert_eq!(rendered.outcome.mode, CompositeMode::Placeholder);
        assert_eq!(rendered.outcome.glyphs_drawn, 0);
    }

    #[test]
    fn test_degraded_quality_shrinks_surface_and_pool() {
        let engine = engine(EngineConfig::default());
        engine.quality().degrade_for_pressure(0.95);
        assert_eq!(engine.quality().state(), QualityState::Degraded(3));

        let request = page(PaperTemplate::flat("plain", PaperKind::Blank));
        let rendered = engine.render_page(&request).unwrap();
        assert_eq!(rendered.surface.dimensions(), (100, 120));
        assert!(!rendered.settings.blending);
        assert!(!rendered.outcome.blended);
        assert_eq!(engine.pool().max_surfaces(), 2);
    }

    #[test]
    fn test_override_and_level_cannot_lift_degraded_quality() {
        let engine = engine(EngineConfig::default());
        engine.override_settings(QualityOverride {
            render_scale: Some(2.0),
            ..Default::default()
        });
        engine.quality().degrade_for_pressure(0.95);

        let request = page(PaperTemplate::flat("plain", PaperKind::Blank))
            .with_distortion(DistortionProfile::from_level(3));
        let rendered = engine.render_page(&request).unwrap();
        assert_eq!(rendered.surface.dimensions(), (100, 120));
        assert!(!rendered.settings.antialiasing);
        assert!(!rendered.settings.blending);
    }

    #[test]
    fn test_override_settings_applies_to_next_render() {
        let engine = engine(EngineConfig::default());
        engine.override_settings(QualityOverride {
            render_scale: Some(1.0),
            blending: Some(false),
            ..Default::default()
        });
        let request = page(PaperTemplate::flat("plain", PaperKind::Blank));
        let rendered = engine.render_page(&request).unwrap();
        assert_eq!(rendered.surface.dimensions(), (200, 240));
        assert!(!rendered.outcome.blended);
    }

    #[test]
    fn test_record_frame_feeds_report() {
        let engine = engine(EngineConfig::default());
        engine.record_frame(Duration::from_millis(40));
        let report = engine.performance_report();
        assert_eq!(report.average_fps, Some(25.0));
        assert_eq!(report.score, 80);
    }

    #[test]
    fn test_memory_status_reflects_pool() {
        let engine = engine(EngineConfig::default());
        let request = page(PaperTemplate::flat("plain", PaperKind::Blank));
        let lease = engine.render(&request).unwrap();
        let status = engine.memory_status();
        assert_eq!(status.pool_bytes, 400 * 480 * 4);
        assert!((0.0..=1.0).contains(&status.pressure));
        drop(lease);
    }
}
