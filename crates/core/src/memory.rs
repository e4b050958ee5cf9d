//! Memory coordination
//!
//! Combines surface pool occupancy, texture cache usage and process heap
//! size into one pressure value, and responds in tiers: routine cleanup,
//! forced trimming with quality degradation, or a full flush.

use crate::host::HostProbe;
use crate::perf::PerformanceMonitor;
use crate::quality::{QualityManager, MAX_TIER};
use scrawl_cache::{DrawingSurfacePool, TextureCache};
use scrawl_scheduler::{IntervalTimer, TimerHandle};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Weight of pool occupancy in the combined resource pressure
pub const POOL_WEIGHT: f64 = 0.6;
/// Weight of texture cache usage in the combined resource pressure
pub const CACHE_WEIGHT: f64 = 0.4;

/// Memory pressure level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl MemoryLevel {
    /// Returns true if the level calls for forced trimming (High or Critical)
    pub fn needs_eviction(&self) -> bool {
        matches!(self, MemoryLevel::High | MemoryLevel::Critical)
    }
}

/// Pressure boundaries between levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryThresholds {
    pub moderate: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            moderate: 0.6,
            high: 0.75,
            critical: 0.9,
        }
    }
}

impl MemoryThresholds {
    pub fn level(&self, pressure: f64) -> MemoryLevel {
        if pressure >= self.critical {
            MemoryLevel::Critical
        } else if pressure >= self.high {
            MemoryLevel::High
        } else if pressure >= self.moderate {
            MemoryLevel::Moderate
        } else {
            MemoryLevel::Low
        }
    }
}

/// Snapshot of memory use across the engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStatus {
    pub pool_bytes: usize,
    pub cache_bytes: usize,
    pub heap_bytes: u64,
    /// 0 when no limit is known
    pub heap_limit_bytes: u64,
    /// Pool occupancy (0.0 to 1.0)
    pub pool_pressure: f64,
    /// Texture budget utilization (0.0 to 1.0)
    pub cache_pressure: f64,
    /// Heap use as a fraction of the limit (may exceed 1.0)
    pub heap_percent: f64,
    /// Combined pressure (0.0 to 1.0)
    pub pressure: f64,
    pub level: MemoryLevel,
    pub recommendations: Vec<String>,
}

/// Combined pressure, clamped to [0, 1]; non-finite inputs count as no pressure
pub fn combined_pressure(heap_percent: f64, pool_pressure: f64, cache_pressure: f64) -> f64 {
    let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
    let resources = POOL_WEIGHT * finite(pool_pressure) + CACHE_WEIGHT * finite(cache_pressure);
    finite(heap_percent).max(resources).clamp(0.0, 1.0)
}

/// Knobs for the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryManagerConfig {
    pub thresholds: MemoryThresholds,
    /// Explicit heap limit; physical memory is used when `None`
    pub heap_limit_bytes: Option<u64>,
    /// Cache size kept under high pressure
    pub trim_target_mb: usize,
    pub texture_max_age: Duration,
    pub surface_idle_ttl: Duration,
    pub cleanup_interval: Duration,
    pub pressure_interval: Duration,
}

impl Default for MemoryManagerConfig {
    fn default() -> Self {
        Self {
            thresholds: MemoryThresholds::default(),
            heap_limit_bytes: None,
            trim_target_mb: 32,
            texture_max_age: Duration::from_secs(300),
            surface_idle_ttl: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(30),
            pressure_interval: Duration::from_secs(5),
        }
    }
}

/// Result of a routine cleanup pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CleanupReport {
    pub surfaces_dropped: usize,
    pub textures_evicted: usize,
    /// Tier in effect after the pass, if quality had to be degraded
    pub degraded_to: Option<u8>,
}

#[derive(Default)]
struct ManagerState {
    /// Pressure has been High or above since the last relief
    elevated: bool,
    last_level: Option<MemoryLevel>,
}

/// Coordinates cleanup and degradation across the engine's services
pub struct MemoryManager {
    pool: Arc<DrawingSurfacePool>,
    textures: Arc<TextureCache>,
    quality: Arc<QualityManager>,
    perf: Arc<PerformanceMonitor>,
    probe: Arc<dyn HostProbe>,
    config: MemoryManagerConfig,
    state: Mutex<ManagerState>,
}

impl MemoryManager {
    pub fn new(
        pool: Arc<DrawingSurfacePool>,
        textures: Arc<TextureCache>,
        quality: Arc<QualityManager>,
        perf: Arc<PerformanceMonitor>,
        probe: Arc<dyn HostProbe>,
        config: MemoryManagerConfig,
    ) -> Self {
        Self {
            pool,
            textures,
            quality,
            perf,
            probe,
            config,
            state: Mutex::new(ManagerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &MemoryManagerConfig {
        &self.config
    }

    /// Level seen by the last status check, if any
    pub fn last_level(&self) -> Option<MemoryLevel> {
        self.lock().last_level
    }

    fn heap(&self) -> (u64, u64) {
        let used = self.probe.resident_bytes().unwrap_or(0);
        let limit = self
            .config
            .heap_limit_bytes
            .or_else(|| self.probe.physical_memory_bytes())
            .unwrap_or(0);
        (used, limit)
    }

    pub fn check_memory_status(&self) -> MemoryStatus {
        let pool = self.pool.stats();
        let cache = self.textures.stats();
        let (heap_bytes, heap_limit_bytes) = self.heap();

        let heap_percent = if heap_limit_bytes == 0 {
            0.0
        } else {
            heap_bytes as f64 / heap_limit_bytes as f64
        };
        let pool_pressure = pool.pressure();
        let cache_pressure = cache.memory_utilization();
        let pressure = combined_pressure(heap_percent, pool_pressure, cache_pressure);
        let level = self.config.thresholds.level(pressure);

        let mut recommendations = Vec::new();
        if pool_pressure >= self.config.thresholds.high {
            recommendations.push(format!(
                "{} of {} surfaces in use; release finished pages",
                pool.count, pool.max_surfaces
            ));
        }
        if cache_pressure >= self.config.thresholds.high {
            recommendations.push("Texture cache is nearly full; lower the texture scale".into());
        }
        if heap_percent >= self.config.thresholds.high {
            recommendations.push("Process memory is high; reduce the render scale".into());
        }
        if level == MemoryLevel::Critical {
            recommendations.push("Critical memory pressure; caches will be flushed".into());
        }

        self.lock().last_level = Some(level);
        MemoryStatus {
            pool_bytes: pool.estimated_bytes,
            cache_bytes: cache.memory_used,
            heap_bytes,
            heap_limit_bytes,
            pool_pressure,
            cache_pressure,
            heap_percent,
            pressure,
            level,
            recommendations,
        }
    }

    /// Routine cleanup: idle surfaces and old textures; degrades quality if
    /// pressure stays above moderate afterwards
    pub fn perform_cleanup(&self) -> CleanupReport {
        let surfaces_dropped = self.pool.cleanup_idle(self.config.surface_idle_ttl);
        let textures_evicted = self.textures.clear_old_textures(self.config.texture_max_age);

        let status = self.check_memory_status();
        let degraded_to = if status.level.needs_eviction() {
            self.lock().elevated = true;
            Some(self.quality.degrade_for_pressure(status.pressure))
        } else {
            None
        };

        tracing::debug!(
            surfaces_dropped,
            textures_evicted,
            pressure = status.pressure,
            "memory cleanup"
        );
        CleanupReport {
            surfaces_dropped,
            textures_evicted,
            degraded_to,
        }
    }

    /// Check status, record a heap sample and respond to the pressure found
    pub fn handle_memory_pressure(&self) -> MemoryStatus {
        let status = self.check_memory_status();
        self.perf
            .record_memory_sample(status.heap_bytes, status.heap_limit_bytes);
        self.respond_to_pressure(status.pressure);
        status
    }

    /// Apply the tiered response for a pressure value
    pub fn respond_to_pressure(&self, pressure: f64) -> MemoryLevel {
        let pressure = combined_pressure(pressure, 0.0, 0.0);
        let level = self.config.thresholds.level(pressure);

        match level {
            MemoryLevel::Low => {
                let mut state = self.lock();
                if state.elevated {
                    state.elevated = false;
                    drop(state);
                    self.quality.restore_after_relief();
                    tracing::info!(pressure, "memory pressure relieved");
                }
            }
            MemoryLevel::Moderate => {
                let surfaces = self.pool.cleanup_idle(self.config.surface_idle_ttl);
                let textures = self.textures.clear_old_textures(self.config.texture_max_age);
                tracing::debug!(pressure, surfaces, textures, "moderate memory pressure");
            }
            MemoryLevel::High => {
                self.lock().elevated = true;
                let surfaces = self.pool.force_cleanup();
                let textures = self.textures.clear_to_memory_target(self.config.trim_target_mb);
                let tier = self.quality.degrade_for_pressure(pressure);
                tracing::info!(pressure, surfaces, textures, tier, "high memory pressure");
            }
            MemoryLevel::Critical => {
                self.lock().elevated = true;
                let textures = self.textures.clear();
                let surfaces = self.pool.force_cleanup();
                self.quality.degrade_for_pressure(1.0);
                let trimmed = self.probe.trim_allocator();
                tracing::warn!(
                    pressure,
                    surfaces,
                    textures,
                    tier = MAX_TIER,
                    trimmed,
                    "critical memory pressure"
                );
            }
        }
        level
    }

    /// Start the cleanup and pressure-check timers
    pub fn start(self: &Arc<Self>) -> std::io::Result<MonitorHandle> {
        let manager = Arc::clone(self);
        let cleanup = IntervalTimer::new("memory-cleanup", self.config.cleanup_interval)
            .start(move || {
                manager.perform_cleanup();
            })?;

        let manager = Arc::clone(self);
        let pressure = IntervalTimer::new("memory-pressure", self.config.pressure_interval)
            .start(move || {
                manager.handle_memory_pressure();
            })?;

        Ok(MonitorHandle { cleanup, pressure })
    }
}

/// Running memory timers; both stop when dropped
#[derive(Debug)]
pub struct MonitorHandle {
    cleanup: TimerHandle,
    pressure: TimerHandle,
}

impl MonitorHandle {
    pub fn cleanup_ticks(&self) -> u64 {
        self.cleanup.ticks()
    }

    pub fn pressure_ticks(&self) -> u64 {
        self.pressure.ticks()
    }

    pub fn stop(self) {
        self.cleanup.stop();
        self.pressure.stop();
    }
}
