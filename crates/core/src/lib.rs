//! Scrawl Core Library
//!
//! Engine context and the resource control loop around the renderer:
//! configuration, host probing, quality profiles, performance monitoring
//! and memory coordination.

pub mod config;
pub mod engine;
pub mod host;
pub mod memory;
pub mod perf;
pub mod quality;

pub use config::{ConfigError, EngineConfig};
pub use engine::{RenderedPage, Scrawl, ScrawlBuilder};
pub use host::{HostProbe, StaticProbe, SystemProbe};
pub use memory::{
    CleanupReport, MemoryLevel, MemoryManager, MemoryManagerConfig, MemoryStatus,
    MemoryThresholds, MonitorHandle,
};
pub use perf::{HistoryLimits, OpSummary, PerformanceMonitor, PerformanceReport};
pub use quality::{
    ConnectionClass, DeviceSignals, QualityManager, QualityOverride, QualityProfile, QualityState,
};
