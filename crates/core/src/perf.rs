//! Performance monitoring
//!
//! Passive collection of render times, heap samples and frame times in
//! bounded ring buffers, summarised into a 0-100 score with suggestions.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Average render time above which the score is penalised
pub const SLOW_RENDER_AVERAGE: Duration = Duration::from_millis(100);
/// Any single render above this is penalised
pub const SLOW_RENDER_PEAK: Duration = Duration::from_millis(500);
/// Heap usage ratio above which the score is penalised
pub const HEAP_WARNING_RATIO: f64 = 0.8;
/// Average frame rate below which the score is penalised
pub const MIN_AVERAGE_FPS: f64 = 50.0;

/// Ring buffer sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub render: usize,
    pub memory: usize,
    pub frame: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            render: 1000,
            memory: 500,
            frame: 500,
        }
    }
}

#[derive(Debug, Clone)]
struct RenderSample {
    op: String,
    duration: Duration,
}

#[derive(Debug, Clone, Copy)]
struct MemorySample {
    heap_used: u64,
    heap_limit: u64,
}

#[derive(Debug, Clone, Copy)]
struct FrameSample {
    frame: Duration,
    fps: f64,
}

/// Per-operation timing summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpSummary {
    pub count: usize,
    pub average_ms: f64,
    pub max_ms: f64,
}

/// Aggregated view of the recorded samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    /// 0 (poor) to 100 (healthy)
    pub score: u8,
    pub render_count: usize,
    pub average_render_ms: f64,
    pub max_render_ms: f64,
    pub operations: BTreeMap<String, OpSummary>,
    /// Latest heap usage ratio (0.0 to 1.0)
    pub heap_ratio: Option<f64>,
    pub average_fps: Option<f64>,
    pub average_frame_ms: Option<f64>,
    pub suggestions: Vec<String>,
}

struct MonitorState {
    renders: VecDeque<RenderSample>,
    memory: VecDeque<MemorySample>,
    frames: VecDeque<FrameSample>,
    limits: HistoryLimits,
}

fn push_bounded<T>(queue: &mut VecDeque<T>, limit: usize, sample: T) {
    while queue.len() >= limit.max(1) {
        queue.pop_front();
    }
    queue.push_back(sample);
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Thread-safe performance sample collector
pub struct PerformanceMonitor {
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                renders: VecDeque::with_capacity(limits.render.min(1024)),
                memory: VecDeque::with_capacity(limits.memory.min(1024)),
                frames: VecDeque::with_capacity(limits.frame.min(1024)),
                limits,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_render_time(&self, op: &str, duration: Duration) {
        let mut state = self.lock();
        let limit = state.limits.render;
        push_bounded(
            &mut state.renders,
            limit,
            RenderSample {
                op: op.to_string(),
                duration,
            },
        );
        if duration > SLOW_RENDER_PEAK {
            tracing::warn!(op, ms = millis(duration), "slow render");
        }
    }

    pub fn record_memory_sample(&self, heap_used: u64, heap_limit: u64) {
        let mut state = self.lock();
        let limit = state.limits.memory;
        push_bounded(
            &mut state.memory,
            limit,
            MemorySample {
                heap_used,
                heap_limit,
            },
        );
    }

    /// Record one frame; zero-length frames are ignored
    pub fn record_frame_sample(&self, frame: Duration) {
        if frame.is_zero() {
            return;
        }
        let mut state = self.lock();
        let limit = state.limits.frame;
        push_bounded(
            &mut state.frames,
            limit,
            FrameSample {
                frame,
                fps: 1_000_000_000.0 / frame.as_nanos() as f64,
            },
        );
    }

    /// Number of samples held per buffer: (render, memory, frame)
    pub fn sample_counts(&self) -> (usize, usize, usize) {
        let state = self.lock();
        (state.renders.len(), state.memory.len(), state.frames.len())
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.renders.clear();
        state.memory.clear();
        state.frames.clear();
    }

    pub fn report(&self) -> PerformanceReport {
        let state = self.lock();
        let mut score: i32 = 100;
        let mut suggestions = Vec::new();

        let render_count = state.renders.len();
        let total: Duration = state.renders.iter().map(|s| s.duration).sum();
        let average_render_ms = if render_count == 0 {
            0.0
        } else {
            millis(total) / render_count as f64
        };
        let max_render = state
            .renders
            .iter()
            .map(|s| s.duration)
            .max()
            .unwrap_or_default();

        let mut operations: BTreeMap<String, OpSummary> = BTreeMap::new();
        for sample in &state.renders {
            let ms = millis(sample.duration);
            let entry = operations.entry(sample.op.clone()).or_insert(OpSummary {
                count: 0,
                average_ms: 0.0,
                max_ms: 0.0,
            });
            entry.count += 1;
            entry.average_ms += (ms - entry.average_ms) / entry.count as f64;
            entry.max_ms = entry.max_ms.max(ms);
        }

        if average_render_ms > millis(SLOW_RENDER_AVERAGE) {
            score -= 25;
            suggestions.push(format!(
                "Average render takes {average_render_ms:.0} ms; lower the render scale or realism level"
            ));
        }

        let heap_ratio = state
            .memory
            .back()
            .filter(|s| s.heap_limit > 0)
            .map(|s| s.heap_used as f64 / s.heap_limit as f64);
        if heap_ratio.is_some_and(|r| r > HEAP_WARNING_RATIO) {
            score -= 25;
            suggestions.push("Heap usage is above 80%; clear cached textures or idle surfaces".into());
        }

        let (average_fps, average_frame_ms) = if state.frames.is_empty() {
            (None, None)
        } else {
            let n = state.frames.len() as f64;
            let fps = state.frames.iter().map(|f| f.fps).sum::<f64>() / n;
            let frame_ms = state.frames.iter().map(|f| millis(f.frame)).sum::<f64>() / n;
            (Some(fps), Some(frame_ms))
        };
        if average_fps.is_some_and(|fps| fps < MIN_AVERAGE_FPS) {
            score -= 20;
            suggestions.push("Frame rate is below 50 fps; disable blending during live preview".into());
        }

        if max_render > SLOW_RENDER_PEAK {
            score -= 15;
            suggestions.push(format!(
                "A render took {:.0} ms; very long texts may need splitting across pages",
                millis(max_render)
            ));
        }

        PerformanceReport {
            score: score.clamp(0, 100) as u8,
            render_count,
            average_render_ms,
            max_render_ms: millis(max_render),
            operations,
            heap_ratio,
            average_fps,
            average_frame_ms,
            suggestions,
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(HistoryLimits::default())
    }
}
