//! Drawing surface pool with LRU eviction
//!
//! Surfaces are expensive to allocate at page sizes, so renders borrow them
//! from a bounded pool. A borrowed surface travels inside a [`SurfaceLease`]
//! which hands it back to the pool when dropped.

use scrawl_render::{DrawingSurface, RenderError};
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of surfaces (idle + busy)
    pub max_surfaces: usize,
    /// Idle surfaces older than this are dropped by `cleanup_idle`
    pub idle_ttl: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_surfaces: 8,
            idle_ttl: Duration::from_secs(60),
        }
    }
}

/// Errors from the surface pool
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("all {max} surfaces are busy")]
    Exhausted { max: usize },
    #[error(transparent)]
    Allocation(#[from] RenderError),
}

/// Statistics about pool usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolStats {
    /// Surfaces owned by the pool (idle + busy)
    pub count: usize,
    pub idle: usize,
    pub busy: usize,
    /// Estimated memory held by all pooled surfaces (bytes)
    pub estimated_bytes: usize,
    pub max_surfaces: usize,
    /// New surfaces allocated
    pub allocations: u64,
    /// Acquisitions served by an idle surface
    pub reuses: u64,
    /// Idle surfaces dropped to make room or by cleanup
    pub evictions: u64,
    /// Calls to `force_cleanup`
    pub force_cleanups: u64,
}

impl PoolStats {
    /// Pool occupancy (0.0 to 1.0)
    pub fn pressure(&self) -> f64 {
        if self.max_surfaces == 0 {
            0.0
        } else {
            (self.count as f64 / self.max_surfaces as f64).min(1.0)
        }
    }

    /// Fraction of acquisitions that reused a surface (0.0 to 1.0)
    pub fn reuse_rate(&self) -> f64 {
        let total = self.allocations + self.reuses;
        if total == 0 {
            0.0
        } else {
            self.reuses as f64 / total as f64
        }
    }
}

struct IdleSurface {
    surface: DrawingSurface,
    released_at: Instant,
}

/// Internal pool state
struct PoolState {
    idle: HashMap<u64, IdleSurface>,

    /// Idle ids, least recently released at the front
    idle_order: VecDeque<u64>,

    /// Leased surfaces: id -> byte size
    busy: HashMap<u64, usize>,

    idle_bytes: usize,

    /// Effective cap, never below the number of leased surfaces
    max_surfaces: usize,

    /// Cap requested by the owner; `max_surfaces` settles back to it as leases return
    requested_max: usize,
    stats: PoolStats,
}

impl PoolState {
    fn new(max_surfaces: usize) -> Self {
        Self {
            idle: HashMap::new(),
            idle_order: VecDeque::new(),
            busy: HashMap::new(),
            idle_bytes: 0,
            max_surfaces,
            requested_max: max_surfaces,
            stats: PoolStats::default(),
        }
    }

    fn count(&self) -> usize {
        self.idle.len() + self.busy.len()
    }

    fn take_idle(&mut self, id: u64) -> Option<DrawingSurface> {
        let entry = self.idle.remove(&id)?;
        self.idle_order.retain(|&k| k != id);
        self.idle_bytes = self.idle_bytes.saturating_sub(entry.surface.byte_size());
        Some(entry.surface)
    }

    /// Drop the least recently released idle surface
    fn evict_lru(&mut self) -> bool {
        while let Some(id) = self.idle_order.front().copied() {
            if self.take_idle(id).is_some() {
                self.stats.evictions += 1;
                tracing::debug!(surface = id, "evicted idle surface");
                return true;
            }
            self.idle_order.pop_front();
        }
        false
    }

    fn settle_cap(&mut self) {
        self.max_surfaces = self.requested_max.max(self.busy.len());
        self.evict_to_fit();
    }

    fn evict_to_fit(&mut self) {
        while self.count() > self.max_surfaces {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn release(&mut self, mut surface: DrawingSurface) {
        let id = surface.id();
        if self.busy.remove(&id).is_none() {
            tracing::debug!(surface = id, "dropping surface not owned by pool");
            return;
        }
        surface.set_busy(false);
        self.idle_bytes += surface.byte_size();
        self.idle.insert(
            id,
            IdleSurface {
                surface,
                released_at: Instant::now(),
            },
        );
        self.idle_order.push_back(id);
        // The cap may have shrunk while the surface was out
        self.settle_cap();
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            count: self.count(),
            idle: self.idle.len(),
            busy: self.busy.len(),
            estimated_bytes: self.idle_bytes + self.busy.values().sum::<usize>(),
            max_surfaces: self.max_surfaces,
            ..self.stats
        }
    }
}

fn lock(state: &Mutex<PoolState>) -> MutexGuard<'_, PoolState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// A surface borrowed from the pool, or a detached surface outside it
///
/// Dereferences to the [`DrawingSurface`]. Pooled leases return the surface
/// to the pool when dropped.
pub struct SurfaceLease {
    surface: Option<DrawingSurface>,
    pool: Option<Arc<Mutex<PoolState>>>,
}

impl SurfaceLease {
    /// Wrap a surface that no pool owns
    pub fn detached(mut surface: DrawingSurface) -> Self {
        surface.set_busy(true);
        Self {
            surface: Some(surface),
            pool: None,
        }
    }

    /// Whether the surface returns to a pool on drop
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Take the surface out of the lease; a pooled surface is forgotten by its pool
    pub fn into_surface(mut self) -> Option<DrawingSurface> {
        let surface = self.surface.take();
        if let (Some(pool), Some(surface)) = (self.pool.take(), surface.as_ref()) {
            let mut state = lock(&pool);
            state.busy.remove(&surface.id());
            state.settle_cap();
        }
        surface
    }
}

impl Deref for SurfaceLease {
    type Target = DrawingSurface;

    fn deref(&self) -> &DrawingSurface {
        match self.surface.as_ref() {
            Some(surface) => surface,
            None => unreachable!("lease surface is only taken on consumption"),
        }
    }
}

impl DerefMut for SurfaceLease {
    fn deref_mut(&mut self) -> &mut DrawingSurface {
        match self.surface.as_mut() {
            Some(surface) => surface,
            None => unreachable!("lease surface is only taken on consumption"),
        }
    }
}

impl std::fmt::Debug for SurfaceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceLease")
            .field("surface", &self.surface.as_ref().map(|s| (s.id(), s.dimensions())))
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

impl Drop for SurfaceLease {
    fn drop(&mut self) {
        if let (Some(pool), Some(surface)) = (self.pool.take(), self.surface.take()) {
            lock(&pool).release(surface);
        }
    }
}

/// Bounded pool of reusable drawing surfaces
///
/// Thread-safe. Idle surfaces of the requested size are reused; when the pool
/// is full the least recently released idle surface makes room. If every
/// surface is leased, `acquire` fails with [`PoolError::Exhausted`].
///
/// # Example
///
/// ```
/// use scrawl_cache::DrawingSurfacePool;
///
/// let pool = DrawingSurfacePool::with_max_surfaces(4);
/// {
///     let lease = pool.acquire(800, 1000).unwrap();
///     assert_eq!(lease.dimensions(), (800, 1000));
/// }
/// assert_eq!(pool.stats().idle, 1);
/// ```
pub struct DrawingSurfacePool {
    state: Arc<Mutex<PoolState>>,
    idle_ttl: Duration,
}

impl DrawingSurfacePool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState::new(config.max_surfaces.max(1)))),
            idle_ttl: config.idle_ttl,
        }
    }

    pub fn with_max_surfaces(max_surfaces: usize) -> Self {
        Self::new(PoolConfig {
            max_surfaces,
            ..Default::default()
        })
    }

    /// Borrow a surface of exactly `width` x `height`
    pub fn acquire(&self, width: u32, height: u32) -> Result<SurfaceLease, PoolError> {
        let mut state = lock(&self.state);

        // Most recently released match first
        let reusable = state.idle_order.iter().rev().copied().find(|id| {
            state
                .idle
                .get(id)
                .is_some_and(|e| e.surface.dimensions() == (width, height))
        });

        let mut surface = match reusable.and_then(|id| state.take_idle(id)) {
            Some(surface) => {
                state.stats.reuses += 1;
                surface
            }
            None => {
                if state.count() >= state.max_surfaces && !state.evict_lru() {
                    return Err(PoolError::Exhausted {
                        max: state.max_surfaces,
                    });
                }
                let surface = DrawingSurface::new(width, height)?;
                state.stats.allocations += 1;
                tracing::debug!(surface = surface.id(), width, height, "allocated surface");
                surface
            }
        };

        surface.set_busy(true);
        state.busy.insert(surface.id(), surface.byte_size());
        drop(state);

        Ok(SurfaceLease {
            surface: Some(surface),
            pool: Some(Arc::clone(&self.state)),
        })
    }

    /// Return a surface to the pool; surfaces the pool did not lend are dropped
    pub fn release(&self, surface: DrawingSurface) {
        lock(&self.state).release(surface);
    }

    /// Drop every idle surface, returning how many were dropped
    pub fn force_cleanup(&self) -> usize {
        let mut state = lock(&self.state);
        state.stats.force_cleanups += 1;
        let mut dropped = 0;
        while state.evict_lru() {
            dropped += 1;
        }
        tracing::debug!(dropped, "forced pool cleanup");
        dropped
    }

    /// Drop idle surfaces released at least `ttl` ago
    pub fn cleanup_idle(&self, ttl: Duration) -> usize {
        let mut state = lock(&self.state);
        let now = Instant::now();
        let expired: Vec<u64> = state
            .idle
            .iter()
            .filter(|(_, e)| now.duration_since(e.released_at) >= ttl)
            .map(|(&id, _)| id)
            .collect();
        for &id in &expired {
            if state.take_idle(id).is_some() {
                state.stats.evictions += 1;
            }
        }
        expired.len()
    }

    /// Drop idle surfaces older than the configured TTL
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_idle(self.idle_ttl)
    }

    /// Change the cap; idle surfaces beyond it are dropped immediately.
    ///
    /// Leased surfaces are never reclaimed, so a cap below the current busy
    /// count takes effect in steps as leases come back. Until then the
    /// reported cap stays at the busy count and new allocations are refused.
    pub fn set_max_surfaces(&self, max_surfaces: usize) {
        let mut state = lock(&self.state);
        state.requested_max = max_surfaces.max(1);
        state.settle_cap();
    }

    pub fn max_surfaces(&self) -> usize {
        lock(&self.state).max_surfaces
    }

    pub fn stats(&self) -> PoolStats {
        lock(&self.state).snapshot()
    }
}

impl Default for DrawingSurfacePool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
