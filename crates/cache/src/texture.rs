//! Paper texture cache
//!
//! Decoded paper textures keyed by template id. Loads go through a
//! [`TextureSource`] on a helper thread so a slow disk or a huge image can be
//! abandoned after a timeout. Entries are evicted by age, by an explicit
//! memory target, or LRU-first when an insert would exceed the byte budget.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use scrawl_render::{PaperTemplate, PaperTexture, QualitySettings};
use std::collections::{HashMap, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Errors loading a texture
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("template '{0}' has no texture image")]
    Missing(String),
    #[error("texture '{template_id}' did not load within {timeout:?}")]
    Timeout {
        template_id: String,
        timeout: Duration,
    },
    #[error("texture loader for '{0}' stopped without a result")]
    LoaderLost(String),
}

/// Where texture images come from
pub trait TextureSource: Send + Sync {
    /// Decode the image stored under `filename`
    fn load(&self, filename: &str) -> Result<RgbaImage, TextureError>;
}

/// Reads texture images from a directory
#[derive(Debug, Clone)]
pub struct FsTextureSource {
    root: PathBuf,
}

impl FsTextureSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, filename: &str) -> PathBuf {
        // Template filenames are relative; never let one escape the root
        let relative: PathBuf = Path::new(filename)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }
}

impl TextureSource for FsTextureSource {
    fn load(&self, filename: &str) -> Result<RgbaImage, TextureError> {
        let path = self.resolve(filename);
        let bytes = std::fs::read(&path).map_err(|source| TextureError::Io {
            path: path.clone(),
            source,
        })?;
        let image = image::load_from_memory(&bytes)
            .map_err(|source| TextureError::Decode { path, source })?;
        Ok(image.to_rgba8())
    }
}

/// Decode parameters for a texture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureLoadOptions {
    /// Downsampling factor (0.25 to 1.0)
    pub texture_scale: f32,
    /// Longest edge allowed after downsampling
    pub max_texture_size: u32,
}

impl TextureLoadOptions {
    /// Scale to apply to an image of `width` x `height`
    pub fn effective_scale(&self, width: u32, height: u32) -> f32 {
        let mut scale = self.texture_scale.clamp(0.25, 1.0);
        let longest = width.max(height) as f32 * scale;
        if longest > self.max_texture_size as f32 && longest > 0.0 {
            scale *= self.max_texture_size as f32 / longest;
        }
        scale
    }

    fn same_as(&self, other: &TextureLoadOptions) -> bool {
        (self.texture_scale - other.texture_scale).abs() < 1e-3
            && self.max_texture_size == other.max_texture_size
    }
}

impl Default for TextureLoadOptions {
    fn default() -> Self {
        Self::from(&QualitySettings::default())
    }
}

impl From<&QualitySettings> for TextureLoadOptions {
    fn from(settings: &QualitySettings) -> Self {
        Self {
            texture_scale: settings.texture_scale,
            max_texture_size: settings.max_texture_size,
        }
    }
}

/// Cache sizing and load timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCacheConfig {
    /// Byte budget for decoded textures
    pub memory_limit: usize,
    pub load_timeout: Duration,
}

impl Default for TextureCacheConfig {
    fn default() -> Self {
        Self {
            memory_limit: 128 * 1024 * 1024,
            load_timeout: Duration::from_secs(3),
        }
    }
}

/// Statistics about texture cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextureCacheStats {
    pub entries: usize,
    /// Estimated decoded bytes (w·h·4 per image)
    pub memory_used: usize,
    pub memory_limit: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped by age, memory target or budget
    pub evictions: u64,
    /// Entries replaced by a load at a different scale
    pub replacements: u64,
    pub load_failures: u64,
    pub timeouts: u64,
    /// Misses served by waiting on a load already in flight
    pub joined_loads: u64,
    /// Calls to `clear`
    pub clears: u64,
}

impl TextureCacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            (self.memory_used as f64 / self.memory_limit as f64).min(1.0)
        }
    }
}

struct CachedTexture {
    texture: Arc<PaperTexture>,
    options: TextureLoadOptions,
    last_access: Instant,
}

type LoadResult = Result<PaperTexture, TextureError>;

/// A load that outlived its caller's timeout and is still decoding
struct PendingLoad {
    options: TextureLoadOptions,
    result: mpsc::Receiver<LoadResult>,
}

/// Internal cache state
struct CacheState {
    textures: HashMap<String, CachedTexture>,

    /// LRU queue (most recently used at back)
    lru_queue: VecDeque<String>,

    memory_used: usize,
    memory_limit: usize,

    /// At most one load per template id runs at a time
    pending: HashMap<String, PendingLoad>,
    stats: TextureCacheStats,
}

impl CacheState {
    fn new(memory_limit: usize) -> Self {
        Self {
            textures: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            pending: HashMap::new(),
            stats: TextureCacheStats::default(),
        }
    }

    fn touch(&mut self, id: &str) {
        self.lru_queue.retain(|k| k != id);
        self.lru_queue.push_back(id.to_string());
    }

    fn remove(&mut self, id: &str) -> Option<CachedTexture> {
        let entry = self.textures.remove(id)?;
        self.lru_queue.retain(|k| k != id);
        self.memory_used = self.memory_used.saturating_sub(entry.texture.byte_size());
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        while let Some(id) = self.lru_queue.pop_front() {
            if let Some(entry) = self.textures.remove(&id) {
                self.memory_used = self.memory_used.saturating_sub(entry.texture.byte_size());
                self.stats.evictions += 1;
                tracing::debug!(template = %id, "evicted texture");
                return true;
            }
        }
        false
    }

    fn evict_to_fit(&mut self, required: usize) {
        while self.memory_used + required > self.memory_limit && !self.textures.is_empty() {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn snapshot(&self) -> TextureCacheStats {
        TextureCacheStats {
            entries: self.textures.len(),
            memory_used: self.memory_used,
            memory_limit: self.memory_limit,
            ..self.stats
        }
    }
}

/// Thread-safe cache of decoded paper textures
pub struct TextureCache {
    state: Arc<Mutex<CacheState>>,
    source: Arc<dyn TextureSource>,
    load_timeout: Duration,
}

impl TextureCache {
    pub fn new(source: Arc<dyn TextureSource>, config: TextureCacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new(config.memory_limit))),
            source,
            load_timeout: config.load_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached texture for the template, loading it on a miss
    ///
    /// An entry decoded with different options is replaced, so a template
    /// never has more than one live texture.
    pub fn get(
        &self,
        template: &PaperTemplate,
        options: TextureLoadOptions,
    ) -> Result<Arc<PaperTexture>, TextureError> {
        {
            let mut state = self.lock();
            let cached = state
                .textures
                .get_mut(&template.id)
                .filter(|e| e.options.same_as(&options))
                .map(|e| {
                    e.last_access = Instant::now();
                    Arc::clone(&e.texture)
                });
            if let Some(texture) = cached {
                state.touch(&template.id);
                state.stats.hits += 1;
                return Ok(texture);
            }
            state.stats.misses += 1;
            if state.remove(&template.id).is_some() {
                state.stats.replacements += 1;
            }
        }

        let texture = match self.load(template, options) {
            Ok(texture) => Arc::new(texture),
            Err(e) => {
                let mut state = self.lock();
                match e {
                    TextureError::Timeout { .. } => state.stats.timeouts += 1,
                    _ => state.stats.load_failures += 1,
                }
                tracing::warn!(template = %template.id, error = %e, "texture load failed");
                return Err(e);
            }
        };

        let mut state = self.lock();
        // A concurrent load may have stored the same template meanwhile
        state.remove(&template.id);
        let size = texture.byte_size();
        state.evict_to_fit(size);
        state.memory_used += size;
        state.textures.insert(
            template.id.clone(),
            CachedTexture {
                texture: Arc::clone(&texture),
                options,
                last_access: Instant::now(),
            },
        );
        state.touch(&template.id);
        tracing::debug!(
            template = %template.id,
            width = texture.image().width(),
            height = texture.image().height(),
            scale = texture.scale(),
            "texture cached"
        );
        Ok(texture)
    }

    /// Decode on a helper thread, giving up after the load timeout.
    ///
    /// A load that times out keeps running; the next miss for the same
    /// template and options waits on it instead of starting another thread.
    fn load(&self, template: &PaperTemplate, options: TextureLoadOptions) -> LoadResult {
        let filename = template
            .filename
            .clone()
            .ok_or_else(|| TextureError::Missing(template.id.clone()))?;
        let template_id = template.id.clone();

        let in_flight = {
            let mut state = self.lock();
            let pending = state
                .pending
                .remove(&template_id)
                .filter(|p| p.options.same_as(&options));
            if pending.is_some() {
                state.stats.joined_loads += 1;
            }
            pending
        };

        let result = match in_flight {
            Some(pending) => {
                tracing::debug!(template = %template_id, "waiting on texture load in flight");
                pending.result
            }
            None => {
                let lines_filename = template.lines_filename.clone();
                let source = Arc::clone(&self.source);
                let (tx, rx) = mpsc::channel();
                let id = template_id.clone();
                thread::spawn(move || {
                    let result =
                        decode(source.as_ref(), &id, &filename, lines_filename.as_deref(), options);
                    // Receiver is gone if the pending load was dropped
                    let _ = tx.send(result);
                });
                rx
            }
        };

        match result.recv_timeout(self.load_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.lock()
                    .pending
                    .insert(template_id.clone(), PendingLoad { options, result });
                Err(TextureError::Timeout {
                    template_id,
                    timeout: self.load_timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(TextureError::LoaderLost(template_id)),
        }
    }

    /// Number of loads still decoding after their caller gave up
    pub fn pending_loads(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether a texture for the template id is cached (any scale)
    pub fn contains(&self, template_id: &str) -> bool {
        self.lock().textures.contains_key(template_id)
    }

    /// Evict entries not accessed for at least `max_age`; returns the count
    pub fn clear_old_textures(&self, max_age: Duration) -> usize {
        let mut state = self.lock();
        let now = Instant::now();
        let stale: Vec<String> = state
            .textures
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_access) >= max_age)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            if state.remove(id).is_some() {
                state.stats.evictions += 1;
            }
        }
        if !stale.is_empty() {
            tracing::debug!(evicted = stale.len(), ?max_age, "cleared old textures");
        }
        stale.len()
    }

    /// Evict least recently used entries until usage is at most `target_mb`
    pub fn clear_to_memory_target(&self, target_mb: usize) -> usize {
        let target = target_mb.saturating_mul(1024 * 1024);
        let mut state = self.lock();
        let mut evicted = 0;
        while state.memory_used > target && state.evict_lru() {
            evicted += 1;
        }
        evicted
    }

    /// Drop every entry; returns how many were dropped
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.textures.len();
        state.textures.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.stats.clears += 1;
        tracing::debug!(dropped, "texture cache cleared");
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_used(&self) -> usize {
        self.lock().memory_used
    }

    pub fn stats(&self) -> TextureCacheStats {
        self.lock().snapshot()
    }
}

fn decode(
    source: &dyn TextureSource,
    template_id: &str,
    filename: &str,
    lines_filename: Option<&str>,
    options: TextureLoadOptions,
) -> Result<PaperTexture, TextureError> {
    let image = source.load(filename)?;
    let scale = options.effective_scale(image.width(), image.height());
    let mut texture = PaperTexture::new(template_id, downsample(image, scale), scale);

    if let Some(lines_filename) = lines_filename {
        match source.load(lines_filename) {
            Ok(lines) => texture = texture.with_lines(downsample(lines, scale)),
            Err(e) => {
                tracing::warn!(template = template_id, error = %e, "lines overlay skipped");
            }
        }
    }
    Ok(texture)
}

fn downsample(image: RgbaImage, scale: f32) -> RgbaImage {
    if scale >= 1.0 {
        return image;
    }
    let width = ((image.width() as f32 * scale).round() as u32).max(1);
    let height = ((image.height() as f32 * scale).round() as u32).max(1);
    imageops::resize(&image, width, height, FilterType::Triangle)
}
