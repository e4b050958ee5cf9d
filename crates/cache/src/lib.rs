//! Scrawl Cache Library
//!
//! Pooled drawing surfaces and decoded paper textures, both bounded with
//! LRU eviction.

pub mod surface_pool;
pub mod texture;

pub use surface_pool::{DrawingSurfacePool, PoolConfig, PoolError, PoolStats, SurfaceLease};
pub use texture::{
    FsTextureSource, TextureCache, TextureCacheConfig, TextureCacheStats, TextureError,
    TextureLoadOptions, TextureSource,
};
