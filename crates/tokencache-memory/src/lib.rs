//! In-memory storage backend for `tokencache`.
//!
//! This crate provides an in-memory implementation of the `CacheStorage`
//! trait. All entities live behind one `tokio::sync::RwLock`, which makes
//! batch writes atomic. The state can be exported to and imported from JSON
//! so an application can persist it through a cache access hook.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokencache::{CacheManager, StaticAliasResolver};
//! use tokencache_memory::InMemoryCacheStorage;
//!
//! let storage = Arc::new(InMemoryCacheStorage::new());
//! let manager = CacheManager::new(storage.clone(), Arc::new(StaticAliasResolver::default()));
//!
//! let account = manager.cache_token_response(&params, &response).await?;
//! assert_eq!(storage.stats().await.accounts, 1);
//! ```

pub mod storage;

pub use storage::{CacheState, InMemoryCacheStorage, StorageStats};

// Re-export the CacheStorage trait for convenience
pub use tokencache::CacheStorage;

/// Type alias for a shareable storage instance.
pub type DynCacheStorage = std::sync::Arc<dyn CacheStorage>;

/// Creates a new in-memory storage instance.
pub fn create_cache_storage() -> DynCacheStorage {
    std::sync::Arc::new(InMemoryCacheStorage::new())
}
