//! Cache access customization hook.
//!
//! Applications that persist the cache themselves (a file, the OS keychain)
//! load it before the manager touches storage and save it afterwards. The
//! hook is only invoked once an operation has passed its key checks.

use async_trait::async_trait;

use crate::CacheResult;
use crate::types::CacheOperation;

/// Context passed to a [`CacheAccessHook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheAccessContext {
    /// The operation accessing the cache.
    pub operation: CacheOperation,

    /// Whether the operation may have modified the cache.
    /// Always `false` in `before_access`.
    pub has_state_changed: bool,
}

impl CacheAccessContext {
    /// Context for the start of an operation.
    #[must_use]
    pub fn before(operation: CacheOperation) -> Self {
        Self {
            operation,
            has_state_changed: false,
        }
    }

    /// Context for the end of an operation.
    #[must_use]
    pub fn after(operation: CacheOperation, has_state_changed: bool) -> Self {
        Self {
            operation,
            has_state_changed,
        }
    }
}

/// Hook invoked around every storage access of the cache manager.
#[async_trait]
pub trait CacheAccessHook: Send + Sync {
    /// Called before storage is accessed.
    ///
    /// # Errors
    ///
    /// An error aborts the operation before any storage access.
    async fn before_access(&self, context: &CacheAccessContext) -> CacheResult<()>;

    /// Called after storage was accessed, even if the operation failed.
    ///
    /// # Errors
    ///
    /// An error is returned to the caller unless the operation already failed.
    async fn after_access(&self, context: &CacheAccessContext) -> CacheResult<()>;
}
