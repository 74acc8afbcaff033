//! # tokencache
//!
//! Token cache management for OAuth 2.0 / OpenID Connect client applications.
//!
//! This crate persists and retrieves identity credentials (access tokens,
//! refresh tokens, ID tokens, accounts and app metadata) so a client can reuse
//! a prior sign-in instead of forcing the user to re-authenticate.
//!
//! ## Overview
//!
//! The crate owns the cache read/write protocol:
//!
//! - how each cached entity is keyed, across every alias of an authority
//! - whether a cached access token is still trustworthy
//! - how refresh tokens are shared across a family of client applications
//! - when an operation must abort because an identity field is missing
//!
//! Physical persistence is delegated to a [`CacheStorage`] implementation and
//! authority aliases are supplied by an [`AliasResolver`].
//!
//! ## Modules
//!
//! - [`authority`] - Authority alias resolution
//! - [`clock`] - Injectable time source
//! - [`config`] - Cache configuration
//! - [`error`] - Error types
//! - [`hook`] - Cache access customization hook
//! - [`key`] - Composite key model
//! - [`manager`] - The cache manager (read, write and delete paths)
//! - [`observer`] - Structured cache events
//! - [`storage`] - Storage port trait
//! - [`types`] - Cached entities, requests and token responses
//! - [`validity`] - Access token validity evaluation

pub mod authority;
pub mod clock;
pub mod config;
pub mod error;
pub mod hook;
pub mod key;
pub mod manager;
pub mod observer;
pub mod storage;
pub mod types;
pub mod validity;

pub use authority::{AliasResolver, AuthorityMetadata, StaticAliasResolver};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CacheConfig, WriteMode};
pub use error::{CacheError, ErrorCategory};
pub use hook::{CacheAccessContext, CacheAccessHook};
pub use key::{
    AccessTokenKey, AccountKey, AppMetadataKey, IdTokenKey, RefreshTokenKey, RefreshTokenScope,
    alias_rank, concatenate_scopes, environment_matches, parse_scopes,
};
pub use manager::CacheManager;
pub use observer::{CacheEvent, CacheObserver, TracingObserver};
pub use storage::{CacheStorage, CacheWriteBatch, DeleteCredentials, apply_sequentially};
pub use types::{
    AccessTokenCacheItem, Account, AppMetadata, AuthParameters, AuthorityInfo, AuthorityType,
    CacheOperation, ClientInfo, CredentialType, IdToken, IdTokenCacheItem, IdTokenClaims,
    OperationStatus, OperationStatusType, RefreshTokenCacheItem, StorageTokenResponse,
    TokenResponse,
};
pub use validity::{InvalidReason, ValidityEvaluator, is_access_token_valid};

/// Type alias for token cache results.
pub type CacheResult<T> = Result<T, CacheError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tokencache::prelude::*;
/// ```
pub mod prelude {
    pub use crate::CacheResult;
    pub use crate::authority::{AliasResolver, AuthorityMetadata, StaticAliasResolver};
    pub use crate::config::{CacheConfig, WriteMode};
    pub use crate::error::{CacheError, ErrorCategory};
    pub use crate::manager::CacheManager;
    pub use crate::storage::{CacheStorage, CacheWriteBatch, DeleteCredentials};
    pub use crate::types::{
        AccessTokenCacheItem, Account, AppMetadata, AuthParameters, AuthorityInfo,
        CredentialType, IdToken, IdTokenCacheItem, OperationStatus, RefreshTokenCacheItem,
        StorageTokenResponse, TokenResponse,
    };
}
