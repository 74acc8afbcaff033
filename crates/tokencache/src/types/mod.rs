//! Cached entities, request parameters and token responses.
//!
//! ## Cached Entities
//!
//! - [`AccessTokenCacheItem`] - Access token scoped to a realm and target
//! - [`RefreshTokenCacheItem`] - Refresh token, optionally shared by a family
//! - [`IdTokenCacheItem`] - Raw ID token for an account
//! - [`Account`] - Signed-in account record
//! - [`AppMetadata`] - Client id to family id mapping
//!
//! ## Inputs and Outputs
//!
//! - [`AuthParameters`] / [`AuthorityInfo`] - The in-flight request
//! - [`TokenResponse`] - A completed token issuance
//! - [`StorageTokenResponse`] - The combined result of a cache read
//! - [`OperationStatus`] - Result reported by a storage deletion

pub mod account;
pub mod app_metadata;
pub mod credential;
pub mod operation;
pub mod request;
pub mod response;
pub mod status;

pub use account::{Account, AuthorityType};
pub use app_metadata::AppMetadata;
pub use credential::{AccessTokenCacheItem, CredentialType, IdTokenCacheItem, RefreshTokenCacheItem};
pub use operation::CacheOperation;
pub use request::{AuthParameters, AuthorityInfo};
pub use response::{ClientInfo, IdToken, IdTokenClaims, StorageTokenResponse, TokenResponse};
pub use status::{OperationStatus, OperationStatusType};
