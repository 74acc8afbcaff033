//! Grouped writes of one token response.

use tracing::trace;

use crate::CacheResult;
use crate::storage::CacheStorage;
use crate::types::{
    AccessTokenCacheItem, Account, AppMetadata, IdTokenCacheItem, RefreshTokenCacheItem,
};

/// The entities derived from one token response.
///
/// Absent entities are skipped. Entities are written in field order, refresh
/// token first, so a failure late in the batch still leaves the refresh
/// token committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheWriteBatch {
    /// Refresh token.
    pub refresh_token: Option<RefreshTokenCacheItem>,
    /// Access token.
    pub access_token: Option<AccessTokenCacheItem>,
    /// ID token.
    pub id_token: Option<IdTokenCacheItem>,
    /// Account.
    pub account: Option<Account>,
    /// App metadata.
    pub app_metadata: Option<AppMetadata>,
}

impl CacheWriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entities in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.refresh_token.is_some())
            + usize::from(self.access_token.is_some())
            + usize::from(self.id_token.is_some())
            + usize::from(self.account.is_some())
            + usize::from(self.app_metadata.is_some())
    }

    /// Returns `true` if the batch holds no entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writes the entities of `batch` one at a time.
///
/// Stops at the first failure. Entities written before it stay committed;
/// nothing is rolled back.
///
/// # Errors
///
/// Returns the first write error.
pub async fn apply_sequentially<S>(storage: &S, batch: &CacheWriteBatch) -> CacheResult<()>
where
    S: CacheStorage + ?Sized,
{
    if let Some(item) = &batch.refresh_token {
        trace!("Writing refresh token");
        storage.write_refresh_token(item).await?;
    }
    if let Some(item) = &batch.access_token {
        trace!("Writing access token");
        storage.write_access_token(item).await?;
    }
    if let Some(item) = &batch.id_token {
        trace!("Writing ID token");
        storage.write_id_token(item).await?;
    }
    if let Some(account) = &batch.account {
        trace!("Writing account");
        storage.write_account(account).await?;
    }
    if let Some(metadata) = &batch.app_metadata {
        trace!("Writing app metadata");
        storage.write_app_metadata(metadata).await?;
    }
    Ok(())
}
