//! Storage port.
//!
//! The cache manager owns the read/write protocol and delegates physical
//! persistence to a [`CacheStorage`] implementation. Implementations decide
//! how entities are laid out, but must honour the lookup semantics described
//! on each method: reads carry the full alias set of the authority and must
//! match an entity written under any of those aliases.

mod batch;

use std::collections::HashSet;

use async_trait::async_trait;

pub use batch::{CacheWriteBatch, apply_sequentially};

use crate::CacheResult;
use crate::key::{
    AccessTokenKey, AccountKey, AppMetadataKey, IdTokenKey, RefreshTokenKey, environment_matches,
};
use crate::types::{
    AccessTokenCacheItem, Account, AppMetadata, CredentialType, IdTokenCacheItem,
    OperationStatus, RefreshTokenCacheItem,
};

/// The storage port used by the cache manager.
///
/// Implementations must be thread-safe (`Send + Sync`). Concurrent writes to
/// the same key may resolve in either order (last write wins).
///
/// # Example
///
/// ```ignore
/// use tokencache::{AccountKey, CacheStorage, CacheResult};
///
/// async fn has_account(storage: &dyn CacheStorage, key: &AccountKey) -> CacheResult<bool> {
///     Ok(storage.read_account(key).await?.is_some())
/// }
/// ```
#[async_trait]
pub trait CacheStorage: Send + Sync {
    // ==================== Reads ====================

    /// Reads an access token for the key's home account, realm and client.
    ///
    /// A stored token matches if its environment is one of the key's aliases
    /// and its target contains every requested scope. Validity is judged by
    /// the caller, not the storage.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing entries.
    async fn read_access_token(
        &self,
        key: &AccessTokenKey,
    ) -> CacheResult<Option<AccessTokenCacheItem>>;

    /// Reads a refresh token.
    ///
    /// When [`RefreshTokenKey::scope`] is a family, a token carrying that
    /// family id matches regardless of the client that wrote it. Otherwise
    /// the token must have been issued to the key's client.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing entries.
    async fn read_refresh_token(
        &self,
        key: &RefreshTokenKey,
    ) -> CacheResult<Option<RefreshTokenCacheItem>>;

    /// Reads an ID token.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing entries.
    async fn read_id_token(&self, key: &IdTokenKey) -> CacheResult<Option<IdTokenCacheItem>>;

    /// Reads an account.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing entries.
    async fn read_account(&self, key: &AccountKey) -> CacheResult<Option<Account>>;

    /// Reads app metadata.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for missing entries.
    async fn read_app_metadata(&self, key: &AppMetadataKey) -> CacheResult<Option<AppMetadata>>;

    /// Returns every cached account.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be enumerated.
    async fn read_all_accounts(&self) -> CacheResult<Vec<Account>>;

    // ==================== Writes ====================

    /// Writes an access token, replacing any entry with the same key.
    async fn write_access_token(&self, item: &AccessTokenCacheItem) -> CacheResult<()>;

    /// Writes a refresh token, replacing any entry with the same key.
    async fn write_refresh_token(&self, item: &RefreshTokenCacheItem) -> CacheResult<()>;

    /// Writes an ID token, replacing any entry with the same key.
    async fn write_id_token(&self, item: &IdTokenCacheItem) -> CacheResult<()>;

    /// Writes an account, replacing any entry with the same key.
    async fn write_account(&self, account: &Account) -> CacheResult<()>;

    /// Writes app metadata, replacing any entry with the same key.
    async fn write_app_metadata(&self, metadata: &AppMetadata) -> CacheResult<()>;

    // ==================== Deletion ====================

    /// Deletes every credential matching `request`.
    ///
    /// Deleting credentials that do not exist is not an error. A non-success
    /// status describes a failure the storage handled itself; an `Err` is an
    /// infrastructure failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage could not be reached.
    async fn delete_credentials(
        &self,
        request: &DeleteCredentials,
    ) -> CacheResult<OperationStatus>;

    // ==================== Batches ====================

    /// Returns `true` if [`write_batch`](Self::write_batch) commits all
    /// entities or none.
    fn supports_atomic_batch(&self) -> bool {
        false
    }

    /// Writes every entity of a token response.
    ///
    /// The default writes entities one by one through
    /// [`apply_sequentially`], stopping at the first failure. Backends that
    /// can commit atomically override this together with
    /// [`supports_atomic_batch`](Self::supports_atomic_batch).
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    async fn write_batch(&self, batch: &CacheWriteBatch) -> CacheResult<()> {
        apply_sequentially(self, batch).await
    }
}

/// Filter for [`CacheStorage::delete_credentials`].
///
/// Empty string fields do not restrict the match, except the home account id
/// and environment which the cache manager always sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteCredentials {
    /// Correlation id of the request, for diagnostics.
    pub correlation_id: String,

    /// Home account id.
    pub home_account_id: String,

    /// Authority host.
    pub environment: String,

    /// Hosts equivalent to `environment`. A credential stored under any of
    /// them matches.
    pub aliases: Vec<String>,

    /// Tenant. Empty matches every realm.
    pub realm: String,

    /// Client id. Empty matches every client.
    pub client_id: String,

    /// Family id. Empty matches every family.
    pub family_id: String,

    /// Space-joined scopes. Empty matches every target.
    pub target: String,

    /// Credential types to delete.
    pub credential_types: HashSet<CredentialType>,
}

impl DeleteCredentials {
    /// Creates a filter for one account at one environment.
    #[must_use]
    pub fn new(home_account_id: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            home_account_id: home_account_id.into(),
            environment: environment.into(),
            ..Self::default()
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Widens the environment match to every alias of the authority.
    #[must_use]
    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Restricts the match to a realm.
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Restricts the match to a client.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Restricts the match to a family.
    #[must_use]
    pub fn with_family_id(mut self, family_id: impl Into<String>) -> Self {
        self.family_id = family_id.into();
        self
    }

    /// Restricts the match to a target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Adds a credential type to delete.
    #[must_use]
    pub fn with_credential_type(mut self, credential_type: CredentialType) -> Self {
        self.credential_types.insert(credential_type);
        self
    }

    /// Returns `true` if a credential stored under `environment` is in scope.
    #[must_use]
    pub fn matches_environment(&self, environment: &str) -> bool {
        self.environment.eq_ignore_ascii_case(environment)
            || environment_matches(&self.aliases, environment)
    }

    /// Returns `true` if credentials of `credential_type` are selected.
    #[must_use]
    pub fn selects(&self, credential_type: CredentialType) -> bool {
        self.credential_types.contains(&credential_type)
    }
}
