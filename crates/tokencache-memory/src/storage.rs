use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokencache::{
    AccessTokenCacheItem, AccessTokenKey, Account, AccountKey, AppMetadata, AppMetadataKey,
    CacheError, CacheResult, CacheStorage, CacheWriteBatch, CredentialType, DeleteCredentials,
    IdTokenCacheItem, IdTokenKey, OperationStatus, RefreshTokenCacheItem, RefreshTokenKey,
    RefreshTokenScope, alias_rank, parse_scopes,
};
use tokio::sync::RwLock;

pub type StorageKey = String;

/// Joins a target into its canonical form: lowercase, sorted, deduplicated.
fn normalized_target(target: &str) -> String {
    parse_scopes(target)
        .into_iter()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn access_token_key(item: &AccessTokenCacheItem) -> StorageKey {
    format!(
        "{}-{}-accesstoken-{}-{}-{}",
        item.home_account_id,
        item.environment,
        item.client_id,
        item.realm,
        normalized_target(&item.target)
    )
    .to_ascii_lowercase()
}

/// Family tokens are keyed by family, so a sibling client replaces them.
pub(crate) fn refresh_token_key(item: &RefreshTokenCacheItem) -> StorageKey {
    let owner = item.family().unwrap_or(&item.client_id);
    format!(
        "{}-{}-refreshtoken-{}--",
        item.home_account_id, item.environment, owner
    )
    .to_ascii_lowercase()
}

pub(crate) fn id_token_key(item: &IdTokenCacheItem) -> StorageKey {
    format!(
        "{}-{}-idtoken-{}-{}-",
        item.home_account_id, item.environment, item.client_id, item.realm
    )
    .to_ascii_lowercase()
}

pub(crate) fn account_key(account: &Account) -> StorageKey {
    format!(
        "{}-{}-{}",
        account.home_account_id, account.environment, account.realm
    )
    .to_ascii_lowercase()
}

pub(crate) fn app_metadata_key(metadata: &AppMetadata) -> StorageKey {
    format!("appmetadata-{}-{}", metadata.environment, metadata.client_id).to_ascii_lowercase()
}

/// Returns the entry matching `matches` under the most preferred alias.
fn find_by_alias<'a, T, E, M>(
    entries: impl Iterator<Item = &'a T>,
    aliases: &[String],
    environment: E,
    matches: M,
) -> Option<T>
where
    T: Clone + 'a,
    E: Fn(&T) -> &str,
    M: Fn(&T) -> bool,
{
    entries
        .filter(|&entry| matches(entry))
        .filter_map(|entry| alias_rank(aliases, environment(entry)).map(|rank| (rank, entry)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, entry)| entry.clone())
}

fn require(entity: &str, fields: &[(&str, &str)]) -> CacheResult<()> {
    match fields.iter().find(|(_, value)| value.is_empty()) {
        Some((name, _)) => Err(CacheError::storage(format!(
            "cannot store {entity} with an empty {name}"
        ))),
        None => Ok(()),
    }
}

/// Every entity held by [`InMemoryCacheStorage`], keyed by canonical key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheState {
    #[serde(default)]
    pub access_tokens: BTreeMap<StorageKey, AccessTokenCacheItem>,
    #[serde(default)]
    pub refresh_tokens: BTreeMap<StorageKey, RefreshTokenCacheItem>,
    #[serde(default)]
    pub id_tokens: BTreeMap<StorageKey, IdTokenCacheItem>,
    #[serde(default)]
    pub accounts: BTreeMap<StorageKey, Account>,
    #[serde(default)]
    pub app_metadata: BTreeMap<StorageKey, AppMetadata>,
}

impl CacheState {
    fn insert_access_token(&mut self, item: &AccessTokenCacheItem) -> CacheResult<()> {
        require(
            "access token",
            &[
                ("home_account_id", item.home_account_id.as_str()),
                ("environment", item.environment.as_str()),
                ("realm", item.realm.as_str()),
                ("client_id", item.client_id.as_str()),
            ],
        )?;
        self.access_tokens
            .insert(access_token_key(item), item.clone());
        Ok(())
    }

    fn insert_refresh_token(&mut self, item: &RefreshTokenCacheItem) -> CacheResult<()> {
        require(
            "refresh token",
            &[
                ("home_account_id", item.home_account_id.as_str()),
                ("environment", item.environment.as_str()),
                ("client_id", item.client_id.as_str()),
            ],
        )?;
        self.refresh_tokens
            .insert(refresh_token_key(item), item.clone());
        Ok(())
    }

    fn insert_id_token(&mut self, item: &IdTokenCacheItem) -> CacheResult<()> {
        require(
            "ID token",
            &[
                ("home_account_id", item.home_account_id.as_str()),
                ("environment", item.environment.as_str()),
                ("realm", item.realm.as_str()),
                ("client_id", item.client_id.as_str()),
            ],
        )?;
        self.id_tokens.insert(id_token_key(item), item.clone());
        Ok(())
    }

    fn insert_account(&mut self, account: &Account) -> CacheResult<()> {
        require(
            "account",
            &[
                ("home_account_id", account.home_account_id.as_str()),
                ("environment", account.environment.as_str()),
                ("realm", account.realm.as_str()),
            ],
        )?;
        self.accounts.insert(account_key(account), account.clone());
        Ok(())
    }

    fn insert_app_metadata(&mut self, metadata: &AppMetadata) -> CacheResult<()> {
        require(
            "app metadata",
            &[
                ("environment", metadata.environment.as_str()),
                ("client_id", metadata.client_id.as_str()),
            ],
        )?;
        self.app_metadata
            .insert(app_metadata_key(metadata), metadata.clone());
        Ok(())
    }

    fn apply(&mut self, batch: &CacheWriteBatch) -> CacheResult<()> {
        if let Some(item) = &batch.refresh_token {
            self.insert_refresh_token(item)?;
        }
        if let Some(item) = &batch.access_token {
            self.insert_access_token(item)?;
        }
        if let Some(item) = &batch.id_token {
            self.insert_id_token(item)?;
        }
        if let Some(account) = &batch.account {
            self.insert_account(account)?;
        }
        if let Some(metadata) = &batch.app_metadata {
            self.insert_app_metadata(metadata)?;
        }
        Ok(())
    }

    /// Removes the credentials selected by `request` and returns how many were removed.
    fn remove(&mut self, request: &DeleteCredentials) -> usize {
        let same =
            |filter: &str, value: &str| filter.is_empty() || filter.eq_ignore_ascii_case(value);
        let owned = |home: &str, environment: &str| {
            request.home_account_id.eq_ignore_ascii_case(home)
                && request.matches_environment(environment)
        };
        let target = (!request.target.is_empty()).then(|| parse_scopes(&request.target));
        let mut removed = 0;

        if request.selects(CredentialType::AccessToken) {
            let before = self.access_tokens.len();
            self.access_tokens.retain(|_, item| {
                !(owned(&item.home_account_id, &item.environment)
                    && same(&request.realm, &item.realm)
                    && same(&request.client_id, &item.client_id)
                    && target
                        .as_ref()
                        .is_none_or(|target| *target == parse_scopes(&item.target)))
            });
            removed += before - self.access_tokens.len();
        }

        if request.selects(CredentialType::RefreshToken) {
            let before = self.refresh_tokens.len();
            self.refresh_tokens.retain(|_, item| {
                !(owned(&item.home_account_id, &item.environment)
                    && same(&request.client_id, &item.client_id)
                    && same(&request.family_id, item.family().unwrap_or_default()))
            });
            removed += before - self.refresh_tokens.len();
        }

        if request.selects(CredentialType::IdToken) {
            let before = self.id_tokens.len();
            self.id_tokens.retain(|_, item| {
                !(owned(&item.home_account_id, &item.environment)
                    && same(&request.realm, &item.realm)
                    && same(&request.client_id, &item.client_id))
            });
            removed += before - self.id_tokens.len();
        }

        removed
    }
}

/// Entity counts of an [`InMemoryCacheStorage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub access_tokens: usize,
    pub refresh_tokens: usize,
    pub id_tokens: usize,
    pub accounts: usize,
    pub app_metadata: usize,
}

/// In-memory token cache storage.
///
/// This storage implementation provides:
/// - Lookups across every alias of an authority, preferring earlier aliases
/// - Case-insensitive scope subset matching for access tokens
/// - Family-keyed refresh tokens shared across sibling clients
/// - Idempotent credential deletion
/// - Atomic batch writes under a single write lock
/// - JSON export and import of the whole state
#[derive(Debug, Default)]
pub struct InMemoryCacheStorage {
    state: RwLock<CacheState>,
}

impl InMemoryCacheStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage holding `state`.
    pub fn with_state(state: CacheState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Returns a copy of the current state.
    pub async fn snapshot(&self) -> CacheState {
        self.state.read().await.clone()
    }

    /// Returns entity counts.
    pub async fn stats(&self) -> StorageStats {
        let state = self.state.read().await;
        StorageStats {
            access_tokens: state.access_tokens.len(),
            refresh_tokens: state.refresh_tokens.len(),
            id_tokens: state.id_tokens.len(),
            accounts: state.accounts.len(),
            app_metadata: state.app_metadata.len(),
        }
    }

    /// Removes every entity.
    pub async fn clear(&self) {
        *self.state.write().await = CacheState::default();
    }

    /// Serializes the whole state to JSON.
    pub async fn export_json(&self) -> CacheResult<String> {
        let state = self.state.read().await;
        serde_json::to_string(&*state)
            .map_err(|e| CacheError::storage(format!("Failed to serialize cache: {e}")))
    }

    /// Replaces the whole state with a JSON document produced by
    /// [`export_json`](Self::export_json).
    ///
    /// The current state is left untouched if the document is invalid.
    pub async fn import_json(&self, json: &str) -> CacheResult<()> {
        let imported: CacheState = serde_json::from_str(json)
            .map_err(|e| CacheError::storage(format!("Failed to deserialize cache: {e}")))?;
        *self.state.write().await = imported;
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for InMemoryCacheStorage {
    async fn read_access_token(
        &self,
        key: &AccessTokenKey,
    ) -> CacheResult<Option<AccessTokenCacheItem>> {
        let requested = parse_scopes(&key.scopes.join(" "));
        let state = self.state.read().await;
        Ok(find_by_alias(
            state.access_tokens.values(),
            &key.environments,
            |item| item.environment.as_str(),
            |item| {
                item.home_account_id.eq_ignore_ascii_case(&key.home_account_id)
                    && item.realm.eq_ignore_ascii_case(&key.realm)
                    && item.client_id.eq_ignore_ascii_case(&key.client_id)
                    && requested.is_subset(&parse_scopes(&item.target))
            },
        ))
    }

    async fn read_refresh_token(
        &self,
        key: &RefreshTokenKey,
    ) -> CacheResult<Option<RefreshTokenCacheItem>> {
        let scope = key.scope();
        let state = self.state.read().await;
        Ok(find_by_alias(
            state.refresh_tokens.values(),
            &key.environments,
            |item| item.environment.as_str(),
            |item| {
                item.home_account_id.eq_ignore_ascii_case(&key.home_account_id)
                    && match scope {
                        RefreshTokenScope::Family(family) => item.family() == Some(family),
                        RefreshTokenScope::Client(client_id) => {
                            item.client_id.eq_ignore_ascii_case(client_id)
                        }
                    }
            },
        ))
    }

    async fn read_id_token(&self, key: &IdTokenKey) -> CacheResult<Option<IdTokenCacheItem>> {
        let state = self.state.read().await;
        Ok(find_by_alias(
            state.id_tokens.values(),
            &key.environments,
            |item| item.environment.as_str(),
            |item| {
                item.home_account_id.eq_ignore_ascii_case(&key.home_account_id)
                    && item.realm.eq_ignore_ascii_case(&key.realm)
                    && item.client_id.eq_ignore_ascii_case(&key.client_id)
            },
        ))
    }

    async fn read_account(&self, key: &AccountKey) -> CacheResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(find_by_alias(
            state.accounts.values(),
            &key.environments,
            |account| account.environment.as_str(),
            |account| {
                account.home_account_id.eq_ignore_ascii_case(&key.home_account_id)
                    && account.realm.eq_ignore_ascii_case(&key.realm)
            },
        ))
    }

    async fn read_app_metadata(&self, key: &AppMetadataKey) -> CacheResult<Option<AppMetadata>> {
        let state = self.state.read().await;
        Ok(find_by_alias(
            state.app_metadata.values(),
            &key.environments,
            |metadata| metadata.environment.as_str(),
            |metadata| metadata.client_id.eq_ignore_ascii_case(&key.client_id),
        ))
    }

    async fn read_all_accounts(&self) -> CacheResult<Vec<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.values().cloned().collect())
    }

    async fn write_access_token(&self, item: &AccessTokenCacheItem) -> CacheResult<()> {
        self.state.write().await.insert_access_token(item)
    }

    async fn write_refresh_token(&self, item: &RefreshTokenCacheItem) -> CacheResult<()> {
        self.state.write().await.insert_refresh_token(item)
    }

    async fn write_id_token(&self, item: &IdTokenCacheItem) -> CacheResult<()> {
        self.state.write().await.insert_id_token(item)
    }

    async fn write_account(&self, account: &Account) -> CacheResult<()> {
        self.state.write().await.insert_account(account)
    }

    async fn write_app_metadata(&self, metadata: &AppMetadata) -> CacheResult<()> {
        self.state.write().await.insert_app_metadata(metadata)
    }

    async fn delete_credentials(
        &self,
        request: &DeleteCredentials,
    ) -> CacheResult<OperationStatus> {
        let removed = self.state.write().await.remove(request);
        tracing::debug!(
            correlation_id = %request.correlation_id,
            removed,
            "Deleted cached credentials"
        );
        Ok(OperationStatus::success())
    }

    fn supports_atomic_batch(&self) -> bool {
        true
    }

    /// Applies the batch to a copy of the state and swaps it in on success.
    async fn write_batch(&self, batch: &CacheWriteBatch) -> CacheResult<()> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        staged.apply(batch)?;
        *state = staged;
        Ok(())
    }
}
