//! Token cache manager.
//!
//! The manager owns the read/write protocol of the token cache: it keys every
//! entity, fans lookups out across authority aliases, filters stale access
//! tokens, resolves refresh token families and refuses to touch storage when
//! an identity field is missing.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokencache::{CacheManager, StaticAliasResolver, CacheConfig};
//!
//! let config = CacheConfig::load("tokencache.toml")?;
//! let manager = CacheManager::new(storage, Arc::new(StaticAliasResolver::from_config(&config)))
//!     .with_config(config);
//!
//! let cached = manager.try_read_cache(&params).await?;
//! if cached.access_token.is_none() {
//!     let response = acquire_token(&params, cached.refresh_token).await?;
//!     let account = manager.cache_token_response(&params, &response).await?;
//! }
//! ```
//!
//! # Writes
//!
//! A token response produces up to five entities. By default they are written
//! one at a time and the first failure aborts the rest, leaving earlier
//! entities committed. With [`WriteMode::AtomicWhenSupported`] and a storage
//! port that supports atomic batches, they are committed together.

use std::fmt;
use std::sync::Arc;

use crate::CacheResult;
use crate::authority::AliasResolver;
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, WriteMode};
use crate::error::CacheError;
use crate::hook::{CacheAccessContext, CacheAccessHook};
use crate::key::{
    AccessTokenKey, AccountKey, AppMetadataKey, IdTokenKey, RefreshTokenKey, concatenate_scopes,
    empty_fields,
};
use crate::observer::{CacheEvent, CacheObserver, TracingObserver};
use crate::storage::{CacheStorage, CacheWriteBatch, DeleteCredentials, apply_sequentially};
use crate::types::{
    AccessTokenCacheItem, Account, AppMetadata, AuthParameters, CacheOperation, CredentialType,
    IdTokenCacheItem, RefreshTokenCacheItem, StorageTokenResponse, TokenResponse,
};
use crate::validity::ValidityEvaluator;

/// Reads, writes and deletes cached credentials.
pub struct CacheManager {
    /// Persistence backend.
    storage: Arc<dyn CacheStorage>,

    /// Supplies the alias set of an authority.
    resolver: Arc<dyn AliasResolver>,

    /// Invoked around every storage access.
    hook: Option<Arc<dyn CacheAccessHook>>,

    /// Receives structured events.
    observer: Arc<dyn CacheObserver>,

    clock: Arc<dyn Clock>,

    config: CacheConfig,

    /// Built from `config.expiry_buffer`.
    evaluator: ValidityEvaluator,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("has_access_hook", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    /// Creates a cache manager with the default configuration, the system
    /// clock and a [`TracingObserver`].
    #[must_use]
    pub fn new(storage: Arc<dyn CacheStorage>, resolver: Arc<dyn AliasResolver>) -> Self {
        let config = CacheConfig::default();
        Self {
            storage,
            resolver,
            hook: None,
            observer: Arc::new(TracingObserver),
            clock: Arc::new(SystemClock),
            evaluator: ValidityEvaluator::new(config.expiry_buffer),
            config,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.evaluator = ValidityEvaluator::new(config.expiry_buffer);
        self.config = config;
        self
    }

    /// Replaces the event observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Installs a cache access hook.
    #[must_use]
    pub fn with_access_hook(mut self, hook: Arc<dyn CacheAccessHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the storage port.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    // ==================== Read path ====================

    /// Returns every cached account.
    ///
    /// # Errors
    ///
    /// Returns the storage error, or a hook error.
    pub async fn get_all_accounts(&self) -> CacheResult<Vec<Account>> {
        let operation = CacheOperation::ListAccounts;
        self.begin_access(operation).await?;
        let result = self.storage.read_all_accounts().await;
        self.finish_access(operation, false, result).await
    }

    /// Looks up cached credentials for a request.
    ///
    /// Each part of the result may be absent. A cached access token that is
    /// expired, about to expire or carries unparsable timestamps is reported
    /// to the observer and left out. Storage read failures are treated as
    /// "not found".
    ///
    /// # Errors
    ///
    /// - `AliasResolution` (or any resolver error) verbatim
    /// - `MissingCacheKey` if the home account id, aliases, realm, client id
    ///   or scopes are empty; storage is not touched
    /// - a hook error
    pub async fn try_read_cache(
        &self,
        params: &AuthParameters,
    ) -> CacheResult<StorageTokenResponse> {
        let operation = CacheOperation::ReadCache;
        let metadata = self.resolver.metadata_entry(&params.authority_info).await?;

        let key = AccessTokenKey {
            home_account_id: params.home_account_id.clone(),
            environments: metadata.aliases,
            realm: params.authority_info.realm.clone(),
            client_id: params.client_id.clone(),
            scopes: params.scopes.clone(),
        };

        self.observer.on_event(&CacheEvent::LookupStarted {
            home_account_id: &key.home_account_id,
            environments: &key.environments,
            realm: &key.realm,
            client_id: &key.client_id,
            scopes: &key.scopes,
        });

        let missing = key.missing_fields();
        if !missing.is_empty() {
            return Err(self.missing_cache_key(operation, missing));
        }

        self.begin_access(operation).await?;
        let response = self.read_entities(key).await;
        self.finish_access(operation, false, Ok(response)).await
    }

    async fn read_entities(&self, key: AccessTokenKey) -> StorageTokenResponse {
        let now = self.clock.now();

        let access_token = self
            .absorb("access_token", self.storage.read_access_token(&key).await)
            .and_then(|token| match self.evaluator.evaluate(&token, now) {
                Ok(()) => Some(token),
                Err(reason) => {
                    self.observer
                        .on_event(&CacheEvent::AccessTokenRejected { reason });
                    None
                }
            });

        let AccessTokenKey {
            home_account_id,
            environments,
            realm,
            client_id,
            ..
        } = key;

        let id_token_key = IdTokenKey {
            home_account_id: home_account_id.clone(),
            environments: environments.clone(),
            realm: realm.clone(),
            client_id: client_id.clone(),
        };
        let id_token = self.absorb("id_token", self.storage.read_id_token(&id_token_key).await);

        let family_id = self.resolve_family_id(&environments, &client_id).await;

        let refresh_token_key = RefreshTokenKey {
            home_account_id: home_account_id.clone(),
            environments: environments.clone(),
            client_id,
            family_id,
        };
        let refresh_token = self.absorb(
            "refresh_token",
            self.storage.read_refresh_token(&refresh_token_key).await,
        );

        let account_key = AccountKey {
            home_account_id,
            environments,
            realm,
        };
        let account = self.absorb("account", self.storage.read_account(&account_key).await);

        StorageTokenResponse::new(access_token, refresh_token, id_token, account)
    }

    /// Looks up the refresh token family of a client through its app metadata.
    ///
    /// No metadata, or metadata without a family, means the client only uses
    /// its own refresh tokens.
    async fn resolve_family_id(&self, environments: &[String], client_id: &str) -> Option<String> {
        let key = AppMetadataKey {
            environments: environments.to_vec(),
            client_id: client_id.to_string(),
        };
        self.absorb("app_metadata", self.storage.read_app_metadata(&key).await)
            .and_then(|metadata| metadata.family().map(str::to_string))
    }

    // ==================== Write path ====================

    /// Persists a token response and returns the account it belongs to.
    ///
    /// The home account id is derived from the response's client info. An
    /// access token that would already be invalid is not persisted. The
    /// ID token, account and app metadata are always written.
    ///
    /// # Errors
    ///
    /// - `MissingCacheKey` if the home account id, environment, realm,
    ///   client id or granted scopes are empty; nothing is written
    /// - the first storage write error; in best-effort mode, entities written
    ///   before it stay committed
    /// - a hook error
    pub async fn cache_token_response(
        &self,
        params: &AuthParameters,
        response: &TokenResponse,
    ) -> CacheResult<Account> {
        let operation = CacheOperation::WriteCache;
        let authority = &params.authority_info;
        let home_account_id = response.home_account_id();
        let environment = authority.host.as_str();
        let realm = authority.realm.as_str();
        let client_id = params.client_id.as_str();
        let target = concatenate_scopes(&response.granted_scopes);

        self.observer.on_event(&CacheEvent::WriteStarted {
            home_account_id: &home_account_id,
            environment,
            realm,
            client_id,
            target: &target,
        });

        let missing = empty_fields(&[
            ("home_account_id", home_account_id.is_empty()),
            ("environment", environment.is_empty()),
            ("realm", realm.is_empty()),
            ("client_id", client_id.is_empty()),
            ("target", target.is_empty()),
        ]);
        if !missing.is_empty() {
            return Err(self.missing_cache_key(operation, missing));
        }

        let now = self.clock.now();
        let family_id = response.family_id.clone().filter(|f| !f.is_empty());
        let mut batch = CacheWriteBatch::new();

        if response.has_refresh_token() {
            batch.refresh_token = Some(RefreshTokenCacheItem {
                home_account_id: home_account_id.clone(),
                environment: environment.to_string(),
                client_id: client_id.to_string(),
                secret: response.refresh_token.clone(),
                family_id: family_id.clone(),
            });
        }

        if response.has_access_token() {
            let access_token = AccessTokenCacheItem {
                home_account_id: home_account_id.clone(),
                environment: environment.to_string(),
                realm: realm.to_string(),
                client_id: client_id.to_string(),
                cached_at: now.unix_timestamp().to_string(),
                expires_on: response.expires_on.unix_timestamp().to_string(),
                extended_expires_on: response.ext_expires_on.unix_timestamp().to_string(),
                target: target.clone(),
                secret: response.access_token.clone(),
            };
            match self.evaluator.evaluate(&access_token, now) {
                Ok(()) => batch.access_token = Some(access_token),
                Err(reason) => self
                    .observer
                    .on_event(&CacheEvent::AccessTokenNotPersisted { reason }),
            }
        }

        batch.id_token = Some(IdTokenCacheItem {
            home_account_id: home_account_id.clone(),
            environment: environment.to_string(),
            realm: realm.to_string(),
            client_id: client_id.to_string(),
            raw_token: response.id_token.raw.clone(),
        });

        let account = Account::new(
            home_account_id,
            environment,
            realm,
            response.id_token.local_account_id(),
            authority.authority_type,
            response.id_token.preferred_username(),
        );
        batch.account = Some(account.clone());
        batch.app_metadata = Some(AppMetadata::new(client_id, environment, family_id));

        self.begin_access(operation).await?;

        let atomic = self.config.write_mode == WriteMode::AtomicWhenSupported
            && self.storage.supports_atomic_batch();
        let result = if atomic {
            self.storage.write_batch(&batch).await
        } else {
            apply_sequentially(self.storage.as_ref(), &batch).await
        };

        if result.is_ok() {
            self.observer.on_event(&CacheEvent::WriteCompleted {
                entities: batch.len(),
                atomic,
            });
        }

        self.finish_access(operation, true, result.map(|()| account))
            .await
    }

    // ==================== Deletion ====================

    /// Deletes the refresh token [`try_read_cache`](Self::try_read_cache)
    /// would return for the request.
    ///
    /// The deletion covers every alias of the authority. When the client's
    /// app metadata names a family, the family token is deleted whichever
    /// client wrote it. Storage failures are reported to the observer and not
    /// returned.
    ///
    /// # Errors
    ///
    /// - `MissingCacheKey` if the home account id, environment or client id
    ///   are empty
    /// - `AliasResolution` (or any resolver error) verbatim
    /// - a hook error
    pub async fn delete_cached_refresh_token(&self, params: &AuthParameters) -> CacheResult<()> {
        let operation = CacheOperation::DeleteRefreshToken;
        let credential_type = CredentialType::RefreshToken;
        let home_account_id = params.home_account_id.as_str();
        let environment = params.authority_info.host.as_str();
        let client_id = params.client_id.as_str();

        self.observer.on_event(&CacheEvent::DeletionStarted {
            credential_type,
            home_account_id,
            environment,
            client_id,
        });

        let missing = empty_fields(&[
            ("home_account_id", home_account_id.is_empty()),
            ("environment", environment.is_empty()),
            ("client_id", client_id.is_empty()),
        ]);
        if !missing.is_empty() {
            return Err(self.missing_cache_key(operation, missing));
        }

        let aliases = self
            .resolver
            .metadata_entry(&params.authority_info)
            .await?
            .aliases;

        self.begin_access(operation).await?;

        let request = DeleteCredentials::new(home_account_id, environment)
            .with_correlation_id(params.correlation_id.as_str())
            .with_credential_type(credential_type);
        let request = match self.resolve_family_id(&aliases, client_id).await {
            Some(family_id) => request.with_family_id(family_id),
            None => request.with_client_id(client_id),
        }
        .with_aliases(aliases);

        match self.storage.delete_credentials(&request).await {
            Ok(status) if !status.is_success() => {
                self.observer.on_event(&CacheEvent::DeletionReportedFailure {
                    credential_type,
                    status: &status,
                });
            }
            Ok(_) => {}
            Err(error) => {
                self.observer.on_event(&CacheEvent::DeletionErrorIgnored {
                    credential_type,
                    error: &error,
                });
            }
        }

        self.finish_access(operation, true, Ok(())).await
    }

    /// Deletes the access tokens matching an account, realm, client and target.
    ///
    /// An empty target deletes every access token of the client in the realm.
    ///
    /// # Errors
    ///
    /// - `MissingCacheKey` if the home account id, environment, realm or
    ///   client id are empty
    /// - the storage error
    /// - a hook error
    pub async fn delete_cached_access_token(
        &self,
        home_account_id: &str,
        environment: &str,
        realm: &str,
        client_id: &str,
        target: &str,
    ) -> CacheResult<()> {
        let operation = CacheOperation::DeleteAccessToken;
        let credential_type = CredentialType::AccessToken;

        self.observer.on_event(&CacheEvent::DeletionStarted {
            credential_type,
            home_account_id,
            environment,
            client_id,
        });

        let missing = empty_fields(&[
            ("home_account_id", home_account_id.is_empty()),
            ("environment", environment.is_empty()),
            ("realm", realm.is_empty()),
            ("client_id", client_id.is_empty()),
        ]);
        if !missing.is_empty() {
            return Err(self.missing_cache_key(operation, missing));
        }

        let request = DeleteCredentials::new(home_account_id, environment)
            .with_realm(realm)
            .with_client_id(client_id)
            .with_target(target)
            .with_credential_type(credential_type);

        self.begin_access(operation).await?;

        let result = self
            .storage
            .delete_credentials(&request)
            .await
            .map(|status| {
                if !status.is_success() {
                    self.observer.on_event(&CacheEvent::DeletionReportedFailure {
                        credential_type,
                        status: &status,
                    });
                }
            });

        self.finish_access(operation, true, result).await
    }

    // ==================== Helpers ====================

    fn missing_cache_key(
        &self,
        operation: CacheOperation,
        fields: Vec<&'static str>,
    ) -> CacheError {
        self.observer.on_event(&CacheEvent::MissingCacheKey {
            operation,
            fields: &fields,
        });
        CacheError::missing_cache_key(operation, fields)
    }

    /// Treats a failed read as "not found".
    fn absorb<T>(&self, entity: &'static str, result: CacheResult<Option<T>>) -> Option<T> {
        result.unwrap_or_else(|error| {
            self.observer.on_event(&CacheEvent::StorageReadFailed {
                entity,
                error: &error,
            });
            None
        })
    }

    async fn begin_access(&self, operation: CacheOperation) -> CacheResult<()> {
        match &self.hook {
            Some(hook) => {
                hook.before_access(&CacheAccessContext::before(operation))
                    .await
            }
            None => Ok(()),
        }
    }

    /// Runs the after-access hook. A hook error only replaces a successful result.
    async fn finish_access<T>(
        &self,
        operation: CacheOperation,
        has_state_changed: bool,
        result: CacheResult<T>,
    ) -> CacheResult<T> {
        let Some(hook) = &self.hook else {
            return result;
        };
        let after = hook
            .after_access(&CacheAccessContext::after(operation, has_state_changed))
            .await;
        match result {
            Ok(value) => after.map(|()| value),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::authority::{AuthorityMetadata, StaticAliasResolver};
    use crate::clock::FixedClock;
    use crate::types::{
        AuthorityInfo, AuthorityType, ClientInfo, IdToken, IdTokenClaims, OperationStatus,
    };

    const NOW: i64 = 1_700_000_000;

    /// Mock storage recording every call it receives.
    #[derive(Default)]
    struct MockStorage {
        calls: Mutex<Vec<&'static str>>,
        access_token: Option<AccessTokenCacheItem>,
        app_metadata: Option<AppMetadata>,
        refresh_token: Option<RefreshTokenCacheItem>,
        fail_reads: bool,
        fail_account_write: bool,
        atomic: bool,
        /// `None` makes `delete_credentials` fail.
        delete_status: Option<OperationStatus>,
        refresh_token_keys: Mutex<Vec<RefreshTokenKey>>,
        delete_requests: Mutex<Vec<DeleteCredentials>>,
        written: Mutex<CacheWriteBatch>,
    }

    impl MockStorage {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn read<T: Clone>(&self, call: &'static str, value: &Option<T>) -> CacheResult<Option<T>> {
            self.record(call);
            if self.fail_reads {
                return Err(CacheError::storage("read failed"));
            }
            Ok(value.clone())
        }
    }

    #[async_trait]
    impl CacheStorage for MockStorage {
        async fn read_access_token(
            &self,
            _key: &AccessTokenKey,
        ) -> CacheResult<Option<AccessTokenCacheItem>> {
            self.read("read_access_token", &self.access_token)
        }

        async fn read_refresh_token(
            &self,
            key: &RefreshTokenKey,
        ) -> CacheResult<Option<RefreshTokenCacheItem>> {
            self.refresh_token_keys.lock().unwrap().push(key.clone());
            self.read("read_refresh_token", &self.refresh_token)
        }

        async fn read_id_token(&self, _key: &IdTokenKey) -> CacheResult<Option<IdTokenCacheItem>> {
            self.read("read_id_token", &None)
        }

        async fn read_account(&self, _key: &AccountKey) -> CacheResult<Option<Account>> {
            self.read("read_account", &None)
        }

        async fn read_app_metadata(
            &self,
            _key: &AppMetadataKey,
        ) -> CacheResult<Option<AppMetadata>> {
            self.read("read_app_metadata", &self.app_metadata)
        }

        async fn read_all_accounts(&self) -> CacheResult<Vec<Account>> {
            self.record("read_all_accounts");
            Ok(Vec::new())
        }

        async fn write_access_token(&self, item: &AccessTokenCacheItem) -> CacheResult<()> {
            self.record("write_access_token");
            self.written.lock().unwrap().access_token = Some(item.clone());
            Ok(())
        }

        async fn write_refresh_token(&self, item: &RefreshTokenCacheItem) -> CacheResult<()> {
            self.record("write_refresh_token");
            self.written.lock().unwrap().refresh_token = Some(item.clone());
            Ok(())
        }

        async fn write_id_token(&self, item: &IdTokenCacheItem) -> CacheResult<()> {
            self.record("write_id_token");
            self.written.lock().unwrap().id_token = Some(item.clone());
            Ok(())
        }

        async fn write_account(&self, account: &Account) -> CacheResult<()> {
            self.record("write_account");
            if self.fail_account_write {
                return Err(CacheError::storage("disk full"));
            }
            self.written.lock().unwrap().account = Some(account.clone());
            Ok(())
        }

        async fn write_app_metadata(&self, metadata: &AppMetadata) -> CacheResult<()> {
            self.record("write_app_metadata");
            self.written.lock().unwrap().app_metadata = Some(metadata.clone());
            Ok(())
        }

        async fn delete_credentials(
            &self,
            request: &DeleteCredentials,
        ) -> CacheResult<OperationStatus> {
            self.record("delete_credentials");
            self.delete_requests.lock().unwrap().push(request.clone());
            self.delete_status
                .clone()
                .ok_or_else(|| CacheError::storage("storage unreachable"))
        }

        fn supports_atomic_batch(&self) -> bool {
            self.atomic
        }

        async fn write_batch(&self, batch: &CacheWriteBatch) -> CacheResult<()> {
            self.record("write_batch");
            *self.written.lock().unwrap() = batch.clone();
            Ok(())
        }
    }

    /// Observer keeping the debug rendering of every event.
    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn has(&self, prefix: &str) -> bool {
            self.events
                .lock()
                .unwrap()
                .iter()
                .any(|event| event.starts_with(prefix))
        }
    }

    impl CacheObserver for RecordingObserver {
        fn on_event(&self, event: &CacheEvent<'_>) {
            self.events.lock().unwrap().push(format!("{event:?}"));
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        calls: Mutex<Vec<String>>,
        fail_after: bool,
    }

    #[async_trait]
    impl CacheAccessHook for RecordingHook {
        async fn before_access(&self, context: &CacheAccessContext) -> CacheResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("before {}", context.operation));
            Ok(())
        }

        async fn after_access(&self, context: &CacheAccessContext) -> CacheResult<()> {
            self.calls.lock().unwrap().push(format!(
                "after {} changed={}",
                context.operation, context.has_state_changed
            ));
            if self.fail_after {
                return Err(CacheError::storage("could not persist cache file"));
            }
            Ok(())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl AliasResolver for FailingResolver {
        async fn metadata_entry(
            &self,
            authority: &AuthorityInfo,
        ) -> CacheResult<AuthorityMetadata> {
            Err(CacheError::alias_resolution(
                authority.host.as_str(),
                "instance discovery unavailable",
            ))
        }
    }

    fn resolver() -> Arc<StaticAliasResolver> {
        Arc::new(StaticAliasResolver::new(vec![vec![
            "login.contoso.com".to_string(),
            "login.contoso.net".to_string(),
        ]]))
    }

    fn manager(storage: &Arc<MockStorage>, observer: &Arc<RecordingObserver>) -> CacheManager {
        CacheManager::new(storage.clone(), resolver())
            .with_observer(observer.clone())
            .with_clock(Arc::new(FixedClock::at_unix(NOW)))
    }

    fn params() -> AuthParameters {
        AuthParameters::new(
            AuthorityInfo::new("login.contoso.com", "contoso", AuthorityType::Aad),
            "client-a",
        )
        .with_scopes(["user.read"])
        .with_home_account_id("uid.utid")
    }

    fn at(timestamp: i64) -> OffsetDateTime {
        FixedClock::at_unix(timestamp).0
    }

    fn access_token(expires_on: i64) -> AccessTokenCacheItem {
        AccessTokenCacheItem {
            home_account_id: "uid.utid".to_string(),
            environment: "login.contoso.net".to_string(),
            realm: "contoso".to_string(),
            client_id: "client-a".to_string(),
            cached_at: (NOW - 60).to_string(),
            expires_on: expires_on.to_string(),
            extended_expires_on: expires_on.to_string(),
            target: "user.read".to_string(),
            secret: "at-secret".to_string(),
        }
    }

    fn token_response() -> TokenResponse {
        TokenResponse::new("at-secret", at(NOW + 3600))
            .with_refresh_token("rt-secret")
            .with_granted_scopes(["user.read", "openid"])
            .with_client_info(ClientInfo::new("uid", "utid"))
            .with_id_token(IdToken {
                raw: "header.payload.signature".to_string(),
                claims: IdTokenClaims {
                    oid: Some("object-id".to_string()),
                    sub: Some("subject".to_string()),
                    preferred_username: Some("user@contoso.com".to_string()),
                    ..IdTokenClaims::default()
                },
            })
    }

    // ==================== Read path ====================

    #[tokio::test]
    async fn test_read_returns_valid_access_token() {
        let storage = Arc::new(MockStorage {
            access_token: Some(access_token(NOW + 3600)),
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        let response = manager(&storage, &observer)
            .try_read_cache(&params())
            .await
            .unwrap();

        assert_eq!(response.access_token, Some(access_token(NOW + 3600)));
        assert_eq!(
            storage.calls(),
            vec![
                "read_access_token",
                "read_id_token",
                "read_app_metadata",
                "read_refresh_token",
                "read_account"
            ]
        );
        assert!(observer.has("LookupStarted"));
    }

    #[tokio::test]
    async fn test_read_drops_access_token_inside_expiry_buffer() {
        let storage = Arc::new(MockStorage {
            access_token: Some(access_token(NOW + 300)),
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        let response = manager(&storage, &observer)
            .try_read_cache(&params())
            .await
            .unwrap();

        assert!(response.access_token.is_none());
        assert!(observer.has("AccessTokenRejected { reason: Expired }"));
    }

    #[tokio::test]
    async fn test_read_honours_configured_expiry_buffer() {
        let storage = Arc::new(MockStorage {
            access_token: Some(access_token(NOW + 300)),
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager(&storage, &observer).with_config(
            CacheConfig::default().with_expiry_buffer(std::time::Duration::from_secs(60)),
        );

        let response = manager.try_read_cache(&params()).await.unwrap();
        assert!(response.access_token.is_some());
    }

    #[tokio::test]
    async fn test_read_missing_key_skips_storage() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());
        let hook = Arc::new(RecordingHook::default());
        let manager = manager(&storage, &observer).with_access_hook(hook.clone());

        let err = manager
            .try_read_cache(&params().with_home_account_id(""))
            .await
            .unwrap_err();

        match err {
            CacheError::MissingCacheKey { operation, fields } => {
                assert_eq!(operation, CacheOperation::ReadCache);
                assert_eq!(fields, vec!["home_account_id"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(storage.calls().is_empty());
        assert!(hook.calls.lock().unwrap().is_empty());
        assert!(observer.has("MissingCacheKey"));
    }

    #[tokio::test]
    async fn test_read_without_scopes_is_missing_key() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        let params = params().with_scopes(Vec::<String>::new());
        let err = manager(&storage, &observer)
            .try_read_cache(&params)
            .await
            .unwrap_err();

        assert!(err.to_string().ends_with("scopes"));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_propagates_alias_resolution_error() {
        let storage = Arc::new(MockStorage::default());
        let manager = CacheManager::new(storage.clone(), Arc::new(FailingResolver));

        let err = manager.try_read_cache(&params()).await.unwrap_err();

        assert!(matches!(err, CacheError::AliasResolution { .. }));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_uses_family_id_from_app_metadata() {
        let storage = Arc::new(MockStorage {
            app_metadata: Some(AppMetadata::new(
                "client-a",
                "login.contoso.com",
                Some("1".to_string()),
            )),
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .try_read_cache(&params())
            .await
            .unwrap();

        let keys = storage.refresh_token_keys.lock().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].family_id.as_deref(), Some("1"));
        assert_eq!(keys[0].client_id, "client-a");
        assert_eq!(
            keys[0].environments,
            vec!["login.contoso.com", "login.contoso.net"]
        );
    }

    #[tokio::test]
    async fn test_read_without_app_metadata_uses_client_id() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .try_read_cache(&params())
            .await
            .unwrap();

        let keys = storage.refresh_token_keys.lock().unwrap();
        assert_eq!(keys[0].family_id, None);
    }

    #[tokio::test]
    async fn test_read_absorbs_storage_errors() {
        let storage = Arc::new(MockStorage {
            access_token: Some(access_token(NOW + 3600)),
            fail_reads: true,
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        let response = manager(&storage, &observer)
            .try_read_cache(&params())
            .await
            .unwrap();

        assert!(response.is_empty());
        assert_eq!(storage.calls().len(), 5);
        assert!(observer.has("StorageReadFailed { entity: \"access_token\""));
        assert!(observer.has("StorageReadFailed { entity: \"app_metadata\""));
    }

    #[tokio::test]
    async fn test_get_all_accounts_runs_hook() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());
        let hook = Arc::new(RecordingHook::default());

        let accounts = manager(&storage, &observer)
            .with_access_hook(hook.clone())
            .get_all_accounts()
            .await
            .unwrap();

        assert!(accounts.is_empty());
        assert_eq!(
            *hook.calls.lock().unwrap(),
            vec![
                "before accounts listing".to_string(),
                "after accounts listing changed=false".to_string()
            ]
        );
    }

    // ==================== Write path ====================

    #[tokio::test]
    async fn test_write_persists_entities_in_order() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        let account = manager(&storage, &observer)
            .cache_token_response(&params(), &token_response().with_family_id("1"))
            .await
            .unwrap();

        assert_eq!(
            storage.calls(),
            vec![
                "write_refresh_token",
                "write_access_token",
                "write_id_token",
                "write_account",
                "write_app_metadata"
            ]
        );
        assert_eq!(account.home_account_id, "uid.utid");
        assert_eq!(account.environment, "login.contoso.com");
        assert_eq!(account.realm, "contoso");
        assert_eq!(account.local_account_id, "object-id");
        assert_eq!(account.username, "user@contoso.com");
        assert_eq!(account.authority_type, AuthorityType::Aad);

        let written = storage.written.lock().unwrap();
        let access_token = written.access_token.as_ref().unwrap();
        assert_eq!(access_token.cached_at, NOW.to_string());
        assert_eq!(access_token.expires_on, (NOW + 3600).to_string());
        assert_eq!(access_token.target, "user.read openid");
        assert_eq!(
            written.refresh_token.as_ref().unwrap().family_id.as_deref(),
            Some("1")
        );
        assert_eq!(
            written.app_metadata.as_ref().unwrap().family_id.as_deref(),
            Some("1")
        );
        assert_eq!(
            written.id_token.as_ref().unwrap().raw_token,
            "header.payload.signature"
        );
        assert!(observer.has("WriteCompleted { entities: 5, atomic: false }"));
    }

    #[tokio::test]
    async fn test_write_skips_expired_access_token() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        let response = TokenResponse {
            expires_on: at(NOW),
            ..token_response()
        };
        manager(&storage, &observer)
            .cache_token_response(&params(), &response)
            .await
            .unwrap();

        assert!(!storage.calls().contains(&"write_access_token"));
        assert!(storage.calls().contains(&"write_account"));
        assert!(observer.has("AccessTokenNotPersisted { reason: Expired }"));
    }

    #[tokio::test]
    async fn test_write_without_client_info_is_missing_key() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        let response = TokenResponse {
            client_info: None,
            ..token_response()
        };
        let err = manager(&storage, &observer)
            .cache_token_response(&params(), &response)
            .await
            .unwrap_err();

        assert!(err.is_missing_cache_key());
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_without_granted_scopes_is_missing_key() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        let response = token_response().with_granted_scopes(Vec::<String>::new());
        let err = manager(&storage, &observer)
            .cache_token_response(&params(), &response)
            .await
            .unwrap_err();

        match err {
            CacheError::MissingCacheKey { operation, fields } => {
                assert_eq!(operation, CacheOperation::WriteCache);
                assert_eq!(fields, vec!["target"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_earlier_entities() {
        let storage = Arc::new(MockStorage {
            fail_account_write: true,
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        let err = manager(&storage, &observer)
            .cache_token_response(&params(), &token_response())
            .await
            .unwrap_err();

        assert!(err.is_storage_error());
        assert_eq!(
            storage.calls(),
            vec![
                "write_refresh_token",
                "write_access_token",
                "write_id_token",
                "write_account"
            ]
        );
        assert!(storage.written.lock().unwrap().refresh_token.is_some());
        assert!(!observer.has("WriteCompleted"));
    }

    #[tokio::test]
    async fn test_write_uses_atomic_batch_when_configured() {
        let storage = Arc::new(MockStorage {
            atomic: true,
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .with_config(CacheConfig::default().with_write_mode(WriteMode::AtomicWhenSupported))
            .cache_token_response(&params(), &token_response())
            .await
            .unwrap();

        assert_eq!(storage.calls(), vec!["write_batch"]);
        assert_eq!(storage.written.lock().unwrap().len(), 5);
        assert!(observer.has("WriteCompleted { entities: 5, atomic: true }"));
    }

    #[tokio::test]
    async fn test_atomic_mode_falls_back_without_capability() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .with_config(CacheConfig::default().with_write_mode(WriteMode::AtomicWhenSupported))
            .cache_token_response(&params(), &token_response())
            .await
            .unwrap();

        assert!(!storage.calls().contains(&"write_batch"));
        assert_eq!(storage.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_write_hook_reports_state_change() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());
        let hook = Arc::new(RecordingHook::default());

        manager(&storage, &observer)
            .with_access_hook(hook.clone())
            .cache_token_response(&params(), &token_response())
            .await
            .unwrap();

        assert_eq!(
            *hook.calls.lock().unwrap(),
            vec![
                "before tokens cache write".to_string(),
                "after tokens cache write changed=true".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_after_hook_error_replaces_success() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());
        let hook = Arc::new(RecordingHook {
            fail_after: true,
            ..RecordingHook::default()
        });

        let err = manager(&storage, &observer)
            .with_access_hook(hook)
            .cache_token_response(&params(), &token_response())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Storage error: could not persist cache file");
    }

    // ==================== Deletion ====================

    #[tokio::test]
    async fn test_delete_refresh_token_request() {
        let storage = Arc::new(MockStorage {
            delete_status: Some(OperationStatus::success()),
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .delete_cached_refresh_token(&params().with_correlation_id("corr-1"))
            .await
            .unwrap();

        let requests = storage.delete_requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.correlation_id, "corr-1");
        assert_eq!(request.home_account_id, "uid.utid");
        assert_eq!(request.environment, "login.contoso.com");
        assert_eq!(request.aliases, vec!["login.contoso.com", "login.contoso.net"]);
        assert_eq!(request.client_id, "client-a");
        assert!(request.family_id.is_empty());
        assert!(request.realm.is_empty());
        assert!(request.target.is_empty());
        assert!(request.selects(CredentialType::RefreshToken));
        assert!(!request.selects(CredentialType::AccessToken));
        assert_eq!(storage.calls(), vec!["read_app_metadata", "delete_credentials"]);
    }

    #[tokio::test]
    async fn test_delete_refresh_token_targets_family() {
        let storage = Arc::new(MockStorage {
            app_metadata: Some(AppMetadata::new(
                "client-a",
                "login.contoso.com",
                Some("1".to_string()),
            )),
            delete_status: Some(OperationStatus::success()),
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .delete_cached_refresh_token(&params())
            .await
            .unwrap();

        let requests = storage.delete_requests.lock().unwrap();
        assert_eq!(requests[0].family_id, "1");
        assert!(requests[0].client_id.is_empty());
    }

    #[tokio::test]
    async fn test_delete_refresh_token_propagates_alias_resolution_error() {
        let storage = Arc::new(MockStorage::default());

        let err = CacheManager::new(storage.clone(), Arc::new(FailingResolver))
            .delete_cached_refresh_token(&params())
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::AliasResolution { .. }));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_refresh_token_swallows_storage_error() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .delete_cached_refresh_token(&params())
            .await
            .unwrap();

        assert!(observer.has("DeletionErrorIgnored"));
    }

    #[tokio::test]
    async fn test_delete_refresh_token_reports_failed_status() {
        let storage = Arc::new(MockStorage {
            delete_status: Some(OperationStatus::failure("keychain locked").with_code(-25308)),
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .delete_cached_refresh_token(&params())
            .await
            .unwrap();

        assert!(observer.has("DeletionReportedFailure"));
    }

    #[tokio::test]
    async fn test_delete_refresh_token_missing_key() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        let err = manager(&storage, &observer)
            .delete_cached_refresh_token(&params().with_home_account_id(""))
            .await
            .unwrap_err();

        assert!(err.is_missing_cache_key());
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_access_token_propagates_storage_error() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        let err = manager(&storage, &observer)
            .delete_cached_access_token(
                "uid.utid",
                "login.contoso.com",
                "contoso",
                "client-a",
                "user.read",
            )
            .await
            .unwrap_err();

        assert!(err.is_storage_error());
    }

    #[tokio::test]
    async fn test_delete_access_token_request_and_failed_status() {
        let storage = Arc::new(MockStorage {
            delete_status: Some(OperationStatus::retriable("busy")),
            ..MockStorage::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        manager(&storage, &observer)
            .delete_cached_access_token(
                "uid.utid",
                "login.contoso.com",
                "contoso",
                "client-a",
                "user.read",
            )
            .await
            .unwrap();

        let requests = storage.delete_requests.lock().unwrap();
        assert_eq!(requests[0].realm, "contoso");
        assert_eq!(requests[0].target, "user.read");
        assert!(requests[0].selects(CredentialType::AccessToken));
        assert!(observer.has("DeletionReportedFailure"));
    }

    #[tokio::test]
    async fn test_delete_access_token_requires_realm() {
        let storage = Arc::new(MockStorage::default());
        let observer = Arc::new(RecordingObserver::default());

        let err = manager(&storage, &observer)
            .delete_cached_access_token("uid.utid", "login.contoso.com", "", "client-a", "")
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Skipping the access token deletion, one of the primary keys is empty: realm"
        );
        assert!(storage.calls().is_empty());
    }
}
