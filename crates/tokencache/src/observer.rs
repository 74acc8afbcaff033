//! Structured cache events.
//!
//! The cache manager reports what it does through an injected
//! [`CacheObserver`] instead of logging directly. [`TracingObserver`], the
//! default, forwards events to `tracing`. Secrets never appear in events.

use crate::error::CacheError;
use crate::types::{CacheOperation, CredentialType, OperationStatus};
use crate::validity::InvalidReason;

/// Something the cache manager did or decided.
#[derive(Debug, Clone, Copy)]
pub enum CacheEvent<'a> {
    /// A cache lookup is about to run.
    LookupStarted {
        /// Home account id.
        home_account_id: &'a str,
        /// Alias set being queried.
        environments: &'a [String],
        /// Tenant.
        realm: &'a str,
        /// Client id.
        client_id: &'a str,
        /// Requested scopes.
        scopes: &'a [String],
    },

    /// A token response is about to be written.
    WriteStarted {
        /// Home account id.
        home_account_id: &'a str,
        /// Authority host.
        environment: &'a str,
        /// Tenant.
        realm: &'a str,
        /// Client id.
        client_id: &'a str,
        /// Granted scopes.
        target: &'a str,
    },

    /// An operation was skipped because key fields were empty.
    MissingCacheKey {
        /// The skipped operation.
        operation: CacheOperation,
        /// Names of the empty fields.
        fields: &'a [&'static str],
    },

    /// A cached access token was found but is unusable.
    AccessTokenRejected {
        /// Why it was rejected.
        reason: InvalidReason,
    },

    /// A freshly issued access token was not persisted.
    AccessTokenNotPersisted {
        /// Why it was not persisted.
        reason: InvalidReason,
    },

    /// A storage read failed and was treated as "not found".
    StorageReadFailed {
        /// The entity being read.
        entity: &'static str,
        /// The storage error.
        error: &'a CacheError,
    },

    /// A token response was committed.
    WriteCompleted {
        /// Number of entities written.
        entities: usize,
        /// Whether the entities were committed as one atomic batch.
        atomic: bool,
    },

    /// A credential deletion is about to run.
    DeletionStarted {
        /// The credential type being deleted.
        credential_type: CredentialType,
        /// Home account id.
        home_account_id: &'a str,
        /// Authority host.
        environment: &'a str,
        /// Client id.
        client_id: &'a str,
    },

    /// The storage port reported a non-success status for a deletion.
    DeletionReportedFailure {
        /// The credential type being deleted.
        credential_type: CredentialType,
        /// The reported status.
        status: &'a OperationStatus,
    },

    /// A storage error during a deletion was not propagated.
    DeletionErrorIgnored {
        /// The credential type being deleted.
        credential_type: CredentialType,
        /// The swallowed error.
        error: &'a CacheError,
    },
}

/// Receives [`CacheEvent`]s from the cache manager.
pub trait CacheObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &CacheEvent<'_>);
}

/// Forwards cache events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CacheObserver for TracingObserver {
    fn on_event(&self, event: &CacheEvent<'_>) {
        match *event {
            CacheEvent::LookupStarted {
                home_account_id,
                environments,
                realm,
                client_id,
                scopes,
            } => tracing::trace!(
                home_account_id = %home_account_id,
                environments = ?environments,
                realm = %realm,
                client_id = %client_id,
                scopes = ?scopes,
                "Querying the cache"
            ),
            CacheEvent::WriteStarted {
                home_account_id,
                environment,
                realm,
                client_id,
                target,
            } => tracing::debug!(
                home_account_id = %home_account_id,
                environment = %environment,
                realm = %realm,
                client_id = %client_id,
                target = %target,
                "Writing to the cache"
            ),
            CacheEvent::MissingCacheKey { operation, fields } => tracing::warn!(
                operation = %operation,
                fields = ?fields,
                "Skipping cache operation, one of the primary keys is empty"
            ),
            CacheEvent::AccessTokenRejected { reason } => tracing::info!(
                reason = reason.as_str(),
                "Ignoring cached access token: {reason}"
            ),
            CacheEvent::AccessTokenNotPersisted { reason } => tracing::info!(
                reason = reason.as_str(),
                "Not caching access token: {reason}"
            ),
            CacheEvent::StorageReadFailed { entity, error } => tracing::warn!(
                entity,
                error = %error,
                "Cache read failed, treating entry as absent"
            ),
            CacheEvent::WriteCompleted { entities, atomic } => {
                tracing::debug!(entities, atomic, "Token response cached");
            }
            CacheEvent::DeletionStarted {
                credential_type,
                home_account_id,
                environment,
                client_id,
            } => tracing::info!(
                credential_type = %credential_type,
                home_account_id = %home_account_id,
                environment = %environment,
                client_id = %client_id,
                "Deleting credential from the cache"
            ),
            CacheEvent::DeletionReportedFailure {
                credential_type,
                status,
            } => tracing::warn!(
                credential_type = %credential_type,
                status = %status,
                "Storage reported a failure deleting a credential"
            ),
            CacheEvent::DeletionErrorIgnored {
                credential_type,
                error,
            } => tracing::warn!(
                credential_type = %credential_type,
                error = %error,
                "Ignoring storage error while deleting a credential"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing::Level;
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::*;

    /// Layer recording the level of every event.
    #[derive(Clone, Default)]
    struct LevelCapture(Arc<Mutex<Vec<Level>>>);

    impl<S: tracing::Subscriber> Layer<S> for LevelCapture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    #[test]
    fn test_tracing_observer_levels() {
        let error = CacheError::storage("boom");
        let status = OperationStatus::failure("locked");
        let environments = vec!["login.contoso.com".to_string()];
        let scopes = vec!["user.read".to_string()];

        let events = [
            CacheEvent::LookupStarted {
                home_account_id: "uid.utid",
                environments: &environments,
                realm: "contoso",
                client_id: "client",
                scopes: &scopes,
            },
            CacheEvent::WriteStarted {
                home_account_id: "uid.utid",
                environment: "login.contoso.com",
                realm: "contoso",
                client_id: "client",
                target: "user.read",
            },
            CacheEvent::MissingCacheKey {
                operation: CacheOperation::ReadCache,
                fields: &["realm"],
            },
            CacheEvent::AccessTokenRejected {
                reason: InvalidReason::Expired,
            },
            CacheEvent::AccessTokenNotPersisted {
                reason: InvalidReason::Expired,
            },
            CacheEvent::StorageReadFailed {
                entity: "account",
                error: &error,
            },
            CacheEvent::WriteCompleted {
                entities: 5,
                atomic: false,
            },
            CacheEvent::DeletionStarted {
                credential_type: CredentialType::RefreshToken,
                home_account_id: "uid.utid",
                environment: "login.contoso.com",
                client_id: "client",
            },
            CacheEvent::DeletionReportedFailure {
                credential_type: CredentialType::RefreshToken,
                status: &status,
            },
            CacheEvent::DeletionErrorIgnored {
                credential_type: CredentialType::RefreshToken,
                error: &error,
            },
        ];

        let capture = LevelCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        tracing::subscriber::with_default(subscriber, || {
            for event in &events {
                TracingObserver.on_event(event);
            }
        });

        assert_eq!(
            *capture.0.lock().unwrap(),
            vec![
                Level::TRACE, // lookup started
                Level::DEBUG, // write started
                Level::WARN,  // missing cache key
                Level::INFO,  // access token rejected
                Level::INFO,  // access token not persisted
                Level::WARN,  // storage read failed
                Level::DEBUG, // write completed
                Level::INFO,  // deletion started
                Level::WARN,  // deletion reported failure
                Level::WARN,  // deletion error ignored
            ]
        );
    }
}
