//! Token cache error types.
//!
//! Only conditions that abort an operation are errors. Expired or malformed
//! cached tokens and storage-reported deletion failures are absorbed by the
//! cache manager and surface as [`CacheEvent`](crate::observer::CacheEvent)s.

use std::fmt;

use crate::types::CacheOperation;

/// Errors that can occur during token cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// One or more identity fields required to key the operation are empty.
    ///
    /// No storage access happens when this error is returned.
    #[error("Skipping the {operation}, one of the primary keys is empty: {}", .fields.join(", "))]
    MissingCacheKey {
        /// The operation that was skipped.
        operation: CacheOperation,
        /// Names of the empty fields.
        fields: Vec<&'static str>,
    },

    /// The authority alias resolver failed.
    #[error("Alias resolution failed for {authority}: {message}")]
    AliasResolution {
        /// The authority host that could not be resolved.
        authority: String,
        /// Description of the failure.
        message: String,
    },

    /// The authority URI could not be parsed.
    #[error("Invalid authority {authority}: {message}")]
    InvalidAuthority {
        /// The authority URI as given.
        authority: String,
        /// Description of why the authority is invalid.
        message: String,
    },

    /// The storage port failed to read, write or delete an entity.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// Part of a token response (client info, ID token) could not be decoded.
    #[error("Invalid token response: {message}")]
    InvalidTokenResponse {
        /// Description of the decoding failure.
        message: String,
    },

    /// The cache configuration is invalid or could not be loaded.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl CacheError {
    /// Creates a new `MissingCacheKey` error.
    #[must_use]
    pub fn missing_cache_key(operation: CacheOperation, fields: Vec<&'static str>) -> Self {
        Self::MissingCacheKey { operation, fields }
    }

    /// Creates a new `AliasResolution` error.
    #[must_use]
    pub fn alias_resolution(authority: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AliasResolution {
            authority: authority.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidAuthority` error.
    #[must_use]
    pub fn invalid_authority(authority: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAuthority {
            authority: authority.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidTokenResponse` error.
    #[must_use]
    pub fn invalid_token_response(message: impl Into<String>) -> Self {
        Self::InvalidTokenResponse {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if the operation was skipped because of an empty key field.
    #[must_use]
    pub fn is_missing_cache_key(&self) -> bool {
        matches!(self, Self::MissingCacheKey { .. })
    }

    /// Returns `true` if this error originated in the storage port.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingCacheKey { .. } => ErrorCategory::Validation,
            Self::AliasResolution { .. } => ErrorCategory::Discovery,
            Self::InvalidAuthority { .. } => ErrorCategory::Validation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::InvalidTokenResponse { .. } => ErrorCategory::Validation,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Categories of token cache errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Request or response validation errors.
    Validation,
    /// Authority alias resolution errors.
    Discovery,
    /// Storage errors.
    Infrastructure,
    /// Configuration errors.
    Configuration,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Discovery => write!(f, "discovery"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
