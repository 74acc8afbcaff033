//! Cache manager operation identifiers.

use std::fmt;

/// The cache manager operation an error, event or hook call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    /// Listing all cached accounts.
    ListAccounts,
    /// Resolving tokens from the cache.
    ReadCache,
    /// Persisting a token response.
    WriteCache,
    /// Deleting a cached refresh token.
    DeleteRefreshToken,
    /// Deleting a cached access token.
    DeleteAccessToken,
}

impl CacheOperation {
    /// Returns `true` if the operation may modify the cache.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::WriteCache | Self::DeleteRefreshToken | Self::DeleteAccessToken
        )
    }

    /// Returns a short human-readable description.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListAccounts => "accounts listing",
            Self::ReadCache => "tokens cache lookup",
            Self::WriteCache => "tokens cache write",
            Self::DeleteRefreshToken => "refresh token deletion",
            Self::DeleteAccessToken => "access token deletion",
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
