//! Cached credential types.
//!
//! Credentials are value records. The cache manager never edits a stored
//! credential; a newer response replaces it wholesale.
//!
//! # Security
//!
//! The `Debug` implementations redact secrets so credentials can be logged
//! with `?item` without leaking token material.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Credential kinds the storage port can delete by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    /// OAuth 2.0 access token.
    AccessToken,
    /// OAuth 2.0 refresh token.
    RefreshToken,
    /// OpenID Connect ID token.
    IdToken,
}

impl CredentialType {
    /// Returns the credential type as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "AccessToken",
            Self::RefreshToken => "RefreshToken",
            Self::IdToken => "IdToken",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached access token.
///
/// Timestamps are kept as decimal strings of seconds since the Unix epoch,
/// the shape they have in persisted caches. They are only interpreted by the
/// [validity evaluator](crate::validity), which treats unparsable values as
/// invalid.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenCacheItem {
    /// Home account the token was issued for.
    pub home_account_id: String,

    /// Authority host the token was obtained from.
    pub environment: String,

    /// Tenant the token is scoped to.
    pub realm: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// When the token was written to the cache.
    pub cached_at: String,

    /// When the token expires.
    pub expires_on: String,

    /// Extended expiry, honoured by callers during identity provider outages.
    pub extended_expires_on: String,

    /// Granted scopes, space-joined.
    pub target: String,

    /// The token itself.
    pub secret: String,
}

impl AccessTokenCacheItem {
    /// Parses `cached_at` as seconds since the epoch.
    #[must_use]
    pub fn cached_at_unix(&self) -> Option<i64> {
        self.cached_at.parse().ok()
    }

    /// Parses `expires_on` as seconds since the epoch.
    #[must_use]
    pub fn expires_on_unix(&self) -> Option<i64> {
        self.expires_on.parse().ok()
    }
}

impl fmt::Debug for AccessTokenCacheItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenCacheItem")
            .field("home_account_id", &self.home_account_id)
            .field("environment", &self.environment)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("cached_at", &self.cached_at)
            .field("expires_on", &self.expires_on)
            .field("extended_expires_on", &self.extended_expires_on)
            .field("target", &self.target)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A cached refresh token.
///
/// A token without a family id belongs to exactly one client. A token with a
/// family id may be redeemed by any client registered in that family.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenCacheItem {
    /// Home account the token was issued for.
    pub home_account_id: String,

    /// Authority host the token was obtained from.
    pub environment: String,

    /// Client the token was issued to.
    pub client_id: String,

    /// The token itself.
    pub secret: String,

    /// Family the token is shared with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
}

impl RefreshTokenCacheItem {
    /// Returns the family id if the token is shared with a family.
    #[must_use]
    pub fn family(&self) -> Option<&str> {
        self.family_id.as_deref().filter(|f| !f.is_empty())
    }

    /// Returns `true` if this token is shared across a family of clients.
    #[must_use]
    pub fn is_family_token(&self) -> bool {
        self.family().is_some()
    }
}

impl fmt::Debug for RefreshTokenCacheItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshTokenCacheItem")
            .field("home_account_id", &self.home_account_id)
            .field("environment", &self.environment)
            .field("client_id", &self.client_id)
            .field("family_id", &self.family_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A cached ID token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenCacheItem {
    /// Home account the token describes.
    pub home_account_id: String,

    /// Authority host the token was obtained from.
    pub environment: String,

    /// Tenant that issued the token.
    pub realm: String,

    /// Client (audience) the token was issued to.
    pub client_id: String,

    /// The raw JWT.
    #[serde(rename = "secret")]
    pub raw_token: String,
}

impl fmt::Debug for IdTokenCacheItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdTokenCacheItem")
            .field("home_account_id", &self.home_account_id)
            .field("environment", &self.environment)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("raw_token", &"[REDACTED]")
            .finish()
    }
}
