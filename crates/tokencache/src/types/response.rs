//! Token responses and cache read results.
//!
//! Parsing the identity provider's HTTP response is not done here; callers
//! build a [`TokenResponse`] from whatever transport they use. This module
//! only decodes the two opaque pieces the cache keys depend on: the
//! `client_info` blob and the ID token payload.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::CacheResult;
use crate::error::CacheError;
use crate::types::account::Account;
use crate::types::credential::{AccessTokenCacheItem, IdTokenCacheItem, RefreshTokenCacheItem};

/// Decodes an unpadded (or padded) base64url segment.
fn decode_segment(segment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))
}

/// The `client_info` object returned alongside tokens.
///
/// The home account id is `{uid}.{utid}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ClientInfo {
    /// User object id in the home tenant.
    #[serde(default)]
    pub uid: String,

    /// Home tenant id.
    #[serde(default)]
    pub utid: String,
}

impl ClientInfo {
    /// Creates client info from its parts.
    #[must_use]
    pub fn new(uid: impl Into<String>, utid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            utid: utid.into(),
        }
    }

    /// Decodes the base64url JSON blob sent by the identity provider.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTokenResponse` if the blob is not base64url or not JSON.
    pub fn decode(raw: &str) -> CacheResult<Self> {
        let bytes = decode_segment(raw).map_err(|e| {
            CacheError::invalid_token_response(format!("client_info is not base64url: {e}"))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            CacheError::invalid_token_response(format!("client_info is not valid JSON: {e}"))
        })
    }

    /// Returns the home account id, or an empty string if either part is missing.
    #[must_use]
    pub fn home_account_id(&self) -> String {
        if self.uid.is_empty() || self.utid.is_empty() {
            return String::new();
        }
        format!("{}.{}", self.uid, self.utid)
    }
}

/// Claims of an ID token that the cache uses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,

    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,

    /// Object id of the user in the issuing tenant.
    #[serde(default)]
    pub oid: Option<String>,

    /// Issuing tenant id.
    #[serde(default)]
    pub tid: Option<String>,

    /// Preferred username (usually a UPN or email).
    #[serde(default)]
    pub preferred_username: Option<String>,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// An ID token with its decoded claims.
///
/// The signature is not verified: the token was just received from the
/// token endpoint over TLS, and the cache only needs identifiers from it.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct IdToken {
    /// The raw JWT.
    pub raw: String,

    /// Decoded claims.
    pub claims: IdTokenClaims,
}

impl IdToken {
    /// Decodes the payload of a JWT without verifying its signature.
    ///
    /// An empty string yields an empty token with default claims.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTokenResponse` if the token is not a three-part JWT or
    /// its payload is not base64url JSON.
    pub fn parse(raw: &str) -> CacheResult<Self> {
        if raw.is_empty() {
            return Ok(Self::default());
        }

        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 {
            return Err(CacheError::invalid_token_response("ID token is not a JWT"));
        }

        let payload = decode_segment(parts[1]).map_err(|_| {
            CacheError::invalid_token_response("Invalid ID token payload encoding")
        })?;
        let claims: IdTokenClaims = serde_json::from_slice(&payload)
            .map_err(|_| CacheError::invalid_token_response("Invalid ID token payload JSON"))?;

        Ok(Self {
            raw: raw.to_string(),
            claims,
        })
    }

    /// Returns the user's id in the issuing tenant: `oid`, falling back to `sub`.
    #[must_use]
    pub fn local_account_id(&self) -> &str {
        self.claims
            .oid
            .as_deref()
            .or(self.claims.sub.as_deref())
            .unwrap_or_default()
    }

    /// Returns the preferred username, or an empty string.
    #[must_use]
    pub fn preferred_username(&self) -> &str {
        self.claims.preferred_username.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdToken")
            .field("raw", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

/// A completed token issuance, ready to be cached.
#[derive(Clone)]
pub struct TokenResponse {
    /// Access token, empty if none was issued.
    pub access_token: String,

    /// Refresh token, empty if none was issued.
    pub refresh_token: String,

    /// ID token, empty if none was issued.
    pub id_token: IdToken,

    /// Access token expiry.
    pub expires_on: OffsetDateTime,

    /// Extended access token expiry.
    pub ext_expires_on: OffsetDateTime,

    /// Scopes the server granted.
    pub granted_scopes: Vec<String>,

    /// Decoded `client_info`, the source of the home account id.
    pub client_info: Option<ClientInfo>,

    /// Refresh token family id (`foci`), if the client belongs to one.
    pub family_id: Option<String>,
}

impl TokenResponse {
    /// Creates a response carrying an access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_on: OffsetDateTime) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: String::new(),
            id_token: IdToken::default(),
            expires_on,
            ext_expires_on: expires_on,
            granted_scopes: Vec::new(),
            client_info: None,
            family_id: None,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = refresh_token.into();
        self
    }

    /// Sets the ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: IdToken) -> Self {
        self.id_token = id_token;
        self
    }

    /// Sets the extended expiry.
    #[must_use]
    pub fn with_ext_expires_on(mut self, ext_expires_on: OffsetDateTime) -> Self {
        self.ext_expires_on = ext_expires_on;
        self
    }

    /// Sets the granted scopes.
    #[must_use]
    pub fn with_granted_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the client info.
    #[must_use]
    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = Some(client_info);
        self
    }

    /// Sets the refresh token family id.
    #[must_use]
    pub fn with_family_id(mut self, family_id: impl Into<String>) -> Self {
        self.family_id = Some(family_id.into());
        self
    }

    /// Returns `true` if an access token was issued.
    #[must_use]
    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Returns `true` if a refresh token was issued.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Returns the home account id derived from `client_info`, or an empty string.
    #[must_use]
    pub fn home_account_id(&self) -> String {
        self.client_info
            .as_ref()
            .map(ClientInfo::home_account_id)
            .unwrap_or_default()
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("has_access_token", &self.has_access_token())
            .field("has_refresh_token", &self.has_refresh_token())
            .field("id_token", &self.id_token)
            .field("expires_on", &self.expires_on)
            .field("ext_expires_on", &self.ext_expires_on)
            .field("granted_scopes", &self.granted_scopes)
            .field("client_info", &self.client_info)
            .field("family_id", &self.family_id)
            .finish()
    }
}

/// Result of a cache read. Any part may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageTokenResponse {
    /// A valid access token for the requested scopes.
    pub access_token: Option<AccessTokenCacheItem>,

    /// A refresh token usable by the requesting client.
    pub refresh_token: Option<RefreshTokenCacheItem>,

    /// The account's ID token.
    pub id_token: Option<IdTokenCacheItem>,

    /// The account record.
    pub account: Option<Account>,
}

impl StorageTokenResponse {
    /// Combines the four reads into one result.
    #[must_use]
    pub fn new(
        access_token: Option<AccessTokenCacheItem>,
        refresh_token: Option<RefreshTokenCacheItem>,
        id_token: Option<IdTokenCacheItem>,
        account: Option<Account>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            id_token,
            account,
        }
    }

    /// Returns `true` if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.id_token.is_none()
            && self.account.is_none()
    }
}
