//! Composite key model.
//!
//! Every cached entity is addressed by a tuple of identity fields. Lookups
//! carry the full *set* of authority aliases rather than a single host,
//! because an entry may have been written under any alias of the authority.
//!
//! Each key reports which of its required fields are empty through
//! `missing_fields()`. The cache manager refuses to touch storage while that
//! list is non-empty.

use std::collections::BTreeSet;

/// Names of the fields in `fields` whose value is empty.
pub(crate) fn empty_fields(fields: &[(&'static str, bool)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, empty)| *empty)
        .map(|(name, _)| *name)
        .collect()
}

/// Joins scopes into a cache target.
#[must_use]
pub fn concatenate_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits a cache target into lowercase scopes, sorted and deduplicated.
///
/// Two targets granting the same scopes in a different order or case parse
/// to the same set.
#[must_use]
pub fn parse_scopes(target: &str) -> BTreeSet<String> {
    target
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Position of `environment` in `aliases`, or `None` if it is not an alias.
///
/// Hosts compare case-insensitively. A lower position is more preferred.
#[must_use]
pub fn alias_rank<S: AsRef<str>>(aliases: &[S], environment: &str) -> Option<usize> {
    aliases
        .iter()
        .position(|alias| alias.as_ref().eq_ignore_ascii_case(environment))
}

/// Returns `true` if `environment` is one of `aliases`.
#[must_use]
pub fn environment_matches<S: AsRef<str>>(aliases: &[S], environment: &str) -> bool {
    alias_rank(aliases, environment).is_some()
}

/// Lookup key for an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenKey {
    /// Home account id.
    pub home_account_id: String,
    /// Every alias of the authority.
    pub environments: Vec<String>,
    /// Tenant.
    pub realm: String,
    /// Client id.
    pub client_id: String,
    /// Requested scopes, passed to storage unmodified.
    pub scopes: Vec<String>,
}

impl AccessTokenKey {
    /// Returns the names of empty required fields.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        empty_fields(&[
            ("home_account_id", self.home_account_id.is_empty()),
            ("environments", self.environments.is_empty()),
            ("realm", self.realm.is_empty()),
            ("client_id", self.client_id.is_empty()),
            ("scopes", self.scopes.is_empty()),
        ])
    }
}

/// Lookup key for an ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTokenKey {
    /// Home account id.
    pub home_account_id: String,
    /// Every alias of the authority.
    pub environments: Vec<String>,
    /// Tenant.
    pub realm: String,
    /// Client id.
    pub client_id: String,
}

impl IdTokenKey {
    /// Returns the names of empty required fields.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        empty_fields(&[
            ("home_account_id", self.home_account_id.is_empty()),
            ("environments", self.environments.is_empty()),
            ("realm", self.realm.is_empty()),
            ("client_id", self.client_id.is_empty()),
        ])
    }
}

/// Which refresh tokens a [`RefreshTokenKey`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenScope<'a> {
    /// Tokens shared by the family, whichever client wrote them.
    Family(&'a str),
    /// Tokens issued to this client only.
    Client(&'a str),
}

/// Lookup key for a refresh token.
///
/// When a family id is present it takes precedence over the client id, so a
/// token written by a sibling client in the same family is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenKey {
    /// Home account id.
    pub home_account_id: String,
    /// Every alias of the authority.
    pub environments: Vec<String>,
    /// Client id.
    pub client_id: String,
    /// Family id resolved from app metadata.
    pub family_id: Option<String>,
}

impl RefreshTokenKey {
    /// Returns the scope this key selects.
    #[must_use]
    pub fn scope(&self) -> RefreshTokenScope<'_> {
        match self.family_id.as_deref() {
            Some(family) if !family.is_empty() => RefreshTokenScope::Family(family),
            _ => RefreshTokenScope::Client(&self.client_id),
        }
    }

    /// Returns the names of empty required fields.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        empty_fields(&[
            ("home_account_id", self.home_account_id.is_empty()),
            ("environments", self.environments.is_empty()),
            ("client_id", self.client_id.is_empty()),
        ])
    }
}

/// Lookup key for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    /// Home account id.
    pub home_account_id: String,
    /// Every alias of the authority.
    pub environments: Vec<String>,
    /// Tenant.
    pub realm: String,
}

impl AccountKey {
    /// Returns the names of empty required fields.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        empty_fields(&[
            ("home_account_id", self.home_account_id.is_empty()),
            ("environments", self.environments.is_empty()),
            ("realm", self.realm.is_empty()),
        ])
    }
}

/// Lookup key for app metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppMetadataKey {
    /// Every alias of the authority.
    pub environments: Vec<String>,
    /// Client id.
    pub client_id: String,
}

impl AppMetadataKey {
    /// Returns the names of empty required fields.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        empty_fields(&[
            ("environments", self.environments.is_empty()),
            ("client_id", self.client_id.is_empty()),
        ])
    }
}
