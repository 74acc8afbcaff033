//! Authority alias resolution.
//!
//! A token obtained from one host of an authority is valid under every
//! equivalent host (regional endpoints, legacy domains). The cache therefore
//! reads with the full alias set of the request's authority.
//!
//! The resolver is an external collaborator: instance discovery over the
//! network lives outside this crate. [`StaticAliasResolver`] serves alias
//! groups from configuration.

use async_trait::async_trait;

use crate::CacheResult;
use crate::config::CacheConfig;
use crate::types::AuthorityInfo;

/// Alias groups of the public cloud authorities.
pub const WELL_KNOWN_AUTHORITY_ALIASES: &[&[&str]] = &[
    &[
        "login.microsoftonline.com",
        "login.windows.net",
        "login.microsoft.com",
        "sts.windows.net",
    ],
    &["login.partner.microsoftonline.cn", "login.chinacloudapi.cn"],
    &["login.microsoftonline.de"],
    &[
        "login.microsoftonline.us",
        "login.usgovcloudapi.net",
        "login-us.microsoftonline.com",
    ],
];

/// Metadata about an authority as known to instance discovery.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthorityMetadata {
    /// Every host equivalent to the authority, in preference order.
    pub aliases: Vec<String>,
}

impl AuthorityMetadata {
    /// Creates metadata from an alias list.
    #[must_use]
    pub fn from_aliases(aliases: Vec<String>) -> Self {
        Self { aliases }
    }
}

/// Resolves the alias set of an authority.
#[async_trait]
pub trait AliasResolver: Send + Sync {
    /// Returns the metadata entry for `authority`.
    ///
    /// # Errors
    ///
    /// Returns `AliasResolution` if discovery fails. The cache manager
    /// propagates this error verbatim.
    async fn metadata_entry(&self, authority: &AuthorityInfo) -> CacheResult<AuthorityMetadata>;
}

/// Resolves aliases from a fixed set of host groups.
///
/// A host found in a group resolves to the whole group. An unknown host
/// resolves to itself alone, and an empty host to no aliases at all.
#[derive(Debug, Clone, Default)]
pub struct StaticAliasResolver {
    groups: Vec<Vec<String>>,
}

impl StaticAliasResolver {
    /// Creates a resolver over the given alias groups.
    #[must_use]
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        Self { groups }
    }

    /// Creates a resolver from the configured alias groups.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.authority_aliases.clone())
    }

    /// Returns the aliases of `host`.
    #[must_use]
    pub fn aliases_of(&self, host: &str) -> Vec<String> {
        if host.is_empty() {
            return Vec::new();
        }
        self.groups
            .iter()
            .find(|group| group.iter().any(|alias| alias.eq_ignore_ascii_case(host)))
            .cloned()
            .unwrap_or_else(|| vec![host.to_string()])
    }
}

#[async_trait]
impl AliasResolver for StaticAliasResolver {
    async fn metadata_entry(&self, authority: &AuthorityInfo) -> CacheResult<AuthorityMetadata> {
        let aliases = self.aliases_of(&authority.host);
        tracing::trace!(
            authority = %authority.host,
            aliases = ?aliases,
            "Resolved authority aliases"
        );
        Ok(AuthorityMetadata::from_aliases(aliases))
    }
}
