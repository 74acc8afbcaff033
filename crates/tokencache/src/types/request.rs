//! In-flight authentication request parameters.

use url::Url;

use crate::CacheResult;
use crate::error::CacheError;
use crate::types::account::AuthorityType;

/// Parsed authority of an authentication request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityInfo {
    /// Authority host, e.g. `login.contoso.com`. Used as the cache environment.
    pub host: String,

    /// Tenant segment of the authority. Used as the cache realm.
    pub realm: String,

    /// Kind of authority.
    pub authority_type: AuthorityType,

    /// Normalized authority URI (`https://{host}/{realm}/`).
    pub canonical_authority_uri: String,
}

impl AuthorityInfo {
    /// Creates authority information from its parts.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        realm: impl Into<String>,
        authority_type: AuthorityType,
    ) -> Self {
        let host = host.into().to_ascii_lowercase();
        let realm = realm.into();
        let canonical_authority_uri = format!("https://{host}/{realm}/");
        Self {
            host,
            realm,
            authority_type,
            canonical_authority_uri,
        }
    }

    /// Parses an authority URI such as `https://login.contoso.com/contoso.onmicrosoft.com`.
    ///
    /// The first path segment is the tenant. A tenant of `adfs` selects
    /// [`AuthorityType::Adfs`]; a `tfp/{tenant}/{policy}` path selects
    /// [`AuthorityType::B2c`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidAuthority` if the URI cannot be parsed, is not HTTPS,
    /// has no host or has no tenant segment.
    pub fn parse(authority: &str) -> CacheResult<Self> {
        let url = Url::parse(authority)
            .map_err(|e| CacheError::invalid_authority(authority, e.to_string()))?;

        if url.scheme() != "https" {
            return Err(CacheError::invalid_authority(
                authority,
                format!("scheme {} is not allowed (only HTTPS)", url.scheme()),
            ));
        }

        let host = url
            .host_str()
            .ok_or_else(|| CacheError::invalid_authority(authority, "missing host"))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let (realm, authority_type) = match segments.as_slice() {
            [] => return Err(CacheError::invalid_authority(authority, "missing tenant")),
            ["tfp", tenant, ..] => (*tenant, AuthorityType::B2c),
            [tenant, ..] if tenant.eq_ignore_ascii_case("adfs") => (*tenant, AuthorityType::Adfs),
            [tenant, ..] => (*tenant, AuthorityType::Aad),
        };

        Ok(Self::new(host, realm, authority_type))
    }
}

/// Parameters of the authentication request the cache is consulted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthParameters {
    /// The authority the request is made against.
    pub authority_info: AuthorityInfo,

    /// The client application.
    pub client_id: String,

    /// Requested scopes.
    pub scopes: Vec<String>,

    /// Home account of the signed-in user; empty before the first sign-in.
    pub home_account_id: String,

    /// Correlation id forwarded to the storage port on deletions.
    pub correlation_id: String,
}

impl AuthParameters {
    /// Creates request parameters with no scopes and no account.
    #[must_use]
    pub fn new(authority_info: AuthorityInfo, client_id: impl Into<String>) -> Self {
        Self {
            authority_info,
            client_id: client_id.into(),
            scopes: Vec::new(),
            home_account_id: String::new(),
            correlation_id: String::new(),
        }
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the home account id.
    #[must_use]
    pub fn with_home_account_id(mut self, home_account_id: impl Into<String>) -> Self {
        self.home_account_id = home_account_id.into();
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}
