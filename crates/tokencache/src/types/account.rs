//! Cached account records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of authority an account signed in through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AuthorityType {
    /// Multi-tenant cloud directory.
    #[default]
    #[serde(rename = "MSSTS")]
    Aad,
    /// On-premises federation server.
    #[serde(rename = "ADFS")]
    Adfs,
    /// Business-to-consumer tenant with user flows.
    #[serde(rename = "B2C")]
    B2c,
    /// Any other OpenID Connect provider.
    #[serde(rename = "Generic")]
    Generic,
}

impl AuthorityType {
    /// Returns the authority type as it appears in persisted caches.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aad => "MSSTS",
            Self::Adfs => "ADFS",
            Self::B2c => "B2C",
            Self::Generic => "Generic",
        }
    }
}

impl fmt::Display for AuthorityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed-in account.
///
/// There is one account per (home account id, environment, realm).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identifier of the user across clients and tenants.
    pub home_account_id: String,

    /// Authority host the account signed in through.
    pub environment: String,

    /// Tenant of this account record.
    pub realm: String,

    /// Object id of the user inside `realm`.
    pub local_account_id: String,

    /// Kind of authority.
    pub authority_type: AuthorityType,

    /// Preferred username from the ID token, if the provider sent one.
    pub username: String,
}

impl Account {
    /// Creates a new account record.
    #[must_use]
    pub fn new(
        home_account_id: impl Into<String>,
        environment: impl Into<String>,
        realm: impl Into<String>,
        local_account_id: impl Into<String>,
        authority_type: AuthorityType,
        username: impl Into<String>,
    ) -> Self {
        Self {
            home_account_id: home_account_id.into(),
            environment: environment.into(),
            realm: realm.into(),
            local_account_id: local_account_id.into(),
            authority_type,
            username: username.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_type_serialization() {
        assert_eq!(
            serde_json::to_string(&AuthorityType::Aad).unwrap(),
            "\"MSSTS\""
        );
        let parsed: AuthorityType = serde_json::from_str("\"ADFS\"").unwrap();
        assert_eq!(parsed, AuthorityType::Adfs);
        assert_eq!(AuthorityType::B2c.to_string(), "B2C");
    }

    #[test]
    fn test_account_serialization() {
        let account = Account::new(
            "uid.utid",
            "login.contoso.com",
            "contoso",
            "oid-1",
            AuthorityType::Aad,
            "user@contoso.com",
        );

        let json = serde_json::to_string(&account).unwrap();
        let deserialized: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(account, deserialized);
        assert!(json.contains("\"authority_type\":\"MSSTS\""));
    }
}
