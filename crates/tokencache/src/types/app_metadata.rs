//! Per-client app metadata.

use serde::{Deserialize, Serialize};

/// Maps a client id to the refresh token family it belongs to.
///
/// Written once per (client id, environment) on every successful token
/// write, and read before a refresh token lookup so family-shared tokens are
/// found under the family id rather than the client id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// The client application.
    pub client_id: String,

    /// Authority host.
    pub environment: String,

    /// Family the client belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
}

impl AppMetadata {
    /// Creates a new app metadata record.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        environment: impl Into<String>,
        family_id: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            environment: environment.into(),
            family_id,
        }
    }

    /// Returns the family id, treating an empty string as no family.
    #[must_use]
    pub fn family(&self) -> Option<&str> {
        self.family_id.as_deref().filter(|f| !f.is_empty())
    }
}
