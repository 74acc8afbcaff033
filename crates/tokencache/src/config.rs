//! Token cache configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! expiry_buffer = "5m"
//! write_mode = "atomic_when_supported"
//! authority_aliases = [
//!     ["login.contoso.com", "login.contoso.net"],
//! ]
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CacheResult;
use crate::authority::WELL_KNOWN_AUTHORITY_ALIASES;
use crate::error::CacheError;
use crate::validity::DEFAULT_EXPIRY_BUFFER_SECS;

/// How the cache manager commits the entities of one token response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Write each entity independently, stopping at the first failure.
    /// Entities written before the failure stay committed.
    #[default]
    BestEffort,
    /// Commit all entities in one batch when the storage port supports
    /// atomic batches; fall back to best effort otherwise.
    AtomicWhenSupported,
}

/// Token cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Access tokens expiring within this window are treated as expired.
    #[serde(with = "humantime_serde")]
    pub expiry_buffer: Duration,

    /// How token responses are committed.
    pub write_mode: WriteMode,

    /// Groups of equivalent authority hosts, used by
    /// [`StaticAliasResolver`](crate::authority::StaticAliasResolver).
    pub authority_aliases: Vec<Vec<String>>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            expiry_buffer: Duration::from_secs(DEFAULT_EXPIRY_BUFFER_SECS.unsigned_abs()),
            write_mode: WriteMode::default(),
            authority_aliases: WELL_KNOWN_AUTHORITY_ALIASES
                .iter()
                .map(|group| group.iter().map(|host| (*host).to_string()).collect())
                .collect(),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expiry buffer.
    #[must_use]
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Sets the write mode.
    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Adds a group of equivalent authority hosts.
    #[must_use]
    pub fn with_alias_group<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authority_aliases
            .push(hosts.into_iter().map(Into::into).collect());
        self
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the document is not valid TOML, has fields
    /// of the wrong type, or fails [`validate`](Self::validate).
    pub fn from_toml_str(content: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CacheError::configuration(format!("Invalid cache config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded token cache configuration");
        Ok(config)
    }

    /// Checks that alias groups are non-empty and disjoint.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` describing the first problem found.
    pub fn validate(&self) -> CacheResult<()> {
        let mut seen = HashSet::new();

        for (index, group) in self.authority_aliases.iter().enumerate() {
            if group.is_empty() {
                return Err(CacheError::configuration(format!(
                    "authority_aliases[{index}] is empty"
                )));
            }
            for host in group {
                if host.trim().is_empty() {
                    return Err(CacheError::configuration(format!(
                        "authority_aliases[{index}] contains an empty host"
                    )));
                }
                if !seen.insert(host.to_ascii_lowercase()) {
                    return Err(CacheError::configuration(format!(
                        "host {host} appears in more than one alias group"
                    )));
                }
            }
        }

        Ok(())
    }
}
