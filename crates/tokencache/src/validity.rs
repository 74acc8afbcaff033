//! Access token validity evaluation.
//!
//! A cached access token may be handed to a caller only if:
//!
//! - `cached_at` and `expires_on` parse as integers (seconds since epoch)
//! - `cached_at` is not in the future
//! - `expires_on` is later than now plus a safety buffer (5 minutes by default)
//!
//! The check fails closed: anything unparsable is invalid.

use std::fmt;
use std::time::Duration;

use time::OffsetDateTime;

use crate::types::AccessTokenCacheItem;

/// Default expiry safety buffer, in seconds.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 300;

/// Why a cached access token was judged unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidReason {
    /// `cached_at` is not an integer.
    MalformedCachedAt,
    /// `cached_at` is later than the current time.
    CachedInFuture,
    /// `expires_on` is not an integer.
    MalformedExpiresOn,
    /// `expires_on` falls within the expiry buffer.
    Expired,
}

impl InvalidReason {
    /// Returns a short machine-friendly name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedCachedAt => "malformed_cached_at",
            Self::CachedInFuture => "cached_in_future",
            Self::MalformedExpiresOn => "malformed_expires_on",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCachedAt | Self::CachedInFuture => {
                write!(f, "access token was cached at an invalid time")
            }
            Self::MalformedExpiresOn => write!(f, "access token expires at an invalid time"),
            Self::Expired => write!(f, "access token is expired"),
        }
    }
}

/// Judges cached access tokens against a clock and an expiry buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityEvaluator {
    buffer_secs: i64,
}

impl Default for ValidityEvaluator {
    fn default() -> Self {
        Self {
            buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
        }
    }
}

impl ValidityEvaluator {
    /// Creates an evaluator with the given expiry buffer.
    #[must_use]
    pub fn new(buffer: Duration) -> Self {
        Self {
            buffer_secs: i64::try_from(buffer.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// Returns the expiry buffer in seconds.
    #[must_use]
    pub fn buffer_secs(&self) -> i64 {
        self.buffer_secs
    }

    /// Evaluates a token, returning the first reason it is unusable.
    pub fn evaluate(
        &self,
        token: &AccessTokenCacheItem,
        now: OffsetDateTime,
    ) -> Result<(), InvalidReason> {
        let now = now.unix_timestamp();

        let cached_at = token
            .cached_at_unix()
            .ok_or(InvalidReason::MalformedCachedAt)?;
        if cached_at > now {
            return Err(InvalidReason::CachedInFuture);
        }

        let expires_on = token
            .expires_on_unix()
            .ok_or(InvalidReason::MalformedExpiresOn)?;
        if expires_on <= now.saturating_add(self.buffer_secs) {
            return Err(InvalidReason::Expired);
        }

        Ok(())
    }

    /// Returns `true` if the token may be returned to a caller.
    #[must_use]
    pub fn is_valid(&self, token: &AccessTokenCacheItem, now: OffsetDateTime) -> bool {
        self.evaluate(token, now).is_ok()
    }
}

/// Checks a token against the current time with the default 5-minute buffer.
#[must_use]
pub fn is_access_token_valid(token: &AccessTokenCacheItem) -> bool {
    ValidityEvaluator::default().is_valid(token, OffsetDateTime::now_utc())
}
