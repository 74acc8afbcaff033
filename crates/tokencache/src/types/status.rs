//! Storage operation status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome class reported by the storage port for a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatusType {
    /// The operation completed.
    #[default]
    Success,
    /// The operation failed and should not be retried.
    Failure,
    /// The operation failed transiently.
    Retriable,
}

/// Status reported by [`CacheStorage::delete_credentials`](crate::storage::CacheStorage::delete_credentials).
///
/// The cache manager only branches on [`is_success`](Self::is_success); code
/// and message are carried for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationStatus {
    /// Outcome class.
    pub status_type: OperationStatusType,

    /// Platform-specific status code.
    #[serde(default)]
    pub code: i32,

    /// Human-readable description.
    #[serde(default)]
    pub message: String,
}

impl OperationStatus {
    /// A successful status.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// A failed status with a description.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status_type: OperationStatusType::Failure,
            code: 0,
            message: message.into(),
        }
    }

    /// A transient failure with a description.
    #[must_use]
    pub fn retriable(message: impl Into<String>) -> Self {
        Self {
            status_type: OperationStatusType::Retriable,
            code: 0,
            message: message.into(),
        }
    }

    /// Sets the status code.
    #[must_use]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Returns `true` if the storage port reported success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_type == OperationStatusType::Success
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self.status_type, self.code)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}
