//! Core types used throughout the system
//!
//! Identifiers shared by the transfer engine and its collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// User ID - globally unique, immutable after assignment.
pub type UserId = u64;

/// Account ID - the stable identifier of a platform account.
///
/// # Constraints:
/// - **Immutable**: Once assigned, NEVER changes
/// - **Totally ordered**: Row locks are always taken in ascending `AccountId`
///   order, whatever the transfer direction
pub type AccountId = u64;

/// Transaction identifier - the business idempotency anchor of a transfer.
///
/// Opaque to the engine: it is generated and checked for uniqueness by the
/// request-facing service before a command is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A blank identifier cannot anchor a record.
    #[inline]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TransactionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
