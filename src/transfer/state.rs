//! Transfer Record State Definitions
//!
//! State IDs are stable so they can be stored as SMALLINT.

use std::fmt;

/// Lifecycle of a transfer record
///
/// ```text
/// PENDING → PROCESSING → COMPLETED
///    ↓          ↓  ↘
///  FAILED    FAILED  PENDING / TIMEOUT ──(reconciliation)──→ COMPLETED | FAILED
/// ```
///
/// Terminal states: COMPLETED (30), FAILED (-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum TransferState {
    /// Record written by `save_pending`, funds untouched
    Pending = 0,

    /// `execute` has started
    Processing = 10,

    /// Terminal: money moved (or handed to the partner bank)
    Completed = 30,

    /// Terminal: nothing moved
    Failed = -10,

    /// Gateway did not answer in time, outcome unknown
    Timeout = -20,
}

impl TransferState {
    /// Check if this is a terminal state (record is immutable from here)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed)
    }

    /// Pending/Timeout records are waiting for an out-of-band answer
    #[inline]
    pub fn is_unsettled(&self) -> bool {
        matches!(self, TransferState::Pending | TransferState::Timeout)
    }

    /// Whether `self -> next` is an allowed transition.
    ///
    /// Re-applying the current state of a non-terminal record is allowed,
    /// and so is re-applying a terminal state onto itself (a no-op).
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        use TransferState::*;

        if *self == next {
            return true;
        }

        match self {
            Pending => matches!(next, Processing | Failed | Completed | Timeout),
            Processing => matches!(next, Completed | Failed | Pending | Timeout),
            Timeout => matches!(next, Completed | Failed | Pending),
            Completed | Failed => false,
        }
    }

    /// Get the numeric state ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from storage state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferState::Pending),
            10 => Some(TransferState::Processing),
            30 => Some(TransferState::Completed),
            -10 => Some(TransferState::Failed),
            -20 => Some(TransferState::Timeout),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Pending => "PENDING",
            TransferState::Processing => "PROCESSING",
            TransferState::Completed => "COMPLETED",
            TransferState::Failed => "FAILED",
            TransferState::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferState::from_id(value).ok_or(())
    }
}
