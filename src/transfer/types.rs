//! Transfer Core Types
//!
//! Records and messages exchanged with the collaborator ports.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, TransactionId, UserId};

use super::error::TransferError;
use super::state::TransferState;

/// Platform account as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub account_number: String,
    pub user_id: UserId,
}

/// Platform user as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Contact handle (phone number) used for audit and notifications
    pub handle: String,
}

/// Whether a record was moved inside the platform or out to a partner bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum TransferKind {
    Internal = 1,
    External = 2,
}

impl TransferKind {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TransferKind::Internal),
            2 => Some(TransferKind::External),
            _ => None,
        }
    }
}

/// Transfer record owned by the [`TransferStore`](super::adapters::TransferStore)
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    /// Unique business key
    pub transaction_id: TransactionId,
    pub kind: TransferKind,
    pub sender_id: UserId,
    pub sender_account_number: String,
    /// None for external transfers (no local receiver)
    pub receiver_id: Option<UserId>,
    pub receiver_account_number: String,
    pub receiver_bank_code: Option<String>,
    /// Display name of the partner bank, used in audit and notifications
    pub receiver_bank_name: Option<String>,
    pub amount: Decimal,
    pub memo: String,
    pub state: TransferState,
    pub bank_transaction_id: Option<String>,
    /// Failure or timeout reason
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Create a new record in PENDING state
    pub fn pending(
        transaction_id: TransactionId,
        kind: TransferKind,
        sender_id: UserId,
        sender_account_number: impl Into<String>,
        receiver_id: Option<UserId>,
        receiver_account_number: impl Into<String>,
        amount: Decimal,
        memo: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            transaction_id,
            kind,
            sender_id,
            sender_account_number: sender_account_number.into(),
            receiver_id,
            receiver_account_number: receiver_account_number.into(),
            receiver_bank_code: None,
            receiver_bank_name: None,
            amount,
            memo: memo.into(),
            state: TransferState::Pending,
            bank_transaction_id: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_receiver_bank(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        self.receiver_bank_code = Some(code.into());
        self.receiver_bank_name = Some(name.into());
        self
    }

    /// Bank name for messages; falls back to the bank code
    pub fn receiver_bank_label(&self) -> &str {
        self.receiver_bank_name
            .as_deref()
            .or(self.receiver_bank_code.as_deref())
            .unwrap_or_default()
    }

    /// Move to `next`, enforcing the lifecycle table.
    ///
    /// Returns `false` when the record is already in `next` (nothing changed).
    pub fn transition(&mut self, next: TransferState) -> Result<bool, TransferError> {
        if !self.state.can_transition_to(next) {
            return Err(TransferError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        if self.state == next {
            return Ok(false);
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(true)
    }

    pub fn mark_processing(&mut self) -> Result<bool, TransferError> {
        self.transition(TransferState::Processing)
    }

    pub fn mark_completed(&mut self) -> Result<bool, TransferError> {
        self.transition(TransferState::Completed)
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<bool, TransferError> {
        let changed = self.transition(TransferState::Failed)?;
        if changed {
            self.reason = Some(reason.into());
        }
        Ok(changed)
    }

    pub fn mark_timeout(&mut self, reason: impl Into<String>) -> Result<bool, TransferError> {
        let changed = self.transition(TransferState::Timeout)?;
        self.reason = Some(reason.into());
        Ok(changed)
    }

    /// Park the record for out-of-band resolution
    pub fn mark_pending(&mut self) -> Result<bool, TransferError> {
        self.transition(TransferState::Pending)
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] {} -> {} amount={} state={}",
            self.transaction_id,
            self.sender_account_number,
            self.receiver_account_number,
            self.amount,
            self.state
        )
    }
}

/// Ledger journal entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerEntryKind {
    TransferOut,
    TransferIn,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::TransferOut => "TRANSFER_OUT",
            LedgerEntryKind::TransferIn => "TRANSFER_IN",
        }
    }
}

/// One atomic balance movement
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub account_number: String,
    pub amount: Decimal,
    pub kind: LedgerEntryKind,
    pub note: String,
    /// Pairs the debit and credit legs of one transfer
    pub transaction_id: TransactionId,
    pub actor_id: UserId,
}

/// Which side of a transfer a history query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferDirection {
    /// Sent or received
    #[default]
    Any,
    Sent,
    Received,
}

/// Offset/limit window over a newest-first listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 20;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    /// Window `index` (0-based) of `limit` items
    pub fn nth(index: usize, limit: usize) -> Self {
        Self {
            offset: index.saturating_mul(limit),
            limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(Self::DEFAULT_LIMIT)
    }
}

/// Audit event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    TransferSuccess,
    TransferFailed,
    TransferTimeout,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::TransferSuccess => "TRANSFER_SUCCESS",
            AuditEventType::TransferFailed => "TRANSFER_FAILED",
            AuditEventType::TransferTimeout => "TRANSFER_TIMEOUT",
        }
    }
}

/// One audit log line
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor_id: UserId,
    pub actor_handle: String,
    pub event_type: AuditEventType,
    pub description: String,
    pub detail: String,
    pub transaction_id: TransactionId,
}

/// Request sent to the partner bank gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankingRequest {
    pub transaction_id: TransactionId,
    pub sender_account_number: String,
    pub sender_bank_code: String,
    pub receiver_account_number: String,
    pub receiver_bank_code: String,
    pub amount: Decimal,
    pub currency: String,
    pub memo: String,
}

/// Gateway answer status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BankingStatus {
    Success,
    Pending,
    Timeout,
    Error,
}

impl BankingStatus {
    pub fn description(&self) -> &'static str {
        match self {
            BankingStatus::Success => "processed",
            BankingStatus::Pending => "in progress",
            BankingStatus::Timeout => "no answer in time",
            BankingStatus::Error => "rejected",
        }
    }
}

/// Gateway answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankingResponse {
    pub status: BankingStatus,
    pub bank_transaction_id: Option<String>,
    pub error_message: Option<String>,
}

impl BankingResponse {
    pub fn success(bank_transaction_id: impl Into<String>) -> Self {
        Self {
            status: BankingStatus::Success,
            bank_transaction_id: Some(bank_transaction_id.into()),
            error_message: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            status: BankingStatus::Pending,
            bank_transaction_id: None,
            error_message: None,
        }
    }

    pub fn timeout() -> Self {
        Self {
            status: BankingStatus::Timeout,
            bank_transaction_id: None,
            error_message: Some("gateway timed out".to_string()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: BankingStatus::Error,
            bank_transaction_id: None,
            error_message: Some(message.into()),
        }
    }
}
