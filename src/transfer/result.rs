//! Action outcomes
//!
//! [`ActionResult`] is an immutable snapshot of one execution: the status is
//! fixed when the value is built and there are no setters. [`Verdict`] is the
//! outcome of `validate`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::core_types::TransactionId;

/// Machine-readable result codes
pub mod codes {
    pub const OK: &str = "OK";
    pub const PENDING: &str = "PENDING";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const EXTERNAL_API_ERROR: &str = "EXTERNAL_API_ERROR";
    pub const EXTERNAL_TRANSFER_ERROR: &str = "EXTERNAL_TRANSFER_ERROR";
    pub const INTERNAL_TRANSFER_ERROR: &str = "INTERNAL_TRANSFER_ERROR";
    pub const PIN_SESSION_EXPIRED: &str = "PIN_SESSION_EXPIRED";
    pub const SYSTEM_ERROR: &str = "SYSTEM_ERROR";
}

/// Status of an action execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionStatus {
    Success,
    Failure,
    Pending,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "SUCCESS",
            ActionStatus::Failure => "FAILURE",
            ActionStatus::Pending => "PENDING",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Free-form key/value payload attached to a result
pub type Payload = BTreeMap<String, Value>;

/// Outcome of one action execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    status: ActionStatus,
    code: &'static str,
    message: String,
    payload: Payload,
    transaction_id: TransactionId,
    bank_transaction_id: Option<String>,
}

impl ActionResult {
    pub fn success(
        transaction_id: TransactionId,
        message: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            status: ActionStatus::Success,
            code: codes::OK,
            message: message.into(),
            payload,
            transaction_id,
            bank_transaction_id: None,
        }
    }

    pub fn failure(
        transaction_id: TransactionId,
        code: &'static str,
        message: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            status: ActionStatus::Failure,
            code,
            message: message.into(),
            payload,
            transaction_id,
            bank_transaction_id: None,
        }
    }

    pub fn pending(
        transaction_id: TransactionId,
        message: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            status: ActionStatus::Pending,
            code: codes::PENDING,
            message: message.into(),
            payload,
            transaction_id,
            bank_transaction_id: None,
        }
    }

    /// Pending result whose ambiguity comes from a gateway timeout
    pub fn timeout(
        transaction_id: TransactionId,
        message: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            code: codes::TIMEOUT,
            ..Self::pending(transaction_id, message, payload)
        }
    }

    /// Business-rule rejection reported by `validate`
    pub fn rejected(transaction_id: TransactionId, reason: &RejectReason) -> Self {
        let mut payload = Payload::new();
        payload.insert("reason".into(), Value::from(reason.to_string()));
        Self::failure(transaction_id, reason.code(), reason.to_string(), payload)
    }

    /// Same snapshot carrying the partner bank's own transaction id
    pub fn with_bank_transaction_id(self, bank_transaction_id: Option<String>) -> Self {
        Self {
            bank_transaction_id,
            ..self
        }
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn bank_transaction_id(&self) -> Option<&str> {
        self.bank_transaction_id.as_deref()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        self.status == ActionStatus::Failure
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.status == ActionStatus::Pending
    }

    /// Pending because the gateway timed out (record goes to TIMEOUT)
    #[inline]
    pub fn is_timeout(&self) -> bool {
        self.is_pending() && self.code == codes::TIMEOUT
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.status, self.transaction_id, self.code, self.message
        )
    }
}

/// Why `validate` refused a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidAmount,
    MissingField(&'static str),
    SelfTransfer,
    SenderAccountNotFound(String),
    ReceiverAccountNotFound(String),
    NotAccountOwner { user_id: u64, account_number: String },
    InsufficientFunds(String),
    PinSessionMissing,
    PinSessionInvalid,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::InvalidAmount => "INVALID_AMOUNT",
            RejectReason::MissingField(_) => "INVALID_REQUEST",
            RejectReason::SelfTransfer => "SELF_TRANSFER",
            RejectReason::SenderAccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            RejectReason::ReceiverAccountNotFound(_) => "INVALID_ACCOUNT_NUMBER",
            RejectReason::NotAccountOwner { .. } => "NOT_ACCOUNT_OWNER",
            RejectReason::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            RejectReason::PinSessionMissing => "PIN_SESSION_REQUIRED",
            RejectReason::PinSessionInvalid => "PIN_SESSION_INVALID",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidAmount => write!(f, "Amount must be greater than zero"),
            RejectReason::MissingField(field) => write!(f, "Missing required field: {}", field),
            RejectReason::SelfTransfer => write!(f, "Sender and receiver are the same user"),
            RejectReason::SenderAccountNotFound(n) => write!(f, "Sender account not found: {}", n),
            RejectReason::ReceiverAccountNotFound(n) => {
                write!(f, "Receiver account not found: {}", n)
            }
            RejectReason::NotAccountOwner {
                user_id,
                account_number,
            } => write!(f, "User {} does not own account {}", user_id, account_number),
            RejectReason::InsufficientFunds(n) => write!(f, "Insufficient balance on {}", n),
            RejectReason::PinSessionMissing => write!(f, "PIN session token is required"),
            RejectReason::PinSessionInvalid => write!(f, "PIN session is invalid or expired"),
        }
    }
}

/// Outcome of `validate`: `Accept` is a pass, `Reject` a business-rule failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}
