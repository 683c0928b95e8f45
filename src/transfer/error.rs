//! Transfer Error Types
//!
//! Raised errors only. Ordinary business outcomes travel as
//! [`ActionResult`](super::result::ActionResult) values and business-rule
//! rejections as [`RejectReason`](super::result::RejectReason).

use thiserror::Error;

use super::command::CommandKind;
use super::state::TransferState;

/// Transfer error types
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Malformed Input ===
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Action {action} cannot handle a {actual} command")]
    CommandMismatch {
        action: &'static str,
        actual: CommandKind,
    },

    // === Configuration ===
    #[error("No action registered for command kind {0}")]
    UnsupportedCommand(CommandKind),

    #[error("Command kind {0} is claimed by more than one action")]
    DuplicateAction(CommandKind),

    // === Missing References ===
    #[error("User not found: {0}")]
    UserNotFound(u64),

    #[error("No user with handle {0}")]
    UnknownHandle(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    // === Record Lifecycle ===
    #[error("Transfer already recorded: {0}")]
    DuplicateTransaction(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: TransferState,
        to: TransferState,
    },

    // === Ledger / Gateway ===
    #[error("Insufficient balance on {0}")]
    InsufficientBalance(String),

    #[error("Ledger error: {0}")]
    LedgerError(String),

    #[error("Banking gateway error: {0}")]
    GatewayError(String),

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),

    /// Surfaced by the processor after an unexpected fault was converted
    /// into a failure result and reconciled.
    #[error("Transaction {transaction_id} failed: {cause}")]
    TransactionFailed {
        transaction_id: String,
        code: &'static str,
        cause: String,
    },
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::MalformedCommand(_) => "INVALID_REQUEST",
            TransferError::CommandMismatch { .. } => "COMMAND_MISMATCH",
            TransferError::UnsupportedCommand(_) => "UNSUPPORTED_COMMAND",
            TransferError::DuplicateAction(_) => "DUPLICATE_ACTION",
            TransferError::UserNotFound(_) | TransferError::UnknownHandle(_) => "MEMBER_NOT_FOUND",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::TransferNotFound(_) => "TRANSACTION_NOT_FOUND",
            TransferError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            TransferError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            TransferError::InsufficientBalance(_) => "INSUFFICIENT_FUNDS",
            TransferError::LedgerError(_) => "LEDGER_ERROR",
            TransferError::GatewayError(_) => "EXTERNAL_API_ERROR",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
            TransferError::SystemError(_) => "SYSTEM_ERROR",
            TransferError::TransactionFailed { .. } => "TRANSACTION_FAILED",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::MalformedCommand(_) | TransferError::CommandMismatch { .. } => 400,
            TransferError::UserNotFound(_)
            | TransferError::UnknownHandle(_)
            | TransferError::AccountNotFound(_)
            | TransferError::TransferNotFound(_) => 404,
            TransferError::DuplicateTransaction(_) => 409,
            TransferError::InsufficientBalance(_) | TransferError::TransactionFailed { .. } => 422,
            TransferError::GatewayError(_) => 502,
            TransferError::UnsupportedCommand(_)
            | TransferError::DuplicateAction(_)
            | TransferError::InvalidStateTransition { .. }
            | TransferError::LedgerError(_)
            | TransferError::DatabaseError(_)
            | TransferError::SystemError(_) => 500,
        }
    }

    /// Configuration errors are never swallowed into a result.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TransferError::UnsupportedCommand(_) | TransferError::DuplicateAction(_)
        )
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::DatabaseError(e.to_string())
    }
}

impl From<anyhow::Error> for TransferError {
    fn from(e: anyhow::Error) -> Self {
        TransferError::SystemError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TransferError::InsufficientBalance("A-100".into()).code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(
            TransferError::UnsupportedCommand(CommandKind::Secure).code(),
            "UNSUPPORTED_COMMAND"
        );
        assert_eq!(TransferError::GatewayError("x".into()).code(), "EXTERNAL_API_ERROR");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::MalformedCommand("x".into()).http_status(), 400);
        assert_eq!(TransferError::TransferNotFound("TXN1".into()).http_status(), 404);
        assert_eq!(
            TransferError::DuplicateTransaction("TXN1".into()).http_status(),
            409
        );
        assert_eq!(TransferError::SystemError("test".into()).http_status(), 500);
    }

    #[test]
    fn test_display() {
        let err = TransferError::InvalidStateTransition {
            from: TransferState::Completed,
            to: TransferState::Pending,
        };
        assert_eq!(err.to_string(), "Invalid state transition: COMPLETED -> PENDING");
    }

    #[test]
    fn test_configuration_errors() {
        assert!(TransferError::DuplicateAction(CommandKind::Internal).is_configuration());
        assert!(!TransferError::SystemError("x".into()).is_configuration());
    }
}
