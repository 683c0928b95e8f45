//! Transfer Commands
//!
//! Immutable descriptions of a requested transfer. One variant per transfer
//! kind; the kind tag is what the resolver dispatches on.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{TransactionId, UserId};

use super::error::TransferError;

/// Dispatch tag of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Internal,
    External,
    Secure,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Internal => "INTERNAL",
            CommandKind::External => "EXTERNAL",
            CommandKind::Secure => "SECURE",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transfer between two platform accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalTransfer {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub sender_account_number: String,
    pub receiver_account_number: String,
    pub amount: Decimal,
    pub memo: String,
    pub transaction_id: TransactionId,
}

/// Transfer from a platform account to a partner bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTransfer {
    pub sender_id: UserId,
    pub sender_account_number: String,
    pub receiver_account_number: String,
    pub receiver_bank_code: String,
    pub receiver_bank_name: String,
    pub amount: Decimal,
    pub memo: String,
    pub transaction_id: TransactionId,
}

/// PIN-gated transfer, internal or external depending on `is_external`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureTransfer {
    pub sender_id: UserId,
    /// Required when `is_external` is false
    pub receiver_id: Option<UserId>,
    pub sender_account_number: String,
    pub receiver_account_number: String,
    pub amount: Decimal,
    pub memo: String,
    pub transaction_id: TransactionId,
    pub pin_session_token: String,
    pub is_external: bool,
    /// Present only when `is_external` is true
    pub receiver_bank_code: Option<String>,
    pub receiver_bank_name: Option<String>,
}

impl SecureTransfer {
    /// Equivalent internal command
    pub fn to_internal(&self) -> Result<InternalTransfer, TransferError> {
        if self.is_external {
            return Err(TransferError::MalformedCommand(format!(
                "secure transfer {} is external",
                self.transaction_id
            )));
        }
        let receiver_id = self.receiver_id.ok_or_else(|| {
            TransferError::MalformedCommand(format!(
                "secure transfer {} has no receiver id",
                self.transaction_id
            ))
        })?;

        Ok(InternalTransfer {
            sender_id: self.sender_id,
            receiver_id,
            sender_account_number: self.sender_account_number.clone(),
            receiver_account_number: self.receiver_account_number.clone(),
            amount: self.amount,
            memo: self.memo.clone(),
            transaction_id: self.transaction_id.clone(),
        })
    }

    /// Equivalent external command; `default_bank_name` is used when the
    /// command does not carry a display name for the receiver bank.
    pub fn to_external(&self, default_bank_name: &str) -> Result<ExternalTransfer, TransferError> {
        if !self.is_external {
            return Err(TransferError::MalformedCommand(format!(
                "secure transfer {} is internal",
                self.transaction_id
            )));
        }
        let receiver_bank_code = self.receiver_bank_code.clone().ok_or_else(|| {
            TransferError::MalformedCommand(format!(
                "secure transfer {} has no receiver bank code",
                self.transaction_id
            ))
        })?;

        Ok(ExternalTransfer {
            sender_id: self.sender_id,
            sender_account_number: self.sender_account_number.clone(),
            receiver_account_number: self.receiver_account_number.clone(),
            receiver_bank_code,
            receiver_bank_name: self
                .receiver_bank_name
                .clone()
                .unwrap_or_else(|| default_bank_name.to_string()),
            amount: self.amount,
            memo: self.memo.clone(),
            transaction_id: self.transaction_id.clone(),
        })
    }
}

/// Any transfer command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferCommand {
    Internal(InternalTransfer),
    External(ExternalTransfer),
    Secure(SecureTransfer),
}

impl TransferCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            TransferCommand::Internal(_) => CommandKind::Internal,
            TransferCommand::External(_) => CommandKind::External,
            TransferCommand::Secure(_) => CommandKind::Secure,
        }
    }

    pub fn transaction_id(&self) -> &TransactionId {
        match self {
            TransferCommand::Internal(c) => &c.transaction_id,
            TransferCommand::External(c) => &c.transaction_id,
            TransferCommand::Secure(c) => &c.transaction_id,
        }
    }

    pub fn sender_id(&self) -> UserId {
        match self {
            TransferCommand::Internal(c) => c.sender_id,
            TransferCommand::External(c) => c.sender_id,
            TransferCommand::Secure(c) => c.sender_id,
        }
    }

    pub fn sender_account_number(&self) -> &str {
        match self {
            TransferCommand::Internal(c) => &c.sender_account_number,
            TransferCommand::External(c) => &c.sender_account_number,
            TransferCommand::Secure(c) => &c.sender_account_number,
        }
    }

    pub fn receiver_account_number(&self) -> &str {
        match self {
            TransferCommand::Internal(c) => &c.receiver_account_number,
            TransferCommand::External(c) => &c.receiver_account_number,
            TransferCommand::Secure(c) => &c.receiver_account_number,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            TransferCommand::Internal(c) => c.amount,
            TransferCommand::External(c) => c.amount,
            TransferCommand::Secure(c) => c.amount,
        }
    }
}

impl From<InternalTransfer> for TransferCommand {
    fn from(c: InternalTransfer) -> Self {
        TransferCommand::Internal(c)
    }
}

impl From<ExternalTransfer> for TransferCommand {
    fn from(c: ExternalTransfer) -> Self {
        TransferCommand::External(c)
    }
}

impl From<SecureTransfer> for TransferCommand {
    fn from(c: SecureTransfer) -> Self {
        TransferCommand::Secure(c)
    }
}

impl fmt::Display for TransferCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {} -> {} amount={}",
            self.kind(),
            self.transaction_id(),
            self.sender_account_number(),
            self.receiver_account_number(),
            self.amount()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secure(is_external: bool) -> SecureTransfer {
        SecureTransfer {
            sender_id: 1,
            receiver_id: if is_external { None } else { Some(2) },
            sender_account_number: "A-100".into(),
            receiver_account_number: "A-200".into(),
            amount: Decimal::from(2000),
            memo: "rent".into(),
            transaction_id: "TXN000000000001".into(),
            pin_session_token: "pin-token".into(),
            is_external,
            receiver_bank_code: is_external.then(|| "088".to_string()),
            receiver_bank_name: None,
        }
    }

    #[test]
    fn test_kind_and_common_fields() {
        let cmd = TransferCommand::from(secure(false));
        assert_eq!(cmd.kind(), CommandKind::Secure);
        assert_eq!(cmd.transaction_id().as_str(), "TXN000000000001");
        assert_eq!(cmd.sender_id(), 1);
        assert_eq!(cmd.amount(), Decimal::from(2000));
        assert_eq!(cmd.to_string(), "SECURE[TXN000000000001] A-100 -> A-200 amount=2000");
    }

    #[test]
    fn test_secure_to_internal() {
        let internal = secure(false).to_internal().unwrap();
        assert_eq!(internal.receiver_id, 2);
        assert_eq!(internal.transaction_id.as_str(), "TXN000000000001");

        assert!(secure(true).to_internal().is_err());
    }

    #[test]
    fn test_secure_internal_without_receiver_is_malformed() {
        let mut cmd = secure(false);
        cmd.receiver_id = None;
        assert!(matches!(
            cmd.to_internal(),
            Err(TransferError::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_secure_to_external_uses_default_bank_name() {
        let external = secure(true).to_external("Partner bank").unwrap();
        assert_eq!(external.receiver_bank_code, "088");
        assert_eq!(external.receiver_bank_name, "Partner bank");

        let mut named = secure(true);
        named.receiver_bank_name = Some("Shinhan".into());
        assert_eq!(named.to_external("Partner bank").unwrap().receiver_bank_name, "Shinhan");
    }

    #[test]
    fn test_command_json_is_tagged() {
        let json = serde_json::to_value(TransferCommand::from(secure(true))).unwrap();
        assert_eq!(json["kind"], "secure");
        assert_eq!(json["is_external"], true);
    }
}
