//! Secure Transfer Action
//!
//! PIN-gated front for the internal and external actions. Owns both
//! delegates and forwards every phase to the one selected by `is_external`.
//! The PIN session is checked again right before execution.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::transfer::adapters::{PIN_SCOPE_TRANSFER, PinSessionValidator};
use crate::transfer::command::{
    CommandKind, ExternalTransfer, InternalTransfer, SecureTransfer, TransferCommand,
};
use crate::transfer::error::TransferError;
use crate::transfer::result::{ActionResult, Payload, RejectReason, Verdict, codes};

use super::{ExternalTransferAction, InternalTransferAction, TransferAction};

/// Delegate command for one secure command
enum Delegated {
    Internal(InternalTransfer),
    External(ExternalTransfer),
}

pub struct SecureTransferAction {
    internal: Arc<InternalTransferAction>,
    external: Arc<ExternalTransferAction>,
    pins: Arc<dyn PinSessionValidator>,
    /// Display name used when the command does not name the receiver bank
    default_bank_name: String,
}

impl SecureTransferAction {
    pub fn new(
        internal: Arc<InternalTransferAction>,
        external: Arc<ExternalTransferAction>,
        pins: Arc<dyn PinSessionValidator>,
        default_bank_name: impl Into<String>,
    ) -> Self {
        Self {
            internal,
            external,
            pins,
            default_bank_name: default_bank_name.into(),
        }
    }

    fn delegate(&self, cmd: &SecureTransfer) -> Result<Delegated, TransferError> {
        if cmd.is_external {
            cmd.to_external(&self.default_bank_name)
                .map(Delegated::External)
        } else {
            cmd.to_internal().map(Delegated::Internal)
        }
    }

    async fn pin_valid(&self, token: &str) -> Result<bool, TransferError> {
        self.pins.validate(token, PIN_SCOPE_TRANSFER).await
    }
}

#[async_trait]
impl TransferAction for SecureTransferAction {
    type Command = SecureTransfer;

    const KIND: CommandKind = CommandKind::Secure;

    fn name(&self) -> &'static str {
        "SecureTransferAction"
    }

    fn command_of(command: &TransferCommand) -> Option<&SecureTransfer> {
        match command {
            TransferCommand::Secure(cmd) => Some(cmd),
            _ => None,
        }
    }

    async fn validate(&self, cmd: &SecureTransfer) -> Result<Verdict, TransferError> {
        if cmd.pin_session_token.trim().is_empty() {
            tracing::warn!(transaction_id = %cmd.transaction_id, "PIN session token missing");
            return Ok(Verdict::Reject(RejectReason::PinSessionMissing));
        }
        if !self.pin_valid(&cmd.pin_session_token).await? {
            tracing::warn!(transaction_id = %cmd.transaction_id, "PIN session token invalid");
            return Ok(Verdict::Reject(RejectReason::PinSessionInvalid));
        }
        tracing::debug!(transaction_id = %cmd.transaction_id, "PIN session verified");

        // destination checks belong to the delegate
        match self.delegate(cmd)? {
            Delegated::Internal(c) => self.internal.validate(&c).await,
            Delegated::External(c) => self.external.validate(&c).await,
        }
    }

    async fn save_pending(&self, cmd: &SecureTransfer) -> Result<(), TransferError> {
        match self.delegate(cmd)? {
            Delegated::Internal(c) => self.internal.save_pending(&c).await,
            Delegated::External(c) => self.external.save_pending(&c).await,
        }
    }

    async fn execute(&self, cmd: &SecureTransfer) -> Result<ActionResult, TransferError> {
        if !self.pin_valid(&cmd.pin_session_token).await? {
            tracing::warn!(
                transaction_id = %cmd.transaction_id,
                "PIN session expired before execution"
            );
            let mut payload = Payload::new();
            payload.insert("error".into(), Value::from("PIN session expired"));
            return Ok(ActionResult::failure(
                cmd.transaction_id.clone(),
                codes::PIN_SESSION_EXPIRED,
                "PIN authentication expired, please authenticate again",
                payload,
            ));
        }

        match self.delegate(cmd)? {
            Delegated::Internal(c) => self.internal.execute(&c).await,
            Delegated::External(c) => self.external.execute(&c).await,
        }
    }

    async fn update_from_result(
        &self,
        cmd: &SecureTransfer,
        result: &ActionResult,
    ) -> Result<(), TransferError> {
        match self.delegate(cmd)? {
            Delegated::Internal(c) => self.internal.update_from_result(&c, result).await,
            Delegated::External(c) => self.external.update_from_result(&c, result).await,
        }
    }
}
