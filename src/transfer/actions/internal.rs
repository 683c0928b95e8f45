//! Internal Transfer Action
//!
//! Moves funds between two platform accounts. Both row locks are taken in
//! ascending `AccountId` order, whatever the transfer direction, and held
//! until both ledger legs are applied. A leg that fails leaves the other one
//! to the processor's rollback.

use async_trait::async_trait;
use serde_json::Value;

use crate::transfer::adapters::{AccountLock, TransferPorts};
use crate::transfer::command::{CommandKind, InternalTransfer, TransferCommand};
use crate::transfer::error::TransferError;
use crate::transfer::result::{ActionResult, Payload, RejectReason, Verdict, codes};
use crate::transfer::types::{
    Account, AuditEntry, AuditEventType, LedgerEntry, LedgerEntryKind, TransferKind,
    TransferRecord,
};

use super::TransferAction;

pub struct InternalTransferAction {
    ports: TransferPorts,
}

impl InternalTransferAction {
    pub fn new(ports: TransferPorts) -> Self {
        Self { ports }
    }

    async fn account(&self, account_number: &str) -> Result<Account, TransferError> {
        self.ports
            .accounts
            .find_account_by_number(account_number)
            .await?
            .ok_or_else(|| TransferError::AccountNotFound(account_number.to_string()))
    }

    /// Re-read a locked account; it must still carry the expected number
    async fn locked_account(&self, expected: &Account) -> Result<Account, TransferError> {
        match self.ports.accounts.find_account_by_id(expected.id).await? {
            Some(account) if account.account_number == expected.account_number => Ok(account),
            _ => Err(TransferError::AccountNotFound(
                expected.account_number.clone(),
            )),
        }
    }

    /// Lock both accounts, lowest id first
    async fn lock_pair(
        &self,
        sender: &Account,
        receiver: &Account,
    ) -> Result<(AccountLock, Option<AccountLock>), TransferError> {
        let (first, second) = if sender.id <= receiver.id {
            (sender.id, receiver.id)
        } else {
            (receiver.id, sender.id)
        };

        let first_lock = self.ports.accounts.lock_account(first).await?;
        let second_lock = if second != first {
            Some(self.ports.accounts.lock_account(second).await?)
        } else {
            None
        };
        Ok((first_lock, second_lock))
    }

    /// Debit then credit, both inside the command's unit of work
    async fn move_funds(&self, cmd: &InternalTransfer) -> Result<(), TransferError> {
        let debit = LedgerEntry {
            account_number: cmd.sender_account_number.clone(),
            amount: cmd.amount,
            kind: LedgerEntryKind::TransferOut,
            note: format!("Internal transfer out: {}", cmd.memo),
            transaction_id: cmd.transaction_id.clone(),
            actor_id: cmd.sender_id,
        };
        self.ports.ledger.decrease(&debit).await?;

        let credit = LedgerEntry {
            account_number: cmd.receiver_account_number.clone(),
            amount: cmd.amount,
            kind: LedgerEntryKind::TransferIn,
            note: format!("Internal transfer in: {}", cmd.memo),
            transaction_id: cmd.transaction_id.clone(),
            actor_id: cmd.receiver_id,
        };
        if let Err(e) = self.ports.ledger.increase(&credit).await {
            tracing::warn!(
                transaction_id = %cmd.transaction_id,
                account = %cmd.receiver_account_number,
                error = %e,
                "Credit failed, debit awaits rollback"
            );
            return Err(e);
        }
        Ok(())
    }

    fn payload(cmd: &InternalTransfer) -> Payload {
        let mut payload = Payload::new();
        payload.insert("amount".into(), Value::from(cmd.amount.to_string()));
        payload.insert(
            "sender_account".into(),
            Value::from(cmd.sender_account_number.as_str()),
        );
        payload.insert(
            "receiver_account".into(),
            Value::from(cmd.receiver_account_number.as_str()),
        );
        payload
    }
}

#[async_trait]
impl TransferAction for InternalTransferAction {
    type Command = InternalTransfer;

    const KIND: CommandKind = CommandKind::Internal;

    fn name(&self) -> &'static str {
        "InternalTransferAction"
    }

    fn command_of(command: &TransferCommand) -> Option<&InternalTransfer> {
        match command {
            TransferCommand::Internal(cmd) => Some(cmd),
            _ => None,
        }
    }

    async fn validate(&self, cmd: &InternalTransfer) -> Result<Verdict, TransferError> {
        tracing::debug!(transaction_id = %cmd.transaction_id, "Validating internal transfer");

        let reject = |reason: RejectReason| {
            tracing::warn!(
                transaction_id = %cmd.transaction_id,
                code = reason.code(),
                "Internal transfer rejected: {}",
                reason
            );
            Ok(Verdict::Reject(reason))
        };

        if cmd.amount <= rust_decimal::Decimal::ZERO {
            return reject(RejectReason::InvalidAmount);
        }
        if cmd.sender_account_number.trim().is_empty() {
            return reject(RejectReason::MissingField("sender_account_number"));
        }
        if cmd.receiver_account_number.trim().is_empty() {
            return reject(RejectReason::MissingField("receiver_account_number"));
        }
        if cmd.sender_id == cmd.receiver_id
            || cmd.sender_account_number == cmd.receiver_account_number
        {
            return reject(RejectReason::SelfTransfer);
        }

        let accounts = &self.ports.accounts;
        let Some(sender) = accounts
            .find_account_by_number(&cmd.sender_account_number)
            .await?
        else {
            return reject(RejectReason::SenderAccountNotFound(
                cmd.sender_account_number.clone(),
            ));
        };
        if accounts
            .find_account_by_number(&cmd.receiver_account_number)
            .await?
            .is_none()
        {
            return reject(RejectReason::ReceiverAccountNotFound(
                cmd.receiver_account_number.clone(),
            ));
        }
        if !accounts
            .is_owner(cmd.sender_id, &sender.account_number)
            .await?
        {
            return reject(RejectReason::NotAccountOwner {
                user_id: cmd.sender_id,
                account_number: cmd.sender_account_number.clone(),
            });
        }
        if !self
            .ports
            .ledger
            .has_sufficient_balance(&cmd.sender_account_number, cmd.amount)
            .await?
        {
            return reject(RejectReason::InsufficientFunds(
                cmd.sender_account_number.clone(),
            ));
        }

        Ok(Verdict::Accept)
    }

    async fn save_pending(&self, cmd: &InternalTransfer) -> Result<(), TransferError> {
        for user_id in [cmd.sender_id, cmd.receiver_id] {
            if self.ports.accounts.find_user(user_id).await?.is_none() {
                return Err(TransferError::UserNotFound(user_id));
            }
        }

        let record = TransferRecord::pending(
            cmd.transaction_id.clone(),
            TransferKind::Internal,
            cmd.sender_id,
            cmd.sender_account_number.as_str(),
            Some(cmd.receiver_id),
            cmd.receiver_account_number.as_str(),
            cmd.amount,
            cmd.memo.as_str(),
        );
        self.ports.store.insert(&record).await
    }

    async fn execute(&self, cmd: &InternalTransfer) -> Result<ActionResult, TransferError> {
        tracing::info!(transaction_id = %cmd.transaction_id, "Executing internal transfer");

        let mut record = self.ports.load_record(&cmd.transaction_id).await?;
        record.mark_processing()?;
        self.ports.store.save(&record).await?;

        let sender = self.account(&cmd.sender_account_number).await?;
        let receiver = self.account(&cmd.receiver_account_number).await?;
        let _locks = self.lock_pair(&sender, &receiver).await?;
        self.locked_account(&sender).await?;
        self.locked_account(&receiver).await?;

        match self.move_funds(cmd).await {
            Ok(()) => {
                tracing::info!(transaction_id = %cmd.transaction_id, "Internal transfer executed");
                Ok(ActionResult::success(
                    cmd.transaction_id.clone(),
                    "Internal transfer completed",
                    Self::payload(cmd),
                ))
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %cmd.transaction_id,
                    error = %e,
                    "Internal transfer execution failed"
                );
                let mut payload = Self::payload(cmd);
                payload.insert("error".into(), Value::from(e.to_string()));
                Ok(ActionResult::failure(
                    cmd.transaction_id.clone(),
                    codes::INTERNAL_TRANSFER_ERROR,
                    format!("Internal transfer failed: {}", e),
                    payload,
                ))
            }
        }
    }

    async fn update_from_result(
        &self,
        cmd: &InternalTransfer,
        result: &ActionResult,
    ) -> Result<(), TransferError> {
        let mut record = self.ports.load_record(&cmd.transaction_id).await?;
        let sender_handle = self.ports.user_handle(cmd.sender_id).await?;
        let detail = format!("amount: {}, memo: {}", cmd.amount, cmd.memo);

        if result.is_success() {
            if !record.mark_completed()? {
                tracing::debug!(transaction_id = %cmd.transaction_id, "Already completed");
                return Ok(());
            }
            self.ports.store.save(&record).await?;

            self.ports
                .audit
                .log_success(AuditEntry {
                    actor_id: cmd.sender_id,
                    actor_handle: sender_handle.clone(),
                    event_type: AuditEventType::TransferSuccess,
                    description: format!(
                        "Internal transfer completed: {} -> {} ({})",
                        cmd.sender_account_number, cmd.receiver_account_number, cmd.amount
                    ),
                    detail,
                    transaction_id: cmd.transaction_id.clone(),
                })
                .await?;

            let receiver_handle = self.ports.user_handle(cmd.receiver_id).await?;
            self.ports
                .notifier
                .notify(
                    cmd.sender_id,
                    &sender_handle,
                    &format!("{} sent to {}", cmd.amount, cmd.receiver_account_number),
                )
                .await;
            self.ports
                .notifier
                .notify(
                    cmd.receiver_id,
                    &receiver_handle,
                    &format!("{} received from {}", cmd.amount, cmd.sender_account_number),
                )
                .await;
        } else {
            // synchronous by construction: anything but success is a failure
            if !record.mark_failed(result.message())? {
                return Ok(());
            }
            self.ports.store.save(&record).await?;

            self.ports
                .audit
                .log_failure(AuditEntry {
                    actor_id: cmd.sender_id,
                    actor_handle: sender_handle,
                    event_type: AuditEventType::TransferFailed,
                    description: format!("Internal transfer failed: {}", result.message()),
                    detail,
                    transaction_id: cmd.transaction_id.clone(),
                })
                .await?;
        }

        tracing::debug!(
            transaction_id = %cmd.transaction_id,
            state = %record.state,
            "Internal transfer record updated"
        );
        Ok(())
    }
}
