//! External Transfer Action
//!
//! Sends funds from a platform account to a partner bank through the
//! [`BankingGateway`]. The gateway call cannot be rolled back, so the sender
//! is debited only once the bank reports `Success`. `Pending` and `Timeout`
//! answers leave the balance untouched and park the record until a later
//! report arrives through [`ExternalTransferAction::apply_gateway_report`].

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::TransferConfig;
use crate::core_types::TransactionId;
use crate::transfer::adapters::{BankingGateway, TransferPorts};
use crate::transfer::command::{CommandKind, ExternalTransfer, TransferCommand};
use crate::transfer::error::TransferError;
use crate::transfer::result::{ActionResult, Payload, RejectReason, Verdict, codes};
use crate::transfer::state::TransferState;
use crate::transfer::types::{
    AuditEntry, AuditEventType, BankingRequest, BankingResponse, BankingStatus, LedgerEntry,
    LedgerEntryKind, TransferKind, TransferRecord,
};

use super::TransferAction;

pub struct ExternalTransferAction {
    ports: TransferPorts,
    gateway: Arc<dyn BankingGateway>,
    sender_bank_code: String,
    currency: String,
}

impl ExternalTransferAction {
    pub fn new(ports: TransferPorts, gateway: Arc<dyn BankingGateway>, config: &TransferConfig) -> Self {
        Self {
            ports,
            gateway,
            sender_bank_code: config.sender_bank_code.clone(),
            currency: config.currency.clone(),
        }
    }

    fn payload(cmd: &ExternalTransfer) -> Payload {
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
        payload.insert(
            "receiver_bank".into(),
            Value::from(cmd.receiver_bank_name.as_str()),
        );
        payload
    }

    fn debit_entry(record: &TransferRecord) -> LedgerEntry {
        LedgerEntry {
            account_number: record.sender_account_number.clone(),
            amount: record.amount,
            kind: LedgerEntryKind::TransferOut,
            note: format!("External transfer out: {}", record.memo),
            transaction_id: record.transaction_id.clone(),
            actor_id: record.sender_id,
        }
    }

    /// Gateway answer -> result, debiting the sender on `Success`
    async fn settle_response(
        &self,
        cmd: &ExternalTransfer,
        record: &TransferRecord,
        response: BankingResponse,
    ) -> Result<ActionResult, TransferError> {
        let tx = cmd.transaction_id.clone();
        let mut payload = Self::payload(cmd);
        if let Some(bank_tx) = &response.bank_transaction_id {
            payload.insert("bank_transaction_id".into(), Value::from(bank_tx.as_str()));
        }

        let result = match response.status {
            BankingStatus::Success => {
                if let Err(e) = self.ports.ledger.decrease(&Self::debit_entry(record)).await {
                    // the bank already accepted the transfer; flag for investigation
                    tracing::error!(
                        transaction_id = %tx,
                        bank_transaction_id = ?response.bank_transaction_id,
                        error = %e,
                        "Debit after gateway success failed"
                    );
                    payload.insert("error".into(), Value::from(e.to_string()));
                    return Ok(ActionResult::failure(
                        tx,
                        codes::EXTERNAL_TRANSFER_ERROR,
                        format!("External transfer failed: {}", e),
                        payload,
                    ));
                }
                ActionResult::success(tx, "External transfer completed", payload)
            }
            BankingStatus::Pending => {
                ActionResult::pending(tx, "External transfer is being processed", payload)
            }
            BankingStatus::Timeout => ActionResult::timeout(
                tx,
                response
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Waiting for the partner bank".to_string()),
                payload,
            ),
            BankingStatus::Error => {
                let detail = response.error_message.clone().unwrap_or_default();
                payload.insert("error".into(), Value::from(detail.as_str()));
                ActionResult::failure(
                    tx,
                    codes::EXTERNAL_API_ERROR,
                    format!(
                        "External API error: {} - {}",
                        response.status.description(),
                        detail
                    ),
                    payload,
                )
            }
        };

        Ok(result.with_bank_transaction_id(response.bank_transaction_id))
    }

    /// Apply `result` to the stored record: state change, then audit and
    /// notification when the state actually changed.
    async fn apply_result(
        &self,
        mut record: TransferRecord,
        receiver_bank_name: &str,
        result: &ActionResult,
    ) -> Result<TransferRecord, TransferError> {
        let tx = record.transaction_id.clone();
        let sender_handle = self.ports.user_handle(record.sender_id).await?;
        let detail = format!(
            "amount: {}, memo: {}, bank: {}",
            record.amount, record.memo, receiver_bank_name
        );

        if result.is_success() {
            if !record.mark_completed()? {
                tracing::debug!(transaction_id = %tx, "Already completed");
                return Ok(record);
            }
            record.bank_transaction_id = result.bank_transaction_id().map(str::to_string);
            self.ports.store.save(&record).await?;

            self.ports
                .audit
                .log_success(AuditEntry {
                    actor_id: record.sender_id,
                    actor_handle: sender_handle.clone(),
                    event_type: AuditEventType::TransferSuccess,
                    description: format!(
                        "External transfer completed: {} -> {}:{} ({})",
                        record.sender_account_number,
                        receiver_bank_name,
                        record.receiver_account_number,
                        record.amount
                    ),
                    detail,
                    transaction_id: tx,
                })
                .await?;
            self.ports
                .notifier
                .notify(
                    record.sender_id,
                    &sender_handle,
                    &format!(
                        "{} sent to {} {}",
                        record.amount, receiver_bank_name, record.receiver_account_number
                    ),
                )
                .await;
        } else if result.is_timeout() {
            let changed = record.mark_timeout(result.message())?;
            self.ports.store.save(&record).await?;
            if changed {
                self.ports
                    .audit
                    .log_failure(AuditEntry {
                        actor_id: record.sender_id,
                        actor_handle: sender_handle,
                        event_type: AuditEventType::TransferTimeout,
                        description: format!("External transfer timed out: {}", result.message()),
                        detail,
                        transaction_id: tx,
                    })
                    .await?;
            }
        } else if result.is_pending() {
            // parked for out-of-band reconciliation
            if record.mark_pending()? {
                self.ports.store.save(&record).await?;
            }
        } else {
            if !record.mark_failed(result.message())? {
                return Ok(record);
            }
            self.ports.store.save(&record).await?;

            self.ports
                .audit
                .log_failure(AuditEntry {
                    actor_id: record.sender_id,
                    actor_handle: sender_handle,
                    event_type: AuditEventType::TransferFailed,
                    description: format!("External transfer failed: {}", result.message()),
                    detail,
                    transaction_id: tx,
                })
                .await?;
        }

        tracing::debug!(
            transaction_id = %record.transaction_id,
            state = %record.state,
            "External transfer record updated"
        );
        Ok(record)
    }

    /// Apply a late gateway answer to a PENDING or TIMEOUT record.
    ///
    /// Safe to call repeatedly with the same report: the debit is keyed on
    /// the transaction id and a settled record is returned unchanged.
    pub async fn apply_gateway_report(
        &self,
        transaction_id: &TransactionId,
        response: BankingResponse,
    ) -> Result<TransferRecord, TransferError> {
        let record = self.ports.load_record(transaction_id).await?;
        if record.kind != TransferKind::External {
            return Err(TransferError::MalformedCommand(format!(
                "{} is not an external transfer",
                transaction_id
            )));
        }

        let sender = self
            .ports
            .accounts
            .find_account_by_number(&record.sender_account_number)
            .await?
            .ok_or_else(|| TransferError::AccountNotFound(record.sender_account_number.clone()))?;
        let _lock = self.ports.accounts.lock_account(sender.id).await?;

        // re-read under the lock
        let record = self.ports.load_record(transaction_id).await?;
        if record.state.is_terminal() {
            tracing::info!(
                transaction_id = %transaction_id,
                state = %record.state,
                "Gateway report ignored, transfer already settled"
            );
            return Ok(record);
        }
        if !record.state.is_unsettled() {
            return Err(TransferError::InvalidStateTransition {
                from: record.state,
                to: match response.status {
                    BankingStatus::Success => TransferState::Completed,
                    BankingStatus::Error => TransferState::Failed,
                    BankingStatus::Pending => TransferState::Pending,
                    BankingStatus::Timeout => TransferState::Timeout,
                },
            });
        }

        tracing::info!(
            transaction_id = %transaction_id,
            status = ?response.status,
            "Applying gateway report"
        );

        let cmd = ExternalTransfer {
            sender_id: record.sender_id,
            sender_account_number: record.sender_account_number.clone(),
            receiver_account_number: record.receiver_account_number.clone(),
            receiver_bank_code: record.receiver_bank_code.clone().unwrap_or_default(),
            receiver_bank_name: record.receiver_bank_label().to_string(),
            amount: record.amount,
            memo: record.memo.clone(),
            transaction_id: record.transaction_id.clone(),
        };
        let result = self.settle_response(&cmd, &record, response).await?;
        self.apply_result(record, &cmd.receiver_bank_name, &result)
            .await
    }
}

#[async_trait]
impl TransferAction for ExternalTransferAction {
    type Command = ExternalTransfer;

    const KIND: CommandKind = CommandKind::External;

    fn name(&self) -> &'static str {
        "ExternalTransferAction"
    }

    fn command_of(command: &TransferCommand) -> Option<&ExternalTransfer> {
        match command {
            TransferCommand::External(cmd) => Some(cmd),
            _ => None,
        }
    }

    async fn validate(&self, cmd: &ExternalTransfer) -> Result<Verdict, TransferError> {
        tracing::debug!(transaction_id = %cmd.transaction_id, "Validating external transfer");

        let reject = |reason: RejectReason| {
            tracing::warn!(
                transaction_id = %cmd.transaction_id,
                code = reason.code(),
                "External transfer rejected: {}",
                reason
            );
            Ok(Verdict::Reject(reason))
        };

        if cmd.amount <= Decimal::ZERO {
            return reject(RejectReason::InvalidAmount);
        }
        if cmd.sender_account_number.trim().is_empty() {
            return reject(RejectReason::MissingField("sender_account_number"));
        }
        if cmd.receiver_account_number.trim().is_empty() {
            return reject(RejectReason::MissingField("receiver_account_number"));
        }
        if cmd.receiver_bank_code.trim().is_empty() {
            return reject(RejectReason::MissingField("receiver_bank_code"));
        }

        let accounts = &self.ports.accounts;
        if accounts
            .find_account_by_number(&cmd.sender_account_number)
            .await?
            .is_none()
        {
            return reject(RejectReason::SenderAccountNotFound(
                cmd.sender_account_number.clone(),
            ));
        }
        if !accounts
            .is_owner(cmd.sender_id, &cmd.sender_account_number)
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

    async fn save_pending(&self, cmd: &ExternalTransfer) -> Result<(), TransferError> {
        if self.ports.accounts.find_user(cmd.sender_id).await?.is_none() {
            return Err(TransferError::UserNotFound(cmd.sender_id));
        }

        let record = TransferRecord::pending(
            cmd.transaction_id.clone(),
            TransferKind::External,
            cmd.sender_id,
            cmd.sender_account_number.as_str(),
            None,
            cmd.receiver_account_number.as_str(),
            cmd.amount,
            cmd.memo.as_str(),
        )
        .with_receiver_bank(
            cmd.receiver_bank_code.as_str(),
            cmd.receiver_bank_name.as_str(),
        );
        self.ports.store.insert(&record).await
    }

    async fn execute(&self, cmd: &ExternalTransfer) -> Result<ActionResult, TransferError> {
        tracing::info!(transaction_id = %cmd.transaction_id, "Executing external transfer");

        let mut record = self.ports.load_record(&cmd.transaction_id).await?;
        record.mark_processing()?;
        self.ports.store.save(&record).await?;

        let sender = self
            .ports
            .accounts
            .find_account_by_number(&cmd.sender_account_number)
            .await?
            .ok_or_else(|| TransferError::AccountNotFound(cmd.sender_account_number.clone()))?;
        let _lock = self.ports.accounts.lock_account(sender.id).await?;

        let request = BankingRequest {
            transaction_id: cmd.transaction_id.clone(),
            sender_account_number: cmd.sender_account_number.clone(),
            sender_bank_code: self.sender_bank_code.clone(),
            receiver_account_number: cmd.receiver_account_number.clone(),
            receiver_bank_code: cmd.receiver_bank_code.clone(),
            amount: cmd.amount,
            currency: self.currency.clone(),
            memo: cmd.memo.clone(),
        };

        tracing::info!(transaction_id = %cmd.transaction_id, "Calling banking gateway");
        let response = match self.gateway.process_transfer(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    transaction_id = %cmd.transaction_id,
                    error = %e,
                    "Banking gateway call failed"
                );
                let mut payload = Self::payload(cmd);
                payload.insert("error".into(), Value::from(e.to_string()));
                return Ok(ActionResult::failure(
                    cmd.transaction_id.clone(),
                    codes::EXTERNAL_TRANSFER_ERROR,
                    format!("External transfer failed: {}", e),
                    payload,
                ));
            }
        };
        tracing::info!(
            transaction_id = %cmd.transaction_id,
            status = ?response.status,
            bank_transaction_id = ?response.bank_transaction_id,
            "Gateway answered"
        );

        self.settle_response(cmd, &record, response).await
    }

    async fn update_from_result(
        &self,
        cmd: &ExternalTransfer,
        result: &ActionResult,
    ) -> Result<(), TransferError> {
        let record = self.ports.load_record(&cmd.transaction_id).await?;
        self.apply_result(record, &cmd.receiver_bank_name, result)
            .await
            .map(|_| ())
    }
}
