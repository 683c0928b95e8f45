//! Action Processor
//!
//! Drives one command through its action inside one unit of work:
//!
//! ```text
//! Resolved → Validated → PersistedPending → Executed → Settled → Reconciled
//! ```
//!
//! The unit of work is opened before `validate`. After `execute` it is
//! committed for a success or pending result and rolled back for a failure,
//! so the ledger never keeps half of a transfer. Settlement happens before
//! the record is reconciled.
//!
//! A validation rejection returns a `Failure` result before anything is
//! written. Once the pending record exists, any raised error rolls the unit
//! back, is turned into a failure result and fed through
//! `update_from_result`; the caller then receives `TransactionFailed`. If the
//! rollback itself fails the record is left non-terminal for reconciliation,
//! since marking it FAILED would hide money that already moved. Only
//! `execute` can leave a record PENDING or TIMEOUT, by returning such a
//! result.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::transfer::adapters::UnitOfWork;
use crate::transfer::command::TransferCommand;
use crate::transfer::error::TransferError;
use crate::transfer::result::{ActionResult, Payload, Verdict};

use super::DynTransferAction;
use super::resolver::ActionResolver;

const TARGET: &str = "REMIT::PROC";

/// Last phase a command completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessingPhase {
    Resolved,
    Validated,
    PersistedPending,
    Executed,
    /// Unit of work committed or rolled back
    Settled,
    Reconciled,
}

impl ProcessingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingPhase::Resolved => "RESOLVED",
            ProcessingPhase::Validated => "VALIDATED",
            ProcessingPhase::PersistedPending => "PERSISTED_PENDING",
            ProcessingPhase::Executed => "EXECUTED",
            ProcessingPhase::Settled => "SETTLED",
            ProcessingPhase::Reconciled => "RECONCILED",
        }
    }
}

impl fmt::Display for ProcessingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monitoring snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorStatus {
    pub registered_action_count: usize,
    /// Command kind -> action name
    pub registered_actions: BTreeMap<&'static str, &'static str>,
}

/// Progress of one command, kept for the failure path
struct Progress {
    phase: ProcessingPhase,
    /// The unit of work is ours to settle
    opened: bool,
    result: Option<ActionResult>,
}

pub struct ActionProcessor {
    resolver: ActionResolver,
    work: Arc<dyn UnitOfWork>,
}

impl ActionProcessor {
    pub fn new(resolver: ActionResolver, work: Arc<dyn UnitOfWork>) -> Self {
        Self { resolver, work }
    }

    pub fn resolver(&self) -> &ActionResolver {
        &self.resolver
    }

    pub fn status(&self) -> ProcessorStatus {
        ProcessorStatus {
            registered_action_count: self.resolver.action_count(),
            registered_actions: self.resolver.registered_actions(),
        }
    }

    /// Run `command` to a terminal or pending result.
    ///
    /// `Err` means a malformed command, a resolution failure, or
    /// `TransactionFailed` after an unexpected fault.
    pub async fn process(&self, command: &TransferCommand) -> Result<ActionResult, TransferError> {
        let transaction_id = command.transaction_id();
        if transaction_id.is_blank() {
            return Err(TransferError::MalformedCommand(
                "transaction id must be set before processing".to_string(),
            ));
        }

        let action = self.resolver.resolve(command)?;
        tracing::info!(
            target: TARGET,
            transaction_id = %transaction_id,
            kind = %command.kind(),
            action = action.name(),
            "Processing {}",
            command
        );

        let mut progress = Progress {
            phase: ProcessingPhase::Resolved,
            opened: false,
            result: None,
        };

        match self.drive(action.as_ref(), command, &mut progress).await {
            Ok(result) => {
                tracing::info!(
                    target: TARGET,
                    transaction_id = %transaction_id,
                    status = %result.status(),
                    code = result.code(),
                    "Processing finished"
                );
                Ok(result)
            }
            Err(err) => Err(self.fail(action.as_ref(), command, progress, err).await),
        }
    }

    async fn drive(
        &self,
        action: &dyn DynTransferAction,
        command: &TransferCommand,
        progress: &mut Progress,
    ) -> Result<ActionResult, TransferError> {
        let transaction_id = command.transaction_id();

        self.work.begin(transaction_id).await?;
        progress.opened = true;

        if let Verdict::Reject(reason) = action.validate(command).await? {
            tracing::warn!(
                target: TARGET,
                transaction_id = %transaction_id,
                code = reason.code(),
                "Validation rejected: {}",
                reason
            );
            self.work.rollback(transaction_id).await?;
            progress.opened = false;
            return Ok(ActionResult::rejected(transaction_id.clone(), &reason));
        }
        progress.phase = ProcessingPhase::Validated;

        action.save_pending(command).await?;
        progress.phase = ProcessingPhase::PersistedPending;
        tracing::debug!(target: TARGET, transaction_id = %transaction_id, "Pending record saved");

        let result = action.execute(command).await?;
        progress.phase = ProcessingPhase::Executed;
        tracing::debug!(
            target: TARGET,
            transaction_id = %transaction_id,
            status = %result.status(),
            code = result.code(),
            "Executed"
        );
        let result = progress.result.insert(result);

        if result.is_failure() {
            self.work.rollback(transaction_id).await?;
        } else {
            self.work.commit(transaction_id).await?;
        }
        progress.opened = false;
        progress.phase = ProcessingPhase::Settled;
        tracing::debug!(target: TARGET, transaction_id = %transaction_id, "Unit of work settled");

        action.update_from_result(command, result).await?;
        progress.phase = ProcessingPhase::Reconciled;

        Ok(result.clone())
    }

    /// Roll back what is still open, feed the fault through
    /// `update_from_result` (best effort) and build the error handed back to
    /// the caller.
    async fn fail(
        &self,
        action: &dyn DynTransferAction,
        command: &TransferCommand,
        progress: Progress,
        err: TransferError,
    ) -> TransferError {
        let transaction_id = command.transaction_id();
        tracing::error!(
            target: TARGET,
            transaction_id = %transaction_id,
            phase = %progress.phase,
            code = err.code(),
            error = %err,
            "Transfer processing failed"
        );

        let mut rolled_back = true;
        if progress.opened {
            if let Err(rollback_err) = self.work.rollback(transaction_id).await {
                rolled_back = false;
                tracing::error!(
                    target: TARGET,
                    transaction_id = %transaction_id,
                    phase = %progress.phase,
                    error = %rollback_err,
                    "Rollback failed, ledger may hold unmatched entries; record left for reconciliation"
                );
            }
        }

        if progress.phase >= ProcessingPhase::PersistedPending && rolled_back {
            // before settlement the execute result no longer describes the ledger
            let result = match progress.result {
                Some(result) if progress.phase >= ProcessingPhase::Settled => result,
                _ => {
                    let mut payload = Payload::new();
                    payload.insert("error".into(), Value::from(err.to_string()));
                    payload.insert("phase".into(), Value::from(progress.phase.as_str()));
                    ActionResult::failure(
                        transaction_id.clone(),
                        err.code(),
                        err.to_string(),
                        payload,
                    )
                }
            };

            if let Err(secondary) = action.update_from_result(command, &result).await {
                tracing::error!(
                    target: TARGET,
                    transaction_id = %transaction_id,
                    error = %secondary,
                    "update_from_result failed on the failure path; suppressed"
                );
            }
        }

        match err {
            TransferError::TransactionFailed { .. } => err,
            other => TransferError::TransactionFailed {
                transaction_id: transaction_id.to_string(),
                code: other.code(),
                cause: other.to_string(),
            },
        }
    }
}
