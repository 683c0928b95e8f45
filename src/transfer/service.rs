//! Transfer Service
//!
//! Request-facing layer: resolves the sender, picks the sender account,
//! generates the transaction id, builds the command and runs it through the
//! processor. Also wires the actions together at startup.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::TransferConfig;
use crate::core_types::{TransactionId, UserId};

use super::actions::{
    ActionProcessor, ActionResolver, DynTransferAction, ExternalTransferAction,
    InternalTransferAction, ProcessorStatus, SecureTransferAction,
};
use super::adapters::{BankingGateway, PinSessionValidator, TransferPorts};
use super::command::{ExternalTransfer, InternalTransfer, SecureTransfer, TransferCommand};
use super::error::TransferError;
use super::id::TransactionIdGenerator;
use super::types::{Account, BankingResponse, Page, TransferDirection, TransferRecord, User};

/// Internal transfer request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferRequest {
    /// Sender's primary account is used when absent
    #[serde(default)]
    pub sender_account_number: Option<String>,
    pub receiver_account_number: String,
    pub amount: Decimal,
    #[serde(default)]
    pub memo: String,
}

/// External transfer request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExternalTransferRequest {
    #[serde(default)]
    pub sender_account_number: Option<String>,
    pub receiver_account_number: String,
    pub receiver_bank_code: String,
    pub receiver_bank_name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub memo: String,
}

/// PIN-gated request, internal or external
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecureTransferRequest {
    #[serde(default)]
    pub sender_account_number: Option<String>,
    pub receiver_account_number: String,
    pub amount: Decimal,
    #[serde(default)]
    pub memo: String,
    pub pin_session_token: String,
    #[serde(default)]
    pub is_external: bool,
    #[serde(default)]
    pub receiver_bank_code: Option<String>,
    #[serde(default)]
    pub receiver_bank_name: Option<String>,
}

pub struct TransferService {
    ports: TransferPorts,
    processor: ActionProcessor,
    external: Arc<ExternalTransferAction>,
    ids: TransactionIdGenerator,
}

impl TransferService {
    /// Wire the three actions into a resolver and processor
    pub fn new(
        ports: TransferPorts,
        gateway: Arc<dyn BankingGateway>,
        pins: Arc<dyn PinSessionValidator>,
        config: &TransferConfig,
    ) -> Result<Self, TransferError> {
        let internal = Arc::new(InternalTransferAction::new(ports.clone()));
        let external = Arc::new(ExternalTransferAction::new(ports.clone(), gateway, config));
        let secure = Arc::new(SecureTransferAction::new(
            internal.clone(),
            external.clone(),
            pins,
            config.external_bank_name.as_str(),
        ));

        let resolver = ActionResolver::new([
            internal as Arc<dyn DynTransferAction>,
            external.clone(),
            secure,
        ])?;

        Ok(Self {
            ids: TransactionIdGenerator::new(
                config.transaction_id_prefix.as_str(),
                ports.store.clone(),
            ),
            processor: ActionProcessor::new(resolver, ports.work.clone()),
            ports,
            external,
        })
    }

    pub fn processor(&self) -> &ActionProcessor {
        &self.processor
    }

    pub fn status(&self) -> ProcessorStatus {
        self.processor.status()
    }

    pub async fn transfer(
        &self,
        sender_handle: &str,
        request: TransferRequest,
    ) -> Result<TransferRecord, TransferError> {
        tracing::info!(
            sender = sender_handle,
            receiver_account = %request.receiver_account_number,
            amount = %request.amount,
            "Transfer requested"
        );

        let sender = self.sender(sender_handle).await?;
        let receiver = self.receiver_owner(&request.receiver_account_number).await?;
        let sender_account = self
            .sender_account(&sender, request.sender_account_number.as_deref())
            .await?;
        let transaction_id = self.ids.generate().await?;

        let command = InternalTransfer {
            sender_id: sender.id,
            receiver_id: receiver,
            sender_account_number: sender_account.account_number,
            receiver_account_number: request.receiver_account_number,
            amount: request.amount,
            memo: request.memo,
            transaction_id,
        };
        self.run(command.into()).await
    }

    pub async fn external_transfer(
        &self,
        sender_handle: &str,
        request: ExternalTransferRequest,
    ) -> Result<TransferRecord, TransferError> {
        tracing::info!(
            sender = sender_handle,
            receiver_bank = %request.receiver_bank_code,
            amount = %request.amount,
            "External transfer requested"
        );

        let sender = self.sender(sender_handle).await?;
        let sender_account = self
            .sender_account(&sender, request.sender_account_number.as_deref())
            .await?;
        let transaction_id = self.ids.generate().await?;

        let command = ExternalTransfer {
            sender_id: sender.id,
            sender_account_number: sender_account.account_number,
            receiver_account_number: request.receiver_account_number,
            receiver_bank_code: request.receiver_bank_code,
            receiver_bank_name: request.receiver_bank_name,
            amount: request.amount,
            memo: request.memo,
            transaction_id,
        };
        self.run(command.into()).await
    }

    pub async fn secure_transfer(
        &self,
        sender_handle: &str,
        request: SecureTransferRequest,
    ) -> Result<TransferRecord, TransferError> {
        tracing::info!(
            sender = sender_handle,
            external = request.is_external,
            amount = %request.amount,
            "Secure transfer requested"
        );

        let sender = self.sender(sender_handle).await?;
        let receiver_id = if request.is_external {
            None
        } else {
            Some(self.receiver_owner(&request.receiver_account_number).await?)
        };
        let sender_account = self
            .sender_account(&sender, request.sender_account_number.as_deref())
            .await?;
        let transaction_id = self.ids.generate().await?;

        let command = SecureTransfer {
            sender_id: sender.id,
            receiver_id,
            sender_account_number: sender_account.account_number,
            receiver_account_number: request.receiver_account_number,
            amount: request.amount,
            memo: request.memo,
            transaction_id,
            pin_session_token: request.pin_session_token,
            is_external: request.is_external,
            receiver_bank_code: request.receiver_bank_code,
            receiver_bank_name: request.receiver_bank_name,
        };
        self.run(command.into()).await
    }

    pub async fn get_transfer(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransferRecord, TransferError> {
        self.ports.load_record(transaction_id).await
    }

    /// Everything the user sent or received, newest first
    pub async fn history(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        self.ports
            .store
            .find_by_user(user_id, TransferDirection::Any, page)
            .await
    }

    pub async fn sent_transfers(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        self.ports
            .store
            .find_by_user(user_id, TransferDirection::Sent, page)
            .await
    }

    pub async fn received_transfers(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        self.ports
            .store
            .find_by_user(user_id, TransferDirection::Received, page)
            .await
    }

    /// Latest completed transfer to each account the user sent to, newest
    /// first. Backs the "recent recipients" list.
    pub async fn recent_transfers(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        self.ports.store.find_recent_receivers(user_id, page).await
    }

    /// Late gateway answer for an external transfer left PENDING or TIMEOUT
    pub async fn apply_gateway_report(
        &self,
        transaction_id: &TransactionId,
        response: BankingResponse,
    ) -> Result<TransferRecord, TransferError> {
        self.external
            .apply_gateway_report(transaction_id, response)
            .await
    }

    async fn run(&self, command: TransferCommand) -> Result<TransferRecord, TransferError> {
        let result = self.processor.process(&command).await?;

        if result.is_success() || result.is_pending() {
            let record = self.ports.load_record(result.transaction_id()).await?;
            tracing::info!(
                transaction_id = %record.transaction_id,
                status = %result.status(),
                state = %record.state,
                "Transfer request done"
            );
            return Ok(record);
        }

        tracing::error!(
            transaction_id = %result.transaction_id(),
            code = result.code(),
            "Transfer request failed: {}",
            result.message()
        );
        Err(TransferError::TransactionFailed {
            transaction_id: result.transaction_id().to_string(),
            code: result.code(),
            cause: result.message().to_string(),
        })
    }

    async fn sender(&self, handle: &str) -> Result<User, TransferError> {
        self.ports
            .accounts
            .find_user_by_handle(handle)
            .await?
            .ok_or_else(|| TransferError::UnknownHandle(handle.to_string()))
    }

    /// Owner of a local receiver account
    async fn receiver_owner(&self, account_number: &str) -> Result<UserId, TransferError> {
        let account = self
            .ports
            .accounts
            .find_account_by_number(account_number)
            .await?
            .ok_or_else(|| TransferError::AccountNotFound(account_number.to_string()))?;
        if self.ports.accounts.find_user(account.user_id).await?.is_none() {
            return Err(TransferError::UserNotFound(account.user_id));
        }
        Ok(account.user_id)
    }

    /// The explicitly requested account (must be the sender's own) or the
    /// sender's primary account
    async fn sender_account(
        &self,
        sender: &User,
        requested: Option<&str>,
    ) -> Result<Account, TransferError> {
        match requested.map(str::trim).filter(|n| !n.is_empty()) {
            Some(number) => {
                let account = self
                    .ports
                    .accounts
                    .find_account_by_number(number)
                    .await?
                    .ok_or_else(|| TransferError::AccountNotFound(number.to_string()))?;
                if account.user_id != sender.id {
                    return Err(TransferError::AccountNotFound(format!(
                        "{} is not owned by the sender",
                        number
                    )));
                }
                Ok(account)
            }
            None => self
                .ports
                .accounts
                .primary_account(sender.id)
                .await?
                .ok_or_else(|| {
                    TransferError::AccountNotFound(format!("primary account of user {}", sender.id))
                }),
        }
    }
}
