//! Collaborator Ports
//!
//! Narrow async contracts the engine consumes. The engine never embeds their
//! implementation; `memory` provides in-process versions and `postgres` a
//! durable transfer store and ledger.
//!
//! Ledger operations MUST be idempotent - applying the same entry twice
//! (same transaction id, account number and entry kind) has the effect of
//! applying it once.
//!
//! Ledger entries posted while a [`UnitOfWork`] boundary is open for their
//! transaction id become permanent on `commit` and vanish on `rollback`.

pub mod memory;
pub mod postgres;

pub use memory::{
    InMemoryAccounts, InMemoryLedger, InMemoryTransferStore, Notification, RecordingAuditLog,
    RecordingNotifier, ScriptedBankingGateway, StaticPinSessions,
};
pub use postgres::{PgLedger, PgTransferStore};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core_types::{AccountId, TransactionId, UserId};

use super::error::TransferError;
use super::types::{
    Account, AuditEntry, BankingRequest, BankingResponse, LedgerEntry, Page, TransferDirection,
    TransferRecord, User,
};

/// Scope a PIN session must carry to authorize a transfer
pub const PIN_SCOPE_TRANSFER: &str = "transfer";

/// Row lock on one account, released when dropped
pub struct AccountLock {
    account_id: AccountId,
    _guard: Box<dyn Any + Send + Sync>,
}

impl AccountLock {
    pub fn new(account_id: AccountId, guard: impl Any + Send + Sync) -> Self {
        Self {
            account_id,
            _guard: Box::new(guard),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }
}

impl fmt::Debug for AccountLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountLock")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Account and user lookup plus row locking
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_account_by_number(
        &self,
        account_number: &str,
    ) -> Result<Option<Account>, TransferError>;

    async fn find_account_by_id(&self, id: AccountId) -> Result<Option<Account>, TransferError>;

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, TransferError>;

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<User>, TransferError>;

    async fn is_owner(&self, user_id: UserId, account_number: &str)
    -> Result<bool, TransferError>;

    /// Default account used when a request does not name one
    async fn primary_account(&self, user_id: UserId) -> Result<Option<Account>, TransferError>;

    /// Block until the row lock on `id` is held.
    ///
    /// Callers locking more than one account MUST acquire in ascending
    /// `AccountId` order.
    async fn lock_account(&self, id: AccountId) -> Result<AccountLock, TransferError>;
}

/// Atomic balance primitive
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    async fn balance(&self, account_number: &str) -> Result<Decimal, TransferError>;

    async fn has_sufficient_balance(
        &self,
        account_number: &str,
        amount: Decimal,
    ) -> Result<bool, TransferError>;

    /// Debit. Returns `false` when the entry was already applied.
    async fn decrease(&self, entry: &LedgerEntry) -> Result<bool, TransferError>;

    /// Credit. Returns `false` when the entry was already applied.
    async fn increase(&self, entry: &LedgerEntry) -> Result<bool, TransferError>;
}

/// Atomic boundary around the money movement of one transfer
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Open the boundary for `transaction_id`. Fails with
    /// `DuplicateTransaction` while one is already open for the same id.
    async fn begin(&self, transaction_id: &TransactionId) -> Result<(), TransferError>;

    /// Make every entry posted inside the boundary permanent
    async fn commit(&self, transaction_id: &TransactionId) -> Result<(), TransferError>;

    /// Discard every entry posted inside the boundary. Closing a boundary
    /// that is not open is a no-op.
    async fn rollback(&self, transaction_id: &TransactionId) -> Result<(), TransferError>;
}

/// Transfer record persistence
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Create a record. A second insert with the same transaction id fails
    /// with `DuplicateTransaction`.
    async fn insert(&self, record: &TransferRecord) -> Result<(), TransferError>;

    /// Overwrite an existing record
    async fn save(&self, record: &TransferRecord) -> Result<(), TransferError>;

    async fn find_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<TransferRecord>, TransferError>;

    async fn exists_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<bool, TransferError>;

    /// Records of `user_id` in `direction`, newest first
    async fn find_by_user(
        &self,
        user_id: UserId,
        direction: TransferDirection,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError>;

    /// Latest COMPLETED record per receiver account sent by `sender_id`,
    /// newest first
    async fn find_recent_receivers(
        &self,
        sender_id: UserId,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError>;
}

/// Step-up authentication check
#[async_trait]
pub trait PinSessionValidator: Send + Sync {
    async fn validate(&self, token: &str, scope: &str) -> Result<bool, TransferError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn log_success(&self, entry: AuditEntry) -> Result<(), TransferError>;

    async fn log_failure(&self, entry: AuditEntry) -> Result<(), TransferError>;
}

/// Fire-and-forget user notification; delivery failures stay inside the
/// implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, handle: &str, message: &str);
}

/// Partner bank gateway
///
/// `Err` means the call itself failed (transport); a bank-side refusal is an
/// `Ok` response with `BankingStatus::Error`.
#[async_trait]
pub trait BankingGateway: Send + Sync {
    async fn process_transfer(
        &self,
        request: &BankingRequest,
    ) -> Result<BankingResponse, TransferError>;
}

/// Collaborators shared by every action
#[derive(Clone)]
pub struct TransferPorts {
    pub accounts: Arc<dyn AccountDirectory>,
    pub ledger: Arc<dyn BalanceLedger>,
    /// Boundary the processor holds around each command
    pub work: Arc<dyn UnitOfWork>,
    pub store: Arc<dyn TransferStore>,
    pub audit: Arc<dyn AuditLog>,
    pub notifier: Arc<dyn Notifier>,
}

impl TransferPorts {
    /// Fresh read of a record that must exist
    pub async fn load_record(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<TransferRecord, TransferError> {
        self.store
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| TransferError::TransferNotFound(transaction_id.to_string()))
    }

    /// Look up a user, falling back to an anonymous handle for audit lines
    pub async fn user_handle(&self, user_id: UserId) -> Result<String, TransferError> {
        Ok(self
            .accounts
            .find_user(user_id)
            .await?
            .map(|u| u.handle)
            .unwrap_or_else(|| format!("user-{}", user_id)))
    }
}
