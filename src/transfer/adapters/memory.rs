//! In-memory collaborators
//!
//! Used by the demo binary and as test fixtures. Each type has failure
//! switches and counters so tests can drive the engine's error paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::core_types::{AccountId, TransactionId, UserId};
use crate::transfer::error::TransferError;
use crate::transfer::state::TransferState;
use crate::transfer::types::{
    Account, AuditEntry, BankingRequest, BankingResponse, LedgerEntry, LedgerEntryKind, Page,
    TransferDirection, TransferRecord, User,
};

use super::{
    AccountDirectory, AccountLock, AuditLog, BalanceLedger, BankingGateway, Notifier,
    PinSessionValidator, TransferStore, UnitOfWork,
};

// ============================================================================
// Accounts
// ============================================================================

/// Accounts, users and per-account row locks
#[derive(Default)]
pub struct InMemoryAccounts {
    accounts: DashMap<AccountId, Account>,
    by_number: DashMap<String, AccountId>,
    users: DashMap<UserId, User>,
    primary: DashMap<UserId, AccountId>,
    row_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    /// Account ids in lock acquisition order
    lock_history: Mutex<Vec<AccountId>>,
    fail_locks: AtomicBool,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Register an account; the first one registered for a user is primary.
    pub fn add_account(&self, account: Account) {
        self.primary.entry(account.user_id).or_insert(account.id);
        self.by_number
            .insert(account.account_number.clone(), account.id);
        self.accounts.insert(account.id, account);
    }

    /// Make `lock_account` fail, simulating a lock timeout in the database
    pub fn set_fail_locks(&self, fail: bool) {
        self.fail_locks.store(fail, Ordering::SeqCst);
    }

    pub async fn lock_history(&self) -> Vec<AccountId> {
        self.lock_history.lock().await.clone()
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccounts {
    async fn find_account_by_number(
        &self,
        account_number: &str,
    ) -> Result<Option<Account>, TransferError> {
        let id = match self.by_number.get(account_number) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn find_account_by_id(&self, id: AccountId) -> Result<Option<Account>, TransferError> {
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn find_user(&self, user_id: UserId) -> Result<Option<User>, TransferError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_user_by_handle(&self, handle: &str) -> Result<Option<User>, TransferError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.handle == handle)
            .map(|u| u.clone()))
    }

    async fn is_owner(
        &self,
        user_id: UserId,
        account_number: &str,
    ) -> Result<bool, TransferError> {
        Ok(self
            .find_account_by_number(account_number)
            .await?
            .is_some_and(|a| a.user_id == user_id))
    }

    async fn primary_account(&self, user_id: UserId) -> Result<Option<Account>, TransferError> {
        let id = match self.primary.get(&user_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn lock_account(&self, id: AccountId) -> Result<AccountLock, TransferError> {
        if self.fail_locks.load(Ordering::SeqCst) {
            return Err(TransferError::DatabaseError(format!(
                "lock wait timeout on account {}",
                id
            )));
        }
        if !self.accounts.contains_key(&id) {
            return Err(TransferError::AccountNotFound(id.to_string()));
        }

        let row = self
            .row_locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = row.lock_owned().await;
        self.lock_history.lock().await.push(id);
        Ok(AccountLock::new(id, guard))
    }
}

// ============================================================================
// Ledger
// ============================================================================

type EntryKey = (TransactionId, String, LedgerEntryKind);

/// Balance change made inside an open unit of work
struct Posting {
    key: EntryKey,
    delta: Decimal,
}

#[derive(Default)]
struct Book {
    balances: HashMap<String, Decimal>,
    journal: Vec<LedgerEntry>,
    applied: HashSet<EntryKey>,
    /// Postings per open unit of work
    open: HashMap<TransactionId, Vec<Posting>>,
}

impl Book {
    fn key(entry: &LedgerEntry) -> EntryKey {
        (
            entry.transaction_id.clone(),
            entry.account_number.clone(),
            entry.kind,
        )
    }

    /// Record an entry whose balance change was already made
    fn post(&mut self, entry: &LedgerEntry, delta: Decimal) {
        let key = Book::key(entry);
        if let Some(postings) = self.open.get_mut(&entry.transaction_id) {
            postings.push(Posting {
                key: key.clone(),
                delta,
            });
        }
        self.applied.insert(key);
        self.journal.push(entry.clone());
    }

    fn undo(&mut self, postings: Vec<Posting>) {
        let mut undone = HashSet::with_capacity(postings.len());
        for posting in postings.into_iter().rev() {
            if let Some(balance) = self.balances.get_mut(&posting.key.1) {
                *balance -= posting.delta;
            }
            self.applied.remove(&posting.key);
            undone.insert(posting.key);
        }
        self.journal.retain(|e| !undone.contains(&Book::key(e)));
    }
}

/// Balances plus an append-only journal.
///
/// Also the [`UnitOfWork`] for its own entries: postings made while a
/// transaction id is open are undone together on rollback.
#[derive(Default)]
pub struct InMemoryLedger {
    book: Mutex<Book>,
    /// Accounts whose credits are refused
    frozen_for_credit: DashSet<String>,
    fail_rollback: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, account_number: &str, amount: Decimal) {
        self.book
            .lock()
            .await
            .balances
            .insert(account_number.to_string(), amount);
    }

    /// Refuse credits to `account_number`
    pub fn freeze_credits(&self, account_number: &str) {
        self.frozen_for_credit.insert(account_number.to_string());
    }

    /// Make `rollback` fail and leave the postings in place
    pub fn set_fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }

    pub async fn journal(&self) -> Vec<LedgerEntry> {
        self.book.lock().await.journal.clone()
    }

    pub async fn entries_for(&self, transaction_id: &TransactionId) -> Vec<LedgerEntry> {
        self.book
            .lock()
            .await
            .journal
            .iter()
            .filter(|e| &e.transaction_id == transaction_id)
            .cloned()
            .collect()
    }

    /// Number of units of work not yet committed or rolled back
    pub async fn open_units(&self) -> usize {
        self.book.lock().await.open.len()
    }
}

#[async_trait]
impl BalanceLedger for InMemoryLedger {
    async fn balance(&self, account_number: &str) -> Result<Decimal, TransferError> {
        self.book
            .lock()
            .await
            .balances
            .get(account_number)
            .copied()
            .ok_or_else(|| TransferError::AccountNotFound(account_number.to_string()))
    }

    async fn has_sufficient_balance(
        &self,
        account_number: &str,
        amount: Decimal,
    ) -> Result<bool, TransferError> {
        Ok(self.balance(account_number).await? >= amount)
    }

    async fn decrease(&self, entry: &LedgerEntry) -> Result<bool, TransferError> {
        let mut book = self.book.lock().await;
        if book.applied.contains(&Book::key(entry)) {
            return Ok(false);
        }

        let balance = book
            .balances
            .get_mut(&entry.account_number)
            .ok_or_else(|| TransferError::AccountNotFound(entry.account_number.clone()))?;
        if *balance < entry.amount {
            return Err(TransferError::InsufficientBalance(
                entry.account_number.clone(),
            ));
        }
        *balance -= entry.amount;

        book.post(entry, -entry.amount);
        Ok(true)
    }

    async fn increase(&self, entry: &LedgerEntry) -> Result<bool, TransferError> {
        if self.frozen_for_credit.contains(&entry.account_number) {
            return Err(TransferError::LedgerError(format!(
                "credit rejected for {}",
                entry.account_number
            )));
        }

        let mut book = self.book.lock().await;
        if book.applied.contains(&Book::key(entry)) {
            return Ok(false);
        }

        let balance = book
            .balances
            .get_mut(&entry.account_number)
            .ok_or_else(|| TransferError::AccountNotFound(entry.account_number.clone()))?;
        *balance += entry.amount;

        book.post(entry, entry.amount);
        Ok(true)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryLedger {
    async fn begin(&self, transaction_id: &TransactionId) -> Result<(), TransferError> {
        let mut book = self.book.lock().await;
        if book.open.contains_key(transaction_id) {
            return Err(TransferError::DuplicateTransaction(
                transaction_id.to_string(),
            ));
        }
        book.open.insert(transaction_id.clone(), Vec::new());
        Ok(())
    }

    async fn commit(&self, transaction_id: &TransactionId) -> Result<(), TransferError> {
        self.book.lock().await.open.remove(transaction_id);
        Ok(())
    }

    async fn rollback(&self, transaction_id: &TransactionId) -> Result<(), TransferError> {
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(TransferError::LedgerError(format!(
                "rollback failed for {}",
                transaction_id
            )));
        }

        let mut book = self.book.lock().await;
        if let Some(postings) = book.open.remove(transaction_id) {
            book.undo(postings);
        }
        Ok(())
    }
}

// ============================================================================
// Transfer records
// ============================================================================

struct StoredRecord {
    /// Insertion order, breaks `created_at` ties
    seq: u64,
    record: TransferRecord,
}

#[derive(Default)]
pub struct InMemoryTransferStore {
    records: DashMap<TransactionId, StoredRecord>,
    next_seq: AtomicU64,
    fail_writes: AtomicBool,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `insert` and `save` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check_writable(&self) -> Result<(), TransferError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransferError::DatabaseError(
                "transfer store unavailable".to_string(),
            ));
        }
        Ok(())
    }

    /// Records matching `filter`, newest first
    fn newest_first(&self, filter: impl Fn(&TransferRecord) -> bool) -> Vec<TransferRecord> {
        let mut matched: Vec<(u64, TransferRecord)> = self
            .records
            .iter()
            .filter(|r| filter(&r.record))
            .map(|r| (r.seq, r.record.clone()))
            .collect();
        matched.sort_by(|(a_seq, a), (b_seq, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b_seq.cmp(a_seq))
        });
        matched.into_iter().map(|(_, record)| record).collect()
    }
}

fn window(records: Vec<TransferRecord>, page: Page) -> Vec<TransferRecord> {
    records
        .into_iter()
        .skip(page.offset)
        .take(page.limit)
        .collect()
}

#[async_trait]
impl TransferStore for InMemoryTransferStore {
    async fn insert(&self, record: &TransferRecord) -> Result<(), TransferError> {
        self.check_writable()?;
        match self.records.entry(record.transaction_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(
                TransferError::DuplicateTransaction(record.transaction_id.to_string()),
            ),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(StoredRecord {
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    record: record.clone(),
                });
                Ok(())
            }
        }
    }

    async fn save(&self, record: &TransferRecord) -> Result<(), TransferError> {
        self.check_writable()?;
        match self.records.get_mut(&record.transaction_id) {
            Some(mut existing) => {
                existing.record = record.clone();
                Ok(())
            }
            None => Err(TransferError::TransferNotFound(
                record.transaction_id.to_string(),
            )),
        }
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<TransferRecord>, TransferError> {
        Ok(self.records.get(transaction_id).map(|r| r.record.clone()))
    }

    async fn exists_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<bool, TransferError> {
        Ok(self.records.contains_key(transaction_id))
    }

    async fn find_by_user(
        &self,
        user_id: UserId,
        direction: TransferDirection,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let records = self.newest_first(|r| {
            let sent = r.sender_id == user_id;
            let received = r.receiver_id == Some(user_id);
            match direction {
                TransferDirection::Any => sent || received,
                TransferDirection::Sent => sent,
                TransferDirection::Received => received,
            }
        });
        Ok(window(records, page))
    }

    async fn find_recent_receivers(
        &self,
        sender_id: UserId,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let mut seen = HashSet::new();
        let records = self
            .newest_first(|r| r.sender_id == sender_id && r.state == TransferState::Completed)
            .into_iter()
            .filter(|r| seen.insert(r.receiver_account_number.clone()))
            .collect();
        Ok(window(records, page))
    }
}

// ============================================================================
// PIN sessions
// ============================================================================

struct PinSession {
    scope: String,
    /// Successful checks left; None = unlimited
    remaining: Option<u32>,
}

/// Issued PIN sessions keyed by token
#[derive(Default)]
pub struct StaticPinSessions {
    sessions: DashMap<String, PinSession>,
}

impl StaticPinSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, token: &str, scope: &str) {
        self.sessions.insert(
            token.to_string(),
            PinSession {
                scope: scope.to_string(),
                remaining: None,
            },
        );
    }

    /// Session that expires after `checks` successful validations
    pub fn issue_limited(&self, token: &str, scope: &str, checks: u32) {
        self.sessions.insert(
            token.to_string(),
            PinSession {
                scope: scope.to_string(),
                remaining: Some(checks),
            },
        );
    }

    pub fn revoke(&self, token: &str) {
        self.sessions.remove(token);
    }
}

#[async_trait]
impl PinSessionValidator for StaticPinSessions {
    async fn validate(&self, token: &str, scope: &str) -> Result<bool, TransferError> {
        let mut session = match self.sessions.get_mut(token) {
            Some(session) => session,
            None => return Ok(false),
        };
        if session.scope != scope {
            return Ok(false);
        }
        match session.remaining.as_mut() {
            None => Ok(true),
            Some(0) => Ok(false),
            Some(left) => {
                *left -= 1;
                Ok(true)
            }
        }
    }
}

// ============================================================================
// Audit / notifications
// ============================================================================

#[derive(Default)]
pub struct RecordingAuditLog {
    successes: Mutex<Vec<AuditEntry>>,
    failures: Mutex<Vec<AuditEntry>>,
    fail: AtomicBool,
}

impl RecordingAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn successes(&self) -> Vec<AuditEntry> {
        self.successes.lock().await.clone()
    }

    pub async fn failures(&self) -> Vec<AuditEntry> {
        self.failures.lock().await.clone()
    }

    fn check(&self) -> Result<(), TransferError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransferError::SystemError("audit sink unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLog for RecordingAuditLog {
    async fn log_success(&self, entry: AuditEntry) -> Result<(), TransferError> {
        self.check()?;
        tracing::info!(
            transaction_id = %entry.transaction_id,
            actor_id = entry.actor_id,
            event = entry.event_type.as_str(),
            "{}",
            entry.description
        );
        self.successes.lock().await.push(entry);
        Ok(())
    }

    async fn log_failure(&self, entry: AuditEntry) -> Result<(), TransferError> {
        self.check()?;
        tracing::warn!(
            transaction_id = %entry.transaction_id,
            actor_id = entry.actor_id,
            event = entry.event_type.as_str(),
            detail = %entry.detail,
            "{}",
            entry.description
        );
        self.failures.lock().await.push(entry);
        Ok(())
    }
}

/// One delivered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub user_id: UserId,
    pub handle: String,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: UserId, handle: &str, message: &str) {
        tracing::debug!(user_id, handle, "notification: {}", message);
        self.sent.lock().await.push(Notification {
            user_id,
            handle: handle.to_string(),
            message: message.to_string(),
        });
    }
}

// ============================================================================
// Banking gateway
// ============================================================================

/// Gateway answering from a script, then with a default response
pub struct ScriptedBankingGateway {
    script: Mutex<VecDeque<Result<BankingResponse, String>>>,
    default_response: BankingResponse,
    requests: Mutex<Vec<BankingRequest>>,
    calls: AtomicUsize,
}

impl Default for ScriptedBankingGateway {
    fn default() -> Self {
        Self::new(BankingResponse::success("BANK-DEFAULT"))
    }
}

impl ScriptedBankingGateway {
    pub fn new(default_response: BankingResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_response,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue the next answer
    pub async fn push_response(&self, response: BankingResponse) {
        self.script.lock().await.push_back(Ok(response));
    }

    /// Queue a transport failure
    pub async fn push_transport_error(&self, message: &str) {
        self.script.lock().await.push_back(Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<BankingRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl BankingGateway for ScriptedBankingGateway {
    async fn process_transfer(
        &self,
        request: &BankingRequest,
    ) -> Result<BankingResponse, TransferError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        match self.script.lock().await.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(TransferError::GatewayError(message)),
            None => Ok(self.default_response.clone()),
        }
    }
}
