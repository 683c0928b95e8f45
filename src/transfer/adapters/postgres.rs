//! PostgreSQL adapters
//!
//! - `PgTransferStore`: durable `TransferStore` over `transfers_tb`. The
//!   unique index on `transaction_id` is the idempotency anchor for `insert`.
//! - `PgLedger`: balances and journal. Also the `UnitOfWork`: each open
//!   transaction id holds one database transaction, so both legs of a
//!   transfer commit or roll back together.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgConnection, PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;

use crate::core_types::{TransactionId, UserId};
use crate::transfer::error::TransferError;
use crate::transfer::state::TransferState;
use crate::transfer::types::{LedgerEntry, Page, TransferDirection, TransferKind, TransferRecord};

use super::{BalanceLedger, TransferStore, UnitOfWork};

/// Schema for `transfers_tb`, kept in sync with `sql/transfers.sql`
pub const SCHEMA: &str = include_str!("../../../sql/transfers.sql");

/// Schema for the ledger tables, kept in sync with `sql/ledger.sql`
pub const LEDGER_SCHEMA: &str = include_str!("../../../sql/ledger.sql");

const COLUMNS: &str = r#"
    transaction_id, kind, sender_id, sender_account_number, receiver_id,
    receiver_account_number, receiver_bank_code, receiver_bank_name, amount, memo,
    state, bank_transaction_id, reason, created_at, updated_at
"#;

async fn pool(url: &str) -> Result<PgPool, TransferError> {
    Ok(PgPoolOptions::new().max_connections(5).connect(url).await?)
}

fn page_bounds(page: Page) -> (i64, i64) {
    (page.limit as i64, page.offset as i64)
}

// ============================================================================
// Transfer records
// ============================================================================

pub struct PgTransferStore {
    pool: PgPool,
}

impl PgTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the table exists
    pub async fn connect(url: &str) -> Result<Self, TransferError> {
        let store = Self::new(pool(url).await?);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), TransferError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<TransferRecord, TransferError> {
        let state_id: i16 = row.get("state");
        let state = TransferState::from_id(state_id)
            .ok_or_else(|| TransferError::SystemError(format!("Invalid state ID: {}", state_id)))?;

        let kind_id: i16 = row.get("kind");
        let kind = TransferKind::from_id(kind_id)
            .ok_or_else(|| TransferError::SystemError(format!("Invalid kind ID: {}", kind_id)))?;

        let transaction_id: String = row.get("transaction_id");

        Ok(TransferRecord {
            transaction_id: TransactionId::new(transaction_id),
            kind,
            sender_id: row.get::<i64, _>("sender_id") as UserId,
            sender_account_number: row.get("sender_account_number"),
            receiver_id: row
                .get::<Option<i64>, _>("receiver_id")
                .map(|id| id as UserId),
            receiver_account_number: row.get("receiver_account_number"),
            receiver_bank_code: row.get("receiver_bank_code"),
            receiver_bank_name: row.get("receiver_bank_name"),
            amount: row.get("amount"),
            memo: row.get("memo"),
            state,
            bank_transaction_id: row.get("bank_transaction_id"),
            reason: row.get("reason"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn rows_to_records(
        rows: Vec<sqlx::postgres::PgRow>,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(Self::row_to_record(&row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl TransferStore for PgTransferStore {
    async fn insert(&self, record: &TransferRecord) -> Result<(), TransferError> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO transfers_tb ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
            COLUMNS
        ))
        .bind(record.transaction_id.as_str())
        .bind(record.kind.id())
        .bind(record.sender_id as i64)
        .bind(&record.sender_account_number)
        .bind(record.receiver_id.map(|id| id as i64))
        .bind(&record.receiver_account_number)
        .bind(&record.receiver_bank_code)
        .bind(&record.receiver_bank_name)
        .bind(record.amount)
        .bind(&record.memo)
        .bind(record.state.id())
        .bind(&record.bank_transaction_id)
        .bind(&record.reason)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransferError::DuplicateTransaction(
                record.transaction_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn save(&self, record: &TransferRecord) -> Result<(), TransferError> {
        let result = sqlx::query(
            r#"
            UPDATE transfers_tb
            SET state = $1, bank_transaction_id = $2, reason = $3, updated_at = $4
            WHERE transaction_id = $5
            "#,
        )
        .bind(record.state.id())
        .bind(&record.bank_transaction_id)
        .bind(&record.reason)
        .bind(record.updated_at)
        .bind(record.transaction_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransferError::TransferNotFound(
                record.transaction_id.to_string(),
            ));
        }
        Ok(())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<TransferRecord>, TransferError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transfers_tb WHERE transaction_id = $1",
            COLUMNS
        ))
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn exists_by_transaction_id(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<bool, TransferError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM transfers_tb WHERE transaction_id = $1)",
        )
        .bind(transaction_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_by_user(
        &self,
        user_id: UserId,
        direction: TransferDirection,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let filter = match direction {
            TransferDirection::Any => "sender_id = $1 OR receiver_id = $1",
            TransferDirection::Sent => "sender_id = $1",
            TransferDirection::Received => "receiver_id = $1",
        };
        let (limit, offset) = page_bounds(page);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM transfers_tb
            WHERE {}
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            COLUMNS, filter
        ))
        .bind(user_id as i64)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }

    async fn find_recent_receivers(
        &self,
        sender_id: UserId,
        page: Page,
    ) -> Result<Vec<TransferRecord>, TransferError> {
        let (limit, offset) = page_bounds(page);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {columns} FROM (
                SELECT DISTINCT ON (receiver_account_number) id, {columns}
                FROM transfers_tb
                WHERE sender_id = $1 AND state = $2
                ORDER BY receiver_account_number, created_at DESC, id DESC
            ) latest
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
            columns = COLUMNS
        ))
        .bind(sender_id as i64)
        .bind(TransferState::Completed.id())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(rows)
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Database transaction behind one open unit of work; `None` once settled
type OpenUnit = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

pub struct PgLedger {
    pool: PgPool,
    open: DashMap<TransactionId, OpenUnit>,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            open: DashMap::new(),
        }
    }

    /// Connect and make sure the tables exist
    pub async fn connect(url: &str) -> Result<Self, TransferError> {
        let ledger = Self::new(pool(url).await?);
        ledger.ensure_schema().await?;
        Ok(ledger)
    }

    pub async fn ensure_schema(&self) -> Result<(), TransferError> {
        sqlx::raw_sql(LEDGER_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Create or reset a balance row
    pub async fn open_account(
        &self,
        account_number: &str,
        balance: Decimal,
    ) -> Result<(), TransferError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_balances_tb (account_number, balance)
            VALUES ($1, $2)
            ON CONFLICT (account_number)
            DO UPDATE SET balance = EXCLUDED.balance, updated_at = NOW()
            "#,
        )
        .bind(account_number)
        .bind(balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Journal row then balance change. Returns `false` when the entry is
    /// already journaled.
    async fn apply(
        conn: &mut PgConnection,
        entry: &LedgerEntry,
        delta: Decimal,
    ) -> Result<bool, TransferError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO ledger_entries_tb
                (transaction_id, account_number, kind, amount, note, actor_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (transaction_id, account_number, kind) DO NOTHING
            "#,
        )
        .bind(entry.transaction_id.as_str())
        .bind(&entry.account_number)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(&entry.note)
        .bind(entry.actor_id as i64)
        .execute(&mut *conn)
        .await?;
        if inserted.rows_affected() == 0 {
            return Ok(false);
        }

        let updated = sqlx::query(
            r#"
            UPDATE ledger_balances_tb
            SET balance = balance + $1, updated_at = NOW()
            WHERE account_number = $2 AND balance + $1 >= 0
            "#,
        )
        .bind(delta)
        .bind(&entry.account_number)
        .execute(&mut *conn)
        .await?;
        if updated.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM ledger_balances_tb WHERE account_number = $1)",
            )
            .bind(&entry.account_number)
            .fetch_one(&mut *conn)
            .await?;
            return Err(if exists {
                TransferError::InsufficientBalance(entry.account_number.clone())
            } else {
                TransferError::AccountNotFound(entry.account_number.clone())
            });
        }
        Ok(true)
    }

    /// Apply one entry atomically on `conn`. Inside an open unit this is a
    /// savepoint, otherwise a transaction of its own.
    async fn post_on(
        conn: &mut PgConnection,
        entry: &LedgerEntry,
        delta: Decimal,
    ) -> Result<bool, TransferError> {
        let mut tx = conn.begin().await?;
        match Self::apply(&mut tx, entry, delta).await {
            Ok(applied) => {
                tx.commit().await?;
                Ok(applied)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn post(&self, entry: &LedgerEntry, delta: Decimal) -> Result<bool, TransferError> {
        let unit = self
            .open
            .get(&entry.transaction_id)
            .map(|unit| unit.value().clone());

        match unit {
            Some(unit) => {
                let mut guard = unit.lock().await;
                let tx = guard.as_mut().ok_or_else(|| {
                    TransferError::LedgerError(format!(
                        "unit of work {} already settled",
                        entry.transaction_id
                    ))
                })?;
                Self::post_on(tx, entry, delta).await
            }
            None => {
                let mut conn = self.pool.acquire().await?;
                Self::post_on(&mut conn, entry, delta).await
            }
        }
    }

    async fn take(&self, transaction_id: &TransactionId) -> Option<Transaction<'static, Postgres>> {
        let (_, unit) = self.open.remove(transaction_id)?;
        let mut guard = unit.lock().await;
        guard.take()
    }
}

#[async_trait]
impl BalanceLedger for PgLedger {
    async fn balance(&self, account_number: &str) -> Result<Decimal, TransferError> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT balance FROM ledger_balances_tb WHERE account_number = $1",
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?
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
        self.post(entry, -entry.amount).await
    }

    async fn increase(&self, entry: &LedgerEntry) -> Result<bool, TransferError> {
        self.post(entry, entry.amount).await
    }
}

#[async_trait]
impl UnitOfWork for PgLedger {
    async fn begin(&self, transaction_id: &TransactionId) -> Result<(), TransferError> {
        let tx = self.pool.begin().await?;
        match self.open.entry(transaction_id.clone()) {
            // dropping `tx` rolls it back
            Entry::Occupied(_) => Err(TransferError::DuplicateTransaction(
                transaction_id.to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(Some(tx))));
                Ok(())
            }
        }
    }

    async fn commit(&self, transaction_id: &TransactionId) -> Result<(), TransferError> {
        if let Some(tx) = self.take(transaction_id).await {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&self, transaction_id: &TransactionId) -> Result<(), TransferError> {
        if let Some(tx) = self.take(transaction_id).await {
            tx.rollback().await?;
        }
        Ok(())
    }
}
