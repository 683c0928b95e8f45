//! Transaction id generation
//!
//! `<prefix>` + 12 upper-case alphanumerics taken from a random UUID v4,
//! regenerated until the store reports no collision.

use std::sync::Arc;

use uuid::Uuid;

use crate::core_types::TransactionId;

use super::adapters::TransferStore;
use super::error::TransferError;

const SUFFIX_LEN: usize = 12;
const MAX_ATTEMPTS: usize = 16;

pub struct TransactionIdGenerator {
    prefix: String,
    store: Arc<dyn TransferStore>,
}

impl TransactionIdGenerator {
    pub fn new(prefix: impl Into<String>, store: Arc<dyn TransferStore>) -> Self {
        Self {
            prefix: prefix.into(),
            store,
        }
    }

    /// One candidate id, not checked against the store
    pub fn candidate(&self) -> TransactionId {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SUFFIX_LEN)
            .collect::<String>()
            .to_uppercase();
        TransactionId::new(format!("{}{}", self.prefix, suffix))
    }

    pub async fn generate(&self) -> Result<TransactionId, TransferError> {
        for _ in 0..MAX_ATTEMPTS {
            let id = self.candidate();
            if !self.store.exists_by_transaction_id(&id).await? {
                return Ok(id);
            }
            tracing::warn!(transaction_id = %id, "Transaction id collision, regenerating");
        }
        Err(TransferError::SystemError(format!(
            "no unique transaction id after {} attempts",
            MAX_ATTEMPTS
        )))
    }
}
