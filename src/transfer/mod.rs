//! Transfer Orchestration Engine
//!
//! Moves money between platform accounts, or out to a partner bank, with an
//! optional PIN-gated front for either path.
//!
//! # Architecture
//!
//! A [`TransferCommand`] is dispatched by kind to exactly one action. The
//! [`ActionProcessor`] drives that action through four phases inside one
//! unit of work:
//!
//! ```text
//! begin → validate → save_pending → execute → commit | rollback → update_from_result
//! ```
//!
//! # Record Lifecycle
//!
//! ```text
//! PENDING → PROCESSING → COMPLETED
//!    ↓          ↓  ↘
//!  FAILED    FAILED  PENDING / TIMEOUT ──(gateway report)──→ COMPLETED | FAILED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Validate-Before-Persist**: A rejected command never creates a record
//! 2. **No Stuck Pending**: After `save_pending`, every error path still runs
//!    `update_from_result`
//! 3. **Lock Ordering**: Account row locks are taken in ascending `AccountId`
//! 4. **Debit-On-Answer**: External transfers debit only on a definitive
//!    gateway `Success`; the debit is keyed on the transaction id
//! 5. **All-Or-Nothing Ledger**: Entries of a failed command are rolled back
//!    before its record is marked FAILED; if the rollback fails the record
//!    stays non-terminal

pub mod actions;
pub mod adapters;
pub mod command;
pub mod error;
pub mod id;
pub mod result;
pub mod service;
pub mod state;
pub mod types;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use actions::{
    ActionProcessor, ActionResolver, DynTransferAction, ExternalTransferAction,
    InternalTransferAction, ProcessingPhase, ProcessorStatus, SecureTransferAction,
    TransferAction,
};
pub use adapters::{TransferPorts, UnitOfWork};
pub use command::{CommandKind, ExternalTransfer, InternalTransfer, SecureTransfer, TransferCommand};
pub use error::TransferError;
pub use id::TransactionIdGenerator;
pub use result::{ActionResult, ActionStatus, Payload, RejectReason, Verdict, codes};
pub use service::{ExternalTransferRequest, SecureTransferRequest, TransferRequest, TransferService};
pub use state::TransferState;
pub use types::{
    Account, AuditEntry, AuditEventType, BankingRequest, BankingResponse, BankingStatus,
    LedgerEntry, LedgerEntryKind, Page, TransferDirection, TransferKind, TransferRecord, User,
};
