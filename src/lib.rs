//! Remit Engine - Transfer Orchestration
//!
//! Moves money between accounts of a payment platform, or out to a partner
//! bank, through a four-phase action lifecycle.
//!
//! # Modules
//!
//! - [`core_types`] - Core identifiers (UserId, AccountId, TransactionId)
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing subscriber setup
//! - [`transfer`] - Commands, actions, resolver, processor and collaborator ports

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use config::{AppConfig, TransferConfig};
pub use core_types::{AccountId, TransactionId, UserId};
pub use transfer::{
    ActionProcessor, ActionResult, TransferCommand, TransferError, TransferService, TransferState,
};
