//! Transfer Actions
//!
//! One action per command kind. Each action implements the four lifecycle
//! phases driven by the [`ActionProcessor`]:
//!
//! ```text
//! validate → save_pending → execute → update_from_result
//! ```
//!
//! Actions are written against their own command type ([`TransferAction`]);
//! the resolver stores them behind [`DynTransferAction`], which unwraps the
//! matching [`TransferCommand`] variant before forwarding.

pub mod external;
pub mod internal;
pub mod processor;
pub mod resolver;
pub mod secure;

pub use external::ExternalTransferAction;
pub use internal::InternalTransferAction;
pub use processor::{ActionProcessor, ProcessingPhase, ProcessorStatus};
pub use resolver::ActionResolver;
pub use secure::SecureTransferAction;

use async_trait::async_trait;

use super::command::{CommandKind, TransferCommand};
use super::error::TransferError;
use super::result::{ActionResult, Verdict};

/// Lifecycle of one command kind
#[async_trait]
pub trait TransferAction: Send + Sync {
    type Command: Send + Sync;

    /// The one command kind this action owns
    const KIND: CommandKind;

    /// Name for logs and status reports
    fn name(&self) -> &'static str;

    /// Borrow the matching variant, if `command` is of this action's kind
    fn command_of(command: &TransferCommand) -> Option<&Self::Command>;

    /// Business preconditions. `Err` is reserved for missing references and
    /// infrastructure faults.
    async fn validate(&self, command: &Self::Command) -> Result<Verdict, TransferError>;

    /// Create the PENDING record keyed by the command's transaction id
    async fn save_pending(&self, command: &Self::Command) -> Result<(), TransferError>;

    /// Move the money. Ordinary failures come back as a `Failure` result.
    async fn execute(&self, command: &Self::Command) -> Result<ActionResult, TransferError>;

    /// Apply the outcome to the record, then audit and notify.
    ///
    /// Re-invocable: the record is re-read on every call and an outcome that
    /// is already applied causes no further side effects.
    async fn update_from_result(
        &self,
        command: &Self::Command,
        result: &ActionResult,
    ) -> Result<(), TransferError>;
}

/// Object-safe view of a [`TransferAction`], as stored by the resolver
#[async_trait]
pub trait DynTransferAction: Send + Sync {
    fn kind(&self) -> CommandKind;

    fn name(&self) -> &'static str;

    async fn validate(&self, command: &TransferCommand) -> Result<Verdict, TransferError>;

    async fn save_pending(&self, command: &TransferCommand) -> Result<(), TransferError>;

    async fn execute(&self, command: &TransferCommand) -> Result<ActionResult, TransferError>;

    async fn update_from_result(
        &self,
        command: &TransferCommand,
        result: &ActionResult,
    ) -> Result<(), TransferError>;
}

fn typed<'a, A: TransferAction>(
    action: &A,
    command: &'a TransferCommand,
) -> Result<&'a A::Command, TransferError> {
    A::command_of(command).ok_or(TransferError::CommandMismatch {
        action: TransferAction::name(action),
        actual: command.kind(),
    })
}

#[async_trait]
impl<A: TransferAction> DynTransferAction for A {
    fn kind(&self) -> CommandKind {
        A::KIND
    }

    fn name(&self) -> &'static str {
        TransferAction::name(self)
    }

    async fn validate(&self, command: &TransferCommand) -> Result<Verdict, TransferError> {
        TransferAction::validate(self, typed(self, command)?).await
    }

    async fn save_pending(&self, command: &TransferCommand) -> Result<(), TransferError> {
        TransferAction::save_pending(self, typed(self, command)?).await
    }

    async fn execute(&self, command: &TransferCommand) -> Result<ActionResult, TransferError> {
        TransferAction::execute(self, typed(self, command)?).await
    }

    async fn update_from_result(
        &self,
        command: &TransferCommand,
        result: &ActionResult,
    ) -> Result<(), TransferError> {
        TransferAction::update_from_result(self, typed(self, command)?, result).await
    }
}
