//! Action Resolver
//!
//! Static `CommandKind -> action` table built once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::transfer::command::{CommandKind, TransferCommand};
use crate::transfer::error::TransferError;

use super::DynTransferAction;

pub struct ActionResolver {
    actions: FxHashMap<CommandKind, Arc<dyn DynTransferAction>>,
}

impl ActionResolver {
    /// Build the table. Two actions claiming the same kind is a wiring bug
    /// and fails with `DuplicateAction`.
    pub fn new(
        actions: impl IntoIterator<Item = Arc<dyn DynTransferAction>>,
    ) -> Result<Self, TransferError> {
        let mut table: FxHashMap<CommandKind, Arc<dyn DynTransferAction>> = FxHashMap::default();

        for action in actions {
            let kind = action.kind();
            if table.contains_key(&kind) {
                return Err(TransferError::DuplicateAction(kind));
            }
            tracing::debug!(kind = %kind, action = action.name(), "Registered transfer action");
            table.insert(kind, action);
        }

        tracing::info!(count = table.len(), "Action resolver initialized");
        Ok(Self { actions: table })
    }

    /// O(1) lookup by the command's kind tag
    pub fn resolve(
        &self,
        command: &TransferCommand,
    ) -> Result<Arc<dyn DynTransferAction>, TransferError> {
        let kind = command.kind();
        self.actions.get(&kind).cloned().ok_or_else(|| {
            tracing::error!(
                kind = %kind,
                transaction_id = %command.transaction_id(),
                "No action registered for command kind"
            );
            TransferError::UnsupportedCommand(kind)
        })
    }

    pub fn is_supported(&self, kind: CommandKind) -> bool {
        self.actions.contains_key(&kind)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Kind -> action name, ordered by kind name
    pub fn registered_actions(&self) -> BTreeMap<&'static str, &'static str> {
        self.actions
            .iter()
            .map(|(kind, action)| (kind.as_str(), action.name()))
            .collect()
    }
}
