//! Collaborator contract for the transport that delivers command history.

mod memory;

pub use memory::{ClientStats, InMemoryCommandClient};

use crate::core::{CommandEntry, CommandId, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Live stream of entries for in-flight commands.
pub type CommandUpdateStream = BoxStream<'static, CommandEntry>;

/// Options forwarded when opening the live update stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandUpdateOptions {
    /// The transport need not replay pre-existing state when set.
    pub ignore_past_commands: bool,
    /// Restrict delivery to one command, when the transport can filter.
    pub command_filter: Option<CommandId>,
}

/// Predicate selecting the entries that belong to one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    command_id: CommandId,
}

impl EntryFilter {
    pub fn command(command_id: CommandId) -> Self {
        Self { command_id }
    }

    pub fn matches(&self, entry: &CommandEntry) -> bool {
        entry.command_id() == &self.command_id
    }

    pub fn command_id(&self) -> &CommandId {
        &self.command_id
    }
}

/// Transport/client used by a command report.
///
/// Implementations must be cheap to share (`Arc`) across the report task.
#[async_trait]
pub trait CommandHistoryClient: Send + Sync + 'static {
    /// Opens the live stream. Resolves once the transport acknowledged the
    /// subscription.
    async fn open_command_updates(
        &self,
        options: CommandUpdateOptions,
    ) -> Result<CommandUpdateStream>;

    /// Single-shot lookup of the stored history of one command.
    ///
    /// Fails with `ReportError::NotFound` for unknown identifiers.
    async fn get_command_history_entry(&self, id: &CommandId) -> Result<CommandEntry>;

    /// Releases transport-side subscription resources.
    ///
    /// Must be a no-op when nothing was opened.
    async fn close_command_updates(&self) -> Result<()>;

    /// Whether `CommandUpdateOptions::command_filter` is honoured.
    fn supports_command_filter(&self) -> bool {
        false
    }
}
