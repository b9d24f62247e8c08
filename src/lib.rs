// ============================================================================
// cmdreport Library
// ============================================================================

pub mod core;
pub mod record;
pub mod channel;
pub mod client;
pub mod lifecycle;
pub mod config;
mod report;

// Re-export main types for convenience
pub use crate::core::{AttributeValue, CommandAttribute, CommandEntry, CommandId, ReportError, Result};
pub use crate::record::{AckStatus, Acknowledgment, CommandRecord, merge};
pub use crate::channel::{RecordChannel, RecordView, RecordWatcher};
pub use crate::client::{
    ClientStats, CommandHistoryClient, CommandUpdateOptions, CommandUpdateStream, EntryFilter,
    InMemoryCommandClient,
};
pub use crate::lifecycle::{DisposalScope, DisposalToken, LiveSubscription};
pub use crate::config::{FilterPlacement, ReportConfig};

// ============================================================================
// Command Report API
// ============================================================================

pub use crate::report::{CommandReport, StartupState};
