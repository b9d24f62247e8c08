use thiserror::Error;

/// Errors surfaced by a command report and its collaborators.
///
/// Merge precondition violations are not represented here: merging an entry
/// into a record of a different command is a programming error and panics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Live stream open failed: {0}")]
    StreamOpen(String),

    #[error("Command '{0}' not found")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Report cancelled before the live stream was established")]
    Cancelled,

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

impl ReportError {
    /// Reclassifies a collaborator failure as a startup failure of the live stream.
    pub fn into_stream_open(self) -> Self {
        match self {
            Self::StreamOpen(_) | Self::Cancelled => self,
            other => Self::StreamOpen(other.to_string()),
        }
    }

    /// Expected collaborator answers (unknown command, flaky transport), as
    /// opposed to faults. Either way a failed backfill leaves the report
    /// running on live data; only the log level differs.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

impl From<tokio::task::JoinError> for ReportError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::ExecutionError(format!("report task join: {}", err))
    }
}
