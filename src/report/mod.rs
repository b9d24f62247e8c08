//! Live report of one command: opens the filtered update stream, backfills
//! the stored history and keeps the merged record published.

mod task;

use crate::channel::{RecordChannel, RecordView, RecordWatcher};
use crate::client::CommandHistoryClient;
use crate::config::ReportConfig;
use crate::core::{CommandId, ReportError, Result};
use crate::lifecycle::DisposalScope;
use std::sync::Arc;
use task::ReportTask;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

/// Startup progress of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupState {
    /// Waiting for the transport to acknowledge the live stream.
    Opening,
    /// Live stream established; entries are being merged.
    Live,
    /// The live stream could not be established. No record will be produced.
    Failed(ReportError),
    /// Torn down before the live stream was established.
    Cancelled,
}

/// Handle to a running command report.
///
/// Dropping the handle tears the report down; the background task still
/// releases the live stream with the transport.
///
/// # Examples
///
/// ```
/// use cmdreport::{
///     CommandEntry, CommandId, CommandReport, DisposalScope, InMemoryCommandClient,
///     ReportConfig,
/// };
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Arc::new(InMemoryCommandClient::new());
/// let id = CommandId::new("cmd-42")?;
/// client.record_history(CommandEntry::new(id.clone()).with("ack", "ACCEPTED"));
///
/// let scope = DisposalScope::new();
/// let report = CommandReport::open(client, "cmd-42", &scope, ReportConfig::default()).await?;
///
/// let mut records = report.records();
/// let record = records.wait_for(|r| r.attribute("ack").is_some()).await.unwrap();
/// assert_eq!(record.identity(), &id);
///
/// scope.dispose();
/// report.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct CommandReport {
    target: CommandId,
    channel: RecordChannel,
    status: watch::Receiver<StartupState>,
    scope: DisposalScope,
    join_handle: Option<JoinHandle<()>>,
}

impl CommandReport {
    /// Starts tracking `target`.
    ///
    /// Fails immediately on a configuration error (empty identifier, no
    /// runtime). Transport failures are reported through [`ready`](Self::ready).
    /// The report is torn down when `scope` is disposed, or by
    /// [`teardown`](Self::teardown).
    pub fn spawn<C>(
        client: Arc<C>,
        target: impl Into<String>,
        scope: &DisposalScope,
        config: ReportConfig,
    ) -> Result<Self>
    where
        C: CommandHistoryClient + ?Sized,
    {
        let target = CommandId::new(target)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            ReportError::Configuration("command report requires a tokio runtime".to_string())
        })?;

        let scope = scope.child();
        let channel = RecordChannel::new();
        let (status_tx, status) = watch::channel(StartupState::Opening);

        let task = ReportTask {
            client,
            target: target.clone(),
            config,
            channel: channel.clone(),
            status: status_tx,
            token: scope.token(),
        };
        let span = info_span!("command.report", command = %target);
        let join_handle = runtime.spawn(task.run().instrument(span));

        Ok(Self {
            target,
            channel,
            status,
            scope,
            join_handle: Some(join_handle),
        })
    }

    /// [`spawn`](Self::spawn) followed by [`ready`](Self::ready).
    pub async fn open<C>(
        client: Arc<C>,
        target: impl Into<String>,
        scope: &DisposalScope,
        config: ReportConfig,
    ) -> Result<Self>
    where
        C: CommandHistoryClient + ?Sized,
    {
        let report = Self::spawn(client, target, scope, config)?;
        report.ready().await?;
        Ok(report)
    }

    pub fn target(&self) -> &CommandId {
        &self.target
    }

    /// Observer of the merged record, starting from the current value.
    pub fn records(&self) -> RecordWatcher {
        self.channel.subscribe()
    }

    pub fn current(&self) -> RecordView {
        self.channel.current()
    }

    pub fn startup_state(&self) -> StartupState {
        self.status.borrow().clone()
    }

    /// Waits for the live stream to be established.
    pub async fn ready(&self) -> Result<()> {
        let mut status = self.status.clone();
        let state = status
            .wait_for(|state| !matches!(state, StartupState::Opening))
            .await
            .map(|state| state.clone())
            .map_err(|_| {
                ReportError::ExecutionError("report task ended during startup".to_string())
            })?;
        match state {
            StartupState::Live => Ok(()),
            StartupState::Failed(err) => Err(err),
            StartupState::Cancelled => Err(ReportError::Cancelled),
            StartupState::Opening => Err(ReportError::ExecutionError(
                "report startup still pending".to_string(),
            )),
        }
    }

    /// Requests teardown. Returns `true` only for the first effective call.
    pub fn teardown(&self) -> bool {
        self.scope.dispose()
    }

    pub fn is_torn_down(&self) -> bool {
        self.scope.is_disposed()
    }

    /// Tears down and waits until the live stream has been released.
    pub async fn shutdown(mut self) -> Result<()> {
        self.teardown();
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.await?;
        }
        Ok(())
    }
}

impl Drop for CommandReport {
    fn drop(&mut self) {
        self.scope.dispose();
    }
}
