use super::StartupState;
use crate::channel::RecordChannel;
use crate::client::{CommandHistoryClient, CommandUpdateOptions, EntryFilter};
use crate::config::{FilterPlacement, ReportConfig};
use crate::core::{CommandEntry, CommandId};
use crate::lifecycle::{DisposalToken, LiveSubscription};
use crate::record::{CommandRecord, merge};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy)]
enum EntrySource {
    Live,
    Backfill,
}

impl EntrySource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Backfill => "backfill",
        }
    }
}

/// Sole owner of the record; every merge goes through here.
struct MergeState {
    current: Option<Arc<CommandRecord>>,
    channel: RecordChannel,
}

impl MergeState {
    fn apply(&mut self, entry: &CommandEntry, source: EntrySource) {
        let merged = merge(self.current.as_deref(), entry);
        event!(
            Level::DEBUG,
            source = source.as_str(),
            attributes = entry.attributes().len(),
            merge_count = merged.merge_count(),
            "entry merged"
        );
        self.current = Some(self.channel.publish(merged));
    }
}

pub(super) struct ReportTask<C: CommandHistoryClient + ?Sized> {
    pub(super) client: Arc<C>,
    pub(super) target: CommandId,
    pub(super) config: ReportConfig,
    pub(super) channel: RecordChannel,
    pub(super) status: watch::Sender<StartupState>,
    pub(super) token: DisposalToken,
}

impl<C: CommandHistoryClient + ?Sized> ReportTask<C> {
    pub(super) async fn run(self) {
        let Self {
            client,
            target,
            config,
            channel,
            status,
            mut token,
        } = self;

        let filter = EntryFilter::command(target.clone());
        let transport_filter = config.filter_placement == FilterPlacement::Transport
            && client.supports_command_filter();
        let options = CommandUpdateOptions {
            ignore_past_commands: config.ignore_past_commands,
            command_filter: transport_filter.then(|| target.clone()),
        };

        // The open is never abandoned: a teardown that races it is applied
        // once the transport has answered.
        let open = client.open_command_updates(options);
        tokio::pin!(open);
        let mut close_requested = false;
        let opened = loop {
            if close_requested {
                break (&mut open).await;
            }
            tokio::select! {
                result = &mut open => break result,
                _ = token.disposed() => {
                    close_requested = true;
                    event!(Level::INFO, "teardown requested while live stream is opening");
                }
            }
        };

        let stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                if close_requested {
                    event!(Level::INFO, error = %err, "live stream open failed after teardown");
                    status.send_replace(StartupState::Cancelled);
                } else {
                    event!(Level::ERROR, error = %err, "live stream open failed");
                    status.send_replace(StartupState::Failed(err.into_stream_open()));
                }
                return;
            }
        };

        // Re-checked locally even when the transport filters, so a foreign
        // entry can never reach the merge.
        let stream = stream
            .filter(move |entry| futures::future::ready(filter.matches(entry)))
            .boxed();
        let mut live = LiveSubscription::new(Arc::clone(&client), stream);

        if close_requested {
            live.release().await;
            status.send_replace(StartupState::Cancelled);
            event!(Level::INFO, "live stream released right after opening");
            return;
        }
        status.send_replace(StartupState::Live);
        event!(Level::INFO, transport_filter, "live stream established");

        let mut state = MergeState {
            current: None,
            channel,
        };

        let backfill = {
            let client = Arc::clone(&client);
            let target = target.clone();
            async move { client.get_command_history_entry(&target).await }
        };
        tokio::pin!(backfill);
        let mut backfill_pending = config.backfill;
        let mut live_open = true;

        loop {
            tokio::select! {
                biased;
                _ = token.disposed() => break,
                next = live.next(), if live_open => match next {
                    Some(entry) => state.apply(&entry, EntrySource::Live),
                    None => {
                        live_open = false;
                        event!(Level::INFO, "live stream ended");
                    }
                },
                fetched = &mut backfill, if backfill_pending => {
                    backfill_pending = false;
                    match fetched {
                        Ok(entry) if entry.command_id() == &target => {
                            state.apply(&entry, EntrySource::Backfill);
                        }
                        Ok(entry) => {
                            event!(
                                Level::ERROR,
                                returned = %entry.command_id(),
                                "backfill returned an entry for another command; ignored"
                            );
                        }
                        Err(err) if err.is_soft() => {
                            event!(
                                Level::WARN,
                                error = %err,
                                "backfill fetch failed; continuing with live updates"
                            );
                        }
                        Err(err) => {
                            event!(
                                Level::ERROR,
                                error = %err,
                                "backfill fetch failed unexpectedly; continuing with live updates"
                            );
                        }
                    }
                }
            }
        }

        live.release().await;
        event!(Level::INFO, "command report released");
    }
}
