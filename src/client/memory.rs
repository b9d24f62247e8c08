use super::{CommandHistoryClient, CommandUpdateOptions, CommandUpdateStream};
use crate::core::{CommandEntry, CommandId, ReportError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

/// Counters describing how a client has been driven.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub opens_requested: u64,
    pub opens_completed: u64,
    pub closes: u64,
    pub fetches: u64,
}

struct Subscriber {
    tx: mpsc::UnboundedSender<CommandEntry>,
    filter: Option<CommandId>,
}

#[derive(Default)]
struct ClientState {
    history: HashMap<CommandId, CommandEntry>,
    subscribers: Vec<Subscriber>,
    open_failure: Option<ReportError>,
    fetch_failure: Option<ReportError>,
    misrouted_fetch: Option<CommandEntry>,
    last_options: Option<CommandUpdateOptions>,
    stats: ClientStats,
}

/// Process-local command history source.
///
/// Serves as the reference collaborator for the CLI and as a test double:
/// opens and fetches can be held pending or made to fail on demand.
pub struct InMemoryCommandClient {
    state: Mutex<ClientState>,
    open_gate: watch::Sender<bool>,
    fetch_gate: watch::Sender<bool>,
    command_filter: bool,
}

impl InMemoryCommandClient {
    pub fn new() -> Self {
        let (open_gate, _) = watch::channel(true);
        let (fetch_gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(ClientState::default()),
            open_gate,
            fetch_gate,
            command_filter: false,
        }
    }

    /// Honour `CommandUpdateOptions::command_filter` on the transport side.
    pub fn with_command_filter(mut self) -> Self {
        self.command_filter = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds `entry` to the stored history; attributes accumulate per command.
    pub fn record_history(&self, entry: CommandEntry) {
        let mut state = self.lock();
        match state.history.get_mut(entry.command_id()) {
            Some(stored) => {
                for attr in entry.attributes() {
                    stored.push(attr.clone());
                }
            }
            None => {
                state.history.insert(entry.command_id().clone(), entry);
            }
        }
    }

    /// Delivers `entry` to every open live stream it passes the filter of.
    ///
    /// Returns the number of streams it was delivered to.
    pub fn emit(&self, entry: CommandEntry) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|sub| !sub.tx.is_closed());
        let mut delivered = 0;
        for sub in &state.subscribers {
            if let Some(filter) = &sub.filter {
                if filter != entry.command_id() {
                    continue;
                }
            }
            if sub.tx.send(entry.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Delivers `entry` to every open live stream, ignoring transport-side
    /// filters, the way a misbehaving server would.
    pub fn emit_unfiltered(&self, entry: CommandEntry) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|sub| !sub.tx.is_closed());
        state
            .subscribers
            .iter()
            .filter(|sub| sub.tx.send(entry.clone()).is_ok())
            .count()
    }

    /// Every later history lookup answers with `entry`, whatever was asked.
    pub fn misroute_fetch(&self, entry: CommandEntry) {
        self.lock().misrouted_fetch = Some(entry);
    }

    pub fn fail_open(&self, err: ReportError) {
        self.lock().open_failure = Some(err);
    }

    pub fn fail_fetch(&self, err: ReportError) {
        self.lock().fetch_failure = Some(err);
    }

    /// Opens stay pending until [`release_opens`](Self::release_opens).
    pub fn hold_opens(&self) {
        self.open_gate.send_replace(false);
    }

    pub fn release_opens(&self) {
        self.open_gate.send_replace(true);
    }

    /// Fetches stay pending until [`release_fetches`](Self::release_fetches).
    pub fn hold_fetches(&self) {
        self.fetch_gate.send_replace(false);
    }

    pub fn release_fetches(&self) {
        self.fetch_gate.send_replace(true);
    }

    pub fn stats(&self) -> ClientStats {
        self.lock().stats.clone()
    }

    /// Live streams whose consumer is still attached.
    pub fn live_subscribers(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|sub| !sub.tx.is_closed());
        state.subscribers.len()
    }

    pub fn last_options(&self) -> Option<CommandUpdateOptions> {
        self.lock().last_options.clone()
    }

    async fn pass(gate: &watch::Sender<bool>, what: &str) -> Result<()> {
        let mut rx = gate.subscribe();
        rx.wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| ReportError::Transport(format!("{} gate closed", what)))
    }
}

impl Default for InMemoryCommandClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHistoryClient for InMemoryCommandClient {
    async fn open_command_updates(
        &self,
        options: CommandUpdateOptions,
    ) -> Result<CommandUpdateStream> {
        {
            let mut state = self.lock();
            state.stats.opens_requested += 1;
            state.last_options = Some(options.clone());
        }

        Self::pass(&self.open_gate, "open").await?;

        let mut state = self.lock();
        if let Some(err) = state.open_failure.clone() {
            return Err(err);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let filter = if self.command_filter {
            options.command_filter
        } else {
            None
        };
        state.subscribers.push(Subscriber { tx, filter });
        state.stats.opens_completed += 1;

        let stream = futures::stream::poll_fn(move |cx| rx.poll_recv(cx));
        Ok(stream.boxed())
    }

    async fn get_command_history_entry(&self, id: &CommandId) -> Result<CommandEntry> {
        self.lock().stats.fetches += 1;

        Self::pass(&self.fetch_gate, "fetch").await?;

        let state = self.lock();
        if let Some(err) = state.fetch_failure.clone() {
            return Err(err);
        }
        if let Some(entry) = state.misrouted_fetch.clone() {
            return Ok(entry);
        }
        state
            .history
            .get(id)
            .cloned()
            .ok_or_else(|| ReportError::NotFound(id.to_string()))
    }

    async fn close_command_updates(&self) -> Result<()> {
        let mut state = self.lock();
        state.stats.closes += 1;
        state.subscribers.clear();
        Ok(())
    }

    fn supports_command_filter(&self) -> bool {
        self.command_filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> CommandId {
        CommandId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_history_accumulates() {
        let client = InMemoryCommandClient::new();
        client.record_history(CommandEntry::new(id("cmd-42")).with("queued", true));
        client.record_history(CommandEntry::new(id("cmd-42")).with("ack", "ACCEPTED"));

        let entry = client.get_command_history_entry(&id("cmd-42")).await.unwrap();
        assert_eq!(entry.attributes().len(), 2);

        let missing = client.get_command_history_entry(&id("cmd-7")).await;
        assert_eq!(missing, Err(ReportError::NotFound("cmd-7".to_string())));
    }

    #[tokio::test]
    async fn test_transport_filter() {
        let client = InMemoryCommandClient::new().with_command_filter();
        let mut stream = client
            .open_command_updates(CommandUpdateOptions {
                ignore_past_commands: false,
                command_filter: Some(id("cmd-42")),
            })
            .await
            .unwrap();

        assert_eq!(client.emit(CommandEntry::new(id("cmd-7"))), 0);
        assert_eq!(client.emit(CommandEntry::new(id("cmd-42"))), 1);
        let entry = stream.next().await.unwrap();
        assert_eq!(entry.command_id(), &id("cmd-42"));
    }

    #[tokio::test]
    async fn test_unfiltered_emit_bypasses_transport_filter() {
        let client = InMemoryCommandClient::new().with_command_filter();
        let mut stream = client
            .open_command_updates(CommandUpdateOptions {
                ignore_past_commands: false,
                command_filter: Some(id("cmd-42")),
            })
            .await
            .unwrap();

        assert_eq!(client.emit_unfiltered(CommandEntry::new(id("cmd-7"))), 1);
        let entry = stream.next().await.unwrap();
        assert_eq!(entry.command_id(), &id("cmd-7"));
    }

    #[tokio::test]
    async fn test_misrouted_fetch_answers_for_another_command() {
        let client = InMemoryCommandClient::new();
        client.misroute_fetch(CommandEntry::new(id("cmd-7")).with("queued", true));

        let entry = client.get_command_history_entry(&id("cmd-42")).await.unwrap();
        assert_eq!(entry.command_id(), &id("cmd-7"));
    }

    #[tokio::test]
    async fn test_close_without_open_is_noop() {
        let client = InMemoryCommandClient::new();
        client.close_command_updates().await.unwrap();
        assert_eq!(client.live_subscribers(), 0);
        assert_eq!(client.stats().closes, 1);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let client = InMemoryCommandClient::new();
        let mut stream = client
            .open_command_updates(CommandUpdateOptions::default())
            .await
            .unwrap();
        assert_eq!(client.live_subscribers(), 1);
        client.close_command_updates().await.unwrap();
        assert!(stream.next().await.is_none());
    }
}
