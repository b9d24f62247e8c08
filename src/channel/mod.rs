//! Single-slot, replay-latest broadcast of the merged record.

use crate::record::CommandRecord;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;

/// What observers see: `None` until the first entry has been merged.
pub type RecordView = Option<Arc<CommandRecord>>;

/// Holds the latest merged record and multicasts every replacement.
///
/// Late subscribers start from the current value; earlier values are not
/// replayed.
#[derive(Debug, Clone)]
pub struct RecordChannel {
    tx: Arc<watch::Sender<RecordView>>,
}

impl RecordChannel {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replaces the current value and notifies observers before returning.
    pub fn publish(&self, record: CommandRecord) -> Arc<CommandRecord> {
        let record = Arc::new(record);
        self.tx.send_replace(Some(Arc::clone(&record)));
        record
    }

    pub fn current(&self) -> RecordView {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> RecordWatcher {
        RecordWatcher {
            rx: self.tx.subscribe(),
            primed: false,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RecordChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// One observer of a [`RecordChannel`].
#[derive(Debug)]
pub struct RecordWatcher {
    rx: watch::Receiver<RecordView>,
    primed: bool,
}

impl RecordWatcher {
    pub fn current(&self) -> RecordView {
        self.rx.borrow().clone()
    }

    /// Yields the current value on first call, then each newer value.
    ///
    /// Returns `None` once the publishing side is gone and everything it
    /// published has been observed.
    pub async fn next(&mut self) -> Option<RecordView> {
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.changed().await
    }

    /// Waits for a value newer than the last one observed.
    pub async fn changed(&mut self) -> Option<RecordView> {
        self.primed = true;
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Waits until a published record satisfies `predicate`.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<Arc<CommandRecord>>
    where
        F: FnMut(&CommandRecord) -> bool,
    {
        self.primed = true;
        let view = self
            .rx
            .wait_for(|view| view.as_deref().map(&mut predicate).unwrap_or(false))
            .await
            .ok()?;
        view.clone()
    }

    pub fn into_stream(self) -> impl Stream<Item = RecordView> + Send + 'static {
        futures::stream::unfold(self, |mut watcher| async move {
            let view = watcher.next().await?;
            Some((view, watcher))
        })
    }
}
