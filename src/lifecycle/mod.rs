//! Disposal scopes and release-once handling of live subscriptions.

use crate::client::{CommandHistoryClient, CommandUpdateStream};
use crate::core::CommandEntry;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, event};

/// Caller-owned teardown signal.
///
/// Disposing a scope also disposes every scope derived from it with
/// [`child`](Self::child). Only an explicit [`dispose`](Self::dispose) on the
/// scope or one of its ancestors tears anything down; dropping handles never
/// does, so a child outlives a temporary parent.
#[derive(Debug, Clone)]
pub struct DisposalScope {
    tx: Arc<watch::Sender<bool>>,
    parents: Vec<watch::Receiver<bool>>,
}

impl DisposalScope {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            parents: Vec::new(),
        }
    }

    /// A scope disposed either directly or when `self` (or any ancestor) is.
    pub fn child(&self) -> Self {
        let mut parents = self.parents.clone();
        parents.push(self.tx.subscribe());
        let (tx, _) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            parents,
        }
    }

    /// Returns `true` only for the call that actually disposed the scope.
    pub fn dispose(&self) -> bool {
        self.tx.send_if_modified(|disposed| {
            if *disposed {
                false
            } else {
                *disposed = true;
                true
            }
        })
    }

    pub fn is_disposed(&self) -> bool {
        *self.tx.borrow() || self.parents.iter().any(receiver_disposed)
    }

    pub fn token(&self) -> DisposalToken {
        let mut receivers = self.parents.clone();
        receivers.push(self.tx.subscribe());
        DisposalToken { receivers }
    }

    pub async fn disposed(&self) {
        self.token().disposed().await;
    }
}

impl Default for DisposalScope {
    fn default() -> Self {
        Self::new()
    }
}

fn receiver_disposed(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow()
}

/// Read side of a [`DisposalScope`], held by whoever must react to teardown.
#[derive(Debug, Clone)]
pub struct DisposalToken {
    receivers: Vec<watch::Receiver<bool>>,
}

impl DisposalToken {
    pub fn is_disposed(&self) -> bool {
        self.receivers.iter().any(receiver_disposed)
    }

    /// Resolves once any scope in the chain is disposed.
    ///
    /// A scope dropped without being disposed never resolves its branch.
    pub async fn disposed(&mut self) {
        let waits = self
            .receivers
            .iter_mut()
            .map(|rx| {
                Box::pin(async move {
                    if rx.wait_for(|disposed| *disposed).await.is_err() {
                        futures::future::pending::<()>().await;
                    }
                })
            })
            .collect::<Vec<_>>();
        futures::future::select_all(waits).await;
    }
}

/// Owns an opened live stream and releases it with the transport exactly once.
pub struct LiveSubscription<C: CommandHistoryClient + ?Sized> {
    client: Arc<C>,
    stream: Option<CommandUpdateStream>,
    released: bool,
}

impl<C: CommandHistoryClient + ?Sized> LiveSubscription<C> {
    pub fn new(client: Arc<C>, stream: CommandUpdateStream) -> Self {
        Self {
            client,
            stream: Some(stream),
            released: false,
        }
    }

    /// Next entry from the stream; `None` once it ended or was released.
    pub async fn next(&mut self) -> Option<CommandEntry> {
        match self.stream.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    /// Drops the stream and closes the transport subscription.
    ///
    /// Returns `false` when already released.
    pub async fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.stream.take();
        if let Err(err) = self.client.close_command_updates().await {
            event!(Level::WARN, error = %err, "closing command updates failed");
        }
        true
    }
}

impl<C: CommandHistoryClient + ?Sized> Drop for LiveSubscription<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stream.take();
        let client = Arc::clone(&self.client);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = client.close_command_updates().await {
                        event!(Level::WARN, error = %err, "closing command updates failed");
                    }
                });
            }
            Err(_) => {
                event!(
                    Level::WARN,
                    "live subscription dropped outside a runtime; transport close skipped"
                );
            }
        }
    }
}
