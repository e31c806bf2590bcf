//! Handles for background work (wait timers, poll loops, stream pumps).
//!
//! Every operation that starts background work returns a `Subscription`.
//! `cancel` consumes the handle, so it can run at most once; dropping an
//! uncancelled handle cancels it as well, so nothing outlives its owner.

use std::collections::HashMap;
use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Subscription {
    id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Spawn `work` on the current runtime; it stops at the first await after
    /// the token is cancelled.
    pub fn spawn<F, Fut>(id: u64, work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let fut = work(token.clone());
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = child.cancelled() => {}
                _ = fut => {}
            }
        });
        Self { id, token, handle }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the background task has ended (cancelled or ran to completion).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        self.token.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// What a per-incident subscription is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    AutoWait,
    ExecutionPoll,
}

/// Session-scoped owner of per-incident subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: u64,
    entries: HashMap<(String, SubscriptionKind), Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a subscription about to be spawned.
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Register `sub`, cancelling whatever held the slot before.
    pub fn insert(&mut self, incident_id: &str, kind: SubscriptionKind, sub: Subscription) {
        if let Some(previous) = self.entries.insert((incident_id.to_string(), kind), sub) {
            previous.cancel();
        }
    }

    pub fn contains(&self, incident_id: &str, kind: SubscriptionKind) -> bool {
        self.entries
            .contains_key(&(incident_id.to_string(), kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cancel(&mut self, incident_id: &str, kind: SubscriptionKind) -> bool {
        match self.entries.remove(&(incident_id.to_string(), kind)) {
            Some(sub) => {
                sub.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the slot only if it still holds subscription `id` (a finished
    /// task must not evict its replacement).
    pub fn release(&mut self, incident_id: &str, kind: SubscriptionKind, id: u64) -> bool {
        let key = (incident_id.to_string(), kind);
        if self.entries.get(&key).is_some_and(|s| s.id() == id) {
            self.entries.remove(&key);
            return true;
        }
        false
    }

    /// Cancel everything owned by one incident.
    pub fn cancel_incident(&mut self, incident_id: &str) -> usize {
        let keys: Vec<_> = self
            .entries
            .keys()
            .filter(|(id, _)| id == incident_id)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(sub) = self.entries.remove(key) {
                sub.cancel();
            }
        }
        keys.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, sub) in self.entries.drain() {
            sub.cancel();
        }
        count
    }
}
