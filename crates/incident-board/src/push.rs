//! Push channel fan-out.
//!
//! The channel is opened once per application session. Consumers register a
//! listener under a stable `SessionId`; swapping a listener (for example when
//! a detail view opens) never touches the connection. Events are delivered
//! strictly in arrival order, one at a time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use incident_core::types::Incident;
use incident_core::BoardError;

/// Source of incident snapshots (a websocket in production).
#[async_trait]
pub trait PushSource: Send {
    /// Next snapshot, or `None` when the channel closed.
    async fn next(&mut self) -> Option<Result<Incident, BoardError>>;
}

/// Receives every snapshot the hub delivers.
pub trait PushListener: Send + Sync {
    fn on_incident(&self, incident: &Incident);
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why `PushHub::pump` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    Cancelled,
    Closed,
}

#[derive(Default)]
pub struct PushHub {
    listeners: Mutex<BTreeMap<SessionId, Arc<dyn PushListener>>>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `id`, returning the listener it replaced.
    pub fn register(
        &self,
        id: SessionId,
        listener: Arc<dyn PushListener>,
    ) -> Option<Arc<dyn PushListener>> {
        self.lock().insert(id, listener)
    }

    pub fn unregister(&self, id: &SessionId) -> Option<Arc<dyn PushListener>> {
        self.lock().remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver one snapshot to every listener. Listeners run outside the lock.
    pub fn dispatch(&self, incident: &Incident) {
        let listeners: Vec<Arc<dyn PushListener>> = self.lock().values().cloned().collect();
        for listener in listeners {
            listener.on_incident(incident);
        }
    }

    /// Drain `source` into the listeners until it closes or `cancel` fires.
    /// Malformed messages are logged and skipped.
    pub async fn pump(&self, source: &mut dyn PushSource, cancel: CancellationToken) -> PumpEnd {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PumpEnd::Cancelled,
                next = source.next() => match next {
                    Some(Ok(incident)) => {
                        tracing::debug!(incident_id = %incident.id, status = %incident.status, "push event");
                        self.dispatch(&incident);
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "dropping malformed push message");
                    }
                    None => {
                        tracing::info!("push channel closed");
                        return PumpEnd::Closed;
                    }
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<SessionId, Arc<dyn PushListener>>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// In-memory push source for testing.
///
/// Yields pre-configured snapshots in order, with optional delays between
/// them.
pub struct MockPushSource {
    events: Vec<(Duration, Result<Incident, BoardError>)>,
    index: usize,
}

impl MockPushSource {
    pub fn from_events(events: Vec<Result<Incident, BoardError>>) -> Self {
        Self {
            events: events.into_iter().map(|e| (Duration::ZERO, e)).collect(),
            index: 0,
        }
    }

    pub fn with_delays(events: Vec<(Duration, Result<Incident, BoardError>)>) -> Self {
        Self { events, index: 0 }
    }
}

#[async_trait]
impl PushSource for MockPushSource {
    async fn next(&mut self) -> Option<Result<Incident, BoardError>> {
        let (delay, event) = self.events.get(self.index)?;
        if !delay.is_zero() {
            tokio::time::sleep(*delay).await;
        }
        let out = event.clone();
        self.index += 1;
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use incident_core::types::IncidentStatus;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl PushListener for Recorder {
        fn on_incident(&self, incident: &Incident) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(format!("{}:{}", incident.id, incident.status));
            }
        }
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    fn event(id: &str, status: IncidentStatus) -> Result<Incident, BoardError> {
        Ok(Incident::new(id, "m", status))
    }

    #[tokio::test]
    async fn pump_delivers_in_arrival_order_and_skips_errors() {
        let hub = PushHub::new();
        let recorder = Arc::new(Recorder::default());
        hub.register(SessionId::new("board"), recorder.clone());

        let mut source = MockPushSource::from_events(vec![
            event("a", IncidentStatus::Triage),
            Err(BoardError::invalid_response("garbage")),
            event("a", IncidentStatus::Fixing),
            event("b", IncidentStatus::Triage),
        ]);
        let end = hub.pump(&mut source, CancellationToken::new()).await;

        assert_eq!(end, PumpEnd::Closed);
        assert_eq!(recorder.seen(), vec!["a:triage", "a:fixing", "b:triage"]);
    }

    #[tokio::test]
    async fn swapping_listener_keeps_single_registration() {
        let hub = PushHub::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        hub.register(SessionId::new("board"), first.clone());
        let replaced = hub.register(SessionId::new("board"), second.clone());

        assert!(replaced.is_some());
        assert_eq!(hub.listener_count(), 1);
        hub.dispatch(&Incident::new("x", "m", IncidentStatus::Triage));
        assert!(first.seen().is_empty());
        assert_eq!(second.seen(), vec!["x:triage"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pump_stops_on_cancel() {
        let hub = PushHub::new();
        let mut source = MockPushSource::with_delays(vec![(
            Duration::from_secs(60),
            event("a", IncidentStatus::Triage),
        )]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(hub.pump(&mut source, cancel).await, PumpEnd::Cancelled);
    }
}
