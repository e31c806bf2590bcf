//! Board event recording for audit and debugging.
//!
//! Every reconciliation, optimistic move, analysis request and remediation
//! action emits an event that can be stored or logged.

use chrono::{DateTime, Utc};

/// The kind of board operation that generated an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardEventKind {
    Load,
    PushApplied,
    PushRemoved,
    MoveReordered,
    MoveConfirmed,
    MoveRolledBack,
    MoveDiverged,
    AnalysisRequested,
    AnalysisStored,
    AnalysisRejected,
    AutoWaitElapsed,
    IncidentCreated,
    NotesUpdated,
    StatusUpdated,
    RemediationStarted,
    ExecutionObserved,
    ExecutionApproved,
    ExecutionRejected,
    PollStopped,
}

impl std::fmt::Display for BoardEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Load => "load",
            Self::PushApplied => "push_applied",
            Self::PushRemoved => "push_removed",
            Self::MoveReordered => "move_reordered",
            Self::MoveConfirmed => "move_confirmed",
            Self::MoveRolledBack => "move_rolled_back",
            Self::MoveDiverged => "move_diverged",
            Self::AnalysisRequested => "analysis_requested",
            Self::AnalysisStored => "analysis_stored",
            Self::AnalysisRejected => "analysis_rejected",
            Self::AutoWaitElapsed => "auto_wait_elapsed",
            Self::IncidentCreated => "incident_created",
            Self::NotesUpdated => "notes_updated",
            Self::StatusUpdated => "status_updated",
            Self::RemediationStarted => "remediation_started",
            Self::ExecutionObserved => "execution_observed",
            Self::ExecutionApproved => "execution_approved",
            Self::ExecutionRejected => "execution_rejected",
            Self::PollStopped => "poll_stopped",
        };
        f.write_str(s)
    }
}

/// Outcome of a board operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEventOutcome {
    Success,
    Error(String),
}

impl std::fmt::Display for BoardEventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoardEvent {
    pub timestamp: DateTime<Utc>,
    pub incident_id: Option<String>,
    pub execution_id: Option<String>,
    pub kind: BoardEventKind,
    pub outcome: BoardEventOutcome,
    pub detail: String,
}

impl BoardEvent {
    pub fn new(
        incident_id: Option<String>,
        kind: BoardEventKind,
        outcome: BoardEventOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            incident_id,
            execution_id: None,
            kind,
            outcome,
            detail: detail.into(),
        }
    }

    pub fn success(incident_id: &str, kind: BoardEventKind, detail: impl Into<String>) -> Self {
        Self::new(
            Some(incident_id.to_string()),
            kind,
            BoardEventOutcome::Success,
            detail,
        )
    }

    pub fn failure(incident_id: &str, kind: BoardEventKind, error: impl Into<String>) -> Self {
        Self::new(
            Some(incident_id.to_string()),
            kind,
            BoardEventOutcome::Error(error.into()),
            "",
        )
    }

    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }
}

/// Receives board events.
pub trait BoardEventSink: Send + Sync {
    fn record(&self, event: BoardEvent);
}

/// In-memory event sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: std::sync::Mutex<Vec<BoardEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BoardEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn kinds(&self) -> Vec<BoardEventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }
}

impl BoardEventSink for InMemoryEventSink {
    fn record(&self, event: BoardEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// No-op event sink that discards all events.
pub struct NullEventSink;

impl BoardEventSink for NullEventSink {
    fn record(&self, _event: BoardEvent) {}
}

/// Forwards events to `tracing`; failures at warn, everything else at debug.
pub struct TracingEventSink;

impl BoardEventSink for TracingEventSink {
    fn record(&self, event: BoardEvent) {
        let incident_id = event.incident_id.as_deref().unwrap_or("-");
        let execution_id = event.execution_id.as_deref().unwrap_or("-");
        match &event.outcome {
            BoardEventOutcome::Success => tracing::debug!(
                kind = %event.kind,
                incident_id,
                execution_id,
                detail = %event.detail,
                "board event"
            ),
            BoardEventOutcome::Error(message) => tracing::warn!(
                kind = %event.kind,
                incident_id,
                execution_id,
                error = %message,
                "board event failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_keeps_order() {
        let sink = InMemoryEventSink::new();
        sink.record(BoardEvent::success("inc-1", BoardEventKind::PushApplied, "triage"));
        sink.record(
            BoardEvent::failure("inc-1", BoardEventKind::ExecutionApproved, "boom")
                .with_execution("ex-1"),
        );
        assert_eq!(sink.count(), 2);
        assert_eq!(
            sink.kinds(),
            vec![BoardEventKind::PushApplied, BoardEventKind::ExecutionApproved]
        );
        let events = sink.events();
        assert_eq!(events[1].execution_id.as_deref(), Some("ex-1"));
        assert_eq!(events[1].outcome.to_string(), "error: boom");
    }

    #[test]
    fn kind_display_is_snake_case() {
        assert_eq!(BoardEventKind::MoveRolledBack.to_string(), "move_rolled_back");
        assert_eq!(BoardEventKind::AutoWaitElapsed.to_string(), "auto_wait_elapsed");
    }
}
