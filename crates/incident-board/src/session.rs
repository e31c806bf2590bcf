//! Board session: the single owner of board, diagnosis and remediation state.
//!
//! All mutations run to completion under one lock that is never held across
//! an await, so no handler observes a half-applied change. Suspension happens
//! only at the `IncidentApi` boundary. Background work (diagnosis wait
//! timers, execution poll loops) holds a weak reference to the session and is
//! owned by the session's `SubscriptionRegistry`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use incident_core::config::BoardConfig;
use incident_core::types::{
    AgentExecution, AnalysisKind, CreateIncident, Incident, IncidentPatch, IncidentStatus,
};
use incident_core::BoardError;

use crate::banner::{Banner, BannerQueue};
use crate::diagnosis::{classify_trigger, DiagnosisWorkflow, TriggerOutcome};
use crate::drag::{begin_move, confirm_move, rollback_move, DragMove, DragOutcome, RollbackOutcome};
use crate::event::{
    BoardEvent, BoardEventKind, BoardEventOutcome, BoardEventSink, TracingEventSink,
};
use crate::filter::{project, BoardFilter, BoardView};
use crate::guard::SingleFlight;
use crate::lifecycle::{validate_operation_state, RemediationOperation};
use crate::poll::{watch_execution, PollingExecutionStream, WatchEnd};
use crate::push::PushListener;
use crate::reconcile::{Reconciled, ReconciliationEngine};
use crate::remediation::{ExecutionHistory, ObserveOutcome, PollStopPolicy, StartKind};
use crate::service::IncidentApi;
use crate::store::BoardStore;
use crate::subscription::{Subscription, SubscriptionKind, SubscriptionRegistry};

const MOVE_ACTION: &str = "move";
const NOTES_ACTION: &str = "update_notes";
const STATUS_ACTION: &str = "update_status";
const START_ACTION: &str = "start_remediation";

/// Timing and policy knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub auto_wait: Duration,
    pub min_valid_len: usize,
    pub poll_interval: Duration,
    pub poll_policy: PollStopPolicy,
    pub banner_ttl: Duration,
}

impl From<&BoardConfig> for SessionConfig {
    fn from(cfg: &BoardConfig) -> Self {
        Self {
            auto_wait: cfg.diagnosis.auto_wait,
            min_valid_len: cfg.diagnosis.min_valid_len,
            poll_interval: cfg.remediation.poll_interval,
            poll_policy: PollStopPolicy::from_config(cfg.remediation.stop_polling_on_cancelled),
            banner_ttl: cfg.banner.ttl,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&BoardConfig::default())
    }
}

/// Result of a drop gesture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResult {
    Reordered,
    Confirmed,
    /// The backend refused the status change; no banner is raised.
    RolledBack {
        error: BoardError,
        outcome: RollbackOutcome,
    },
}

/// Presentation state of one manual analysis trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Hidden,
    Enabled,
    /// Request outstanding; the control is disabled.
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisState {
    pub waiting_for_auto: bool,
    pub last_error: Option<String>,
    pub diagnosis: TriggerState,
    pub solution: TriggerState,
}

struct SessionState {
    engine: ReconciliationEngine,
    filter: BoardFilter,
    diagnosis: HashMap<String, DiagnosisWorkflow>,
    remediation: HashMap<String, ExecutionHistory>,
    flights: SingleFlight,
    banners: BannerQueue,
    subscriptions: SubscriptionRegistry,
}

struct SessionInner {
    api: Arc<dyn IncidentApi>,
    config: SessionConfig,
    events: Arc<dyn BoardEventSink>,
    state: Mutex<SessionState>,
}

/// Cheaply cloneable handle to one board session.
#[derive(Clone)]
pub struct BoardSession {
    inner: Arc<SessionInner>,
}

impl BoardSession {
    pub fn new(api: Arc<dyn IncidentApi>, config: SessionConfig) -> Self {
        Self::with_events(api, config, Arc::new(TracingEventSink))
    }

    pub fn with_events(
        api: Arc<dyn IncidentApi>,
        config: SessionConfig,
        events: Arc<dyn BoardEventSink>,
    ) -> Self {
        let state = SessionState {
            engine: ReconciliationEngine::new(),
            filter: BoardFilter::default(),
            diagnosis: HashMap::new(),
            remediation: HashMap::new(),
            flights: SingleFlight::new(),
            banners: BannerQueue::new(config.banner_ttl),
            subscriptions: SubscriptionRegistry::new(),
        };
        Self {
            inner: Arc::new(SessionInner {
                api,
                config,
                events,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> SessionConfig {
        self.inner.config
    }

    // ── Board ──────────────────────────────────────────────────────────

    /// Fetch active incidents and reconcile each into the board.
    pub async fn load(&self) -> Result<usize, BoardError> {
        let incidents = match self.inner.api.list_incidents().await {
            Ok(incidents) => incidents,
            Err(err) => return Err(self.inner.fail(None, BoardEventKind::Load, err)),
        };
        let mut state = self.inner.lock();
        for incident in incidents {
            self.inner.reconcile_locked(&mut state, incident);
        }
        let count = state.engine.store().len();
        drop(state);
        self.inner.events.record(BoardEvent::new(
            None,
            BoardEventKind::Load,
            BoardEventOutcome::Success,
            format!("{count} incidents"),
        ));
        tracing::info!(count, "board loaded");
        Ok(count)
    }

    /// Apply one push snapshot. Always applied immediately, in call order.
    pub fn apply_push(&self, incident: Incident) -> Reconciled {
        let id = incident.id.clone();
        let status = incident.status;
        let mut state = self.inner.lock();
        let outcome = self.inner.reconcile_locked(&mut state, incident);
        drop(state);
        let kind = match outcome {
            Reconciled::Applied(_) => BoardEventKind::PushApplied,
            Reconciled::Removed { .. } | Reconciled::IgnoredResolved => BoardEventKind::PushRemoved,
        };
        self.inner
            .events
            .record(BoardEvent::success(&id, kind, status.as_str()));
        outcome
    }

    /// Handle a drop gesture. Cross-column drops are applied optimistically
    /// and rolled back if the backend refuses the status change.
    pub async fn move_incident(&self, mv: DragMove) -> Result<MoveResult, BoardError> {
        let id = mv.incident_id.clone();
        let cross_column = mv.is_cross_column();
        let pending = {
            let mut state = self.inner.lock();
            if cross_column {
                state.flights.try_begin(MOVE_ACTION, &id)?;
            }
            match begin_move(&mut state.engine, mv, Utc::now()) {
                Ok(DragOutcome::Reordered) => {
                    drop(state);
                    self.inner.events.record(BoardEvent::success(
                        &id,
                        BoardEventKind::MoveReordered,
                        "",
                    ));
                    return Ok(MoveResult::Reordered);
                }
                Ok(DragOutcome::Pending(pending)) => pending,
                Err(err) => {
                    if cross_column {
                        state.flights.finish(MOVE_ACTION, &id);
                    }
                    return Err(err);
                }
            }
        };

        let target = pending.target_status();
        let result = self
            .inner
            .api
            .patch_incident(&id, IncidentPatch::status(target))
            .await;

        let mut state = self.inner.lock();
        state.flights.finish(MOVE_ACTION, &id);
        match result {
            Ok(_) => {
                confirm_move(pending);
                drop(state);
                self.inner.events.record(BoardEvent::success(
                    &id,
                    BoardEventKind::MoveConfirmed,
                    target.as_str(),
                ));
                Ok(MoveResult::Confirmed)
            }
            Err(error) => {
                let outcome = rollback_move(&mut state.engine, pending);
                drop(state);
                let kind = match outcome {
                    RollbackOutcome::Restored => BoardEventKind::MoveRolledBack,
                    RollbackOutcome::Diverged => BoardEventKind::MoveDiverged,
                };
                self.inner
                    .events
                    .record(BoardEvent::failure(&id, kind, error.to_string()));
                Ok(MoveResult::RolledBack { error, outcome })
            }
        }
    }

    pub fn view(&self) -> BoardView {
        let state = self.inner.lock();
        project(state.engine.store(), &state.filter)
    }

    pub fn set_filter(&self, filter: BoardFilter) {
        self.inner.lock().filter = filter;
    }

    pub fn filter(&self) -> BoardFilter {
        self.inner.lock().filter.clone()
    }

    /// Canonical (unfiltered) board contents.
    pub fn snapshot(&self) -> BoardStore {
        self.inner.lock().engine.store().clone()
    }

    pub fn incident(&self, id: &str) -> Option<Incident> {
        self.inner.lock().engine.store().get(id).cloned()
    }

    pub fn revision(&self, id: &str) -> u64 {
        self.inner.lock().engine.revision(id)
    }

    // ── Incident pass-through ──────────────────────────────────────────

    pub async fn create_incident(
        &self,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Incident, BoardError> {
        let params = CreateIncident {
            message: message.into(),
            source: source.into(),
        };
        match self.inner.api.create_incident(params).await {
            Ok(incident) => Ok(self.accept(incident, BoardEventKind::IncidentCreated, "created")),
            Err(err) => Err(self.inner.fail(None, BoardEventKind::IncidentCreated, err)),
        }
    }

    pub async fn generate_incident(&self) -> Result<Incident, BoardError> {
        match self.inner.api.generate_incident().await {
            Ok(incident) => Ok(self.accept(incident, BoardEventKind::IncidentCreated, "generated")),
            Err(err) => Err(self.inner.fail(None, BoardEventKind::IncidentCreated, err)),
        }
    }

    pub async fn update_notes(
        &self,
        incident_id: &str,
        notes: impl Into<String>,
    ) -> Result<Incident, BoardError> {
        self.inner.lock().flights.try_begin(NOTES_ACTION, incident_id)?;
        let result = self
            .inner
            .api
            .patch_incident(incident_id, IncidentPatch::notes(notes))
            .await;
        self.inner.lock().flights.finish(NOTES_ACTION, incident_id);
        match result {
            Ok(incident) => Ok(self.accept(incident, BoardEventKind::NotesUpdated, "")),
            Err(err) => Err(self.inner.fail(Some(incident_id), BoardEventKind::NotesUpdated, err)),
        }
    }

    /// Non-optimistic status change (e.g. resolving from the detail view).
    /// The board changes only once the backend returns the updated incident.
    pub async fn update_status(
        &self,
        incident_id: &str,
        status: IncidentStatus,
    ) -> Result<Incident, BoardError> {
        self.inner.lock().flights.try_begin(STATUS_ACTION, incident_id)?;
        let result = self
            .inner
            .api
            .patch_incident(incident_id, IncidentPatch::status(status))
            .await;
        self.inner.lock().flights.finish(STATUS_ACTION, incident_id);
        match result {
            Ok(incident) => Ok(self.accept(incident, BoardEventKind::StatusUpdated, status.as_str())),
            Err(err) => Err(self.inner.fail(Some(incident_id), BoardEventKind::StatusUpdated, err)),
        }
    }

    pub async fn list_resolved(&self) -> Result<Vec<Incident>, BoardError> {
        self.inner
            .api
            .list_resolved()
            .await
            .map_err(|err| self.inner.fail(None, BoardEventKind::Load, err))
    }

    fn accept(&self, incident: Incident, kind: BoardEventKind, detail: &str) -> Incident {
        let mut state = self.inner.lock();
        self.inner.reconcile_locked(&mut state, incident.clone());
        drop(state);
        self.inner
            .events
            .record(BoardEvent::success(&incident.id, kind, detail));
        incident
    }

    // ── Diagnosis ──────────────────────────────────────────────────────

    /// Start tracking analysis for an incident shown in a detail view. With
    /// neither analysis present, the auto-wait timer starts.
    pub fn open_incident(&self, incident_id: &str) -> Result<DiagnosisState, BoardError> {
        let mut state = self.inner.lock();
        let Some(incident) = state.engine.store().get(incident_id).cloned() else {
            return Err(BoardError::incident_not_found(incident_id));
        };
        if !state.diagnosis.contains_key(incident_id) {
            let workflow = DiagnosisWorkflow::new(&incident);
            if workflow.is_waiting() {
                SessionInner::spawn_auto_wait(&self.inner, &mut state, incident_id);
            }
            state.diagnosis.insert(incident_id.to_string(), workflow);
        }
        Ok(SessionInner::diagnosis_state(&state, &incident))
    }

    /// The detail view closed: drop its workflow and cancel its timer.
    pub fn close_incident(&self, incident_id: &str) {
        let mut state = self.inner.lock();
        state.diagnosis.remove(incident_id);
        state
            .subscriptions
            .cancel(incident_id, SubscriptionKind::AutoWait);
    }

    pub fn diagnosis_state(&self, incident_id: &str) -> Option<DiagnosisState> {
        let state = self.inner.lock();
        let incident = state.engine.store().get(incident_id)?;
        state.diagnosis.get(incident_id)?;
        Some(SessionInner::diagnosis_state(&state, incident))
    }

    pub fn trigger_visible(&self, incident_id: &str, kind: AnalysisKind) -> bool {
        self.diagnosis_state(incident_id)
            .is_some_and(|s| match kind {
                AnalysisKind::Diagnosis => s.diagnosis == TriggerState::Enabled,
                AnalysisKind::Solution => s.solution == TriggerState::Enabled,
            })
    }

    /// Manual diagnosis or solution request. Valid text is written into the
    /// incident; anything else raises an error banner and stores nothing.
    pub async fn trigger_analysis(
        &self,
        incident_id: &str,
        kind: AnalysisKind,
    ) -> Result<TriggerOutcome, BoardError> {
        {
            let mut state = self.inner.lock();
            let Some(incident) = state.engine.store().get(incident_id).cloned() else {
                return Err(BoardError::incident_not_found(incident_id));
            };
            state.flights.try_begin(kind.as_str(), incident_id)?;
            state
                .diagnosis
                .entry(incident_id.to_string())
                .or_insert_with(|| DiagnosisWorkflow::new(&incident));
        }
        self.inner.events.record(BoardEvent::success(
            incident_id,
            BoardEventKind::AnalysisRequested,
            kind.as_str(),
        ));

        let result = self.inner.api.request_analysis(incident_id, kind).await;

        let mut state = self.inner.lock();
        state.flights.finish(kind.as_str(), incident_id);
        let min_valid_len = self.inner.config.min_valid_len;
        let outcome = match state.diagnosis.get_mut(incident_id) {
            Some(workflow) => workflow.finish(kind, result, min_valid_len),
            // Detail view closed while the request was out.
            None => classify_trigger(kind, result, min_valid_len),
        };

        match &outcome {
            TriggerOutcome::Stored {
                kind,
                text,
                incident,
            } => {
                state
                    .subscriptions
                    .cancel(incident_id, SubscriptionKind::AutoWait);
                let snapshot = incident
                    .clone()
                    .or_else(|| state.engine.store().get(incident_id).cloned());
                if let Some(mut snapshot) = snapshot {
                    snapshot.set_analysis(*kind, text.clone());
                    self.inner.reconcile_locked(&mut state, snapshot);
                }
                drop(state);
                self.inner.events.record(BoardEvent::success(
                    incident_id,
                    BoardEventKind::AnalysisStored,
                    kind.as_str(),
                ));
            }
            TriggerOutcome::Rejected { message, .. } => {
                state.banners.error(message.clone(), Instant::now());
                drop(state);
                tracing::info!(incident_id, %kind, %message, "analysis rejected");
                self.inner.events.record(BoardEvent::failure(
                    incident_id,
                    BoardEventKind::AnalysisRejected,
                    message.clone(),
                ));
            }
        }
        Ok(outcome)
    }

    // ── Remediation ────────────────────────────────────────────────────

    /// Fetch execution history for an incident and resume polling if a run
    /// is still in progress.
    pub async fn open_remediation(
        &self,
        incident_id: &str,
    ) -> Result<Vec<AgentExecution>, BoardError> {
        let executions = match self.inner.api.list_executions(incident_id).await {
            Ok(executions) => executions,
            Err(err) => {
                return Err(self.inner.fail(
                    Some(incident_id),
                    BoardEventKind::ExecutionObserved,
                    err,
                ))
            }
        };
        let mut state = self.inner.lock();
        let history = ExecutionHistory::from_list(executions.clone());
        let active = history.active().map(|e| e.id.clone());
        state.remediation.insert(incident_id.to_string(), history);
        if let Some(execution_id) = active {
            if !state
                .subscriptions
                .contains(incident_id, SubscriptionKind::ExecutionPoll)
            {
                tracing::info!(incident_id, execution_id = %execution_id, "resuming execution polling");
                SessionInner::spawn_poll(&self.inner, &mut state, incident_id, &execution_id, true);
            }
        }
        Ok(executions)
    }

    /// Whether a new run may start now, and whether it would be a retry.
    /// `None` until the history has been fetched with `open_remediation`.
    pub fn can_start_remediation(
        &self,
        incident_id: &str,
    ) -> Result<Option<StartKind>, BoardError> {
        let state = self.inner.lock();
        state
            .remediation
            .get(incident_id)
            .map(|history| history.can_start(incident_id))
            .transpose()
    }

    /// Start a remediation run. History that was never fetched is loaded
    /// first, so a run already in progress refuses the start locally.
    pub async fn start_remediation(&self, incident_id: &str) -> Result<AgentExecution, BoardError> {
        let cached = self.inner.lock().remediation.contains_key(incident_id);
        if !cached {
            self.open_remediation(incident_id).await?;
        }

        let start_kind = {
            let mut state = self.inner.lock();
            let kind = match state.remediation.get(incident_id) {
                Some(history) => history.can_start(incident_id)?,
                None => StartKind::Fresh,
            };
            state.flights.try_begin(START_ACTION, incident_id)?;
            kind
        };

        let result = self.inner.api.start_remediation(incident_id).await;

        let mut state = self.inner.lock();
        state.flights.finish(START_ACTION, incident_id);
        let execution = match result {
            Ok(execution) => execution,
            Err(err) => {
                drop(state);
                return Err(self.inner.fail(
                    Some(incident_id),
                    BoardEventKind::RemediationStarted,
                    err,
                ));
            }
        };
        state
            .remediation
            .entry(incident_id.to_string())
            .or_default()
            .record_started(execution.clone());
        if !execution.is_terminal() {
            SessionInner::spawn_poll(&self.inner, &mut state, incident_id, &execution.id, false);
        }
        drop(state);

        let detail = match start_kind {
            StartKind::Fresh => "fresh",
            StartKind::Retry => "retry",
        };
        tracing::info!(incident_id, execution_id = %execution.id, detail, "remediation started");
        self.inner.events.record(
            BoardEvent::success(incident_id, BoardEventKind::RemediationStarted, detail)
                .with_execution(&execution.id),
        );
        Ok(execution)
    }

    /// Approve the commands of an execution at the approval gate, then poll
    /// again right away.
    pub async fn approve(&self, execution_id: &str) -> Result<AgentExecution, BoardError> {
        let incident_id = self.begin_gate_action(execution_id, RemediationOperation::Approve)?;
        let result = self.inner.api.approve_execution(execution_id).await;
        let execution = self.finish_gate_action(
            &incident_id,
            execution_id,
            RemediationOperation::Approve,
            result,
        )?;

        let mut state = self.inner.lock();
        if !execution.is_terminal() {
            SessionInner::spawn_poll(&self.inner, &mut state, &incident_id, execution_id, true);
        }
        Ok(execution)
    }

    /// Reject the commands of an execution at the approval gate. A terminal
    /// result stops polling for good.
    pub async fn reject(&self, execution_id: &str) -> Result<AgentExecution, BoardError> {
        let incident_id = self.begin_gate_action(execution_id, RemediationOperation::Reject)?;
        let result = self.inner.api.reject_execution(execution_id).await;
        let execution = self.finish_gate_action(
            &incident_id,
            execution_id,
            RemediationOperation::Reject,
            result,
        )?;

        if execution.is_terminal() {
            self.inner
                .lock()
                .subscriptions
                .cancel(&incident_id, SubscriptionKind::ExecutionPoll);
        }
        Ok(execution)
    }

    fn begin_gate_action(
        &self,
        execution_id: &str,
        operation: RemediationOperation,
    ) -> Result<String, BoardError> {
        let mut state = self.inner.lock();
        let Some((incident_id, status)) = state.remediation.iter().find_map(|(incident_id, h)| {
            h.get(execution_id).map(|e| (incident_id.clone(), e.status))
        }) else {
            return Err(BoardError::execution_not_found(execution_id));
        };
        validate_operation_state(execution_id, operation, status)?;
        state.flights.try_begin(operation.as_str(), execution_id)?;
        Ok(incident_id)
    }

    fn finish_gate_action(
        &self,
        incident_id: &str,
        execution_id: &str,
        operation: RemediationOperation,
        result: Result<AgentExecution, BoardError>,
    ) -> Result<AgentExecution, BoardError> {
        let kind = match operation {
            RemediationOperation::Approve => BoardEventKind::ExecutionApproved,
            RemediationOperation::Reject => BoardEventKind::ExecutionRejected,
        };
        let mut state = self.inner.lock();
        state.flights.finish(operation.as_str(), execution_id);
        match result {
            Ok(execution) => {
                state
                    .remediation
                    .entry(incident_id.to_string())
                    .or_default()
                    .observe(execution.clone());
                drop(state);
                tracing::info!(
                    incident_id,
                    execution_id,
                    status = %execution.status,
                    operation = operation.as_str(),
                    "approval gate resolved"
                );
                self.inner.events.record(
                    BoardEvent::success(incident_id, kind, execution.status.as_str())
                        .with_execution(execution_id),
                );
                Ok(execution)
            }
            Err(err) => {
                drop(state);
                Err(self.inner.fail(Some(incident_id), kind, err))
            }
        }
    }

    /// Executions for an incident, most recent first.
    pub fn execution_history(&self, incident_id: &str) -> Vec<AgentExecution> {
        self.inner
            .lock()
            .remediation
            .get(incident_id)
            .map(|h| h.executions().to_vec())
            .unwrap_or_default()
    }

    pub fn is_polling(&self, incident_id: &str) -> bool {
        self.inner
            .lock()
            .subscriptions
            .contains(incident_id, SubscriptionKind::ExecutionPoll)
    }

    pub fn is_waiting_for_auto(&self, incident_id: &str) -> bool {
        self.inner
            .lock()
            .diagnosis
            .get(incident_id)
            .is_some_and(DiagnosisWorkflow::is_waiting)
    }

    // ── Session ────────────────────────────────────────────────────────

    /// Banners younger than the configured TTL, oldest first.
    pub fn banners(&self) -> Vec<Banner> {
        self.inner.lock().banners.active(Instant::now())
    }

    /// Number of live timers and poll loops.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Cancel every timer and poll loop owned by this session.
    pub fn shutdown(&self) {
        let cancelled = self.inner.lock().subscriptions.cancel_all();
        tracing::debug!(cancelled, "board session shut down");
    }
}

impl PushListener for BoardSession {
    fn on_incident(&self, incident: &Incident) {
        self.apply_push(incident.clone());
    }
}

impl std::fmt::Debug for BoardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardSession")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record a failed boundary call, raise its banner, and hand it back.
    fn fail(&self, incident_id: Option<&str>, kind: BoardEventKind, err: BoardError) -> BoardError {
        if err.is_boundary_failure() {
            self.lock()
                .banners
                .error(err.banner_message(), Instant::now());
        }
        tracing::warn!(incident_id = incident_id.unwrap_or("-"), %kind, error = %err, "board operation failed");
        self.events.record(BoardEvent::new(
            incident_id.map(str::to_string),
            kind,
            BoardEventOutcome::Error(err.to_string()),
            "",
        ));
        err
    }

    /// Every authoritative snapshot goes through here.
    fn reconcile_locked(&self, state: &mut SessionState, incident: Incident) -> Reconciled {
        let id = incident.id.clone();
        let outcome = state.engine.reconcile(incident);
        match outcome {
            Reconciled::Applied(_) => {
                let ended_wait = match (
                    state.diagnosis.get_mut(&id),
                    state.engine.store().get(&id),
                ) {
                    (Some(workflow), Some(stored)) => workflow.observe(stored),
                    _ => false,
                };
                if ended_wait {
                    state.subscriptions.cancel(&id, SubscriptionKind::AutoWait);
                    tracing::debug!(incident_id = %id, "analysis arrived before auto-wait elapsed");
                }
            }
            Reconciled::Removed { .. } | Reconciled::IgnoredResolved => {
                let cancelled = state.subscriptions.cancel_incident(&id);
                state.diagnosis.remove(&id);
                state.remediation.remove(&id);
                if cancelled > 0 {
                    tracing::debug!(incident_id = %id, cancelled, "incident left the board");
                }
            }
        }
        outcome
    }

    fn spawn_auto_wait(inner: &Arc<SessionInner>, state: &mut SessionState, incident_id: &str) {
        let sub_id = state.subscriptions.next_id();
        let weak: Weak<SessionInner> = Arc::downgrade(inner);
        let wait = inner.config.auto_wait;
        let id = incident_id.to_string();
        let sub = Subscription::spawn(sub_id, move |_token| async move {
            tokio::time::sleep(wait).await;
            if let Some(inner) = weak.upgrade() {
                inner.auto_wait_elapsed(&id, sub_id);
            }
        });
        state
            .subscriptions
            .insert(incident_id, SubscriptionKind::AutoWait, sub);
    }

    fn auto_wait_elapsed(&self, incident_id: &str, sub_id: u64) {
        let mut state = self.lock();
        if !state
            .subscriptions
            .release(incident_id, SubscriptionKind::AutoWait, sub_id)
        {
            return;
        }
        let elapsed = state
            .diagnosis
            .get_mut(incident_id)
            .is_some_and(DiagnosisWorkflow::timer_elapsed);
        drop(state);
        if elapsed {
            tracing::info!(incident_id, "no analysis arrived; manual trigger available");
            self.events.record(BoardEvent::success(
                incident_id,
                BoardEventKind::AutoWaitElapsed,
                "",
            ));
        }
    }

    /// Start (or restart) the poll loop for `execution_id`. `immediate`
    /// fetches once before the first interval.
    fn spawn_poll(
        inner: &Arc<SessionInner>,
        state: &mut SessionState,
        incident_id: &str,
        execution_id: &str,
        immediate: bool,
    ) {
        let sub_id = state.subscriptions.next_id();
        let weak: Weak<SessionInner> = Arc::downgrade(inner);
        let api = Arc::clone(&inner.api);
        let interval = inner.config.poll_interval;
        let policy = inner.config.poll_policy;
        let incident = incident_id.to_string();
        let execution = execution_id.to_string();

        let sub = Subscription::spawn(sub_id, move |token| async move {
            let mut stream = PollingExecutionStream::new(api, execution.clone(), interval);
            if !immediate {
                stream = stream.delayed();
            }
            let observer = weak.clone();
            let end = watch_execution(&mut stream, policy, token, |snapshot| {
                if let Some(inner) = observer.upgrade() {
                    inner.observe_execution(&incident, snapshot.clone());
                }
            })
            .await;
            if let Some(inner) = weak.upgrade() {
                inner.poll_finished(&incident, &execution, sub_id, &end);
            }
        });
        state
            .subscriptions
            .insert(incident_id, SubscriptionKind::ExecutionPoll, sub);
    }

    fn observe_execution(&self, incident_id: &str, execution: AgentExecution) {
        let execution_id = execution.id.clone();
        let mut state = self.lock();
        let outcome = state
            .remediation
            .entry(incident_id.to_string())
            .or_default()
            .observe(execution);
        drop(state);
        let detail = match outcome {
            ObserveOutcome::Updated { from, to } if from != to => {
                tracing::info!(incident_id, execution_id = %execution_id, %from, %to, "execution advanced");
                format!("{from} -> {to}")
            }
            ObserveOutcome::Inserted => "inserted".to_string(),
            _ => return,
        };
        self.events.record(
            BoardEvent::success(incident_id, BoardEventKind::ExecutionObserved, detail)
                .with_execution(execution_id),
        );
    }

    fn poll_finished(&self, incident_id: &str, execution_id: &str, sub_id: u64, end: &WatchEnd) {
        self.lock()
            .subscriptions
            .release(incident_id, SubscriptionKind::ExecutionPoll, sub_id);
        let detail = match end {
            WatchEnd::Stopped(execution) => execution.status.as_str(),
            WatchEnd::Cancelled => "cancelled",
            WatchEnd::Exhausted => "exhausted",
        };
        tracing::debug!(incident_id, execution_id, detail, "execution polling stopped");
        self.events.record(
            BoardEvent::success(incident_id, BoardEventKind::PollStopped, detail)
                .with_execution(execution_id),
        );
    }

    fn diagnosis_state(state: &SessionState, incident: &Incident) -> DiagnosisState {
        let workflow = state.diagnosis.get(&incident.id);
        let trigger = |kind: AnalysisKind| {
            if state.flights.is_in_flight(kind.as_str(), &incident.id) {
                TriggerState::InFlight
            } else if workflow.is_some_and(|w| w.trigger_visible(incident, kind)) {
                TriggerState::Enabled
            } else {
                TriggerState::Hidden
            }
        };
        DiagnosisState {
            waiting_for_auto: workflow.is_some_and(DiagnosisWorkflow::is_waiting),
            last_error: workflow.and_then(|w| w.last_error().map(str::to_string)),
            diagnosis: trigger(AnalysisKind::Diagnosis),
            solution: trigger(AnalysisKind::Solution),
        }
    }
}
