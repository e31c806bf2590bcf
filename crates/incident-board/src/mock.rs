//! Mock incident backend for unit testing.
//!
//! Provides a configurable in-memory backend that records all calls, keeps
//! incidents and executions the way the server would, and can inject
//! one-shot errors or latency per operation.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use incident_core::types::{
    AgentExecution, AnalysisKind, AnalysisResponse, CreateIncident, ExecutionStatus, Incident,
    IncidentPatch, IncidentStatus, REJECTED_BY_USER,
};
use incident_core::BoardError;

use crate::service::IncidentApi;

/// Operation selector for error and latency injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    ListIncidents,
    ListResolved,
    CreateIncident,
    PatchIncident,
    RequestAnalysis,
    GenerateIncident,
    StartRemediation,
    ListExecutions,
    GetExecution,
    ApproveExecution,
    RejectExecution,
}

/// A recorded call to the mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListIncidents,
    ListResolved,
    CreateIncident(CreateIncident),
    PatchIncident(String, IncidentPatch),
    RequestAnalysis(String, AnalysisKind),
    GenerateIncident,
    StartRemediation(String),
    ListExecutions(String),
    GetExecution(String),
    ApproveExecution(String),
    RejectExecution(String),
}

impl MockCall {
    pub fn op(&self) -> MockOp {
        match self {
            Self::ListIncidents => MockOp::ListIncidents,
            Self::ListResolved => MockOp::ListResolved,
            Self::CreateIncident(_) => MockOp::CreateIncident,
            Self::PatchIncident(..) => MockOp::PatchIncident,
            Self::RequestAnalysis(..) => MockOp::RequestAnalysis,
            Self::GenerateIncident => MockOp::GenerateIncident,
            Self::StartRemediation(_) => MockOp::StartRemediation,
            Self::ListExecutions(_) => MockOp::ListExecutions,
            Self::GetExecution(_) => MockOp::GetExecution,
            Self::ApproveExecution(_) => MockOp::ApproveExecution,
            Self::RejectExecution(_) => MockOp::RejectExecution,
        }
    }
}

#[derive(Default)]
struct MockState {
    /// Active incidents in insertion order.
    incidents: Vec<Incident>,
    resolved: Vec<Incident>,
    /// Execution ids, most recent first.
    execution_order: Vec<String>,
    executions: HashMap<String, AgentExecution>,
    /// Snapshots handed out by successive `get_execution` calls.
    poll_scripts: HashMap<String, VecDeque<AgentExecution>>,
    analysis_responses: VecDeque<Result<AnalysisResponse, BoardError>>,
    next_incident: u64,
    next_execution: u64,
}

/// Mock implementation of `IncidentApi` for testing.
pub struct MockIncidentApi {
    state: Mutex<MockState>,
    calls: Mutex<Vec<MockCall>>,
    errors: Mutex<HashMap<MockOp, BoardError>>,
    latency: Mutex<HashMap<MockOp, Duration>>,
}

impl Default for MockIncidentApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIncidentApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            calls: Mutex::new(Vec::new()),
            errors: Mutex::new(HashMap::new()),
            latency: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-populate an incident; resolved ones go to the resolved list.
    pub fn with_incident(self, incident: Incident) -> Self {
        self.put_incident(incident);
        self
    }

    /// Pre-populate an execution (treated as the most recent so far).
    pub fn with_execution(self, execution: AgentExecution) -> Self {
        self.set_execution(execution);
        self
    }

    /// Configure the next call of `op` to fail with `err`.
    pub fn with_error(self, op: MockOp, err: BoardError) -> Self {
        self.fail_next(op, err);
        self
    }

    /// Delay every call of `op` by `delay` before answering.
    pub fn with_latency(self, op: MockOp, delay: Duration) -> Self {
        self.set_latency(op, delay);
        self
    }

    /// Queue a scripted analysis response, consumed in order.
    pub fn with_analysis_response(self, response: Result<AnalysisResponse, BoardError>) -> Self {
        self.push_analysis_response(response);
        self
    }

    /// Script the snapshots successive polls of `execution_id` return.
    pub fn with_poll_script(self, execution_id: &str, snapshots: Vec<AgentExecution>) -> Self {
        self.script_polls(execution_id, snapshots);
        self
    }

    pub fn put_incident(&self, incident: Incident) {
        let mut state = self.lock_state();
        state.incidents.retain(|i| i.id != incident.id);
        state.resolved.retain(|i| i.id != incident.id);
        if incident.is_resolved() {
            state.resolved.push(incident);
        } else {
            state.incidents.push(incident);
        }
    }

    /// Replace the server-side record of an execution.
    pub fn set_execution(&self, execution: AgentExecution) {
        let mut state = self.lock_state();
        if !state.executions.contains_key(&execution.id) {
            state.execution_order.insert(0, execution.id.clone());
        }
        state.executions.insert(execution.id.clone(), execution);
    }

    pub fn fail_next(&self, op: MockOp, err: BoardError) {
        match self.errors.lock() {
            Ok(mut guard) => guard.insert(op, err),
            Err(poisoned) => poisoned.into_inner().insert(op, err),
        };
    }

    pub fn set_latency(&self, op: MockOp, delay: Duration) {
        match self.latency.lock() {
            Ok(mut guard) => guard.insert(op, delay),
            Err(poisoned) => poisoned.into_inner().insert(op, delay),
        };
    }

    pub fn push_analysis_response(&self, response: Result<AnalysisResponse, BoardError>) {
        self.lock_state().analysis_responses.push_back(response);
    }

    pub fn script_polls(&self, execution_id: &str, snapshots: Vec<AgentExecution>) {
        self.lock_state()
            .poll_scripts
            .entry(execution_id.to_string())
            .or_default()
            .extend(snapshots);
    }

    /// Current server-side incident, active or resolved.
    pub fn incident(&self, id: &str) -> Option<Incident> {
        let state = self.lock_state();
        state
            .incidents
            .iter()
            .chain(state.resolved.iter())
            .find(|i| i.id == id)
            .cloned()
    }

    /// Current server-side execution.
    pub fn execution(&self, id: &str) -> Option<AgentExecution> {
        self.lock_state().executions.get(id).cloned()
    }

    /// Return all recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        match self.calls.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Return the number of recorded calls.
    pub fn call_count(&self) -> usize {
        match self.calls.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Number of recorded calls of one kind.
    pub fn count_of(&self, op: MockOp) -> usize {
        self.calls().iter().filter(|c| c.op() == op).count()
    }

    fn record(&self, call: MockCall) {
        match self.calls.lock() {
            Ok(mut guard) => guard.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take_error(&self, op: MockOp) -> Option<BoardError> {
        match self.errors.lock() {
            Ok(mut guard) => guard.remove(&op),
            Err(poisoned) => poisoned.into_inner().remove(&op),
        }
    }

    fn latency_for(&self, op: MockOp) -> Option<Duration> {
        match self.latency.lock() {
            Ok(guard) => guard.get(&op).copied(),
            Err(poisoned) => poisoned.into_inner().get(&op).copied(),
        }
    }

    /// Record the call, apply latency, then surface an injected error.
    async fn enter(&self, call: MockCall) -> Result<(), BoardError> {
        let op = call.op();
        self.record(call);
        if let Some(delay) = self.latency_for(op) {
            tokio::time::sleep(delay).await;
        }
        match self.take_error(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn new_incident(state: &mut MockState, message: String, source: String) -> Incident {
        state.next_incident += 1;
        let mut incident = Incident::new(
            format!("inc-{}", state.next_incident),
            message,
            IncidentStatus::Triage,
        );
        incident.source = source;
        let now = Utc::now();
        incident.created_at = Some(now);
        incident.record_status(IncidentStatus::Triage, now);
        state.incidents.push(incident.clone());
        incident
    }
}

fn not_found(kind: &str, id: &str) -> BoardError {
    BoardError::Api {
        status: 404,
        message: format!("{kind} {id} not found"),
    }
}

/// Helper to create a test incident with sensible defaults.
pub fn test_incident(id: &str, status: IncidentStatus) -> Incident {
    let mut incident = Incident::new(id, format!("Alert for {id}"), status);
    incident.source = "test".into();
    incident
}

/// Helper to create a test execution with sensible defaults.
pub fn test_execution(id: &str, incident_id: &str, status: ExecutionStatus) -> AgentExecution {
    let mut execution = AgentExecution::new(id, incident_id, status);
    if matches!(
        status,
        ExecutionStatus::AwaitingApproval | ExecutionStatus::Executing | ExecutionStatus::Verifying
    ) {
        execution.recommended_action = Some("Restart the failing service".into());
        execution.commands = vec!["systemctl restart app".into()];
    }
    execution
}

#[async_trait]
impl IncidentApi for MockIncidentApi {
    async fn list_incidents(&self) -> Result<Vec<Incident>, BoardError> {
        self.enter(MockCall::ListIncidents).await?;
        Ok(self.lock_state().incidents.clone())
    }

    async fn list_resolved(&self) -> Result<Vec<Incident>, BoardError> {
        self.enter(MockCall::ListResolved).await?;
        Ok(self.lock_state().resolved.clone())
    }

    async fn create_incident(&self, params: CreateIncident) -> Result<Incident, BoardError> {
        self.enter(MockCall::CreateIncident(params.clone())).await?;
        let mut state = self.lock_state();
        Ok(Self::new_incident(&mut state, params.message, params.source))
    }

    async fn patch_incident(
        &self,
        incident_id: &str,
        patch: IncidentPatch,
    ) -> Result<Incident, BoardError> {
        self.enter(MockCall::PatchIncident(
            incident_id.to_string(),
            patch.clone(),
        ))
        .await?;
        let mut state = self.lock_state();
        let Some(pos) = state.incidents.iter().position(|i| i.id == incident_id) else {
            return Err(not_found("Incident", incident_id));
        };
        let mut incident = state.incidents[pos].clone();
        if let Some(status) = patch.status {
            if status != incident.status {
                incident.record_status(status, Utc::now());
            }
        }
        if let Some(notes) = patch.notes {
            incident.notes = Some(notes);
        }
        if incident.is_resolved() {
            state.incidents.remove(pos);
            state.resolved.push(incident.clone());
        } else {
            state.incidents[pos] = incident.clone();
        }
        Ok(incident)
    }

    async fn request_analysis(
        &self,
        incident_id: &str,
        kind: AnalysisKind,
    ) -> Result<AnalysisResponse, BoardError> {
        self.enter(MockCall::RequestAnalysis(incident_id.to_string(), kind))
            .await?;
        let mut state = self.lock_state();
        if let Some(scripted) = state.analysis_responses.pop_front() {
            return scripted;
        }
        let Some(incident) = state.incidents.iter_mut().find(|i| i.id == incident_id) else {
            return Err(not_found("Incident", incident_id));
        };
        let text = format!(
            "{kind} for {incident_id}: upstream dependency saturated after the latest deploy."
        );
        incident.set_analysis(kind, text.clone());
        Ok(AnalysisResponse {
            text,
            incident: Some(incident.clone()),
        })
    }

    async fn generate_incident(&self) -> Result<Incident, BoardError> {
        self.enter(MockCall::GenerateIncident).await?;
        let mut state = self.lock_state();
        let message = format!("Synthetic alert #{}", state.next_incident + 1);
        Ok(Self::new_incident(&mut state, message, "generator".into()))
    }

    async fn start_remediation(&self, incident_id: &str) -> Result<AgentExecution, BoardError> {
        self.enter(MockCall::StartRemediation(incident_id.to_string()))
            .await?;
        let mut state = self.lock_state();
        if !state.incidents.iter().any(|i| i.id == incident_id) {
            return Err(not_found("Incident", incident_id));
        }
        let running = state
            .executions
            .values()
            .any(|e| e.incident_id == incident_id && !e.is_terminal());
        if running {
            return Err(BoardError::Api {
                status: 409,
                message: "A remediation is already running for this incident".into(),
            });
        }
        state.next_execution += 1;
        let mut execution = AgentExecution::new(
            format!("ex-{}", state.next_execution),
            incident_id,
            ExecutionStatus::Thinking,
        );
        execution.created_at = Some(Utc::now());
        state.execution_order.insert(0, execution.id.clone());
        state
            .executions
            .insert(execution.id.clone(), execution.clone());
        Ok(execution)
    }

    async fn list_executions(&self, incident_id: &str) -> Result<Vec<AgentExecution>, BoardError> {
        self.enter(MockCall::ListExecutions(incident_id.to_string()))
            .await?;
        let state = self.lock_state();
        Ok(state
            .execution_order
            .iter()
            .filter_map(|id| state.executions.get(id))
            .filter(|e| e.incident_id == incident_id)
            .cloned()
            .collect())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError> {
        self.enter(MockCall::GetExecution(execution_id.to_string()))
            .await?;
        let mut state = self.lock_state();
        let scripted = state
            .poll_scripts
            .get_mut(execution_id)
            .and_then(VecDeque::pop_front);
        if let Some(next) = scripted {
            state.executions.insert(next.id.clone(), next);
        }
        state
            .executions
            .get(execution_id)
            .cloned()
            .ok_or_else(|| not_found("Execution", execution_id))
    }

    async fn approve_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError> {
        self.enter(MockCall::ApproveExecution(execution_id.to_string()))
            .await?;
        let mut state = self.lock_state();
        let Some(execution) = state.executions.get_mut(execution_id) else {
            return Err(not_found("Execution", execution_id));
        };
        if execution.status != ExecutionStatus::AwaitingApproval {
            return Err(BoardError::Api {
                status: 400,
                message: format!("Execution is {}, not awaiting approval", execution.status),
            });
        }
        execution.status = ExecutionStatus::Executing;
        execution.updated_at = Some(Utc::now());
        Ok(execution.clone())
    }

    async fn reject_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError> {
        self.enter(MockCall::RejectExecution(execution_id.to_string()))
            .await?;
        let mut state = self.lock_state();
        let Some(execution) = state.executions.get_mut(execution_id) else {
            return Err(not_found("Execution", execution_id));
        };
        if execution.status != ExecutionStatus::AwaitingApproval {
            return Err(BoardError::Api {
                status: 400,
                message: format!("Execution is {}, not awaiting approval", execution.status),
            });
        }
        let now = Utc::now();
        execution.status = ExecutionStatus::Cancelled;
        execution.error_message = Some(REJECTED_BY_USER.into());
        execution.updated_at = Some(now);
        execution.completed_at = Some(now);
        Ok(execution.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_one_shot_errors() {
        let mock = MockIncidentApi::new()
            .with_incident(test_incident("inc-1", IncidentStatus::Triage))
            .with_error(
                MockOp::ListIncidents,
                BoardError::Transport {
                    message: "refused".into(),
                },
            );

        assert!(mock.list_incidents().await.is_err());
        let listed = mock.list_incidents().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.count_of(MockOp::ListIncidents), 2);
    }

    #[tokio::test]
    async fn patch_to_resolved_moves_incident_to_resolved_list() {
        let mock = MockIncidentApi::new()
            .with_incident(test_incident("inc-1", IncidentStatus::Fixing));

        let patched = mock
            .patch_incident("inc-1", IncidentPatch::status(IncidentStatus::Resolved))
            .await
            .unwrap();
        assert_eq!(patched.status, IncidentStatus::Resolved);
        assert_eq!(patched.status_history.len(), 1);
        assert!(mock.list_incidents().await.unwrap().is_empty());
        assert_eq!(mock.list_resolved().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approve_and_reject_follow_the_gate() {
        let mock = MockIncidentApi::new()
            .with_incident(test_incident("inc-1", IncidentStatus::Fixing))
            .with_execution(test_execution("ex-1", "inc-1", ExecutionStatus::AwaitingApproval))
            .with_execution(test_execution("ex-2", "inc-1", ExecutionStatus::Executing));

        let rejected = mock.reject_execution("ex-1").await.unwrap();
        assert_eq!(rejected.status, ExecutionStatus::Cancelled);
        assert!(rejected.was_rejected_by_user());

        match mock.approve_execution("ex-2").await {
            Err(BoardError::Api { status, .. }) => assert_eq!(status, 400),
            other => panic!("expected 400, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_script_advances_then_holds() {
        let mock = MockIncidentApi::new()
            .with_execution(test_execution("ex-1", "inc-1", ExecutionStatus::Thinking))
            .with_poll_script(
                "ex-1",
                vec![test_execution("ex-1", "inc-1", ExecutionStatus::AwaitingApproval)],
            );

        assert_eq!(
            mock.get_execution("ex-1").await.unwrap().status,
            ExecutionStatus::AwaitingApproval
        );
        assert_eq!(
            mock.get_execution("ex-1").await.unwrap().status,
            ExecutionStatus::AwaitingApproval
        );
    }

    #[tokio::test]
    async fn start_remediation_prepends_new_execution() {
        let mock = MockIncidentApi::new()
            .with_incident(test_incident("inc-1", IncidentStatus::Fixing))
            .with_execution(test_execution("ex-old", "inc-1", ExecutionStatus::Failed));

        let started = mock.start_remediation("inc-1").await.unwrap();
        assert_eq!(started.status, ExecutionStatus::Thinking);
        let ids: Vec<String> = mock
            .list_executions("inc-1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![started.id, "ex-old".to_string()]);
    }
}
