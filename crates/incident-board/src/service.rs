//! Incident backend trait, the boundary every board mutation and query
//! crosses.
//!
//! Implementations can run against the REST backend or be mocked for testing.
//! Implementations return canonical types: payload shape differences are
//! resolved by `incident_core::normalize` before anything is returned.

use async_trait::async_trait;

use incident_core::types::{
    AgentExecution, AnalysisKind, AnalysisResponse, CreateIncident, Incident, IncidentPatch,
};
use incident_core::BoardError;

/// The backend request/response interface.
#[async_trait]
pub trait IncidentApi: Send + Sync {
    /// List active (non-resolved) incidents.
    async fn list_incidents(&self) -> Result<Vec<Incident>, BoardError>;

    /// List resolved incidents.
    async fn list_resolved(&self) -> Result<Vec<Incident>, BoardError>;

    /// Create an incident from an operator-supplied message.
    async fn create_incident(&self, params: CreateIncident) -> Result<Incident, BoardError>;

    /// Partially update an incident (status and/or notes).
    async fn patch_incident(
        &self,
        incident_id: &str,
        patch: IncidentPatch,
    ) -> Result<Incident, BoardError>;

    /// Request an AI diagnosis or solution. The returned text may be
    /// error-shaped; callers classify it.
    async fn request_analysis(
        &self,
        incident_id: &str,
        kind: AnalysisKind,
    ) -> Result<AnalysisResponse, BoardError>;

    /// Generate a synthetic incident.
    async fn generate_incident(&self) -> Result<Incident, BoardError>;

    /// Start a remediation run. Returns the initial execution.
    async fn start_remediation(&self, incident_id: &str) -> Result<AgentExecution, BoardError>;

    /// List executions for an incident, most recent first.
    async fn list_executions(&self, incident_id: &str) -> Result<Vec<AgentExecution>, BoardError>;

    /// Get a single execution by id (the polling target).
    async fn get_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError>;

    /// Approve the commands proposed by an execution awaiting approval.
    async fn approve_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError>;

    /// Reject the commands proposed by an execution awaiting approval.
    async fn reject_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError>;
}
