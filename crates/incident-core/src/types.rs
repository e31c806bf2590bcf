//! Transport-agnostic incident board types.
//!
//! These types provide the domain model shared by the board, the remediation
//! workflow and the REST/WS boundary. Wire payloads are normalized into these
//! shapes by [`crate::normalize`] before anything else sees them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-side incident status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    #[serde(alias = "Triage")]
    Triage,
    #[serde(alias = "Investigating")]
    Investigating,
    #[serde(alias = "Fixing")]
    Fixing,
    #[serde(alias = "Resolved")]
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::Investigating => "investigating",
            Self::Fixing => "fixing",
            Self::Resolved => "resolved",
        }
    }

    /// Resolved incidents leave the active board.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// The board column that displays this status, if any.
    pub fn column(self) -> Option<Column> {
        Column::for_status(self)
    }

    /// Parse a status from its string representation (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "triage" => Some(Self::Triage),
            "investigating" => Some(Self::Investigating),
            "fixing" => Some(Self::Fixing),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three fixed board columns.
///
/// Column identity is part of the contract: each column maps to exactly one
/// active [`IncidentStatus`] and the display order never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Triage,
    Investigating,
    Fixing,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Triage, Column::Investigating, Column::Fixing];

    pub fn index(self) -> usize {
        match self {
            Self::Triage => 0,
            Self::Investigating => 1,
            Self::Fixing => 2,
        }
    }

    pub fn status(self) -> IncidentStatus {
        match self {
            Self::Triage => IncidentStatus::Triage,
            Self::Investigating => IncidentStatus::Investigating,
            Self::Fixing => IncidentStatus::Fixing,
        }
    }

    pub fn for_status(status: IncidentStatus) -> Option<Self> {
        match status {
            IncidentStatus::Triage => Some(Self::Triage),
            IncidentStatus::Investigating => Some(Self::Investigating),
            IncidentStatus::Fixing => Some(Self::Fixing),
            IncidentStatus::Resolved => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Triage => "Triage",
            Self::Investigating => "Investigating",
            Self::Fixing => "Fixing",
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[serde(alias = "Critical", alias = "CRITICAL")]
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an incident's append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: IncidentStatus,
    pub timestamp: DateTime<Utc>,
}

/// Which AI analysis an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    Diagnosis,
    Solution,
}

impl AnalysisKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Diagnosis => "diagnosis",
            Self::Solution => "solution",
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An incident as displayed on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: String,
    pub status: IncidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub has_diagnosis: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default)]
    pub has_solution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
}

impl Incident {
    /// Minimal incident with no analysis and an empty history.
    pub fn new(id: impl Into<String>, message: impl Into<String>, status: IncidentStatus) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            source: String::new(),
            status,
            severity: None,
            team: None,
            diagnosis: None,
            has_diagnosis: false,
            solution: None,
            has_solution: false,
            notes: None,
            created_at: None,
            status_history: Vec::new(),
        }
    }

    pub fn column(&self) -> Option<Column> {
        self.status.column()
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether either AI analysis has been produced.
    pub fn has_analysis(&self) -> bool {
        self.has_diagnosis || self.has_solution
    }

    pub fn has(&self, kind: AnalysisKind) -> bool {
        match kind {
            AnalysisKind::Diagnosis => self.has_diagnosis,
            AnalysisKind::Solution => self.has_solution,
        }
    }

    /// Store analysis text and raise the matching flag.
    pub fn set_analysis(&mut self, kind: AnalysisKind, text: impl Into<String>) {
        match kind {
            AnalysisKind::Diagnosis => {
                self.diagnosis = Some(text.into());
                self.has_diagnosis = true;
            }
            AnalysisKind::Solution => {
                self.solution = Some(text.into());
                self.has_solution = true;
            }
        }
    }

    /// Change status and append the change to the history.
    pub fn record_status(&mut self, status: IncidentStatus, at: DateTime<Utc>) {
        self.status = status;
        self.status_history.push(StatusChange {
            status,
            timestamp: at,
        });
    }

    /// Carry forward state that must never regress when a newer snapshot
    /// replaces `previous`: analysis flags (and their text when the snapshot
    /// omits it) and the append-only status history.
    pub fn absorb_monotonic(&mut self, previous: &Incident) {
        if previous.has_diagnosis {
            self.has_diagnosis = true;
            if self.diagnosis.is_none() {
                self.diagnosis = previous.diagnosis.clone();
            }
        }
        if previous.has_solution {
            self.has_solution = true;
            if self.solution.is_none() {
                self.solution = previous.solution.clone();
            }
        }
        if self.status_history.len() < previous.status_history.len() {
            self.status_history = previous.status_history.clone();
        }
    }
}

/// Payload for `POST /incidents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateIncident {
    pub message: String,
    pub source: String,
}

/// Partial update for `PATCH /incidents/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncidentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl IncidentPatch {
    pub fn status(status: IncidentStatus) -> Self {
        Self {
            status: Some(status),
            notes: None,
        }
    }

    pub fn notes(notes: impl Into<String>) -> Self {
        Self {
            status: None,
            notes: Some(notes.into()),
        }
    }
}

/// Response of a diagnose / suggest-fix call after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResponse {
    /// Free text produced by the analysis service (may be error-shaped).
    pub text: String,
    /// Updated incident, when the server included one.
    pub incident: Option<Incident>,
}

/// Remediation execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Thinking,
    Previewing,
    AwaitingApproval,
    Executing,
    Verifying,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Previewing => "previewing",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition can occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Parse a status from its string representation.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thinking" => Some(Self::Thinking),
            "previewing" => Some(Self::Previewing),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "executing" => Some(Self::Executing),
            "verifying" => Some(Self::Verifying),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason the server records when an operator rejects a proposed remediation.
pub const REJECTED_BY_USER: &str = "Rejected by user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationCheck {
    pub description: String,
    pub passed: Option<bool>,
}

/// One remediation attempt for an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentExecution {
    pub id: String,
    pub incident_id: String,
    pub status: ExecutionStatus,
    pub analysis: Option<String>,
    pub recommended_action: Option<String>,
    pub reasoning: Option<String>,
    pub commands: Vec<String>,
    pub risks: Vec<String>,
    pub execution_logs: Vec<String>,
    pub verification_checks: Vec<VerificationCheck>,
    pub verification_passed: Option<bool>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentExecution {
    /// Bare execution in the given status with nothing populated yet.
    pub fn new(
        id: impl Into<String>,
        incident_id: impl Into<String>,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            id: id.into(),
            incident_id: incident_id.into(),
            status,
            analysis: None,
            recommended_action: None,
            reasoning: None,
            commands: Vec::new(),
            risks: Vec::new(),
            execution_logs: Vec::new(),
            verification_checks: Vec::new(),
            verification_passed: None,
            success: None,
            error_message: None,
            created_at: None,
            updated_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn was_rejected_by_user(&self) -> bool {
        self.status == ExecutionStatus::Cancelled
            && self.error_message.as_deref() == Some(REJECTED_BY_USER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_map_to_active_statuses_only() {
        for column in Column::ALL {
            assert_eq!(Column::for_status(column.status()), Some(column));
        }
        assert_eq!(Column::for_status(IncidentStatus::Resolved), None);
    }

    #[test]
    fn column_indexes_follow_display_order() {
        let indexes: Vec<usize> = Column::ALL.iter().map(|c| c.index()).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[test]
    fn absorb_keeps_analysis_flags_monotonic() {
        let mut previous = Incident::new("inc-1", "disk full", IncidentStatus::Triage);
        previous.set_analysis(AnalysisKind::Diagnosis, "root cause: log rotation disabled");

        let mut next = Incident::new("inc-1", "disk full", IncidentStatus::Investigating);
        next.absorb_monotonic(&previous);

        assert!(next.has_diagnosis);
        assert_eq!(
            next.diagnosis.as_deref(),
            Some("root cause: log rotation disabled")
        );
        assert!(!next.has_solution);
    }

    #[test]
    fn absorb_never_truncates_history() {
        let now = Utc::now();
        let mut previous = Incident::new("inc-1", "m", IncidentStatus::Triage);
        previous.record_status(IncidentStatus::Investigating, now);
        previous.record_status(IncidentStatus::Fixing, now);

        let mut next = Incident::new("inc-1", "m", IncidentStatus::Fixing);
        next.absorb_monotonic(&previous);
        assert_eq!(next.status_history.len(), 2);
    }

    #[test]
    fn incident_status_parses_case_insensitively() {
        assert_eq!(
            IncidentStatus::from_str("Investigating"),
            Some(IncidentStatus::Investigating)
        );
        assert_eq!(IncidentStatus::from_str("closed"), None);
    }

    #[test]
    fn execution_terminal_states() {
        for status in [
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        for status in [
            ExecutionStatus::Thinking,
            ExecutionStatus::Previewing,
            ExecutionStatus::AwaitingApproval,
            ExecutionStatus::Executing,
            ExecutionStatus::Verifying,
        ] {
            assert!(status.is_active(), "{status} should be active");
        }
    }

    #[test]
    fn rejection_is_distinguished_from_other_cancellation() {
        let mut exec = AgentExecution::new("ex-1", "inc-1", ExecutionStatus::Cancelled);
        assert!(!exec.was_rejected_by_user());
        exec.error_message = Some(REJECTED_BY_USER.to_string());
        assert!(exec.was_rejected_by_user());
    }
}
