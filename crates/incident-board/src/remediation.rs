//! Per-incident remediation history and the rules around it.
//!
//! Executions are kept most-recent-first. At most one may be non-terminal;
//! a new run after a terminal one is prepended and never mutates the old
//! record.

use incident_core::types::{AgentExecution, ExecutionStatus};
use incident_core::BoardError;

use crate::lifecycle::validate_transition;

/// When the poll loop for an execution ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStopPolicy {
    /// Stop only on `completed` / `failed`; a `cancelled` execution keeps
    /// being polled.
    CompletedOrFailed,
    /// Stop on every terminal status.
    AnyTerminal,
}

impl PollStopPolicy {
    pub fn from_config(stop_on_cancelled: bool) -> Self {
        if stop_on_cancelled {
            Self::AnyTerminal
        } else {
            Self::CompletedOrFailed
        }
    }

    pub fn should_stop(self, status: ExecutionStatus) -> bool {
        match self {
            Self::CompletedOrFailed => {
                matches!(status, ExecutionStatus::Completed | ExecutionStatus::Failed)
            }
            Self::AnyTerminal => status.is_terminal(),
        }
    }
}

/// Whether a start is a first run or a retry after a terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    Fresh,
    Retry,
}

/// How an observed execution changed the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    Inserted,
    Updated {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
    /// A terminal record never changes status again.
    IgnoredTerminal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionHistory {
    executions: Vec<AgentExecution>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list response that is already most-recent-first.
    pub fn from_list(executions: Vec<AgentExecution>) -> Self {
        Self { executions }
    }

    pub fn executions(&self) -> &[AgentExecution] {
        &self.executions
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn latest(&self) -> Option<&AgentExecution> {
        self.executions.first()
    }

    pub fn get(&self, execution_id: &str) -> Option<&AgentExecution> {
        self.executions.iter().find(|e| e.id == execution_id)
    }

    /// The non-terminal execution, if one exists.
    pub fn active(&self) -> Option<&AgentExecution> {
        self.executions.iter().find(|e| !e.is_terminal())
    }

    /// Whether a new run may start, and whether it counts as a retry.
    pub fn can_start(&self, incident_id: &str) -> Result<StartKind, BoardError> {
        if let Some(active) = self.active() {
            return Err(BoardError::RemediationActive {
                incident_id: incident_id.to_string(),
                execution_id: active.id.clone(),
            });
        }
        Ok(match self.latest() {
            Some(latest)
                if matches!(
                    latest.status,
                    ExecutionStatus::Failed | ExecutionStatus::Cancelled
                ) =>
            {
                StartKind::Retry
            }
            _ => StartKind::Fresh,
        })
    }

    /// Prepend a newly started execution.
    pub fn record_started(&mut self, execution: AgentExecution) {
        self.executions.retain(|e| e.id != execution.id);
        self.executions.insert(0, execution);
    }

    /// Merge a polled or action-returned snapshot.
    pub fn observe(&mut self, execution: AgentExecution) -> ObserveOutcome {
        let Some(slot) = self.executions.iter_mut().find(|e| e.id == execution.id) else {
            self.executions.insert(0, execution);
            return ObserveOutcome::Inserted;
        };
        let from = slot.status;
        let to = execution.status;
        if from.is_terminal() && from != to {
            tracing::warn!(
                execution_id = %slot.id,
                %from,
                %to,
                "ignoring status change on terminal execution"
            );
            return ObserveOutcome::IgnoredTerminal;
        }
        if let Err(err) = validate_transition(from, to) {
            tracing::warn!(
                execution_id = %slot.id,
                from = %err.from,
                to = %err.to,
                "unexpected execution transition reported by server"
            );
        }
        *slot = execution;
        ObserveOutcome::Updated { from, to }
    }
}

/// Why a cancelled execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationKind {
    RejectedByUser,
    Cancelled,
}

pub fn cancellation_kind(execution: &AgentExecution) -> Option<CancellationKind> {
    if execution.status != ExecutionStatus::Cancelled {
        return None;
    }
    Some(if execution.was_rejected_by_user() {
        CancellationKind::RejectedByUser
    } else {
        CancellationKind::Cancelled
    })
}

/// Cancelled runs are collapsed in the history list.
pub fn collapsed_by_default(execution: &AgentExecution) -> bool {
    execution.status == ExecutionStatus::Cancelled
}

/// Operator-facing label for an execution's current phase.
pub fn status_label(execution: &AgentExecution) -> String {
    match execution.status {
        ExecutionStatus::Thinking => "Analyzing incident".into(),
        ExecutionStatus::Previewing => "Preparing remediation plan".into(),
        ExecutionStatus::AwaitingApproval => "Awaiting approval".into(),
        ExecutionStatus::Executing => "Executing commands".into(),
        ExecutionStatus::Verifying => "Verifying fix".into(),
        ExecutionStatus::Completed => "Remediation completed".into(),
        ExecutionStatus::Failed => match execution.error_message.as_deref() {
            Some(message) => format!("Failed: {message}"),
            None => "Failed".into(),
        },
        ExecutionStatus::Cancelled => match cancellation_kind(execution) {
            Some(CancellationKind::RejectedByUser) => "Rejected by user".into(),
            _ => "Cancelled".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use incident_core::types::REJECTED_BY_USER;

    use super::*;

    fn exec(id: &str, status: ExecutionStatus) -> AgentExecution {
        AgentExecution::new(id, "inc-1", status)
    }

    #[test]
    fn start_refused_while_any_execution_is_live() {
        for status in [
            ExecutionStatus::Thinking,
            ExecutionStatus::Previewing,
            ExecutionStatus::AwaitingApproval,
            ExecutionStatus::Executing,
            ExecutionStatus::Verifying,
        ] {
            let history = ExecutionHistory::from_list(vec![exec("ex-1", status)]);
            match history.can_start("inc-1") {
                Err(BoardError::RemediationActive { execution_id, .. }) => {
                    assert_eq!(execution_id, "ex-1")
                }
                other => panic!("expected RemediationActive for {status}, got {other:?}"),
            }
        }
    }

    #[test]
    fn start_after_failure_is_retry() {
        let history = ExecutionHistory::from_list(vec![exec("ex-1", ExecutionStatus::Failed)]);
        assert_eq!(history.can_start("inc-1"), Ok(StartKind::Retry));
        let history = ExecutionHistory::from_list(vec![exec("ex-1", ExecutionStatus::Completed)]);
        assert_eq!(history.can_start("inc-1"), Ok(StartKind::Fresh));
        assert_eq!(ExecutionHistory::new().can_start("inc-1"), Ok(StartKind::Fresh));
    }

    #[test]
    fn retry_prepends_and_keeps_old_record() {
        let mut history =
            ExecutionHistory::from_list(vec![exec("ex-1", ExecutionStatus::Cancelled)]);
        history.record_started(exec("ex-2", ExecutionStatus::Thinking));
        let ids: Vec<&str> = history.executions().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ex-2", "ex-1"]);
        assert_eq!(
            history.get("ex-1").map(|e| e.status),
            Some(ExecutionStatus::Cancelled)
        );
    }

    #[test]
    fn observe_updates_in_place() {
        let mut history = ExecutionHistory::from_list(vec![
            exec("ex-2", ExecutionStatus::Executing),
            exec("ex-1", ExecutionStatus::Failed),
        ]);
        let outcome = history.observe(exec("ex-2", ExecutionStatus::Verifying));
        assert_eq!(
            outcome,
            ObserveOutcome::Updated {
                from: ExecutionStatus::Executing,
                to: ExecutionStatus::Verifying
            }
        );
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().map(|e| e.id.as_str()), Some("ex-2"));
    }

    #[test]
    fn observe_never_revives_terminal_record() {
        let mut history =
            ExecutionHistory::from_list(vec![exec("ex-1", ExecutionStatus::Cancelled)]);
        assert_eq!(
            history.observe(exec("ex-1", ExecutionStatus::Executing)),
            ObserveOutcome::IgnoredTerminal
        );
        assert_eq!(
            history.latest().map(|e| e.status),
            Some(ExecutionStatus::Cancelled)
        );
    }

    #[test]
    fn stop_policies() {
        let legacy = PollStopPolicy::from_config(false);
        assert!(legacy.should_stop(ExecutionStatus::Completed));
        assert!(legacy.should_stop(ExecutionStatus::Failed));
        assert!(!legacy.should_stop(ExecutionStatus::Cancelled));

        let strict = PollStopPolicy::from_config(true);
        assert!(strict.should_stop(ExecutionStatus::Cancelled));
        assert!(!strict.should_stop(ExecutionStatus::AwaitingApproval));
    }

    #[test]
    fn rejection_copy_differs_from_cancellation() {
        let mut rejected = exec("ex-1", ExecutionStatus::Cancelled);
        rejected.error_message = Some(REJECTED_BY_USER.into());
        let cancelled = exec("ex-2", ExecutionStatus::Cancelled);

        assert_eq!(
            cancellation_kind(&rejected),
            Some(CancellationKind::RejectedByUser)
        );
        assert_eq!(cancellation_kind(&cancelled), Some(CancellationKind::Cancelled));
        assert_eq!(status_label(&rejected), "Rejected by user");
        assert_eq!(status_label(&cancelled), "Cancelled");
        assert!(collapsed_by_default(&rejected));
    }

    #[test]
    fn failure_label_shows_server_message_verbatim() {
        let mut failed = exec("ex-1", ExecutionStatus::Failed);
        failed.error_message = Some("systemctl restart nginx exited 1".into());
        assert_eq!(status_label(&failed), "Failed: systemctl restart nginx exited 1");
        assert_eq!(cancellation_kind(&failed), None);
    }
}
