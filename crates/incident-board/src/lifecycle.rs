//! Remediation execution transition and operation guardrails.

use incident_core::types::ExecutionStatus;
use incident_core::BoardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemediationOperation {
    Approve,
    Reject,
}

impl RemediationOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve_execution",
            Self::Reject => "reject_execution",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

impl TransitionError {
    pub fn to_board_error(self, execution_id: &str) -> BoardError {
        BoardError::InvalidState {
            id: execution_id.to_string(),
            current_state: self.from.to_string(),
            operation: format!("transition_to_{}", self.to),
        }
    }
}

pub fn is_valid_transition(from: ExecutionStatus, to: ExecutionStatus) -> bool {
    use ExecutionStatus::*;

    if from == to {
        return true;
    }
    if from.is_terminal() {
        return false;
    }

    matches!(
        (from, to),
        (Thinking, Previewing)
            | (Thinking, AwaitingApproval)
            | (Previewing, AwaitingApproval)
            | (AwaitingApproval, Executing)
            | (Executing, Verifying)
            | (Verifying, Completed)
            // Server-reported failure or cancellation from any live phase.
            | (_, Failed)
            | (_, Cancelled)
    )
}

pub fn validate_transition(
    from: ExecutionStatus,
    to: ExecutionStatus,
) -> Result<(), TransitionError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Approve and reject are only meaningful at the approval gate.
pub fn operation_allows_state(operation: RemediationOperation, status: ExecutionStatus) -> bool {
    match operation {
        RemediationOperation::Approve | RemediationOperation::Reject => {
            status == ExecutionStatus::AwaitingApproval
        }
    }
}

pub fn validate_operation_state(
    execution_id: &str,
    operation: RemediationOperation,
    status: ExecutionStatus,
) -> Result<(), BoardError> {
    if operation_allows_state(operation, status) {
        Ok(())
    } else {
        Err(BoardError::InvalidState {
            id: execution_id.to_string(),
            current_state: status.to_string(),
            operation: operation.as_str().to_string(),
        })
    }
}
