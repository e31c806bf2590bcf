//! Normalized error types for incident board operations.
//!
//! Transport-agnostic errors that hide reqwest/websocket details and provide
//! actionable error categories for callers.

use thiserror::Error;

/// Normalized error for board, diagnosis and remediation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    /// The backend is unreachable (connection refused, timeout, reset).
    #[error("backend unavailable: {message}")]
    Transport { message: String },

    /// The backend answered with a non-2xx status.
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A response payload could not be normalized into a canonical shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Incident or execution not found by id.
    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    /// The target is in a state that does not allow the requested operation.
    #[error("{id:?} in state {current_state:?} does not support {operation:?}")]
    InvalidState {
        id: String,
        current_state: String,
        operation: String,
    },

    /// A request for the same action is still outstanding.
    #[error("{action} already in flight for {id:?}")]
    InFlight { action: String, id: String },

    /// Remediation start refused because an execution is still running.
    #[error("incident {incident_id:?} already has active execution {execution_id:?}")]
    RemediationActive {
        incident_id: String,
        execution_id: String,
    },

    /// A wait operation timed out before a terminal state was observed.
    #[error(
        "wait timeout for execution {execution_id:?}: last observed {last_observed_state:?}"
    )]
    WaitTimeout {
        execution_id: String,
        last_observed_state: String,
    },

    /// A wait operation was cancelled via cancellation token.
    #[error(
        "wait cancelled for execution {execution_id:?}: last observed {last_observed_state:?}"
    )]
    WaitCancelled {
        execution_id: String,
        last_observed_state: String,
    },

    #[error("config error: {message}")]
    Config { message: String },
}

impl BoardError {
    pub fn incident_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "incident",
            id: id.into(),
        }
    }

    pub fn execution_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "execution",
            id: id.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Whether this error is retryable (transport failures, timeouts).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::WaitTimeout { .. } | Self::WaitCancelled { .. }
        )
    }

    /// Whether the failure came from the boundary (transport or server) and
    /// should be shown to the operator as a transient banner.
    pub fn is_boundary_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Api { .. } | Self::InvalidResponse { .. }
        )
    }

    /// Operator-facing copy for a transient banner.
    pub fn banner_message(&self) -> String {
        match self {
            Self::Transport { message } => format!("Network error: {message}"),
            Self::Api { message, .. } => message.clone(),
            Self::InvalidResponse { .. } => "Unexpected response from server".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_show_server_message_verbatim() {
        let err = BoardError::Api {
            status: 409,
            message: "Incident already resolved".into(),
        };
        assert_eq!(err.banner_message(), "Incident already resolved");
        assert!(err.is_boundary_failure());
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_errors_are_retryable() {
        let err = BoardError::Transport {
            message: "connection refused".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.banner_message(), "Network error: connection refused");
    }

    #[test]
    fn guard_errors_are_not_boundary_failures() {
        let err = BoardError::InFlight {
            action: "approve".into(),
            id: "ex-1".into(),
        };
        assert!(!err.is_boundary_failure());
        assert_eq!(err.to_string(), "approve already in flight for \"ex-1\"");
    }
}
