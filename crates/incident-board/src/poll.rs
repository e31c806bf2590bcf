//! Execution status polling.
//!
//! Provides an `ExecutionStream` trait for receiving execution snapshots
//! (fixed-interval polling or in-memory sequences) and two consumers:
//! `watch_execution`, which forwards every snapshot until the stop policy is
//! met, and `wait_for_terminal`, which also enforces a deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use incident_core::types::{AgentExecution, ExecutionStatus};
use incident_core::BoardError;

use crate::remediation::PollStopPolicy;
use crate::service::IncidentApi;

/// A stream of execution snapshots.
#[async_trait]
pub trait ExecutionStream: Send {
    /// Wait for and return the next snapshot.
    ///
    /// Returns `None` when the stream is exhausted.
    async fn next(&mut self) -> Option<Result<AgentExecution, BoardError>>;
}

/// Polling-based `ExecutionStream` backed by an `IncidentApi`.
///
/// The first call fetches immediately; later calls wait `poll_interval`.
pub struct PollingExecutionStream {
    api: Arc<dyn IncidentApi>,
    execution_id: String,
    poll_interval: Duration,
    first: bool,
}

impl PollingExecutionStream {
    pub fn new(api: Arc<dyn IncidentApi>, execution_id: String, poll_interval: Duration) -> Self {
        Self {
            api,
            execution_id,
            poll_interval,
            first: true,
        }
    }

    /// Start with a delay instead of an immediate fetch.
    pub fn delayed(mut self) -> Self {
        self.first = false;
        self
    }
}

#[async_trait]
impl ExecutionStream for PollingExecutionStream {
    async fn next(&mut self) -> Option<Result<AgentExecution, BoardError>> {
        if self.first {
            self.first = false;
        } else {
            tokio::time::sleep(self.poll_interval).await;
        }
        Some(self.api.get_execution(&self.execution_id).await)
    }
}

/// In-memory execution stream for testing.
pub struct MockExecutionStream {
    snapshots: Vec<(Duration, Result<AgentExecution, BoardError>)>,
    index: usize,
}

impl MockExecutionStream {
    /// Create a stream that yields snapshots immediately.
    pub fn from_snapshots(snapshots: Vec<Result<AgentExecution, BoardError>>) -> Self {
        Self {
            snapshots: snapshots.into_iter().map(|s| (Duration::ZERO, s)).collect(),
            index: 0,
        }
    }

    /// Create a stream with explicit delays before each snapshot.
    pub fn with_delays(snapshots: Vec<(Duration, Result<AgentExecution, BoardError>)>) -> Self {
        Self {
            snapshots,
            index: 0,
        }
    }

    /// Number of snapshots handed out so far.
    pub fn consumed(&self) -> usize {
        self.index
    }
}

#[async_trait]
impl ExecutionStream for MockExecutionStream {
    async fn next(&mut self) -> Option<Result<AgentExecution, BoardError>> {
        let (delay, result) = self.snapshots.get(self.index)?;
        if !delay.is_zero() {
            tokio::time::sleep(*delay).await;
        }
        let out = result.clone();
        self.index += 1;
        Some(out)
    }
}

/// Why `watch_execution` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEnd {
    /// The stop policy matched this snapshot.
    Stopped(AgentExecution),
    Cancelled,
    /// The stream ran dry.
    Exhausted,
}

/// Forward every snapshot to `on_update` until the policy says stop.
///
/// Fetch errors are logged and polling continues; only cancellation, the
/// stop policy, or stream exhaustion end the watch.
pub async fn watch_execution(
    stream: &mut dyn ExecutionStream,
    policy: PollStopPolicy,
    cancel: CancellationToken,
    mut on_update: impl FnMut(&AgentExecution) + Send,
) -> WatchEnd {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return WatchEnd::Cancelled,
            next = stream.next() => match next {
                Some(Ok(execution)) => {
                    on_update(&execution);
                    if policy.should_stop(execution.status) {
                        return WatchEnd::Stopped(execution);
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "execution poll failed");
                }
                None => return WatchEnd::Exhausted,
            }
        }
    }
}

/// Wait for an execution to reach a terminal status.
///
/// Consumes snapshots from `stream` until:
/// - a terminal status is observed → returns the snapshot.
/// - the `timeout` expires → returns `WaitTimeout`.
/// - the `cancel` token is triggered → returns `WaitCancelled`.
/// - a fetch fails → returns that error.
/// - the stream ends → returns `NotFound`.
pub async fn wait_for_terminal(
    execution_id: &str,
    timeout: Duration,
    cancel: CancellationToken,
    stream: &mut dyn ExecutionStream,
) -> Result<AgentExecution, BoardError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_observed: Option<ExecutionStatus> = None;
    let last = |s: Option<ExecutionStatus>| s.map_or_else(|| "unknown".to_string(), |s| s.to_string());

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(BoardError::WaitCancelled {
                    execution_id: execution_id.to_string(),
                    last_observed_state: last(last_observed),
                });
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(BoardError::WaitTimeout {
                    execution_id: execution_id.to_string(),
                    last_observed_state: last(last_observed),
                });
            }
            next = stream.next() => {
                match next {
                    Some(Ok(execution)) => {
                        last_observed = Some(execution.status);
                        if execution.is_terminal() {
                            return Ok(execution);
                        }
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Err(BoardError::execution_not_found(execution_id)),
                }
            }
        }
    }
}
