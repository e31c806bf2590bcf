//! incident-board: reconciliation core of the incident board.
//!
//! Provides the board state and the workflows that mutate it:
//! - `ReconciliationEngine` / `BoardStore`: idempotent upserts of incident snapshots
//! - `drag`: optimistic cross-column moves with fenced rollback
//! - `DiagnosisWorkflow`: auto-wait and manual analysis triggers
//! - `remediation` / `lifecycle` / `poll`: the remediation execution state machine
//! - `PushHub`: ordered fan-out of push snapshots keyed by session
//! - `BoardSession`: composes all of the above behind one lock
//!
//! The backend is reached through the transport-agnostic `IncidentApi` trait;
//! `MockIncidentApi` implements it for tests. Each session operation emits a
//! `BoardEvent` via the `BoardEventSink` trait.

pub mod banner;
pub mod diagnosis;
pub mod drag;
pub mod event;
pub mod filter;
pub mod guard;
pub mod lifecycle;
pub mod mock;
pub mod poll;
pub mod push;
pub mod reconcile;
pub mod remediation;
pub mod service;
pub mod session;
pub mod store;
pub mod subscription;

pub use reconcile::ReconciliationEngine;
pub use service::IncidentApi;
pub use session::{BoardSession, SessionConfig};
pub use store::BoardStore;

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "incident-board"
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn crate_label_is_stable() {
        assert_eq!(crate_label(), "incident-board");
    }
}
