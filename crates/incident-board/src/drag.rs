//! Optimistic drag-and-drop moves with deterministic rollback.
//!
//! A same-column drop is a local splice. A cross-column drop is applied
//! immediately, then confirmed or rolled back once the status update call
//! returns. Rollback is fenced by the engine revision captured at
//! `begin_move`: if an authoritative snapshot for the incident arrived in
//! between, the board already reflects the server and the rollback is
//! skipped.

use chrono::{DateTime, Utc};

use incident_core::types::{Column, Incident, IncidentStatus};
use incident_core::BoardError;

use crate::reconcile::ReconciliationEngine;

/// A drop gesture as reported by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragMove {
    pub incident_id: String,
    pub from: Column,
    pub from_index: usize,
    pub to: Column,
    pub to_index: usize,
}

impl DragMove {
    pub fn is_cross_column(&self) -> bool {
        self.from != self.to
    }
}

/// A cross-column move awaiting backend confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub mv: DragMove,
    original: Incident,
    revision: u64,
}

impl PendingMove {
    pub fn incident_id(&self) -> &str {
        &self.mv.incident_id
    }

    /// Status the backend is asked to persist.
    pub fn target_status(&self) -> IncidentStatus {
        self.mv.to.status()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragOutcome {
    /// Same-column splice; nothing to confirm.
    Reordered,
    Pending(PendingMove),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The pre-move placement was restored.
    Restored,
    /// An authoritative update arrived after the move began; left as is.
    Diverged,
}

/// Apply a drop to local state.
///
/// The incident at `from_index` must be `incident_id`; a stale gesture is
/// refused without touching the board.
pub fn begin_move(
    engine: &mut ReconciliationEngine,
    mv: DragMove,
    now: DateTime<Utc>,
) -> Result<DragOutcome, BoardError> {
    let at_source = engine
        .store()
        .column(mv.from)
        .get(mv.from_index)
        .map(|incident| incident.id.as_str());
    if at_source != Some(mv.incident_id.as_str()) {
        return match engine.store().locate(&mv.incident_id) {
            None => Err(BoardError::incident_not_found(&mv.incident_id)),
            Some((column, index)) => Err(BoardError::InvalidState {
                id: mv.incident_id.clone(),
                current_state: format!("{column}[{index}]"),
                operation: format!("move_from_{}[{}]", mv.from, mv.from_index),
            }),
        };
    }

    if !mv.is_cross_column() {
        engine
            .store_mut()
            .reorder(mv.from, mv.from_index, mv.to_index)?;
        return Ok(DragOutcome::Reordered);
    }

    let revision = engine.revision(&mv.incident_id);
    let Some(original) = engine.store_mut().take_at(mv.from, mv.from_index) else {
        return Err(BoardError::incident_not_found(&mv.incident_id));
    };
    let mut moved = original.clone();
    moved.record_status(mv.to.status(), now);
    engine.store_mut().insert_at(mv.to, mv.to_index, moved);

    Ok(DragOutcome::Pending(PendingMove {
        mv,
        original,
        revision,
    }))
}

/// The backend accepted the move. Local state already matches; the push
/// broadcast that follows reconciles as a no-op.
pub fn confirm_move(pending: PendingMove) {
    tracing::debug!(
        incident_id = %pending.mv.incident_id,
        column = %pending.mv.to,
        "optimistic move confirmed"
    );
}

/// The backend refused the move: put the incident back where it was.
pub fn rollback_move(engine: &mut ReconciliationEngine, pending: PendingMove) -> RollbackOutcome {
    let id = pending.mv.incident_id.clone();
    if engine.revision(&id) != pending.revision {
        tracing::warn!(
            incident_id = %id,
            "optimistic move failed after an authoritative update; keeping server state"
        );
        return RollbackOutcome::Diverged;
    }

    let store = engine.store_mut();
    store.remove(&id);
    store.insert_at(pending.mv.from, pending.mv.from_index, pending.original);
    tracing::warn!(
        incident_id = %id,
        column = %pending.mv.from,
        index = pending.mv.from_index,
        "optimistic move rolled back"
    );
    RollbackOutcome::Restored
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::from_incidents([
            Incident::new("a", "m", IncidentStatus::Triage),
            Incident::new("b", "m", IncidentStatus::Triage),
            Incident::new("c", "m", IncidentStatus::Triage),
            Incident::new("d", "m", IncidentStatus::Fixing),
            Incident::new("e", "m", IncidentStatus::Fixing),
        ])
    }

    fn cross(id: &str, from_index: usize, to_index: usize) -> DragMove {
        DragMove {
            incident_id: id.into(),
            from: Column::Triage,
            from_index,
            to: Column::Fixing,
            to_index,
        }
    }

    fn pending(outcome: Result<DragOutcome, BoardError>) -> PendingMove {
        match outcome {
            Ok(DragOutcome::Pending(p)) => p,
            other => panic!("expected pending move, got {other:?}"),
        }
    }

    #[test]
    fn same_column_move_is_local_reorder() {
        let mut engine = engine();
        let outcome = begin_move(
            &mut engine,
            DragMove {
                incident_id: "c".into(),
                from: Column::Triage,
                from_index: 2,
                to: Column::Triage,
                to_index: 0,
            },
            Utc::now(),
        );
        assert_eq!(outcome, Ok(DragOutcome::Reordered));
        assert_eq!(engine.store().ids(Column::Triage), vec!["c", "a", "b"]);
        assert_eq!(engine.revision("c"), 1);
    }

    #[test]
    fn cross_column_move_applies_destination_status() {
        let mut engine = engine();
        let p = pending(begin_move(&mut engine, cross("b", 1, 1), Utc::now()));

        assert_eq!(p.target_status(), IncidentStatus::Fixing);
        assert_eq!(engine.store().ids(Column::Triage), vec!["a", "c"]);
        assert_eq!(engine.store().ids(Column::Fixing), vec!["d", "b", "e"]);
        let moved = engine.store().get("b").unwrap_or_else(|| panic!("missing b"));
        assert_eq!(moved.status, IncidentStatus::Fixing);
        assert_eq!(moved.status_history.len(), 1);
    }

    #[test]
    fn rollback_restores_exact_board() {
        let mut engine = engine();
        let before = engine.store().clone();
        let p = pending(begin_move(&mut engine, cross("b", 1, 0), Utc::now()));

        assert_eq!(rollback_move(&mut engine, p), RollbackOutcome::Restored);
        assert_eq!(engine.store(), &before);
    }

    #[test]
    fn rollback_matches_by_id_after_destination_changed() {
        let mut engine = engine();
        let before_triage: Vec<String> = engine
            .store()
            .ids(Column::Triage)
            .into_iter()
            .map(str::to_string)
            .collect();
        let p = pending(begin_move(&mut engine, cross("a", 0, 0), Utc::now()));

        // Local reorder in the destination shifts indexes under the pending move.
        engine
            .store_mut()
            .reorder(Column::Fixing, 0, 2)
            .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(rollback_move(&mut engine, p), RollbackOutcome::Restored);
        assert_eq!(engine.store().ids(Column::Triage), before_triage);
        assert!(!engine.store().ids(Column::Fixing).contains(&"a"));
    }

    #[test]
    fn rollback_skipped_after_authoritative_update() {
        let mut engine = engine();
        let p = pending(begin_move(&mut engine, cross("a", 0, 0), Utc::now()));

        engine.reconcile(Incident::new("a", "m", IncidentStatus::Investigating));

        assert_eq!(rollback_move(&mut engine, p), RollbackOutcome::Diverged);
        assert_eq!(engine.store().ids(Column::Investigating), vec!["a"]);
        assert!(engine.store().ids_are_unique());
    }

    #[test]
    fn stale_gesture_is_refused() {
        let mut engine = engine();
        let before = engine.store().clone();
        let err = begin_move(&mut engine, cross("a", 2, 0), Utc::now()).unwrap_err();
        assert!(matches!(err, BoardError::InvalidState { .. }));
        let err = begin_move(&mut engine, cross("zz", 0, 0), Utc::now()).unwrap_err();
        assert!(matches!(err, BoardError::NotFound { .. }));
        assert_eq!(engine.store(), &before);
    }
}
