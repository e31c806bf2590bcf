//! Reconciliation of authoritative incident snapshots into the board.
//!
//! Push events and confirmed API results both land here. Each authoritative
//! apply bumps a per-incident revision so optimistic moves started earlier
//! can tell whether the board diverged underneath them.

use std::collections::HashMap;

use incident_core::types::{Column, Incident};

use crate::store::{ApplyOutcome, BoardStore};

/// Result of reconciling one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Applied(ApplyOutcome),
    /// The snapshot was resolved and the incident left the active board.
    Removed { column: Column, index: usize },
    /// A resolved snapshot for an incident the board never showed.
    IgnoredResolved,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    store: BoardStore,
    /// Kept for every id ever applied, resolved ones included: a drag
    /// pending when its incident resolves must still see the revision move
    /// and skip its rollback. Entries are one counter per incident seen this
    /// session.
    revisions: HashMap<String, u64>,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_incidents(incidents: impl IntoIterator<Item = Incident>) -> Self {
        let mut engine = Self::new();
        for incident in incidents {
            engine.reconcile(incident);
        }
        engine
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    /// Local-only access for optimistic moves; does not bump revisions.
    pub(crate) fn store_mut(&mut self) -> &mut BoardStore {
        &mut self.store
    }

    /// Number of authoritative applies seen for `id`.
    pub fn revision(&self, id: &str) -> u64 {
        self.revisions.get(id).copied().unwrap_or(0)
    }

    /// The single authoritative mutator: idempotent upsert into `target`.
    pub fn apply_incident(&mut self, incident: Incident, target: Column) -> ApplyOutcome {
        self.bump(&incident.id);
        let id = incident.id.clone();
        let outcome = self.store.apply_incident(incident, target);
        tracing::debug!(incident_id = %id, column = %target, ?outcome, "applied incident");
        outcome
    }

    /// Route a snapshot to the column matching its status, or remove it from
    /// the board when resolved.
    pub fn reconcile(&mut self, incident: Incident) -> Reconciled {
        match incident.column() {
            Some(column) => Reconciled::Applied(self.apply_incident(incident, column)),
            None => {
                self.bump(&incident.id);
                match self.store.remove(&incident.id) {
                    Some((column, index, _)) => {
                        tracing::debug!(incident_id = %incident.id, %column, "resolved incident removed");
                        Reconciled::Removed { column, index }
                    }
                    None => Reconciled::IgnoredResolved,
                }
            }
        }
    }

    fn bump(&mut self, id: &str) {
        *self.revisions.entry(id.to_string()).or_insert(0) += 1;
    }
}
