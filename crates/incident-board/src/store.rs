//! Canonical in-memory board: three fixed columns of ordered incidents.
//!
//! Every incident id lives in exactly one column. `apply_incident` is the
//! idempotent upsert the reconciliation engine routes all authoritative
//! updates through; the crate-private splice helpers exist only for
//! optimistic drag moves and their rollback.

use incident_core::types::{Column, Incident};
use incident_core::BoardError;

/// Where `apply_incident` put the incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Not seen before; appended to the tail of the target column.
    Inserted { column: Column, index: usize },
    /// Already in the target column; replaced at its existing index.
    Replaced { column: Column, index: usize },
    /// Was in another column; removed there and appended to the target tail.
    Moved {
        from: Column,
        to: Column,
        index: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardStore {
    columns: [Vec<Incident>; 3],
}

impl BoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from a list response. Resolved incidents are skipped;
    /// duplicates collapse through `apply_incident`.
    pub fn from_incidents(incidents: impl IntoIterator<Item = Incident>) -> Self {
        let mut store = Self::new();
        for incident in incidents {
            if let Some(column) = incident.column() {
                store.apply_incident(incident, column);
            }
        }
        store
    }

    pub fn column(&self, column: Column) -> &[Incident] {
        &self.columns[column.index()]
    }

    pub fn columns(&self) -> impl Iterator<Item = (Column, &[Incident])> + '_ {
        Column::ALL
            .into_iter()
            .map(move |column| (column, self.column(column)))
    }

    /// Ids of a column in display order.
    pub fn ids(&self, column: Column) -> Vec<&str> {
        self.column(column).iter().map(|i| i.id.as_str()).collect()
    }

    /// Find the column and index holding `id` (linear scan).
    pub fn locate(&self, id: &str) -> Option<(Column, usize)> {
        Column::ALL.into_iter().find_map(|column| {
            self.column(column)
                .iter()
                .position(|incident| incident.id == id)
                .map(|index| (column, index))
        })
    }

    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.locate(id)
            .map(|(column, index)| &self.columns[column.index()][index])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.locate(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every id appears at most once across all columns.
    pub fn ids_are_unique(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.columns
            .iter()
            .flatten()
            .all(|incident| seen.insert(incident.id.as_str()))
    }

    /// Idempotent upsert of `incident` into `target`.
    ///
    /// Same column: replace in place so the row keeps its position. Other
    /// column: remove there, append to the target tail. Unknown: append.
    /// Analysis flags and history never regress across a replacement.
    pub fn apply_incident(&mut self, mut incident: Incident, target: Column) -> ApplyOutcome {
        match self.locate(&incident.id) {
            Some((column, index)) if column == target => {
                let slot = &mut self.columns[column.index()][index];
                incident.absorb_monotonic(slot);
                *slot = incident;
                ApplyOutcome::Replaced { column, index }
            }
            Some((from, index)) => {
                let previous = self.columns[from.index()].remove(index);
                incident.absorb_monotonic(&previous);
                let list = &mut self.columns[target.index()];
                list.push(incident);
                ApplyOutcome::Moved {
                    from,
                    to: target,
                    index: list.len() - 1,
                }
            }
            None => {
                let list = &mut self.columns[target.index()];
                list.push(incident);
                ApplyOutcome::Inserted {
                    column: target,
                    index: list.len() - 1,
                }
            }
        }
    }

    /// Remove `id` from whichever column holds it.
    pub fn remove(&mut self, id: &str) -> Option<(Column, usize, Incident)> {
        let (column, index) = self.locate(id)?;
        let incident = self.columns[column.index()].remove(index);
        Some((column, index, incident))
    }

    /// Insert at `index`, clamped to the column length. Returns the index used.
    pub(crate) fn insert_at(&mut self, column: Column, index: usize, incident: Incident) -> usize {
        let list = &mut self.columns[column.index()];
        let index = index.min(list.len());
        list.insert(index, incident);
        index
    }

    /// Remove the entry at `index` of `column`.
    pub(crate) fn take_at(&mut self, column: Column, index: usize) -> Option<Incident> {
        let list = &mut self.columns[column.index()];
        (index < list.len()).then(|| list.remove(index))
    }

    /// Splice-reorder within one column.
    pub(crate) fn reorder(
        &mut self,
        column: Column,
        from_index: usize,
        to_index: usize,
    ) -> Result<(), BoardError> {
        let list = &mut self.columns[column.index()];
        if from_index >= list.len() {
            return Err(BoardError::InvalidState {
                id: column.to_string(),
                current_state: format!("len={}", list.len()),
                operation: format!("reorder_from_{from_index}"),
            });
        }
        let incident = list.remove(from_index);
        let to_index = to_index.min(list.len());
        list.insert(to_index, incident);
        Ok(())
    }
}
