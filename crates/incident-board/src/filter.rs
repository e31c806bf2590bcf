//! Filtered projection of the board by severity and team.

use std::collections::BTreeSet;

use incident_core::types::{Column, Incident, Severity};

use crate::store::BoardStore;

/// Severity and team selection. An empty set does not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardFilter {
    pub severities: BTreeSet<Severity>,
    pub teams: BTreeSet<String>,
}

impl BoardFilter {
    pub fn is_empty(&self) -> bool {
        self.severities.is_empty() && self.teams.is_empty()
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severities.insert(severity);
        self
    }

    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.teams.insert(team.into());
        self
    }

    /// Incidents without a severity (or team) never match a non-empty
    /// severity (or team) selection.
    pub fn matches(&self, incident: &Incident) -> bool {
        let severity_ok = self.severities.is_empty()
            || incident
                .severity
                .is_some_and(|s| self.severities.contains(&s));
        let team_ok = self.teams.is_empty()
            || incident
                .team
                .as_ref()
                .is_some_and(|t| self.teams.contains(t));
        severity_ok && team_ok
    }
}

/// Read-only projection; recomputed from the store on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardView {
    columns: [Vec<Incident>; 3],
}

impl BoardView {
    pub fn column(&self, column: Column) -> &[Incident] {
        &self.columns[column.index()]
    }

    pub fn total(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }
}

/// Project `store` through `filter`, preserving canonical order.
pub fn project(store: &BoardStore, filter: &BoardFilter) -> BoardView {
    let mut view = BoardView::default();
    for (column, incidents) in store.columns() {
        view.columns[column.index()] = incidents
            .iter()
            .filter(|incident| filter.matches(incident))
            .cloned()
            .collect();
    }
    view
}

#[cfg(test)]
mod tests {
    use incident_core::types::IncidentStatus;

    use super::*;

    fn incident(id: &str, severity: Option<Severity>, team: Option<&str>) -> Incident {
        let mut inc = Incident::new(id, "m", IncidentStatus::Triage);
        inc.severity = severity;
        inc.team = team.map(str::to_string);
        inc
    }

    fn store() -> BoardStore {
        BoardStore::from_incidents([
            incident("a", Some(Severity::High), Some("payments")),
            incident("b", Some(Severity::Low), Some("search")),
            incident("c", None, None),
            incident("d", Some(Severity::High), Some("search")),
        ])
    }

    #[test]
    fn empty_filter_keeps_everything_in_order() {
        let view = project(&store(), &BoardFilter::default());
        let ids: Vec<&str> = view
            .column(Column::Triage)
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn severity_and_team_sets_intersect() {
        let filter = BoardFilter::default()
            .with_severity(Severity::High)
            .with_team("search");
        let view = project(&store(), &filter);
        assert_eq!(view.total(), 1);
        assert_eq!(view.column(Column::Triage)[0].id, "d");
    }

    #[test]
    fn projection_does_not_touch_store() {
        let store = store();
        let before = store.clone();
        let _ = project(&store, &BoardFilter::default().with_severity(Severity::Low));
        assert_eq!(store, before);
    }

    #[test]
    fn missing_severity_excluded_by_severity_filter() {
        let filter = BoardFilter::default()
            .with_severity(Severity::High)
            .with_severity(Severity::Low);
        let view = project(&store(), &filter);
        assert!(view.column(Column::Triage).iter().all(|i| i.id != "c"));
    }
}
