//! Boundary payload normalization.
//!
//! The backend is loose about shapes: incidents arrive bare or wrapped in an
//! `{incident, analysis}` envelope, executions sometimes sit under
//! `execution` or `data`, commands are strings or objects. Every payload goes
//! through exactly one function here and comes out in its canonical type.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::BoardError;
use crate::types::{
    AgentExecution, AnalysisKind, AnalysisResponse, ExecutionStatus, Incident, VerificationCheck,
};

const ENVELOPE_KEYS: &[&str] = &["execution", "data"];

/// Parse an incident from a push message or REST body.
pub fn incident_from_value(value: Value) -> Result<Incident, BoardError> {
    let value = match value {
        Value::Object(mut map) if map.get("incident").is_some_and(Value::is_object) => {
            map.remove("incident").unwrap_or(Value::Null)
        }
        other => other,
    };
    let value = match value {
        Value::Object(mut map) => {
            if let Some(id) = id_field(&map, "id") {
                map.insert("id".into(), Value::String(id));
            }
            Value::Object(map)
        }
        other => other,
    };
    let mut incident: Incident = serde_json::from_value(value)
        .map_err(|err| BoardError::invalid_response(format!("incident: {err}")))?;
    if incident.id.trim().is_empty() {
        return Err(BoardError::invalid_response("incident: empty id"));
    }
    normalize_flags(&mut incident);
    Ok(incident)
}

/// Parse a raw push-channel text frame.
pub fn incident_from_str(raw: &str) -> Result<Incident, BoardError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| BoardError::invalid_response(format!("push message: {err}")))?;
    incident_from_value(value)
}

/// Parse an incident list (bare array or `{incidents: [...]}`).
pub fn incidents_from_value(value: Value) -> Result<Vec<Incident>, BoardError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("incidents") {
            Some(Value::Array(items)) => items,
            _ => return Err(BoardError::invalid_response("incident list: missing array")),
        },
        _ => return Err(BoardError::invalid_response("incident list: not an array")),
    };
    items.into_iter().map(incident_from_value).collect()
}

/// Parse a diagnose / suggest-fix response.
///
/// The free text is taken from the first present of the kind-specific field,
/// `analysis`, `text` or `message`, at the top level or inside an `analysis`
/// object. An error body (`{error}`) is returned as text so the caller's
/// classification sees it.
pub fn analysis_from_value(kind: AnalysisKind, value: Value) -> Result<AnalysisResponse, BoardError> {
    match value {
        Value::String(text) => Ok(AnalysisResponse {
            text,
            incident: None,
        }),
        Value::Object(map) => {
            let incident = match map.get("incident") {
                Some(inner @ Value::Object(_)) => Some(incident_from_value(inner.clone())?),
                _ => None,
            };
            let text = analysis_text(kind, &map)
                .or_else(|| match map.get("analysis") {
                    Some(Value::Object(inner)) => analysis_text(kind, inner),
                    _ => None,
                })
                .or_else(|| {
                    incident.as_ref().and_then(|inc| match kind {
                        AnalysisKind::Diagnosis => inc.diagnosis.clone(),
                        AnalysisKind::Solution => inc.solution.clone(),
                    })
                })
                .or_else(|| string_field(&map, &["error", "detail"]))
                .ok_or_else(|| BoardError::invalid_response(format!("{kind}: no text field")))?;
            Ok(AnalysisResponse { text, incident })
        }
        _ => Err(BoardError::invalid_response(format!(
            "{kind}: unexpected payload"
        ))),
    }
}

fn analysis_text(kind: AnalysisKind, map: &Map<String, Value>) -> Option<String> {
    string_field(map, &[kind.as_str(), "analysis", "text", "message"])
}

/// Parse a single execution payload.
pub fn execution_from_value(value: Value) -> Result<AgentExecution, BoardError> {
    let map = unwrap_envelope(value)?;

    let id = id_field(&map, "id")
        .ok_or_else(|| BoardError::invalid_response("execution: missing id"))?;
    let raw_status = string_field(&map, &["status"])
        .ok_or_else(|| BoardError::invalid_response(format!("execution {id}: missing status")))?;
    let status = ExecutionStatus::from_str(&raw_status).ok_or_else(|| {
        BoardError::invalid_response(format!("execution {id}: unknown status {raw_status:?}"))
    })?;

    let mut exec = AgentExecution::new(
        id,
        id_field(&map, "incident_id").unwrap_or_default(),
        status,
    );
    exec.analysis = string_field(&map, &["analysis"]);
    exec.recommended_action = string_field(&map, &["recommended_action"]);
    exec.reasoning = string_field(&map, &["reasoning"]);
    exec.commands = text_list(&map, "commands", &["command", "cmd"]);
    exec.risks = text_list(&map, "risks", &["description", "risk"]);
    exec.execution_logs = text_list(&map, "execution_logs", &["output", "message", "log"]);
    exec.verification_checks = verification_checks(&map);
    exec.verification_passed = map.get("verification_passed").and_then(Value::as_bool);
    exec.success = map.get("success").and_then(Value::as_bool);
    exec.error_message = string_field(&map, &["error_message"]);
    exec.created_at = timestamp_field(&map, "created_at");
    exec.updated_at = timestamp_field(&map, "updated_at");
    exec.completed_at = timestamp_field(&map, "completed_at");
    Ok(exec)
}

/// Parse an execution list (bare array or `{executions: [...]}` / `{data: [...]}`).
pub fn executions_from_value(value: Value) -> Result<Vec<AgentExecution>, BoardError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            match ["executions", "data"]
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                }) {
                Some(items) => items,
                None => return Err(BoardError::invalid_response("execution list: missing array")),
            }
        }
        _ => return Err(BoardError::invalid_response("execution list: not an array")),
    };
    items.into_iter().map(execution_from_value).collect()
}

fn normalize_flags(incident: &mut Incident) {
    incident.diagnosis = incident.diagnosis.take().filter(|t| !t.trim().is_empty());
    incident.solution = incident.solution.take().filter(|t| !t.trim().is_empty());
    if incident.diagnosis.is_some() {
        incident.has_diagnosis = true;
    }
    if incident.solution.is_some() {
        incident.has_solution = true;
    }
}

fn unwrap_envelope(value: Value) -> Result<Map<String, Value>, BoardError> {
    let mut map = match value {
        Value::Object(map) => map,
        _ => return Err(BoardError::invalid_response("execution: not an object")),
    };
    loop {
        let key = ENVELOPE_KEYS
            .iter()
            .find(|key| map.get(**key).is_some_and(Value::is_object));
        match key {
            Some(key) => match map.remove(*key) {
                Some(Value::Object(inner)) => map = inner,
                _ => return Err(BoardError::invalid_response("execution: bad envelope")),
            },
            None => return Ok(map),
        }
    }
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    })
}

fn id_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_field(map: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = map.get(key)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn text_list(map: &Map<String, Value>, key: &str, object_keys: &[&str]) -> Vec<String> {
    let Some(Value::Array(items)) = map.get(key) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => string_field(obj, object_keys).or_else(|| Some(item.to_string())),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .collect()
}

fn verification_checks(map: &Map<String, Value>) -> Vec<VerificationCheck> {
    let Some(Value::Array(items)) = map.get("verification_checks") else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(VerificationCheck {
                description: s.clone(),
                passed: None,
            }),
            Value::Object(obj) => Some(VerificationCheck {
                description: string_field(obj, &["description", "name", "check"])
                    .unwrap_or_else(|| item.to_string()),
                passed: obj
                    .get("passed")
                    .or_else(|| obj.get("success"))
                    .and_then(Value::as_bool),
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::IncidentStatus;

    #[test]
    fn incident_accepts_bare_and_enveloped_shapes() {
        let bare = json!({"id": "inc-1", "message": "db down", "status": "triage"});
        let wrapped = json!({
            "incident": {"id": "inc-1", "message": "db down", "status": "triage"},
            "analysis": {"diagnosis": "connection pool exhausted"}
        });
        assert_eq!(
            incident_from_value(bare).unwrap(),
            incident_from_value(wrapped).unwrap()
        );
    }

    #[test]
    fn incident_text_implies_flag() {
        let inc = incident_from_value(json!({
            "id": "inc-2",
            "status": "Investigating",
            "diagnosis": "memory leak in worker",
            "solution": "   "
        }))
        .unwrap();
        assert_eq!(inc.status, IncidentStatus::Investigating);
        assert!(inc.has_diagnosis);
        assert!(!inc.has_solution);
        assert_eq!(inc.solution, None);
    }

    #[test]
    fn incident_rejects_empty_id_and_bad_json() {
        assert!(incident_from_value(json!({"id": "", "status": "triage"})).is_err());
        assert!(incident_from_str("{not json").is_err());
    }

    #[test]
    fn numeric_incident_ids_match_execution_ids() {
        let bare = incident_from_value(json!({"id": 42, "status": "triage"})).unwrap();
        assert_eq!(bare.id, "42");

        let pushed = incident_from_str(r#"{"incident": {"id": 7, "status": "fixing"}}"#).unwrap();
        assert_eq!(pushed.id, "7");

        let list = incidents_from_value(json!([{"id": 1, "status": "triage"}])).unwrap();
        assert_eq!(list[0].id, "1");

        let exec = execution_from_value(json!({"id": 9, "incident_id": 42, "status": "thinking"}))
            .unwrap();
        assert_eq!(exec.incident_id, bare.id);
    }

    #[test]
    fn incident_list_accepts_wrapper() {
        let list = incidents_from_value(json!({"incidents": [
            {"id": "a", "status": "triage"},
            {"id": "b", "status": "fixing"}
        ]}))
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].status, IncidentStatus::Fixing);
    }

    #[test]
    fn analysis_text_found_in_nested_analysis() {
        let resp = analysis_from_value(
            AnalysisKind::Solution,
            json!({"incident": {"id": "inc-1", "status": "triage"},
                   "analysis": {"solution": "restart the ingest worker"}}),
        )
        .unwrap();
        assert_eq!(resp.text, "restart the ingest worker");
        assert_eq!(resp.incident.unwrap().id, "inc-1");
    }

    #[test]
    fn analysis_error_body_surfaces_as_text() {
        let resp = analysis_from_value(
            AnalysisKind::Diagnosis,
            json!({"error": "Failed to reach diagnosis service"}),
        )
        .unwrap();
        assert_eq!(resp.text, "Failed to reach diagnosis service");
    }

    #[test]
    fn execution_unwraps_nested_envelopes() {
        let exec = execution_from_value(json!({
            "data": {"execution": {
                "id": 42,
                "incident_id": "inc-9",
                "status": "awaiting_approval",
                "analysis": "disk at 99%",
                "commands": ["df -h", {"command": "journalctl --vacuum-size=1G", "description": "trim"}],
                "risks": [{"description": "drops old logs"}],
                "verification_checks": ["disk below 80%", {"name": "service healthy", "passed": true}],
                "created_at": "2026-03-01T10:00:00Z"
            }}
        }))
        .unwrap();
        assert_eq!(exec.id, "42");
        assert_eq!(exec.status, ExecutionStatus::AwaitingApproval);
        assert_eq!(
            exec.commands,
            vec!["df -h".to_string(), "journalctl --vacuum-size=1G".to_string()]
        );
        assert_eq!(exec.risks, vec!["drops old logs".to_string()]);
        assert_eq!(exec.verification_checks.len(), 2);
        assert_eq!(exec.verification_checks[1].passed, Some(true));
        assert!(exec.created_at.is_some());
    }

    #[test]
    fn execution_rejects_unknown_status() {
        let err = execution_from_value(json!({"id": "ex-1", "status": "paused"})).unwrap_err();
        match err {
            BoardError::InvalidResponse { message } => assert!(message.contains("paused")),
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[test]
    fn execution_list_accepts_wrappers() {
        let list = executions_from_value(json!({"executions": [
            {"id": "ex-2", "status": "thinking"},
            {"id": "ex-1", "status": "cancelled", "error_message": "Rejected by user"}
        ]}))
        .unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[1].was_rejected_by_user());
    }
}
