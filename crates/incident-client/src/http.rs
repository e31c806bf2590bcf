//! REST implementation of [`IncidentApi`].
//!
//! Every response body is parsed as JSON and handed to
//! `incident_core::normalize`, so nothing above this module sees wire shapes.
//! Failures map onto the three boundary error categories: unreachable backend
//! (`Transport`), non-2xx status (`Api`, carrying the server's message), and
//! unparseable body (`InvalidResponse`).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use incident_board::IncidentApi;
use incident_core::config::ApiConfig;
use incident_core::normalize;
use incident_core::types::{
    AgentExecution, AnalysisKind, AnalysisResponse, CreateIncident, Incident, IncidentPatch,
};
use incident_core::BoardError;

/// Body fields probed, in order, for a server-supplied error message.
const ERROR_FIELDS: &[&str] = &["error", "detail", "message"];

/// Incident backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIncidentApi {
    base_url: String,
    client: Client,
}

impl HttpIncidentApi {
    pub fn new(config: &ApiConfig) -> Result<Self, BoardError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| BoardError::Config {
                message: format!("http client: {err}"),
            })?;
        Ok(Self::with_client(&config.base_url, client))
    }

    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, BoardError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|err| BoardError::invalid_response(format!("decode body: {err}")))
    }

    async fn get(&self, path: &str) -> Result<Value, BoardError> {
        tracing::debug!(path, "GET");
        self.send(self.client.get(self.url(path))).await
    }

    async fn post(&self, path: &str) -> Result<Value, BoardError> {
        tracing::debug!(path, "POST");
        self.send(self.client.post(self.url(path))).await
    }
}

#[async_trait]
impl IncidentApi for HttpIncidentApi {
    async fn list_incidents(&self) -> Result<Vec<Incident>, BoardError> {
        normalize::incidents_from_value(self.get("/incidents").await?)
    }

    async fn list_resolved(&self) -> Result<Vec<Incident>, BoardError> {
        normalize::incidents_from_value(self.get("/incidents/resolved").await?)
    }

    async fn create_incident(&self, params: CreateIncident) -> Result<Incident, BoardError> {
        let request = self.client.post(self.url("/incidents")).json(&params);
        normalize::incident_from_value(self.send(request).await?)
    }

    async fn patch_incident(
        &self,
        incident_id: &str,
        patch: IncidentPatch,
    ) -> Result<Incident, BoardError> {
        let path = format!("/incidents/{incident_id}");
        tracing::debug!(path = %path, "PATCH");
        let request = self.client.patch(self.url(&path)).json(&patch);
        normalize::incident_from_value(self.send(request).await?)
    }

    async fn request_analysis(
        &self,
        incident_id: &str,
        kind: AnalysisKind,
    ) -> Result<AnalysisResponse, BoardError> {
        let body = self.post(&analysis_path(incident_id, kind)).await?;
        normalize::analysis_from_value(kind, body)
    }

    async fn generate_incident(&self) -> Result<Incident, BoardError> {
        normalize::incident_from_value(self.post("/incidents/generate").await?)
    }

    async fn start_remediation(&self, incident_id: &str) -> Result<AgentExecution, BoardError> {
        let body = self
            .post(&format!("/incidents/{incident_id}/agent/start"))
            .await?;
        normalize::execution_from_value(body)
    }

    async fn list_executions(&self, incident_id: &str) -> Result<Vec<AgentExecution>, BoardError> {
        let body = self
            .get(&format!("/incidents/{incident_id}/agent/executions"))
            .await?;
        normalize::executions_from_value(body)
    }

    async fn get_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError> {
        let body = self.get(&format!("/agent/executions/{execution_id}")).await?;
        normalize::execution_from_value(body)
    }

    async fn approve_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError> {
        let body = self
            .post(&format!("/agent/executions/{execution_id}/approve"))
            .await?;
        normalize::execution_from_value(body)
    }

    async fn reject_execution(&self, execution_id: &str) -> Result<AgentExecution, BoardError> {
        let body = self
            .post(&format!("/agent/executions/{execution_id}/reject"))
            .await?;
        normalize::execution_from_value(body)
    }
}

/// Join a base URL and an absolute path without doubling the slash.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Endpoint for a diagnose or suggest-fix request.
pub fn analysis_path(incident_id: &str, kind: AnalysisKind) -> String {
    match kind {
        AnalysisKind::Diagnosis => format!("/incidents/{incident_id}/diagnose"),
        AnalysisKind::Solution => format!("/incidents/{incident_id}/suggest-fix"),
    }
}

/// Build an `Api` error from a non-2xx response body.
///
/// The server's own message wins; an empty or opaque body falls back to the
/// raw text, then to the bare status.
pub fn api_error(status: u16, body: &str) -> BoardError {
    let message = error_message(body).unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            format!("HTTP {status}")
        } else {
            trimmed.to_string()
        }
    });
    BoardError::Api { status, message }
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let map = value.as_object()?;
    ERROR_FIELDS.iter().find_map(|field| match map.get(*field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

fn transport_error(err: reqwest::Error) -> BoardError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        match err.url() {
            Some(url) => format!("cannot connect to {}", url.origin().ascii_serialization()),
            None => "cannot connect to backend".to_string(),
        }
    } else {
        err.to_string()
    };
    BoardError::Transport { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("http://localhost:8000/", "/incidents"),
            "http://localhost:8000/incidents"
        );
        assert_eq!(
            join_url("http://localhost:8000/api", "incidents/resolved"),
            "http://localhost:8000/api/incidents/resolved"
        );
    }

    #[test]
    fn analysis_paths() {
        assert_eq!(
            analysis_path("inc-2", AnalysisKind::Diagnosis),
            "/incidents/inc-2/diagnose"
        );
        assert_eq!(
            analysis_path("inc-2", AnalysisKind::Solution),
            "/incidents/inc-2/suggest-fix"
        );
    }

    #[test]
    fn api_error_prefers_server_message() {
        assert_eq!(
            api_error(409, r#"{"error":"Agent already running"}"#),
            BoardError::Api {
                status: 409,
                message: "Agent already running".into()
            }
        );
        assert_eq!(
            api_error(422, r#"{"detail":"notes too long"}"#),
            BoardError::Api {
                status: 422,
                message: "notes too long".into()
            }
        );
        assert_eq!(
            api_error(500, r#"{"error":{"message":"boom"}}"#),
            BoardError::Api {
                status: 500,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn api_error_falls_back_to_body_then_status() {
        assert_eq!(
            api_error(502, "Bad Gateway"),
            BoardError::Api {
                status: 502,
                message: "Bad Gateway".into()
            }
        );
        assert_eq!(
            api_error(503, "  "),
            BoardError::Api {
                status: 503,
                message: "HTTP 503".into()
            }
        );
        assert_eq!(
            api_error(400, r#"{"error":""}"#),
            BoardError::Api {
                status: 400,
                message: r#"{"error":""}"#.into()
            }
        );
    }

    #[test]
    fn base_url_is_trimmed() {
        let api = HttpIncidentApi::with_client("http://localhost:8000/", Client::new());
        assert_eq!(api.base_url(), "http://localhost:8000");
    }
}
