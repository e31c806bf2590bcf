//! Auto-wait / manual-fallback logic for AI diagnosis and solution text.
//!
//! A freshly observed incident with no analysis waits a bounded time for the
//! backend to produce one on its own; after that the manual trigger becomes
//! visible. Manual trigger responses are classified textually because the
//! backend reports generation failures as ordinary response text.

use incident_core::types::{AnalysisKind, AnalysisResponse, Incident};
use incident_core::BoardError;

/// Response prefixes that mark a generation failure.
pub const ERROR_PREFIXES: &[&str] = &["Failed to", "Error:", "Cannot"];

/// Substrings that mark a generation failure anywhere in the text.
pub const ERROR_MARKERS: &[&str] = &[
    "Unable to generate",
    "AI service returned",
    "OpenAI API error",
    "Anthropic API error",
    "Gemini API error",
    "Network error",
    "invalid response",
];

/// Classification of analysis text returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisVerdict {
    /// Usable analysis; store it and raise the flag.
    Valid,
    /// Looks like a failure report; surface it, never store it.
    ErrorShaped,
    /// Neither error-shaped nor long enough to trust.
    Unusable,
}

/// Classify analysis text. Error shape wins over length.
pub fn classify_analysis(text: &str, min_valid_len: usize) -> AnalysisVerdict {
    let error_shaped = ERROR_PREFIXES.iter().any(|p| text.starts_with(p))
        || ERROR_MARKERS.iter().any(|m| text.contains(m));
    if error_shaped {
        AnalysisVerdict::ErrorShaped
    } else if text.chars().count() > min_valid_len {
        AnalysisVerdict::Valid
    } else {
        AnalysisVerdict::Unusable
    }
}

/// Generic copy shown when a response is neither valid nor error-shaped.
pub fn generic_failure_message(kind: AnalysisKind) -> String {
    format!("Failed to generate {kind}. Please try again.")
}

/// What a finished manual trigger produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Valid text to be written into the incident.
    Stored {
        kind: AnalysisKind,
        text: String,
        incident: Option<Incident>,
    },
    /// Nothing stored; `message` goes to the error banner.
    Rejected { kind: AnalysisKind, message: String },
}

/// Turn a manual trigger result into what should happen to the incident.
pub fn classify_trigger(
    kind: AnalysisKind,
    result: Result<AnalysisResponse, BoardError>,
    min_valid_len: usize,
) -> TriggerOutcome {
    match result {
        Ok(response) => match classify_analysis(&response.text, min_valid_len) {
            AnalysisVerdict::Valid => TriggerOutcome::Stored {
                kind,
                text: response.text,
                incident: response.incident,
            },
            AnalysisVerdict::ErrorShaped => TriggerOutcome::Rejected {
                kind,
                message: response.text,
            },
            AnalysisVerdict::Unusable => TriggerOutcome::Rejected {
                kind,
                message: generic_failure_message(kind),
            },
        },
        Err(err) => TriggerOutcome::Rejected {
            kind,
            message: err.banner_message(),
        },
    }
}

/// Per-incident wait/fallback state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisWorkflow {
    incident_id: String,
    waiting_for_auto: bool,
    last_error: Option<String>,
}

impl DiagnosisWorkflow {
    /// Waits for an automatic analysis iff the incident has neither.
    pub fn new(incident: &Incident) -> Self {
        Self {
            incident_id: incident.id.clone(),
            waiting_for_auto: !incident.has_analysis(),
            last_error: None,
        }
    }

    pub fn incident_id(&self) -> &str {
        &self.incident_id
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting_for_auto
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Feed the latest snapshot. Returns true when this ends the wait, so the
    /// caller cancels the timer.
    pub fn observe(&mut self, incident: &Incident) -> bool {
        if self.waiting_for_auto && incident.has_analysis() {
            self.waiting_for_auto = false;
            return true;
        }
        false
    }

    /// The wait timer fired. Returns true when this ends the wait.
    pub fn timer_elapsed(&mut self) -> bool {
        std::mem::replace(&mut self.waiting_for_auto, false)
    }

    /// Manual trigger for `kind` is shown once the wait is over and that
    /// analysis is still missing.
    pub fn trigger_visible(&self, incident: &Incident, kind: AnalysisKind) -> bool {
        !self.waiting_for_auto && !incident.has(kind)
    }

    /// Classify the result of a manual trigger and update the wait state.
    pub fn finish(
        &mut self,
        kind: AnalysisKind,
        result: Result<AnalysisResponse, BoardError>,
        min_valid_len: usize,
    ) -> TriggerOutcome {
        let outcome = classify_trigger(kind, result, min_valid_len);
        match &outcome {
            TriggerOutcome::Stored { .. } => {
                self.waiting_for_auto = false;
                self.last_error = None;
            }
            TriggerOutcome::Rejected { message, .. } => {
                self.last_error = Some(message.clone());
            }
        }
        outcome
    }
}
