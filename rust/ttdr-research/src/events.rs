//! Progress event model for the research pipeline.
//!
//! The pipeline produces a closed set of typed events ([`PipelineEvent`]) and
//! converts them into the wire-shape [`ProgressUpdate`] at the sink boundary.
//! Accumulated narrative steps are joined with [`STEP_SEPARATOR`] so a client
//! can re-split them for display.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Separator between accumulated intermediate steps on the wire.
pub const STEP_SEPARATOR: &str = "|||---|||";

/// A typed event produced by the pipeline.
///
/// Each variant carries the human-readable description appended to the
/// intermediate log; `Iteration` additionally carries the citation URLs
/// discovered in that round, and `Final` the complete report.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// Planning-phase narrative.
    Plan {
        /// Step description.
        description: String,
    },
    /// Initial-draft-phase narrative.
    Draft {
        /// Step description.
        description: String,
    },
    /// Iterative search/synthesis/revision narrative.
    Iteration {
        /// Step description.
        description: String,
        /// Citation URLs gathered in this step, if any.
        citations: Option<Vec<String>>,
    },
    /// Structured-report-phase narrative.
    Section {
        /// Step description.
        description: String,
    },
    /// Terminal event carrying the finished report.
    Final {
        /// The assembled report.
        report: String,
        /// All citation URLs accumulated across the run.
        citations: Vec<String>,
    },
    /// Terminal event carrying a fatal error.
    Error {
        /// Error message.
        message: String,
    },
}

impl PipelineEvent {
    /// The narrative description attached to this event, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Plan { description }
            | Self::Draft { description }
            | Self::Section { description }
            | Self::Iteration { description, .. } => Some(description),
            Self::Final { .. } | Self::Error { .. } => None,
        }
    }
}

/// Wire-shape progress update delivered to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// All intermediate log entries joined by [`STEP_SEPARATOR`].
    pub intermediate_steps: Option<String>,
    /// The final report; only set on the terminal event.
    pub final_report: Option<String>,
    /// Whether this is an intermediate (non-terminal) update.
    pub is_intermediate: bool,
    /// Citation URLs, order-preserving.
    pub citations: Option<Vec<String>>,
    /// Terminal marker; nothing is emitted after a complete update.
    pub complete: bool,
    /// Error message; only set on fatal terminal events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressUpdate {
    /// A fatal terminal update.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            intermediate_steps: None,
            final_report: None,
            is_intermediate: false,
            citations: None,
            complete: true,
            error: Some(message.into()),
        }
    }
}

/// Sink for progress updates.
///
/// `send` must not block: the pipeline calls it inline between provider
/// calls, and the transport drains updates on its own task.
pub trait UpdateSink: Send + Sync {
    /// Deliver one update. Implementations must preserve call order.
    fn send(&self, update: ProgressUpdate);
}

/// Log-only sink used by the static entry point and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl UpdateSink for LogSink {
    fn send(&self, update: ProgressUpdate) {
        debug!(
            complete = update.complete,
            is_intermediate = update.is_intermediate,
            "pipeline update"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_field_names() {
        let update = ProgressUpdate {
            intermediate_steps: Some("a|||---|||b".to_string()),
            final_report: None,
            is_intermediate: true,
            citations: Some(vec!["https://example.com".to_string()]),
            complete: false,
            error: None,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["intermediate_steps"], "a|||---|||b");
        assert_eq!(value["final_report"], serde_json::Value::Null);
        assert_eq!(value["is_intermediate"], true);
        assert_eq!(value["citations"][0], "https://example.com");
        assert_eq!(value["complete"], false);
        // The error key is absent on non-fatal updates.
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_fatal_update_shape() {
        let value = serde_json::to_value(ProgressUpdate::fatal("boom")).unwrap();
        assert_eq!(value["complete"], true);
        assert_eq!(value["error"], "boom");
        assert_eq!(value["is_intermediate"], false);
    }

    #[test]
    fn test_event_descriptions() {
        let event = PipelineEvent::Iteration {
            description: "step".to_string(),
            citations: None,
        };
        assert_eq!(event.description(), Some("step"));
        let done = PipelineEvent::Final {
            report: "r".to_string(),
            citations: Vec::new(),
        };
        assert_eq!(done.description(), None);
    }
}
