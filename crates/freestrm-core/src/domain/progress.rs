//! Progress records published while a run executes

use serde::{Deserialize, Serialize};

/// One record on a run's progress stream
///
/// Serialized with camelCase keys and absent fields omitted, e.g.
/// `{"filePath":"tv/ep1.srt","percent":40,"overallPercent":"20.00"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_percent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
}

impl ProgressEvent {
    pub fn file(path: impl Into<String>, percent: u8, overall: f64) -> Self {
        Self {
            file_path: Some(path.into()),
            percent: Some(percent.min(100)),
            overall_percent: Some(format_percent(overall)),
            ..Default::default()
        }
    }

    pub fn file_error(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_path: Some(path.into()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn completed(overall: f64) -> Self {
        Self {
            done: Some(true),
            overall_percent: Some(format_percent(overall)),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            done: Some(true),
            cancelled: Some(true),
            message: Some("task cancelled".to_string()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Whether this record ends the stream.
    ///
    /// Per-file errors carry a `file_path` and do not end the run.
    pub fn is_terminal(&self) -> bool {
        self.done == Some(true) || (self.error.is_some() && self.file_path.is_none())
    }

    pub fn is_cancellation(&self) -> bool {
        self.cancelled == Some(true)
    }

    /// Record that reaches history: completed files and terminal records.
    pub fn is_milestone(&self) -> bool {
        self.percent == Some(100) || self.is_terminal() || self.error.is_some()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Format a percentage with two decimals, clamped to 0..=100.
pub fn format_percent(value: f64) -> String {
    let clamped = if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    };
    format!("{clamped:.2}")
}
