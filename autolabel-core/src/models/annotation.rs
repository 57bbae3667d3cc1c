use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::null_as_default;

/// Error text carried by results whose model reply could not be parsed.
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse VLM response";

/// One manipulation action, in seconds relative to the start of the video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionSegment {
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub start_time: f64,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub end_time: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description_en: String,
}

/// Model reply in structured form. `error` marks a degraded result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub actions: Vec<ActionSegment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub task_summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub task_summary_en: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl AnnotationResult {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Count ordering problems in the returned segments.
    pub fn segment_issues(&self) -> SegmentIssues {
        let mut issues = SegmentIssues::default();
        for (i, action) in self.actions.iter().enumerate() {
            if action.end_time < action.start_time {
                issues.inverted += 1;
            }
            if i == 0 {
                continue;
            }
            let prev = &self.actions[i - 1];
            if action.start_time < prev.start_time {
                issues.out_of_order += 1;
            } else if action.start_time < prev.end_time {
                issues.overlapping += 1;
            }
        }
        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentIssues {
    /// Segments whose end precedes their start.
    pub inverted: usize,
    /// Segments starting before their predecessor.
    pub out_of_order: usize,
    /// Segments starting before their predecessor ends.
    pub overlapping: usize,
}

impl SegmentIssues {
    pub fn is_clean(&self) -> bool {
        self.inverted == 0 && self.out_of_order == 0 && self.overlapping == 0
    }
}

/// Why an annotation call produced no usable result.
#[derive(Debug, Clone, PartialEq)]
pub enum DegradeReason {
    NoFrames,
    Transport { attempts: usize, last_error: String },
    Unparseable,
    /// The reply parsed but carried its own `error` field.
    Reported(String),
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::NoFrames => write!(f, "No frames to annotate"),
            DegradeReason::Transport { last_error, .. } => write!(f, "{}", last_error),
            DegradeReason::Unparseable => write!(f, "{}", PARSE_FAILURE_MESSAGE),
            DegradeReason::Reported(message) => write!(f, "{}", message),
        }
    }
}

/// Result of one annotation call. Callers have to match the degraded arm.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationOutcome {
    Annotated(AnnotationResult),
    Degraded {
        reason: DegradeReason,
        partial: AnnotationResult,
    },
}

impl AnnotationOutcome {
    /// Build a degraded outcome with empty actions and the reason recorded in `error`.
    pub fn degraded(reason: DegradeReason, raw_response: Option<String>) -> Self {
        let partial = AnnotationResult {
            error: Some(reason.to_string()),
            raw_response,
            ..AnnotationResult::default()
        };
        AnnotationOutcome::Degraded { reason, partial }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AnnotationOutcome::Degraded { .. })
    }

    pub fn result(&self) -> &AnnotationResult {
        match self {
            AnnotationOutcome::Annotated(result) => result,
            AnnotationOutcome::Degraded { partial, .. } => partial,
        }
    }

    pub fn into_result(self) -> AnnotationResult {
        match self {
            AnnotationOutcome::Annotated(result) => result,
            AnnotationOutcome::Degraded { partial, .. } => partial,
        }
    }
}

/// Accept numbers, numeric strings (optionally suffixed with `s`) and null.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::Null => Ok(0.0),
        serde_json::Value::String(s) => {
            let trimmed = s.trim().trim_end_matches('s').trim();
            trimmed
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("invalid seconds value: {:?}", s)))
        }
        other => Err(D::Error::custom(format!(
            "expected seconds, found {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64) -> ActionSegment {
        ActionSegment {
            start_time: start,
            end_time: end,
            ..ActionSegment::default()
        }
    }

    #[test]
    fn test_missing_and_null_fields_default() {
        let result: AnnotationResult = serde_json::from_str(
            r#"{"actions":[{"start_time":1,"end_time":"2.5s","description":null}],"task_summary":null}"#,
        )
        .unwrap();

        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].end_time, 2.5);
        assert_eq!(result.actions[0].description, "");
        assert_eq!(result.actions[0].description_en, "");
        assert_eq!(result.task_summary, "");
        assert!(!result.is_degraded());
    }

    #[test]
    fn test_garbage_seconds_is_rejected() {
        let parsed = serde_json::from_str::<AnnotationResult>(
            r#"{"actions":[{"start_time":"soon","end_time":1}]}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_degraded_outcome_carries_error_and_raw_text() {
        let outcome =
            AnnotationOutcome::degraded(DegradeReason::Unparseable, Some("not json".to_string()));
        assert!(outcome.is_degraded());

        let result = outcome.into_result();
        assert!(result.actions.is_empty());
        assert_eq!(result.error.as_deref(), Some(PARSE_FAILURE_MESSAGE));
        assert_eq!(result.raw_response.as_deref(), Some("not json"));
    }

    #[test]
    fn test_segment_issues_are_counted_not_fatal() {
        let clean = AnnotationResult {
            actions: vec![segment(0.0, 5.0), segment(5.0, 9.0)],
            ..AnnotationResult::default()
        };
        assert!(clean.segment_issues().is_clean());

        let messy = AnnotationResult {
            actions: vec![segment(0.0, 5.0), segment(4.0, 3.0), segment(1.0, 2.0)],
            ..AnnotationResult::default()
        };
        let issues = messy.segment_issues();
        assert_eq!(issues.inverted, 1);
        assert_eq!(issues.overlapping, 1);
        assert_eq!(issues.out_of_order, 1);
    }

    #[test]
    fn test_degraded_fields_omitted_when_absent() {
        let json = serde_json::to_value(AnnotationResult::default()).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("raw_response").is_none());
        assert_eq!(json["actions"], serde_json::json!([]));
    }
}
