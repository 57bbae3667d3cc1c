//! Recovering an [`AnnotationResult`] from free-form model output.
//!
//! Stages are tried in a fixed order: the whole text as JSON, then the inside
//! of the first fenced block, then the span from the first `{` to the last
//! `}`. When all three fail the caller gets a degraded result holding the
//! original text.

use regex::Regex;

use crate::models::{AnnotationOutcome, AnnotationResult, DegradeReason};

/// Which stage of the chain produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Direct,
    Fenced,
    BraceScan,
}

pub fn parse_response(text: &str) -> Option<(AnnotationResult, ParseStage)> {
    if let Ok(result) = serde_json::from_str::<AnnotationResult>(text.trim()) {
        return Some((result, ParseStage::Direct));
    }

    if let Ok(re) = Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```") {
        if let Some(inner) = re.captures(text).and_then(|c| c.get(1)) {
            if let Ok(result) = serde_json::from_str::<AnnotationResult>(inner.as_str()) {
                return Some((result, ParseStage::Fenced));
            }
        }
    }

    if let Ok(re) = Regex::new(r"(?s)\{.*\}") {
        if let Some(span) = re.find(text) {
            if let Ok(result) = serde_json::from_str::<AnnotationResult>(span.as_str()) {
                return Some((result, ParseStage::BraceScan));
            }
        }
    }

    None
}

/// Run the chain; never fails. A reply that parses but sets `error` is
/// degraded as well.
pub fn parse_or_degrade(text: &str) -> AnnotationOutcome {
    match parse_response(text) {
        Some((result, stage)) if result.is_degraded() => {
            let message = result.error.unwrap_or_default();
            tracing::warn!(stage = ?stage, error = %message, "VLM reply reported an error");
            AnnotationOutcome::degraded(DegradeReason::Reported(message), Some(text.to_string()))
        }
        Some((result, stage)) => {
            tracing::debug!(stage = ?stage, actions = result.actions.len(), "Parsed VLM response");
            AnnotationOutcome::Annotated(result)
        }
        None => {
            let preview: String = text.chars().take(200).collect();
            tracing::warn!(preview = %preview, "Could not parse VLM response");
            AnnotationOutcome::degraded(DegradeReason::Unparseable, Some(text.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::annotation::PARSE_FAILURE_MESSAGE;

    const BODY: &str = r#"{"actions":[{"start_time":0.0,"end_time":5.0,"description":"右臂抓取杯子","description_en":"Right arm grasps the cup"}],"task_summary":"整理","task_summary_en":"Tidy"}"#;

    #[test]
    fn test_plain_json_uses_direct_stage() {
        let (result, stage) = parse_response(BODY).unwrap();
        assert_eq!(stage, ParseStage::Direct);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.task_summary_en, "Tidy");
    }

    #[test]
    fn test_fenced_json_uses_fenced_stage() {
        let text = format!("Here is the annotation:\n```json\n{}\n```\nDone.", BODY);
        let (result, stage) = parse_response(&text).unwrap();
        assert_eq!(stage, ParseStage::Fenced);
        assert_eq!(result.actions[0].description_en, "Right arm grasps the cup");
    }

    #[test]
    fn test_untagged_fence_is_accepted() {
        let text = format!("```\n{}\n```", BODY);
        let (_, stage) = parse_response(&text).unwrap();
        assert_eq!(stage, ParseStage::Fenced);
    }

    #[test]
    fn test_noise_around_object_uses_brace_scan() {
        let (result, stage) = parse_response("noise {\"actions\":[]} noise").unwrap();
        assert_eq!(stage, ParseStage::BraceScan);
        assert!(result.actions.is_empty());
        assert!(!result.is_degraded());
    }

    #[test]
    fn test_broken_fence_falls_through_to_brace_scan() {
        let text = "```json\nnot json at all\n``` but later {\"actions\":[],\"task_summary\":\"x\"}";
        let (result, stage) = parse_response(text).unwrap();
        assert_eq!(stage, ParseStage::BraceScan);
        assert_eq!(result.task_summary, "x");
    }

    #[test]
    fn test_unparseable_text_degrades_with_raw_text() {
        let outcome = parse_or_degrade("I cannot see any robot here.");
        assert!(outcome.is_degraded());

        let result = outcome.into_result();
        assert_eq!(result.error.as_deref(), Some(PARSE_FAILURE_MESSAGE));
        assert_eq!(result.raw_response.as_deref(), Some("I cannot see any robot here."));
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_reply_with_error_field_degrades() {
        let text = r#"{"error":"content filtered","actions":[]}"#;
        let outcome = parse_or_degrade(text);
        match &outcome {
            AnnotationOutcome::Degraded { reason, .. } => {
                assert_eq!(reason, &DegradeReason::Reported("content filtered".to_string()));
            }
            other => panic!("expected degraded outcome, got {:?}", other),
        }

        let result = outcome.into_result();
        assert_eq!(result.error.as_deref(), Some("content filtered"));
        assert_eq!(result.raw_response.as_deref(), Some(text));
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_fenced_reply_with_error_field_degrades() {
        let text = "```json\n{\"error\":\"refused\"}\n```";
        assert!(parse_or_degrade(text).is_degraded());
    }

    #[test]
    fn test_empty_text_degrades() {
        assert!(parse_or_degrade("").is_degraded());
    }
}
