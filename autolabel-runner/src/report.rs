use autolabel_ingest::AnnotatedEpisode;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Step of the per-episode pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Extract,
    Infer,
    Update,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Extract => write!(f, "extract"),
            FailureStage::Infer => write!(f, "infer"),
            FailureStage::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeFailure {
    pub episode_index: u64,
    pub stage: FailureStage,
    pub message: String,
    /// Model reply kept for diagnosis when the result was degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl EpisodeFailure {
    pub fn new(episode_index: u64, stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            episode_index,
            stage,
            message: message.into(),
            raw_response: None,
        }
    }
}

/// Outcome of one run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub results: Vec<AnnotatedEpisode>,
    pub failures: Vec<EpisodeFailure>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failed_indices(&self) -> Vec<u64> {
        self.failures.iter().map(|f| f.episode_index).collect()
    }

    /// Write results and failures as pretty JSON.
    pub fn export(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), results = self.results.len(), "Exported run report");
        Ok(())
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Processed {} episode(s): {} succeeded, {} failed",
            self.total(),
            self.succeeded(),
            self.failures.len()
        );
        for failure in &self.failures {
            out.push_str(&format!(
                "\n  episode {:>6}  [{}]  {}",
                failure.episode_index, failure.stage, failure.message
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolabel_core::models::AnnotationResult;

    fn report() -> RunReport {
        RunReport {
            results: vec![AnnotatedEpisode {
                episode_index: 0,
                vlm_result: AnnotationResult {
                    task_summary: "整理纸杯".to_string(),
                    ..AnnotationResult::default()
                },
                video_duration: 23.0,
                raw_file_name: Some("a.mcap".to_string()),
            }],
            failures: vec![EpisodeFailure {
                raw_response: Some("not json".to_string()),
                ..EpisodeFailure::new(3, FailureStage::Infer, "Failed to parse VLM response")
            }],
        }
    }

    #[test]
    fn test_counts() {
        let report = report();
        assert_eq!(report.total(), 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed_indices(), vec![3]);
        assert!(report.has_failures());
        assert!(report.summary().contains("1 succeeded, 1 failed"));
        assert!(report.summary().contains("[infer]"));
    }

    #[test]
    fn test_export_uses_record_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        report().export(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let record = &json["results"][0];
        assert_eq!(record["episode_index"], 0);
        assert_eq!(record["video_duration"], 23.0);
        assert_eq!(record["raw_file_name"], "a.mcap");
        assert_eq!(record["vlm_result"]["task_summary"], "整理纸杯");
        assert_eq!(json["failures"][0]["stage"], "infer");
        assert_eq!(json["failures"][0]["raw_response"], "not json");
    }
}
