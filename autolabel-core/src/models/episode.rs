use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of `episodes.jsonl`. Only `tasks` is ever rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_index: u64,
    #[serde(default)]
    pub tasks: Vec<String>,
    pub length: u64,
    /// Fields this tool does not interpret, written back untouched. This
    /// includes `raw_file_name`, so an explicit `null` survives a rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Episode {
    /// Name of the raw recording this episode was converted from.
    pub fn raw_file_name(&self) -> Option<&str> {
        self.extra.get("raw_file_name").and_then(Value::as_str)
    }

    /// First recorded task, used as prompt context.
    pub fn primary_task(&self) -> Option<&str> {
        self.tasks
            .iter()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
    }
}
