use autolabel_core::config::DatasetConfig;
use std::path::{Path, PathBuf};

pub const EPISODES_FILE: &str = "episodes.jsonl";
pub const META_FILE: &str = "training_data_set_meta.json";

/// Paths inside one dataset directory.
///
/// A dataset rooted at `/data/straighten_papercup` keeps its episode store at
/// `/data/straighten_papercup/straighten_papercup/meta/episodes.jsonl` and its
/// meta document at `/data/straighten_papercup/training_data_set_meta.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    root: PathBuf,
    name: String,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { root, name }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn episodes_file(&self) -> PathBuf {
        self.root.join(&self.name).join("meta").join(EPISODES_FILE)
    }

    pub fn meta_file(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    pub fn video_dir(&self, config: &DatasetConfig) -> PathBuf {
        self.root
            .join(&self.name)
            .join("videos")
            .join(&config.chunk)
            .join(&config.camera_key)
    }

    pub fn video_path(&self, config: &DatasetConfig, episode_index: u64) -> PathBuf {
        self.video_dir(config).join(format!(
            "episode_{:06}.{}",
            episode_index, config.video_extension
        ))
    }
}
