use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store file missing: {0}")]
    MissingStore(PathBuf),

    #[error("Episode {0} not found in episodes store")]
    EpisodeNotFound(u64),

    #[error("No raw data entry for episode {episode_index} (raw file name: {})", raw_file_name.as_deref().unwrap_or("none"))]
    RawDataNotFound {
        episode_index: u64,
        raw_file_name: Option<String>,
    },
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        DatasetError::Json {
            path: path.into(),
            source,
        }
    }
}
