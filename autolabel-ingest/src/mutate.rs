use autolabel_core::models::{ActionSegment, Annotation, AnnotationResult, RawDataItem};
use autolabel_core::timeline::{to_absolute, Baseline};
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::store::DatasetStore;

/// One annotated episode ready to be written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedEpisode {
    pub episode_index: u64,
    pub vlm_result: AnnotationResult,
    /// Timestamp of the last sampled frame, in seconds.
    pub video_duration: f64,
    pub raw_file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Episodes,
    Meta,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Episodes => write!(f, "episodes"),
            StoreKind::Meta => write!(f, "meta"),
        }
    }
}

/// Result of writing one episode to both stores. The two writes are
/// independent and neither is rolled back when the other fails.
#[derive(Debug)]
pub struct FullUpdateOutcome {
    pub episodes: Result<usize, DatasetError>,
    pub meta: Result<usize, DatasetError>,
}

impl FullUpdateOutcome {
    pub fn is_success(&self) -> bool {
        self.episodes.is_ok() && self.meta.is_ok()
    }

    /// Stores whose update failed, with the error.
    pub fn failures(&self) -> Vec<(StoreKind, &DatasetError)> {
        let mut failed = Vec::new();
        if let Err(e) = &self.episodes {
            failed.push((StoreKind::Episodes, e));
        }
        if let Err(e) = &self.meta {
            failed.push((StoreKind::Meta, e));
        }
        failed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_indices: Vec<u64>,
}

/// Task string for one action: `"{cn}@{en}"`, or just `cn` when there is no
/// English text. Actions without a Chinese description produce nothing.
pub fn task_entry(action: &ActionSegment) -> Option<String> {
    let cn = action.description.trim();
    let en = action.description_en.trim();
    match (cn.is_empty(), en.is_empty()) {
        (true, _) => None,
        (false, true) => Some(cn.to_string()),
        (false, false) => Some(format!("{}@{}", cn, en)),
    }
}

fn annotations_for(result: &AnnotationResult, baseline: &Baseline) -> Vec<Annotation> {
    result
        .actions
        .iter()
        .map(|action| {
            let start = to_absolute(baseline.start, action.start_time);
            let end = to_absolute(baseline.start, action.end_time);
            Annotation {
                text: action.description.clone(),
                action_quality_label: baseline.label,
                start_second: start.second,
                start_nano_second: start.nanosecond,
                end_second: end.second,
                end_nano_second: end.nanosecond,
            }
        })
        .collect()
}

impl DatasetStore {
    /// Replace `tasks` on the episode with `episode_index`. Returns the number
    /// of task strings written.
    pub fn update_episode_tasks(
        &self,
        episode_index: u64,
        result: &AnnotationResult,
    ) -> Result<usize, DatasetError> {
        let mut episodes = self.load_episodes()?;
        let episode = episodes
            .iter_mut()
            .find(|e| e.episode_index == episode_index)
            .ok_or(DatasetError::EpisodeNotFound(episode_index))?;

        episode.tasks = result.actions.iter().filter_map(task_entry).collect();
        let count = episode.tasks.len();

        self.save_episodes(&episodes)?;
        tracing::info!(episode = episode_index, tasks = count, "Updated episode tasks");
        Ok(count)
    }

    /// Replace `annotations` on the raw-data entry belonging to the episode.
    ///
    /// The entry at position `episode_index` wins when it exists. Otherwise the
    /// entry is found by name, using `raw_file_name` or, failing that, the one
    /// recorded on the episode. Returns the number of annotations written.
    pub fn update_meta_annotations(
        &self,
        episode_index: u64,
        result: &AnnotationResult,
        raw_file_name: Option<&str>,
    ) -> Result<usize, DatasetError> {
        let mut meta = self.load_meta()?;
        let len = meta.raw_data_list.len();

        let position = match usize::try_from(episode_index).ok().filter(|&i| i < len) {
            Some(i) => {
                let name = &meta.raw_data_list[i].name;
                tracing::debug!(episode = episode_index, item = %name, "Matched raw data by position");
                if let Some(expected) = raw_file_name {
                    if expected != name.as_str() {
                        tracing::warn!(
                            episode = episode_index,
                            expected = %expected,
                            positional = %name,
                            "Raw file name disagrees with positional match; rawDataList may be reordered"
                        );
                    }
                }
                i
            }
            None => {
                tracing::warn!(
                    episode = episode_index,
                    len,
                    "Episode index beyond rawDataList, matching by name"
                );
                let name = match raw_file_name {
                    Some(name) => Some(name.to_string()),
                    None => self
                        .load_episodes()?
                        .into_iter()
                        .find(|e| e.episode_index == episode_index)
                        .and_then(|e| e.raw_file_name().map(str::to_string)),
                };
                name.as_deref()
                    .and_then(|n| meta.raw_data_list.iter().position(|item| item.name == n))
                    .ok_or(DatasetError::RawDataNotFound {
                        episode_index,
                        raw_file_name: name.clone(),
                    })?
            }
        };

        let item: &mut RawDataItem = &mut meta.raw_data_list[position];
        let baseline = Baseline::from_annotations(item.annotations());
        if item.annotations().is_empty() {
            tracing::warn!(item = %item.name, "No existing annotations, using zero baseline");
        }

        let annotations = annotations_for(result, &baseline);
        let count = annotations.len();
        let name = item.name.clone();
        item.annotations = Some(annotations);

        self.save_meta(&meta)?;
        tracing::info!(episode = episode_index, item = %name, annotations = count, "Updated raw data annotations");
        Ok(count)
    }

    /// Write one episode to both stores.
    pub fn update_episode_full(
        &self,
        episode_index: u64,
        result: &AnnotationResult,
        raw_file_name: Option<&str>,
    ) -> FullUpdateOutcome {
        let outcome = FullUpdateOutcome {
            episodes: self.update_episode_tasks(episode_index, result),
            meta: self.update_meta_annotations(episode_index, result, raw_file_name),
        };

        let failures = outcome.failures();
        match failures.len() {
            0 => {}
            1 => {
                let (store, error) = &failures[0];
                tracing::error!(
                    episode = episode_index,
                    store = %store,
                    error = %error,
                    "Partial store failure: only one store was updated"
                );
            }
            _ => {
                for (store, error) in &failures {
                    tracing::error!(episode = episode_index, store = %store, error = %error, "Store update failed");
                }
            }
        }

        outcome
    }

    /// Apply `items` in order. `progress` receives
    /// `(completed, total, succeeded_so_far)` after each item.
    pub fn batch_update(
        &self,
        items: &[AnnotatedEpisode],
        mut progress: Option<&mut dyn FnMut(usize, usize, usize)>,
    ) -> BatchSummary {
        let mut summary = BatchSummary {
            total: items.len(),
            ..BatchSummary::default()
        };

        for (i, item) in items.iter().enumerate() {
            let outcome = self.update_episode_full(
                item.episode_index,
                &item.vlm_result,
                item.raw_file_name.as_deref(),
            );
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed_indices.push(item.episode_index);
            }
            if let Some(callback) = progress.as_mut() {
                callback(i + 1, summary.total, summary.succeeded);
            }
        }

        tracing::info!(
            succeeded = summary.succeeded,
            total = summary.total,
            "Batch update finished"
        );
        summary
    }
}
