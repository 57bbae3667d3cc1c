//! Per-episode orchestration: sample frames, annotate, write back.

use autolabel_core::config::{AutolabelConfig, DatasetConfig};
use autolabel_core::frames::{compose_grid, select_frames, FrameSource, GridLayout};
use autolabel_core::models::{AnnotationOutcome, AnnotationResult, Episode};
use autolabel_core::vlm::{Annotator, EpisodeContext, VisualInput};
use autolabel_ingest::{AnnotatedEpisode, DatasetError, DatasetStore};
use std::path::PathBuf;
use thiserror::Error;

use crate::discovery::{find_episode_videos, EpisodeVideo};
use crate::pacing::PacingPolicy;
use crate::report::{EpisodeFailure, FailureStage, RunReport};

/// Errors that stop a run. Per-episode problems end up in the [`RunReport`].
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Video directory does not exist: {0}")]
    VideoDirMissing(PathBuf),

    #[error("Failed to list videos in {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup failed, nothing was modified: {0}")]
    Backup(#[source] DatasetError),

    #[error("No video for episode {0}")]
    EpisodeNotFound(u64),
}

/// Knobs for one run, usually built from [`AutolabelConfig`] plus CLI flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub fps: f64,
    pub use_grid: bool,
    pub grid_size: usize,
    pub max_images: usize,
    pub grid_layout: GridLayout,
    pub max_episodes: Option<usize>,
    /// Sample and annotate but leave both stores untouched.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn from_config(config: &AutolabelConfig) -> Self {
        Self {
            fps: config.sampling.fps,
            use_grid: config.sampling.use_grid,
            grid_size: config.sampling.grid_size,
            max_images: config.sampling.max_images,
            grid_layout: GridLayout::from(&config.sampling),
            max_episodes: None,
            dry_run: false,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&AutolabelConfig::default())
    }
}

pub struct Orchestrator {
    source: Box<dyn FrameSource>,
    annotator: Box<dyn Annotator>,
    store: DatasetStore,
    video_dir: PathBuf,
    video_extension: String,
    options: RunOptions,
    pacing: PacingPolicy,
}

impl Orchestrator {
    /// Fails when the dataset has no video directory for the configured
    /// chunk and camera.
    pub fn new(
        source: Box<dyn FrameSource>,
        annotator: Box<dyn Annotator>,
        store: DatasetStore,
        dataset: &DatasetConfig,
        options: RunOptions,
        pacing: PacingPolicy,
    ) -> Result<Self, RunError> {
        let video_dir = store.layout().video_dir(dataset);
        if !video_dir.is_dir() {
            return Err(RunError::VideoDirMissing(video_dir));
        }

        tracing::info!(
            video_dir = %video_dir.display(),
            frames = source.name(),
            annotator = annotator.name(),
            grid = options.use_grid,
            dry_run = options.dry_run,
            "Orchestrator ready"
        );

        Ok(Self {
            source,
            annotator,
            store,
            video_dir,
            video_extension: dataset.video_extension.clone(),
            options,
            pacing,
        })
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    /// Episode videos in index order, capped at `max_episodes`.
    pub fn discover(&self) -> Result<Vec<EpisodeVideo>, RunError> {
        let mut videos = find_episode_videos(&self.video_dir, &self.video_extension).map_err(
            |source| RunError::Discovery {
                path: self.video_dir.clone(),
                source,
            },
        )?;
        if let Some(max) = self.options.max_episodes {
            videos.truncate(max);
        }
        tracing::info!(count = videos.len(), "Found episode videos");
        Ok(videos)
    }

    /// Annotate every discovered video from position `start_index` on.
    pub async fn run_batch(&mut self, start_index: usize) -> Result<RunReport, RunError> {
        let mut videos = self.discover()?;
        if start_index > 0 {
            tracing::info!(start_index, "Resuming from position");
            videos = videos.into_iter().skip(start_index).collect();
        }

        self.backup()?;

        let mut report = RunReport::default();
        let total = videos.len();
        for (i, video) in videos.iter().enumerate() {
            tracing::info!(
                episode = video.episode_index,
                progress = %format!("{}/{}", i + 1, total),
                "Processing episode"
            );
            self.record(&mut report, video).await;

            if i + 1 < total {
                self.pacing.pause().await;
            }
        }

        tracing::info!(
            succeeded = report.succeeded(),
            total = report.total(),
            failed = ?report.failed_indices(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Annotate the single episode with `episode_index`.
    pub async fn run_single(&mut self, episode_index: u64) -> Result<RunReport, RunError> {
        let video = self
            .discover()?
            .into_iter()
            .find(|v| v.episode_index == episode_index)
            .ok_or(RunError::EpisodeNotFound(episode_index))?;

        self.backup()?;

        let mut report = RunReport::default();
        self.record(&mut report, &video).await;
        Ok(report)
    }

    fn backup(&mut self) -> Result<(), RunError> {
        if self.options.dry_run {
            tracing::info!("Dry run: skipping backup");
            return Ok(());
        }
        self.store.backup_once().map_err(RunError::Backup)?;
        Ok(())
    }

    async fn record(&self, report: &mut RunReport, video: &EpisodeVideo) {
        match self.annotate_episode(video).await {
            Ok(annotated) => report.results.push(annotated),
            Err(failure) => {
                tracing::error!(
                    episode = failure.episode_index,
                    stage = %failure.stage,
                    error = %failure.message,
                    "Episode failed"
                );
                report.failures.push(failure);
            }
        }
    }

    /// Run the three stages for one video and write the result back unless
    /// this is a dry run.
    pub async fn annotate_episode(
        &self,
        video: &EpisodeVideo,
    ) -> Result<AnnotatedEpisode, EpisodeFailure> {
        let index = video.episode_index;
        let episode = self.episode_record(index);

        // Extract
        let frames = self
            .source
            .sample(&video.path, self.options.fps)
            .await
            .map_err(|e| EpisodeFailure::new(index, FailureStage::Extract, e.to_string()))?;
        let Some(last) = frames.last() else {
            return Err(EpisodeFailure::new(
                index,
                FailureStage::Extract,
                "No frames extracted",
            ));
        };
        let video_duration = last.timestamp;
        tracing::debug!(episode = index, frames = frames.len(), duration = video_duration, "Sampled frames");

        let input = if self.options.use_grid {
            let grid = compose_grid(&frames, self.options.grid_size, &self.options.grid_layout)
                .map_err(|e| EpisodeFailure::new(index, FailureStage::Extract, e.to_string()))?;
            VisualInput::Grid(grid)
        } else {
            VisualInput::Sequence(select_frames(&frames, self.options.max_images))
        };

        // Infer
        let context = EpisodeContext {
            duration_secs: video_duration,
            task: episode
                .as_ref()
                .and_then(Episode::primary_task)
                .map(str::to_string),
        };
        let result = match self.annotator.annotate(&input, &context).await {
            AnnotationOutcome::Annotated(result) if result.is_degraded() => {
                let message = result.error.clone().unwrap_or_default();
                return Err(EpisodeFailure {
                    raw_response: result.raw_response,
                    ..EpisodeFailure::new(index, FailureStage::Infer, message)
                });
            }
            AnnotationOutcome::Annotated(result) => result,
            AnnotationOutcome::Degraded { reason, partial } => {
                return Err(EpisodeFailure {
                    raw_response: partial.raw_response,
                    ..EpisodeFailure::new(index, FailureStage::Infer, reason.to_string())
                });
            }
        };
        log_result(index, &result);

        let raw_file_name = episode
            .as_ref()
            .and_then(Episode::raw_file_name)
            .map(str::to_string);
        let annotated = AnnotatedEpisode {
            episode_index: index,
            vlm_result: result,
            video_duration,
            raw_file_name,
        };

        if self.options.dry_run {
            tracing::info!(episode = index, "Dry run: stores left untouched");
            return Ok(annotated);
        }

        // Update
        let outcome = self.store.update_episode_full(
            index,
            &annotated.vlm_result,
            annotated.raw_file_name.as_deref(),
        );
        if !outcome.is_success() {
            let message = outcome
                .failures()
                .iter()
                .map(|(store, e)| format!("{}: {}", store, e))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(EpisodeFailure::new(index, FailureStage::Update, message));
        }

        Ok(annotated)
    }

    fn episode_record(&self, index: u64) -> Option<Episode> {
        match self.store.load_episodes() {
            Ok(episodes) => episodes.into_iter().find(|e| e.episode_index == index),
            Err(e) => {
                tracing::warn!(episode = index, error = %e, "Could not read episode record");
                None
            }
        }
    }
}

fn log_result(index: u64, result: &AnnotationResult) {
    tracing::info!(
        episode = index,
        summary = %result.task_summary,
        actions = result.actions.len(),
        "Annotated episode"
    );
    for (i, action) in result.actions.iter().enumerate() {
        tracing::info!(
            episode = index,
            n = i + 1,
            start = %format!("{:.1}s", action.start_time),
            end = %format!("{:.1}s", action.end_time),
            description = %action.description,
            "Action"
        );
    }

    let issues = result.segment_issues();
    if !issues.is_clean() {
        tracing::warn!(
            episode = index,
            inverted = issues.inverted,
            out_of_order = issues.out_of_order,
            overlapping = issues.overlapping,
            "Returned segments are not ordered and disjoint"
        );
    }
}
