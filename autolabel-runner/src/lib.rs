pub mod discovery;
pub mod pacing;
pub mod pipeline;
pub mod report;

pub use discovery::{find_episode_videos, EpisodeVideo};
pub use pacing::PacingPolicy;
pub use pipeline::{Orchestrator, RunError, RunOptions};
pub use report::{EpisodeFailure, FailureStage, RunReport};
