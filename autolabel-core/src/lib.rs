pub mod config;
pub mod error;
pub mod frames;
pub mod models;
pub mod prompt;
pub mod response;
pub mod timeline;
pub mod vlm;

pub use config::AutolabelConfig;
pub use error::AutolabelError;
pub use frames::{
    compose_grid, select_frames, EncodedFrame, FfmpegFrameSampler, FrameError, FrameGrid,
    FrameSource, GridLayout,
};
pub use models::{
    ActionSegment, Annotation, AnnotationOutcome, AnnotationResult, DegradeReason, Episode,
    MetaDocument, QualityLabel, RawDataItem,
};
pub use timeline::{to_absolute, AbsoluteTime, Baseline};
pub use vlm::{Annotator, EpisodeContext, InferenceError, VisualInput, VlmClient};
