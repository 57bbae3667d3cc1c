//! Record types shared across the pipeline.

pub mod annotation;
pub mod episode;
pub mod raw_data;

pub use annotation::{ActionSegment, AnnotationOutcome, AnnotationResult, DegradeReason, SegmentIssues};
pub use episode::Episode;
pub use raw_data::{Annotation, MetaDocument, QualityLabel, RawDataItem};

use serde::{Deserialize, Deserializer};

/// Treat an explicit JSON `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
