//! Relative-to-absolute time conversion.
//!
//! The model reports action boundaries as seconds since the start of the
//! video. The dataset stores `(second, nanosecond)` epoch pairs anchored on the
//! first annotation recorded for the raw file.

use crate::models::{Annotation, QualityLabel};

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Epoch time split into whole seconds and a nanosecond part in `[0, 1e9)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbsoluteTime {
    pub second: i64,
    pub nanosecond: u32,
}

impl AbsoluteTime {
    pub fn new(second: i64, nanosecond: u32) -> Self {
        Self { second, nanosecond }
    }
}

/// Anchor for converting relative action times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Baseline {
    pub start: AbsoluteTime,
    pub label: QualityLabel,
}

impl Baseline {
    /// Taken from the first existing annotation, `(0, 0, qualified)` otherwise.
    pub fn from_annotations(annotations: &[Annotation]) -> Self {
        match annotations.first() {
            Some(first) => Self {
                start: AbsoluteTime::new(first.start_second, first.start_nano_second),
                label: first.action_quality_label,
            },
            None => Self::default(),
        }
    }
}

/// Shift `baseline` by `relative_seconds`, carrying with floor semantics.
///
/// Non-finite offsets are treated as zero.
pub fn to_absolute(baseline: AbsoluteTime, relative_seconds: f64) -> AbsoluteTime {
    let relative_ns = if relative_seconds.is_finite() {
        (relative_seconds * 1e9).round() as i64
    } else {
        0
    };
    let total_ns = i64::from(baseline.nanosecond).saturating_add(relative_ns);

    AbsoluteTime {
        second: baseline.second + total_ns.div_euclid(NANOS_PER_SECOND),
        nanosecond: total_ns.rem_euclid(NANOS_PER_SECOND) as u32,
    }
}
