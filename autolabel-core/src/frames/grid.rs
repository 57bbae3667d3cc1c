use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use super::glyphs::stamp_label;
use super::{encode_jpeg, EncodedFrame, FrameError, FrameGrid, DEFAULT_JPEG_QUALITY};
use crate::config::SamplingConfig;

/// Cell geometry and output quality for [`compose_grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub cell_width: u32,
    pub cell_height: u32,
    pub jpeg_quality: u8,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            cell_width: 320,
            cell_height: 240,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl From<&SamplingConfig> for GridLayout {
    fn from(config: &SamplingConfig) -> Self {
        Self {
            cell_width: config.cell_width.max(1),
            cell_height: config.cell_height.max(1),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// Indices of a uniform stride sample: `step = max(1, len / count)`,
/// starting at 0, at most `count` entries.
pub fn select_uniform(len: usize, count: usize) -> Vec<usize> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    let step = (len / count).max(1);
    (0..len).step_by(step).take(count).collect()
}

/// Uniformly sampled subset of `frames`, used for sequence mode.
pub fn select_frames(frames: &[EncodedFrame], count: usize) -> Vec<EncodedFrame> {
    select_uniform(frames.len(), count)
        .into_iter()
        .map(|i| frames[i].clone())
        .collect()
}

/// Tile up to `grid_size` frames into one JPEG, each cell stamped with its time.
///
/// Layout is row-major with `rows = ceil(sqrt(k))` and `cols = ceil(k / rows)`.
/// No frames gives an empty grid rather than an error.
pub fn compose_grid(
    frames: &[EncodedFrame],
    grid_size: usize,
    layout: &GridLayout,
) -> Result<FrameGrid, FrameError> {
    let selected = select_uniform(frames.len(), grid_size);
    if selected.is_empty() {
        return Ok(FrameGrid::default());
    }

    let count = selected.len() as u32;
    let rows = (count as f64).sqrt().ceil() as u32;
    let cols = count.div_ceil(rows);

    let mut canvas = RgbImage::from_pixel(
        layout.cell_width * cols,
        layout.cell_height * rows,
        Rgb([0, 0, 0]),
    );
    let label_scale = (layout.cell_height / 120).max(1);

    let mut timestamps = Vec::with_capacity(selected.len());
    for (slot, &index) in selected.iter().enumerate() {
        let frame = &frames[index];
        let decoded = image::load_from_memory(&frame.jpeg)?.to_rgb8();
        let cell = imageops::resize(
            &decoded,
            layout.cell_width,
            layout.cell_height,
            FilterType::Triangle,
        );

        let slot = slot as u32;
        let x = (slot % cols) * layout.cell_width;
        let y = (slot / cols) * layout.cell_height;
        imageops::replace(&mut canvas, &cell, i64::from(x), i64::from(y));
        stamp_label(
            &mut canvas,
            x + 4,
            y + 4,
            &format!("{:.1}s", frame.timestamp),
            label_scale,
        );

        timestamps.push(frame.timestamp);
    }

    Ok(FrameGrid {
        timestamps,
        image: encode_jpeg(&canvas, layout.jpeg_quality)?,
    })
}
