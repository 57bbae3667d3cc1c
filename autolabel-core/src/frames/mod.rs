//! Frame sampling and contact-sheet composition.
//!
//! - [`FfmpegFrameSampler`] decodes a video through the `ffprobe`/`ffmpeg`
//!   executables and keeps frames at a target rate.
//! - [`compose_grid`] tiles a uniform subset of frames into one stamped image.

mod ffmpeg;
mod glyphs;
mod grid;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use ffmpeg::{frame_interval, FfmpegFrameSampler, VideoInfo};
pub use grid::{compose_grid, select_uniform, select_frames, GridLayout};

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Decoded frame with its offset from the start of the video.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: f64,
    pub image: RgbImage,
}

/// JPEG-encoded frame, the unit handed to the inference client.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub timestamp: f64,
    pub jpeg: Vec<u8>,
}

/// Composite image of sampled frames plus the timestamps it shows, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameGrid {
    pub timestamps: Vec<f64>,
    /// Empty when there were no frames to compose.
    pub image: Vec<u8>,
}

impl FrameGrid {
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Video not found: {}", .0.display())]
    VideoNotFound(PathBuf),

    #[error("Failed to open video {}: {reason}", .path.display())]
    VideoOpenFailure { path: PathBuf, reason: String },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Anything that can turn a video file into encoded, timestamped frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn sample(&self, video: &Path, target_fps: f64) -> Result<Vec<EncodedFrame>, FrameError>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Encode a frame as JPEG. Identical pixels always give identical bytes.
pub fn encode(frame: &Frame, quality: u8) -> Result<EncodedFrame, FrameError> {
    Ok(EncodedFrame {
        timestamp: frame.timestamp,
        jpeg: encode_jpeg(&frame.image, quality)?,
    })
}

pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder.encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )?;
    }
    Ok(buf)
}
