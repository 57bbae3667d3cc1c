use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::{encode, EncodedFrame, Frame, FrameError, FrameSource, DEFAULT_JPEG_QUALITY};
use crate::config::SamplingConfig;

/// Stream properties read from the container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Decoded frames are kept every `round(native / target)` frames, at least 1.
pub fn frame_interval(native_fps: f64, target_fps: f64) -> usize {
    if !(native_fps.is_finite() && target_fps.is_finite()) || target_fps <= 0.0 {
        return 1;
    }
    let interval = (native_fps / target_fps).round();
    if interval < 1.0 {
        1
    } else {
        interval as usize
    }
}

/// Parse an ffprobe rate such as `30000/1001`. `0/0` yields `None`.
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Samples frames by shelling out to `ffprobe` and `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    jpeg_quality: u8,
}

impl Default for FfmpegFrameSampler {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl FfmpegFrameSampler {
    pub fn new(config: &SamplingConfig) -> Self {
        Self {
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            ffprobe_bin: config.ffprobe_bin.clone(),
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Read dimensions and native frame rate of the first video stream.
    pub async fn probe(&self, video: &Path) -> Result<VideoInfo, FrameError> {
        let output = Command::new(&self.ffprobe_bin)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,avg_frame_rate,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(video)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| FrameError::Spawn {
                program: self.ffprobe_bin.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(open_failure(video, &output.stderr));
        }

        let probe: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| FrameError::VideoOpenFailure {
                path: video.to_path_buf(),
                reason: format!("unreadable ffprobe output: {}", e),
            })?;

        let stream = probe
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| FrameError::VideoOpenFailure {
                path: video.to_path_buf(),
                reason: "no video stream".to_string(),
            })?;

        let fps = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));

        match (stream.width, stream.height, fps) {
            (Some(width), Some(height), Some(fps)) if width > 0 && height > 0 => {
                Ok(VideoInfo { width, height, fps })
            }
            _ => Err(FrameError::VideoOpenFailure {
                path: video.to_path_buf(),
                reason: "missing dimensions or frame rate".to_string(),
            }),
        }
    }

    /// Decode the video and keep every `frame_interval`-th frame.
    pub async fn extract_frames(
        &self,
        video: &Path,
        target_fps: f64,
    ) -> Result<Vec<Frame>, FrameError> {
        if !video.exists() {
            return Err(FrameError::VideoNotFound(video.to_path_buf()));
        }

        let info = self.probe(video).await?;
        let interval = frame_interval(info.fps, target_fps);
        let select = format!("select=not(mod(n\\,{}))", interval);

        let output = Command::new(&self.ffmpeg_bin)
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(video)
            .args([
                "-vf",
                select.as_str(),
                "-vsync",
                "vfr",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| FrameError::Spawn {
                program: self.ffmpeg_bin.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(open_failure(video, &output.stderr));
        }

        let frame_len = info.width as usize * info.height as usize * 3;
        let frames: Vec<Frame> = output
            .stdout
            .chunks_exact(frame_len)
            .enumerate()
            .filter_map(|(i, chunk)| {
                let image = RgbImage::from_raw(info.width, info.height, chunk.to_vec())?;
                Some(Frame {
                    timestamp: (i * interval) as f64 / info.fps,
                    image,
                })
            })
            .collect();

        tracing::info!(
            video = %video.display(),
            frames = frames.len(),
            native_fps = info.fps,
            target_fps,
            interval,
            "Extracted frames"
        );

        Ok(frames)
    }
}

fn open_failure(video: &Path, stderr: &[u8]) -> FrameError {
    FrameError::VideoOpenFailure {
        path: video.to_path_buf(),
        reason: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSampler {
    async fn sample(&self, video: &Path, target_fps: f64) -> Result<Vec<EncodedFrame>, FrameError> {
        let frames = self.extract_frames(video, target_fps).await?;
        frames
            .iter()
            .map(|frame| encode(frame, self.jpeg_quality))
            .collect()
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}
