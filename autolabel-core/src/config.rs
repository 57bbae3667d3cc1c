use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::error::AutolabelError;

/// Environment variable consulted when `inference.api_url` is empty.
pub const API_URL_ENV: &str = "VLM_API_URL";
/// Environment variable consulted when `inference.api_token` is empty.
pub const API_TOKEN_ENV: &str = "VLM_API_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AutolabelConfig {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InferenceConfig {
    pub api_url: String,
    pub api_token: String,
    /// Optional model name forwarded in the request body.
    pub model: Option<String>,
    pub temperature: f32,
    pub enable_thinking: bool,
    /// Total attempts per request, including the first one.
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub single_image_timeout_secs: u64,
    pub multi_image_timeout_secs: u64,
    pub token_header: String,
    pub token_prefix: String,
    pub request_id_header: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_token: String::new(),
            model: None,
            temperature: 0.3,
            enable_thinking: false,
            max_retries: 3,
            retry_delay_ms: 2000,
            single_image_timeout_secs: 60,
            multi_image_timeout_secs: 120,
            token_header: "Authorization".to_string(),
            token_prefix: "Bearer ".to_string(),
            request_id_header: "X-Request-Id".to_string(),
        }
    }
}

impl InferenceConfig {
    /// Fill empty endpoint/token fields from `VLM_API_URL` / `VLM_API_TOKEN`.
    pub fn with_env_fallback(mut self) -> Self {
        if self.api_url.is_empty() {
            self.api_url = std::env::var(API_URL_ENV).unwrap_or_default();
        }
        if self.api_token.is_empty() {
            self.api_token = std::env::var(API_TOKEN_ENV).unwrap_or_default();
        }
        self
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplingConfig {
    pub fps: f64,
    pub use_grid: bool,
    pub grid_size: usize,
    /// Cap on images sent in sequence mode.
    pub max_images: usize,
    pub jpeg_quality: u8,
    pub cell_width: u32,
    pub cell_height: u32,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            fps: 1.0,
            use_grid: true,
            grid_size: 12,
            max_images: 12,
            jpeg_quality: 85,
            cell_width: 320,
            cell_height: 240,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatasetConfig {
    pub chunk: String,
    pub camera_key: String,
    pub video_extension: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            chunk: "chunk-000".to_string(),
            camera_key: "observation.images.head_rgb".to_string(),
            video_extension: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PacingConfig {
    pub inter_item_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AutolabelConfig {
    /// Load from an optional TOML file layered with `AUTOLABEL__*` env vars.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("AUTOLABEL").separator("__"))
            .build()?;
        s.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), AutolabelError> {
        if !(self.sampling.fps.is_finite() && self.sampling.fps > 0.0) {
            return Err(AutolabelError::Invalid(format!(
                "sampling.fps must be positive, got {}",
                self.sampling.fps
            )));
        }
        if self.sampling.grid_size == 0 || self.sampling.max_images == 0 {
            return Err(AutolabelError::Invalid(
                "sampling.grid_size and sampling.max_images must be at least 1".to_string(),
            ));
        }
        if self.inference.max_retries == 0 {
            return Err(AutolabelError::Invalid(
                "inference.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
