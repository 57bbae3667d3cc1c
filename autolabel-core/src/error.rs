use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutolabelError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing inference endpoint URL (set inference.api_url or VLM_API_URL)")]
    MissingEndpoint,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
