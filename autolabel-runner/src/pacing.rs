use autolabel_core::config::PacingConfig;
use std::time::Duration;

/// Delay inserted between consecutive batch items to stay under the
/// endpoint's rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacingPolicy {
    None,
    Fixed(Duration),
}

impl PacingPolicy {
    pub fn from_config(config: &PacingConfig) -> Self {
        if config.inter_item_delay_ms == 0 {
            PacingPolicy::None
        } else {
            PacingPolicy::Fixed(Duration::from_millis(config.inter_item_delay_ms))
        }
    }

    pub async fn pause(&self) {
        if let PacingPolicy::Fixed(delay) = self {
            tokio::time::sleep(*delay).await;
        }
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        PacingPolicy::Fixed(Duration::from_secs(1))
    }
}
