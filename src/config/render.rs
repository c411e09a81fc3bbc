// ABOUTME: Template rendering limits.
// ABOUTME: Wall-clock timeout and output size ceiling.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}
