// ABOUTME: Dependency resolution defaults and provisioning poll bounds.
// ABOUTME: Names the fallback proxy, database, and cache recipes.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependenciesConfig {
    #[serde(default = "default_proxy")]
    pub default_proxy: String,

    #[serde(default = "default_database")]
    pub default_database: String,

    #[serde(default = "default_cache")]
    pub default_cache: String,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_min_wait", with = "humantime_serde")]
    pub min_wait: Duration,

    #[serde(default = "default_max_wait", with = "humantime_serde")]
    pub max_wait: Duration,
}

fn default_proxy() -> String {
    "traefik".to_string()
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_cache() -> String {
    "redis".to_string()
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_min_wait() -> Duration {
    Duration::from_secs(30)
}

fn default_max_wait() -> Duration {
    Duration::from_secs(300)
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            default_proxy: default_proxy(),
            default_database: default_database(),
            default_cache: default_cache(),
            poll_interval: default_poll_interval(),
            min_wait: default_min_wait(),
            max_wait: default_max_wait(),
        }
    }
}
