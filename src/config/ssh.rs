// ABOUTME: SSH connection settings shared by every target.
// ABOUTME: Host key policy defaults to strict known_hosts checking.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    /// Login user; falls back to `$USER`, then `root`.
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub key_path: Option<PathBuf>,

    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,

    /// Accept and record unknown host keys.
    #[serde(default)]
    pub trust_first_connection: bool,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: None,
            key_path: None,
            known_hosts_path: None,
            trust_first_connection: false,
            command_timeout: default_command_timeout(),
        }
    }
}
