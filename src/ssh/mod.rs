// ABOUTME: SSH transport backing the remote executor.
// ABOUTME: Supports SSH agent and key-based authentication with known_hosts verification.

mod client;
mod error;
mod executor;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Error, Result};
pub use executor::SshExecutor;
