// ABOUTME: Failures of the SSH transport underneath the remote executor.
// ABOUTME: The executor folds these into RemoteError before they reach the orchestrator.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not reach {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: russh::Error,
    },

    #[error("{user}@{host} rejected every offered key")]
    Rejected { user: String, host: String },

    #[error("no usable credentials: {0}")]
    NoCredentials(String),

    #[error("cannot read private key {path}: {reason}")]
    Key { path: PathBuf, reason: String },

    #[error("malformed target address {0:?}, expected host:port")]
    Address(String),

    #[error("session channel failed: {0}")]
    Channel(String),

    #[error("remote command exceeded {0:?}")]
    Timeout(Duration),

    #[error("remote command ended without an exit status")]
    NoExitStatus,

    #[error(transparent)]
    Protocol(#[from] russh::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
