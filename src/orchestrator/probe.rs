// ABOUTME: HTTP health probe issued from the target's own network vantage point.
// ABOUTME: Runs curl on the target so ports bound only to localhost are reachable.

use std::time::Duration;

use crate::recipe::HttpHealthCheck;
use crate::remote::{RemoteError, RemoteExecutor};
use crate::validate::{ValidationError, validate_url_path};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe path: {0}")]
    Invalid(#[from] ValidationError),

    #[error("probe could not run: {0}")]
    Remote(#[from] RemoteError),

    #[error("unexpected probe output: {0:?}")]
    Unparseable(String),

    #[error("expected HTTP {expected}, got {actual}")]
    UnexpectedStatus { expected: u16, actual: u16 },
}

pub(crate) fn probe_command(check: &HttpHealthCheck) -> Result<String, ValidationError> {
    validate_url_path(&check.path)?;
    let secs = check.timeout.as_secs().max(1);
    Ok(format!(
        "curl -s -o /dev/null -w '%{{http_code}}' --max-time {} 'http://127.0.0.1:{}{}'",
        secs, check.port, check.path
    ))
}

/// Issue the recipe's HTTP check against `host` and compare the status code.
pub async fn probe_http(
    executor: &dyn RemoteExecutor,
    host: &str,
    check: &HttpHealthCheck,
) -> Result<u16, ProbeError> {
    let command = probe_command(check)?;
    // curl's own --max-time bounds the request; the extra margin covers connection setup.
    let bound = check.timeout + Duration::from_secs(10);
    let output = executor.execute_with_timeout(host, &command, bound).await?;

    let code = output.trim();
    let actual = code
        .parse::<u16>()
        .map_err(|_| ProbeError::Unparseable(code.to_string()))?;
    if actual != check.expected_status {
        return Err(ProbeError::UnexpectedStatus {
            expected: check.expected_status,
            actual,
        });
    }
    Ok(actual)
}
