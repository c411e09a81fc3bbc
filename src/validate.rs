// ABOUTME: Validation of values that get interpolated into remote shell commands.
// ABOUTME: Hosts, stack/container names, remote paths, and env var names/values.

use thiserror::Error;

/// Maximum length of a stack or container name.
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length of a remote filesystem path.
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum size of a single environment variable value.
pub const MAX_ENV_VALUE_LEN: usize = 64 * 1024;

/// A value rejected before it could reach a remote shell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} contains invalid characters: {value:?}")]
    InvalidChars { field: &'static str, value: String },

    #[error("host must be in host:port format with a numeric port: {0:?}")]
    InvalidHost(String),

    #[error("path must not contain '..': {0:?}")]
    PathTraversal(String),

    #[error("path must not contain '~': {0:?}")]
    TildeExpansion(String),

    #[error("invalid environment variable name: {0:?}")]
    InvalidEnvName(String),

    #[error("environment variable {name} contains a NUL byte")]
    EnvValueNul { name: String },

    #[error("environment variable {name} contains control characters")]
    EnvValueControl { name: String },

    #[error("environment variable {name} exceeds {max} bytes")]
    EnvValueTooLong { name: String, max: usize },

    #[error("payload contains the heredoc terminator line")]
    HeredocTerminator,
}

/// Validate a `host:port` target address.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    let Some((name, port)) = host.rsplit_once(':') else {
        return Err(ValidationError::InvalidHost(host.to_string()));
    };

    if name.is_empty() || port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidHost(host.to_string()));
    }

    // Hostnames, IPv4 literals, and bracketed IPv6 literals only.
    let host_ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '[' | ']' | ':'));
    if !host_ok {
        return Err(ValidationError::InvalidHost(host.to_string()));
    }

    if port.parse::<u16>().is_err() {
        return Err(ValidationError::InvalidHost(host.to_string()));
    }

    Ok(())
}

/// Validate a stack or container name: `[A-Za-z0-9_-]{1,255}`.
pub fn validate_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_NAME_LEN,
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidChars {
            field,
            value: name.to_string(),
        });
    }
    Ok(())
}

/// Validate a remote filesystem path.
///
/// `~` is rejected anywhere in the path: the remote shell expands it before
/// any `..` check could see the result.
pub fn validate_path(field: &'static str, path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_PATH_LEN,
        });
    }
    if path.contains('~') {
        return Err(ValidationError::TildeExpansion(path.to_string()));
    }
    if path.contains("..") {
        return Err(ValidationError::PathTraversal(path.to_string()));
    }
    if !path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.'))
    {
        return Err(ValidationError::InvalidChars {
            field,
            value: path.to_string(),
        });
    }
    Ok(())
}

/// Validate a POSIX environment variable name: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_env_name(name: &str) -> Result<(), ValidationError> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidEnvName(name.to_string()));
    }
    Ok(())
}

/// Validate an environment variable value.
pub fn validate_env_value(name: &str, value: &str) -> Result<(), ValidationError> {
    if value.len() > MAX_ENV_VALUE_LEN {
        return Err(ValidationError::EnvValueTooLong {
            name: name.to_string(),
            max: MAX_ENV_VALUE_LEN,
        });
    }
    if value.contains('\0') {
        return Err(ValidationError::EnvValueNul {
            name: name.to_string(),
        });
    }
    if value
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
    {
        return Err(ValidationError::EnvValueControl {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Validate a URL path used for an HTTP probe (`/health`, `/api/ping?x=1`).
pub fn validate_url_path(path: &str) -> Result<(), ValidationError> {
    if !path.starts_with('/') {
        return Err(ValidationError::InvalidChars {
            field: "health check path",
            value: path.to_string(),
        });
    }
    if path.len() > MAX_PATH_LEN {
        return Err(ValidationError::TooLong {
            field: "health check path",
            max: MAX_PATH_LEN,
        });
    }
    if !path.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.' | '?' | '=' | '&' | '%')
    }) {
        return Err(ValidationError::InvalidChars {
            field: "health check path",
            value: path.to_string(),
        });
    }
    Ok(())
}
