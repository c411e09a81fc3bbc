// ABOUTME: Deployment and removal requests handed to the orchestrator.
// ABOUTME: Both must pass validation before any remote command is built from them.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::validate::{
    ValidationError, validate_env_name, validate_env_value, validate_host, validate_name,
    validate_path,
};

use super::envfile::contains_terminator;

/// Manifest filename inside a stack's working directory.
pub const MANIFEST_FILE: &str = "docker-compose.yml";

/// Env filename inside a stack's working directory.
pub const ENV_FILE: &str = ".env";

/// Create or update a named stack on one target.
#[derive(Debug, Clone)]
pub struct DeploymentSpec {
    /// `host:port` of the target.
    pub host: String,
    pub stack_name: String,
    /// Remote directory holding the manifest and env file.
    pub working_dir: String,
    pub manifest: String,
    /// Sorted so the env file is byte-for-byte reproducible.
    pub env: BTreeMap<String, String>,
    /// Bound for starting the stack; the orchestrator default applies when unset.
    pub timeout: Option<Duration>,
}

impl DeploymentSpec {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_host(&self.host)?;
        validate_name("stack name", &self.stack_name)?;
        validate_path("working directory", &self.working_dir)?;
        for (name, value) in &self.env {
            validate_env_name(name)?;
            validate_env_value(name, value)?;
        }
        if contains_terminator(&self.manifest) {
            return Err(ValidationError::HeredocTerminator);
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> Result<String, ValidationError> {
        join_path(&self.working_dir, MANIFEST_FILE)
    }

    pub fn env_path(&self) -> Result<String, ValidationError> {
        join_path(&self.working_dir, ENV_FILE)
    }
}

/// Tear down a stack and, optionally, its working directory.
#[derive(Debug, Clone)]
pub struct RemovalSpec {
    pub host: String,
    pub stack_name: String,
    pub working_dir: Option<String>,
    /// Single container to force-remove if compose leaves it behind.
    pub container_name: Option<String>,
    pub include_volumes: bool,
    pub timeout: Option<Duration>,
}

impl RemovalSpec {
    pub fn new(host: impl Into<String>, stack_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            stack_name: stack_name.into(),
            working_dir: None,
            container_name: None,
            include_volumes: false,
            timeout: None,
        }
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_host(&self.host)?;
        validate_name("stack name", &self.stack_name)?;
        if let Some(dir) = &self.working_dir {
            validate_path("working directory", dir)?;
        }
        if let Some(container) = &self.container_name {
            validate_name("container name", container)?;
        }
        Ok(())
    }
}

/// Working directory for `stack` under the configured stacks root.
pub fn stack_dir(stacks_dir: &str, stack: &str) -> Result<String, ValidationError> {
    validate_name("stack name", stack)?;
    join_path(stacks_dir, stack)
}

/// Join and re-validate, so concatenation cannot produce an unsafe path.
pub(crate) fn join_path(dir: &str, file: &str) -> Result<String, ValidationError> {
    let joined = format!("{}/{}", dir.trim_end_matches('/'), file);
    validate_path("file path", &joined)?;
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DeploymentSpec {
        DeploymentSpec {
            host: "10.0.0.5:22".to_string(),
            stack_name: "wiki-1a2b3c4d".to_string(),
            working_dir: "/opt/stackwright/stacks/wiki-1a2b3c4d".to_string(),
            manifest: "services: {}".to_string(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(spec().validate().is_ok());
        assert_eq!(
            spec().manifest_path().unwrap(),
            "/opt/stackwright/stacks/wiki-1a2b3c4d/docker-compose.yml"
        );
    }

    #[test]
    fn stack_name_with_metacharacters_fails() {
        for bad in ["wiki;reboot", "wiki app", "wiki/app"] {
            let mut s = spec();
            s.stack_name = bad.to_string();
            let err = s.validate().unwrap_err();
            assert!(err.to_string().contains("invalid characters"), "{bad}");
        }
    }

    #[test]
    fn env_is_validated() {
        let mut s = spec();
        s.env.insert("BAD-NAME".into(), "x".into());
        assert!(s.validate().is_err());

        let mut s = spec();
        s.env.insert("OK".into(), "bell\x07".into());
        assert!(s.validate().is_err());
    }

    #[test]
    fn manifest_cannot_close_heredoc() {
        let mut s = spec();
        s.manifest = format!("a: 1\n{}\nrm -rf /", super::super::envfile::HEREDOC_TERMINATOR);
        assert_eq!(s.validate(), Err(ValidationError::HeredocTerminator));
    }

    #[test]
    fn stack_dir_joins_under_root() {
        assert_eq!(
            stack_dir("/opt/stackwright/stacks/", "wiki-1").unwrap(),
            "/opt/stackwright/stacks/wiki-1"
        );
        assert!(stack_dir("/opt/stacks", "..").is_err());
    }

    #[test]
    fn removal_spec_validates_optional_fields() {
        let ok = RemovalSpec::new("h:22", "wiki-1").working_dir("/srv/wiki-1");
        assert!(ok.validate().is_ok());

        let bad_dir = RemovalSpec::new("h:22", "wiki-1").working_dir("~/wiki");
        assert!(bad_dir.validate().is_err());

        let mut bad_container = RemovalSpec::new("h:22", "wiki-1");
        bad_container.container_name = Some("x;y".into());
        assert!(bad_container.validate().is_err());
    }
}
