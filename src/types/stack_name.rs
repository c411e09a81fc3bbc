// ABOUTME: Validated compose project name for one deployment attempt.
// ABOUTME: Generated as recipe slug plus a random suffix, safe to put on a command line.

use crate::validate::{ValidationError, validate_name};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the random suffix appended to generated stack names.
const SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StackName(String);

impl StackName {
    pub fn new(value: &str) -> Result<Self, ValidationError> {
        validate_name("stack name", value)?;
        Ok(Self(value.to_string()))
    }

    /// Generate a unique stack name for a recipe: `<slug>-<8 hex chars>`.
    ///
    /// Characters outside the allowed set are folded to `-` and the slug is
    /// lowercased, so any catalog slug yields a valid name.
    pub fn generate(slug: &str) -> Self {
        let prefix = Self::prefix_for(slug);
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}{}", prefix, &suffix[..SUFFIX_LEN]))
    }

    /// The prefix shared by every stack generated for `slug` (`<slug>-`).
    pub fn prefix_for(slug: &str) -> String {
        let mut cleaned: String = slug
            .to_ascii_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        if cleaned.is_empty() {
            cleaned.push_str("stack");
        }
        // Leave room for "-" plus the suffix within the name limit.
        cleaned.truncate(crate::validate::MAX_NAME_LEN - SUFFIX_LEN - 1);
        format!("{}-", cleaned)
    }

    /// Whether `project` is `prefix` followed by exactly a generated suffix.
    ///
    /// `postgres-` matches `postgres-1a2b3c4d` but not `postgres-exporter-1a2b3c4d`.
    pub fn is_generated_with(project: &str, prefix: &str) -> bool {
        project.strip_prefix(prefix).is_some_and(|suffix| {
            suffix.len() == SUFFIX_LEN
                && suffix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StackName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<StackName> for String {
    fn from(name: StackName) -> Self {
        name.0
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_carry_slug_prefix() {
        let name = StackName::generate("nextcloud");
        assert!(name.as_str().starts_with("nextcloud-"));
        assert_eq!(name.as_str().len(), "nextcloud-".len() + SUFFIX_LEN);
        assert!(StackName::new(name.as_str()).is_ok());
    }

    #[test]
    fn generated_names_differ_per_attempt() {
        assert_ne!(StackName::generate("app"), StackName::generate("app"));
    }

    #[test]
    fn unsafe_slug_is_folded() {
        let name = StackName::generate("My App/v2");
        assert!(name.as_str().starts_with("my-app-v2-"));
    }

    #[test]
    fn generated_match_requires_exact_suffix() {
        let prefix = StackName::prefix_for("postgres");
        let name = StackName::generate("postgres");
        assert!(StackName::is_generated_with(name.as_str(), &prefix));
        assert!(!StackName::is_generated_with("postgres-exporter-1a2b3c4d", &prefix));
        assert!(!StackName::is_generated_with("postgres-1a2b3c4", &prefix));
        assert!(!StackName::is_generated_with("postgres-1A2B3C4D", &prefix));
        assert!(!StackName::is_generated_with("pg-1a2b3c4d", &prefix));
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(StackName::new("bad name").is_err());
        assert!(StackName::new("").is_err());
    }
}
