// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Drain collected warnings, leaving the accumulator empty.
    pub fn take(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The stack is up but its HTTP endpoint did not answer as expected.
    pub fn http_probe(message: impl Into<String>) -> Self {
        Self::new(WarningKind::HttpProbe, message)
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Cleanup, message)
    }

    pub fn nested_dependency(message: impl Into<String>) -> Self {
        Self::new(WarningKind::NestedDependency, message)
    }

    pub fn unsatisfied_dependency(message: impl Into<String>) -> Self {
        Self::new(WarningKind::UnsatisfiedDependency, message)
    }

    pub fn not_provisionable(message: impl Into<String>) -> Self {
        Self::new(WarningKind::NotProvisionable, message)
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    HttpProbe,
    /// A best-effort cleanup phase failed; remote resources may remain.
    Cleanup,
    /// Dependencies of an auto-provisioned application were not resolved.
    NestedDependency,
    /// A recommended or unprovisioned dependency is missing.
    UnsatisfiedDependency,
    /// Auto-provisioning was requested but no plan could be built.
    NotProvisionable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_and_drains() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::http_probe("expected HTTP 200, got 502"));
        diag.warn(Warning::cleanup("rm failed"));

        assert_eq!(diag.warnings().len(), 2);
        let drained = diag.take();
        assert_eq!(drained.len(), 2);
        assert!(!diag.has_warnings());
    }

    #[test]
    fn warning_constructors_set_correct_kind() {
        assert_eq!(Warning::http_probe("x").kind, WarningKind::HttpProbe);
        assert_eq!(
            Warning::nested_dependency("x").kind,
            WarningKind::NestedDependency
        );
        assert_eq!(
            Warning::not_provisionable("x").kind,
            WarningKind::NotProvisionable
        );
    }
}
