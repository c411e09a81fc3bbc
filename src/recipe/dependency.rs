// ABOUTME: Declared recipe dependencies on infrastructure and other applications.
// ABOUTME: Each carries a kind, an optional engine/name, and provisioning preferences.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    ReverseProxy,
    Database,
    Cache,
    Application,
    Infrastructure,
    Backup,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::ReverseProxy => "reverse_proxy",
            DependencyType::Database => "database",
            DependencyType::Cache => "cache",
            DependencyType::Application => "application",
            DependencyType::Infrastructure => "infrastructure",
            DependencyType::Backup => "backup",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "type")]
    pub dep_type: DependencyType,

    /// Recipe slug for applications and dedicated instances, or the
    /// infrastructure component name.
    #[serde(default)]
    pub name: Option<String>,

    /// Database or cache engine (`postgres`, `mysql`, `redis`).
    #[serde(default)]
    pub engine: Option<String>,

    /// Required dependencies gate the deployment; recommended ones only warn.
    #[serde(default = "default_required")]
    pub required: bool,

    /// Use the target's shared instance instead of a dedicated one.
    #[serde(default)]
    pub shared: bool,

    #[serde(default)]
    pub auto_provision: bool,

    /// Preferred recipe slug (reverse proxies).
    #[serde(default)]
    pub preference: Option<String>,

    #[serde(default)]
    pub alternatives: Vec<String>,
}

fn default_required() -> bool {
    true
}

impl Dependency {
    pub fn new(dep_type: DependencyType) -> Self {
        Self {
            dep_type,
            name: None,
            engine: None,
            required: true,
            shared: false,
            auto_provision: false,
            preference: None,
            alternatives: Vec::new(),
        }
    }

    /// Human label used in logs and warnings.
    pub fn label(&self) -> String {
        match (self.name.as_deref(), self.engine.as_deref()) {
            (Some(name), _) => format!("{} '{}'", self.dep_type, name),
            (None, Some(engine)) => format!("{} '{}'", self.dep_type, engine),
            (None, None) => self.dep_type.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_required() {
        let dep: Dependency = serde_yaml::from_str("type: cache\nengine: redis").unwrap();
        assert!(dep.required);
        assert!(!dep.shared);
        assert_eq!(dep.dep_type, DependencyType::Cache);
        assert_eq!(dep.label(), "cache 'redis'");
    }

    #[test]
    fn parses_proxy_preferences() {
        let yaml = "type: reverse_proxy\npreference: caddy\nalternatives: [traefik]\nrequired: false";
        let dep: Dependency = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(dep.dep_type, DependencyType::ReverseProxy);
        assert_eq!(dep.preference.as_deref(), Some("caddy"));
        assert_eq!(dep.alternatives, vec!["traefik".to_string()]);
        assert!(!dep.required);
    }
}
