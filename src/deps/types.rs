// ABOUTME: Provisioning plans and dependency check results.
// ABOUTME: Built fresh per check; never persisted on their own.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::diagnostics::Warning;
use crate::recipe::{Dependency, DependencyType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionAction {
    /// Start a new stack from a recipe.
    Deploy,
    /// Create a database inside the target's shared instance.
    CreateInShared,
    /// Configure a namespace inside the target's shared cache.
    ConfigureInShared,
}

impl ProvisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionAction::Deploy => "deploy",
            ProvisionAction::CreateInShared => "create_in_shared",
            ProvisionAction::ConfigureInShared => "configure_in_shared",
        }
    }
}

/// Planned action for one missing dependency. Estimates are heuristics for display.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionPlan {
    pub dep_type: DependencyType,
    pub action: ProvisionAction,
    /// Human label of the dependency being satisfied.
    pub name: String,
    /// Recipe to deploy for [`ProvisionAction::Deploy`].
    pub recipe_slug: Option<String>,
    pub shared: bool,
    #[serde(with = "humantime_serde")]
    pub estimated_time: Duration,
    pub ram_mb: u64,
    pub storage_gb: u64,
    pub config: BTreeMap<String, String>,
}

impl ProvisionPlan {
    pub fn describe(&self) -> String {
        match (&self.action, &self.recipe_slug) {
            (ProvisionAction::Deploy, Some(slug)) => format!("deploy {} for {}", slug, self.name),
            (action, _) => format!("{} {}", action.as_str().replace('_', " "), self.name),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingDependency {
    pub dependency: Dependency,
    /// Required dependencies are critical; recommended ones are not.
    pub critical: bool,
    pub can_auto_provision: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceImpact {
    pub ram_mb: u64,
    pub storage_gb: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyCheckResult {
    pub satisfied: bool,
    pub missing: Vec<MissingDependency>,
    pub plans: Vec<ProvisionPlan>,
    pub warnings: Vec<Warning>,
    #[serde(with = "humantime_serde")]
    pub estimated_time: Duration,
    pub resource_impact: ResourceImpact,
}

impl Default for DependencyCheckResult {
    fn default() -> Self {
        Self {
            satisfied: true,
            missing: Vec::new(),
            plans: Vec::new(),
            warnings: Vec::new(),
            estimated_time: Duration::ZERO,
            resource_impact: ResourceImpact::default(),
        }
    }
}

impl DependencyCheckResult {
    pub(crate) fn add_plan(&mut self, plan: ProvisionPlan) {
        self.estimated_time += plan.estimated_time;
        self.resource_impact.ram_mb += plan.ram_mb;
        self.resource_impact.storage_gb += plan.storage_gb;
        self.plans.push(plan);
    }

    /// Critical dependencies that no plan covers.
    pub fn unprovisionable(&self) -> impl Iterator<Item = &MissingDependency> {
        self.missing
            .iter()
            .filter(|m| m.critical && !m.can_auto_provision)
    }
}
