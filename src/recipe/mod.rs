// ABOUTME: Recipe definitions: manifest template, config options, dependencies, health probe.
// ABOUTME: Recipes are read-only inputs supplied by a catalog.

mod catalog;
mod dependency;

pub use catalog::{InMemoryCatalog, RecipeCatalog, RecipeError};
pub use dependency::{Dependency, DependencyType};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// User-supplied configuration values keyed by option name.
pub type ConfigValues = BTreeMap<String, Value>;

/// Placeholder used for text options without a default during dry-run renders.
const DRY_RUN_PLACEHOLDER: &str = "placeholder";

/// A packaged application definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub slug: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Compose manifest template, rendered against the deployment config.
    pub template: String,

    #[serde(default)]
    pub options: Vec<ConfigOption>,

    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    #[serde(default)]
    pub health_check: Option<HttpHealthCheck>,

    #[serde(default)]
    pub resources: ResourceEstimate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    #[default]
    String,
    Password,
    #[serde(alias = "integer", alias = "number")]
    Int,
    #[serde(alias = "boolean")]
    Bool,
    Email,
    Url,
    Select,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption {
    pub name: String,

    #[serde(rename = "type", default)]
    pub option_type: OptionType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default)]
    pub description: String,

    /// Export this option's value into the stack's env file under this name.
    #[serde(default)]
    pub env: Option<String>,
}

impl ConfigOption {
    fn dry_run_value(&self) -> Value {
        if let Some(default) = &self.default {
            return default.clone();
        }
        match self.option_type {
            OptionType::Int => Value::from(0),
            OptionType::Bool => Value::Bool(false),
            _ => Value::String(DRY_RUN_PLACEHOLDER.to_string()),
        }
    }
}

/// HTTP probe issued from the target after the stack is up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpHealthCheck {
    pub path: String,
    pub port: u16,

    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_expected_status() -> u16 {
    200
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Declared footprint of a recipe, used for provisioning estimates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEstimate {
    #[serde(default)]
    pub ram_mb: u64,

    #[serde(default)]
    pub storage_gb: u64,

    #[serde(default = "default_setup_time", with = "humantime_serde")]
    pub setup_time: Duration,
}

impl Default for ResourceEstimate {
    fn default() -> Self {
        Self {
            ram_mb: 0,
            storage_gb: 0,
            setup_time: default_setup_time(),
        }
    }
}

fn default_setup_time() -> Duration {
    Duration::from_secs(60)
}

impl Recipe {
    pub fn from_yaml(yaml: &str) -> Result<Self, RecipeError> {
        serde_yaml::from_str(yaml).map_err(RecipeError::from)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, RecipeError> {
        let content = std::fs::read_to_string(path).map_err(|source| RecipeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn option(&self, name: &str) -> Option<&ConfigOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Declared defaults only.
    pub fn default_values(&self) -> ConfigValues {
        self.options
            .iter()
            .filter_map(|o| o.default.clone().map(|v| (o.name.clone(), v)))
            .collect()
    }

    /// A value for every option: its default, or a type-appropriate placeholder.
    pub fn dry_run_values(&self) -> ConfigValues {
        self.options
            .iter()
            .map(|o| (o.name.clone(), o.dry_run_value()))
            .collect()
    }

    /// Defaults overlaid with user values.
    pub fn effective_values(&self, user: &ConfigValues) -> ConfigValues {
        let mut values = self.default_values();
        values.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }

    /// Names of required options that are absent, null, or an empty string.
    pub fn missing_required(&self, values: &ConfigValues) -> Vec<String> {
        self.options
            .iter()
            .filter(|o| o.required)
            .filter(|o| match values.get(&o.name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            })
            .map(|o| o.name.clone())
            .collect()
    }

    /// Env file entries for options that declare `env:`, taken from `values`.
    pub fn env_exports(&self, values: &ConfigValues) -> BTreeMap<String, String> {
        self.options
            .iter()
            .filter_map(|o| {
                let name = o.env.as_ref()?;
                let value = values.get(&o.name)?;
                Some((name.clone(), value_to_string(value)))
            })
            .collect()
    }

    /// Dependencies flagged as required.
    pub fn required_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| d.required)
    }

    /// Interpret a textual value (e.g. from `--set`) according to the option's type.
    /// Unknown options and unparseable numbers or booleans stay strings.
    pub fn coerce_value(&self, name: &str, raw: &str) -> Value {
        let option_type = self.option(name).map(|o| o.option_type);
        match option_type {
            Some(OptionType::Int) => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(raw)),
            Some(OptionType::Bool) => raw
                .parse::<bool>()
                .map(Value::Bool)
                .unwrap_or_else(|_| Value::from(raw)),
            _ => Value::from(raw),
        }
    }
}

/// Render a config value as plain text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = r#"
slug: wiki
name: Wiki
template: "image: wiki:{{ .version }}"
options:
  - name: version
    default: "1.2"
  - name: domain
    required: true
  - name: admin_password
    type: password
    required: true
    env: ADMIN_PASSWORD
  - name: workers
    type: int
  - name: debug
    type: bool
health_check:
  path: /health
  port: 8080
resources:
  ram_mb: 256
  setup_time: 90s
"#;

    #[test]
    fn parses_recipe_yaml() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        assert_eq!(recipe.slug, "wiki");
        assert_eq!(recipe.options.len(), 5);
        assert_eq!(
            recipe.option("admin_password").unwrap().env.as_deref(),
            Some("ADMIN_PASSWORD")
        );
        let hc = recipe.health_check.unwrap();
        assert_eq!(hc.expected_status, 200);
        assert_eq!(hc.timeout, Duration::from_secs(10));
        assert_eq!(recipe.resources.setup_time, Duration::from_secs(90));
    }

    #[test]
    fn env_exports_only_declared_options() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        let mut user = ConfigValues::new();
        user.insert("admin_password".into(), Value::from("s3cret"));
        user.insert("domain".into(), Value::from("wiki.example"));
        let env = recipe.env_exports(&recipe.effective_values(&user));
        assert_eq!(env.len(), 1);
        assert_eq!(env["ADMIN_PASSWORD"], "s3cret");
    }

    #[test]
    fn coerce_value_follows_option_type() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        assert_eq!(recipe.coerce_value("workers", "4"), Value::from(4));
        assert_eq!(recipe.coerce_value("workers", "four"), Value::from("four"));
        assert_eq!(recipe.coerce_value("debug", "true"), Value::Bool(true));
        assert_eq!(recipe.coerce_value("version", "2"), Value::from("2"));
        assert_eq!(recipe.coerce_value("unknown", "x"), Value::from("x"));
    }

    #[test]
    fn dry_run_values_cover_every_option() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        let values = recipe.dry_run_values();
        assert_eq!(values["version"], Value::from("1.2"));
        assert_eq!(values["domain"], Value::from("placeholder"));
        assert_eq!(values["workers"], Value::from(0));
        assert_eq!(values["debug"], Value::Bool(false));
    }

    #[test]
    fn missing_required_counts_empty_strings() {
        let recipe = Recipe::from_yaml(RECIPE).unwrap();
        let mut user = ConfigValues::new();
        user.insert("domain".into(), Value::from(""));
        let values = recipe.effective_values(&user);
        assert_eq!(
            recipe.missing_required(&values),
            vec!["domain".to_string(), "admin_password".to_string()]
        );
    }

    #[test]
    fn value_to_string_formats_scalars() {
        assert_eq!(value_to_string(&Value::from("x")), "x");
        assert_eq!(value_to_string(&Value::from(8)), "8");
        assert_eq!(value_to_string(&Value::Bool(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "");
    }
}
