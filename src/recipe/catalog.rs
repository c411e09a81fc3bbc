// ABOUTME: Recipe lookup contract and an in-memory catalog.
// ABOUTME: The in-memory catalog can be populated from a directory of YAML files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;

use super::Recipe;

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to read recipe {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid recipe: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Looks up recipes by slug.
pub trait RecipeCatalog: Send + Sync {
    fn get(&self, slug: &str) -> Option<Recipe>;
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    recipes: RwLock<HashMap<String, Recipe>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, recipe: Recipe) {
        self.recipes.write().insert(recipe.slug.clone(), recipe);
    }

    /// Load every `*.yml` / `*.yaml` file in `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, RecipeError> {
        let catalog = Self::new();
        let entries = std::fs::read_dir(dir).map_err(|source| RecipeError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let path = entry
                .map_err(|source| RecipeError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yml" || e == "yaml");
            if is_yaml {
                let recipe = Recipe::load(&path)?;
                tracing::debug!(slug = %recipe.slug, path = %path.display(), "loaded recipe");
                catalog.insert(recipe);
            }
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.recipes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.read().is_empty()
    }
}

impl RecipeCatalog for InMemoryCatalog {
    fn get(&self, slug: &str) -> Option<Recipe> {
        self.recipes.read().get(slug).cloned()
    }
}
