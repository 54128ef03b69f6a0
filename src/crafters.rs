//! Crafter registry

use std::collections::BTreeMap;

use crate::error::{CalcError, Result};
use crate::graph::RecipeGraph;
use crate::models::Crafter;

/// Efficiency used for recipes that do not restrict their crafters
pub const UNIT_EFFICIENCY: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct CrafterRegistry {
    crafters: BTreeMap<String, Crafter>,
}

impl CrafterRegistry {
    pub fn new(crafters: impl IntoIterator<Item = Crafter>) -> Result<Self> {
        let mut registry = CrafterRegistry::default();
        for crafter in crafters {
            if !(crafter.efficiency.is_finite() && crafter.efficiency > 0.0) {
                return Err(CalcError::ConfigError(format!(
                    "crafter '{}' has non-positive efficiency {}",
                    crafter.id, crafter.efficiency
                )));
            }
            if registry.crafters.contains_key(&crafter.id) {
                return Err(CalcError::ConfigError(format!(
                    "crafter '{}' is defined twice",
                    crafter.id
                )));
            }
            registry.crafters.insert(crafter.id.clone(), crafter);
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Result<&Crafter> {
        self.crafters
            .get(id)
            .ok_or_else(|| CalcError::not_found("crafter", id))
    }

    pub fn efficiency(&self, id: &str) -> Result<f64> {
        self.get(id).map(|c| c.efficiency)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.crafters.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Crafter> {
        self.crafters.values()
    }

    /// Every crafter a recipe names must be registered
    pub fn validate_against(&self, graph: &RecipeGraph) -> Result<()> {
        for recipe in graph.recipes() {
            if let Some(missing) = recipe.crafters.iter().find(|c| !self.contains(c)) {
                return Err(CalcError::ConfigError(format!(
                    "recipe '{}' names undefined crafter '{}'",
                    recipe.id, missing
                )));
            }
        }
        Ok(())
    }
}
