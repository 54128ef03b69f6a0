//! A loaded, validated recipe book

use crate::calculator::{self, Resolution};
use crate::crafters::CrafterRegistry;
use crate::defaults::Defaults;
use crate::error::{CalcError, Result};
use crate::graph::RecipeGraph;
use crate::models::{Crafter, Inventory, Recipe, Target};
use crate::settings::Settings;

/// Registries for one session, checked against each other once at load time
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    pub graph: RecipeGraph,
    pub crafters: CrafterRegistry,
    pub defaults: Defaults,
    pub inventory: Inventory,
}

impl RecipeBook {
    pub fn new(
        recipes: Vec<Recipe>,
        crafters: Vec<Crafter>,
        defaults: Defaults,
        inventory: Inventory,
    ) -> Result<Self> {
        let graph = RecipeGraph::new(recipes)?;
        let crafters = CrafterRegistry::new(crafters)?;
        crafters.validate_against(&graph)?;
        defaults.validate(&graph, &crafters)?;

        if let Some((resource, _)) = inventory.iter().find(|(r, _)| !graph.is_resource(r)) {
            return Err(CalcError::ConfigError(format!(
                "inventory lists unknown resource '{}'",
                resource
            )));
        }

        Ok(RecipeBook {
            graph,
            crafters,
            defaults,
            inventory,
        })
    }

    /// Resolve against the book's own defaults and inventory
    pub fn resolve(&self, targets: &[Target], settings: &Settings) -> Result<Resolution> {
        calculator::resolve(
            targets,
            &self.graph,
            &self.crafters,
            &self.defaults,
            &self.inventory,
            settings,
        )
    }
}
