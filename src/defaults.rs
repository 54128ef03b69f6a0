//! Default recipe and crafter selection

use std::collections::BTreeMap;

use crate::crafters::{CrafterRegistry, UNIT_EFFICIENCY};
use crate::error::{CalcError, Result};
use crate::graph::RecipeGraph;
use crate::models::{Crafter, Recipe};

/// A configured answer to "how is this resource obtained?"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Production {
    Recipe(String),
    /// Never expand production; only track consumption and supply
    Raw,
}

/// Immutable default choices.
///
/// Answers collected while resolving a query are applied by building a new
/// value with [`Defaults::with_recipe`] and friends, never by mutating the one
/// the session loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Defaults {
    recipes: BTreeMap<String, Production>,
    crafters: BTreeMap<String, String>,
}

impl Defaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipe(mut self, resource: impl Into<String>, recipe: impl Into<String>) -> Self {
        self.recipes
            .insert(resource.into(), Production::Recipe(recipe.into()));
        self
    }

    pub fn with_raw(mut self, resource: impl Into<String>) -> Self {
        self.recipes.insert(resource.into(), Production::Raw);
        self
    }

    pub fn with_crafter(mut self, recipe: impl Into<String>, crafter: impl Into<String>) -> Self {
        self.crafters.insert(recipe.into(), crafter.into());
        self
    }

    pub fn recipe_for(&self, resource: &str) -> Option<&Production> {
        self.recipes.get(resource)
    }

    pub fn crafter_for(&self, recipe: &str) -> Option<&str> {
        self.crafters.get(recipe).map(String::as_str)
    }

    pub fn recipe_defaults(&self) -> impl Iterator<Item = (&str, &Production)> {
        self.recipes.iter().map(|(r, p)| (r.as_str(), p))
    }

    pub fn crafter_defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.crafters.iter().map(|(r, c)| (r.as_str(), c.as_str()))
    }

    /// Check every default against the registries. Run once at load time.
    pub fn validate(&self, graph: &RecipeGraph, crafters: &CrafterRegistry) -> Result<()> {
        for (resource, production) in &self.recipes {
            if !graph.is_resource(resource) {
                return Err(CalcError::ConfigError(format!(
                    "default given for unknown resource '{}'",
                    resource
                )));
            }
            if let Production::Recipe(id) = production {
                let recipe = graph.recipe(id).map_err(|_| {
                    CalcError::ConfigError(format!(
                        "default for '{}' names unknown recipe '{}'",
                        resource, id
                    ))
                })?;
                if !recipe.produces(resource) {
                    return Err(CalcError::ConfigError(format!(
                        "default recipe '{}' does not produce '{}'",
                        id, resource
                    )));
                }
            }
        }

        for (recipe_id, crafter) in &self.crafters {
            let recipe = graph.recipe(recipe_id).map_err(|_| {
                CalcError::ConfigError(format!(
                    "crafter default given for unknown recipe '{}'",
                    recipe_id
                ))
            })?;
            if !crafters.contains(crafter) {
                return Err(CalcError::ConfigError(format!(
                    "crafter default for '{}' names unknown crafter '{}'",
                    recipe_id, crafter
                )));
            }
            if !recipe.is_unrestricted() && !recipe.crafters.contains(crafter) {
                return Err(CalcError::ConfigError(format!(
                    "crafter '{}' cannot run recipe '{}'",
                    crafter, recipe_id
                )));
            }
        }
        Ok(())
    }
}

/// How a resource will be obtained in a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Choice<'g> {
    Recipe(&'g Recipe),
    Raw,
}

/// Deterministic selection over the registries and a set of defaults
#[derive(Debug, Clone, Copy)]
pub struct DefaultResolver<'a> {
    graph: &'a RecipeGraph,
    crafters: &'a CrafterRegistry,
    defaults: &'a Defaults,
}

impl<'a> DefaultResolver<'a> {
    pub fn new(graph: &'a RecipeGraph, crafters: &'a CrafterRegistry, defaults: &'a Defaults) -> Self {
        DefaultResolver {
            graph,
            crafters,
            defaults,
        }
    }

    /// Pick the recipe that produces `resource`.
    ///
    /// A configured default wins; a single candidate is used as-is; no
    /// candidate means the resource is raw. Anything else needs a decision.
    pub fn producer(&self, resource: &str) -> Result<Choice<'a>> {
        match self.defaults.recipe_for(resource) {
            Some(Production::Raw) => return Ok(Choice::Raw),
            Some(Production::Recipe(id)) => return self.graph.recipe(id).map(Choice::Recipe),
            None => {}
        }

        let candidates = self.graph.producers(resource)?;
        match candidates.as_slice() {
            [] => Ok(Choice::Raw),
            [only] => Ok(Choice::Recipe(only)),
            many => Err(CalcError::AmbiguousChoice {
                resource: resource.to_string(),
                candidates: many.iter().map(|r| r.id.clone()).collect(),
            }),
        }
    }

    /// Pick the crafter for `recipe`. `None` is the neutral unit-efficiency crafter.
    pub fn crafter(&self, recipe: &Recipe) -> Result<Option<&'a Crafter>> {
        if let Some(id) = self.defaults.crafter_for(&recipe.id) {
            return self.crafters.get(id).map(Some);
        }
        match recipe.crafters.first() {
            Some(id) => self.crafters.get(id).map(Some),
            None => Ok(None),
        }
    }

    pub fn efficiency(&self, recipe: &Recipe) -> Result<f64> {
        Ok(self
            .crafter(recipe)?
            .map_or(UNIT_EFFICIENCY, |c| c.efficiency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iron_book() -> (RecipeGraph, CrafterRegistry) {
        let graph = RecipeGraph::new([
            Recipe::new("r_iron_smelt")
                .input("iron_ore", 1.0)
                .output("iron", 1.0)
                .with_crafter("furnace")
                .with_crafter("blast_furnace"),
            Recipe::new("r_iron_w")
                .input("iron_ore", 3.0)
                .input("planks", 2.0)
                .output("iron", 3.0),
        ])
        .unwrap();
        let crafters = CrafterRegistry::new([
            Crafter::new("furnace", 1.0),
            Crafter::new("blast_furnace", 2.0),
        ])
        .unwrap();
        (graph, crafters)
    }

    #[test]
    fn ambiguous_without_default() {
        let (graph, crafters) = iron_book();
        let defaults = Defaults::new();
        let resolver = DefaultResolver::new(&graph, &crafters, &defaults);

        match resolver.producer("iron") {
            Err(CalcError::AmbiguousChoice { resource, candidates }) => {
                assert_eq!(resource, "iron");
                assert_eq!(candidates, vec!["r_iron_smelt", "r_iron_w"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert_eq!(resolver.producer("iron_ore").unwrap(), Choice::Raw);
    }

    #[test]
    fn defaults_pick_recipe_or_raw() {
        let (graph, crafters) = iron_book();
        let defaults = Defaults::new().with_recipe("iron", "r_iron_w").with_raw("planks");
        let resolver = DefaultResolver::new(&graph, &crafters, &defaults);

        match resolver.producer("iron").unwrap() {
            Choice::Recipe(r) => assert_eq!(r.id, "r_iron_w"),
            Choice::Raw => panic!("expected a recipe"),
        }
        assert_eq!(resolver.producer("planks").unwrap(), Choice::Raw);
    }

    #[test]
    fn crafter_selection() {
        let (graph, crafters) = iron_book();
        let smelt = graph.recipe("r_iron_smelt").unwrap();
        let wrought = graph.recipe("r_iron_w").unwrap();

        let defaults = Defaults::new();
        let resolver = DefaultResolver::new(&graph, &crafters, &defaults);
        assert_eq!(resolver.efficiency(smelt).unwrap(), 1.0);
        assert_eq!(resolver.efficiency(wrought).unwrap(), UNIT_EFFICIENCY);

        let defaults = Defaults::new().with_crafter("r_iron_smelt", "blast_furnace");
        let resolver = DefaultResolver::new(&graph, &crafters, &defaults);
        assert_eq!(resolver.efficiency(smelt).unwrap(), 2.0);
    }

    #[test]
    fn validation_catches_bad_defaults() {
        let (graph, crafters) = iron_book();

        let ok = Defaults::new()
            .with_recipe("iron", "r_iron_w")
            .with_raw("iron_ore")
            .with_crafter("r_iron_smelt", "furnace");
        assert!(ok.validate(&graph, &crafters).is_ok());

        let wrong_output = Defaults::new().with_recipe("planks", "r_iron_w");
        let missing_recipe = Defaults::new().with_recipe("iron", "r_gold");
        let unknown_resource = Defaults::new().with_raw("gold");
        let unknown_crafter = Defaults::new().with_crafter("r_iron_smelt", "smoker");
        for bad in [wrong_output, missing_recipe, unknown_resource, unknown_crafter] {
            assert!(matches!(
                bad.validate(&graph, &crafters),
                Err(CalcError::ConfigError(_))
            ));
        }
    }

    #[test]
    fn crafter_must_be_permissible() {
        let graph = RecipeGraph::new([Recipe::new("r_bread")
            .input("wheat", 3.0)
            .output("bread", 1.0)
            .with_crafter("oven")])
        .unwrap();
        let crafters =
            CrafterRegistry::new([Crafter::new("oven", 1.0), Crafter::new("forge", 3.0)]).unwrap();

        let defaults = Defaults::new().with_crafter("r_bread", "forge");
        assert!(matches!(
            defaults.validate(&graph, &crafters),
            Err(CalcError::ConfigError(_))
        ));
    }
}
