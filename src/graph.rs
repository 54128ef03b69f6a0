//! Recipe graph: recipes and the resources they connect

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{CalcError, Result};
use crate::models::{Recipe, Target};

/// Immutable bipartite graph of resources and recipes.
///
/// Built once from a validated recipe list, then shared read-only by every
/// resolution run.
#[derive(Debug, Clone, Default)]
pub struct RecipeGraph {
    recipes: Vec<Recipe>,
    index: HashMap<String, usize>,
    producers: BTreeMap<String, Vec<usize>>,
    resources: BTreeSet<String>,
}

impl RecipeGraph {
    pub fn new(recipes: impl IntoIterator<Item = Recipe>) -> Result<Self> {
        let mut graph = RecipeGraph::default();

        for recipe in recipes {
            validate_recipe(&recipe)?;
            if graph.index.contains_key(&recipe.id) {
                return Err(CalcError::ConfigError(format!(
                    "recipe '{}' is defined twice",
                    recipe.id
                )));
            }

            let slot = graph.recipes.len();
            for (resource, _) in recipe.inputs.iter().chain(&recipe.outputs) {
                graph.resources.insert(resource.clone());
            }
            for (resource, quantity) in &recipe.outputs {
                if *quantity > 0.0 {
                    graph.producers.entry(resource.clone()).or_default().push(slot);
                }
            }
            graph.index.insert(recipe.id.clone(), slot);
            graph.recipes.push(recipe);
        }

        // Identifiers are looked up in either namespace, so they must not overlap
        if let Some(clash) = graph.resources.iter().find(|r| graph.index.contains_key(*r)) {
            return Err(CalcError::ConfigError(format!(
                "'{}' is used both as a recipe and as a resource",
                clash
            )));
        }

        Ok(graph)
    }

    pub fn recipe(&self, id: &str) -> Result<&Recipe> {
        self.index
            .get(id)
            .map(|&slot| &self.recipes[slot])
            .ok_or_else(|| CalcError::not_found("recipe", id))
    }

    /// Recipes that output `resource` with a positive quantity, in definition order
    pub fn producers(&self, resource: &str) -> Result<Vec<&Recipe>> {
        if !self.is_resource(resource) {
            return Err(CalcError::not_found("resource", resource));
        }
        Ok(self
            .producers
            .get(resource)
            .map(|slots| slots.iter().map(|&s| &self.recipes[s]).collect())
            .unwrap_or_default())
    }

    /// Recipes that take `resource` as an input
    pub fn consumers(&self, resource: &str) -> Vec<&Recipe> {
        self.recipes.iter().filter(|r| r.consumes(resource)).collect()
    }

    pub fn is_recipe(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn is_resource(&self, id: &str) -> bool {
        self.resources.contains(id)
    }

    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(String::as_str)
    }

    /// Turn a bare identifier from a request into a typed target
    pub fn classify(&self, id: &str, amount: f64) -> Result<Target> {
        if self.is_recipe(id) {
            Ok(Target::recipe(id, amount))
        } else if self.is_resource(id) {
            Ok(Target::resource(id, amount))
        } else {
            Err(CalcError::UnknownTarget(id.to_string()))
        }
    }
}

fn validate_recipe(recipe: &Recipe) -> Result<()> {
    let fail = |msg: String| -> Result<()> {
        Err(CalcError::ConfigError(format!(
            "recipe '{}': {}",
            recipe.id, msg
        )))
    };

    if recipe.inputs.is_empty() && recipe.outputs.is_empty() {
        return fail("has neither inputs nor outputs".into());
    }
    if !(recipe.duration.is_finite() && recipe.duration > 0.0) {
        return fail(format!("duration must be positive, got {}", recipe.duration));
    }
    for (resource, quantity) in recipe.inputs.iter().chain(&recipe.outputs) {
        if !(quantity.is_finite() && *quantity >= 0.0) {
            return fail(format!("invalid quantity {} for '{}'", quantity, resource));
        }
    }
    if let Some((resource, _)) = recipe
        .inputs
        .iter()
        .find(|(r, _)| recipe.outputs.iter().any(|(o, _)| o == r))
    {
        return fail(format!("'{}' is both an input and an output", resource));
    }
    let mut seen = BTreeSet::new();
    for (resource, _) in recipe.inputs.iter().chain(&recipe.outputs) {
        if !seen.insert(resource.as_str()) {
            return fail(format!("'{}' is listed twice", resource));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planks() -> Recipe {
        Recipe::new("r_planks").input("wood", 1.0).output("planks", 4.0)
    }

    #[test]
    fn producers_skip_zero_outputs() {
        let graph = RecipeGraph::new([
            planks(),
            Recipe::new("r_burn").input("planks", 1.0).output("wood", 0.0),
        ])
        .unwrap();

        let producers = graph.producers("planks").unwrap();
        assert_eq!(producers.len(), 1);
        assert_eq!(producers[0].id, "r_planks");
        assert!(graph.producers("wood").unwrap().is_empty());
        assert!(matches!(
            graph.producers("stone"),
            Err(CalcError::NotFound { .. })
        ));
    }

    #[test]
    fn rejects_namespace_clash() {
        let err = RecipeGraph::new([
            planks(),
            Recipe::new("wood").input("dirt", 1.0).output("sapling", 1.0),
        ])
        .unwrap_err();
        assert!(matches!(err, CalcError::ConfigError(_)));
    }

    #[test]
    fn rejects_malformed_recipes() {
        assert!(RecipeGraph::new([Recipe::new("empty")]).is_err());
        assert!(RecipeGraph::new([planks().with_duration(0.0)]).is_err());
        assert!(RecipeGraph::new([Recipe::new("neg").output("a", -1.0)]).is_err());
        assert!(RecipeGraph::new([Recipe::new("loop").input("a", 1.0).output("a", 2.0)]).is_err());
        assert!(RecipeGraph::new([planks(), planks()]).is_err());
    }

    #[test]
    fn classify_resolves_namespaces() {
        let graph = RecipeGraph::new([planks()]).unwrap();
        assert_eq!(graph.classify("planks", 12.0).unwrap(), Target::resource("planks", 12.0));
        assert_eq!(graph.classify("r_planks", 2.0).unwrap(), Target::recipe("r_planks", 2.0));
        assert_eq!(
            graph.classify("piston", 1.0).unwrap_err(),
            CalcError::UnknownTarget("piston".into())
        );
    }
}
