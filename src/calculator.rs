//! Demand resolution: batch counts and resource flows for a set of targets
//!
//! A query is expanded in two steps. A planning walk starting at the targets
//! picks a producing recipe for every resource that will be needed. Where it
//! finds a loop that consumes more than it returns, it cuts the loop at its
//! weakest link. Batch counts are then found by fixed-point iteration: each
//! pass sweeps the planned recipes and updates their batches in place from
//! the current demand, until no count moves by more than the tolerance.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use tracing::{debug, info, warn};

use crate::crafters::CrafterRegistry;
use crate::defaults::{Choice, DefaultResolver, Defaults};
use crate::error::{CalcError, Result};
use crate::graph::RecipeGraph;
use crate::models::{Inventory, Recipe, RoundingPolicy, Target};
use crate::settings::{FlowMode, Settings};

/// Slack applied before rounding so float noise like 3.0000000001 stays 3
const ROUNDING_SLACK: f64 = 1e-9;

/// One row of the batch table
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub recipe: String,
    pub batches: f64,
    /// `None` when the recipe runs on the neutral unit-efficiency crafter
    pub crafter: Option<String>,
    /// Base duration divided by crafter efficiency
    pub effective_duration: f64,
}

impl BatchRow {
    /// Crafter-seconds for a one-shot run, or crafters needed in parallel
    /// when batches are a per-second rate.
    pub fn crafter_time(&self) -> f64 {
        self.batches * self.effective_duration
    }
}

/// One row of the flow table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowRow {
    /// Amount that must remain after production
    pub requested: f64,
    /// Total consumed as a recipe input
    pub used: f64,
    /// Amount on hand at the start of the run
    pub supplied: f64,
    /// Supply not consumed by production
    pub leftover: f64,
    pub produced: f64,
    /// Production beyond what was needed
    pub excess: f64,
    /// Shortfall that has to be gathered from outside the chain
    pub external: f64,
}

/// Result of one query. Never outlives it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub batches: BTreeMap<String, BatchRow>,
    pub flows: BTreeMap<String, FlowRow>,
    pub iterations: usize,
    pub mode: FlowMode,
}

impl Resolution {
    /// Batches scheduled for `recipe` (0 if it does not run)
    pub fn batches_of(&self, recipe: &str) -> f64 {
        self.batches.get(recipe).map_or(0.0, |row| row.batches)
    }

    pub fn flow(&self, resource: &str) -> Option<&FlowRow> {
        self.flows.get(resource)
    }

    /// Resources that must come from outside, sorted by name
    pub fn external_inputs(&self) -> Vec<(&str, f64)> {
        self.flows
            .iter()
            .filter(|(_, f)| f.external > 0.0)
            .map(|(r, f)| (r.as_str(), f.external))
            .collect()
    }
}

/// Resolve `targets` into batch and flow tables.
///
/// Registries are only read. The run keeps its own accumulators, so a failed
/// query leaves nothing behind.
pub fn resolve(
    targets: &[Target],
    graph: &RecipeGraph,
    crafters: &CrafterRegistry,
    defaults: &Defaults,
    inventory: &Inventory,
    settings: &Settings,
) -> Result<Resolution> {
    settings.validate()?;

    let resolver = DefaultResolver::new(graph, crafters, defaults);
    let mut run = Run::seed(graph, resolver, targets, inventory)?;
    run.plan()?;
    let iterations = run.iterate(settings)?;
    run.finish(iterations, settings.mode)
}

/// Per-resource totals implied by a set of batch counts
#[derive(Debug, Default)]
struct Tally<'a> {
    /// All input consumption
    demand: HashMap<&'a str, f64>,
    /// Consumption that drives upstream production (recycled inputs excluded)
    driving: HashMap<&'a str, f64>,
    produced: HashMap<&'a str, f64>,
}

impl Tally<'_> {
    fn demand(&self, resource: &str) -> f64 {
        self.demand.get(resource).copied().unwrap_or(0.0)
    }

    fn driving(&self, resource: &str) -> f64 {
        self.driving.get(resource).copied().unwrap_or(0.0)
    }

    fn produced(&self, resource: &str) -> f64 {
        self.produced.get(resource).copied().unwrap_or(0.0)
    }
}

/// Mutable state owned by a single resolution
struct Run<'a> {
    graph: &'a RecipeGraph,
    resolver: DefaultResolver<'a>,
    requested: BTreeMap<&'a str, f64>,
    supply: HashMap<&'a str, f64>,
    min_batches: BTreeMap<&'a str, f64>,
    /// Producer chosen for every resource the plan needs
    choices: HashMap<&'a str, Choice<'a>>,
    /// Recipes in the order the planning walk reached them
    planned: Vec<&'a Recipe>,
    /// (recipe, input) pairs cut out of a loop that loses material
    recycled: HashSet<(&'a str, &'a str)>,
    /// Parallel to `planned`
    batches: Vec<f64>,
}

/// One resource handed from a producer to a consumer inside a loop
struct Link<'a> {
    consumer: &'a str,
    resource: &'a str,
    /// Amount produced per amount consumed
    ratio: f64,
}

impl<'a> Run<'a> {
    fn seed(
        graph: &'a RecipeGraph,
        resolver: DefaultResolver<'a>,
        targets: &'a [Target],
        inventory: &'a Inventory,
    ) -> Result<Self> {
        let mut requested: BTreeMap<&str, f64> = BTreeMap::new();
        let mut min_batches: BTreeMap<&str, f64> = BTreeMap::new();

        for target in targets {
            let amount = target.amount();
            if !(amount.is_finite() && amount >= 0.0) {
                return Err(CalcError::InvalidTarget {
                    id: target.id().to_string(),
                    reason: format!("quantity must be a non-negative number, got {}", amount),
                });
            }
            match target {
                Target::Resource { id, quantity } => {
                    if !graph.is_resource(id) {
                        return Err(CalcError::UnknownTarget(id.clone()));
                    }
                    *requested.entry(id.as_str()).or_default() += quantity;
                }
                Target::Recipe { id, batches } => {
                    if !graph.is_recipe(id) {
                        return Err(CalcError::UnknownTarget(id.clone()));
                    }
                    *min_batches.entry(id.as_str()).or_default() += batches;
                }
            }
        }

        let supply = inventory.iter().filter(|(_, a)| *a > 0.0).collect();

        Ok(Run {
            graph,
            resolver,
            requested,
            supply,
            min_batches,
            choices: HashMap::new(),
            planned: Vec::new(),
            recycled: HashSet::new(),
            batches: Vec::new(),
        })
    }

    fn choose(&mut self, resource: &'a str) -> Result<Choice<'a>> {
        if let Some(choice) = self.choices.get(resource) {
            return Ok(*choice);
        }
        let choice = self.resolver.producer(resource)?;
        self.choices.insert(resource, choice);
        Ok(choice)
    }

    /// Walk from the targets and fix the set of recipes that may run.
    ///
    /// Roots are taken in name order (resources, then recipes) so the plan
    /// does not depend on how the request was written.
    fn plan(&mut self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        let resources: Vec<&'a str> = self.requested.keys().copied().collect();
        for resource in resources {
            if let Choice::Recipe(recipe) = self.choose(resource)? {
                self.visit(recipe, resource, &mut path, &mut visited)?;
            }
        }
        let recipes: Vec<&'a str> = self.min_batches.keys().copied().collect();
        for id in recipes {
            let recipe = self.graph.recipe(id)?;
            self.visit(recipe, id, &mut path, &mut visited)?;
        }

        debug!(
            recipes = self.planned.len(),
            recycled = self.recycled.len(),
            "plan ready"
        );
        self.batches = vec![0.0; self.planned.len()];
        Ok(())
    }

    /// Depth-first walk. `path` holds each open recipe with the resource it
    /// was reached for.
    fn visit(
        &mut self,
        recipe: &'a Recipe,
        reached_for: &'a str,
        path: &mut Vec<(&'a Recipe, &'a str)>,
        visited: &mut HashSet<&'a str>,
    ) -> Result<()> {
        if !visited.insert(recipe.id.as_str()) {
            return Ok(());
        }
        self.planned.push(recipe);
        path.push((recipe, reached_for));

        for (input, _) in &recipe.inputs {
            let producer = match self.choose(input)? {
                Choice::Recipe(producer) => producer,
                Choice::Raw => continue,
            };
            match path.iter().position(|(open, _)| open.id == producer.id) {
                Some(start) => self.close_loop(&path[start..], input),
                None => self.visit(producer, input, path, visited)?,
            }
        }

        path.pop();
        Ok(())
    }

    /// `cycle` runs from the producer of `input` down to the recipe consuming it.
    ///
    /// A loop that returns less than it consumes can never pay for itself, so
    /// its weakest link is cut: that input no longer drives upstream production
    /// and is limited to what exists. Loops that gain are left to the
    /// fixed point.
    fn close_loop(&mut self, cycle: &[(&'a Recipe, &'a str)], input: &'a str) {
        let (Some(&(producer, _)), Some(&(consumer, _))) = (cycle.first(), cycle.last()) else {
            return;
        };

        let mut links = vec![Link {
            consumer: consumer.id.as_str(),
            resource: input,
            ratio: producer.output_qty(input) / consumer.input_qty(input),
        }];
        for pair in cycle.windows(2) {
            let ((downstream, _), (upstream, resource)) = (pair[0], pair[1]);
            links.push(Link {
                consumer: downstream.id.as_str(),
                resource,
                ratio: upstream.output_qty(resource) / downstream.input_qty(resource),
            });
        }

        let gain: f64 = links.iter().map(|l| l.ratio).product();
        if gain > 1.0 + ROUNDING_SLACK {
            debug!(recipe = %consumer.id, input, gain, "self-sustaining loop");
            return;
        }

        let weakest = links.iter().min_by(|a, b| {
            a.ratio
                .total_cmp(&b.ratio)
                .then_with(|| a.consumer.cmp(b.consumer))
                .then_with(|| a.resource.cmp(b.resource))
        });
        if let Some(link) = weakest {
            debug!(recipe = link.consumer, input = link.resource, gain, "cutting lossy loop");
            self.recycled.insert((link.consumer, link.resource));
        }
    }

    fn is_producer(&self, resource: &str, recipe: &Recipe) -> bool {
        matches!(self.choices.get(resource), Some(Choice::Recipe(r)) if r.id == recipe.id)
    }

    fn is_recycled(&self, recipe: &Recipe, input: &str) -> bool {
        self.recycled.contains(&(recipe.id.as_str(), input))
    }

    fn requested(&self, resource: &str) -> f64 {
        self.requested.get(resource).copied().unwrap_or(0.0)
    }

    fn supply(&self, resource: &str) -> f64 {
        self.supply.get(resource).copied().unwrap_or(0.0)
    }

    /// Add `batches` runs of `recipe` to `tally` (negative removes them)
    fn record(&self, tally: &mut Tally<'a>, recipe: &'a Recipe, batches: f64) {
        for (input, quantity) in &recipe.inputs {
            let amount = batches * quantity;
            *tally.demand.entry(input.as_str()).or_default() += amount;
            if !self.is_recycled(recipe, input) {
                *tally.driving.entry(input.as_str()).or_default() += amount;
            }
        }
        for (output, quantity) in &recipe.outputs {
            *tally.produced.entry(output.as_str()).or_default() += batches * quantity;
        }
    }

    fn tally(&self) -> Tally<'a> {
        let mut tally = Tally::default();
        for (recipe, &batches) in self.planned.iter().copied().zip(&self.batches) {
            self.record(&mut tally, recipe, batches);
        }
        tally
    }

    /// Batches `recipe` needs given the current totals
    fn required_batches(
        &self,
        recipe: &Recipe,
        current: f64,
        tally: &Tally<'_>,
        rounding: RoundingPolicy,
    ) -> f64 {
        let floor = self.min_batches.get(recipe.id.as_str()).copied().unwrap_or(0.0);

        let mut wanted = floor;
        for (resource, per_batch) in &recipe.outputs {
            let per_batch = *per_batch;
            if per_batch <= 0.0 || !self.is_producer(resource, recipe) {
                continue;
            }
            let by_others = tally.produced(resource) - current * per_batch;
            let unmet = self.requested(resource) + tally.driving(resource)
                - self.supply(resource)
                - by_others;
            if unmet > 0.0 {
                wanted = wanted.max(unmet / per_batch);
            }
        }

        // Recycled inputs can only be drawn from what already exists
        let mut cap = f64::INFINITY;
        for (resource, per_batch) in &recipe.inputs {
            let per_batch = *per_batch;
            if per_batch <= 0.0 || !self.is_recycled(recipe, resource) {
                continue;
            }
            let used_elsewhere = tally.demand(resource) - current * per_batch;
            let available = self.supply(resource) + tally.produced(resource)
                - self.requested(resource)
                - used_elsewhere;
            cap = cap.min(available.max(0.0) / per_batch);
        }

        match rounding {
            RoundingPolicy::Continuous => wanted.min(cap).max(floor),
            RoundingPolicy::Integer => round_up(wanted).min(round_down(cap)).max(round_up(floor)),
        }
    }

    /// Sweep the planned recipes in order, updating each in place so later
    /// recipes see the counts already settled in this pass.
    fn iterate(&mut self, settings: &Settings) -> Result<usize> {
        let mut delta = 0.0;
        for iteration in 1..=settings.max_iterations {
            let mut tally = self.tally();
            delta = 0.0;

            for slot in 0..self.planned.len() {
                let recipe = self.planned[slot];
                let current = self.batches[slot];
                let next = self.required_batches(recipe, current, &tally, settings.rounding);
                if next != current {
                    self.record(&mut tally, recipe, next - current);
                    self.batches[slot] = next;
                }
                delta = f64::max(delta, (next - current).abs() / current.abs().max(1.0));
            }

            debug!(iteration, delta, "demand pass");
            if delta <= settings.tolerance {
                info!(iteration, recipes = self.planned.len(), "demand converged");
                return Ok(iteration);
            }
        }

        warn!(
            iterations = settings.max_iterations,
            delta, "demand did not converge"
        );
        Err(CalcError::UnsatisfiableCycle {
            iterations: settings.max_iterations,
            delta,
        })
    }

    fn finish(self, iterations: usize, mode: FlowMode) -> Result<Resolution> {
        let tally = self.tally();

        let mut batches = BTreeMap::new();
        for (recipe, &count) in self.planned.iter().copied().zip(&self.batches) {
            if count <= 0.0 {
                continue;
            }
            let crafter = self.resolver.crafter(recipe)?;
            let efficiency = self.resolver.efficiency(recipe)?;
            batches.insert(
                recipe.id.clone(),
                BatchRow {
                    recipe: recipe.id.clone(),
                    batches: count,
                    crafter: crafter.map(|c| c.id.clone()),
                    effective_duration: recipe.duration / efficiency,
                },
            );
        }

        let touched: BTreeSet<&str> = self
            .requested
            .keys()
            .copied()
            .chain(tally.demand.keys().copied())
            .chain(tally.produced.keys().copied())
            .collect();

        let mut flows = BTreeMap::new();
        for resource in touched {
            let row = flow_row(
                self.requested(resource),
                tally.demand(resource),
                self.supply(resource),
                tally.produced(resource),
            );
            if row.requested > 0.0 || row.used > 0.0 || row.produced > 0.0 {
                flows.insert(resource.to_string(), row);
            }
        }

        Ok(Resolution {
            batches,
            flows,
            iterations,
            mode,
        })
    }
}

/// Balance one resource.
///
/// Supply is drawn for production first; what is not drawn is the leftover
/// and counts toward the requested amount.
fn flow_row(requested: f64, used: f64, supplied: f64, produced: f64) -> FlowRow {
    let scale = requested.max(used).max(supplied).max(produced).max(1.0);
    let clean = |x: f64| if x.abs() <= ROUNDING_SLACK * scale { 0.0 } else { x };

    let leftover = supplied - supplied.min(used);
    let excess = produced + supplied - used - requested.max(leftover);
    let external = requested + used - supplied - produced;

    FlowRow {
        requested,
        used: clean(used),
        supplied,
        leftover: clean(leftover),
        produced: clean(produced),
        excess: clean(excess.max(0.0)),
        external: clean(external.max(0.0)),
    }
}

fn round_up(x: f64) -> f64 {
    (x - ROUNDING_SLACK * x.abs().max(1.0)).ceil().max(0.0)
}

fn round_down(x: f64) -> f64 {
    if x.is_infinite() {
        return x;
    }
    (x + ROUNDING_SLACK * x.abs().max(1.0)).floor().max(0.0)
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (count_label, time_label) = match self.mode {
            FlowMode::Quantity => ("Batches", "Time"),
            FlowMode::Rate => ("Batches/s", "Crafters"),
        };

        writeln!(f, "=== Recipes ===")?;
        writeln!(
            f,
            "{:<24} {:>12} {:>12}  {}",
            "Recipe", count_label, time_label, "Crafter"
        )?;
        writeln!(f, "{}", "-".repeat(64))?;
        for row in self.batches.values() {
            writeln!(
                f,
                "{:<24} {:>12.3} {:>12.3}  {}",
                row.recipe,
                row.batches,
                row.crafter_time(),
                row.crafter.as_deref().unwrap_or("-")
            )?;
        }
        writeln!(f)?;

        writeln!(f, "=== Resources ===")?;
        writeln!(
            f,
            "{:<24} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Resource", "Requested", "Used", "Supplied", "Leftover", "Produced", "Excess"
        )?;
        writeln!(f, "{}", "-".repeat(90))?;
        for (resource, row) in &self.flows {
            writeln!(
                f,
                "{:<24} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
                resource, row.requested, row.used, row.supplied, row.leftover, row.produced, row.excess
            )?;
        }

        let external = self.external_inputs();
        if !external.is_empty() {
            writeln!(f)?;
            writeln!(f, "Raw inputs required:")?;
            for (resource, amount) in external {
                writeln!(f, "  {:.3} {}", amount, resource)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_ignores_float_noise() {
        assert_eq!(round_up(3.0000000001), 3.0);
        assert_eq!(round_up(3.25), 4.0);
        assert_eq!(round_up(0.0), 0.0);
        assert_eq!(round_down(2.9999999999), 3.0);
        assert_eq!(round_down(2.5), 2.0);
        assert_eq!(round_down(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn flow_row_draws_supply_first() {
        let row = flow_row(0.0, 3.0, 10.0, 0.0);
        assert_eq!(row.leftover, 7.0);
        assert_eq!(row.external, 0.0);
        assert_eq!(row.excess, 0.0);

        // leftover supply counts toward the request
        let row = flow_row(12.0, 0.0, 10.0, 2.0);
        assert_eq!(row.leftover, 10.0);
        assert_eq!(row.excess, 0.0);
        assert_eq!(row.external, 0.0);
    }

    #[test]
    fn flow_row_reports_shortfall_as_external() {
        let row = flow_row(64.0, 0.0, 0.0, 0.0);
        assert_eq!(row.external, 64.0);
        assert_eq!(row.produced, 0.0);
    }

    fn planned_cuts(recipes: Vec<Recipe>, target: &str) -> Vec<(String, String)> {
        let graph = RecipeGraph::new(recipes).unwrap();
        let crafters = CrafterRegistry::default();
        let defaults = Defaults::new();
        let inventory = Inventory::new();
        let targets = vec![Target::resource(target, 10.0)];

        let resolver = DefaultResolver::new(&graph, &crafters, &defaults);
        let mut run = Run::seed(&graph, resolver, &targets, &inventory).unwrap();
        run.plan().unwrap();

        let mut cuts: Vec<(String, String)> = run
            .recycled
            .iter()
            .map(|(r, i)| (r.to_string(), i.to_string()))
            .collect();
        cuts.sort();
        cuts
    }

    fn ore_loop() -> Vec<Recipe> {
        vec![
            Recipe::new("a").input("iron_ore", 1.0).output("iron", 1.0).output("slag", 0.1),
            Recipe::new("b").input("slag", 10.0).output("iron_ore", 1.0),
        ]
    }

    #[test]
    fn lossy_loop_is_cut_at_its_weakest_link() {
        let expected = vec![("b".to_string(), "slag".to_string())];
        for target in ["iron", "iron_ore", "slag"] {
            assert_eq!(planned_cuts(ore_loop(), target), expected, "entered from {target}");
        }
    }

    #[test]
    fn gaining_loop_is_left_whole() {
        let recipes = vec![
            Recipe::new("grow").input("seed", 1.0).input("water", 1.0).output("plant", 1.0),
            Recipe::new("thresh").input("plant", 1.0).output("seed", 2.0),
        ];
        assert!(planned_cuts(recipes.clone(), "plant").is_empty());
        assert!(planned_cuts(recipes, "seed").is_empty());
    }
}
