//! Data models for recipe books and production targets

use std::collections::BTreeMap;
use std::fmt;

/// A conversion of input resources into output resources, run in batches.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: String,
    pub inputs: Vec<(String, f64)>,  // (resource, quantity per batch)
    pub outputs: Vec<(String, f64)>, // (resource, quantity per batch)
    pub duration: f64,
    /// Crafters allowed to run this recipe. Empty means any (unit efficiency).
    pub crafters: Vec<String>,
}

impl Recipe {
    pub fn new(id: impl Into<String>) -> Self {
        Recipe {
            id: id.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            duration: 1.0,
            crafters: Vec::new(),
        }
    }

    pub fn input(mut self, resource: impl Into<String>, quantity: f64) -> Self {
        self.inputs.push((resource.into(), quantity));
        self
    }

    pub fn output(mut self, resource: impl Into<String>, quantity: f64) -> Self {
        self.outputs.push((resource.into(), quantity));
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_crafter(mut self, crafter: impl Into<String>) -> Self {
        self.crafters.push(crafter.into());
        self
    }

    /// Quantity of `resource` consumed per batch (0 if it is not an input)
    pub fn input_qty(&self, resource: &str) -> f64 {
        lookup(&self.inputs, resource)
    }

    /// Quantity of `resource` produced per batch (0 if it is not an output)
    pub fn output_qty(&self, resource: &str) -> f64 {
        lookup(&self.outputs, resource)
    }

    pub fn produces(&self, resource: &str) -> bool {
        self.output_qty(resource) > 0.0
    }

    pub fn consumes(&self, resource: &str) -> bool {
        self.inputs.iter().any(|(r, _)| r == resource)
    }

    /// Whether any crafter may run this recipe
    pub fn is_unrestricted(&self) -> bool {
        self.crafters.is_empty()
    }
}

fn lookup(components: &[(String, f64)], resource: &str) -> f64 {
    components
        .iter()
        .find(|(r, _)| r == resource)
        .map_or(0.0, |(_, q)| *q)
}

/// Same layout the recipe-book parser reads back.
impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn components(list: &[(String, f64)]) -> String {
            list.iter()
                .map(|(r, q)| format!("{} {}", q, r))
                .collect::<Vec<_>>()
                .join(", ")
        }

        write!(
            f,
            "{} {{{}}} -> {{{}}}",
            self.id,
            components(&self.inputs),
            components(&self.outputs)
        )?;
        if self.duration != 1.0 {
            write!(f, " / {}", self.duration)?;
        }
        if !self.crafters.is_empty() {
            write!(f, " @ {}", self.crafters.join(", "))?;
        }
        Ok(())
    }
}

/// A production facility. Higher efficiency means shorter effective duration.
#[derive(Debug, Clone, PartialEq)]
pub struct Crafter {
    pub id: String,
    pub efficiency: f64,
}

impl Crafter {
    pub fn new(id: impl Into<String>, efficiency: f64) -> Self {
        Crafter {
            id: id.into(),
            efficiency,
        }
    }
}

/// What the user asked for in one query
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Amount of a resource that must be left over after production
    Resource { id: String, quantity: f64 },
    /// Minimum number of batches a recipe must run
    Recipe { id: String, batches: f64 },
}

impl Target {
    pub fn resource(id: impl Into<String>, quantity: f64) -> Self {
        Target::Resource {
            id: id.into(),
            quantity,
        }
    }

    pub fn recipe(id: impl Into<String>, batches: f64) -> Self {
        Target::Recipe {
            id: id.into(),
            batches,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Target::Resource { id, .. } | Target::Recipe { id, .. } => id,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            Target::Resource { quantity, .. } => *quantity,
            Target::Recipe { batches, .. } => *batches,
        }
    }
}

/// How fractional batch counts are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoundingPolicy {
    /// Keep exact fractional batches (continuous flow)
    #[default]
    Continuous,
    /// Round batches up to whole numbers; the surplus is reported as excess
    Integer,
}

/// Resources on hand before a run starts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    amounts: BTreeMap<String, f64>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the amount on hand, replacing any previous value. Zero removes the entry.
    pub fn set(&mut self, resource: impl Into<String>, amount: f64) {
        let resource = resource.into();
        if amount > 0.0 {
            self.amounts.insert(resource, amount);
        } else {
            self.amounts.remove(&resource);
        }
    }

    pub fn with(mut self, resource: impl Into<String>, amount: f64) -> Self {
        self.set(resource, amount);
        self
    }

    pub fn get(&self, resource: &str) -> f64 {
        self.amounts.get(resource).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.amounts.iter().map(|(r, a)| (r.as_str(), *a))
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    /// Overlay another inventory on top of this one (later values win)
    pub fn merge(&mut self, other: &Inventory) {
        for (resource, amount) in other.iter() {
            self.set(resource, amount);
        }
    }
}
