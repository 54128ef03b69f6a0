//! Recipe Calculator
//!
//! Works out how many batches of each recipe are needed to reach a
//! production target, and how every resource flows through the chain.
//!
//! Recipe books are loaded once (from text files or the SQLite store) into a
//! [`RecipeBook`]; each query is then resolved with [`calculator::resolve`].

pub mod book;
pub mod calculator;
pub mod crafters;
pub mod db;
pub mod defaults;
pub mod error;
pub mod graph;
pub mod models;
pub mod parse;
pub mod sample;
pub mod settings;

pub use book::RecipeBook;
pub use calculator::{BatchRow, FlowRow, Resolution, resolve};
pub use crafters::CrafterRegistry;
pub use defaults::{Choice, DefaultResolver, Defaults, Production};
pub use error::CalcError;
pub use graph::RecipeGraph;
pub use models::{Crafter, Inventory, Recipe, RoundingPolicy, Target};
pub use settings::{FlowMode, Settings};
