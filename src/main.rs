//! Recipe Calculator
//!
//! Command-line front end: manages the stored recipe book and resolves
//! production requests against it.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recipe_calculator::defaults::Production;
use recipe_calculator::settings::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use recipe_calculator::{
    CalcError, Defaults, FlowMode, Inventory, RecipeBook, RecipeGraph, Resolution, RoundingPolicy,
    Settings, Target, db, parse, resolve, sample,
};

#[derive(Parser)]
#[command(name = "recipe-calc")]
#[command(about = "Production chain calculator for crafting recipe books")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = "RECIPE_CALC_DB", default_value = "recipes.db")]
    database: PathBuf,

    /// Log engine progress (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a recipe book file, or every .recipes file under a directory
    Import {
        source: PathBuf,

        /// Clear the stored book before importing
        #[arg(long)]
        clear: bool,
    },

    /// Calculate batches and resource flows for a request
    Calc {
        /// Comma-separated targets, e.g. "64 piston, 2 r_iron_w"
        request: String,

        /// Round batches up to whole numbers
        #[arg(short, long)]
        integer: bool,

        /// Treat counts as per-second rates
        #[arg(short, long)]
        rate: bool,

        /// Treat a resource as raw for this run
        #[arg(long = "raw", value_name = "RESOURCE")]
        raw: Vec<String>,

        /// Pick the recipe for a resource, e.g. --choose iron=r_iron
        #[arg(long = "choose", value_name = "RESOURCE=RECIPE", value_parser = parse_choice)]
        choose: Vec<(String, String)>,

        /// Resources on hand for this run only, e.g. --have "10 wood"
        #[arg(long = "have", value_name = "AMOUNT RESOURCE")]
        have: Vec<String>,

        /// Ignore the stored inventory
        #[arg(long)]
        no_inventory: bool,

        #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
        max_iterations: usize,

        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,

        /// Fail instead of prompting when a recipe choice is ambiguous
        #[arg(long)]
        no_prompt: bool,

        /// Store answers given at the prompt as defaults
        #[arg(long)]
        remember: bool,
    },

    /// List all recipes in the stored book
    ListRecipes,

    /// List all resources
    ListResources,

    /// Show details for a specific recipe
    Recipe {
        /// Recipe ID
        id: String,
    },

    /// Record an amount of a resource on hand (0 clears it)
    Have { amount: f64, resource: String },

    /// Initialize empty database with schema
    Init,

    /// Load the sample book
    LoadSample,
}

fn parse_choice(s: &str) -> Result<(String, String), String> {
    let (resource, recipe) = s
        .split_once('=')
        .ok_or_else(|| format!("expected RESOURCE=RECIPE, got '{}'", s))?;
    Ok((resource.trim().to_string(), recipe.trim().to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Import { source, clear } => {
            let stats = parse::import_to_database(&conn, &source, clear)?;
            println!("\n{}", stats);
        }

        Commands::Calc {
            request,
            integer,
            rate,
            raw,
            choose,
            have,
            no_inventory,
            max_iterations,
            tolerance,
            no_prompt,
            remember,
        } => {
            let book = db::load_book(&conn).context("Stored recipe book is invalid")?;
            if book.graph.recipes().next().is_none() {
                bail!("No recipes in database. Run 'import' or 'load-sample' first.");
            }

            let targets = parse::parse_targets(&book.graph, &request)?;

            let mut defaults = book.defaults.clone();
            for resource in raw {
                defaults = defaults.with_raw(resource);
            }
            for (resource, recipe) in choose {
                defaults = defaults.with_recipe(resource, recipe);
            }
            defaults.validate(&book.graph, &book.crafters)?;

            let mut inventory = if no_inventory {
                Inventory::new()
            } else {
                book.inventory.clone()
            };
            let grammar = parse::Grammar::new()?;
            for entry in &have {
                let (resource, amount) = grammar
                    .amount(entry)
                    .with_context(|| format!("invalid --have '{}', expected 'AMOUNT RESOURCE'", entry))?;
                inventory.set(resource, amount);
            }

            let settings = Settings {
                rounding: if integer {
                    RoundingPolicy::Integer
                } else {
                    RoundingPolicy::Continuous
                },
                tolerance,
                max_iterations,
                mode: if rate { FlowMode::Rate } else { FlowMode::Quantity },
            };

            let (resolution, answered) =
                resolve_interactively(&book, &targets, defaults, &inventory, &settings, !no_prompt)?;

            if remember {
                for (resource, production) in answered.recipe_defaults() {
                    if book.defaults.recipe_for(resource) != Some(production) {
                        db::set_default_recipe(&conn, resource, production)?;
                        info!(resource, "stored default");
                    }
                }
            }

            println!("{}", resolution);
        }

        Commands::ListRecipes => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes in database. Run 'import' or 'load-sample' first.");
            } else {
                for recipe in recipes {
                    println!("{}", recipe);
                }
            }
        }

        Commands::ListResources => {
            let resources = db::list_resources(&conn)?;
            if resources.is_empty() {
                println!("No resources in database. Run 'import' or 'load-sample' first.");
            } else {
                let inventory = db::load_inventory(&conn)?;
                println!("{:<30} {:>10}", "Resource", "On hand");
                println!("{}", "-".repeat(41));
                for r in resources {
                    println!("{:<30} {:>10.3}", r, inventory.get(&r));
                }
            }
        }

        Commands::Recipe { id } => {
            if let Some(recipe) = db::get_recipe(&conn, &id)? {
                let book = db::load_book(&conn)?;
                println!("Recipe: {}", recipe.id);
                println!("  Duration: {}", recipe.duration);
                if !recipe.inputs.is_empty() {
                    println!("  Inputs:");
                    for (resource, quantity) in &recipe.inputs {
                        println!("    {} {}", quantity, resource);
                    }
                }
                if !recipe.outputs.is_empty() {
                    println!("  Outputs:");
                    for (resource, quantity) in &recipe.outputs {
                        println!("    {} {}", quantity, resource);
                    }
                }
                if !recipe.crafters.is_empty() {
                    println!("  Crafters:");
                    for id in &recipe.crafters {
                        let marker = if book.defaults.crafter_for(&recipe.id) == Some(id.as_str()) {
                            " (default)"
                        } else {
                            ""
                        };
                        println!("    {} x{}{}", id, book.crafters.efficiency(id)?, marker);
                    }
                }
                for (resource, _) in &recipe.outputs {
                    let others: Vec<&str> = book
                        .graph
                        .producers(resource)?
                        .into_iter()
                        .filter(|r| r.id != recipe.id)
                        .map(|r| r.id.as_str())
                        .collect();
                    if !others.is_empty() {
                        println!("  Other recipes for {}: {}", resource, others.join(", "));
                    }
                    let consumers: Vec<&str> = book
                        .graph
                        .consumers(resource)
                        .into_iter()
                        .map(|r| r.id.as_str())
                        .collect();
                    if !consumers.is_empty() {
                        println!("  {} is used by: {}", resource, consumers.join(", "));
                    }
                }
            } else {
                println!("Recipe '{}' not found", id);
            }
        }

        Commands::Have { amount, resource } => {
            let resources = db::list_resources(&conn)?;
            if !resources.contains(&resource) {
                bail!("Unknown resource '{}'", resource);
            }
            db::set_inventory(&conn, &resource, amount)?;
            println!("{} on hand: {}", resource, amount.max(0.0));
        }

        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::LoadSample => {
            db::clear_book(&conn)?;
            let book = sample::sample_book()?;
            db::save_book(&conn, &book)?;
            println!("Loaded {} sample recipes", book.graph.recipes().count());
        }
    }

    Ok(())
}

/// Resolve, asking on stdin whenever a resource has several recipes and no default.
///
/// Each answer produces a new `Defaults` value and the same query is resubmitted.
fn resolve_interactively(
    book: &RecipeBook,
    targets: &[Target],
    mut defaults: Defaults,
    inventory: &Inventory,
    settings: &Settings,
    prompt: bool,
) -> Result<(Resolution, Defaults)> {
    loop {
        match resolve(targets, &book.graph, &book.crafters, &defaults, inventory, settings) {
            Ok(resolution) => return Ok((resolution, defaults)),
            Err(CalcError::AmbiguousChoice {
                resource,
                candidates,
            }) if prompt => {
                let answer = ask_recipe(&book.graph, &resource, &candidates)?;
                defaults = match answer {
                    Production::Recipe(recipe) => defaults.with_recipe(resource, recipe),
                    Production::Raw => defaults.with_raw(resource),
                };
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn ask_recipe(graph: &RecipeGraph, resource: &str, candidates: &[String]) -> Result<Production> {
    println!("Please select a recipe for '{}'", resource);
    for (i, id) in candidates.iter().enumerate() {
        println!("{}: {}", i + 1, graph.recipe(id)?);
    }
    println!("0: treat '{}' as a raw resource", resource);

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("=> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("no recipe chosen for '{}'", resource);
        }
        match line.trim().parse::<usize>() {
            Ok(0) => return Ok(Production::Raw),
            Ok(n) if n <= candidates.len() => return Ok(Production::Recipe(candidates[n - 1].clone())),
            _ => println!("Enter a number between 0 and {}", candidates.len()),
        }
    }
}
