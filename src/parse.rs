//! Recipe-book text format
//!
//! A book is a list of line statements grouped in sections:
//!
//! ```text
//! [recipes]
//! r_planks {1 wood} -> {4 planks} / 0.5 @ workbench, sawmill
//! [crafters]
//! sawmill 2
//! [defaults]
//! planks r_planks
//! iron_ore RAW
//! [crafter-defaults]
//! r_planks sawmill
//! [inventory]
//! 10 wood
//! ```
//!
//! Lines before the first section header are recipes. `#` starts a comment.
//! A directory is imported by reading every `*.recipes` file below it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::book::RecipeBook;
use crate::db;
use crate::defaults::{Defaults, Production};
use crate::error::CalcError;
use crate::graph::RecipeGraph;
use crate::models::{Crafter, Inventory, Recipe, Target};

pub const BOOK_EXTENSION: &str = "recipes";

/// Keyword marking a resource as raw in the `[defaults]` section
pub const RAW_KEYWORD: &str = "RAW";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Recipes,
    Crafters,
    Defaults,
    CrafterDefaults,
    Inventory,
}

impl Section {
    fn from_header(name: &str) -> Option<Self> {
        match name {
            "recipes" => Some(Section::Recipes),
            "crafters" => Some(Section::Crafters),
            "defaults" => Some(Section::Defaults),
            "crafter-defaults" => Some(Section::CrafterDefaults),
            "inventory" => Some(Section::Inventory),
            _ => None,
        }
    }
}

/// Statements read from one or more files, not yet cross-checked
#[derive(Debug, Default)]
pub struct BookSource {
    pub recipes: Vec<Recipe>,
    pub crafters: Vec<Crafter>,
    pub defaults: Defaults,
    pub inventory: Inventory,
}

impl BookSource {
    /// Append another source. Later defaults and inventory entries win.
    pub fn merge(&mut self, other: BookSource) {
        self.recipes.extend(other.recipes);
        self.crafters.extend(other.crafters);

        let mut defaults = std::mem::take(&mut self.defaults);
        for (resource, production) in other.defaults.recipe_defaults() {
            defaults = match production {
                Production::Recipe(recipe) => defaults.with_recipe(resource, recipe.as_str()),
                Production::Raw => defaults.with_raw(resource),
            };
        }
        for (recipe, crafter) in other.defaults.crafter_defaults() {
            defaults = defaults.with_crafter(recipe, crafter);
        }
        self.defaults = defaults;

        self.inventory.merge(&other.inventory);
    }

    pub fn build(self) -> std::result::Result<RecipeBook, CalcError> {
        RecipeBook::new(self.recipes, self.crafters, self.defaults, self.inventory)
    }
}

/// Compiled line grammar
pub struct Grammar {
    section: Regex,
    recipe: Regex,
    amount: Regex,
    pair: Regex,
    identifier: Regex,
}

impl Grammar {
    pub fn new() -> Result<Self> {
        Ok(Grammar {
            section: Regex::new(r"^\[([a-z-]+)\]$")?,
            // name {inputs} -> {outputs} [/ duration] [@ crafter, ...]
            recipe: Regex::new(
                r"^([A-Za-z_]\w*)\s*\{([^}]*)\}\s*->\s*\{([^}]*)\}\s*(?:/\s*(\d+(?:\.\d+)?))?\s*(?:@\s*(.+))?$",
            )?,
            // 4 planks
            amount: Regex::new(r"^(\d+(?:\.\d+)?)\s+([A-Za-z_]\w*)$")?,
            // planks r_planks / sawmill 2
            pair: Regex::new(r"^([A-Za-z_]\w*)\s+([A-Za-z_]\w*|\d+(?:\.\d+)?)$")?,
            identifier: Regex::new(r"^[A-Za-z_]\w*$")?,
        })
    }

    /// Parse one `quantity identifier` pair, e.g. `64 piston`
    pub fn amount(&self, text: &str) -> Option<(String, f64)> {
        let cap = self.amount.captures(text.trim())?;
        let quantity = cap[1].parse::<f64>().ok()?;
        Some((cap[2].to_string(), quantity))
    }

    fn components(&self, text: &str) -> Option<Vec<(String, f64)>> {
        if text.trim().is_empty() {
            return Some(Vec::new());
        }
        text.split(',').map(|part| self.amount(part)).collect()
    }

    fn recipe(&self, line: &str) -> Option<Recipe> {
        let cap = self.recipe.captures(line)?;

        let mut recipe = Recipe::new(&cap[1]);
        recipe.inputs = self.components(&cap[2])?;
        recipe.outputs = self.components(&cap[3])?;
        if let Some(duration) = cap.get(4) {
            recipe.duration = duration.as_str().parse().ok()?;
        }
        if let Some(crafters) = cap.get(5) {
            for crafter in crafters.as_str().split(',').map(str::trim) {
                if !self.identifier.is_match(crafter) {
                    return None;
                }
                recipe.crafters.push(crafter.to_string());
            }
        }
        Some(recipe)
    }

    fn pair<'t>(&self, line: &'t str) -> Option<(&'t str, &'t str)> {
        let cap = self.pair.captures(line)?;
        let (_, [first, second]) = cap.extract();
        Some((first, second))
    }

    /// Parse a whole book
    pub fn parse(&self, text: &str) -> std::result::Result<BookSource, CalcError> {
        let mut source = BookSource::default();
        let mut section = Section::Recipes;

        for (index, raw_line) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let fail = |message: String| CalcError::Parse {
                line: line_no,
                message,
            };

            if let Some(cap) = self.section.captures(line) {
                section = Section::from_header(&cap[1])
                    .ok_or_else(|| fail(format!("unknown section [{}]", &cap[1])))?;
                continue;
            }

            match section {
                Section::Recipes => {
                    let recipe = self
                        .recipe(line)
                        .ok_or_else(|| fail(format!("malformed recipe: {}", line)))?;
                    source.recipes.push(recipe);
                }
                Section::Crafters => {
                    let (id, efficiency) = self
                        .pair(line)
                        .and_then(|(id, e)| e.parse::<f64>().ok().map(|e| (id, e)))
                        .ok_or_else(|| fail(format!("malformed crafter: {}", line)))?;
                    source.crafters.push(Crafter::new(id, efficiency));
                }
                Section::Defaults => {
                    let (resource, recipe) = self
                        .pair(line)
                        .ok_or_else(|| fail(format!("malformed default: {}", line)))?;
                    source.defaults = if recipe == RAW_KEYWORD {
                        std::mem::take(&mut source.defaults).with_raw(resource)
                    } else {
                        std::mem::take(&mut source.defaults).with_recipe(resource, recipe)
                    };
                }
                Section::CrafterDefaults => {
                    let (recipe, crafter) = self
                        .pair(line)
                        .ok_or_else(|| fail(format!("malformed crafter default: {}", line)))?;
                    source.defaults = std::mem::take(&mut source.defaults).with_crafter(recipe, crafter);
                }
                Section::Inventory => {
                    let (resource, amount) = self
                        .amount(line)
                        .ok_or_else(|| fail(format!("malformed inventory entry: {}", line)))?;
                    source.inventory.set(resource, amount);
                }
            }
        }

        Ok(source)
    }
}

/// Parse and validate a complete book held in memory
pub fn parse_book(text: &str) -> Result<RecipeBook> {
    let source = Grammar::new()?.parse(text)?;
    Ok(source.build()?)
}

/// Find all recipe-book files below `dir`, in a stable order
pub fn find_book_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().is_some_and(|ext| ext == BOOK_EXTENSION)
        {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Load a book from a single file or from every book file under a directory
pub fn load_path(path: &Path) -> Result<RecipeBook> {
    let grammar = Grammar::new()?;

    let files = if path.is_dir() {
        find_book_files(path)?
    } else {
        vec![path.to_path_buf()]
    };
    if files.is_empty() {
        anyhow::bail!("no .{} files found under {}", BOOK_EXTENSION, path.display());
    }

    let mut source = BookSource::default();
    for file in &files {
        let text = fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let parsed = grammar
            .parse(&text)
            .with_context(|| format!("Failed to parse {}", file.display()))?;
        debug!(file = %file.display(), recipes = parsed.recipes.len(), "parsed book file");
        source.merge(parsed);
    }

    let book = source
        .build()
        .with_context(|| format!("Invalid recipe book at {}", path.display()))?;
    info!(files = files.len(), "recipe book loaded");
    Ok(book)
}

/// Parse a request such as `64 piston, 2 r_iron_w` into typed targets
pub fn parse_targets(graph: &RecipeGraph, request: &str) -> Result<Vec<Target>> {
    let grammar = Grammar::new()?;
    let mut targets = Vec::new();

    for part in request.split(',').filter(|p| !p.trim().is_empty()) {
        let (id, quantity) = grammar.amount(part).ok_or_else(|| CalcError::Parse {
            line: 1,
            message: format!("invalid request '{}', expected '<quantity> <name>'", part.trim()),
        })?;
        targets.push(graph.classify(&id, quantity)?);
    }

    if targets.is_empty() {
        anyhow::bail!("empty request");
    }
    Ok(targets)
}

/// Load a book from `path` and store it, replacing the stored book when `clear` is set.
///
/// The stored result is validated before commit, so a book that clashes with
/// what is already stored leaves the database untouched.
pub fn import_to_database(conn: &Connection, path: &Path, clear: bool) -> Result<ImportStats> {
    println!("Reading recipe book from {}...", path.display());
    let book = load_path(path)?;

    let tx = conn.unchecked_transaction()?;
    if clear {
        db::clear_book(&tx)?;
    }
    db::write_book(&tx, &book)?;
    if clear {
        let pruned = db::prune_inventory(&tx)?;
        if pruned > 0 {
            warn!(pruned, "dropped inventory for resources outside the new book");
        }
    }
    db::load_book(&tx).with_context(|| {
        format!("{} conflicts with the stored recipe book", path.display())
    })?;
    tx.commit()?;

    Ok(ImportStats {
        recipes: book.graph.recipes().count(),
        resources: book.graph.resources().count(),
        crafters: book.crafters.iter().count(),
        defaults: book.defaults.recipe_defaults().count()
            + book.defaults.crafter_defaults().count(),
        inventory: book.inventory.iter().count(),
    })
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub recipes: usize,
    pub resources: usize,
    pub crafters: usize,
    pub defaults: usize,
    pub inventory: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} recipes over {} resources ({} crafters, {} defaults, {} inventory entries)",
            self.recipes, self.resources, self.crafters, self.defaults, self.inventory
        )
    }
}
