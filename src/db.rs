//! Database schema and operations

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::book::RecipeBook;
use crate::defaults::{Defaults, Production};
use crate::models::{Crafter, Inventory, Recipe};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Recipe definitions, in book order
        CREATE TABLE IF NOT EXISTS recipes (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            duration REAL NOT NULL DEFAULT 1.0
        );

        -- What a recipe consumes per batch
        CREATE TABLE IF NOT EXISTS recipe_inputs (
            recipe_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            resource_id TEXT NOT NULL,
            quantity REAL NOT NULL,
            PRIMARY KEY (recipe_id, resource_id)
        );

        -- What a recipe produces per batch
        CREATE TABLE IF NOT EXISTS recipe_outputs (
            recipe_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            resource_id TEXT NOT NULL,
            quantity REAL NOT NULL,
            PRIMARY KEY (recipe_id, resource_id)
        );

        CREATE TABLE IF NOT EXISTS crafters (
            id TEXT PRIMARY KEY,
            efficiency REAL NOT NULL
        );

        -- Crafters permitted to run a recipe (none listed = any)
        CREATE TABLE IF NOT EXISTS recipe_crafters (
            recipe_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            crafter_id TEXT NOT NULL,
            PRIMARY KEY (recipe_id, crafter_id)
        );

        -- NULL recipe_id marks a raw resource
        CREATE TABLE IF NOT EXISTS default_recipes (
            resource_id TEXT PRIMARY KEY,
            recipe_id TEXT
        );

        CREATE TABLE IF NOT EXISTS default_crafters (
            recipe_id TEXT PRIMARY KEY,
            crafter_id TEXT NOT NULL
        );

        -- Resources on hand between sessions
        CREATE TABLE IF NOT EXISTS inventory (
            resource_id TEXT PRIMARY KEY,
            amount REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_outputs_resource ON recipe_outputs(resource_id);
        CREATE INDEX IF NOT EXISTS idx_recipe_inputs_resource ON recipe_inputs(resource_id);
        "#,
    )?;
    Ok(())
}

/// Clear the stored book (inventory is kept)
pub fn clear_book(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM default_crafters;
        DELETE FROM default_recipes;
        DELETE FROM recipe_crafters;
        DELETE FROM crafters;
        DELETE FROM recipe_outputs;
        DELETE FROM recipe_inputs;
        DELETE FROM recipes;
        "#,
    )?;
    Ok(())
}

/// Insert or replace a recipe together with its components
pub fn upsert_recipe(conn: &Connection, recipe: &Recipe) -> Result<()> {
    let position: i64 = conn.query_row(
        "SELECT COALESCE((SELECT position FROM recipes WHERE id = ?1),
                         (SELECT COALESCE(MAX(position) + 1, 0) FROM recipes))",
        [&recipe.id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO recipes (id, position, duration) VALUES (?1, ?2, ?3)",
        (&recipe.id, position, recipe.duration),
    )?;
    for table in ["recipe_inputs", "recipe_outputs", "recipe_crafters"] {
        conn.execute(&format!("DELETE FROM {} WHERE recipe_id = ?1", table), [&recipe.id])?;
    }

    for (i, (resource, quantity)) in recipe.inputs.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_inputs (recipe_id, position, resource_id, quantity)
             VALUES (?1, ?2, ?3, ?4)",
            (&recipe.id, i as i64, resource, quantity),
        )?;
    }
    for (i, (resource, quantity)) in recipe.outputs.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_outputs (recipe_id, position, resource_id, quantity)
             VALUES (?1, ?2, ?3, ?4)",
            (&recipe.id, i as i64, resource, quantity),
        )?;
    }
    for (i, crafter) in recipe.crafters.iter().enumerate() {
        conn.execute(
            "INSERT INTO recipe_crafters (recipe_id, position, crafter_id) VALUES (?1, ?2, ?3)",
            (&recipe.id, i as i64, crafter),
        )?;
    }
    Ok(())
}

pub fn upsert_crafter(conn: &Connection, crafter: &Crafter) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO crafters (id, efficiency) VALUES (?1, ?2)",
        (&crafter.id, crafter.efficiency),
    )?;
    Ok(())
}

/// Store how a resource is obtained (`Production::Raw` stores NULL)
pub fn set_default_recipe(conn: &Connection, resource: &str, production: &Production) -> Result<()> {
    let recipe = match production {
        Production::Recipe(id) => Some(id.as_str()),
        Production::Raw => None,
    };
    conn.execute(
        "INSERT OR REPLACE INTO default_recipes (resource_id, recipe_id) VALUES (?1, ?2)",
        (resource, recipe),
    )?;
    Ok(())
}

pub fn set_default_crafter(conn: &Connection, recipe: &str, crafter: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO default_crafters (recipe_id, crafter_id) VALUES (?1, ?2)",
        (recipe, crafter),
    )?;
    Ok(())
}

/// Set the amount on hand; zero or less removes the entry
pub fn set_inventory(conn: &Connection, resource: &str, amount: f64) -> Result<()> {
    if amount > 0.0 {
        conn.execute(
            "INSERT OR REPLACE INTO inventory (resource_id, amount) VALUES (?1, ?2)",
            (resource, amount),
        )?;
    } else {
        conn.execute("DELETE FROM inventory WHERE resource_id = ?1", [resource])?;
    }
    Ok(())
}

/// Write a whole book in one transaction
pub fn save_book(conn: &Connection, book: &RecipeBook) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    write_book(&tx, book)?;
    tx.commit()?;
    Ok(())
}

/// Write a book over whatever is stored. The caller owns the transaction.
pub fn write_book(conn: &Connection, book: &RecipeBook) -> Result<()> {
    for crafter in book.crafters.iter() {
        upsert_crafter(conn, crafter)?;
    }
    for recipe in book.graph.recipes() {
        upsert_recipe(conn, recipe)?;
    }
    for (resource, production) in book.defaults.recipe_defaults() {
        set_default_recipe(conn, resource, production)?;
    }
    for (recipe, crafter) in book.defaults.crafter_defaults() {
        set_default_crafter(conn, recipe, crafter)?;
    }
    for (resource, amount) in book.inventory.iter() {
        set_inventory(conn, resource, amount)?;
    }
    Ok(())
}

/// Drop inventory entries for resources no stored recipe mentions
pub fn prune_inventory(conn: &Connection) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM inventory WHERE resource_id NOT IN (
             SELECT resource_id FROM recipe_inputs
             UNION
             SELECT resource_id FROM recipe_outputs
         )",
        [],
    )?;
    Ok(removed)
}

/// List all recipes in book order
pub fn list_recipes(conn: &Connection) -> Result<Vec<Recipe>> {
    let mut recipes: Vec<Recipe> = {
        let mut stmt = conn.prepare("SELECT id, duration FROM recipes ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok(Recipe::new(row.get::<_, String>(0)?).with_duration(row.get(1)?))
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        results
    };

    let inputs = load_components(conn, "recipe_inputs")?;
    let outputs = load_components(conn, "recipe_outputs")?;
    let mut crafters = load_recipe_crafters(conn)?;

    for recipe in &mut recipes {
        recipe.inputs = inputs.get(&recipe.id).cloned().unwrap_or_default();
        recipe.outputs = outputs.get(&recipe.id).cloned().unwrap_or_default();
        recipe.crafters = crafters.remove(&recipe.id).unwrap_or_default();
    }
    Ok(recipes)
}

fn load_components(conn: &Connection, table: &str) -> Result<HashMap<String, Vec<(String, f64)>>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT recipe_id, resource_id, quantity FROM {} ORDER BY recipe_id, position",
        table
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, f64>(2)?))
    })?;

    let mut results: HashMap<String, Vec<(String, f64)>> = HashMap::new();
    for row in rows {
        let (recipe, resource, quantity) = row?;
        results.entry(recipe).or_default().push((resource, quantity));
    }
    Ok(results)
}

fn load_recipe_crafters(conn: &Connection) -> Result<HashMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT recipe_id, crafter_id FROM recipe_crafters ORDER BY recipe_id, position",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut results: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (recipe, crafter) = row?;
        results.entry(recipe).or_default().push(crafter);
    }
    Ok(results)
}

/// Get a single recipe by ID
pub fn get_recipe(conn: &Connection, id: &str) -> Result<Option<Recipe>> {
    let exists: Option<String> = conn
        .query_row("SELECT id FROM recipes WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }
    Ok(list_recipes(conn)?.into_iter().find(|r| r.id == id))
}

pub fn list_crafters(conn: &Connection) -> Result<Vec<Crafter>> {
    let mut stmt = conn.prepare("SELECT id, efficiency FROM crafters ORDER BY id")?;
    let rows = stmt.query_map([], |row| Ok(Crafter::new(row.get::<_, String>(0)?, row.get(1)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn load_defaults(conn: &Connection) -> Result<Defaults> {
    let mut defaults = Defaults::new();

    let mut stmt = conn.prepare("SELECT resource_id, recipe_id FROM default_recipes ORDER BY resource_id")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;
    for row in rows {
        defaults = match row? {
            (resource, Some(recipe)) => defaults.with_recipe(resource, recipe),
            (resource, None) => defaults.with_raw(resource),
        };
    }

    let mut stmt = conn.prepare("SELECT recipe_id, crafter_id FROM default_crafters ORDER BY recipe_id")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (recipe, crafter) = row?;
        defaults = defaults.with_crafter(recipe, crafter);
    }

    Ok(defaults)
}

pub fn load_inventory(conn: &Connection) -> Result<Inventory> {
    let mut stmt = conn.prepare("SELECT resource_id, amount FROM inventory ORDER BY resource_id")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;

    let mut inventory = Inventory::new();
    for row in rows {
        let (resource, amount) = row?;
        inventory.set(resource, amount);
    }
    Ok(inventory)
}

/// Load and validate the stored book
pub fn load_book(conn: &Connection) -> Result<RecipeBook> {
    let book = RecipeBook::new(
        list_recipes(conn)?,
        list_crafters(conn)?,
        load_defaults(conn)?,
        load_inventory(conn)?,
    )?;
    Ok(book)
}

/// List all resources mentioned by any recipe
pub fn list_resources(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT resource_id FROM recipe_inputs
         UNION
         SELECT resource_id FROM recipe_outputs
         ORDER BY resource_id",
    )?;

    let rows = stmt.query_map([], |row| row.get(0))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
