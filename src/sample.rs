//! Sample recipe book for trying the calculator without an import

use anyhow::Result;

use crate::book::RecipeBook;
use crate::parse::parse_book;

/// Minecraft-flavoured book with two ways to make iron
pub const SAMPLE_BOOK: &str = "\
[recipes]
r_planks {1 wood} -> {4 planks} / 0.5 @ workbench, sawmill
r_sticks {2 planks} -> {4 sticks}
r_torch {1 coal, 1 sticks} -> {4 torch}
r_cobblestone {1 stone} -> {1 cobblestone} / 0.25
r_iron {1 iron_ore} -> {1 iron, 0.1 slag} / 10 @ furnace, blast_furnace
r_iron_w {3 iron_ore, 2 planks} -> {3 iron} / 20
r_piston {3 planks, 4 cobblestone, 1 redstone, 1 iron} -> {1 piston}

[crafters]
workbench 1
sawmill 2
furnace 1
blast_furnace 2

[defaults]
iron r_iron_w

[crafter-defaults]
r_iron blast_furnace
";

pub fn sample_book() -> Result<RecipeBook> {
    parse_book(SAMPLE_BOOK)
}
