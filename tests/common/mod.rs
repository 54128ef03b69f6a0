//! Shared fixtures for integration tests.

#![allow(dead_code)]

use recipe_calculator::parse::parse_book;
use recipe_calculator::{RecipeBook, Resolution};

pub const EPSILON: f64 = 1e-6;

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() <= EPSILON * expected.abs().max(1.0),
        "expected {expected}, got {actual}"
    );
}

pub fn book(text: &str) -> RecipeBook {
    parse_book(text).expect("test book should be valid")
}

/// `r_planks {1 wood} -> {4 planks}` and nothing else
pub fn planks_book() -> RecipeBook {
    book("r_planks {1 wood} -> {4 planks}")
}

/// The lossy ore/slag loop
pub fn slag_book() -> RecipeBook {
    book(
        "\
r_smelt {1 iron_ore} -> {1 iron, 0.1 slag}
r_reclaim {10 slag} -> {1 iron_ore}
",
    )
}

/// Every resource row must balance: what comes in equals what goes out.
pub fn assert_conserved(resolution: &Resolution) {
    for (resource, row) in &resolution.flows {
        let inflow = row.produced + row.supplied + row.external;
        let outflow = row.used + row.requested.max(row.leftover) + row.excess;
        assert!(
            (inflow - outflow).abs() <= EPSILON * inflow.abs().max(1.0),
            "{resource} does not balance: in {inflow}, out {outflow} ({row:?})"
        );
    }
}
