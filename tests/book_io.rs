//! Loading books from text files and the SQLite store.

mod common;

use std::fs;

use common::assert_close;
use recipe_calculator::defaults::Production;
use recipe_calculator::parse::{self, load_path};
use recipe_calculator::sample::sample_book;
use recipe_calculator::{CalcError, Settings, Target, db};
use rusqlite::Connection;

#[test]
fn sample_book_is_consistent() {
    let book = sample_book().unwrap();
    assert_eq!(book.graph.recipes().count(), 7);
    assert_eq!(
        book.defaults.recipe_for("iron"),
        Some(&Production::Recipe("r_iron_w".into()))
    );
    assert_eq!(book.crafters.efficiency("sawmill").unwrap(), 2.0);
}

#[test]
fn directory_books_are_merged() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("10-wood.recipes"),
        "r_planks {1 wood} -> {4 planks} @ sawmill\n[crafters]\nsawmill 2\n",
    )
    .unwrap();
    fs::create_dir(dir.path().join("tools")).unwrap();
    fs::write(
        dir.path().join("tools").join("sticks.recipes"),
        "r_sticks {2 planks} -> {4 sticks}\n[inventory]\n3 wood\n",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a book").unwrap();

    let files = parse::find_book_files(dir.path()).unwrap();
    assert_eq!(files.len(), 2);

    let book = load_path(dir.path()).unwrap();
    assert!(book.graph.is_recipe("r_planks"));
    assert!(book.graph.is_recipe("r_sticks"));
    assert_eq!(book.inventory.get("wood"), 3.0);

    let res = book
        .resolve(&[Target::resource("sticks", 8.0)], &Settings::default())
        .unwrap();
    assert_close(res.batches_of("r_planks"), 1.0);
    assert_close(res.batches["r_planks"].effective_duration, 0.5);
    assert_close(res.flow("wood").unwrap().leftover, 2.0);
}

#[test]
fn bad_default_fails_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.recipes");
    fs::write(&path, "r_planks {1 wood} -> {4 planks}\n[defaults]\nplanks r_missing\n").unwrap();

    let err = load_path(&path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CalcError>(),
        Some(CalcError::ConfigError(_))
    ));
}

#[test]
fn missing_directory_contents_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_path(dir.path()).is_err());
}

#[test]
fn requests_are_classified_once() {
    let book = sample_book().unwrap();
    let targets = parse::parse_targets(&book.graph, "64 piston, 2 r_iron_w").unwrap();
    assert_eq!(
        targets,
        vec![Target::resource("piston", 64.0), Target::recipe("r_iron_w", 2.0)]
    );

    let err = parse::parse_targets(&book.graph, "3 unobtainium").unwrap_err();
    assert_eq!(
        err.downcast_ref::<CalcError>(),
        Some(&CalcError::UnknownTarget("unobtainium".into()))
    );
    assert!(parse::parse_targets(&book.graph, "many planks").is_err());
}

#[test]
fn stored_book_resolves_like_parsed_book() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::open(dir.path().join("recipes.db")).unwrap();
    db::init_schema(&conn).unwrap();

    let book = sample_book().unwrap();
    db::save_book(&conn, &book).unwrap();
    db::set_inventory(&conn, "planks", 30.0).unwrap();
    db::set_default_recipe(&conn, "stone", &Production::Raw).unwrap();

    let stored = db::load_book(&conn).unwrap();
    assert_eq!(stored.defaults.recipe_for("stone"), Some(&Production::Raw));
    assert_eq!(stored.inventory.get("planks"), 30.0);

    let targets = [Target::resource("piston", 8.0)];
    let res = stored.resolve(&targets, &Settings::default()).unwrap();
    let expected = book.resolve(&targets, &Settings::default()).unwrap();
    assert_eq!(res.batches_of("r_iron_w"), expected.batches_of("r_iron_w"));
    assert_eq!(res.batches_of("r_piston"), 8.0);
    // 24 + 16/3 planks needed, all covered by the stored supply
    assert_eq!(res.batches_of("r_planks"), 0.0);
}

#[test]
fn clashing_import_leaves_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::open(dir.path().join("recipes.db")).unwrap();
    db::init_schema(&conn).unwrap();
    db::save_book(&conn, &sample_book().unwrap()).unwrap();

    // fine on its own, but `planks` is already a stored resource
    let path = dir.path().join("boards.recipes");
    fs::write(&path, "planks {1 log} -> {1 board}\n").unwrap();

    let err = parse::import_to_database(&conn, &path, false).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CalcError>(),
        Some(CalcError::ConfigError(_))
    ));

    let stored = db::load_book(&conn).unwrap();
    assert_eq!(stored.graph.recipes().count(), 7);
    assert!(!stored.graph.is_recipe("planks"));
}

#[test]
fn clearing_import_drops_stale_inventory() {
    let dir = tempfile::tempdir().unwrap();
    let conn = Connection::open(dir.path().join("recipes.db")).unwrap();
    db::init_schema(&conn).unwrap();
    db::save_book(&conn, &sample_book().unwrap()).unwrap();
    db::set_inventory(&conn, "redstone", 4.0).unwrap();
    db::set_inventory(&conn, "wood", 2.0).unwrap();

    let path = dir.path().join("wood.recipes");
    fs::write(&path, "r_planks {1 wood} -> {4 planks}\n").unwrap();
    let stats = parse::import_to_database(&conn, &path, true).unwrap();
    assert_eq!(stats.recipes, 1);

    let stored = db::load_book(&conn).unwrap();
    assert_eq!(stored.graph.recipes().count(), 1);
    assert_eq!(stored.inventory.get("redstone"), 0.0);
    assert_eq!(stored.inventory.get("wood"), 2.0);
}
