//! End-to-end: load a site from disk, compile it, and check that the
//! second and third runs recompile exactly what changed.

use kiln_core::{load_site, Compiler, Config, FilterRegistry, OutdatednessReason, Rule, RuleTable};
use kiln_types::{Identifier, Pattern, ValueMap};
use std::path::Path;

fn write_content(dir: &Path, b_body: &str) {
    let content = dir.join("content");
    std::fs::create_dir_all(&content).unwrap();
    std::fs::write(
        content.join("a.md"),
        "---\ntitle: A\n---\nbefore {{ include \"/b.md\" }} after\n",
    )
    .unwrap();
    std::fs::write(content.join("b.md"), b_body).unwrap();
}

fn config_for(dir: &Path) -> Config {
    let mut config = Config::default();
    config.content_dir = dir.join("content");
    config.layouts_dir = dir.join("layouts");
    config.output_dir = dir.join("public");
    config.state_dir = dir.join(".kiln");
    config
}

fn rules() -> RuleTable {
    let mut rules = RuleTable::new();
    rules.add_rule(Rule::new(Pattern::glob("/a.md"), "default", |rec, _| {
        rec.filter("embed", ValueMap::new());
        rec.write("/a/index.html");
    }));
    rules.add_rule(Rule::new(Pattern::glob("/**/*"), "default", |rec, _| {
        rec.filter("embed", ValueMap::new());
    }));
    rules
}

fn compiler_for(dir: &Path) -> Compiler {
    let config = config_for(dir);
    let site = load_site(&config).unwrap();
    Compiler::new(config, site, rules(), FilterRegistry::with_builtins()).unwrap()
}

#[test]
fn test_incremental_recompilation() {
    let dir = tempfile::tempdir().unwrap();
    write_content(dir.path(), "stuff\n");

    // First run: everything is new; /a.md needs /b.md's compiled
    // content before it can finish.
    let summary = compiler_for(dir.path()).run().unwrap();
    assert_eq!(summary.compiled, 2);
    let out = std::fs::read_to_string(dir.path().join("public/a/index.html")).unwrap();
    assert_eq!(out, "before stuff\n after\n");

    // Second run: nothing changed, nothing recompiles.
    let mut second = compiler_for(dir.path());
    for (_, reasons) in second.status() {
        assert_eq!(reasons, vec![]);
    }
    let summary = second.run().unwrap();
    assert_eq!(summary.compiled, 0);
    assert_eq!(summary.skipped, 2);

    // Touch /b.md: it is outdated for its own reasons, /a.md only
    // because of its dependency.
    write_content(dir.path(), "new stuff\n");
    let third = compiler_for(dir.path());
    let status: std::collections::HashMap<_, _> = third
        .status()
        .into_iter()
        .map(|(key, reasons)| (key.item.clone(), reasons))
        .collect();
    assert_eq!(
        status[&Identifier::full("/b.md")],
        vec![OutdatednessReason::ContentModified]
    );
    assert_eq!(
        status[&Identifier::full("/a.md")],
        vec![OutdatednessReason::DependenciesOutdated]
    );

    let mut third = third;
    let summary = third.run().unwrap();
    assert_eq!(summary.compiled, 2);
    let out = std::fs::read_to_string(dir.path().join("public/a/index.html")).unwrap();
    assert_eq!(out, "before new stuff\n after\n");
}

#[test]
fn test_deleting_output_marks_not_written() {
    let dir = tempfile::tempdir().unwrap();
    write_content(dir.path(), "stuff\n");

    compiler_for(dir.path()).run().unwrap();
    std::fs::remove_file(dir.path().join("public/a/index.html")).unwrap();

    let mut again = compiler_for(dir.path());
    let status: std::collections::HashMap<_, _> = again
        .status()
        .into_iter()
        .map(|(key, reasons)| (key.item.clone(), reasons))
        .collect();
    assert_eq!(
        status[&Identifier::full("/a.md")],
        vec![OutdatednessReason::NotWritten]
    );

    again.run().unwrap();
    assert!(dir.path().join("public/a/index.html").exists());
}
