//! Parsing the rules file.
//!
//! The rules file is declarative YAML: each entry pairs a pattern with
//! the steps recorded for matching items, and layout entries pick the
//! filter that renders a layout. Output paths may use placeholders
//! derived from the item identifier.
//!
//! ```yaml
//! rules:
//!   - pattern: "/posts/*"
//!     steps:
//!       - filter: markdown
//!       - layout: "/default.*"
//!       - write: "/posts/{stem}/index.html"
//! layouts:
//!   - pattern: "/default.*"
//!     filter: placeholder
//! ```

use anyhow::{Context, Result};
use kiln_core::{LayoutRule, Rule, RuleTable};
use kiln_types::{Identifier, Pattern, PatternSpec, Value, ValueMap};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RulesFile {
    #[serde(default)]
    rules: Vec<RuleEntry>,
    #[serde(default)]
    layouts: Vec<LayoutEntry>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    pattern: PatternField,
    #[serde(default = "default_rep")]
    rep: String,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct LayoutEntry {
    pattern: PatternField,
    filter: String,
    #[serde(default)]
    args: Option<serde_yaml::Value>,
}

/// A bare string is a glob; the tagged form selects regex matching.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PatternField {
    Plain(String),
    Spec(PatternSpec),
}

impl PatternField {
    fn compile(&self) -> Result<Pattern> {
        let pattern = match self {
            PatternField::Plain(glob) => Pattern::glob(glob.clone()),
            PatternField::Spec(spec) => Pattern::from_spec(spec)?,
        };
        Ok(pattern)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Step {
    Filter {
        filter: String,
        #[serde(default)]
        args: Option<serde_yaml::Value>,
    },
    Layout {
        layout: String,
    },
    Snapshot {
        snapshot: String,
        #[serde(default)]
        path: Option<String>,
    },
    Write {
        write: String,
    },
}

fn default_rep() -> String {
    "default".to_string()
}

fn args_map(args: &Option<serde_yaml::Value>) -> ValueMap {
    args.clone()
        .map(Value::from)
        .and_then(|v| v.as_map().cloned())
        .unwrap_or_default()
}

/// Expand `{id}`, `{stem}`, `{ext}`, and `{parent}` in an output path
/// template.
fn expand_path(template: &str, identifier: &Identifier) -> String {
    let id = identifier.as_str();
    let trimmed = id.trim_matches('/');
    let (parent, file) = match trimmed.rfind('/') {
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("", trimmed),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(i) => (&file[..i], &file[i + 1..]),
        None => (file, ""),
    };
    template
        .replace("{id}", id)
        .replace("{parent}", parent)
        .replace("{stem}", stem)
        .replace("{ext}", ext)
}

/// Read a rules file into a rule table. A missing file yields an
/// error; an empty file yields an empty table.
pub fn load(path: &Path) -> Result<RuleTable> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file {}", path.display()))?;
    let file: RulesFile = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse rules file {}", path.display()))?;

    let mut table = RuleTable::new();
    for entry in file.rules {
        let pattern = entry.pattern.compile()?;
        let steps = entry.steps.clone();
        table.add_rule(Rule::new(pattern, entry.rep, move |rec, identifier| {
            for step in &steps {
                match step {
                    Step::Filter { filter, args } => rec.filter(filter.clone(), args_map(args)),
                    Step::Layout { layout } => rec.layout(layout.clone()),
                    Step::Snapshot { snapshot, path } => rec.snapshot(
                        snapshot.clone(),
                        path.as_ref()
                            .map(|p| expand_path(p, identifier).into()),
                    ),
                    Step::Write { write } => rec.write(expand_path(write, identifier)),
                }
            }
        }));
    }
    for entry in file.layouts {
        let pattern = entry.pattern.compile()?;
        table.add_layout_rule(LayoutRule::new(
            pattern,
            entry.filter,
            args_map(&entry.args),
        ));
    }
    Ok(table)
}
