pub mod build;
pub mod status;

use crate::rules_file;
use anyhow::{Context, Result};
use kiln_core::{load_site, Compiler, Config, FilterRegistry};
use std::path::Path;

/// Load configuration, site, and rules, and plan the reps.
pub fn compiler_from(config_path: &Path, rules_path: &Path) -> Result<Compiler> {
    let config = if config_path.exists() {
        Config::from_file(config_path).context("Failed to load configuration")?
    } else {
        tracing::warn!(
            "Configuration file {} not found; using defaults",
            config_path.display()
        );
        Config::default()
    };
    let site = load_site(&config).context("Failed to load site")?;
    let rules = rules_file::load(rules_path)?;
    let compiler = Compiler::new(config, site, rules, FilterRegistry::with_builtins())
        .context("Failed to plan compilation")?;
    Ok(compiler)
}
