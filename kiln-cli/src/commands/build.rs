//! Build command implementation.

use anyhow::Result;
use kiln_core::LogReporter;
use kiln_types::Pattern;
use std::path::Path;

pub fn run(config_path: &Path, rules_path: &Path, force: Option<&str>) -> Result<()> {
    let mut compiler = super::compiler_from(config_path, rules_path)?
        .with_listener(Box::new(LogReporter));
    if let Some(glob) = force {
        compiler.force_outdated(&Pattern::glob(glob));
    }

    let summary = compiler.run()?;
    tracing::info!(
        "Compiled {} reps ({} up to date), wrote {} files",
        summary.compiled,
        summary.skipped,
        summary.written.len()
    );
    Ok(())
}
