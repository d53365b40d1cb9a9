//! Status command: report outdatedness without compiling.

use anyhow::Result;
use std::path::Path;

pub fn run(config_path: &Path, rules_path: &Path) -> Result<()> {
    let compiler = super::compiler_from(config_path, rules_path)?;

    let mut outdated = 0usize;
    for (key, reasons) in compiler.status() {
        if reasons.is_empty() {
            println!("  up to date  {key}");
        } else {
            outdated += 1;
            let why = reasons
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            println!("  outdated    {key}  ({why})");
        }
    }
    println!();
    println!("{outdated} rep(s) outdated");
    Ok(())
}
