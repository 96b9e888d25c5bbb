//! The stats subcommand.

use std::path::{Path, PathBuf};

use vex_sem::Stats;
use vex_util::{Handler, SourceMap};

use super::resolve;

/// Report aggregate statistics. Returns `Ok(true)` when the
/// configuration parsed cleanly.
pub fn run_stats(file: &Path, include_paths: &[PathBuf], json: bool) -> anyhow::Result<bool> {
    let handler = Handler::new();
    let mut source_map = SourceMap::new();
    let modules = resolve(file, include_paths, &mut source_map, &handler)?;

    if handler.has_errors() {
        for diagnostic in handler.diagnostics() {
            eprintln!(
                "{}: {} ({})",
                diagnostic.level,
                diagnostic.message,
                source_map.render(diagnostic.span),
            );
        }
        return Ok(false);
    }

    let stats = Stats::collect(&modules, &source_map);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(true);
    }

    let rule = "=".repeat(60);
    let line = "-".repeat(60);
    println!("{rule}");
    println!("| {:<56} |", "vex VCL statistics");
    println!("{rule}");
    println!("| {:<26} | {:>27} |", "Main VCL File", stats.main);
    println!("{line}");
    println!("| {:<26} | {:>27} |", "Included Module Files", stats.files - 1);
    println!("{line}");
    println!("| {:<26} | {:>27} |", "Total VCL Lines", stats.lines);
    println!("{line}");
    println!("| {:<26} | {:>27} |", "Subroutines", stats.subroutines);
    println!("{line}");
    println!("| {:<26} | {:>27} |", "Backends", stats.backends);
    println!("{line}");
    println!("| {:<26} | {:>27} |", "Tables", stats.tables);
    println!("{line}");
    println!("| {:<26} | {:>27} |", "Access Control Lists", stats.acls);
    println!("{line}");
    println!("| {:<26} | {:>27} |", "Directors", stats.directors);
    println!("{line}");
    Ok(true)
}
