//! The lint subcommand.

use std::path::{Path, PathBuf};

use vex_util::{Handler, Level, SourceMap};

use super::resolve;

/// Lint a configuration. Returns `Ok(true)` on a clean run (no errors).
pub fn run_lint(file: &Path, include_paths: &[PathBuf], verbose: u8) -> anyhow::Result<bool> {
    let handler = Handler::new();
    let mut source_map = SourceMap::new();
    let modules = resolve(file, include_paths, &mut source_map, &handler)?;

    vex_sem::lint(&modules, &handler);

    let shown = match verbose {
        0 => Level::Error,
        1 => Level::Warning,
        _ => Level::Info,
    };
    for diagnostic in handler.diagnostics() {
        if diagnostic.level > shown {
            continue;
        }
        eprintln!(
            "{}: [{}] {} ({})",
            diagnostic.level,
            diagnostic.rule,
            diagnostic.message,
            source_map.render(diagnostic.span),
        );
        for note in &diagnostic.notes {
            eprintln!("  note: {note}");
        }
    }

    let errors = handler.error_count();
    let warnings = handler.warning_count();
    let infos = handler.info_count();
    println!("{errors} errors, {warnings} warnings, {infos} infos.");

    if errors == 0 {
        match (warnings, infos) {
            (0, 0) => println!("configuration looks fine."),
            (0, _) if verbose < 2 => {
                println!("configuration is OK; rerun with -vv to see suggestions.")
            }
            (_, _) if verbose < 1 => {
                println!("configuration has warnings; rerun with -v to see them.")
            }
            _ => {}
        }
    }

    Ok(errors == 0)
}
