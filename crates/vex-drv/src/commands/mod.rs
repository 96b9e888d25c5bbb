//! Command handlers for the vex CLI.

pub mod lint;
pub mod run;
pub mod stats;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use vex_res::{Module, Resolver};
use vex_util::{Handler, SourceMap};

/// Resolve the module graph rooted at `file`.
///
/// Syntax errors land in the handler; resolver failures (missing file,
/// include cycle, IO) abort with context.
pub fn resolve(
    file: &Path,
    include_paths: &[PathBuf],
    source_map: &mut SourceMap,
    handler: &Handler,
) -> anyhow::Result<Vec<Module>> {
    tracing::debug!(file = %file.display(), "resolving module graph");
    Resolver::new(include_paths.to_vec())
        .resolve_file(file, source_map, handler)
        .with_context(|| format!("failed to resolve {}", file.display()))
}
