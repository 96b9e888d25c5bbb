//! The run subcommand: execute against a synthetic request.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use vex_rt::{HttpRequest, Interpreter};
use vex_util::{Handler, SourceMap};

use super::resolve;

/// Execute a configuration against one synthetic request and print the
/// HTTP-shaped response plus the log buffer.
pub fn run_request(
    file: &Path,
    include_paths: &[PathBuf],
    method: &str,
    url: &str,
) -> anyhow::Result<bool> {
    let handler = Handler::new();
    let mut source_map = SourceMap::new();
    let modules = resolve(file, include_paths, &mut source_map, &handler)?;

    vex_sem::lint(&modules, &handler);
    if handler.has_errors() {
        for diagnostic in handler.diagnostics() {
            eprintln!(
                "{}: {} ({})",
                diagnostic.level,
                diagnostic.message,
                source_map.render(diagnostic.span),
            );
        }
        eprintln!("refusing to run a configuration with lint errors");
        return Ok(false);
    }

    let mut request = HttpRequest::get(url);
    request.method = method.to_string();

    let interpreter = Interpreter::new(&modules)
        .context("failed to load configuration into the interpreter")?;
    let execution = interpreter.execute(request).context("execution failed")?;

    let response = &execution.response;
    println!(
        "{} {} {}",
        if response.proto.is_empty() {
            "HTTP/1.1"
        } else {
            &response.proto
        },
        response.status,
        response.response
    );
    for (name, value) in response.headers.iter() {
        println!("{name}: {value}");
    }
    println!();
    if !response.body.is_empty() {
        println!("{}", response.body);
    }

    if !execution.logs.is_empty() {
        eprintln!("--- log ---");
        for line in &execution.logs {
            eprintln!("{line}");
        }
    }
    tracing::debug!(restarts = execution.restarts, "execution finished");

    Ok(true)
}
