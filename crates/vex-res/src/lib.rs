//! vex-res - Module resolver for multi-file VCL configurations.
//!
//! Starting from the main source, the resolver parses each module and
//! chases its `include "name";` statements. Include names get `.vcl`
//! appended when missing; the including file's directory is searched
//! first, then each configured include path in order, first hit wins.
//! Duplicate includes dedupe by canonical path; revisiting a module that
//! is still on the resolution stack is a cycle error.
//!
//! The produced module list is topological: every module appears after
//! the modules it includes, so downstream passes see definitions before
//! uses. For a fixed path list and file set the order is deterministic.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use thiserror::Error;
use vex_par::ast::{Block, Declaration, Statement};
use vex_util::{FileId, Handler, SourceMap};

/// Resolution failure. Any of these aborts the whole run; syntax errors
/// inside a module do not (they land in the diagnostic handler instead).
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No candidate file exists for an include name.
    #[error("module \"{name}\" not found in include paths")]
    NotFound { name: String },
    /// The include graph loops back on itself.
    #[error("include cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },
    /// Reading a module failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One resolved module.
#[derive(Debug)]
pub struct Module {
    /// Module name (file stem for file modules).
    pub name: String,
    /// Resolved path; empty for in-memory sources.
    pub path: PathBuf,
    /// Identifier of the registered source file.
    pub file_id: FileId,
    /// Parsed declarations. Parse errors are in the handler; the AST is
    /// whatever the parser could recover.
    pub declarations: Vec<Declaration>,
}

/// The include-graph resolver.
///
/// # Example
///
/// ```no_run
/// use std::path::PathBuf;
/// use vex_res::Resolver;
/// use vex_util::{Handler, SourceMap};
///
/// let resolver = Resolver::new(vec![PathBuf::from("vcl/includes")]);
/// let mut map = SourceMap::new();
/// let handler = Handler::new();
/// let modules = resolver.resolve_file("vcl/main.vcl".as_ref(), &mut map, &handler)?;
/// assert_eq!(modules.last().unwrap().name, "main");
/// # Ok::<(), vex_res::ResolveError>(())
/// ```
pub struct Resolver {
    include_paths: Vec<PathBuf>,
}

impl Resolver {
    /// Creates a resolver searching the given include directories.
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self { include_paths }
    }

    /// Resolve starting from a main file on disk.
    ///
    /// The main file's own directory is searched before the configured
    /// include paths.
    pub fn resolve_file(
        &self,
        main: &Path,
        source_map: &mut SourceMap,
        handler: &Handler,
    ) -> Result<Vec<Module>, ResolveError> {
        let source = fs::read_to_string(main).map_err(|source| ResolveError::Io {
            path: main.to_path_buf(),
            source,
        })?;
        let mut search = Vec::new();
        if let Some(parent) = main.parent() {
            search.push(parent.to_path_buf());
        }
        search.extend(self.include_paths.iter().cloned());

        let mut state = Resolution {
            search,
            source_map,
            handler,
            done: FxHashSet::default(),
            stack: Vec::new(),
            modules: Vec::new(),
        };
        state.load(module_name(main), main.to_path_buf(), source)?;
        Ok(state.modules)
    }

    /// Resolve starting from an in-memory main source.
    ///
    /// Includes are still resolved against the configured include paths.
    pub fn resolve_source(
        &self,
        name: &str,
        source: &str,
        source_map: &mut SourceMap,
        handler: &Handler,
    ) -> Result<Vec<Module>, ResolveError> {
        let mut state = Resolution {
            search: self.include_paths.clone(),
            source_map,
            handler,
            done: FxHashSet::default(),
            stack: Vec::new(),
            modules: Vec::new(),
        };
        state.load(name.to_string(), PathBuf::new(), source.to_string())?;
        Ok(state.modules)
    }
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

struct Resolution<'a> {
    search: Vec<PathBuf>,
    source_map: &'a mut SourceMap,
    handler: &'a Handler,
    /// Canonical paths already resolved (dedupe).
    done: FxHashSet<PathBuf>,
    /// Paths on the current resolution chain (cycle detection).
    stack: Vec<PathBuf>,
    modules: Vec<Module>,
}

impl Resolution<'_> {
    fn load(
        &mut self,
        name: String,
        path: PathBuf,
        source: String,
    ) -> Result<(), ResolveError> {
        // FileIds are assigned sequentially, so the id is known before the
        // source moves into the map.
        let file_id = FileId(self.source_map.len());
        let declarations = vex_par::parse(&source, file_id, self.handler);
        let registered = self
            .source_map
            .add_file(display_name(&path, &name), source);
        debug_assert_eq!(registered, file_id);

        self.stack.push(path.clone());
        for include in collect_includes(&declarations) {
            self.resolve_include(&include)?;
        }
        self.stack.pop();

        self.modules.push(Module {
            name,
            path,
            file_id,
            declarations,
        });
        Ok(())
    }

    fn resolve_include(&mut self, name: &str) -> Result<(), ResolveError> {
        let path = self
            .find_file(name)
            .ok_or_else(|| ResolveError::NotFound {
                name: name.to_string(),
            })?;
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());

        if self.stack.contains(&canonical) {
            let mut cycle: Vec<String> = self
                .stack
                .iter()
                .skip_while(|p| **p != canonical)
                .map(|p| module_name(p))
                .collect();
            cycle.push(module_name(&canonical));
            return Err(ResolveError::CycleDetected { cycle });
        }
        if !self.done.insert(canonical.clone()) {
            return Ok(());
        }

        let source = fs::read_to_string(&canonical).map_err(|source| ResolveError::Io {
            path: canonical.clone(),
            source,
        })?;
        self.load(module_name(&canonical), canonical, source)
    }

    /// Append `.vcl` when missing, then search each directory in order.
    fn find_file(&self, name: &str) -> Option<PathBuf> {
        let file_name = if name.ends_with(".vcl") {
            name.to_string()
        } else {
            format!("{name}.vcl")
        };
        self.search
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
    }
}

fn display_name(path: &Path, fallback: &str) -> String {
    if path.as_os_str().is_empty() {
        fallback.to_string()
    } else {
        path.display().to_string()
    }
}

/// Collect include names from anywhere in a module's AST.
fn collect_includes(declarations: &[Declaration]) -> Vec<String> {
    let mut includes = Vec::new();
    for declaration in declarations {
        match declaration {
            Declaration::Include(include) => includes.push(include.module.value.clone()),
            Declaration::Subroutine(sub) => collect_block_includes(&sub.block, &mut includes),
            _ => {}
        }
    }
    includes
}

fn collect_block_includes(block: &Block, out: &mut Vec<String>) {
    for statement in &block.statements {
        collect_statement_includes(statement, out);
    }
}

fn collect_statement_includes(statement: &Statement, out: &mut Vec<String>) {
    match statement {
        Statement::Include(include) => out.push(include.module.value.clone()),
        Statement::If(stmt) => {
            collect_block_includes(&stmt.consequence, out);
            for chain in &stmt.another {
                collect_block_includes(&chain.consequence, out);
            }
            if let Some(alternative) = &stmt.alternative {
                collect_block_includes(&alternative.consequence, out);
            }
        }
        Statement::Switch(stmt) => {
            for case in &stmt.cases {
                for statement in &case.statements {
                    collect_statement_includes(statement, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_single_module() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.vcl", "sub vcl_recv { return(lookup); }");

        let resolver = Resolver::new(vec![]);
        let mut map = SourceMap::new();
        let handler = Handler::new();
        let modules = resolver
            .resolve_file(&dir.path().join("main.vcl"), &mut map, &handler)
            .unwrap();

        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "main");
        assert_eq!(modules[0].declarations.len(), 1);
    }

    #[test]
    fn test_topological_order_and_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.vcl",
            "include \"a\";\ninclude \"b\";\nsub vcl_recv { return(lookup); }",
        );
        write(dir.path(), "a.vcl", "include \"shared\";\nacl one {}");
        write(dir.path(), "b.vcl", "include \"shared\";\nacl two {}");
        write(dir.path(), "shared.vcl", "acl shared {}");

        let resolver = Resolver::new(vec![]);
        let mut map = SourceMap::new();
        let handler = Handler::new();
        let modules = resolver
            .resolve_file(&dir.path().join("main.vcl"), &mut map, &handler)
            .unwrap();

        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        // Includes precede includers; `shared` appears once.
        assert_eq!(names, vec!["shared", "a", "b", "main"]);
        assert!(!handler.has_errors());
    }

    #[test]
    fn test_include_path_search_order() {
        let main_dir = tempfile::tempdir().unwrap();
        let inc_a = tempfile::tempdir().unwrap();
        let inc_b = tempfile::tempdir().unwrap();
        write(main_dir.path(), "main.vcl", "include \"mod\";");
        write(inc_a.path(), "mod.vcl", "acl from_a {}");
        write(inc_b.path(), "mod.vcl", "acl from_b {}");

        let resolver = Resolver::new(vec![
            inc_a.path().to_path_buf(),
            inc_b.path().to_path_buf(),
        ]);
        let mut map = SourceMap::new();
        let handler = Handler::new();
        let modules = resolver
            .resolve_file(&main_dir.path().join("main.vcl"), &mut map, &handler)
            .unwrap();

        // First search hit wins.
        assert_eq!(modules[0].declarations[0].name(), Some("from_a"));
    }

    #[test]
    fn test_cycle_detected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.vcl", "include \"a\";");
        write(dir.path(), "a.vcl", "include \"b\";");
        write(dir.path(), "b.vcl", "include \"a\";");

        let resolver = Resolver::new(vec![]);
        let mut map = SourceMap::new();
        let handler = Handler::new();
        let err = resolver
            .resolve_file(&dir.path().join("main.vcl"), &mut map, &handler)
            .unwrap_err();

        let ResolveError::CycleDetected { cycle } = err else {
            panic!("expected cycle, got {err}");
        };
        assert!(cycle.contains(&"a".to_string()));
        assert!(cycle.contains(&"b".to_string()));
    }

    #[test]
    fn test_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.vcl", "include \"missing\";");

        let resolver = Resolver::new(vec![]);
        let mut map = SourceMap::new();
        let handler = Handler::new();
        let err = resolver
            .resolve_file(&dir.path().join("main.vcl"), &mut map, &handler)
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { name } if name == "missing"));
    }

    #[test]
    fn test_include_inside_subroutine() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "main.vcl",
            "sub vcl_recv { include \"snippet\"; return(lookup); }",
        );
        write(dir.path(), "snippet.vcl", "sub helper { esi; }");

        let resolver = Resolver::new(vec![]);
        let mut map = SourceMap::new();
        let handler = Handler::new();
        let modules = resolver
            .resolve_file(&dir.path().join("main.vcl"), &mut map, &handler)
            .unwrap();
        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["snippet", "main"]);
    }

    #[test]
    fn test_deterministic_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.vcl", "include \"x\";\ninclude \"y\";");
        write(dir.path(), "x.vcl", "acl x {}");
        write(dir.path(), "y.vcl", "acl y {}");

        let resolver = Resolver::new(vec![]);
        let mut order_one = Vec::new();
        let mut order_two = Vec::new();
        for order in [&mut order_one, &mut order_two] {
            let mut map = SourceMap::new();
            let handler = Handler::new();
            let modules = resolver
                .resolve_file(&dir.path().join("main.vcl"), &mut map, &handler)
                .unwrap();
            *order = modules.into_iter().map(|m| m.name).collect::<Vec<_>>();
        }
        assert_eq!(order_one, order_two);
    }

    #[test]
    fn test_resolve_source_in_memory() {
        let resolver = Resolver::new(vec![]);
        let mut map = SourceMap::new();
        let handler = Handler::new();
        let modules = resolver
            .resolve_source("main", "sub vcl_recv { return(pass); }", &mut map, &handler)
            .unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "main");
    }
}
