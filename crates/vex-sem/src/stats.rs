//! Aggregate configuration statistics.

use serde::Serialize;
use vex_par::ast::Declaration;
use vex_res::Module;
use vex_util::SourceMap;

/// Counts reported by the `stats` subcommand.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Stats {
    /// Main module name.
    pub main: String,
    /// Total files including the main module.
    pub files: usize,
    /// Total source lines across all modules.
    pub lines: usize,
    pub subroutines: usize,
    pub backends: usize,
    pub tables: usize,
    pub acls: usize,
    pub directors: usize,
    pub penaltyboxes: usize,
    pub ratecounters: usize,
}

impl Stats {
    /// Compute statistics over a resolved module set.
    ///
    /// The module list is in resolver order, main module last.
    pub fn collect(modules: &[Module], source_map: &SourceMap) -> Stats {
        let mut stats = Stats {
            main: modules.last().map(|m| m.name.clone()).unwrap_or_default(),
            files: modules.len(),
            ..Stats::default()
        };

        for module in modules {
            if let Some(file) = source_map.file(module.file_id) {
                stats.lines += file.line_count();
            }
            for declaration in &module.declarations {
                match declaration {
                    Declaration::Subroutine(_) => stats.subroutines += 1,
                    Declaration::Backend(_) => stats.backends += 1,
                    Declaration::Table(_) => stats.tables += 1,
                    Declaration::Acl(_) => stats.acls += 1,
                    Declaration::Director(_) => stats.directors += 1,
                    Declaration::Penaltybox(_) => stats.penaltyboxes += 1,
                    Declaration::Ratecounter(_) => stats.ratecounters += 1,
                    Declaration::Import(_) | Declaration::Include(_) => {}
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_res::Resolver;
    use vex_util::Handler;

    #[test]
    fn test_collect_counts() {
        let source = r#"
            acl internal {}
            backend origin { .host = "o"; }
            table t { "k": "v" }
            director d random { .quorum = 1%; }
            penaltybox p {}
            ratecounter r {}
            sub vcl_recv { return(lookup); }
            sub helper { esi; }
        "#;
        let mut map = SourceMap::new();
        let handler = Handler::new();
        let modules = Resolver::new(vec![])
            .resolve_source("main", source, &mut map, &handler)
            .unwrap();

        let stats = Stats::collect(&modules, &map);
        assert_eq!(stats.main, "main");
        assert_eq!(stats.files, 1);
        assert_eq!(stats.subroutines, 2);
        assert_eq!(stats.backends, 1);
        assert_eq!(stats.tables, 1);
        assert_eq!(stats.acls, 1);
        assert_eq!(stats.directors, 1);
        assert_eq!(stats.penaltyboxes, 1);
        assert_eq!(stats.ratecounters, 1);
        assert!(stats.lines > 0);
    }
}
