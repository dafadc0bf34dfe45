//! Relation resolver: turns symbol trees into graph nodes and edges.
//!
//! For every tracked declaration the builder records a structural edge to
//! its context (`IN_FILE` / `LOCAL_OF`), turns the references to its symbol
//! into `CALLED_BY` / `USED_IN` edges towards the enclosing scope of each use,
//! then recurses into nested declarations and locals. Nodes are memoised by
//! ID, which is what terminates the recursion through locals.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::diagnostics::Diagnostics;
use crate::identity::{build_node, identify};
use crate::kinds::TrackingProfile;
use crate::model::{NodeSet, RelationKind};
use crate::parser::parse_source;
use crate::scanner::{scan_directory, ScanOptions, ScannedFile};
use crate::symbols::{
    move_up_while_parent_found, nearest_call_expression, tracked_descendants, ReferenceShape,
    SymbolProvider,
};

struct FileBuilder<'a, P: SymbolProvider> {
    tree: &'a P,
    profile: &'a TrackingProfile,
    diagnostics: &'a Diagnostics,
    nodes: NodeSet,
    file_id: String,
}

impl<'a, P: SymbolProvider> FileBuilder<'a, P> {
    fn process(&mut self, decl: P::Handle, context_id: &str) {
        let id = identify(self.tree, decl, self.diagnostics);
        if self.nodes.contains(&id) {
            return;
        }

        let mut node = build_node(self.tree, decl, self.diagnostics);
        let structural = if context_id == self.file_id {
            RelationKind::InFile
        } else {
            RelationKind::LocalOf
        };
        node.add_relation(context_id, structural);
        self.nodes.insert(node);

        self.link_references(decl, &id);

        for child in tracked_descendants(self.tree, decl, self.profile) {
            self.process(child, &id);
        }

        match self.tree.locals(decl) {
            Ok(locals) => {
                for local in locals {
                    self.process(local, &id);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to resolve locals of {}: {}", id, e);
                self.diagnostics
                    .record_resolution_failure(self.tree.file_path(), &id, e.to_string());
            }
        }
    }

    fn link_references(&mut self, decl: P::Handle, id: &str) {
        let references = match self.tree.references(decl) {
            Ok(references) => references,
            Err(e) => {
                tracing::warn!("Failed to resolve references of {}: {}", id, e);
                self.diagnostics
                    .record_resolution_failure(self.tree.file_path(), id, e.to_string());
                return;
            }
        };

        for reference in references {
            let (scope, relation) = match &reference.shape {
                ReferenceShape::Call => {
                    let Some(call) = nearest_call_expression(self.tree, reference.node) else {
                        continue;
                    };
                    (
                        move_up_while_parent_found(self.tree, call, self.profile),
                        RelationKind::CalledBy,
                    )
                }
                ReferenceShape::Identifier => (
                    move_up_while_parent_found(self.tree, reference.node, self.profile),
                    RelationKind::UsedIn,
                ),
                ReferenceShape::Other(kind) => {
                    self.diagnostics.record_unhandled_reference(kind);
                    continue;
                }
            };

            let Some(scope) = scope else {
                continue;
            };
            let target = if scope == self.tree.root() {
                self.file_id.clone()
            } else {
                identify(self.tree, scope, self.diagnostics)
            };

            if let Some(node) = self.nodes.get_mut(id) {
                node.add_relation(target, relation);
            }
        }
    }
}

/// Build the node set of one file.
pub fn build_file<P: SymbolProvider>(
    tree: &P,
    profile: &TrackingProfile,
    diagnostics: &Diagnostics,
) -> NodeSet {
    let root = tree.root();
    let file_node = build_node(tree, root, diagnostics);
    let file_id = file_node.id.clone();

    let mut nodes = NodeSet::new();
    nodes.insert(file_node);

    let mut builder = FileBuilder {
        tree,
        profile,
        diagnostics,
        nodes,
        file_id: file_id.clone(),
    };
    for decl in tracked_descendants(tree, root, profile) {
        builder.process(decl, &file_id);
    }

    builder.nodes
}

/// Result of building a whole project.
#[derive(Debug, Default)]
pub struct ProjectGraph {
    pub nodes: NodeSet,
    pub file_count: usize,
    pub failed_files: usize,
    pub duration: Duration,
}

/// Counts that summarise a `ProjectGraph`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    pub file_count: usize,
    pub failed_files: usize,
    pub node_count: usize,
    pub relation_count: usize,
    pub duration_ms: u128,
}

impl ProjectGraph {
    pub fn stats(&self) -> BuildStats {
        BuildStats {
            file_count: self.file_count,
            failed_files: self.failed_files,
            node_count: self.nodes.len(),
            relation_count: self.nodes.relation_count(),
            duration_ms: self.duration.as_millis(),
        }
    }
}

fn build_scanned_file(
    root: &Path,
    file: &ScannedFile,
    profile: &TrackingProfile,
    diagnostics: &Diagnostics,
) -> Option<NodeSet> {
    let source = match fs::read_to_string(root.join(&file.path)) {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", file.path, e);
            diagnostics.record_file_failure(&file.path, e.to_string());
            return None;
        }
    };

    match parse_source(&source, &file.path, &file.language) {
        Ok(tree) => Some(build_file(&tree, profile, diagnostics)),
        Err(e) => {
            tracing::warn!("Failed to parse {}: {}", file.path, e);
            diagnostics.record_file_failure(&file.path, e.to_string());
            None
        }
    }
}

/// Build the given files in parallel and merge them in input order.
pub fn build_files(
    root: &Path,
    files: &[ScannedFile],
    profile: &TrackingProfile,
    diagnostics: &Diagnostics,
) -> ProjectGraph {
    let start = Instant::now();

    let per_file: Vec<Option<NodeSet>> = files
        .par_iter()
        .map(|file| build_scanned_file(root, file, profile, diagnostics))
        .collect();

    let mut graph = ProjectGraph::default();
    for set in per_file {
        match set {
            Some(set) => {
                graph.file_count += 1;
                graph.nodes.merge(set);
            }
            None => graph.failed_files += 1,
        }
    }
    graph.duration = start.elapsed();

    tracing::info!(
        "Built {} nodes / {} relations from {} files in {:?}",
        graph.nodes.len(),
        graph.nodes.relation_count(),
        graph.file_count,
        graph.duration
    );
    graph
}

/// Scan `root` and build every supported file under it.
pub fn build_project(
    root: &Path,
    options: &ScanOptions,
    profile: &TrackingProfile,
    diagnostics: &Diagnostics,
) -> Result<ProjectGraph, String> {
    let scan = scan_directory(root, options)?;
    tracing::info!(
        "Scanned {} files ({} skipped) in {:.1}ms",
        scan.len(),
        scan.skipped_count,
        scan.duration_ms
    );
    Ok(build_files(root, &scan.files, profile, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::SyntaxKind;
    use crate::model::GraphNode;
    use crate::parser::parse_source;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn build(source: &str) -> NodeSet {
        let tree = parse_source(source, "src/app.ts", "typescript").unwrap();
        build_file(&tree, &TrackingProfile::default(), &Diagnostics::new())
    }

    fn by_name<'a>(nodes: &'a NodeSet, kind: &str, name: &str) -> &'a GraphNode {
        nodes
            .iter()
            .find(|n| n.kind == kind && n.name == name)
            .unwrap_or_else(|| panic!("no {} named {}", kind, name))
    }

    fn targets(node: &GraphNode, kind: RelationKind) -> Vec<&str> {
        node.relations
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.target.as_str())
            .collect()
    }

    #[test]
    fn test_f_calls_g() {
        let nodes = build("function g() {}\nfunction f() { g(); }\n");

        let g = by_name(&nodes, "FunctionDeclaration", "g");
        let f = by_name(&nodes, "FunctionDeclaration", "f");

        assert_eq!(targets(g, RelationKind::InFile), vec!["src/app.ts"]);
        assert_eq!(targets(f, RelationKind::InFile), vec!["src/app.ts"]);
        assert_eq!(targets(g, RelationKind::CalledBy), vec![f.id.as_str()]);
        assert!(targets(f, RelationKind::CalledBy).is_empty());
    }

    #[test]
    fn test_recursive_function_calls_itself_once() {
        let nodes = build(
            "function fact(n: number): number {\n  return n <= 1 ? 1 : n * fact(n - 1) + fact(0);\n}\n",
        );

        let fact = by_name(&nodes, "FunctionDeclaration", "fact");
        assert_eq!(targets(fact, RelationKind::CalledBy), vec![fact.id.as_str()]);
        assert_eq!(
            fact.relations.iter().filter(|r| r.target == fact.id).count(),
            1
        );
    }

    #[test]
    fn test_top_level_call_targets_file() {
        let nodes = build("function main() {}\nmain();\n");
        let main = by_name(&nodes, "FunctionDeclaration", "main");
        // The file edge already exists, so the call adds nothing new
        assert_eq!(main.relations.len(), 1);
        assert_eq!(main.relations[0].kind, RelationKind::InFile);
    }

    #[test]
    fn test_usage_in_variable_initializer() {
        let nodes = build("const base = 2;\nfunction area() { const twice = base * 2; return twice; }\n");
        let base = by_name(&nodes, "VariableDeclaration", "base");
        let twice = by_name(&nodes, "VariableDeclaration", "twice");
        let area = by_name(&nodes, "FunctionDeclaration", "area");

        assert_eq!(targets(base, RelationKind::UsedIn), vec![twice.id.as_str()]);
        assert_eq!(targets(twice, RelationKind::LocalOf), vec![area.id.as_str()]);
        assert_eq!(targets(twice, RelationKind::UsedIn), Vec::<&str>::new());
    }

    #[test]
    fn test_parameters_are_local_of_their_function() {
        let nodes = build("function scale(factor: number) { return factor * 2; }\n");
        let scale = by_name(&nodes, "FunctionDeclaration", "scale");
        let factor = by_name(&nodes, "Parameter", "factor");

        assert_eq!(targets(factor, RelationKind::LocalOf), vec![scale.id.as_str()]);
        assert_eq!(factor.type_signature, "number");
        // Used inside the function: the target already exists as LOCAL_OF
        assert_eq!(factor.relations.len(), 1);
    }

    #[test]
    fn test_nested_declarations_and_methods() {
        let nodes = build(
            r#"
export class Queue {
    items: string[] = [];
    push(item: string) { this.items.push(item); this.log(); }
    log() {}
}
"#,
        );

        let queue = by_name(&nodes, "ClassDeclaration", "Queue");
        let push = by_name(&nodes, "MethodDeclaration", "push");
        let log = by_name(&nodes, "MethodDeclaration", "log");
        let items = by_name(&nodes, "PropertyDeclaration", "items");

        assert_eq!(targets(queue, RelationKind::InFile), vec!["src/app.ts"]);
        assert_eq!(targets(push, RelationKind::LocalOf), vec![queue.id.as_str()]);
        assert_eq!(targets(log, RelationKind::CalledBy), vec![push.id.as_str()]);
        assert_eq!(targets(items, RelationKind::UsedIn), vec![push.id.as_str()]);
    }

    #[test]
    fn test_no_duplicate_targets_and_structural_targets_exist() {
        let nodes = build(
            r#"
import { helper } from "./helper";
const limit = 10;
function check(n: number) { return n < limit && helper(n) && helper(limit); }
function run() { check(limit); check(1); }
const render = (value: string) => `${value}:${limit}`;
"#,
        );

        for node in nodes.iter() {
            let unique: HashSet<&str> = node.relations.iter().map(|r| r.target.as_str()).collect();
            assert_eq!(unique.len(), node.relations.len(), "duplicate target on {}", node.id);

            for relation in node.relations.iter().filter(|r| r.kind.is_structural()) {
                assert!(
                    nodes.contains(&relation.target),
                    "{} -> {} missing",
                    node.id,
                    relation.target
                );
            }
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let source = "function a() { b(); }\nfunction b() { a(); }\nconst c = () => a();\n";
        let first: Vec<GraphNode> = build(source).into_vec();
        let second: Vec<GraphNode> = build(source).into_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn test_untracked_kinds_are_skipped() {
        let tree = parse_source(
            "function f() {}\nclass C {}\n",
            "src/app.ts",
            "typescript",
        )
        .unwrap();
        let profile = TrackingProfile::from_names(&["FunctionDeclaration".to_string()], None).unwrap();
        let nodes = build_file(&tree, &profile, &Diagnostics::new());

        assert_eq!(nodes.len(), 2);
        assert!(nodes.iter().all(|n| n.kind != SyntaxKind::ClassDeclaration.as_str()));
    }

    #[test]
    fn test_calls_are_attributed_to_configured_scopes() {
        let source = "function g() {}\nclass C { m() { g(); } }\n";
        let tree = parse_source(source, "src/app.ts", "typescript").unwrap();

        let nodes = build_file(&tree, &TrackingProfile::default(), &Diagnostics::new());
        let m = by_name(&nodes, "MethodDeclaration", "m");
        let g = by_name(&nodes, "FunctionDeclaration", "g");
        assert_eq!(targets(g, RelationKind::CalledBy), vec![m.id.as_str()]);

        // Methods stay nodes but no longer count as callers
        let tracked: Vec<String> = ["FunctionDeclaration", "ClassDeclaration", "MethodDeclaration"]
            .iter()
            .map(|k| k.to_string())
            .collect();
        let scopes = vec!["ClassDeclaration".to_string(), "SourceFile".to_string()];
        let profile = TrackingProfile::from_names(&tracked, Some(&scopes)).unwrap();
        let nodes = build_file(&tree, &profile, &Diagnostics::new());
        let class = by_name(&nodes, "ClassDeclaration", "C");
        let g = by_name(&nodes, "FunctionDeclaration", "g");
        assert_eq!(targets(g, RelationKind::CalledBy), vec![class.id.as_str()]);
        assert!(nodes.iter().any(|n| n.kind == "MethodDeclaration"));
    }

    #[test]
    fn test_resolution_errors_are_recorded_and_walk_continues() {
        let tree = parse_source(
            "export default class {}\nfunction after() {}\n",
            "src/app.ts",
            "typescript",
        )
        .unwrap();
        let diagnostics = Diagnostics::new();
        let nodes = build_file(&tree, &TrackingProfile::default(), &diagnostics);

        assert!(nodes.iter().any(|n| n.name == "after"));
        assert_eq!(diagnostics.report().resolution_failures.len(), 1);
    }

    #[test]
    fn test_build_project_merges_in_scan_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.ts"), "export function b() {}\n").unwrap();
        fs::write(dir.path().join("a.ts"), "export function a() {}\n").unwrap();
        fs::write(dir.path().join("broken.js"), [0xff_u8, 0xfe, 0x00]).unwrap();

        let diagnostics = Diagnostics::new();
        let graph = build_project(
            dir.path(),
            &ScanOptions::default(),
            &TrackingProfile::default(),
            &diagnostics,
        )
        .unwrap();

        let files: Vec<&str> = graph
            .nodes
            .iter()
            .filter(|n| n.is_file)
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(files, vec!["a.ts", "b.ts"]);
        assert_eq!(graph.file_count, 2);
        assert_eq!(graph.failed_files, 1);
        assert_eq!(diagnostics.report().file_failures.len(), 1);

        let stats = graph.stats();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.relation_count, 2);
    }
}
