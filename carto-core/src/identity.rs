//! Node naming, identification and construction.

use crate::diagnostics::Diagnostics;
use crate::kinds::SyntaxKind;
use crate::model::{classify, GraphNode};
use crate::symbols::SymbolProvider;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Type sentinel for containers whose type is their contents.
pub const OPAQUE_TYPE: &str = "opaque";

/// Type sentinel when no annotation resolves.
pub const ANY_TYPE: &str = "any";

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\*[\s\S]*?\*/|//.*").expect("comment regex is valid"));

/// Declared name of a node, resolved per kind.
///
/// Kinds without a dedicated rule fall back to the second segment of the
/// qualified name and are reported to `diagnostics`.
pub fn resolve_name<P: SymbolProvider>(tree: &P, node: P::Handle, diagnostics: &Diagnostics) -> String {
    let kind = tree.kind(node);
    match kind {
        SyntaxKind::SourceFile => Path::new(tree.file_path())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        SyntaxKind::VariableStatement => tree.first_declarator_name(node).unwrap_or_default().to_string(),
        SyntaxKind::FunctionDeclaration
        | SyntaxKind::ArrowFunction
        | SyntaxKind::FunctionExpression
        | SyntaxKind::Identifier
        | SyntaxKind::PropertyAccessExpression
        | SyntaxKind::TypeAliasDeclaration
        | SyntaxKind::EnumDeclaration
        | SyntaxKind::MethodDeclaration
        | SyntaxKind::VariableDeclaration
        | SyntaxKind::InterfaceDeclaration
        | SyntaxKind::PropertyDeclaration
        | SyntaxKind::ClassDeclaration
        | SyntaxKind::ModuleDeclaration
        | SyntaxKind::NamespaceDeclaration
        | SyntaxKind::Parameter
        | SyntaxKind::ImportSpecifier => tree.symbol_name(node).unwrap_or_default().to_string(),
        SyntaxKind::TemplateExpression => tree
            .parent(node)
            .and_then(|p| tree.symbol_name(p))
            .unwrap_or_default()
            .to_string(),
        _ => {
            diagnostics.record_unknown_name_kind(tree.kind_name(node));
            tree.qualified_name(node)
                .and_then(|q| q.split('.').nth(1).map(str::to_string))
                .unwrap_or_default()
        }
    }
}

/// Stable identifier: the file path for files, otherwise
/// `{file}:{name}:{start}:{end}:{kind code}`.
pub fn identify<P: SymbolProvider>(tree: &P, node: P::Handle, diagnostics: &Diagnostics) -> String {
    let kind = tree.kind(node);
    if kind == SyntaxKind::SourceFile {
        return tree.file_path().to_string();
    }
    let name = resolve_name(tree, node, diagnostics);
    format_id(tree.file_path(), &name, tree.start_line(node), tree.end_line(node), kind)
}

pub fn format_id(file_path: &str, name: &str, start_line: u32, end_line: u32, kind: SyntaxKind) -> String {
    format!("{}:{}:{}:{}:{}", file_path, name, start_line, end_line, kind.code())
}

/// `//` and `/* */` comments in `text`, trimmed, in order.
pub fn extract_comments(text: &str) -> Vec<String> {
    COMMENT_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Build the graph node for `node`, without relations or embeddings.
pub fn build_node<P: SymbolProvider>(tree: &P, node: P::Handle, diagnostics: &Diagnostics) -> GraphNode {
    let kind = tree.kind(node);
    let is_file = kind == SyntaxKind::SourceFile;
    let name = resolve_name(tree, node, diagnostics);

    let id = if is_file {
        tree.file_path().to_string()
    } else {
        format_id(tree.file_path(), &name, tree.start_line(node), tree.end_line(node), kind)
    };

    let type_signature = if kind.is_container() {
        OPAQUE_TYPE.to_string()
    } else {
        tree.type_text(node)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(ANY_TYPE)
            .to_string()
    };

    let code = if kind.is_container() {
        String::new()
    } else {
        tree.text(node).trim().to_string()
    };

    GraphNode {
        id,
        name,
        kind: if is_file { "File".to_string() } else { tree.kind_name(node).to_string() },
        descriptor: classify(kind),
        type_signature,
        code,
        comments: extract_comments(tree.full_text(node)),
        file_path: tree.file_path().to_string(),
        relations: Vec::new(),
        name_embedding: Vec::new(),
        code_embedding: Vec::new(),
        is_file,
    }
}
