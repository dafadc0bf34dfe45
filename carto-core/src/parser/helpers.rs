//! Helper functions for tree-sitter AST navigation.

use tree_sitter::Node;

/// Get the text content of a node.
pub fn get_node_text<'a>(node: &Node, source: &'a str) -> &'a str {
    let start = node.start_byte();
    let end = node.end_byte();
    if start < source.len() && end <= source.len() && start < end {
        &source[start..end]
    } else {
        ""
    }
}

/// Check if a node has a named child of a specific type.
pub fn has_child_of_type(node: &Node, type_name: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .named_children(&mut cursor)
        .any(|child| child.kind() == type_name);
    found
}

/// Check if a node has an anonymous token child with the given text kind.
pub fn has_token(node: &Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == token);
    found
}

/// Get line number (1-indexed) from a node.
pub fn get_start_line(node: &Node) -> u32 {
    node.start_position().row as u32 + 1
}

/// Get end line number (1-indexed) from a node.
pub fn get_end_line(node: &Node) -> u32 {
    node.end_position().row as u32 + 1
}

/// Byte offset where the node's leading trivia begins: the end of the
/// previous non-comment sibling, or the start of the parent.
pub fn leading_trivia_start(node: &Node) -> usize {
    let mut prev = node.prev_sibling();
    while let Some(sibling) = prev {
        if sibling.kind() != "comment" {
            return sibling.end_byte();
        }
        prev = sibling.prev_sibling();
    }
    node.parent().map(|p| p.start_byte()).unwrap_or(0)
}

/// Strip the leading `:` (and optional `?`) of a type annotation.
pub fn strip_annotation(text: &str) -> &str {
    text.trim_start()
        .trim_start_matches('?')
        .trim_start_matches(':')
        .trim()
}

/// Strip matching quotes around a module name literal.
pub fn unquote(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}
