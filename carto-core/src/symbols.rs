//! The symbol-provider seam and the tree walks built on top of it.

use crate::kinds::{SyntaxKind, TrackingProfile};
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;

/// Errors raised by a provider while answering a semantic query.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("{kind} at line {line} declares no name to resolve")]
    Unbound { kind: String, line: u32 },

    #[error("unknown node handle {0}")]
    UnknownHandle(String),

    #[error("{0}")]
    Provider(String),
}

/// How a reference occurs in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceShape {
    /// The reference is the callee of a call or `new` expression.
    Call,
    /// Any other plain identifier use.
    Identifier,
    /// A shape the resolver does not turn into an edge (raw kind name).
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<H> {
    pub node: H,
    pub shape: ReferenceShape,
}

/// Syntax and symbol queries over one parsed source file.
///
/// Handles are cheap copies that stay valid for the provider's lifetime.
/// Children, references and locals are returned in source order.
pub trait SymbolProvider {
    type Handle: Copy + Eq + Hash + Ord + Debug;

    /// Path of the file, relative to the project root.
    fn file_path(&self) -> &str;

    fn root(&self) -> Self::Handle;

    fn kind(&self, node: Self::Handle) -> SyntaxKind;

    /// Declaration kind name as shown on graph nodes. Unmapped nodes report
    /// the provider's raw kind.
    fn kind_name(&self, node: Self::Handle) -> &str;

    fn parent(&self, node: Self::Handle) -> Option<Self::Handle>;

    fn children(&self, node: Self::Handle) -> &[Self::Handle];

    /// 1-based.
    fn start_line(&self, node: Self::Handle) -> u32;

    /// 1-based, inclusive.
    fn end_line(&self, node: Self::Handle) -> u32;

    /// Source text of the node without leading trivia.
    fn text(&self, node: Self::Handle) -> &str;

    /// Source text including leading trivia (whitespace and comments).
    fn full_text(&self, node: Self::Handle) -> &str;

    /// Name bound by the node's symbol.
    fn symbol_name(&self, node: Self::Handle) -> Option<&str>;

    /// For variable statements, the name of the first declarator.
    fn first_declarator_name(&self, node: Self::Handle) -> Option<&str>;

    /// Module-qualified symbol name (`"module".name`).
    fn qualified_name(&self, node: Self::Handle) -> Option<String>;

    /// Annotated type text, if any.
    fn type_text(&self, node: Self::Handle) -> Option<&str>;

    /// Every reference to the node's symbol, excluding its declaration.
    fn references(&self, node: Self::Handle) -> Result<Vec<Reference<Self::Handle>>, ResolveError>;

    /// Declarations of the symbols local to the node.
    fn locals(&self, node: Self::Handle) -> Result<Vec<Self::Handle>, ResolveError>;
}

/// Nearest ancestor strictly above `node` that is a scope of `profile`.
pub fn move_up_while_parent_found<P: SymbolProvider>(
    tree: &P,
    node: P::Handle,
    profile: &TrackingProfile,
) -> Option<P::Handle> {
    let mut current = tree.parent(node);
    while let Some(candidate) = current {
        if profile.is_scope(tree.kind(candidate)) {
            return Some(candidate);
        }
        current = tree.parent(candidate);
    }
    None
}

/// Nearest call or `new` expression at or above `node`.
pub fn nearest_call_expression<P: SymbolProvider>(tree: &P, node: P::Handle) -> Option<P::Handle> {
    let mut current = Some(node);
    while let Some(candidate) = current {
        if matches!(
            tree.kind(candidate),
            SyntaxKind::CallExpression | SyntaxKind::NewExpression
        ) {
            return Some(candidate);
        }
        current = tree.parent(candidate);
    }
    None
}

/// Tracked nodes below `node` reachable without passing through another
/// tracked node, in source order.
pub fn tracked_descendants<P: SymbolProvider>(
    tree: &P,
    node: P::Handle,
    profile: &TrackingProfile,
) -> Vec<P::Handle> {
    let mut found = Vec::new();
    let mut stack: Vec<P::Handle> = tree.children(node).iter().rev().copied().collect();

    while let Some(current) = stack.pop() {
        if profile.is_tracked(tree.kind(current)) {
            found.push(current);
            continue;
        }
        stack.extend(tree.children(current).iter().rev().copied());
    }

    found
}
