//! Arena-backed syntax tree with resolved symbols.
//!
//! Produced by the tree-sitter front end; owns its source text so it can be
//! moved across threads independently of the tree-sitter parse.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::kinds::SyntaxKind;
use crate::symbols::{Reference, ReferenceShape, ResolveError, SymbolProvider};

/// Index of a node in a `SourceTree` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub(crate) u32);

impl NodeIdx {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    /// Grammar node kind as reported by tree-sitter.
    pub raw_kind: &'static str,
    /// Field name under which this node hangs off its parent.
    pub field: Option<&'static str>,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    pub start_byte: usize,
    pub end_byte: usize,
    /// Start of the leading trivia.
    pub full_start: usize,
    pub start_line: u32,
    pub end_line: u32,
    pub name: Option<String>,
    /// Identifier node carrying `name`.
    pub name_node: Option<NodeIdx>,
    pub type_text: Option<String>,
    /// Callee position of a call or `new` expression.
    pub is_callee: bool,
}

#[derive(Debug)]
pub struct SourceTree {
    pub(crate) path: String,
    pub(crate) module_name: String,
    pub(crate) source: String,
    pub(crate) nodes: Vec<SyntaxNode>,
    /// Declaration -> references to it, for every declaration that binds a name.
    pub(crate) references: HashMap<NodeIdx, Vec<NodeIdx>>,
    /// Scope -> declarations bound in it.
    pub(crate) scope_bindings: HashMap<NodeIdx, Vec<NodeIdx>>,
}

impl SourceTree {
    pub(crate) fn new(path: &str, source: String) -> Self {
        let module_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .unwrap_or_default()
            .to_string();

        Self {
            path: path.to_string(),
            module_name,
            source,
            nodes: Vec::new(),
            references: HashMap::new(),
            scope_bindings: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: NodeIdx) -> &SyntaxNode {
        &self.nodes[idx.index()]
    }

    pub(crate) fn node_mut(&mut self, idx: NodeIdx) -> &mut SyntaxNode {
        &mut self.nodes[idx.index()]
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Iterate all nodes in source (pre-)order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        (0..self.nodes.len() as u32).map(NodeIdx)
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> &str {
        self.source.get(start..end).unwrap_or("")
    }

    /// First child hanging off `field`.
    pub fn child_by_field(&self, idx: NodeIdx, field: &str) -> Option<NodeIdx> {
        self.node(idx)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).field == Some(field))
    }

    fn shape_of(&self, reference: NodeIdx) -> ReferenceShape {
        let node = self.node(reference);
        if node.is_callee {
            return ReferenceShape::Call;
        }
        match node.parent.map(|p| self.node(p).raw_kind) {
            Some("export_specifier") => ReferenceShape::Other("ExportSpecifier".to_string()),
            _ => ReferenceShape::Identifier,
        }
    }

    /// Whether `kind` must bind a name when it appears as a declaration.
    fn requires_name(kind: SyntaxKind) -> bool {
        matches!(
            kind,
            SyntaxKind::FunctionDeclaration
                | SyntaxKind::ClassDeclaration
                | SyntaxKind::InterfaceDeclaration
                | SyntaxKind::EnumDeclaration
                | SyntaxKind::TypeAliasDeclaration
        )
    }

    fn check(&self, idx: NodeIdx) -> Result<(), ResolveError> {
        if idx.index() < self.nodes.len() {
            Ok(())
        } else {
            Err(ResolveError::UnknownHandle(idx.to_string()))
        }
    }
}

impl SymbolProvider for SourceTree {
    type Handle = NodeIdx;

    fn file_path(&self) -> &str {
        &self.path
    }

    fn root(&self) -> NodeIdx {
        NodeIdx(0)
    }

    fn kind(&self, node: NodeIdx) -> SyntaxKind {
        self.node(node).kind
    }

    fn kind_name(&self, node: NodeIdx) -> &str {
        let n = self.node(node);
        match n.kind {
            SyntaxKind::Unknown => n.raw_kind,
            kind => kind.as_str(),
        }
    }

    fn parent(&self, node: NodeIdx) -> Option<NodeIdx> {
        self.node(node).parent
    }

    fn children(&self, node: NodeIdx) -> &[NodeIdx] {
        &self.node(node).children
    }

    fn start_line(&self, node: NodeIdx) -> u32 {
        self.node(node).start_line
    }

    fn end_line(&self, node: NodeIdx) -> u32 {
        self.node(node).end_line
    }

    fn text(&self, node: NodeIdx) -> &str {
        let n = self.node(node);
        self.slice(n.start_byte, n.end_byte)
    }

    fn full_text(&self, node: NodeIdx) -> &str {
        let n = self.node(node);
        self.slice(n.full_start, n.end_byte)
    }

    fn symbol_name(&self, node: NodeIdx) -> Option<&str> {
        self.node(node).name.as_deref()
    }

    fn first_declarator_name(&self, node: NodeIdx) -> Option<&str> {
        self.node(node)
            .children
            .iter()
            .find(|&&c| self.node(c).kind == SyntaxKind::VariableDeclaration)
            .and_then(|&c| self.node(c).name.as_deref())
    }

    fn qualified_name(&self, node: NodeIdx) -> Option<String> {
        let name = self.node(node).name.as_deref()?;
        Some(format!("\"{}\".{}", self.module_name, name))
    }

    fn type_text(&self, node: NodeIdx) -> Option<&str> {
        self.node(node).type_text.as_deref()
    }

    fn references(&self, node: NodeIdx) -> Result<Vec<Reference<NodeIdx>>, ResolveError> {
        self.check(node)?;
        if let Some(refs) = self.references.get(&node) {
            return Ok(refs
                .iter()
                .map(|&r| Reference {
                    node: r,
                    shape: self.shape_of(r),
                })
                .collect());
        }

        let n = self.node(node);
        if n.name.is_none() && Self::requires_name(n.kind) {
            return Err(ResolveError::Unbound {
                kind: n.kind.to_string(),
                line: n.start_line,
            });
        }
        Ok(Vec::new())
    }

    fn locals(&self, node: NodeIdx) -> Result<Vec<NodeIdx>, ResolveError> {
        self.check(node)?;
        let mut locals: Vec<NodeIdx> = self.scope_bindings.get(&node).cloned().unwrap_or_default();

        if let Some(body) = self.child_by_field(node, "body") {
            if self.node(body).kind == SyntaxKind::Block {
                if let Some(inner) = self.scope_bindings.get(&body) {
                    locals.extend(inner.iter().copied());
                }
            }
        }

        locals.sort();
        locals.dedup();
        Ok(locals)
    }
}
