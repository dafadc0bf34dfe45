//! Graph node model shared by the builder, the embed phase and the loader.

use crate::kinds::SyntaxKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kinds of directed edges between graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    /// Top-level declaration -> its file.
    InFile,
    /// Nested declaration or local symbol -> its enclosing declaration.
    LocalOf,
    /// Declaration -> the scope containing a call site of it.
    CalledBy,
    /// Declaration -> the scope containing a non-call reference to it.
    UsedIn,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::InFile => "IN_FILE",
            RelationKind::LocalOf => "LOCAL_OF",
            RelationKind::CalledBy => "CALLED_BY",
            RelationKind::UsedIn => "USED_IN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "IN_FILE" => Some(RelationKind::InFile),
            "LOCAL_OF" => Some(RelationKind::LocalOf),
            "CALLED_BY" => Some(RelationKind::CalledBy),
            "USED_IN" => Some(RelationKind::UsedIn),
            _ => None,
        }
    }

    /// Structural edges (as opposed to reference edges).
    pub fn is_structural(&self) -> bool {
        matches!(self, RelationKind::InFile | RelationKind::LocalOf)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An outgoing edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub target: String,
    pub kind: RelationKind,
}

/// Coarse category label attached to every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DescriptorClass {
    File,
    Function,
    Class,
    Variable,
    Member,
    Import,
    Enum,
    Interface,
    Type,
    Namespace,
    Module,
    Styleguide,
    #[default]
    Node,
}

impl DescriptorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DescriptorClass::File => "File",
            DescriptorClass::Function => "Function",
            DescriptorClass::Class => "Class",
            DescriptorClass::Variable => "Variable",
            DescriptorClass::Member => "Member",
            DescriptorClass::Import => "Import",
            DescriptorClass::Enum => "Enum",
            DescriptorClass::Interface => "Interface",
            DescriptorClass::Type => "Type",
            DescriptorClass::Namespace => "Namespace",
            DescriptorClass::Module => "Module",
            DescriptorClass::Styleguide => "Styleguide",
            DescriptorClass::Node => "Node",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let all = [
            DescriptorClass::File,
            DescriptorClass::Function,
            DescriptorClass::Class,
            DescriptorClass::Variable,
            DescriptorClass::Member,
            DescriptorClass::Import,
            DescriptorClass::Enum,
            DescriptorClass::Interface,
            DescriptorClass::Type,
            DescriptorClass::Namespace,
            DescriptorClass::Module,
            DescriptorClass::Styleguide,
            DescriptorClass::Node,
        ];
        all.into_iter().find(|d| d.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for DescriptorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map a syntax kind to its descriptor class.
pub fn classify(kind: SyntaxKind) -> DescriptorClass {
    match kind {
        SyntaxKind::SourceFile => DescriptorClass::File,
        SyntaxKind::FunctionDeclaration
        | SyntaxKind::ArrowFunction
        | SyntaxKind::FunctionExpression => DescriptorClass::Function,
        SyntaxKind::ClassDeclaration => DescriptorClass::Class,
        SyntaxKind::Parameter
        | SyntaxKind::BindingElement
        | SyntaxKind::VariableDeclaration
        | SyntaxKind::VariableStatement
        | SyntaxKind::ExpressionStatement => DescriptorClass::Variable,
        SyntaxKind::MethodDeclaration
        | SyntaxKind::PropertyDeclaration
        | SyntaxKind::GetAccessor
        | SyntaxKind::SetAccessor
        | SyntaxKind::Constructor
        | SyntaxKind::PropertySignature
        | SyntaxKind::MethodSignature
        | SyntaxKind::EnumMember => DescriptorClass::Member,
        SyntaxKind::ImportDeclaration | SyntaxKind::ImportSpecifier => DescriptorClass::Import,
        SyntaxKind::EnumDeclaration => DescriptorClass::Enum,
        SyntaxKind::InterfaceDeclaration => DescriptorClass::Interface,
        SyntaxKind::TypeAliasDeclaration => DescriptorClass::Type,
        SyntaxKind::NamespaceDeclaration => DescriptorClass::Namespace,
        SyntaxKind::ModuleDeclaration => DescriptorClass::Module,
        _ => DescriptorClass::Node,
    }
}

/// One declaration or file in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    /// Raw declaration kind name (`"File"` for files).
    pub kind: String,
    pub descriptor: DescriptorClass,
    #[serde(rename = "type")]
    pub type_signature: String,
    pub code: String,
    #[serde(default)]
    pub comments: Vec<String>,
    pub file_path: String,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub name_embedding: Vec<f32>,
    #[serde(default)]
    pub code_embedding: Vec<f32>,
    #[serde(default)]
    pub is_file: bool,
}

impl GraphNode {
    /// Add an outgoing edge unless one to the same target already exists.
    ///
    /// Returns `true` when the edge was added.
    pub fn add_relation(&mut self, target: impl Into<String>, kind: RelationKind) -> bool {
        let target = target.into();
        if self.has_relation_to(&target) {
            return false;
        }
        self.relations.push(Relation { target, kind });
        true
    }

    pub fn has_relation_to(&self, target: &str) -> bool {
        self.relations.iter().any(|r| r.target == target)
    }

    /// Whether both embeddings have been filled.
    pub fn is_embedded(&self) -> bool {
        !self.name_embedding.is_empty() && !self.code_embedding.is_empty()
    }
}

/// Insertion-ordered set of nodes keyed by ID.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Returns `false` (and drops `node`) if the ID is taken.
    pub fn insert(&mut self, node: GraphNode) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.index.get(id).map(|&i| &mut self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GraphNode> {
        self.nodes.iter()
    }

    pub fn as_slice(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn as_mut_slice(&mut self) -> &mut [GraphNode] {
        &mut self.nodes
    }

    pub fn into_vec(self) -> Vec<GraphNode> {
        self.nodes
    }

    /// Append every node of `other` whose ID is not already present.
    /// Returns the number of nodes added.
    pub fn merge(&mut self, other: NodeSet) -> usize {
        other
            .nodes
            .into_iter()
            .map(|node| self.insert(node))
            .filter(|added| *added)
            .count()
    }

    /// Total number of outgoing edges.
    pub fn relation_count(&self) -> usize {
        self.nodes.iter().map(|n| n.relations.len()).sum()
    }
}

impl FromIterator<GraphNode> for NodeSet {
    fn from_iter<I: IntoIterator<Item = GraphNode>>(iter: I) -> Self {
        let mut set = NodeSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<GraphNode> for NodeSet {
    fn extend<I: IntoIterator<Item = GraphNode>>(&mut self, iter: I) {
        for node in iter {
            self.insert(node);
        }
    }
}

impl IntoIterator for NodeSet {
    type Item = GraphNode;
    type IntoIter = std::vec::IntoIter<GraphNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a NodeSet {
    type Item = &'a GraphNode;
    type IntoIter = std::slice::Iter<'a, GraphNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            name: id.to_string(),
            kind: "FunctionDeclaration".to_string(),
            descriptor: DescriptorClass::Function,
            type_signature: "any".to_string(),
            code: String::new(),
            comments: Vec::new(),
            file_path: "a.ts".to_string(),
            relations: Vec::new(),
            name_embedding: Vec::new(),
            code_embedding: Vec::new(),
            is_file: false,
        }
    }

    #[test]
    fn test_relation_kind_roundtrip() {
        for kind in [
            RelationKind::InFile,
            RelationKind::LocalOf,
            RelationKind::CalledBy,
            RelationKind::UsedIn,
        ] {
            assert_eq!(RelationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RelationKind::parse("called_by"), Some(RelationKind::CalledBy));
        assert_eq!(RelationKind::parse("CONTAINS"), None);
    }

    #[test]
    fn test_relation_kind_serde_matches_wire_name() {
        let json = serde_json::to_string(&RelationKind::CalledBy).unwrap();
        assert_eq!(json, "\"CALLED_BY\"");
    }

    #[test]
    fn test_add_relation_first_write_wins() {
        let mut n = node("f");
        assert!(n.add_relation("g", RelationKind::CalledBy));
        assert!(!n.add_relation("g", RelationKind::UsedIn));
        assert_eq!(n.relations.len(), 1);
        assert_eq!(n.relations[0].kind, RelationKind::CalledBy);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(SyntaxKind::SourceFile), DescriptorClass::File);
        assert_eq!(classify(SyntaxKind::ArrowFunction), DescriptorClass::Function);
        assert_eq!(classify(SyntaxKind::Parameter), DescriptorClass::Variable);
        assert_eq!(classify(SyntaxKind::GetAccessor), DescriptorClass::Member);
        assert_eq!(classify(SyntaxKind::TemplateExpression), DescriptorClass::Node);
        assert_eq!(classify(SyntaxKind::Unknown), DescriptorClass::Node);
    }

    #[test]
    fn test_node_set_insert_and_merge() {
        let mut set: NodeSet = vec![node("a"), node("b")].into_iter().collect();
        assert!(!set.insert(node("a")));
        assert_eq!(set.len(), 2);

        let other: NodeSet = vec![node("b"), node("c")].into_iter().collect();
        assert_eq!(set.merge(other), 1);

        let ids: Vec<&str> = set.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(set.get("c").is_some());
    }

    #[test]
    fn test_graph_node_serializes_type_field() {
        let json = serde_json::to_value(node("a")).unwrap();
        assert_eq!(json["type"], "any");
        assert!(json.get("type_signature").is_none());
    }
}
