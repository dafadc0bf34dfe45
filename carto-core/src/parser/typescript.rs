//! TypeScript/JavaScript front end using tree-sitter.
//!
//! Parsing happens in three steps:
//! 1. lower every named tree-sitter node into the `SourceTree` arena,
//!    mapping grammar kinds onto `SyntaxKind`;
//! 2. annotate declarations with their bound name and annotated type;
//! 3. bind declarations to lexical scopes and resolve identifier uses
//!    against them (file-local, no type inference).

use std::collections::{HashMap, HashSet};

use tree_sitter::{Language, Node, Parser};

use super::helpers::{
    get_end_line, get_node_text, get_start_line, has_child_of_type, has_token,
    leading_trivia_start, strip_annotation, unquote,
};
use super::tree::{NodeIdx, SourceTree, SyntaxNode};
use super::{Dialect, ParseError};
use crate::kinds::SyntaxKind;
use crate::symbols::SymbolProvider;

/// Parse TypeScript/JavaScript source code into a resolved `SourceTree`.
pub fn parse(source: &str, file_path: &str, dialect: Dialect) -> Result<SourceTree, ParseError> {
    let mut parser = Parser::new();

    let language: Language = match dialect {
        Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        Dialect::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
    };

    parser
        .set_language(&language)
        .map_err(|e| ParseError::Grammar(e.to_string()))?;

    let ts_tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::NoTree(file_path.to_string()))?;
    let root = ts_tree.root_node();
    if root.has_error() {
        tracing::debug!("{} has syntax errors, continuing with a partial tree", file_path);
    }

    let mut tree = SourceTree::new(file_path, source.to_string());
    lower(&mut tree, root);
    annotate(&mut tree);
    Binder::new(&mut tree).run();

    Ok(tree)
}

// ============================================================================
// Lowering
// ============================================================================

struct Pending<'a> {
    node: Node<'a>,
    parent: Option<NodeIdx>,
    field: Option<&'static str>,
    is_callee: bool,
}

fn lower(tree: &mut SourceTree, root: Node<'_>) {
    let mut stack = vec![Pending {
        node: root,
        parent: None,
        field: None,
        is_callee: false,
    }];

    // Explicit stack: deeply nested expressions must not exhaust the thread stack
    while let Some(pending) = stack.pop() {
        let node = pending.node;
        let idx = NodeIdx(tree.nodes.len() as u32);
        let kind = map_kind(&node, &tree.source);

        let anchor = export_anchor(&node, kind);
        tree.nodes.push(SyntaxNode {
            kind,
            raw_kind: node.kind(),
            field: pending.field,
            parent: pending.parent,
            children: Vec::new(),
            start_byte: anchor.start_byte(),
            end_byte: node.end_byte(),
            full_start: leading_trivia_start(&anchor),
            start_line: get_start_line(&anchor),
            end_line: get_end_line(&node),
            name: None,
            name_node: None,
            type_text: None,
            is_callee: pending.is_callee,
        });
        if let Some(parent) = pending.parent {
            tree.node_mut(parent).children.push(idx);
        }

        let callee_field = match node.kind() {
            "call_expression" => Some("function"),
            "new_expression" => Some("constructor"),
            "member_expression" if pending.is_callee => Some("property"),
            _ => None,
        };

        let mut children = Vec::new();
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if child.is_named() && !child.is_extra() && child.kind() != "comment" {
                    let field = cursor.field_name();
                    children.push(Pending {
                        node: child,
                        parent: Some(idx),
                        field,
                        is_callee: callee_field.is_some() && field == callee_field,
                    });
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
        stack.extend(children.into_iter().rev());
    }
}

/// Exported declarations take their extent (and leading comments) from the
/// enclosing `export` statement.
fn export_anchor<'a>(node: &Node<'a>, kind: SyntaxKind) -> Node<'a> {
    let exportable = matches!(
        kind,
        SyntaxKind::FunctionDeclaration
            | SyntaxKind::ClassDeclaration
            | SyntaxKind::InterfaceDeclaration
            | SyntaxKind::EnumDeclaration
            | SyntaxKind::TypeAliasDeclaration
            | SyntaxKind::VariableStatement
            | SyntaxKind::NamespaceDeclaration
            | SyntaxKind::ModuleDeclaration
    );
    match node.parent() {
        Some(parent) if exportable && parent.kind() == "export_statement" => parent,
        _ => *node,
    }
}

fn map_kind(node: &Node, source: &str) -> SyntaxKind {
    match node.kind() {
        "program" => SyntaxKind::SourceFile,
        "function_declaration" | "generator_function_declaration" => {
            SyntaxKind::FunctionDeclaration
        }
        "arrow_function" => SyntaxKind::ArrowFunction,
        "function_expression" | "function" | "generator_function" => {
            SyntaxKind::FunctionExpression
        }
        "class_declaration" | "abstract_class_declaration" | "class" => {
            SyntaxKind::ClassDeclaration
        }
        "interface_declaration" => SyntaxKind::InterfaceDeclaration,
        "enum_declaration" => SyntaxKind::EnumDeclaration,
        "enum_assignment" => SyntaxKind::EnumMember,
        "type_alias_declaration" => SyntaxKind::TypeAliasDeclaration,
        "lexical_declaration" | "variable_declaration" => SyntaxKind::VariableStatement,
        "variable_declarator" => SyntaxKind::VariableDeclaration,
        "public_field_definition" | "field_definition" => SyntaxKind::PropertyDeclaration,
        "method_definition" => method_kind(node, source),
        "property_signature" => SyntaxKind::PropertySignature,
        "method_signature" | "abstract_method_signature" => SyntaxKind::MethodSignature,
        "internal_module" => SyntaxKind::NamespaceDeclaration,
        "module" => SyntaxKind::ModuleDeclaration,
        "template_string" if has_child_of_type(node, "template_substitution") => {
            SyntaxKind::TemplateExpression
        }
        "import_statement" => SyntaxKind::ImportDeclaration,
        "import_specifier" => SyntaxKind::ImportSpecifier,
        "export_specifier" => SyntaxKind::ExportSpecifier,
        "required_parameter" | "optional_parameter" => SyntaxKind::Parameter,
        "identifier"
        | "type_identifier"
        | "property_identifier"
        | "private_property_identifier"
        | "shorthand_property_identifier" => SyntaxKind::Identifier,
        "member_expression" => SyntaxKind::PropertyAccessExpression,
        "call_expression" => SyntaxKind::CallExpression,
        "new_expression" => SyntaxKind::NewExpression,
        "expression_statement" => SyntaxKind::ExpressionStatement,
        "statement_block" => SyntaxKind::Block,
        _ => SyntaxKind::Unknown,
    }
}

fn method_kind(node: &Node, source: &str) -> SyntaxKind {
    let is_constructor = node
        .child_by_field_name("name")
        .map(|name| get_node_text(&name, source) == "constructor")
        .unwrap_or(false);

    if is_constructor {
        SyntaxKind::Constructor
    } else if has_token(node, "get") {
        SyntaxKind::GetAccessor
    } else if has_token(node, "set") {
        SyntaxKind::SetAccessor
    } else {
        SyntaxKind::MethodDeclaration
    }
}

// ============================================================================
// Names and types
// ============================================================================

fn is_identifier_like(tree: &SourceTree, idx: NodeIdx) -> bool {
    matches!(
        tree.node(idx).raw_kind,
        "identifier" | "type_identifier" | "property_identifier" | "private_property_identifier"
    )
}

fn text_of(tree: &SourceTree, idx: NodeIdx) -> String {
    let node = tree.node(idx);
    tree.slice(node.start_byte, node.end_byte).to_string()
}

/// Name from a field holding an identifier-like node.
fn field_name(tree: &SourceTree, idx: NodeIdx, field: &str) -> (Option<String>, Option<NodeIdx>) {
    match tree.child_by_field(idx, field) {
        Some(child) if is_identifier_like(tree, child) => (Some(text_of(tree, child)), Some(child)),
        Some(child) => (Some(unquote(&text_of(tree, child)).to_string()), None),
        None => (None, None),
    }
}

fn declared_name(tree: &SourceTree, idx: NodeIdx) -> (Option<String>, Option<NodeIdx>) {
    let node = tree.node(idx);
    match node.kind {
        SyntaxKind::Identifier => (Some(text_of(tree, idx)), None),
        SyntaxKind::PropertyAccessExpression => (field_name(tree, idx, "property").0, None),
        SyntaxKind::VariableDeclaration => match tree.child_by_field(idx, "name") {
            Some(child) if is_identifier_like(tree, child) => {
                (Some(text_of(tree, child)), Some(child))
            }
            _ => (None, None),
        },
        SyntaxKind::Parameter => match tree.child_by_field(idx, "pattern") {
            Some(child) if is_identifier_like(tree, child) => {
                (Some(text_of(tree, child)), Some(child))
            }
            _ => (None, None),
        },
        SyntaxKind::PropertyDeclaration => {
            let by_name = field_name(tree, idx, "name");
            if by_name.0.is_some() {
                by_name
            } else {
                field_name(tree, idx, "property")
            }
        }
        SyntaxKind::ImportSpecifier => {
            let alias = field_name(tree, idx, "alias");
            if alias.0.is_some() {
                alias
            } else {
                field_name(tree, idx, "name")
            }
        }
        SyntaxKind::FunctionExpression
        | SyntaxKind::ArrowFunction
        | SyntaxKind::ClassDeclaration => {
            let own = field_name(tree, idx, "name");
            if own.0.is_some() {
                return own;
            }
            // Anonymous functions and classes take the name they are assigned to
            let assigned = node.field == Some("value")
                && node.parent.is_some_and(|p| {
                    matches!(
                        tree.node(p).kind,
                        SyntaxKind::VariableDeclaration | SyntaxKind::PropertyDeclaration
                    )
                });
            match node.parent {
                Some(parent) if assigned => (tree.node(parent).name.clone(), None),
                _ => (None, None),
            }
        }
        SyntaxKind::FunctionDeclaration
        | SyntaxKind::InterfaceDeclaration
        | SyntaxKind::EnumDeclaration
        | SyntaxKind::EnumMember
        | SyntaxKind::TypeAliasDeclaration
        | SyntaxKind::NamespaceDeclaration
        | SyntaxKind::ModuleDeclaration
        | SyntaxKind::MethodDeclaration
        | SyntaxKind::GetAccessor
        | SyntaxKind::SetAccessor
        | SyntaxKind::Constructor
        | SyntaxKind::PropertySignature
        | SyntaxKind::MethodSignature => field_name(tree, idx, "name"),
        _ => (None, None),
    }
}

fn annotation(tree: &SourceTree, idx: NodeIdx, field: &str) -> Option<String> {
    tree.child_by_field(idx, field)
        .map(|t| strip_annotation(&text_of(tree, t)).to_string())
}

fn declared_type(tree: &SourceTree, idx: NodeIdx) -> Option<String> {
    let node = tree.node(idx);
    match node.kind {
        SyntaxKind::VariableDeclaration
        | SyntaxKind::PropertyDeclaration
        | SyntaxKind::PropertySignature
        | SyntaxKind::Parameter => annotation(tree, idx, "type"),
        kind if kind.is_function_like() || kind == SyntaxKind::MethodSignature => {
            let params = tree
                .child_by_field(idx, "parameters")
                .or_else(|| tree.child_by_field(idx, "parameter"))
                .map(|p| text_of(tree, p))
                .unwrap_or_else(|| "()".to_string());
            let ret = annotation(tree, idx, "return_type").unwrap_or_else(|| "any".to_string());
            Some(format!("{} => {}", params, ret))
        }
        SyntaxKind::EnumDeclaration => node.name.as_ref().map(|n| format!("typeof {}", n)),
        SyntaxKind::InterfaceDeclaration => node.name.clone(),
        SyntaxKind::TypeAliasDeclaration => tree.child_by_field(idx, "value").map(|v| text_of(tree, v)),
        _ => None,
    }
}

/// Fill in names and types. Runs in arena order so parents are named first.
fn annotate(tree: &mut SourceTree) {
    for i in 0..tree.nodes.len() {
        let idx = NodeIdx(i as u32);
        let (name, name_node) = declared_name(tree, idx);
        let node = tree.node_mut(idx);
        node.name = name;
        node.name_node = name_node;
    }
    for i in 0..tree.nodes.len() {
        let idx = NodeIdx(i as u32);
        let type_text = declared_type(tree, idx);
        tree.node_mut(idx).type_text = type_text;
    }
}

// ============================================================================
// Binding and resolution
// ============================================================================

struct Binder<'t> {
    tree: &'t mut SourceTree,
    /// scope -> name -> declaration
    bindings: HashMap<NodeIdx, HashMap<String, NodeIdx>>,
    /// class -> member name -> member declaration
    members: HashMap<NodeIdx, HashMap<String, NodeIdx>>,
    /// Identifier nodes that name a declaration rather than use it.
    declaration_names: HashSet<NodeIdx>,
}

impl<'t> Binder<'t> {
    fn new(tree: &'t mut SourceTree) -> Self {
        Self {
            tree,
            bindings: HashMap::new(),
            members: HashMap::new(),
            declaration_names: HashSet::new(),
        }
    }

    fn run(mut self) {
        let count = self.tree.nodes.len();
        for i in 0..count {
            self.declare(NodeIdx(i as u32));
        }
        for i in 0..count {
            self.resolve(NodeIdx(i as u32));
        }
    }

    fn is_scope(&self, idx: NodeIdx) -> bool {
        let node = self.tree.node(idx);
        node.kind == SyntaxKind::SourceFile
            || node.kind == SyntaxKind::Block
            || node.kind.is_function_like()
            || matches!(node.raw_kind, "for_statement" | "for_in_statement" | "catch_clause")
    }

    fn is_var_scope(&self, idx: NodeIdx) -> bool {
        let kind = self.tree.node(idx).kind;
        kind == SyntaxKind::SourceFile || kind.is_function_like()
    }

    fn scope_above(&self, idx: NodeIdx) -> NodeIdx {
        let mut current = self.tree.node(idx).parent;
        while let Some(candidate) = current {
            if self.is_scope(candidate) {
                return candidate;
            }
            current = self.tree.node(candidate).parent;
        }
        self.tree.root()
    }

    fn var_scope_above(&self, idx: NodeIdx) -> NodeIdx {
        let mut current = self.tree.node(idx).parent;
        while let Some(candidate) = current {
            if self.is_var_scope(candidate) {
                return candidate;
            }
            current = self.tree.node(candidate).parent;
        }
        self.tree.root()
    }

    fn bind(&mut self, scope: NodeIdx, decl: NodeIdx) {
        let node = self.tree.node(decl);
        let Some(name) = node.name.clone() else {
            return;
        };
        if let Some(name_node) = node.name_node {
            self.declaration_names.insert(name_node);
        }

        let table = self.bindings.entry(scope).or_default();
        if table.contains_key(&name) {
            return;
        }
        table.insert(name, decl);
        self.tree.scope_bindings.entry(scope).or_default().push(decl);
        self.tree.references.entry(decl).or_default();
    }

    /// Turn an identifier into a declaration of its own name.
    fn retag(&mut self, idx: NodeIdx, kind: SyntaxKind) {
        let name = text_of(self.tree, idx);
        let node = self.tree.node_mut(idx);
        node.kind = kind;
        node.name = Some(name);
        node.name_node = Some(idx);
    }

    fn bind_pattern(&mut self, idx: NodeIdx, scope: NodeIdx) {
        match self.tree.node(idx).raw_kind {
            "identifier" | "shorthand_property_identifier_pattern" => {
                self.retag(idx, SyntaxKind::BindingElement);
                self.bind(scope, idx);
            }
            "object_pattern" | "array_pattern" | "rest_pattern" => {
                let children = self.tree.node(idx).children.clone();
                for child in children {
                    self.bind_pattern(child, scope);
                }
            }
            "pair_pattern" => {
                if let Some(value) = self.tree.child_by_field(idx, "value") {
                    self.bind_pattern(value, scope);
                }
            }
            "assignment_pattern" | "object_assignment_pattern" => {
                if let Some(left) = self.tree.child_by_field(idx, "left") {
                    self.bind_pattern(left, scope);
                }
            }
            _ => {}
        }
    }

    /// Bind a JavaScript-style parameter (no `required_parameter` wrapper).
    fn bind_plain_parameter(&mut self, idx: NodeIdx, function: NodeIdx) {
        match self.tree.node(idx).raw_kind {
            "identifier" => {
                self.retag(idx, SyntaxKind::Parameter);
                self.bind(function, idx);
            }
            "assignment_pattern" => {
                let Some(left) = self.tree.child_by_field(idx, "left") else {
                    return;
                };
                if self.tree.node(left).raw_kind == "identifier" {
                    let name = text_of(self.tree, left);
                    let node = self.tree.node_mut(idx);
                    node.kind = SyntaxKind::Parameter;
                    node.name = Some(name);
                    node.name_node = Some(left);
                    self.bind(function, idx);
                } else {
                    self.bind_pattern(left, function);
                }
            }
            _ => self.bind_pattern(idx, function),
        }
    }

    fn enclosing_class(&self, idx: NodeIdx) -> Option<NodeIdx> {
        let mut current = self.tree.node(idx).parent;
        while let Some(candidate) = current {
            if self.tree.node(candidate).kind == SyntaxKind::ClassDeclaration {
                return Some(candidate);
            }
            current = self.tree.node(candidate).parent;
        }
        None
    }

    fn declare(&mut self, idx: NodeIdx) {
        let node = self.tree.node(idx);
        let kind = node.kind;
        let raw_kind = node.raw_kind;
        let parent = node.parent;

        match (kind, raw_kind) {
            (
                SyntaxKind::FunctionDeclaration
                | SyntaxKind::InterfaceDeclaration
                | SyntaxKind::EnumDeclaration
                | SyntaxKind::TypeAliasDeclaration
                | SyntaxKind::NamespaceDeclaration
                | SyntaxKind::ModuleDeclaration,
                _,
            ) => {
                if node.name_node.is_some() {
                    let scope = self.scope_above(idx);
                    self.bind(scope, idx);
                }
            }
            (SyntaxKind::ClassDeclaration, _) => {
                if node.name_node.is_some() {
                    let scope = self.scope_above(idx);
                    self.bind(scope, idx);
                }
            }
            (SyntaxKind::FunctionExpression, _) => {
                // A named function expression sees its own name only inside
                if node.name_node.is_some() {
                    self.bind(idx, idx);
                }
            }
            (SyntaxKind::VariableDeclaration, _) => {
                let is_var = parent.is_some_and(|p| self.tree.node(p).raw_kind == "variable_declaration");
                let scope = if is_var {
                    self.var_scope_above(idx)
                } else {
                    self.scope_above(idx)
                };
                if node.name_node.is_some() {
                    self.bind(scope, idx);
                } else if let Some(pattern) = self.tree.child_by_field(idx, "name") {
                    self.bind_pattern(pattern, scope);
                }
            }
            (SyntaxKind::Parameter, "required_parameter" | "optional_parameter") => {
                let scope = self.scope_above(idx);
                if node.name_node.is_some() {
                    self.bind(scope, idx);
                } else if let Some(pattern) = self.tree.child_by_field(idx, "pattern") {
                    self.bind_pattern(pattern, scope);
                }
            }
            (_, "formal_parameters") => {
                let Some(function) = parent else {
                    return;
                };
                let children = node.children.clone();
                for child in children {
                    if !matches!(
                        self.tree.node(child).raw_kind,
                        "required_parameter" | "optional_parameter"
                    ) {
                        self.bind_plain_parameter(child, function);
                    }
                }
            }
            (SyntaxKind::ArrowFunction, _) => {
                if let Some(param) = self.tree.child_by_field(idx, "parameter") {
                    self.bind_plain_parameter(param, idx);
                }
            }
            (SyntaxKind::ImportSpecifier, _) => {
                let root = self.tree.root();
                self.bind(root, idx);
            }
            (_, "import_clause" | "namespace_import") => {
                let root = self.tree.root();
                let children = node.children.clone();
                for child in children {
                    if self.tree.node(child).raw_kind == "identifier" {
                        self.retag(child, SyntaxKind::ImportSpecifier);
                        self.bind(root, child);
                    }
                }
            }
            (_, "catch_clause") => {
                if let Some(param) = self.tree.child_by_field(idx, "parameter") {
                    if self.tree.node(param).raw_kind == "identifier" {
                        self.retag(param, SyntaxKind::Parameter);
                        self.bind(idx, param);
                    } else {
                        self.bind_pattern(param, idx);
                    }
                }
            }
            (_, "for_in_statement") => {
                let Some(left) = self.tree.child_by_field(idx, "left") else {
                    return;
                };
                // Only `for (const x of ...)` declares; `for (x of ...)` assigns
                let head = self.tree.slice(node.start_byte, self.tree.node(left).start_byte);
                let declares = ["const", "let", "var"].iter().any(|kw| head.contains(kw));
                if declares {
                    self.bind_pattern(left, idx);
                }
            }
            (
                SyntaxKind::MethodDeclaration
                | SyntaxKind::GetAccessor
                | SyntaxKind::SetAccessor
                | SyntaxKind::PropertyDeclaration,
                _,
            ) => {
                let Some(name) = node.name.clone() else {
                    return;
                };
                if let Some(name_node) = node.name_node {
                    self.declaration_names.insert(name_node);
                }
                if let Some(class) = self.enclosing_class(idx) {
                    let table = self.members.entry(class).or_default();
                    if !table.contains_key(&name) {
                        table.insert(name, idx);
                        self.tree.references.entry(idx).or_default();
                    }
                }
            }
            _ => {}
        }
    }

    fn lookup(&self, from: NodeIdx, name: &str) -> Option<NodeIdx> {
        let mut current = self.tree.node(from).parent;
        while let Some(scope) = current {
            if let Some(decl) = self.bindings.get(&scope).and_then(|t| t.get(name)) {
                return Some(*decl);
            }
            current = self.tree.node(scope).parent;
        }
        None
    }

    fn resolve(&mut self, idx: NodeIdx) {
        if self.declaration_names.contains(&idx) {
            return;
        }
        let node = self.tree.node(idx);
        if node.kind != SyntaxKind::Identifier {
            return;
        }
        let parent_raw = node.parent.map(|p| self.tree.node(p).raw_kind);
        if parent_raw == Some("import_specifier") {
            return;
        }

        let target = match node.raw_kind {
            "identifier" | "type_identifier" | "shorthand_property_identifier" => {
                let name = text_of(self.tree, idx);
                self.lookup(idx, &name)
            }
            "property_identifier" | "private_property_identifier" => self.resolve_this_member(idx),
            _ => None,
        };

        if let Some(decl) = target {
            if decl != idx {
                self.tree.references.entry(decl).or_default().push(idx);
            }
        }
    }

    /// `this.name` inside a class resolves to the class member `name`.
    fn resolve_this_member(&self, idx: NodeIdx) -> Option<NodeIdx> {
        let node = self.tree.node(idx);
        if node.field != Some("property") {
            return None;
        }
        let access = node.parent?;
        if self.tree.node(access).raw_kind != "member_expression" {
            return None;
        }
        let object = self.tree.child_by_field(access, "object")?;
        if self.tree.node(object).raw_kind != "this" {
            return None;
        }
        let class = self.enclosing_class(idx)?;
        let name = text_of(self.tree, idx);
        self.members.get(&class)?.get(&name).copied()
    }
}
