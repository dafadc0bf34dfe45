//! Syntax kinds and the tracking profile.
//!
//! `SyntaxKind` is the language-neutral vocabulary a symbol provider speaks.
//! Each variant carries an explicit code that becomes part of a node ID, so
//! the discriminants below must never be renumbered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kinds of syntax nodes a symbol provider can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum SyntaxKind {
    /// Any node the provider does not map; the raw kind name is kept by the provider.
    Unknown = 0,
    SourceFile = 1,
    FunctionDeclaration = 2,
    ArrowFunction = 3,
    FunctionExpression = 4,
    ClassDeclaration = 5,
    InterfaceDeclaration = 6,
    EnumDeclaration = 7,
    TypeAliasDeclaration = 8,
    VariableStatement = 9,
    VariableDeclaration = 10,
    PropertyDeclaration = 11,
    MethodDeclaration = 12,
    GetAccessor = 13,
    SetAccessor = 14,
    Constructor = 15,
    PropertySignature = 16,
    MethodSignature = 17,
    ModuleDeclaration = 18,
    NamespaceDeclaration = 19,
    TemplateExpression = 20,
    ImportDeclaration = 21,
    ImportSpecifier = 22,
    ExportSpecifier = 23,
    Parameter = 24,
    BindingElement = 25,
    Identifier = 26,
    PropertyAccessExpression = 27,
    CallExpression = 28,
    NewExpression = 29,
    ExpressionStatement = 30,
    Block = 31,
    EnumMember = 32,
}

impl SyntaxKind {
    /// Stable numeric code used in node identifiers.
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyntaxKind::Unknown => "Unknown",
            SyntaxKind::SourceFile => "SourceFile",
            SyntaxKind::FunctionDeclaration => "FunctionDeclaration",
            SyntaxKind::ArrowFunction => "ArrowFunction",
            SyntaxKind::FunctionExpression => "FunctionExpression",
            SyntaxKind::ClassDeclaration => "ClassDeclaration",
            SyntaxKind::InterfaceDeclaration => "InterfaceDeclaration",
            SyntaxKind::EnumDeclaration => "EnumDeclaration",
            SyntaxKind::TypeAliasDeclaration => "TypeAliasDeclaration",
            SyntaxKind::VariableStatement => "VariableStatement",
            SyntaxKind::VariableDeclaration => "VariableDeclaration",
            SyntaxKind::PropertyDeclaration => "PropertyDeclaration",
            SyntaxKind::MethodDeclaration => "MethodDeclaration",
            SyntaxKind::GetAccessor => "GetAccessor",
            SyntaxKind::SetAccessor => "SetAccessor",
            SyntaxKind::Constructor => "Constructor",
            SyntaxKind::PropertySignature => "PropertySignature",
            SyntaxKind::MethodSignature => "MethodSignature",
            SyntaxKind::ModuleDeclaration => "ModuleDeclaration",
            SyntaxKind::NamespaceDeclaration => "NamespaceDeclaration",
            SyntaxKind::TemplateExpression => "TemplateExpression",
            SyntaxKind::ImportDeclaration => "ImportDeclaration",
            SyntaxKind::ImportSpecifier => "ImportSpecifier",
            SyntaxKind::ExportSpecifier => "ExportSpecifier",
            SyntaxKind::Parameter => "Parameter",
            SyntaxKind::BindingElement => "BindingElement",
            SyntaxKind::Identifier => "Identifier",
            SyntaxKind::PropertyAccessExpression => "PropertyAccessExpression",
            SyntaxKind::CallExpression => "CallExpression",
            SyntaxKind::NewExpression => "NewExpression",
            SyntaxKind::ExpressionStatement => "ExpressionStatement",
            SyntaxKind::Block => "Block",
            SyntaxKind::EnumMember => "EnumMember",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str().eq_ignore_ascii_case(s))
    }

    /// Function-like kinds (bodies that can contain call sites).
    pub fn is_function_like(self) -> bool {
        matches!(
            self,
            SyntaxKind::FunctionDeclaration
                | SyntaxKind::ArrowFunction
                | SyntaxKind::FunctionExpression
                | SyntaxKind::MethodDeclaration
                | SyntaxKind::GetAccessor
                | SyntaxKind::SetAccessor
                | SyntaxKind::Constructor
        )
    }

    /// Kinds whose `code` is left empty and rebuilt from children downstream.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            SyntaxKind::SourceFile
                | SyntaxKind::ModuleDeclaration
                | SyntaxKind::NamespaceDeclaration
                | SyntaxKind::ClassDeclaration
        )
    }

    pub const ALL: [SyntaxKind; 33] = [
        SyntaxKind::Unknown,
        SyntaxKind::SourceFile,
        SyntaxKind::FunctionDeclaration,
        SyntaxKind::ArrowFunction,
        SyntaxKind::FunctionExpression,
        SyntaxKind::ClassDeclaration,
        SyntaxKind::InterfaceDeclaration,
        SyntaxKind::EnumDeclaration,
        SyntaxKind::TypeAliasDeclaration,
        SyntaxKind::VariableStatement,
        SyntaxKind::VariableDeclaration,
        SyntaxKind::PropertyDeclaration,
        SyntaxKind::MethodDeclaration,
        SyntaxKind::GetAccessor,
        SyntaxKind::SetAccessor,
        SyntaxKind::Constructor,
        SyntaxKind::PropertySignature,
        SyntaxKind::MethodSignature,
        SyntaxKind::ModuleDeclaration,
        SyntaxKind::NamespaceDeclaration,
        SyntaxKind::TemplateExpression,
        SyntaxKind::ImportDeclaration,
        SyntaxKind::ImportSpecifier,
        SyntaxKind::ExportSpecifier,
        SyntaxKind::Parameter,
        SyntaxKind::BindingElement,
        SyntaxKind::Identifier,
        SyntaxKind::PropertyAccessExpression,
        SyntaxKind::CallExpression,
        SyntaxKind::NewExpression,
        SyntaxKind::ExpressionStatement,
        SyntaxKind::Block,
        SyntaxKind::EnumMember,
    ];
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Version of the built-in tracking profile. Bump whenever the default
/// tracked or scope sets change, since node sets are not comparable across
/// profile versions.
pub const TRACKING_PROFILE_VERSION: u32 = 3;

const DEFAULT_TRACKED: &[SyntaxKind] = &[
    SyntaxKind::SourceFile,
    SyntaxKind::FunctionDeclaration,
    SyntaxKind::ArrowFunction,
    SyntaxKind::ClassDeclaration,
    SyntaxKind::InterfaceDeclaration,
    SyntaxKind::EnumDeclaration,
    SyntaxKind::TypeAliasDeclaration,
    SyntaxKind::VariableDeclaration,
    SyntaxKind::PropertyDeclaration,
    SyntaxKind::MethodDeclaration,
    SyntaxKind::ModuleDeclaration,
    SyntaxKind::NamespaceDeclaration,
    SyntaxKind::TemplateExpression,
];

/// Which kinds become graph nodes and which ancestors a call or usage is
/// attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingProfile {
    pub version: u32,
    /// Declaration kinds that become graph nodes.
    pub tracked: BTreeSet<SyntaxKind>,
    /// Ancestor kinds that qualify as the target of `CALLED_BY` / `USED_IN`.
    pub scopes: BTreeSet<SyntaxKind>,
}

impl Default for TrackingProfile {
    fn default() -> Self {
        let tracked: BTreeSet<SyntaxKind> = DEFAULT_TRACKED.iter().copied().collect();
        Self {
            version: TRACKING_PROFILE_VERSION,
            scopes: tracked.clone(),
            tracked,
        }
    }
}

impl TrackingProfile {
    /// Build a profile from kind names, as found in configuration.
    ///
    /// The source file kind is always tracked. Unknown names are returned as
    /// an error so that a typo never silently shrinks the graph.
    pub fn from_names(tracked: &[String], scopes: Option<&[String]>) -> Result<Self, String> {
        let parse_all = |names: &[String]| -> Result<BTreeSet<SyntaxKind>, String> {
            names
                .iter()
                .map(|n| SyntaxKind::parse(n).ok_or_else(|| format!("unknown syntax kind '{}'", n)))
                .collect()
        };

        let mut tracked = parse_all(tracked)?;
        tracked.insert(SyntaxKind::SourceFile);
        let scopes = match scopes {
            Some(names) => parse_all(names)?,
            None => tracked.clone(),
        };

        Ok(Self {
            version: TRACKING_PROFILE_VERSION,
            tracked,
            scopes,
        })
    }

    pub fn is_tracked(&self, kind: SyntaxKind) -> bool {
        self.tracked.contains(&kind)
    }

    pub fn is_scope(&self, kind: SyntaxKind) -> bool {
        self.scopes.contains(&kind)
    }
}
