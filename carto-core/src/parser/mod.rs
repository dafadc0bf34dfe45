//! Tree-sitter front end producing `SourceTree` symbol providers.
//!
//! TypeScript, TSX and JavaScript share one lowering: the grammars agree on
//! every node kind the resolver looks at.

use thiserror::Error;

pub mod tree;
pub mod typescript;

mod helpers;

pub use tree::{NodeIdx, SourceTree, SyntaxNode};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Failed to set language: {0}")]
    Grammar(String),

    #[error("Failed to parse {0}")]
    NoTree(String),
}

/// Grammar flavour used for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Dialect {
    pub fn from_language(language: &str) -> Option<Self> {
        match language.to_lowercase().as_str() {
            "typescript" | "ts" => Some(Dialect::TypeScript),
            "tsx" => Some(Dialect::Tsx),
            "javascript" | "js" | "jsx" => Some(Dialect::JavaScript),
            _ => None,
        }
    }
}

/// Parse source code for a specific language.
pub fn parse_source(source: &str, path: &str, language: &str) -> Result<SourceTree, ParseError> {
    let dialect = Dialect::from_language(language)
        .ok_or_else(|| ParseError::UnsupportedLanguage(language.to_string()))?;
    typescript::parse(source, path, dialect)
}

/// Get supported languages.
pub fn supported_languages() -> &'static [&'static str] {
    &["typescript", "ts", "tsx", "javascript", "js", "jsx"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_language() {
        let err = parse_source("x = 1", "a.py", "python").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_supported_languages_parse() {
        for lang in supported_languages() {
            assert!(parse_source("const a = 1;\n", "a.ts", lang).is_ok(), "{}", lang);
        }
    }
}
