//! Syntax tree of grammar files.

use crate::{grammar::Assoc, util::escape_char};
use std::fmt;

#[derive(Debug)]
pub struct Grammar {
    /// Text before the first `%%`.
    pub prelude: String,
    pub decls: Vec<Decl>,
    pub rules: Vec<Rule>,
    /// Text after the third `%%`, if any.
    pub epilog: Option<String>,
}

#[derive(Debug)]
pub struct Decl {
    pub kind: DeclKind,
    pub line: usize,
}

#[derive(Debug, PartialEq)]
pub enum DeclKind {
    /// `%token [<tag>] symbols...`
    Token {
        tag: Option<String>,
        symbols: Vec<Symbol>,
    },
    /// `%left`, `%right` or `%nonassoc`, one precedence level per declaration.
    Precedence {
        assoc: Assoc,
        tag: Option<String>,
        symbols: Vec<Symbol>,
    },
    /// `%type <tag> names...`
    Type { tag: String, names: Vec<String> },
    /// `%start name`
    Start(String),
    /// `%valuetype` followed by a type on the rest of the line.
    ValueType(String),
    /// `%locationtype` followed by a type on the rest of the line.
    LocationType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Ident(String),
    Literal(char),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => f.write_str(name),
            Self::Literal(ch) => f.write_str(&escape_char(*ch)),
        }
    }
}

#[derive(Debug)]
pub struct Rule {
    pub left: String,
    pub alternatives: Vec<Alternative>,
    pub line: usize,
}

#[derive(Debug)]
pub struct Alternative {
    pub symbols: Vec<Symbol>,
    pub prec: Option<Symbol>,
    pub action: Option<Action>,
    pub line: usize,
}

#[derive(Debug)]
pub struct Action {
    /// The code between the braces.
    pub code: String,
    /// The line of the opening brace.
    pub line: usize,
}
