//! Reader of grammar files.
//!
//! ```text
//! <prelude>
//! %%
//! <declarations>
//! %%
//! <rules>
//! %%
//! <epilog>
//! ```

pub mod ast;
pub mod lexer;

use self::lexer::{Keyword, Lexer, Spanned, Token};
use crate::grammar::Assoc;
use lexgen_util::{LexerError, LexerErrorKind, Loc};

/// A malformed grammar file, located at a 1-based line and column.
#[derive(Debug, thiserror::Error)]
#[error("{line}:{column}: {kind}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub kind: SyntaxErrorKind,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SyntaxErrorKind {
    #[error("missing `%%` after the prelude")]
    MissingMark,

    #[error("unexpected character {:?}", _0)]
    UnexpectedChar(char),

    #[error("unknown directive `%{}`", _0)]
    UnknownDirective(String),

    #[error("unterminated character literal")]
    UnterminatedLiteral,

    #[error("unknown escape sequence `\\{}`", _0)]
    UnknownEscape(char),

    #[error("unterminated tag")]
    UnterminatedTag,

    #[error("unterminated action")]
    UnterminatedAction,

    #[error("unterminated block comment")]
    UnterminatedComment,

    #[error("expected {}, found {}", expected, found)]
    Unexpected {
        expected: &'static str,
        found: String,
    },

    #[error("unexpected end of input, expected {}", _0)]
    UnexpectedEof(&'static str),

    #[error("missing type after `%{}`", _0)]
    MissingType(&'static str),

    #[error("actions are only allowed at the end of an alternative")]
    MidRuleAction,
}

pub fn parse(source: &str) -> Result<ast::Grammar, SyntaxError> {
    let span = tracing::trace_span!("parse");
    let _entered = span.enter();

    let (prelude, rest, prelude_lines) = split_prelude(source).ok_or_else(|| SyntaxError {
        line: source.lines().count() + 1,
        column: 1,
        kind: SyntaxErrorKind::MissingMark,
    })?;

    let mut parser = Parser {
        source: rest,
        lexer: Lexer::new(rest),
        peeked: None,
        line_offset: prelude_lines,
        last: Loc {
            line: 0,
            col: 0,
            byte_idx: 0,
        },
    };
    let grammar = parser.grammar(prelude)?;
    tracing::trace!(
        decls = grammar.decls.len(),
        rules = grammar.rules.len(),
        "parsed"
    );
    Ok(grammar)
}

/// Split the source at the first line consisting of `%%`.
///
/// Returns the text before that line, the text after it and the number of
/// lines up to and including the mark.
fn split_prelude(source: &str) -> Option<(&str, &str, usize)> {
    let mut offset = 0;
    for (i, line) in source.split_inclusive('\n').enumerate() {
        if line.trim() == "%%" {
            return Some((&source[..offset], &source[offset + line.len()..], i + 1));
        }
        offset += line.len();
    }
    None
}

struct Parser<'input> {
    /// The source following the prelude, which the lexer runs over.
    source: &'input str,
    lexer: Lexer<'input, std::str::Chars<'input>>,
    peeked: Option<Spanned<'input>>,
    line_offset: usize,
    /// The end of the last token.
    last: Loc,
}

impl<'input> Parser<'input> {
    fn error(&self, loc: Loc, kind: SyntaxErrorKind) -> SyntaxError {
        SyntaxError {
            line: self.line(loc),
            column: loc.col as usize + 1,
            kind,
        }
    }

    fn lex(&mut self) -> Result<Option<Spanned<'input>>, SyntaxError> {
        match self.lexer.next() {
            Some(Ok(token)) => {
                self.last = token.2;
                Ok(Some(token))
            }
            Some(Err(LexerError { location, kind })) => {
                let kind = match kind {
                    LexerErrorKind::Custom(kind) => kind,
                    LexerErrorKind::InvalidToken => SyntaxErrorKind::UnexpectedChar(
                        self.source[location.byte_idx..]
                            .chars()
                            .next()
                            .unwrap_or_default(),
                    ),
                };
                Err(self.error(location, kind))
            }
            None => Ok(None),
        }
    }

    fn peek(&mut self) -> Result<Option<Spanned<'input>>, SyntaxError> {
        if self.peeked.is_none() {
            self.peeked = self.lex()?;
        }
        Ok(self.peeked)
    }

    fn next(&mut self) -> Result<Option<Spanned<'input>>, SyntaxError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lex(),
        }
    }

    /// The text after `%%` that ends the rules. The rest of the line holding
    /// the mark is dropped if it is blank.
    fn epilog(&self, mark_end: Loc) -> &'input str {
        let rest = &self.source[mark_end.byte_idx..];
        match rest.find('\n') {
            Some(i) if rest[..i].trim().is_empty() => &rest[i + 1..],
            _ => rest,
        }
    }

    fn unexpected(&self, loc: Loc, expected: &'static str, found: Token<'_>) -> SyntaxError {
        let found = match found {
            Token::Ident(name) => format!("`{}`", name),
            Token::Literal(ch) => crate::util::escape_char(ch),
            Token::Tag(tag) => format!("`<{}>`", tag),
            Token::Action(..) => "an action".into(),
            Token::Type(ty) => format!("`{}`", ty),
            Token::Colon => "`:`".into(),
            Token::Semicolon => "`;`".into(),
            Token::VertBar => "`|`".into(),
            Token::Mark => "`%%`".into(),
            Token::Kw(kw) => format!("{:?}", kw),
        };
        self.error(loc, SyntaxErrorKind::Unexpected { expected, found })
    }

    fn eof(&self, expected: &'static str) -> SyntaxError {
        self.error(self.last, SyntaxErrorKind::UnexpectedEof(expected))
    }

    fn expect(
        &mut self,
        expected: &'static str,
        accept: impl Fn(Token<'input>) -> bool,
    ) -> Result<Spanned<'input>, SyntaxError> {
        match self.next()? {
            Some((start, token, end)) if accept(token) => Ok((start, token, end)),
            Some((loc, token, _)) => Err(self.unexpected(loc, expected, token)),
            None => Err(self.eof(expected)),
        }
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<&'input str, SyntaxError> {
        match self.expect(expected, |t| matches!(t, Token::Ident(..)))? {
            (_, Token::Ident(name), _) => Ok(name),
            _ => unreachable!(),
        }
    }

    fn grammar(&mut self, prelude: &str) -> Result<ast::Grammar, SyntaxError> {
        let mut decls = vec![];
        loop {
            match self.next()? {
                Some((_, Token::Mark, _)) => break,
                Some((loc, Token::Kw(kw), _)) if kw != Keyword::Prec => {
                    let kind = self.decl(loc, kw)?;
                    decls.push(ast::Decl {
                        kind,
                        line: self.line(loc),
                    });
                }
                Some((loc, token, _)) => return Err(self.unexpected(loc, "a declaration", token)),
                None => return Err(self.eof("`%%` after the declarations")),
            }
        }

        let mut rules = vec![];
        let mut epilog = None;
        loop {
            match self.next()? {
                Some((_, Token::Mark, end)) => {
                    epilog = Some(self.epilog(end).to_owned());
                    break;
                }
                Some((loc, Token::Ident(left), _)) => rules.push(self.rule(loc, left)?),
                Some((loc, token, _)) => return Err(self.unexpected(loc, "a rule", token)),
                None => break,
            }
        }

        Ok(ast::Grammar {
            prelude: prelude.to_owned(),
            decls,
            rules,
            epilog,
        })
    }

    fn line(&self, loc: Loc) -> usize {
        self.line_offset + loc.line as usize + 1
    }

    fn tag(&mut self) -> Result<Option<String>, SyntaxError> {
        match self.peek()? {
            Some((_, Token::Tag(tag), _)) => {
                self.next()?;
                Ok(Some(tag.to_owned()))
            }
            _ => Ok(None),
        }
    }

    fn symbols(&mut self) -> Result<Vec<ast::Symbol>, SyntaxError> {
        let mut symbols = vec![];
        loop {
            match self.peek()? {
                Some((_, Token::Ident(name), _)) => {
                    symbols.push(ast::Symbol::Ident(name.to_owned()))
                }
                Some((_, Token::Literal(ch), _)) => symbols.push(ast::Symbol::Literal(ch)),
                Some((loc, token, _)) if symbols.is_empty() => {
                    return Err(self.unexpected(loc, "a symbol", token))
                }
                None if symbols.is_empty() => return Err(self.eof("a symbol")),
                _ => return Ok(symbols),
            }
            self.next()?;
        }
    }

    fn decl(&mut self, loc: Loc, kw: Keyword) -> Result<ast::DeclKind, SyntaxError> {
        let assoc = match kw {
            Keyword::Token => {
                let tag = self.tag()?;
                let symbols = self.symbols()?;
                return Ok(ast::DeclKind::Token { tag, symbols });
            }
            Keyword::Left => Assoc::Left,
            Keyword::Right => Assoc::Right,
            Keyword::Nonassoc => Assoc::Nonassoc,
            Keyword::Type => {
                let (_, tag, _) = self.expect("a tag", |t| matches!(t, Token::Tag(..)))?;
                let Token::Tag(tag) = tag else { unreachable!() };
                let mut names = vec![self.expect_ident("a nonterminal")?.to_owned()];
                while let Some((_, Token::Ident(name), _)) = self.peek()? {
                    self.next()?;
                    names.push(name.to_owned());
                }
                return Ok(ast::DeclKind::Type {
                    tag: tag.to_owned(),
                    names,
                });
            }
            Keyword::Start => {
                let name = self.expect_ident("the start symbol")?;
                return Ok(ast::DeclKind::Start(name.to_owned()));
            }
            Keyword::ValueType | Keyword::LocationType => {
                let directive = match kw {
                    Keyword::ValueType => "valuetype",
                    _ => "locationtype",
                };
                let ty = match self.next()? {
                    Some((_, Token::Type(ty), _)) if !ty.is_empty() => ty,
                    _ => return Err(self.error(loc, SyntaxErrorKind::MissingType(directive))),
                };
                return Ok(match kw {
                    Keyword::ValueType => ast::DeclKind::ValueType(ty.to_owned()),
                    _ => ast::DeclKind::LocationType(ty.to_owned()),
                });
            }
            Keyword::Prec => unreachable!(),
        };

        let tag = self.tag()?;
        let symbols = self.symbols()?;
        Ok(ast::DeclKind::Precedence {
            assoc,
            tag,
            symbols,
        })
    }

    fn rule(&mut self, loc: Loc, left: &str) -> Result<ast::Rule, SyntaxError> {
        self.expect("`:`", |t| t == Token::Colon)?;

        let mut alternatives = vec![];
        loop {
            alternatives.push(self.alternative()?);
            match self.next()? {
                Some((_, Token::VertBar, _)) => continue,
                Some((_, Token::Semicolon, _)) => break,
                Some((loc, token, _)) => return Err(self.unexpected(loc, "`|` or `;`", token)),
                None => return Err(self.eof("`;` at the end of the rule")),
            }
        }

        Ok(ast::Rule {
            left: left.to_owned(),
            alternatives,
            line: self.line(loc),
        })
    }

    fn alternative(&mut self) -> Result<ast::Alternative, SyntaxError> {
        let line = match self.peek()? {
            Some((loc, _, _)) => self.line(loc),
            None => self.line(self.last),
        };

        let mut symbols = vec![];
        let mut prec = None;
        let mut action: Option<ast::Action> = None;
        loop {
            let symbol = match self.peek()? {
                Some((_, Token::Ident(name), _)) => ast::Symbol::Ident(name.to_owned()),
                Some((_, Token::Literal(ch), _)) => ast::Symbol::Literal(ch),
                Some((loc, Token::Kw(Keyword::Prec), _)) => {
                    self.next()?;
                    if prec.is_some() {
                        return Err(self.unexpected(
                            loc,
                            "a single `%prec`",
                            Token::Kw(Keyword::Prec),
                        ));
                    }
                    prec = Some(match self.next()? {
                        Some((_, Token::Ident(name), _)) => ast::Symbol::Ident(name.to_owned()),
                        Some((_, Token::Literal(ch), _)) => ast::Symbol::Literal(ch),
                        Some((loc, token, _)) => {
                            return Err(self.unexpected(loc, "a terminal", token))
                        }
                        None => return Err(self.eof("a terminal")),
                    });
                    continue;
                }
                Some((loc, Token::Action(code), _)) => {
                    self.next()?;
                    if action.is_some() {
                        return Err(self.error(loc, SyntaxErrorKind::MidRuleAction));
                    }
                    action = Some(ast::Action {
                        code: code.to_owned(),
                        line: self.line(loc),
                    });
                    continue;
                }
                _ => break,
            };

            let (loc, _, _) = self.next()?.ok_or_else(|| self.eof("a symbol"))?;
            if action.is_some() {
                return Err(self.error(loc, SyntaxErrorKind::MidRuleAction));
            }
            symbols.push(symbol);
        }

        Ok(ast::Alternative {
            symbols,
            prec,
            action,
            line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ast::*, *};

    #[test]
    fn smoketest() {
        let input = "\
use std::collections::HashMap;
%%
%token <i64> NUM IDENT
%left '+' '-'
%right <Box<Expr>> POW
%nonassoc '<'
%type <Expr> expr term
%start expr
%valuetype Option<Box<Expr>>
%locationtype (usize, usize)
%%
expr : expr '+' term { $$ = add($1, $3); }
     | '-' expr %prec POW
     | /* empty */
     ;
term : NUM | IDENT { $$ = var(&$1); } ;
%%
fn add() {}
";
        let grammar = parse(input).unwrap();
        assert_eq!(grammar.prelude, "use std::collections::HashMap;\n");
        assert_eq!(grammar.epilog.as_deref(), Some("fn add() {}\n"));

        let decls: Vec<_> = grammar.decls.iter().map(|d| (&d.kind, d.line)).collect();
        assert_eq!(
            decls,
            [
                (
                    &DeclKind::Token {
                        tag: Some("i64".into()),
                        symbols: vec![Symbol::Ident("NUM".into()), Symbol::Ident("IDENT".into())],
                    },
                    3
                ),
                (
                    &DeclKind::Precedence {
                        assoc: Assoc::Left,
                        tag: None,
                        symbols: vec![Symbol::Literal('+'), Symbol::Literal('-')],
                    },
                    4
                ),
                (
                    &DeclKind::Precedence {
                        assoc: Assoc::Right,
                        tag: Some("Box<Expr>".into()),
                        symbols: vec![Symbol::Ident("POW".into())],
                    },
                    5
                ),
                (
                    &DeclKind::Precedence {
                        assoc: Assoc::Nonassoc,
                        tag: None,
                        symbols: vec![Symbol::Literal('<')],
                    },
                    6
                ),
                (
                    &DeclKind::Type {
                        tag: "Expr".into(),
                        names: vec!["expr".into(), "term".into()],
                    },
                    7
                ),
                (&DeclKind::Start("expr".into()), 8),
                (&DeclKind::ValueType("Option<Box<Expr>>".into()), 9),
                (&DeclKind::LocationType("(usize, usize)".into()), 10),
            ]
        );

        assert_eq!(grammar.rules.len(), 2);
        let expr = &grammar.rules[0];
        assert_eq!(expr.left, "expr");
        assert_eq!(expr.line, 12);
        assert_eq!(expr.alternatives.len(), 3);

        let add = &expr.alternatives[0];
        assert_eq!(
            add.symbols,
            [
                Symbol::Ident("expr".into()),
                Symbol::Literal('+'),
                Symbol::Ident("term".into())
            ]
        );
        let action = add.action.as_ref().unwrap();
        assert_eq!(action.code.trim(), "$$ = add($1, $3);");
        assert_eq!(action.line, 12);

        let negate = &expr.alternatives[1];
        assert_eq!(negate.prec, Some(Symbol::Ident("POW".into())));
        assert_eq!(negate.line, 13);
        assert!(negate.action.is_none());

        assert!(expr.alternatives[2].symbols.is_empty());

        let term = &grammar.rules[1];
        assert_eq!(term.alternatives.len(), 2);
        assert_eq!(term.alternatives[1].symbols, [Symbol::Ident("IDENT".into())]);
        assert!(term.alternatives[1].action.is_some());
    }

    #[test]
    fn epilog_is_optional() {
        let grammar = parse("%%\n%token A\n%%\nS : A ;\n").unwrap();
        assert_eq!(grammar.prelude, "");
        assert_eq!(grammar.epilog, None);
        assert_eq!(grammar.rules.len(), 1);
    }

    #[test]
    fn missing_mark() {
        let err = parse("%token A\nS : A ;\n").unwrap_err();
        assert!(matches!(err.kind, SyntaxErrorKind::MissingMark));
    }

    #[test]
    fn missing_rules_section() {
        let err = parse("%%\n%token A\n").unwrap_err();
        assert!(matches!(err.kind, SyntaxErrorKind::UnexpectedEof(..)));
    }

    #[test]
    fn mid_rule_action() {
        let err = parse("%%\n%%\nS : A { f(); } B ;\n").unwrap_err();
        assert!(matches!(err.kind, SyntaxErrorKind::MidRuleAction));
        assert_eq!((err.line, err.column), (3, 16));
    }

    #[test]
    fn missing_semicolon() {
        let err = parse("%%\n%%\nS : A\nT : B ;\n").unwrap_err();
        assert!(matches!(err.kind, SyntaxErrorKind::Unexpected { .. }));
        assert_eq!((err.line, err.column), (4, 3));
    }

    #[test]
    fn missing_value_type() {
        let err = parse("%%\n%valuetype\n%%\n").unwrap_err();
        assert!(matches!(err.kind, SyntaxErrorKind::MissingType("valuetype")));
    }

    #[test]
    fn error_message_has_location() {
        let err = parse("%%\n%token A\n%%\nS : A $ ;\n").unwrap_err();
        assert_eq!(err.to_string(), "4:7: unexpected character '$'");
    }
}
