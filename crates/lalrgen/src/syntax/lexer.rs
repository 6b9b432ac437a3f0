//! Lexer implementation.

use super::SyntaxErrorKind;
use lexgen_util::Loc;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Token<'input> {
    Ident(&'input str),
    Literal(char),
    /// The contents of `<...>`.
    Tag(&'input str),
    /// The code between `{` and the matching `}`.
    Action(&'input str),
    /// The rest of the line after `%valuetype` or `%locationtype`.
    Type(&'input str),
    Colon,
    Semicolon,
    VertBar,
    /// `%%`
    Mark,
    Kw(Keyword),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Keyword {
    Token,
    Type,
    Left,
    Right,
    Nonassoc,
    Start,
    ValueType,
    LocationType,
    Prec,
}

pub type Spanned<'input> = (Loc, Token<'input>, Loc);

#[derive(Debug, Default)]
pub struct LexerState {
    comment_depth: usize,
    brace_depth: usize,
    tag_depth: usize,
    // Comments inside an action body belong to the action.
    in_action: bool,
}

lexgen::lexer! {
    pub Lexer(LexerState) -> Token<'input>;

    type Error = SyntaxErrorKind;

    let whitespace = [' ' '\t' '\r' '\n'];
    let newline = '\r'* '\n' | '\r';
    let ident = ($$XID_Start | '_') $$XID_Continue*;
    let hex = ['0'-'9' 'a'-'f' 'A'-'F'];

    rule Init {
        $whitespace+,
        "//" => |lexer| {
            lexer.switch(LexerRule::LineComment)
        },
        "/*" => |lexer| {
            lexer.state().comment_depth = 1;
            lexer.switch(LexerRule::BlockComment)
        },
        "%%" = Token::Mark,
        "%token" = Token::Kw(Keyword::Token),
        "%type" = Token::Kw(Keyword::Type),
        "%left" = Token::Kw(Keyword::Left),
        "%right" = Token::Kw(Keyword::Right),
        "%nonassoc" = Token::Kw(Keyword::Nonassoc),
        "%start" = Token::Kw(Keyword::Start),
        "%prec" = Token::Kw(Keyword::Prec),
        "%valuetype" => |lexer| {
            lexer.switch_and_return(LexerRule::TypeLine, Token::Kw(Keyword::ValueType))
        },
        "%locationtype" => |lexer| {
            lexer.switch_and_return(LexerRule::TypeLine, Token::Kw(Keyword::LocationType))
        },
        "%" $ident =? |lexer| {
            let name = lexer.match_()[1..].to_owned();
            lexer.return_(Err(SyntaxErrorKind::UnknownDirective(name)))
        },
        ":" = Token::Colon,
        ";" = Token::Semicolon,
        "|" = Token::VertBar,
        "'" (_ # ['\'' '\\' '\n']) "'" => |lexer| {
            let ch = lexer.match_()[1..].chars().next().unwrap_or_default();
            lexer.return_(Token::Literal(ch))
        },
        "'\\" _ "'" =? |lexer| {
            let ch = match lexer.match_()[2..].chars().next().unwrap_or_default() {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                '\\' => '\\',
                '\'' => '\'',
                ch => return lexer.return_(Err(SyntaxErrorKind::UnknownEscape(ch))),
            };
            lexer.return_(Ok(Token::Literal(ch)))
        },
        "'" =? |lexer| {
            lexer.return_(Err(SyntaxErrorKind::UnterminatedLiteral))
        },
        "<" => |lexer| {
            lexer.state().tag_depth = 1;
            lexer.switch(LexerRule::Tag)
        },
        "{" => |lexer| {
            let state = lexer.state();
            state.brace_depth = 1;
            state.in_action = true;
            lexer.switch(LexerRule::Action)
        },
        $ident => |lexer| {
            let token = Token::Ident(lexer.match_());
            lexer.return_(token)
        },
        _ =? |lexer| {
            let ch = lexer.match_().chars().next().unwrap_or_default();
            lexer.return_(Err(SyntaxErrorKind::UnexpectedChar(ch)))
        },
    }

    rule LineComment {
        $newline => |lexer| {
            if lexer.state().in_action {
                lexer.switch(LexerRule::Action)
            } else {
                lexer.reset_match();
                lexer.switch(LexerRule::Init)
            }
        },
        $ =? |lexer| {
            if lexer.state().in_action {
                lexer.return_(Err(SyntaxErrorKind::UnterminatedAction))
            } else {
                lexer.reset_match();
                lexer.switch(LexerRule::Init)
            }
        },
        _ => |lexer| lexer.continue_(),
    }

    rule BlockComment {
        "/*" => |lexer| {
            lexer.state().comment_depth += 1;
            lexer.continue_()
        },
        "*/" => |lexer| {
            let state = lexer.state();
            state.comment_depth -= 1;
            if state.comment_depth > 0 {
                lexer.continue_()
            } else if state.in_action {
                lexer.switch(LexerRule::Action)
            } else {
                lexer.reset_match();
                lexer.switch(LexerRule::Init)
            }
        },
        $ =? |lexer| {
            let kind = if lexer.state().in_action {
                SyntaxErrorKind::UnterminatedAction
            } else {
                SyntaxErrorKind::UnterminatedComment
            };
            lexer.return_(Err(kind))
        },
        _ => |lexer| lexer.continue_(),
    }

    rule Tag {
        '<' => |lexer| {
            lexer.state().tag_depth += 1;
            lexer.continue_()
        },
        '>' => |lexer| {
            let state = lexer.state();
            state.tag_depth -= 1;
            if state.tag_depth > 0 {
                return lexer.continue_();
            }
            let tag = lexer.match_();
            let tag = tag[1..tag.len() - 1].trim();
            lexer.switch_and_return(LexerRule::Init, Token::Tag(tag))
        },
        '\n' =? |lexer| {
            lexer.return_(Err(SyntaxErrorKind::UnterminatedTag))
        },
        $ =? |lexer| {
            lexer.return_(Err(SyntaxErrorKind::UnterminatedTag))
        },
        _ => |lexer| lexer.continue_(),
    }

    // Braces inside strings, character literals and comments do not count.
    rule Action {
        '{' => |lexer| {
            lexer.state().brace_depth += 1;
            lexer.continue_()
        },
        '}' => |lexer| {
            let state = lexer.state();
            state.brace_depth -= 1;
            if state.brace_depth > 0 {
                return lexer.continue_();
            }
            state.in_action = false;
            let code = lexer.match_();
            let code = &code[1..code.len() - 1];
            lexer.switch_and_return(LexerRule::Init, Token::Action(code))
        },
        '"' => |lexer| {
            lexer.switch(LexerRule::ActionString)
        },
        "'" (_ # ['\'' '\\' '\n']) "'" => |lexer| lexer.continue_(),
        "'\\" _ $hex* "'" => |lexer| lexer.continue_(),
        "'\\u{" $hex+ "}'" => |lexer| lexer.continue_(),
        "//" => |lexer| {
            lexer.switch(LexerRule::LineComment)
        },
        "/*" => |lexer| {
            lexer.state().comment_depth = 1;
            lexer.switch(LexerRule::BlockComment)
        },
        $ =? |lexer| {
            lexer.return_(Err(SyntaxErrorKind::UnterminatedAction))
        },
        _ => |lexer| lexer.continue_(),
    }

    rule ActionString {
        '\\' _ => |lexer| lexer.continue_(),
        '"' => |lexer| {
            lexer.switch(LexerRule::Action)
        },
        $ =? |lexer| {
            lexer.return_(Err(SyntaxErrorKind::UnterminatedAction))
        },
        _ => |lexer| lexer.continue_(),
    }

    rule TypeLine {
        (_ # ['\n'])+ => |lexer| {
            let ty = lexer.match_().trim();
            lexer.switch_and_return(LexerRule::Init, Token::Type(ty))
        },
        '\n' => |lexer| {
            lexer.switch_and_return(LexerRule::Init, Token::Type(""))
        },
        $ => |lexer| {
            lexer.switch_and_return(LexerRule::Init, Token::Type(""))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexgen_util::{LexerError, LexerErrorKind};
    use Token::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        Lexer::new(input)
            .map(|res| res.map(|(_, t, _)| t))
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn first_error(input: &str) -> LexerError<SyntaxErrorKind> {
        Lexer::new(input)
            .find_map(|res| res.err())
            .expect("no lexer error")
    }

    #[test]
    fn smoketest() {
        let input = "\
%token <Box<Expr>> FOO '+' // line comment /* ignored */
%left '\\'' '\\n' /* block comment /* nested */ */
%%
expr : expr '+' FOO { $$ = { $1 }; }
     | ｔｒｕｅ %prec '+'
     | _tail
     ;
";
        assert_eq!(
            tokens(input),
            [
                Kw(Keyword::Token),
                Tag("Box<Expr>"),
                Ident("FOO"),
                Literal('+'),
                Kw(Keyword::Left),
                Literal('\''),
                Literal('\n'),
                Mark,
                Ident("expr"),
                Colon,
                Ident("expr"),
                Literal('+'),
                Ident("FOO"),
                Action(" $$ = { $1 }; "),
                VertBar,
                Ident("ｔｒｕｅ"),
                Kw(Keyword::Prec),
                Literal('+'),
                VertBar,
                Ident("_tail"),
                Semicolon,
            ]
        );
    }

    #[test]
    fn comments_are_not_part_of_tokens() {
        let spanned: Vec<_> = Lexer::new("/* a */ A // b\nB")
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(spanned.len(), 2);
        assert_eq!(spanned[0].1, Ident("A"));
        assert_eq!((spanned[0].0.line, spanned[0].0.col), (0, 8));
        assert_eq!(spanned[1].1, Ident("B"));
        assert_eq!((spanned[1].0.line, spanned[1].0.col), (1, 0));
        assert_eq!(tokens("/* a */ /* b */ C"), [Ident("C")]);
    }

    #[test]
    fn braces_in_strings_and_chars() {
        let input = r#"{ let s = "}"; let c = '}'; let r: &'static str = s; /* } */ }"#;
        assert_eq!(
            tokens(input),
            [Action(
                r#" let s = "}"; let c = '}'; let r: &'static str = s; /* } */ "#
            )]
        );
        assert_eq!(
            tokens("{ f('\\'', \"\\\"}\") // }\n }"),
            [Action(" f('\\'', \"\\\"}\") // }\n ")]
        );
    }

    #[test]
    fn type_line() {
        assert_eq!(
            tokens("%valuetype Option<Box<u32>> \nA"),
            [Kw(Keyword::ValueType), Type("Option<Box<u32>>"), Ident("A")]
        );
        assert_eq!(
            tokens("%locationtype\n%%"),
            [Kw(Keyword::LocationType), Type(""), Mark]
        );
    }

    #[test]
    fn error_locations() {
        let err = first_error("A\n  $");
        assert_eq!((err.location.line, err.location.col), (1, 2));
        assert!(matches!(
            err.kind,
            LexerErrorKind::Custom(SyntaxErrorKind::UnexpectedChar('$'))
        ));

        let err = first_error("%foo");
        assert!(matches!(
            err.kind,
            LexerErrorKind::Custom(SyntaxErrorKind::UnknownDirective(ref name)) if name == "foo"
        ));

        let err = first_error("'ab'");
        assert!(matches!(
            err.kind,
            LexerErrorKind::Custom(SyntaxErrorKind::UnterminatedLiteral)
        ));

        let err = first_error("'\\q'");
        assert!(matches!(
            err.kind,
            LexerErrorKind::Custom(SyntaxErrorKind::UnknownEscape('q'))
        ));

        let err = first_error("\n { {} ");
        assert_eq!((err.location.line, err.location.col), (1, 1));
        assert!(matches!(
            err.kind,
            LexerErrorKind::Custom(SyntaxErrorKind::UnterminatedAction)
        ));

        let err = first_error("A /* open");
        assert!(matches!(
            err.kind,
            LexerErrorKind::Custom(SyntaxErrorKind::UnterminatedComment)
        ));

        let err = first_error("%token <i64\nA");
        assert!(matches!(
            err.kind,
            LexerErrorKind::Custom(SyntaxErrorKind::UnterminatedTag)
        ));
    }
}
