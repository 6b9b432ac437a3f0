//! Parsers generated from `grammars/*.y`, driven over a small hand-written lexer.

#![cfg(test)]

use lalrgen_runtime::{TokenCode, TokenSource};

pub mod calc {
    include!(concat!(env!("OUT_DIR"), "/calc.rs"));
}

pub mod recover {
    include!(concat!(env!("OUT_DIR"), "/recover.rs"));
}

pub mod located {
    include!(concat!(env!("OUT_DIR"), "/located.rs"));
}

/// Splits the input into numbers and single punctuation characters.
///
/// Locations are the byte offsets of the tokens.
struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    num: i64,
    start: usize,
    num_token: TokenCode,
    eof_token: TokenCode,
    errors: Vec<(usize, Vec<TokenCode>)>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, num_token: TokenCode, eof_token: TokenCode) -> Self {
        Self {
            input,
            pos: 0,
            num: 0,
            start: 0,
            num_token,
            eof_token,
            errors: vec![],
        }
    }
}

impl TokenSource for Lexer<'_> {
    type Value = i64;
    type Location = usize;

    fn next_token(&mut self) -> TokenCode {
        let rest = &self.input[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
        self.start = self.pos;

        let digits = trimmed
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(trimmed.len());
        if digits > 0 {
            self.num = trimmed[..digits].parse().unwrap();
            self.pos += digits;
            return self.num_token;
        }

        match trimmed.chars().next() {
            Some(ch) => {
                self.num = 0;
                self.pos += ch.len_utf8();
                ch as TokenCode
            }
            None => self.eof_token,
        }
    }

    fn value(&mut self) -> i64 {
        self.num
    }

    fn location(&self) -> usize {
        self.start
    }

    fn report_error(&mut self, expected: &[TokenCode]) {
        self.errors.push((self.start, expected.to_vec()));
    }
}

mod test_calc {
    use super::*;
    use lalrgen_runtime::ParseError;

    fn eval(input: &str) -> Result<i64, ParseError> {
        let mut lexer = Lexer::new(input, calc::token::NUM, calc::EOF_TOKEN);
        calc::parse(&mut lexer)
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), 7);
        assert_eq!(eval("2 * 3 + 1").unwrap(), 7);
        assert_eq!(eval("(1 + 2) * 3").unwrap(), 9);
    }

    #[test]
    fn left_associative() {
        assert_eq!(eval("1 - 2 - 3").unwrap(), -4);
        assert_eq!(eval("12 / 3 / 2").unwrap(), 2);
    }

    #[test]
    fn unary_minus() {
        assert_eq!(eval("-2 * 3").unwrap(), -6);
        assert_eq!(eval("- - 4").unwrap(), 4);
        assert_eq!(eval("1 - -1").unwrap(), 2);
    }

    #[test]
    fn single_number() {
        assert_eq!(eval("42").unwrap(), 42);
    }

    #[test]
    fn syntax_error() {
        let mut lexer = Lexer::new("1 + * 2", calc::token::NUM, calc::EOF_TOKEN);
        let err = calc::parse(&mut lexer).unwrap_err();
        assert!(matches!(err, ParseError::Unrecoverable), "{:?}", err);
        assert_eq!(lexer.errors.len(), 1);
        let (at, expected) = &lexer.errors[0];
        assert_eq!(*at, 4);
        assert!(expected.contains(&calc::token::NUM));
        assert!(expected.contains(&('(' as TokenCode)));
        assert!(!expected.contains(&('*' as TokenCode)));
    }

    #[test]
    fn empty_input() {
        let mut lexer = Lexer::new("", calc::token::NUM, calc::EOF_TOKEN);
        assert!(calc::parse(&mut lexer).is_err());
        assert_eq!(lexer.errors.len(), 1);
        assert_eq!(lexer.errors[0].0, 0);
    }
}

mod test_recover {
    use super::*;

    fn sum(input: &str) -> (i64, usize) {
        let mut lexer = Lexer::new(input, recover::token::NUM, recover::EOF_TOKEN);
        let value = recover::parse(&mut lexer).unwrap();
        (value, lexer.errors.len())
    }

    #[test]
    fn well_formed() {
        assert_eq!(sum(""), (0, 0));
        assert_eq!(sum("1; 2; 3;"), (6, 0));
    }

    #[test]
    fn skips_malformed_item() {
        assert_eq!(sum("1; 2 3; 4;"), (5, 1));
    }

    #[test]
    fn recovers_more_than_once() {
        assert_eq!(sum("1; ; 2; + +; 3;"), (6, 2));
    }

    #[test]
    fn error_at_end_of_input() {
        let mut lexer = Lexer::new("1; 2", recover::token::NUM, recover::EOF_TOKEN);
        assert!(recover::parse(&mut lexer).is_err());
        assert_eq!(lexer.errors.len(), 1);
    }

    #[test]
    fn token_names() {
        assert_eq!(recover::token_name(recover::token::NUM), "NUM");
        assert_eq!(recover::token_name(';' as u32), "';'");
        assert_eq!(recover::token_name(recover::EOF_TOKEN), "end of input");
    }
}

mod test_located {
    use super::*;

    fn suffix_location(input: &str) -> i64 {
        let mut lexer = Lexer::new(input, located::token::NUM, located::EOF_TOKEN);
        located::parse(&mut lexer).unwrap()
    }

    #[test]
    fn non_empty_rule_starts_at_first_symbol() {
        assert_eq!(suffix_location("  12 + 3"), 5);
    }

    #[test]
    fn empty_rule_takes_preceding_location() {
        assert_eq!(suffix_location("  12"), 2);
    }
}
