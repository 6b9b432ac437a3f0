//! The implementation of LALR(1) parser engine.

use crate::definition::{ParseAction, ParserDef, TokenCode};
use std::fmt;

/// The instance of LALR(1) parser engine that drives incrementally, based on generated parser definition.
///
/// The engine only tracks the automaton states. Semantic values are kept by
/// the caller, which observes every shift and reduction through [`ParseEvent`].
pub struct ParseEngine<TDef>
where
    TDef: ParserDef,
{
    definition: TDef,
    state: ParseEngineState<TDef>,
    states_stack: Vec<TDef::State>,
    lookahead: Option<TokenCode>,
    recovering: bool,
}

impl<TDef> fmt::Debug for ParseEngine<TDef>
where
    TDef: ParserDef,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseEngine")
            .field("state", &self.state)
            .field("states_stack", &self.states_stack)
            .field("lookahead", &self.lookahead)
            .field("recovering", &self.recovering)
            .finish_non_exhaustive()
    }
}

enum ParseEngineState<TDef>
where
    TDef: ParserDef,
{
    Pending,
    WaitingInput,
    Shifting(TDef::State),
    Reducing(TDef::Nonterminal, usize),
    HandlingError,
    Accepted,
}

impl<TDef> fmt::Debug for ParseEngineState<TDef>
where
    TDef: ParserDef,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.debug_struct("Pending").finish(),
            Self::WaitingInput => f.debug_struct("WaitingInput").finish(),
            Self::Shifting(next) => f.debug_tuple("Shifting").field(next).finish(),
            Self::Reducing(symbol, n) => f.debug_tuple("Reducing").field(symbol).field(n).finish(),
            Self::HandlingError => f.debug_struct("HandlingError").finish(),
            Self::Accepted => f.debug_struct("Accepted").finish(),
        }
    }
}

impl<TDef> ParseEngine<TDef>
where
    TDef: ParserDef,
{
    /// Create a parser engine using the specified parser definition.
    pub fn new(definition: TDef) -> Self {
        let initial_state = definition.initial_state();
        Self {
            definition,
            states_stack: vec![initial_state],
            state: ParseEngineState::Pending,
            lookahead: None,
            recovering: false,
        }
    }

    pub fn definition(&self) -> &TDef {
        &self.definition
    }

    /// Supply the lookahead token requested by [`ParseEvent::InputNeeded`].
    pub fn offer_token(&mut self, token: TokenCode) -> Result<(), ParseError> {
        if !matches!(self.state, ParseEngineState::WaitingInput) {
            return Err(ParseError::AlreadyOfferredInput);
        }
        self.state = ParseEngineState::Pending;
        self.lookahead = Some(token);
        Ok(())
    }

    /// Whether the engine has shifted an `error` token and not yet shifted
    /// a real token after it.
    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    /// Drives the internal LR automaton to the point where the user of this parser needs to do something.
    pub fn resume(&mut self) -> Result<ParseEvent<TDef>, ParseError> {
        match self.state {
            ParseEngineState::WaitingInput => {
                return Err(ParseError::TokenNotOffered);
            }

            ParseEngineState::Shifting(next) => {
                self.lookahead.take().ok_or(ParseError::TokenNotOffered)?;
                self.states_stack.push(next);
                self.recovering = false;
                self.state = ParseEngineState::Pending;
            }

            ParseEngineState::Reducing(lhs, n) => {
                let len = self
                    .states_stack
                    .len()
                    .checked_sub(n)
                    .filter(|len| *len > 0)
                    .ok_or(ParseError::EmptyStack)?;
                self.states_stack.truncate(len);
                let current = self.current_state()?;
                let next = self
                    .definition
                    .goto(current, lhs)
                    .ok_or(ParseError::MissingGoto)?;
                self.states_stack.push(next);
                self.state = ParseEngineState::Pending;
            }

            ParseEngineState::HandlingError => {
                return Err(ParseError::ErrorNotHandled);
            }

            ParseEngineState::Accepted => {
                return Err(ParseError::AlreadyAccepted);
            }

            ParseEngineState::Pending => {}
        }

        let current = self.current_state()?;
        let lookahead = match self.lookahead {
            Some(lookahead) => lookahead,
            None => {
                self.state = ParseEngineState::WaitingInput;
                return Ok(ParseEvent::InputNeeded);
            }
        };

        match self.definition.action(current, lookahead) {
            ParseAction::Shift(next) => {
                self.state = ParseEngineState::Shifting(next);
                Ok(ParseEvent::Shifting(lookahead))
            }

            ParseAction::Reduce(rule, lhs, n) => {
                self.state = ParseEngineState::Reducing(lhs, n);
                Ok(ParseEvent::AboutToReduce { rule, lhs, len: n })
            }

            ParseAction::Accept => {
                self.state = ParseEngineState::Accepted;
                Ok(ParseEvent::Accepted)
            }

            ParseAction::Error => {
                self.state = ParseEngineState::HandlingError;
                Ok(ParseEvent::HandlingError {
                    state: current,
                    lookahead,
                    expected: self.definition.expected_tokens(current),
                })
            }
        }
    }

    /// Recover from the syntax error reported by [`ParseEvent::HandlingError`].
    ///
    /// Outside of recovery mode, states are popped until one of them can
    /// shift the `error` token, which is then shifted while the offending
    /// lookahead is kept. Once in recovery mode, unacceptable lookahead
    /// tokens are discarded instead.
    pub fn recover(&mut self) -> Result<Recovery, ParseError> {
        if !matches!(self.state, ParseEngineState::HandlingError) {
            return Err(ParseError::NotHandlingError);
        }
        let lookahead = self.lookahead.ok_or(ParseError::TokenNotOffered)?;

        if self.recovering {
            if lookahead == self.definition.eof_token() {
                return Err(ParseError::Unrecoverable);
            }
            self.lookahead = None;
            self.state = ParseEngineState::Pending;
            return Ok(Recovery::Discarded(lookahead));
        }

        let error = self.definition.error_token();
        let mut popped = 0;
        while let Some(&current) = self.states_stack.last() {
            if let ParseAction::Shift(next) = self.definition.action(current, error) {
                self.states_stack.push(next);
                self.recovering = true;
                self.state = ParseEngineState::Pending;
                return Ok(Recovery::ErrorShifted { popped });
            }
            self.states_stack.pop();
            popped += 1;
        }

        Err(ParseError::Unrecoverable)
    }

    fn current_state(&self) -> Result<TDef::State, ParseError> {
        self.states_stack.last().copied().ok_or(ParseError::EmptyStack)
    }
}

pub enum ParseEvent<TDef>
where
    TDef: ParserDef,
{
    /// The engine needs the next lookahead token.
    InputNeeded,
    /// The lookahead token is about to be shifted.
    Shifting(TokenCode),
    /// The top `len` symbols are about to be reduced to `lhs`.
    AboutToReduce {
        rule: TDef::Rule,
        lhs: TDef::Nonterminal,
        len: usize,
    },
    /// The lookahead token has no action in the current state.
    HandlingError {
        state: TDef::State,
        lookahead: TokenCode,
        expected: Vec<TokenCode>,
    },
    /// The input has been accepted.
    Accepted,
}

impl<TDef> fmt::Debug for ParseEvent<TDef>
where
    TDef: ParserDef,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputNeeded => f.debug_struct("InputNeeded").finish(),
            Self::Shifting(token) => f.debug_tuple("Shifting").field(token).finish(),
            Self::AboutToReduce { rule, lhs, len } => f
                .debug_struct("AboutToReduce")
                .field("rule", rule)
                .field("lhs", lhs)
                .field("len", len)
                .finish(),
            Self::HandlingError {
                state,
                lookahead,
                expected,
            } => f
                .debug_struct("HandlingError")
                .field("state", state)
                .field("lookahead", lookahead)
                .field("expected", expected)
                .finish(),
            Self::Accepted => f.debug_struct("Accepted").finish(),
        }
    }
}

/// The outcome of [`ParseEngine::recover`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// `popped` states were removed and the `error` token was shifted.
    ErrorShifted { popped: usize },
    /// The lookahead token was thrown away.
    Discarded(TokenCode),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("token is not offered")]
    TokenNotOffered,

    #[error("token has already been offerred")]
    AlreadyOfferredInput,

    #[error("already accepted")]
    AlreadyAccepted,

    #[error("the state stack is empty")]
    EmptyStack,

    #[error("no goto entry for the reduced nonterminal")]
    MissingGoto,

    #[error("the syntax error has not been handled")]
    ErrorNotHandled,

    #[error("not handling a syntax error")]
    NotHandlingError,

    #[error("syntax error could not be recovered")]
    Unrecoverable,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EOF: TokenCode = 0;
    const A: TokenCode = 1;
    const ERROR: TokenCode = 2;
    const B: TokenCode = 3;

    /// `S : a ;` with the states of its LALR(1) automaton written by hand.
    struct Single;

    impl ParserDef for Single {
        type State = u8;
        type Nonterminal = char;
        type Rule = u8;

        fn initial_state(&self) -> u8 {
            0
        }

        fn action(&self, current: u8, lookahead: TokenCode) -> ParseAction<u8, char, u8> {
            match (current, lookahead) {
                (0, A) => ParseAction::Shift(1),
                (1, EOF) => ParseAction::Reduce(1, 'S', 1),
                (2, EOF) => ParseAction::Shift(3),
                (3, _) => ParseAction::Accept,
                _ => ParseAction::Error,
            }
        }

        fn goto(&self, current: u8, symbol: char) -> Option<u8> {
            match (current, symbol) {
                (0, 'S') => Some(2),
                _ => None,
            }
        }

        fn expected_tokens(&self, current: u8) -> Vec<TokenCode> {
            match current {
                0 => vec![A],
                1 | 2 => vec![EOF],
                _ => vec![],
            }
        }

        fn error_token(&self) -> TokenCode {
            ERROR
        }

        fn eof_token(&self) -> TokenCode {
            EOF
        }
    }

    #[test]
    fn accepts_single_token() {
        let mut engine = ParseEngine::new(Single);
        assert!(matches!(engine.resume(), Ok(ParseEvent::InputNeeded)));
        engine.offer_token(A).unwrap();
        assert!(matches!(engine.resume(), Ok(ParseEvent::Shifting(A))));
        assert!(matches!(engine.resume(), Ok(ParseEvent::InputNeeded)));
        engine.offer_token(EOF).unwrap();
        assert!(matches!(
            engine.resume(),
            Ok(ParseEvent::AboutToReduce {
                rule: 1,
                lhs: 'S',
                len: 1
            })
        ));
        assert!(matches!(engine.resume(), Ok(ParseEvent::Shifting(EOF))));
        assert!(matches!(engine.resume(), Ok(ParseEvent::InputNeeded)));
        engine.offer_token(EOF).unwrap();
        assert!(matches!(engine.resume(), Ok(ParseEvent::Accepted)));
        assert!(matches!(engine.resume(), Err(ParseError::AlreadyAccepted)));
    }

    #[test]
    fn token_must_be_offered() {
        let mut engine = ParseEngine::new(Single);
        assert!(matches!(engine.resume(), Ok(ParseEvent::InputNeeded)));
        assert!(matches!(engine.resume(), Err(ParseError::TokenNotOffered)));
    }

    #[test]
    fn unexpected_token_without_error_rule() {
        let mut engine = ParseEngine::new(Single);
        assert!(matches!(engine.resume(), Ok(ParseEvent::InputNeeded)));
        engine.offer_token(B).unwrap();
        match engine.resume() {
            Ok(ParseEvent::HandlingError {
                state,
                lookahead,
                expected,
            }) => {
                assert_eq!(state, 0);
                assert_eq!(lookahead, B);
                assert_eq!(expected, [A]);
            }
            ev => panic!("unexpected event: {:?}", ev),
        }
        assert!(matches!(engine.resume(), Err(ParseError::ErrorNotHandled)));
        assert!(matches!(engine.recover(), Err(ParseError::Unrecoverable)));
    }
}
