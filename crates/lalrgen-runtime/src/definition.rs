//! Parser definition.

use std::fmt;

/// The external number identifying a token, as returned by the lexer.
pub type TokenCode = u32;

/// The trait for abstracting the generated LALR(1) parse table.
pub trait ParserDef {
    /// The number to identify the state of LR automaton.
    type State: Copy + PartialEq + fmt::Debug;

    /// The number to identify the nonterminal symbols.
    type Nonterminal: Copy + fmt::Debug;

    /// The number to identify the production rules.
    type Rule: Copy + fmt::Debug;

    /// Return the initial state number.
    fn initial_state(&self) -> Self::State;

    /// Return the action corresponding to the specified state number and
    /// lookahead token.
    ///
    /// The end of input is passed as the code returned by [`eof_token`](Self::eof_token).
    fn action(
        &self,
        current: Self::State,
        lookahead: TokenCode,
    ) -> ParseAction<Self::State, Self::Nonterminal, Self::Rule>;

    /// Return the state to transition to after reducing to `symbol`.
    fn goto(&self, current: Self::State, symbol: Self::Nonterminal) -> Option<Self::State>;

    /// Return the token codes that have a non-error action in the specified state.
    fn expected_tokens(&self, current: Self::State) -> Vec<TokenCode>;

    /// The code of the reserved `error` token.
    fn error_token(&self) -> TokenCode;

    /// The code of the end-of-input token.
    fn eof_token(&self) -> TokenCode;
}

impl<T: ?Sized> ParserDef for &T
where
    T: ParserDef,
{
    type State = T::State;
    type Nonterminal = T::Nonterminal;
    type Rule = T::Rule;

    fn initial_state(&self) -> Self::State {
        (**self).initial_state()
    }

    fn action(
        &self,
        current: Self::State,
        lookahead: TokenCode,
    ) -> ParseAction<Self::State, Self::Nonterminal, Self::Rule> {
        (**self).action(current, lookahead)
    }

    fn goto(&self, current: Self::State, symbol: Self::Nonterminal) -> Option<Self::State> {
        (**self).goto(current, symbol)
    }

    fn expected_tokens(&self, current: Self::State) -> Vec<TokenCode> {
        (**self).expected_tokens(current)
    }

    fn error_token(&self) -> TokenCode {
        (**self).error_token()
    }

    fn eof_token(&self) -> TokenCode {
        (**self).eof_token()
    }
}

impl<T: ?Sized> ParserDef for std::rc::Rc<T>
where
    T: ParserDef,
{
    type State = T::State;
    type Nonterminal = T::Nonterminal;
    type Rule = T::Rule;

    fn initial_state(&self) -> Self::State {
        (**self).initial_state()
    }

    fn action(
        &self,
        current: Self::State,
        lookahead: TokenCode,
    ) -> ParseAction<Self::State, Self::Nonterminal, Self::Rule> {
        (**self).action(current, lookahead)
    }

    fn goto(&self, current: Self::State, symbol: Self::Nonterminal) -> Option<Self::State> {
        (**self).goto(current, symbol)
    }

    fn expected_tokens(&self, current: Self::State) -> Vec<TokenCode> {
        (**self).expected_tokens(current)
    }

    fn error_token(&self) -> TokenCode {
        (**self).error_token()
    }

    fn eof_token(&self) -> TokenCode {
        (**self).eof_token()
    }
}

/// An entry of the action table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParseAction<TState, TNonterminal, TRule> {
    /// Push the lookahead token and move to the specified state.
    Shift(TState),
    /// Reduce the specified rule, which produces the nonterminal from the
    /// given number of symbols.
    Reduce(TRule, TNonterminal, usize),
    /// The input has been accepted.
    Accept,
    /// The lookahead token is not acceptable in this state.
    Error,
}
