//! A driver running [`ParseEngine`] over a token source with value and location stacks.

use crate::{
    definition::{ParserDef, TokenCode},
    engine::{ParseEngine, ParseError, ParseEvent, Recovery},
};

/// The lexer interface consumed by [`parse`].
pub trait TokenSource {
    /// The semantic value attached to each symbol.
    type Value: Default;

    /// The source position attached to each symbol.
    type Location: Clone + Default;

    /// Advance to the next token and return its code.
    ///
    /// At the end of input the end-of-input code is returned, repeatedly if asked again.
    fn next_token(&mut self) -> TokenCode;

    /// The semantic value of the token most recently returned by `next_token`.
    fn value(&mut self) -> Self::Value;

    /// The position of the token most recently returned by `next_token`.
    fn location(&self) -> Self::Location;

    /// Report a syntax error at the current token.
    fn report_error(&mut self, expected: &[TokenCode]);
}

/// Parse the whole input and return the semantic value of the start symbol.
///
/// `reduce` is invoked for every reduction with the rule number and the
/// values and locations of the right-hand side symbols, and returns the
/// value and location of the produced nonterminal. For an empty right-hand
/// side the locations hold the symbol just below it on the stack, if any.
///
/// Syntax errors are reported through [`TokenSource::report_error`] and
/// recovered through the `error` token when the grammar provides one.
pub fn parse<TDef, TSrc, F>(
    definition: TDef,
    source: &mut TSrc,
    mut reduce: F,
) -> Result<TSrc::Value, ParseError>
where
    TDef: ParserDef,
    TSrc: TokenSource + ?Sized,
    F: FnMut(TDef::Rule, &mut [TSrc::Value], &[TSrc::Location]) -> (TSrc::Value, TSrc::Location),
{
    let mut engine = ParseEngine::new(definition);
    let mut values: Vec<TSrc::Value> = vec![];
    let mut locations: Vec<TSrc::Location> = vec![];

    loop {
        match engine.resume()? {
            ParseEvent::InputNeeded => {
                let token = source.next_token();
                engine.offer_token(token)?;
            }

            ParseEvent::Shifting(..) => {
                values.push(source.value());
                locations.push(source.location());
            }

            ParseEvent::AboutToReduce { rule, len, .. } => {
                let at = values.len().checked_sub(len).ok_or(ParseError::EmptyStack)?;
                let rhs_locations = match len {
                    0 => &locations[at.saturating_sub(1)..],
                    _ => &locations[at..],
                };
                let (value, location) = reduce(rule, &mut values[at..], rhs_locations);
                values.truncate(at);
                locations.truncate(at);
                values.push(value);
                locations.push(location);
            }

            ParseEvent::HandlingError { expected, .. } => {
                if !engine.is_recovering() {
                    source.report_error(&expected);
                }
                match engine.recover()? {
                    Recovery::ErrorShifted { popped } => {
                        let at = values.len().saturating_sub(popped);
                        values.truncate(at);
                        locations.truncate(at);
                        values.push(TSrc::Value::default());
                        locations.push(source.location());
                    }
                    Recovery::Discarded(..) => {}
                }
            }

            ParseEvent::Accepted => {
                // Only the start symbol is left on the stack.
                return values.into_iter().next().ok_or(ParseError::EmptyStack);
            }
        }
    }
}
