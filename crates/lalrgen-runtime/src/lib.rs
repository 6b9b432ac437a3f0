//! Runtime implementation for `lalrgen` parser generator.

pub mod definition;
pub mod engine;
pub mod parser;

pub use crate::{
    definition::{ParseAction, ParserDef, TokenCode},
    engine::{ParseEngine, ParseError, ParseEvent, Recovery},
    parser::{parse, TokenSource},
};
