//! An LALR(1) parser generator.
//!
//! The pipeline runs in three stages, each finished before the next starts:
//!
//! 1. [`lr0::lr0`] builds the LR(0) automaton of the augmented grammar,
//! 2. [`lalr::lalr`] computes the look-ahead sets of every reduction,
//! 3. [`table::generate`] fills the parse table and resolves conflicts.
//!
//! ```
//! use lalrgen::grammar::Grammar;
//!
//! let grammar = Grammar::from_str("%%\n%token NUM\n%left '+'\n%%\nE : E '+' E | NUM ;\n")?;
//! let table = lalrgen::compute(&grammar);
//! assert!(table.conflicts.is_empty());
//! # Ok::<(), lalrgen::grammar::GrammarDefError>(())
//! ```

pub mod build;
pub mod codegen;
pub mod digraph;
pub mod grammar;
pub mod lalr;
pub mod lr0;
pub mod syntax;
pub mod table;
pub mod types;
pub mod util;

use crate::{
    grammar::Grammar, lalr::LALRData, lr0::LR0Automaton, table::ParseTable, util::display_fn,
};
use std::fmt;

/// Build the LR(0) automaton and fill in its LALR(1) look-ahead sets.
pub fn compute_automaton(g: &Grammar) -> (LR0Automaton, LALRData) {
    let span = tracing::trace_span!("compute_automaton");
    let _entered = span.enter();

    let mut lr0 = lr0::lr0(g);
    let lalr = lalr::lalr(g, &mut lr0);
    (lr0, lalr)
}

/// Run the whole pipeline and return the parse table.
pub fn compute(g: &Grammar) -> ParseTable {
    let (lr0, _) = compute_automaton(g);
    table::generate(g, &lr0)
}

/// Human-readable dump of every stage, in pipeline order.
pub fn report<'g>(
    g: &'g Grammar,
    lr0: &'g LR0Automaton,
    lalr: &'g LALRData,
    table: &'g ParseTable,
) -> impl fmt::Display + 'g {
    display_fn(move |f| {
        writeln!(f, "######## Grammar\n")?;
        writeln!(f, "{}", g)?;
        writeln!(f, "######## LR(0) states\n")?;
        writeln!(f, "{}", lr0.display(g))?;
        writeln!(f, "######## Transitions\n")?;
        writeln!(f, "{}", lalr.display(g))?;
        writeln!(f, "######## Parse table\n")?;
        write!(f, "{}", table.display(g))
    })
}
