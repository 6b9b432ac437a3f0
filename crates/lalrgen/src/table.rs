//! Calculation of LALR(1) parse table.

use crate::{
    grammar::{Assoc, Grammar, NonterminalID, ProductionID, TerminalID},
    lr0::{LR0Automaton, StateID},
    types::Map,
    util::display_fn,
};
use lalrgen_runtime::definition::{ParseAction, ParserDef, TokenCode};
use std::{cmp::Ordering, fmt, ops};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Shift(StateID),
    Reduce(ProductionID),
    Accept,
}

impl Action {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| match self {
            Self::Shift(next) => write!(f, "shift({:?})", next),
            Self::Reduce(p) => write!(f, "reduce({})", g.production(*p).display(g)),
            Self::Accept => f.write_str("accept"),
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct ParseTableRow {
    pub actions: Map<TerminalID, Action>,
    pub gotos: Map<NonterminalID, StateID>,
}

/// A conflict that could not be settled by precedence and associativity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub state: StateID,
    pub terminal: TerminalID,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// Resolved in favor of the shift.
    ShiftReduce {
        next: StateID,
        production: ProductionID,
    },
    /// Resolved in favor of the production declared first.
    ReduceReduce {
        chosen: ProductionID,
        rejected: ProductionID,
    },
}

impl Conflict {
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            let terminal = &g.terminals[&self.terminal];
            match &self.kind {
                ConflictKind::ShiftReduce { next, production } => write!(
                    f,
                    "state {}: shift/reduce conflict on {} between shift({:?}) and reduce({}), resolved as shift",
                    self.state,
                    terminal,
                    next,
                    g.production(*production).display(g),
                ),
                ConflictKind::ReduceReduce { chosen, rejected } => write!(
                    f,
                    "state {}: reduce/reduce conflict on {} between reduce({}) and reduce({}), resolved as reduce({})",
                    self.state,
                    terminal,
                    g.production(*chosen).display(g),
                    g.production(*rejected).display(g),
                    g.production(*chosen).display(g),
                ),
            }
        })
    }
}

#[derive(Debug)]
pub struct ParseTable {
    pub states: Vec<ParseTableRow>,
    pub conflicts: Vec<Conflict>,
}

impl ops::Index<StateID> for ParseTable {
    type Output = ParseTableRow;
    fn index(&self, index: StateID) -> &Self::Output {
        &self.states[index.into_raw() as usize]
    }
}

impl ParseTable {
    pub fn state_ids(&self) -> impl Iterator<Item = StateID> {
        (0..self.states.len()).map(|i| StateID::from_raw(i as u32))
    }

    /// The terminals that have an action in the specified state.
    pub fn expected_terminals(&self, state: StateID) -> impl Iterator<Item = TerminalID> + '_ {
        self[state].actions.keys().copied()
    }

    /// Adapt this table to the [`ParserDef`] interface of the runtime,
    /// keyed by the token codes of `g`.
    pub fn definition<'t>(&'t self, g: &'t Grammar) -> TableDefinition<'t> {
        TableDefinition { grammar: g, table: self }
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            for (id, row) in self.state_ids().zip(&self.states) {
                writeln!(f, "#### State {:?}", id)?;
                writeln!(f, "## actions")?;
                for (t, action) in &row.actions {
                    writeln!(f, "- {} => {}", g.terminals[t], action.display(g))?;
                }
                if !row.gotos.is_empty() {
                    writeln!(f, "## gotos")?;
                    for (n, next) in &row.gotos {
                        writeln!(f, "- {} => {:?}", g.nonterminals[n], next)?;
                    }
                }
                writeln!(f)?;
            }
            if !self.conflicts.is_empty() {
                writeln!(f, "#### Conflicts")?;
                for conflict in &self.conflicts {
                    writeln!(f, "- {}", conflict.display(g))?;
                }
            }
            Ok(())
        })
    }
}

/// Build the parse table from an LR(0) automaton whose look-ahead sets have
/// been filled in.
pub fn generate(g: &Grammar, lr0: &LR0Automaton) -> ParseTable {
    let _span = tracing::debug_span!("generate_parse_table").entered();

    let mut states = Vec::with_capacity(lr0.states.len());
    let mut conflicts = vec![];

    for (id, state) in lr0.iter() {
        let mut actions: Map<TerminalID, Action> = Map::default();
        for (&t, &next) in &state.shifts {
            actions.insert(t, Action::Shift(next));
        }

        for (&reduce, lookaheads) in &state.reduces {
            if reduce == ProductionID::ACCEPT {
                for t in lookaheads.iter() {
                    actions.insert(t, Action::Accept);
                }
                continue;
            }

            for t in lookaheads.iter() {
                let resolved = match actions.get(&t).copied() {
                    None => Action::Reduce(reduce),

                    Some(Action::Shift(next)) => match resolve_shift_reduce(g, t, reduce) {
                        Some(Resolution::Shift) => Action::Shift(next),
                        Some(Resolution::Reduce) => Action::Reduce(reduce),
                        None => {
                            let conflict = Conflict {
                                state: id,
                                terminal: t,
                                kind: ConflictKind::ShiftReduce {
                                    next,
                                    production: reduce,
                                },
                            };
                            tracing::warn!("{}", conflict.display(g));
                            conflicts.push(conflict);
                            Action::Shift(next)
                        }
                    },

                    Some(Action::Reduce(other)) => {
                        let (chosen, rejected) = if other < reduce {
                            (other, reduce)
                        } else {
                            (reduce, other)
                        };
                        let conflict = Conflict {
                            state: id,
                            terminal: t,
                            kind: ConflictKind::ReduceReduce { chosen, rejected },
                        };
                        tracing::warn!("{}", conflict.display(g));
                        conflicts.push(conflict);
                        Action::Reduce(chosen)
                    }

                    // the accepting state has no other reductions.
                    Some(Action::Accept) => Action::Accept,
                };
                actions.insert(t, resolved);
            }
        }

        tracing::trace!(state = ?id, actions = actions.len(), gotos = state.gotos.len());
        states.push(ParseTableRow {
            actions,
            gotos: state.gotos.clone(),
        });
    }

    tracing::debug!(
        states = states.len(),
        conflicts = conflicts.len(),
        "parse table generated"
    );

    ParseTable { states, conflicts }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Resolution {
    Shift,
    Reduce,
}

/// Settle a shift/reduce conflict on `t` by the precedence of the terminal
/// and the production.
///
/// Returns `None` when either side has no precedence.
fn resolve_shift_reduce(g: &Grammar, t: TerminalID, reduce: ProductionID) -> Option<Resolution> {
    let shift_prec = g.terminals[&t].precedence()?;
    let reduce_prec = g.production(reduce).precedence(g)?;
    let resolution = match shift_prec.priority.cmp(&reduce_prec.priority) {
        Ordering::Greater => Resolution::Shift,
        Ordering::Less => Resolution::Reduce,
        Ordering::Equal => match shift_prec.assoc {
            Assoc::Left => Resolution::Reduce,
            Assoc::Right | Assoc::Nonassoc => Resolution::Shift,
        },
    };
    Some(resolution)
}

/// A [`ParserDef`] backed by a [`ParseTable`] in memory.
#[derive(Debug, Copy, Clone)]
pub struct TableDefinition<'t> {
    grammar: &'t Grammar,
    table: &'t ParseTable,
}

impl ParserDef for TableDefinition<'_> {
    type State = StateID;
    type Nonterminal = NonterminalID;
    type Rule = ProductionID;

    fn initial_state(&self) -> StateID {
        StateID::INITIAL
    }

    fn action(
        &self,
        current: StateID,
        lookahead: TokenCode,
    ) -> ParseAction<StateID, NonterminalID, ProductionID> {
        let Some(t) = self.grammar.terminal_by_code(lookahead) else {
            return ParseAction::Error;
        };
        match self.table[current].actions.get(&t) {
            Some(Action::Shift(next)) => ParseAction::Shift(*next),
            Some(Action::Reduce(p)) => {
                let production = self.grammar.production(*p);
                ParseAction::Reduce(*p, production.left(), production.right().len())
            }
            Some(Action::Accept) => ParseAction::Accept,
            None => ParseAction::Error,
        }
    }

    fn goto(&self, current: StateID, symbol: NonterminalID) -> Option<StateID> {
        self.table[current].gotos.get(&symbol).copied()
    }

    fn expected_tokens(&self, current: StateID) -> Vec<TokenCode> {
        self.table
            .expected_terminals(current)
            .map(|t| self.grammar.terminals[&t].code())
            .collect()
    }

    fn error_token(&self) -> TokenCode {
        self.grammar.terminals[&TerminalID::ERROR].code()
    }

    fn eof_token(&self) -> TokenCode {
        self.grammar.terminals[&TerminalID::EOI].code()
    }
}
