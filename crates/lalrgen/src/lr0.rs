//! LR(0) automaton construction.

use crate::{
    grammar::{Grammar, NonterminalID, ProductionID, SymbolID, TerminalID, TerminalSet},
    types::{Map, Set},
    util::display_fn,
};
use std::{collections::VecDeque, fmt, ops};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateID(u32);
impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.0)
    }
}
impl fmt::Display for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
impl StateID {
    pub const INITIAL: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The LR(0) item, a.k.a. LR item core.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LR0Item {
    pub production: ProductionID,
    pub index: u16,
}
impl LR0Item {
    /// The symbol right after the dot, or `None` if this is a reduction item.
    pub fn next_symbol(&self, g: &Grammar) -> Option<SymbolID> {
        g.production(self.production)
            .right()
            .get(usize::from(self.index))
            .copied()
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            let production = g.production(self.production);
            write!(f, "{} : [", g.nonterminals[&production.left()])?;
            for (i, r) in production.right().iter().enumerate() {
                if i == usize::from(self.index) {
                    f.write_str(" .")?;
                }
                write!(f, " {}", g.symbol_name(*r))?;
            }
            if production.right().len() == usize::from(self.index) {
                f.write_str(" .")?;
            }
            f.write_str(" ]")
        })
    }
}

#[derive(Debug, Clone)]
pub struct LR0State {
    /// The items that define the identity of this state, sorted.
    pub kernels: Vec<LR0Item>,
    /// The kernel items followed by their closure.
    pub items: Vec<LR0Item>,
    /// The symbol on the edges entering this state. `None` for the initial state.
    pub accessing_symbol: Option<SymbolID>,
    pub shifts: Map<TerminalID, StateID>,
    pub gotos: Map<NonterminalID, StateID>,
    /// The completed productions and their look-ahead sets.
    ///
    /// The sets stay empty until the LALR(1) look-aheads are computed.
    pub reduces: Map<ProductionID, TerminalSet>,
}

impl LR0State {
    pub fn next_state(&self, symbol: SymbolID) -> Option<StateID> {
        match symbol {
            SymbolID::T(t) => self.shifts.get(&t).copied(),
            SymbolID::N(n) => self.gotos.get(&n).copied(),
        }
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            writeln!(f, "## kernels:")?;
            for kernel in &self.kernels {
                writeln!(f, "- {}", kernel.display(g))?;
            }
            if self.items.len() > self.kernels.len() {
                writeln!(f, "## closure:")?;
                for item in &self.items[self.kernels.len()..] {
                    writeln!(f, "- {}", item.display(g))?;
                }
            }
            if !self.shifts.is_empty() {
                writeln!(f, "## shifts:")?;
                for (t, to) in &self.shifts {
                    writeln!(f, "- {} => {:?}", g.terminals[t], to)?;
                }
            }
            if !self.gotos.is_empty() {
                writeln!(f, "## gotos:")?;
                for (n, to) in &self.gotos {
                    writeln!(f, "- {} => {:?}", g.nonterminals[n], to)?;
                }
            }
            if !self.reduces.is_empty() {
                writeln!(f, "## reduces:")?;
                for (reduce, lookaheads) in &self.reduces {
                    write!(f, "- {} [", g.production(*reduce).display(g))?;
                    for (i, t) in lookaheads.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write!(f, "{}", g.terminals[&t])?;
                    }
                    writeln!(f, "]")?;
                }
            }
            Ok(())
        })
    }
}

#[derive(Debug)]
pub struct LR0Automaton {
    pub states: Vec<LR0State>,
}

impl ops::Index<StateID> for LR0Automaton {
    type Output = LR0State;

    fn index(&self, id: StateID) -> &Self::Output {
        &self.states[id.index()]
    }
}

impl ops::IndexMut<StateID> for LR0Automaton {
    fn index_mut(&mut self, id: StateID) -> &mut Self::Output {
        &mut self.states[id.index()]
    }
}

impl LR0Automaton {
    pub fn state_ids(&self) -> impl Iterator<Item = StateID> {
        // The number of states is bounded by `StateID` allocation in `lr0`.
        (0..self.states.len() as u32).map(StateID)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateID, &LR0State)> + '_ {
        self.state_ids().zip(&self.states)
    }

    /// Follow the edges labelled by `symbols` starting at `from`.
    ///
    /// Returns `None` if some edge along the path does not exist.
    pub fn walk(&self, from: StateID, symbols: &[SymbolID]) -> Option<StateID> {
        symbols
            .iter()
            .try_fold(from, |current, symbol| self[current].next_state(*symbol))
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            for (i, (id, state)) in self.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "#### State {:?}", id)?;
                write!(f, "{}", state.display(g))?;
            }
            Ok(())
        })
    }
}

/// Calculate the LR(0) automaton based on the specified grammar.
pub fn lr0(g: &Grammar) -> LR0Automaton {
    let span = tracing::trace_span!("lr0");
    let _entered = span.enter();

    let mut states = Vec::<LR0State>::new();
    let mut pending_states = VecDeque::<(StateID, Vec<LR0Item>)>::new();
    pending_states.push_back((
        StateID::INITIAL,
        vec![LR0Item {
            production: ProductionID::ACCEPT,
            index: 0,
        }],
    ));
    let mut accessing_symbols = vec![None];
    let mut next_state_id = 1u32;

    // States reachable via each symbol, used to find an existing state with the same kernel.
    let mut by_accessing_symbol = Map::<SymbolID, Vec<(Vec<LR0Item>, StateID)>>::default();

    let mut new_kernels = Map::<SymbolID, Vec<LR0Item>>::default();
    while let Some((current, kernels)) = pending_states.pop_front() {
        let items = closure(g, &kernels);

        new_kernels.clear();
        let mut reduces = Map::default();
        for item in &items {
            match item.next_symbol(g) {
                Some(sym) => {
                    new_kernels.entry(sym).or_default().push(LR0Item {
                        index: item.index + 1,
                        ..*item
                    });
                }
                None => {
                    reduces.insert(item.production, TerminalSet::default());
                }
            }
        }

        let mut shifts = Map::default();
        let mut gotos = Map::default();
        for (sym, mut new_kernel) in new_kernels.drain(..) {
            new_kernel.sort();
            let candidates = by_accessing_symbol.entry(sym).or_default();
            let next = match candidates.iter().find(|(kernel, _)| *kernel == new_kernel) {
                Some((_, id)) => *id,
                None => {
                    let id = StateID(next_state_id);
                    next_state_id += 1;
                    tracing::trace!("new state {:?} via {}", id, g.symbol_name(sym));
                    candidates.push((new_kernel.clone(), id));
                    accessing_symbols.push(Some(sym));
                    pending_states.push_back((id, new_kernel));
                    id
                }
            };
            match sym {
                SymbolID::T(t) => {
                    shifts.insert(t, next);
                }
                SymbolID::N(n) => {
                    gotos.insert(n, next);
                }
            }
        }

        debug_assert_eq!(current.index(), states.len());
        states.push(LR0State {
            kernels,
            items: items.into_iter().collect(),
            accessing_symbol: accessing_symbols[current.index()],
            shifts,
            gotos,
            reduces,
        });
    }

    tracing::debug!("LR(0) automaton has {} states", states.len());

    LR0Automaton { states }
}

/// Expand the kernel items with the initial items of every nonterminal after a dot.
fn closure(g: &Grammar, kernels: &[LR0Item]) -> Set<LR0Item> {
    let mut items: Set<LR0Item> = kernels.iter().copied().collect();
    let mut i = 0;
    while i < items.len() {
        if let Some(SymbolID::N(n)) = items[i].next_symbol(g) {
            for &production in g.nonterminals[&n].productions() {
                items.insert(LR0Item {
                    production,
                    index: 0,
                });
            }
        }
        i += 1;
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SymbolID::*;

    fn expr_grammar() -> Grammar {
        // E -> E '+' T | T ; T -> '(' E ')' | NUM
        Grammar::define(|g| {
            let plus = g.literal('+', None)?;
            let lparen = g.literal('(', None)?;
            let rparen = g.literal(')', None)?;
            let num = g.terminal("NUM", None)?;
            let e = g.nonterminal("E")?;
            let t = g.nonterminal("T")?;
            g.rule(e, [N(e), T(plus), N(t)], None, None)?;
            g.rule(e, [N(t)], None, None)?;
            g.rule(t, [T(lparen), N(e), T(rparen)], None, None)?;
            g.rule(t, [T(num)], None, None)?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn initial_state_closure() {
        let g = expr_grammar();
        let lr0 = lr0(&g);
        let initial = &lr0[StateID::INITIAL];
        assert_eq!(
            initial.kernels,
            [LR0Item {
                production: ProductionID::ACCEPT,
                index: 0
            }]
        );
        // $accept -> . E eof, E -> . E + T, E -> . T, T -> . ( E ), T -> . NUM
        assert_eq!(initial.items.len(), 5);
        assert!(initial.items.iter().all(|item| item.index == 0));
        assert_eq!(initial.accessing_symbol, None);
    }

    #[test]
    fn number_of_states() {
        let g = expr_grammar();
        let lr0 = lr0(&g);
        assert_eq!(lr0.states.len(), 10);

        // Every state except the initial one is entered through one symbol only.
        for (id, state) in lr0.iter() {
            for (t, to) in &state.shifts {
                assert_eq!(lr0[*to].accessing_symbol, Some(T(*t)), "{:?}", id);
            }
            for (n, to) in &state.gotos {
                assert_eq!(lr0[*to].accessing_symbol, Some(N(*n)), "{:?}", id);
            }
        }
    }

    #[test]
    fn states_are_merged_by_kernel() {
        let g = expr_grammar();
        let lr0 = lr0(&g);
        let mut kernels: Vec<_> = lr0.states.iter().map(|s| s.kernels.clone()).collect();
        kernels.sort();
        kernels.dedup();
        assert_eq!(kernels.len(), lr0.states.len());
    }

    #[test]
    fn walk_follows_edges() {
        let g = expr_grammar();
        let lr0 = lr0(&g);
        let accept = g.production(ProductionID::ACCEPT);
        let last = lr0.walk(StateID::INITIAL, accept.right()).unwrap();
        assert_eq!(
            lr0[last].kernels,
            [LR0Item {
                production: ProductionID::ACCEPT,
                index: 2
            }]
        );
        assert!(lr0[last].reduces.contains_key(&ProductionID::ACCEPT));
        assert_eq!(
            lr0.walk(StateID::INITIAL, &[T(TerminalID::EOI)]),
            None
        );
    }

    #[test]
    fn recursive_nullable_grammar_terminates() {
        // S -> S S | ε
        let g = Grammar::define(|g| {
            let s = g.nonterminal("S")?;
            g.rule(s, [N(s), N(s)], None, None)?;
            g.rule(s, [], None, None)?;
            Ok(())
        })
        .unwrap();
        let lr0 = lr0(&g);
        assert!(!lr0.states.is_empty());
        assert!(lr0[StateID::INITIAL].reduces.len() == 1);
    }
}
