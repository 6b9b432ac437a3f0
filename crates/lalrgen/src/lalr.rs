//! LALR(1) look-ahead sets computation.
//!
//! The algorithm is based on DeRemer and Pennello's method\[1\]. Every goto
//! transition `(p,A)` of the LR(0) automaton receives the sets
//!
//! - `DR(p,A)`: the terminals shifted right after the transition,
//! - `Read(p,A)`: `DR` closed over the `reads` relation,
//! - `Follow(p,A)`: `Read` closed over the `includes` relation,
//!
//! and the look-ahead set of a reduction is the union of `Follow` over the
//! transitions it looks back to.
//!
//! \[1\]: DeRemer and Pennello, Efficient Computation of LALR(1) Look-Ahead Sets
//!       <https://dl.acm.org/doi/10.1145/69622.357187>

use crate::{
    digraph::digraph,
    grammar::{Grammar, NonterminalID, ProductionID, SymbolID, TerminalSet},
    lr0::{LR0Automaton, StateID},
    types::Map,
    util::display_fn,
};
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionID(u32);
impl fmt::Debug for TransitionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X#{:03}", self.0)
    }
}
impl TransitionID {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Goto {
    pub from: StateID,
    pub symbol: NonterminalID,
}

impl fmt::Debug for Goto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?},{:?})", self.from, self.symbol)
    }
}

/// A goto transition on a nonterminal symbol, together with its look-ahead data.
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: StateID,
    pub symbol: NonterminalID,
    pub to: StateID,
    pub direct_reads: TerminalSet,
    pub reads: TerminalSet,
    pub follows: TerminalSet,
    /// The transitions whose `Follow` set flows into this one.
    pub includes: Vec<TransitionID>,
}

#[derive(Debug)]
pub struct LALRData {
    pub transitions: Vec<Transition>,
    pub index: Map<Goto, TransitionID>,
}

impl LALRData {
    pub fn transition(&self, from: StateID, symbol: NonterminalID) -> Option<&Transition> {
        self.index
            .get(&Goto { from, symbol })
            .map(|id| &self.transitions[id.index()])
    }

    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        fn write_set(f: &mut fmt::Formatter<'_>, g: &Grammar, set: &TerminalSet) -> fmt::Result {
            f.write_str("[")?;
            for (i, t) in set.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", g.terminals[&t])?;
            }
            f.write_str("]")
        }

        display_fn(move |f| {
            for (i, t) in self.transitions.iter().enumerate() {
                writeln!(
                    f,
                    "{:?}: {:?} --({})--> {:?}",
                    TransitionID(i as u32),
                    t.from,
                    g.nonterminals[&t.symbol],
                    t.to
                )?;
                f.write_str("  DR = ")?;
                write_set(f, g, &t.direct_reads)?;
                f.write_str("\n  Read = ")?;
                write_set(f, g, &t.reads)?;
                f.write_str("\n  Follow = ")?;
                write_set(f, g, &t.follows)?;
                if !t.includes.is_empty() {
                    write!(f, "\n  includes = {:?}", t.includes)?;
                }
                writeln!(f)?;
            }
            Ok(())
        })
    }
}

/// Compute the look-ahead sets of every reduction in the provided LR(0) automaton.
///
/// The results are stored into `LR0State::reduces`.
pub fn lalr(g: &Grammar, lr0: &mut LR0Automaton) -> LALRData {
    let span = tracing::trace_span!("lalr");
    let _entered = span.enter();

    // Step 0: extract goto transitions and their direct-read sets.
    //   DR(p,A) := { t | p --(A)--> r --(t)--> }
    let mut transitions = vec![];
    let mut index = Map::default();
    for (from, state) in lr0.iter() {
        for (&symbol, &to) in &state.gotos {
            let id = TransitionID(transitions.len() as u32);
            index.insert(Goto { from, symbol }, id);
            transitions.push(Transition {
                from,
                symbol,
                to,
                direct_reads: lr0[to].shifts.keys().copied().collect(),
                reads: TerminalSet::default(),
                follows: TerminalSet::default(),
                includes: vec![],
            });
        }
    }
    tracing::debug!("{} goto transitions", transitions.len());

    // Step 1: Read(p,A) = DR(p,A) \cup \bigcup { Read(r,C) | (p,A) reads (r,C) }
    // where (p,A) reads (r,C) <==> p --(A)--> r --(C)--> && C =>* ε
    let reads = calc_reads(g, lr0, &transitions, &index);
    let read_sets = digraph(
        transitions.iter().map(|t| t.direct_reads.clone()).collect(),
        |x| reads[x].iter().copied(),
    );

    // Step 2: (q,Y) includes (p,A) <==> A -> βYγ, γ =>* ε, p --(β)--> q
    let includes = calc_includes(g, lr0, &transitions, &index);
    for (t, includes) in transitions.iter_mut().zip(includes) {
        t.includes = includes;
    }

    // Step 3: Follow(p,A) = Read(p,A) \cup \bigcup { Follow(q,B) | (p,A) includes (q,B) }
    let follow_sets = digraph(read_sets.clone(), |x| {
        transitions[x].includes.iter().map(|id| id.index())
    });

    for (t, (reads, follows)) in transitions
        .iter_mut()
        .zip(read_sets.into_iter().zip(follow_sets))
    {
        t.reads = reads;
        t.follows = follows;
    }

    // Step 4: LA(c, A -> ω) = \bigcup { Follow(q,A) | q --(ω)--> c }
    for t in &transitions {
        for &p in g.nonterminals[&t.symbol].productions() {
            let production = g.production(p);
            let Some(c) = lr0.walk(t.from, production.right()) else {
                continue;
            };
            if let Some(lookaheads) = lr0[c].reduces.get_mut(&p) {
                lookaheads.union_with(&t.follows);
            }
        }
    }

    // The augmented production accepts on every terminal.
    let all_terminals: TerminalSet = g.terminals.keys().copied().collect();
    for state in &mut lr0.states {
        if let Some(lookaheads) = state.reduces.get_mut(&ProductionID::ACCEPT) {
            *lookaheads = all_terminals.clone();
        }
    }

    LALRData { transitions, index }
}

fn calc_reads(
    g: &Grammar,
    lr0: &LR0Automaton,
    transitions: &[Transition],
    index: &Map<Goto, TransitionID>,
) -> Vec<Vec<usize>> {
    transitions
        .iter()
        .map(|t| {
            lr0[t.to]
                .gotos
                .keys()
                .filter(|&&c| g.is_nullable(c))
                .filter_map(|&c| {
                    index.get(&Goto {
                        from: t.to,
                        symbol: c,
                    })
                })
                .map(|id| id.index())
                .collect()
        })
        .collect()
}

fn calc_includes(
    g: &Grammar,
    lr0: &LR0Automaton,
    transitions: &[Transition],
    index: &Map<Goto, TransitionID>,
) -> Vec<Vec<TransitionID>> {
    let mut includes = vec![Vec::<TransitionID>::new(); transitions.len()];

    let mut path = vec![];
    for (x, t) in transitions.iter().enumerate() {
        let x = TransitionID(x as u32);
        for &p in g.nonterminals[&t.symbol].productions() {
            let right = g.production(p).right();

            // path[i] is the state reached from p by reading right[..i].
            path.clear();
            path.push(t.from);
            for symbol in right {
                let Some(&current) = path.last() else { break };
                match lr0[current].next_state(*symbol) {
                    Some(next) => path.push(next),
                    None => break,
                }
            }

            for (i, symbol) in right.iter().enumerate().rev() {
                if let SymbolID::N(y) = symbol {
                    // An incomplete path means this production is not reachable from `t`.
                    if let Some(&q) = path.get(i) {
                        if let Some(&qy) = index.get(&Goto { from: q, symbol: *y }) {
                            let slot = &mut includes[qy.index()];
                            if !slot.contains(&x) {
                                slot.push(x);
                            }
                        }
                    }
                }
                if !g.is_nullable_symbol(*symbol) {
                    break;
                }
            }
        }
    }

    includes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        grammar::{SymbolID::*, TerminalID},
        lr0::lr0,
    };

    fn terminal(g: &Grammar, name: &str) -> TerminalID {
        g.terminals
            .values()
            .find(|t| t.to_string() == name)
            .map(|t| t.id())
            .unwrap()
    }

    fn lookaheads(g: &Grammar, set: &TerminalSet) -> Vec<String> {
        set.iter().map(|t| g.terminals[&t].to_string()).collect()
    }

    #[test]
    fn lalr_but_not_slr() {
        // S -> L '=' R | R ; L -> '*' R | ID ; R -> L
        let g = Grammar::define(|g| {
            let eq = g.literal('=', None)?;
            let star = g.literal('*', None)?;
            let id = g.terminal("ID", None)?;
            let s = g.nonterminal("S")?;
            let l = g.nonterminal("L")?;
            let r = g.nonterminal("R")?;
            g.rule(s, [N(l), T(eq), N(r)], None, None)?;
            g.rule(s, [N(r)], None, None)?;
            g.rule(l, [T(star), N(r)], None, None)?;
            g.rule(l, [T(id)], None, None)?;
            g.rule(r, [N(l)], None, None)?;
            Ok(())
        })
        .unwrap();
        let mut lr0 = lr0(&g);
        let _lalr = lalr(&g, &mut lr0);

        let l = g.nonterminals.values().find(|n| n.name() == "L").unwrap().id();
        let r = g.nonterminals.values().find(|n| n.name() == "R").unwrap().id();
        let r_to_l = g.nonterminals[&r].productions()[0];

        let after_l = lr0[StateID::INITIAL].gotos[&l];
        assert!(lr0[after_l].shifts.contains_key(&terminal(&g, "'='")));
        // SLR(1) would add '=' here and conflict.
        assert_eq!(lookaheads(&g, &lr0[after_l].reduces[&r_to_l]), ["eof"]);
    }

    #[test]
    fn reads_through_nullable_symbols() {
        // S -> A B 'c' ; A -> 'a' ; B -> 'b' | ε
        let g = Grammar::define(|g| {
            let a_ = g.literal('a', None)?;
            let b_ = g.literal('b', None)?;
            let c_ = g.literal('c', None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            let b = g.nonterminal("B")?;
            g.rule(s, [N(a), N(b), T(c_)], None, None)?;
            g.rule(a, [T(a_)], None, None)?;
            g.rule(b, [T(b_)], None, None)?;
            g.rule(b, [], None, None)?;
            Ok(())
        })
        .unwrap();
        let mut lr0 = lr0(&g);
        let lalr = lalr(&g, &mut lr0);

        let a = g.nonterminals.values().find(|n| n.name() == "A").unwrap().id();
        let a_to_a = g.nonterminals[&a].productions()[0];
        let after_a = lr0[StateID::INITIAL].shifts[&terminal(&g, "'a'")];
        assert_eq!(lookaheads(&g, &lr0[after_a].reduces[&a_to_a]), ["'b'", "'c'"]);

        let t = lalr.transition(StateID::INITIAL, a).unwrap();
        assert_eq!(lookaheads(&g, &t.direct_reads), ["'b'"]);
        assert_eq!(lookaheads(&g, &t.reads), ["'b'", "'c'"]);
    }

    #[test]
    fn includes_through_nullable_suffix() {
        // S -> A B 'c' | A B ; A -> 'a' ; B -> 'b' | ε
        let g = Grammar::define(|g| {
            let a_ = g.literal('a', None)?;
            let b_ = g.literal('b', None)?;
            let c_ = g.literal('c', None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            let b = g.nonterminal("B")?;
            g.rule(s, [N(a), N(b), T(c_)], None, None)?;
            g.rule(s, [N(a), N(b)], None, None)?;
            g.rule(a, [T(a_)], None, None)?;
            g.rule(b, [T(b_)], None, None)?;
            g.rule(b, [], None, None)?;
            Ok(())
        })
        .unwrap();
        let mut lr0 = lr0(&g);
        let lalr = lalr(&g, &mut lr0);

        let s = g.start_symbol;
        let a = g.nonterminals.values().find(|n| n.name() == "A").unwrap().id();
        let a_to_a = g.nonterminals[&a].productions()[0];
        let after_a = lr0[StateID::INITIAL].shifts[&terminal(&g, "'a'")];
        assert_eq!(
            lookaheads(&g, &lr0[after_a].reduces[&a_to_a]),
            ["eof", "'b'", "'c'"]
        );

        // B is nullable, so `S -> A B` puts Follow(0,S) into Follow(0,A).
        let a0 = lalr.transition(StateID::INITIAL, a).unwrap();
        assert_eq!(a0.includes.len(), 1);
        let included = &lalr.transitions[a0.includes[0].index()];
        assert_eq!((included.from, included.symbol), (StateID::INITIAL, s));
        assert!(a0.follows.contains(TerminalID::EOI));
    }

    #[test]
    fn follows_through_includes() {
        // E -> E '+' T | T ; T -> '(' E ')' | NUM
        let g = Grammar::define(|g| {
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
        .unwrap();
        let mut lr0 = lr0(&g);
        let lalr = lalr(&g, &mut lr0);

        let t = g.nonterminals.values().find(|n| n.name() == "T").unwrap().id();
        let t_to_num = g.nonterminals[&t].productions()[1];
        let after_num = lr0[StateID::INITIAL].shifts[&terminal(&g, "NUM")];
        assert_eq!(
            lookaheads(&g, &lr0[after_num].reduces[&t_to_num]),
            ["eof", "'+'", "')'"]
        );

        // (0,T) includes (0,E), whose Follow contains eof.
        let e = g.start_symbol;
        let t0 = lalr.transition(StateID::INITIAL, t).unwrap();
        assert_eq!(t0.includes.len(), 1);
        assert_eq!(lalr.transitions[t0.includes[0].index()].symbol, e);
        assert!(t0.direct_reads.is_empty());
        assert!(t0.follows.contains(TerminalID::EOI));
    }

    #[test]
    fn accept_item_accepts_everything() {
        let g = Grammar::define(|g| {
            let x = g.terminal("X", None)?;
            let s = g.nonterminal("S")?;
            g.rule(s, [T(x)], None, None)?;
            Ok(())
        })
        .unwrap();
        let mut lr0 = lr0(&g);
        let _ = lalr(&g, &mut lr0);
        let accepting: Vec<_> = lr0
            .states
            .iter()
            .filter_map(|s| s.reduces.get(&ProductionID::ACCEPT))
            .collect();
        assert_eq!(accepting.len(), 1);
        assert_eq!(accepting[0].len(), g.terminals.len());
    }
}
