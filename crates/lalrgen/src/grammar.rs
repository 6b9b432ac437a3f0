//! Grammar types.

use crate::{
    syntax::{self, ast as s, SyntaxError},
    types::{Map, Set},
    util::{display_fn, escape_char},
};
use std::{cmp, fmt, fs, hash::Hash, io, marker::PhantomData, path::Path};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TerminalID {
    raw: u16,
}
impl TerminalID {
    /// Reserved symbol used as a terminal symbol that means the end of input.
    pub const EOI: Self = Self::new(0);

    /// Reserved symbol used as an error token.
    pub const ERROR: Self = Self::new(1);

    const OFFSET: u16 = 2;

    #[inline]
    const fn new(raw: u16) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.raw
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TerminalKind {
    /// A single-character token written as `'c'`, identified by its character code.
    Literal(char),
    /// A named token.
    Symbolic,
}

#[derive(Debug)]
pub struct Terminal {
    id: TerminalID,
    name: String,
    kind: TerminalKind,
    precedence: Option<Precedence>,
    code: u32,
}
impl Terminal {
    pub fn id(&self) -> TerminalID {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TerminalKind {
        self.kind
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TerminalKind::Literal(..))
    }

    pub fn precedence(&self) -> Option<Precedence> {
        self.precedence
    }

    /// The token code that a scanner reports for this terminal.
    ///
    /// Literal tokens use their character code. Symbolic tokens are numbered
    /// sequentially above the largest literal code.
    pub fn code(&self) -> u32 {
        self.code
    }
}
impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TerminalKind::Literal(ch) => f.write_str(&escape_char(ch)),
            TerminalKind::Symbolic => f.write_str(&self.name),
        }
    }
}

/// The set of terminal symbols, indexed by `TerminalID`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminalSet {
    inner: bit_set::BitSet,
}

impl TerminalSet {
    pub fn contains(&self, id: TerminalID) -> bool {
        self.inner.contains(id.into_raw().into())
    }
    pub fn insert(&mut self, id: TerminalID) -> bool {
        self.inner.insert(id.into_raw().into())
    }
    pub fn union_with(&mut self, other: &Self) {
        self.inner.union_with(&other.inner)
    }
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
    pub fn len(&self) -> usize {
        self.inner.len()
    }
    /// Iterate over the members in ascending `TerminalID` order.
    pub fn iter(&self) -> impl Iterator<Item = TerminalID> + '_ {
        // The members are inserted from `TerminalID`s, so every index fits in u16.
        self.inner.iter().map(|raw| TerminalID::new(raw as u16))
    }
}

impl FromIterator<TerminalID> for TerminalSet {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = TerminalID>,
    {
        Self {
            inner: iter.into_iter().map(|t| t.into_raw().into()).collect(),
        }
    }
}

impl crate::digraph::Set for TerminalSet {
    fn union_with(&mut self, other: &Self) {
        self.union_with(other)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NonterminalID {
    raw: u16,
}
impl NonterminalID {
    /// The synthetic symbol `$accept` on the left of the augmented production.
    pub const START: Self = Self::new(0);
    const OFFSET: u16 = 1;

    #[inline]
    const fn new(raw: u16) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.raw
    }
}

#[derive(Debug)]
pub struct Nonterminal {
    id: NonterminalID,
    name: String,
    tag: Option<String>,
    productions: Vec<ProductionID>,
}
impl Nonterminal {
    pub fn id(&self) -> NonterminalID {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The semantic-value tag declared with `%type <tag>`.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The productions whose left-hand side is this symbol, in declaration order.
    pub fn productions(&self) -> &[ProductionID] {
        &self.productions[..]
    }
}
impl fmt::Display for Nonterminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolID {
    T(TerminalID),
    N(NonterminalID),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ProductionID {
    raw: u16,
}

impl ProductionID {
    /// The augmented production `$accept -> S eof`.
    pub const ACCEPT: Self = Self::new(0);

    const OFFSET: u16 = 1;

    #[inline]
    const fn new(raw: u16) -> Self {
        Self { raw }
    }

    #[inline]
    pub const fn into_raw(self) -> u16 {
        self.raw
    }
}

/// The semantic action attached to a production, kept as opaque source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticAction {
    pub code: String,
    /// The line in the grammar file where the action starts.
    pub line: usize,
}

/// The type that represents a production rule in grammar.
#[derive(Debug)]
pub struct Production {
    id: ProductionID,
    left: NonterminalID,
    right: Vec<SymbolID>,
    precedence: Option<Precedence>,
    action: Option<SemanticAction>,
}
impl Production {
    pub fn id(&self) -> ProductionID {
        self.id
    }

    /// Return the left-hand side of this production.
    pub fn left(&self) -> NonterminalID {
        self.left
    }

    /// Return the right-hand side of this production.
    pub fn right(&self) -> &[SymbolID] {
        &self.right[..]
    }

    pub fn action(&self) -> Option<&SemanticAction> {
        self.action.as_ref()
    }

    /// The precedence used when this production takes part in a shift/reduce conflict.
    ///
    /// An explicit `%prec` wins, otherwise the precedence of the rightmost terminal.
    pub fn precedence(&self, g: &Grammar) -> Option<Precedence> {
        match self.precedence {
            Some(prec) => Some(prec),
            None => {
                for symbol in self.right.iter().rev() {
                    if let SymbolID::T(t) = symbol {
                        return g.terminals[t].precedence();
                    }
                }
                None
            }
        }
    }

    // `"LHS : R1 R2 R3"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} :", g.nonterminals[&self.left])?;
            if self.right.is_empty() {
                return f.write_str(" /* empty */");
            }
            for symbol in &self.right {
                write!(f, " {}", g.symbol_name(*symbol))?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Precedence {
    pub priority: u16,
    pub assoc: Assoc,
}

impl Precedence {
    pub const fn new(priority: u16, assoc: Assoc) -> Self {
        Self { priority, assoc }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
}

impl fmt::Display for Assoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Nonassoc => write!(f, "nonassoc"),
        }
    }
}

/// Target-specific values carried through to the code generator.
#[derive(Debug, Default, Clone)]
pub struct Metadata {
    /// Code copied verbatim before the generated tables.
    pub prelude: String,
    /// Code copied verbatim after the generated tables.
    pub epilog: String,
    /// The type of semantic values (`%valuetype`).
    pub value_type: Option<String>,
    /// The type of source positions (`%locationtype`).
    pub location_type: Option<String>,
}

/// The grammar definition used to derive the parser tables.
#[derive(Debug)]
#[non_exhaustive]
pub struct Grammar {
    pub terminals: Map<TerminalID, Terminal>,
    pub nonterminals: Map<NonterminalID, Nonterminal>,
    pub productions: Map<ProductionID, Production>,
    pub start_symbol: NonterminalID,
    pub metadata: Metadata,
    nullables: Set<NonterminalID>,
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## terminals:")?;
        for terminal in self.terminals.values() {
            write!(f, "{} = {}", terminal, terminal.code())?;
            if let Some(prec) = terminal.precedence() {
                write!(f, " (priority={}, assoc={})", prec.priority, prec.assoc)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## nonterminals:")?;
        for nonterminal in self.nonterminals.values() {
            write!(f, "{}", nonterminal)?;
            if let Some(tag) = nonterminal.tag() {
                write!(f, " <{}>", tag)?;
            }
            if nonterminal.id() == self.start_symbol {
                write!(f, " (start)")?;
            }
            if self.is_nullable(nonterminal.id()) {
                write!(f, " (nullable)")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## productions:")?;
        for production in self.productions.values() {
            write!(
                f,
                "{}: {}",
                production.id().into_raw(),
                production.display(self)
            )?;
            if let Some(prec) = &production.precedence {
                write!(f, " (priority={}, assoc={})", prec.priority, prec.assoc)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

impl Grammar {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Grammar, GrammarDefError> {
        let source = fs::read_to_string(path).map_err(GrammarDefError::IO)?;
        Self::from_str(&source)
    }

    pub fn from_str(source: &str) -> Result<Grammar, GrammarDefError> {
        let grammar = syntax::parse(source)?;
        Grammar::define(|g| define_grammar_from_syntax(g, grammar))
    }

    /// Define a grammar using the specified function.
    pub fn define<F>(f: F) -> Result<Self, GrammarDefError>
    where
        F: FnOnce(&mut GrammarDef) -> Result<(), GrammarDefError>,
    {
        let mut def = GrammarDef {
            terminals: Map::default(),
            nonterminals: Map::default(),
            productions: Map::default(),
            start: None,
            metadata: Metadata::default(),
            next_terminal_id: TerminalID::OFFSET,
            next_nonterminal_id: NonterminalID::OFFSET,
            next_production_id: ProductionID::OFFSET,
            next_priority: 0,
            _marker: PhantomData,
        };

        for (id, name) in [(TerminalID::EOI, "eof"), (TerminalID::ERROR, "error")] {
            def.terminals.insert(
                id,
                Terminal {
                    id,
                    name: name.into(),
                    kind: TerminalKind::Symbolic,
                    precedence: None,
                    code: 0,
                },
            );
        }

        def.nonterminals.insert(
            NonterminalID::START,
            Nonterminal {
                id: NonterminalID::START,
                name: "$accept".into(),
                tag: None,
                productions: vec![],
            },
        );

        f(&mut def)?;

        def.end()
    }

    pub fn production(&self, id: ProductionID) -> &Production {
        &self.productions[&id]
    }

    /// Whether the nonterminal derives the empty string.
    pub fn is_nullable(&self, id: NonterminalID) -> bool {
        self.nullables.contains(&id)
    }

    /// Whether the symbol derives the empty string. Terminals never do.
    pub fn is_nullable_symbol(&self, symbol: SymbolID) -> bool {
        match symbol {
            SymbolID::T(..) => false,
            SymbolID::N(n) => self.is_nullable(n),
        }
    }

    pub fn symbol_name(&self, symbol: SymbolID) -> impl fmt::Display + '_ {
        display_fn(move |f| match symbol {
            SymbolID::T(t) => write!(f, "{}", self.terminals[&t]),
            SymbolID::N(n) => write!(f, "{}", self.nonterminals[&n]),
        })
    }

    /// Look up the terminal that a scanner reports with the given token code.
    pub fn terminal_by_code(&self, code: u32) -> Option<TerminalID> {
        self.terminals
            .values()
            .find(|t| t.code() == code)
            .map(|t| t.id())
    }

    /// Nonterminals that have no production at all.
    ///
    /// Such symbols never contribute closure items; the automaton is still
    /// well defined, but the grammar is most likely incomplete.
    pub fn unproductive_nonterminals(&self) -> impl Iterator<Item = &Nonterminal> + '_ {
        self.nonterminals
            .values()
            .filter(|n| n.id() != NonterminalID::START && n.productions().is_empty())
    }
}

fn define_grammar_from_syntax(
    g: &mut GrammarDef<'_>,
    grammar: s::Grammar,
) -> Result<(), GrammarDefError> {
    let mut terminals = Map::<String, TerminalID>::default();
    let mut literals = Map::<char, TerminalID>::default();
    let mut nonterminals = Map::<String, NonterminalID>::default();
    terminals.insert("error".into(), TerminalID::ERROR);

    macro_rules! bail {
        ($line:expr, $($arg:tt)*) => {
            return Err(GrammarDefError::Other {
                msg: format!("line {}: {}", $line, format_args!($($arg)*)),
            })
        };
    }

    // Phase 1: declarations. Every symbol named here is a terminal, except for `%type`.
    let mut start = None;
    for decl in &grammar.decls {
        match &decl.kind {
            s::DeclKind::Token { symbols, .. } => {
                for symbol in symbols {
                    match symbol {
                        s::Symbol::Ident(name) => {
                            if terminals.contains_key(name) || nonterminals.contains_key(name) {
                                bail!(decl.line, "the symbol `{}' is already declared", name);
                            }
                            let id = g.terminal(name, None)?;
                            terminals.insert(name.clone(), id);
                        }
                        s::Symbol::Literal(ch) => {
                            if !literals.contains_key(ch) {
                                let id = g.literal(*ch, None)?;
                                literals.insert(*ch, id);
                            }
                        }
                    }
                }
            }

            s::DeclKind::Precedence { assoc, symbols, .. } => {
                let prec = g.precedence_level(*assoc);
                for symbol in symbols {
                    let id = match symbol {
                        s::Symbol::Ident(name) => match terminals.get(name) {
                            Some(id) => *id,
                            None => {
                                if nonterminals.contains_key(name) {
                                    bail!(decl.line, "`{}' is not a terminal symbol", name);
                                }
                                let id = g.terminal(name, None)?;
                                terminals.insert(name.clone(), id);
                                id
                            }
                        },
                        s::Symbol::Literal(ch) => match literals.get(ch) {
                            Some(id) => *id,
                            None => {
                                let id = g.literal(*ch, None)?;
                                literals.insert(*ch, id);
                                id
                            }
                        },
                    };
                    g.set_precedence(id, prec)
                        .map_err(|err| GrammarDefError::Other {
                            msg: format!("line {}: {}", decl.line, err),
                        })?;
                }
            }

            s::DeclKind::Type { tag, names } => {
                for name in names {
                    if terminals.contains_key(name) {
                        bail!(decl.line, "`%type' does not apply to the terminal `{}'", name);
                    }
                    let id = match nonterminals.get(name) {
                        Some(id) => *id,
                        None => {
                            let id = g.nonterminal(name)?;
                            nonterminals.insert(name.clone(), id);
                            id
                        }
                    };
                    g.nonterminal_tag(id, tag);
                }
            }

            s::DeclKind::Start(name) => {
                if start.is_some() {
                    bail!(decl.line, "duplicate `%start' declaration");
                }
                start = Some((name.clone(), decl.line));
            }

            s::DeclKind::ValueType(ty) => {
                g.metadata_mut().value_type = Some(ty.clone());
            }

            s::DeclKind::LocationType(ty) => {
                g.metadata_mut().location_type = Some(ty.clone());
            }
        }
    }

    // Phase 2: rules. Identifiers not declared as terminals are nonterminals.
    for rule in &grammar.rules {
        if terminals.contains_key(&rule.left) {
            bail!(
                rule.line,
                "the terminal `{}' appears on the left-hand side of a rule",
                rule.left
            );
        }
        let left = match nonterminals.get(&rule.left) {
            Some(id) => *id,
            None => {
                let id = g.nonterminal(&rule.left)?;
                nonterminals.insert(rule.left.clone(), id);
                id
            }
        };

        for alt in &rule.alternatives {
            let mut right = Vec::with_capacity(alt.symbols.len());
            for symbol in &alt.symbols {
                let symbol = match symbol {
                    s::Symbol::Literal(ch) => match literals.get(ch) {
                        Some(id) => SymbolID::T(*id),
                        None => {
                            let id = g.literal(*ch, None)?;
                            literals.insert(*ch, id);
                            SymbolID::T(id)
                        }
                    },
                    s::Symbol::Ident(name) if name == "eof" => {
                        bail!(alt.line, "the end-of-input symbol cannot be used in a rule");
                    }
                    s::Symbol::Ident(name) => {
                        if let Some(t) = terminals.get(name) {
                            SymbolID::T(*t)
                        } else if let Some(n) = nonterminals.get(name) {
                            SymbolID::N(*n)
                        } else {
                            let id = g.nonterminal(name)?;
                            nonterminals.insert(name.clone(), id);
                            SymbolID::N(id)
                        }
                    }
                };
                right.push(symbol);
            }

            let prec = match &alt.prec {
                Some(symbol) => {
                    let terminal = match symbol {
                        s::Symbol::Ident(name) => terminals.get(name).copied(),
                        s::Symbol::Literal(ch) => literals.get(ch).copied(),
                    };
                    let Some(terminal) = terminal else {
                        bail!(alt.line, "unknown terminal `{}' in %prec", symbol);
                    };
                    match g.terminals[&terminal].precedence() {
                        Some(prec) => Some(prec),
                        None => bail!(
                            alt.line,
                            "the terminal `{}' used in %prec has no precedence",
                            symbol
                        ),
                    }
                }
                None => None,
            };

            let action = alt.action.as_ref().map(|action| SemanticAction {
                code: action.code.clone(),
                line: action.line,
            });

            g.rule(left, right, prec, action)
                .map_err(|err| GrammarDefError::Other {
                    msg: format!("line {}: {}", alt.line, err),
                })?;
        }
    }

    match start {
        Some((name, line)) => match nonterminals.get(&name) {
            Some(id) => g.start_symbol(*id)?,
            None => bail!(line, "unknown start symbol: `{}'", name),
        },
        // Without %start, the left-hand side of the first rule.
        None => {
            if let Some(id) = grammar.rules.first().and_then(|r| nonterminals.get(&r.left)) {
                g.start_symbol(*id)?;
            }
        }
    }

    let metadata = g.metadata_mut();
    metadata.prelude = grammar.prelude;
    metadata.epilog = grammar.epilog.unwrap_or_default();

    Ok(())
}

/// The contextural values for building a `Grammar`.
///
/// All symbol and production numbering is handed out from here, so that
/// independent grammars never share counters.
#[derive(Debug)]
pub struct GrammarDef<'def> {
    terminals: Map<TerminalID, Terminal>,
    nonterminals: Map<NonterminalID, Nonterminal>,
    productions: Map<ProductionID, Production>,
    start: Option<NonterminalID>,
    metadata: Metadata,
    next_terminal_id: u16,
    next_nonterminal_id: u16,
    next_production_id: u16,
    next_priority: u16,
    _marker: PhantomData<&'def mut ()>,
}

impl<'def> GrammarDef<'def> {
    /// Declare a named terminal symbol used in this grammar.
    pub fn terminal(
        &mut self,
        name: &str,
        precedence: Option<Precedence>,
    ) -> Result<TerminalID, GrammarDefError> {
        if !verify_ident(name) || matches!(name, "error" | "eof") {
            return Err(GrammarDefError::Other {
                msg: format!("incorrect token name: `{}'", name),
            });
        }

        for terminal in self.terminals.values() {
            if !terminal.is_literal() && terminal.name() == name {
                return Err(GrammarDefError::Other {
                    msg: format!("The terminal `{}' has already been declared", name),
                });
            }
        }

        self.add_terminal(name.to_owned(), TerminalKind::Symbolic, precedence)
    }

    /// Declare a single-character terminal symbol used in this grammar.
    pub fn literal(
        &mut self,
        ch: char,
        precedence: Option<Precedence>,
    ) -> Result<TerminalID, GrammarDefError> {
        for terminal in self.terminals.values() {
            if terminal.kind() == TerminalKind::Literal(ch) {
                return Err(GrammarDefError::Other {
                    msg: format!(
                        "The literal {} has already been declared",
                        escape_char(ch)
                    ),
                });
            }
        }

        self.add_terminal(escape_char(ch), TerminalKind::Literal(ch), precedence)
    }

    fn add_terminal(
        &mut self,
        name: String,
        kind: TerminalKind,
        precedence: Option<Precedence>,
    ) -> Result<TerminalID, GrammarDefError> {
        if self.next_terminal_id == u16::MAX {
            return Err("too many terminal symbols".into());
        }
        let id = TerminalID::new(self.next_terminal_id);
        self.next_terminal_id += 1;

        self.terminals.insert(
            id,
            Terminal {
                id,
                name,
                kind,
                precedence,
                code: 0,
            },
        );

        Ok(id)
    }

    /// Allocate the next precedence level.
    ///
    /// Levels allocated later bind tighter than the earlier ones.
    pub fn precedence_level(&mut self, assoc: Assoc) -> Precedence {
        let prec = Precedence::new(self.next_priority, assoc);
        self.next_priority += 1;
        prec
    }

    /// Attach a precedence to an already declared terminal.
    pub fn set_precedence(
        &mut self,
        id: TerminalID,
        precedence: Precedence,
    ) -> Result<(), GrammarDefError> {
        let terminal = self
            .terminals
            .get_mut(&id)
            .ok_or_else(|| GrammarDefError::from("unknown terminal symbol"))?;
        if terminal.precedence.is_some() {
            return Err(GrammarDefError::Other {
                msg: format!("The terminal `{}' has multiple precedences", terminal),
            });
        }
        terminal.precedence = Some(precedence);
        Ok(())
    }

    /// Declare a nonterminal symbol used in this grammar.
    pub fn nonterminal(&mut self, name: &str) -> Result<NonterminalID, GrammarDefError> {
        if name.is_empty() || name.starts_with('$') {
            return Err(GrammarDefError::Other {
                msg: format!("incorrect symbol name: `{}'", name),
            });
        }

        for nonterminal in self.nonterminals.values() {
            if nonterminal.name() == name {
                return Err(GrammarDefError::Other {
                    msg: format!("The nonterminal `{}' has already been declared", name),
                });
            }
        }

        if self.next_nonterminal_id == u16::MAX {
            return Err("too many nonterminal symbols".into());
        }
        let id = NonterminalID::new(self.next_nonterminal_id);
        self.next_nonterminal_id += 1;

        self.nonterminals.insert(
            id,
            Nonterminal {
                id,
                name: name.to_owned(),
                tag: None,
                productions: vec![],
            },
        );

        Ok(id)
    }

    /// Set the semantic-value tag of a nonterminal symbol.
    pub fn nonterminal_tag(&mut self, id: NonterminalID, tag: &str) {
        if let Some(nonterminal) = self.nonterminals.get_mut(&id) {
            nonterminal.tag = Some(tag.to_owned());
        }
    }

    /// Specify a production rule into this grammer.
    pub fn rule<I>(
        &mut self,
        left: NonterminalID,
        right: I,
        precedence: Option<Precedence>,
        action: Option<SemanticAction>,
    ) -> Result<ProductionID, GrammarDefError>
    where
        I: IntoIterator<Item = SymbolID>,
    {
        if left == NonterminalID::START || !self.nonterminals.contains_key(&left) {
            return Err("incorrect left-hand side".into());
        }

        let right_: Vec<SymbolID> = right.into_iter().collect();
        if right_.contains(&SymbolID::T(TerminalID::EOI)) {
            return Err("the end-of-input symbol cannot be used in a rule".into());
        }
        for symbol in &right_ {
            let known = match symbol {
                SymbolID::T(t) => self.terminals.contains_key(t),
                SymbolID::N(n) => *n != NonterminalID::START && self.nonterminals.contains_key(n),
            };
            if !known {
                return Err("unknown symbol in the right-hand side".into());
            }
        }

        for production in self.productions.values() {
            if production.left == left && production.right == right_ {
                return Err(GrammarDefError::Other {
                    msg: "Duplicate production rule detected".into(),
                });
            }
        }

        if self.next_production_id == u16::MAX {
            return Err("too many production rules".into());
        }
        let id = ProductionID::new(self.next_production_id);
        self.next_production_id += 1;
        self.productions.insert(
            id,
            Production {
                id,
                left,
                right: right_,
                precedence,
                action,
            },
        );

        Ok(id)
    }

    /// Specify the start symbol for this grammar.
    pub fn start_symbol(&mut self, symbol: NonterminalID) -> Result<(), GrammarDefError> {
        if symbol == NonterminalID::START || !self.nonterminals.contains_key(&symbol) {
            return Err("incorrect start symbol".into());
        }
        self.start.replace(symbol);
        Ok(())
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    fn end(mut self) -> Result<Grammar, GrammarDefError> {
        // Grammars built without a start symbol fall back to the first declared nonterminal.
        let start = match self.start.take() {
            Some(start) => start,
            None => self
                .nonterminals
                .keys()
                .find(|id| **id != NonterminalID::START)
                .copied()
                .ok_or_else(|| GrammarDefError::Other {
                    msg: "empty nonterminal symbols".into(),
                })?,
        };

        let mut productions = Map::default();
        productions.insert(
            ProductionID::ACCEPT,
            Production {
                id: ProductionID::ACCEPT,
                left: NonterminalID::START,
                right: vec![SymbolID::N(start), SymbolID::T(TerminalID::EOI)],
                precedence: None,
                action: None,
            },
        );
        productions.extend(self.productions.drain(..));

        for production in productions.values() {
            self.nonterminals[&production.left]
                .productions
                .push(production.id);
        }

        let nullables = nullables(&productions);
        assign_codes(&mut self.terminals);

        Ok(Grammar {
            terminals: self.terminals,
            nonterminals: self.nonterminals,
            productions,
            start_symbol: start,
            metadata: self.metadata,
            nullables,
        })
    }
}

/// Compute the nullable nonterminals as the least fixed point of
/// "some production has an all-nullable right-hand side".
fn nullables(productions: &Map<ProductionID, Production>) -> Set<NonterminalID> {
    let mut nullables = Set::default();
    loop {
        let mut changed = false;
        for p in productions.values() {
            if p.right
                .iter()
                .all(|s| matches!(s, SymbolID::N(n) if nullables.contains(n)))
            {
                changed |= nullables.insert(p.left);
            }
        }
        if !changed {
            break;
        }
    }
    nullables
}

fn assign_codes(terminals: &mut Map<TerminalID, Terminal>) {
    let largest_literal = terminals
        .values()
        .filter_map(|t| match t.kind {
            TerminalKind::Literal(ch) => Some(ch as u32),
            TerminalKind::Symbolic => None,
        })
        .max();
    // Symbolic codes never overlap a plain character.
    let mut next_code = largest_literal.map_or(256, |code| cmp::max(256, code + 1));

    // `error` and `eof` take the first two symbolic codes.
    for id in [TerminalID::ERROR, TerminalID::EOI] {
        terminals[&id].code = next_code;
        next_code += 1;
    }
    for terminal in terminals.values_mut() {
        match terminal.kind {
            TerminalKind::Literal(ch) => terminal.code = ch as u32,
            TerminalKind::Symbolic => {
                if terminal.id != TerminalID::EOI && terminal.id != TerminalID::ERROR {
                    terminal.code = next_code;
                    next_code += 1;
                }
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarDefError {
    #[error("IO error: {}", _0)]
    IO(io::Error),

    #[error("Syntax error: {}", _0)]
    Syntax(
        #[from]
        #[source]
        SyntaxError,
    ),

    #[error("Other error: {}", msg)]
    Other { msg: String },
}
impl From<&str> for GrammarDefError {
    fn from(msg: &str) -> Self {
        Self::Other { msg: msg.into() }
    }
}
impl From<String> for GrammarDefError {
    fn from(msg: String) -> Self {
        Self::Other { msg }
    }
}

// Symbolic terminal names become constants in generated code.
fn verify_ident(mut s: &str) -> bool {
    if s.is_empty() {
        // The identifier must not be empty.
        return false;
    }

    if s.starts_with("r#") {
        s = &s[2..];
        if matches!(s, "crate" | "self" | "super" | "Self") {
            // unexpected raw identifier
            return false;
        }
    } else if is_strict_keyword(s) || is_reserved(s) {
        // Reserved keyword specified.
        return false;
    }

    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !is_ident_start(first) {
        // The identifier must be started with XID-Start.
        return false;
    }
    if chars.any(|ch| !is_ident_continue(ch)) {
        // The identifier must be continued with XID-Continue.
        return false;
    }

    true
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || unicode_ident::is_xid_start(ch)
}

fn is_ident_continue(ch: char) -> bool {
    unicode_ident::is_xid_continue(ch)
}

fn is_strict_keyword(s: &str) -> bool {
    matches!(
        s,
        "as" | "break" | "const" | "continue" | "crate" | "else" | "enum" | "extern"
        | "false" | "fn" | "for" | "if" | "impl" | "in" | "let" | "loop" | "match" | "mod"
        | "move" | "mut" | "pub" | "ref" | "return" | "self" | "Self" | "static" | "struct"
        | "super" | "trait" | "true" | "type" | "unsafe" | "use" | "where" | "while"
        // since Rust 2018
        | "async" | "await" | "dyn"
    )
}

fn is_reserved(s: &str) -> bool {
    matches!(
        s,
        "abstract" | "become" | "box" | "do" | "final" | "macro" | "override" | "priv"
        | "typeof" | "unsized" | "virtual" | "yield"
        // since Rust 2018
        | "try"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use SymbolID::*;

    #[test]
    fn mutually_recursive_nullables() {
        // A -> B ; B -> ε | A
        let grammar = Grammar::define(|g| {
            let a = g.nonterminal("A")?;
            let b = g.nonterminal("B")?;
            g.rule(a, [N(b)], None, None)?;
            g.rule(b, [], None, None)?;
            g.rule(b, [N(a)], None, None)?;
            Ok(())
        })
        .unwrap();
        for n in grammar.nonterminals.values().skip(1) {
            assert!(grammar.is_nullable(n.id()), "{} should be nullable", n);
        }
        assert!(!grammar.is_nullable(NonterminalID::START));
    }

    #[test]
    fn nullability_requires_whole_rhs() {
        // S -> A 'x' | A ; A -> A 'y' | ε ; C -> C 'z'
        let grammar = Grammar::define(|g| {
            let x = g.literal('x', None)?;
            let y = g.literal('y', None)?;
            let z = g.literal('z', None)?;
            let s = g.nonterminal("S")?;
            let a = g.nonterminal("A")?;
            let c = g.nonterminal("C")?;
            g.rule(s, [N(a), T(x)], None, None)?;
            g.rule(s, [N(a), N(c)], None, None)?;
            g.rule(a, [N(a), T(y)], None, None)?;
            g.rule(a, [], None, None)?;
            g.rule(c, [N(c), T(z)], None, None)?;
            Ok(())
        })
        .unwrap();
        let id = |name: &str| {
            grammar
                .nonterminals
                .values()
                .find(|n| n.name() == name)
                .unwrap()
                .id()
        };
        assert!(grammar.is_nullable(id("A")));
        assert!(!grammar.is_nullable(id("C")));
        assert!(!grammar.is_nullable(id("S")));
    }

    #[test]
    fn token_codes() {
        let grammar = Grammar::define(|g| {
            let num = g.terminal("NUM", None)?;
            let plus = g.literal('+', None)?;
            let star = g.literal('*', None)?;
            let ident = g.terminal("IDENT", None)?;
            let e = g.nonterminal("E")?;
            g.rule(e, [N(e), T(plus), T(num)], None, None)?;
            g.rule(e, [N(e), T(star), T(ident)], None, None)?;
            g.rule(e, [T(num)], None, None)?;
            Ok(())
        })
        .unwrap();
        let code = |name: &str| {
            grammar
                .terminals
                .values()
                .find(|t| t.to_string() == name)
                .unwrap()
                .code()
        };
        assert_eq!(code("'+'"), '+' as u32);
        assert_eq!(code("'*'"), '*' as u32);
        let base = 256;
        assert_eq!(code("error"), base);
        assert_eq!(code("eof"), base + 1);
        assert_eq!(code("NUM"), base + 2);
        assert_eq!(code("IDENT"), base + 3);
        assert_eq!(grammar.terminal_by_code(base + 3), grammar.terminals.values().find(|t| t.name() == "IDENT").map(|t| t.id()));
    }

    #[test]
    fn augmented_production_comes_first() {
        let grammar = Grammar::define(|g| {
            let a = g.terminal("A", None)?;
            let s = g.nonterminal("S")?;
            g.rule(s, [T(a)], None, None)?;
            Ok(())
        })
        .unwrap();
        let (id, accept) = grammar.productions.first().unwrap();
        assert_eq!(*id, ProductionID::ACCEPT);
        assert_eq!(accept.left(), NonterminalID::START);
        assert_eq!(
            accept.right(),
            &[N(grammar.start_symbol), T(TerminalID::EOI)]
        );
        assert_eq!(
            grammar.nonterminals[&NonterminalID::START].productions(),
            &[ProductionID::ACCEPT]
        );
    }

    #[test]
    fn precedence_inherited_from_rightmost_terminal() {
        let grammar = Grammar::define(|g| {
            let low = g.precedence_level(Assoc::Left);
            let high = g.precedence_level(Assoc::Right);
            let plus = g.literal('+', Some(low))?;
            let pow = g.literal('^', Some(high))?;
            let num = g.terminal("NUM", None)?;
            let e = g.nonterminal("E")?;
            g.rule(e, [N(e), T(plus), N(e), T(pow), N(e)], None, None)?;
            g.rule(e, [N(e), T(plus), N(e)], Some(high), None)?;
            g.rule(e, [T(num)], None, None)?;
            Ok(())
        })
        .unwrap();
        let precs: Vec<_> = grammar
            .productions
            .values()
            .skip(1)
            .map(|p| p.precedence(&grammar).map(|p| (p.priority, p.assoc)))
            .collect();
        assert_eq!(
            precs,
            [Some((1, Assoc::Right)), Some((1, Assoc::Right)), None]
        );
    }

    #[test]
    fn rejects_duplicate_rules() {
        let result = Grammar::define(|g| {
            let a = g.terminal("A", None)?;
            let s = g.nonterminal("S")?;
            g.rule(s, [T(a)], None, None)?;
            g.rule(s, [T(a)], None, None)?;
            Ok(())
        });
        assert!(matches!(result, Err(GrammarDefError::Other { .. })));
    }

    #[test]
    fn rejects_eof_in_rules() {
        let result = Grammar::define(|g| {
            let s = g.nonterminal("S")?;
            g.rule(s, [T(TerminalID::EOI)], None, None)?;
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn reports_unproductive_nonterminals() {
        let grammar = Grammar::from_str(
            "%%\n%token A\n%%\nS : A Missing | A ;\n",
        )
        .unwrap();
        let names: Vec<_> = grammar
            .unproductive_nonterminals()
            .map(|n| n.name().to_owned())
            .collect();
        assert_eq!(names, ["Missing"]);
    }

    #[test]
    fn lowering_from_source() {
        let grammar = Grammar::from_str(
            r#"
use std::fmt;
%%
%token <num> NUM
%left '+' '-'
%left '*'
%right UMINUS
%type <expr> expr
%start expr
%valuetype i64
%%
expr : expr '+' expr { $$ = $1 + $3; }
     | expr '-' expr
     | expr '*' expr
     | '-' expr %prec UMINUS
     | NUM
     ;
%%
fn main() {}
"#,
        )
        .unwrap();

        assert_eq!(grammar.metadata.value_type.as_deref(), Some("i64"));
        assert!(grammar.metadata.prelude.contains("use std::fmt;"));
        assert!(grammar.metadata.epilog.contains("fn main() {}"));

        let start = &grammar.nonterminals[&grammar.start_symbol];
        assert_eq!(start.name(), "expr");
        assert_eq!(start.tag(), Some("expr"));
        assert_eq!(start.productions().len(), 5);

        let plus = grammar.terminals.values().find(|t| t.name() == "'+'").unwrap();
        let star = grammar.terminals.values().find(|t| t.name() == "'*'").unwrap();
        let uminus = grammar.terminals.values().find(|t| t.name() == "UMINUS").unwrap();
        assert_eq!(plus.precedence().unwrap().priority, 0);
        assert_eq!(star.precedence().unwrap().priority, 1);
        assert_eq!(uminus.precedence().unwrap().assoc, Assoc::Right);

        let negate = grammar.production(start.productions()[3]);
        assert_eq!(negate.precedence(&grammar), uminus.precedence());

        let add = grammar.production(start.productions()[0]);
        assert_eq!(add.action().map(|a| a.code.trim()), Some("$$ = $1 + $3;"));
        assert_eq!(add.action().map(|a| a.line), Some(12));
    }

    #[test]
    fn lowering_rejects_unknown_prec_terminal() {
        let result = Grammar::from_str("%%\n%token A\n%%\nS : A %prec B ;\n");
        assert!(matches!(result, Err(GrammarDefError::Other { .. })));
    }

    #[test]
    fn lowering_rejects_unknown_start() {
        let result = Grammar::from_str("%%\n%token A\n%start T\n%%\nS : A ;\n");
        assert!(result.is_err());
    }

    #[test]
    fn default_start_is_first_rule() {
        // `term` is registered first by %type, but `expr` owns the first rule.
        let grammar = Grammar::from_str(
            "%%\n%token NUM\n%type <v> term\n%%\nexpr : expr '+' term | term ;\nterm : NUM ;\n",
        )
        .unwrap();
        assert_eq!(grammar.nonterminals[&grammar.start_symbol].name(), "expr");

        let accept = &grammar.productions[&ProductionID::ACCEPT];
        assert_eq!(accept.right[0], N(grammar.start_symbol));
    }
}
