//! Generation of the parser source code.

use crate::{
    grammar::{Grammar, Production, ProductionID, TerminalID, TerminalKind},
    table::{Action, ParseTable},
    types::Map,
};
use std::fmt;

const RUNTIME: &str = "::lalrgen_runtime";

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CodegenOptions {
    /// Emit a `// line N` comment before each semantic action.
    pub line_markers: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self { line_markers: true }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("line {}: `{}` is out of range for `{}`", line, placeholder, production)]
    PlaceholderOutOfRange {
        line: usize,
        placeholder: String,
        production: String,
    },
}

/// The generated parser module, written through [`fmt::Display`].
#[derive(Debug)]
pub struct Codegen<'g> {
    grammar: &'g Grammar,
    table: &'g ParseTable,
    options: CodegenOptions,
    actions: Map<ProductionID, String>,
}

impl<'g> Codegen<'g> {
    pub fn new(
        grammar: &'g Grammar,
        table: &'g ParseTable,
        options: CodegenOptions,
    ) -> Result<Self, CodegenError> {
        let mut actions = Map::default();
        for production in grammar.productions.values() {
            if production.id() == ProductionID::ACCEPT {
                continue;
            }
            if let Some(action) = production.action() {
                let code = substitute(&action.code, production.right().len()).map_err(
                    |placeholder| CodegenError::PlaceholderOutOfRange {
                        line: action.line,
                        placeholder,
                        production: production.display(grammar).to_string(),
                    },
                )?;
                actions.insert(production.id(), code);
            }
        }
        Ok(Self {
            grammar,
            table,
            options,
            actions,
        })
    }

    fn write_tokens(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        writeln!(f, "/// Token codes of the symbolic terminals.")?;
        writeln!(f, "#[allow(dead_code)]")?;
        writeln!(f, "pub mod token {{")?;
        for terminal in g.terminals.values() {
            if terminal.kind() == TerminalKind::Symbolic
                && terminal.id() != TerminalID::EOI
                && terminal.id() != TerminalID::ERROR
            {
                writeln!(f, "    pub const {}: u32 = {};", terminal.name(), terminal.code())?;
            }
        }
        writeln!(f, "}}")?;
        writeln!(
            f,
            "pub const EOF_TOKEN: u32 = {};",
            g.terminals[&TerminalID::EOI].code()
        )?;
        writeln!(
            f,
            "pub const ERROR_TOKEN: u32 = {};",
            g.terminals[&TerminalID::ERROR].code()
        )?;
        writeln!(f)
    }

    fn write_tables(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        writeln!(
            f,
            "type ParseAction = {}::definition::ParseAction<u32, u16, u16>;",
            RUNTIME
        )?;
        writeln!(f)?;

        // Rows are sorted by token code for binary search.
        writeln!(f, "const ACTIONS: &[&[(u32, ParseAction)]] = &[")?;
        for (id, row) in self.table.state_ids().zip(&self.table.states) {
            let mut entries: Vec<_> = row
                .actions
                .iter()
                .map(|(t, action)| (g.terminals[t].code(), *action))
                .collect();
            entries.sort_by_key(|(code, _)| *code);

            writeln!(f, "    // {:?}", id)?;
            f.write_str("    &[")?;
            for (i, (code, action)) in entries.into_iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match action {
                    Action::Shift(next) => {
                        write!(f, "({}, ParseAction::Shift({}))", code, next.into_raw())?
                    }
                    Action::Reduce(p) => {
                        let production = g.production(p);
                        write!(
                            f,
                            "({}, ParseAction::Reduce({}, {}, {}))",
                            code,
                            p.into_raw(),
                            production.left().into_raw(),
                            production.right().len()
                        )?
                    }
                    Action::Accept => write!(f, "({}, ParseAction::Accept)", code)?,
                }
            }
            writeln!(f, "],")?;
        }
        writeln!(f, "];")?;
        writeln!(f)?;

        writeln!(f, "const GOTOS: &[&[(u16, u32)]] = &[")?;
        for row in &self.table.states {
            let mut entries: Vec<_> = row
                .gotos
                .iter()
                .map(|(n, next)| (n.into_raw(), next.into_raw()))
                .collect();
            entries.sort_unstable();
            f.write_str("    &[")?;
            for (i, (n, next)) in entries.into_iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "({}, {})", n, next)?;
            }
            writeln!(f, "],")?;
        }
        writeln!(f, "];")?;
        writeln!(f)
    }

    fn write_parser_def(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "\
/// The parse tables of this grammar.
#[derive(Debug, Default, Copy, Clone)]
pub struct Tables;

impl {rt}::definition::ParserDef for Tables {{
    type State = u32;
    type Nonterminal = u16;
    type Rule = u16;

    fn initial_state(&self) -> u32 {{
        0
    }}

    fn action(&self, current: u32, lookahead: u32) -> ParseAction {{
        let row = ACTIONS[current as usize];
        match row.binary_search_by_key(&lookahead, |(code, _)| *code) {{
            Ok(i) => row[i].1,
            Err(..) => ParseAction::Error,
        }}
    }}

    fn goto(&self, current: u32, symbol: u16) -> ::core::option::Option<u32> {{
        let row = GOTOS[current as usize];
        row.binary_search_by_key(&symbol, |(n, _)| *n)
            .ok()
            .map(|i| row[i].1)
    }}

    fn expected_tokens(&self, current: u32) -> ::std::vec::Vec<u32> {{
        ACTIONS[current as usize].iter().map(|(code, _)| *code).collect()
    }}

    fn error_token(&self) -> u32 {{
        ERROR_TOKEN
    }}

    fn eof_token(&self) -> u32 {{
        EOF_TOKEN
    }}
}}
",
            rt = RUNTIME
        )
    }

    fn write_reduce(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        writeln!(f, "/// Run the semantic action of `rule` over the right-hand side symbols.")?;
        writeln!(
            f,
            "#[allow(unused_mut, unused_variables, unused_assignments, clippy::all)]"
        )?;
        writeln!(
            f,
            "pub fn reduce(rule: u16, __rhs: &mut [ValueType], __rhs_loc: &[LocationType]) -> (ValueType, LocationType) {{"
        )?;
        writeln!(
            f,
            "    let mut __lhs: ValueType = ::core::default::Default::default();"
        )?;
        writeln!(
            f,
            "    let mut __lhs_loc: LocationType = __rhs_loc.first().cloned().unwrap_or_default();"
        )?;
        writeln!(f, "    match rule {{")?;
        for production in g.productions.values() {
            if production.id() == ProductionID::ACCEPT {
                continue;
            }
            self.write_reduce_arm(f, production)?;
        }
        writeln!(f, "        _ => {{}}")?;
        writeln!(f, "    }}")?;
        writeln!(f, "    (__lhs, __lhs_loc)")?;
        writeln!(f, "}}")?;
        writeln!(f)
    }

    fn write_reduce_arm(&self, f: &mut fmt::Formatter<'_>, production: &Production) -> fmt::Result {
        let g = self.grammar;
        match (self.actions.get(&production.id()), production.action()) {
            (Some(code), Some(action)) => {
                writeln!(f, "        {} => {{", production.id().into_raw())?;
                writeln!(f, "            // {}", production.display(g))?;
                if self.options.line_markers {
                    writeln!(f, "            // line {}", action.line)?;
                }
                writeln!(f, "            {{{}}}", code)?;
                writeln!(f, "        }}")
            }
            // $$ = $1
            _ if !production.right().is_empty() => {
                writeln!(f, "        {} => {{", production.id().into_raw())?;
                writeln!(f, "            // {}", production.display(g))?;
                writeln!(f, "            __lhs = ::core::mem::take(&mut __rhs[0]);")?;
                writeln!(f, "        }}")
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Codegen<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.grammar;
        f.write_str(&g.metadata.prelude)?;
        if !g.metadata.prelude.is_empty() && !g.metadata.prelude.ends_with('\n') {
            writeln!(f)?;
        }
        writeln!(f, "// This file is generated by lalrgen. Do not edit.")?;
        writeln!(f)?;

        writeln!(
            f,
            "pub type ValueType = {};",
            g.metadata.value_type.as_deref().unwrap_or("()")
        )?;
        writeln!(
            f,
            "pub type LocationType = {};",
            g.metadata.location_type.as_deref().unwrap_or("()")
        )?;
        writeln!(f)?;

        self.write_tokens(f)?;
        self.write_tables(f)?;
        self.write_parser_def(f)?;
        self.write_reduce(f)?;

        writeln!(
            f,
            "\
/// Parse the whole input supplied by `source`.
#[allow(dead_code)]
pub fn parse<S>(source: &mut S) -> ::core::result::Result<ValueType, {rt}::engine::ParseError>
where
    S: {rt}::parser::TokenSource<Value = ValueType, Location = LocationType> + ?Sized,
{{
    {rt}::parser::parse(Tables, source, reduce)
}}",
            rt = RUNTIME
        )?;

        if !g.metadata.epilog.is_empty() {
            writeln!(f)?;
            f.write_str(&g.metadata.epilog)?;
        }
        Ok(())
    }
}

/// Replace the value and location placeholders of an action.
///
/// `$$` and `@$` denote the left-hand side, `$n` and `@n` the n-th symbol of
/// the right-hand side. String literals are copied untouched. On failure the
/// out-of-range placeholder is returned.
fn substitute(code: &str, len: usize) -> Result<String, String> {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        match ch {
            '"' => {
                out.push(ch);
                while let Some((_, ch)) = chars.next() {
                    out.push(ch);
                    match ch {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }

            '$' | '@' => {
                let (lhs, rhs) = match ch {
                    '$' => ("__lhs", "__rhs"),
                    _ => ("__lhs_loc", "__rhs_loc"),
                };
                match chars.peek() {
                    Some((_, '$')) => {
                        chars.next();
                        out.push_str(lhs);
                    }
                    Some((start, digit)) if digit.is_ascii_digit() => {
                        let start = *start;
                        let mut end = start;
                        while let Some((i, digit)) = chars.peek() {
                            if !digit.is_ascii_digit() {
                                break;
                            }
                            end = *i + 1;
                            chars.next();
                        }
                        let digits = &code[start..end];
                        match digits.parse::<usize>() {
                            Ok(n) if (1..=len).contains(&n) => {
                                out.push_str(&format!("{}[{}]", rhs, n - 1));
                            }
                            _ => return Err(format!("{}{}", ch, digits)),
                        }
                    }
                    _ => out.push(ch),
                }
            }

            ch => out.push(ch),
        }
    }
    Ok(out)
}
