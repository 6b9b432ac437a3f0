use anyhow::Context as _;
use clap::Parser;
use lalrgen::{
    codegen::{Codegen, CodegenOptions},
    grammar::Grammar,
};
use std::{
    fs,
    io::{self, Write as _},
    path::PathBuf,
    time::Instant,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Write the grammar, the automaton and the parse table in human-readable form.
    #[arg(long)]
    report: bool,

    /// Do not emit `// line N` comments before the semantic actions.
    #[arg(long)]
    no_lines: bool,

    /// The path of grammar definition file.
    input: PathBuf,

    /// The path of generated .rs file. The standard output is used if omitted.
    output: Option<PathBuf>,

    /// The path of the report file. Defaults to the grammar file with extension `report`.
    report_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    tracing::trace!("CLI args = {:?}", args);

    process_file(&args)
        .with_context(|| anyhow::anyhow!("errored during processing {}", args.input.display()))?;

    Ok(())
}

fn process_file(args: &Args) -> anyhow::Result<()> {
    let s = Instant::now();
    let grammar = Grammar::from_file(&args.input)?;
    tracing::info!("read grammar: {:?} elapsed", s.elapsed());

    let unproductive: Vec<_> = grammar
        .unproductive_nonterminals()
        .map(|n| n.name())
        .collect();
    if !unproductive.is_empty() {
        tracing::warn!(?unproductive, "nonterminals without productions");
        eprintln!(
            "[warning] The following nonterminals have no associated production rule: {:?}",
            unproductive
        );
    }

    let s = Instant::now();
    let (lr0, lalr) = lalrgen::compute_automaton(&grammar);
    let table = lalrgen::table::generate(&grammar, &lr0);
    tracing::info!("compute table: {:?} elapsed", s.elapsed());

    if !table.conflicts.is_empty() {
        let suffix = if table.conflicts.len() == 1 { "" } else { "s" };
        eprintln!(
            "[warning] {} conflict{} found in the grammar:",
            table.conflicts.len(),
            suffix
        );
        for conflict in &table.conflicts {
            eprintln!("[warning]   {}", conflict.display(&grammar));
        }
    }

    if args.report {
        let report_file = args
            .report_file
            .clone()
            .unwrap_or_else(|| args.input.with_extension("report"));
        let report = lalrgen::report(&grammar, &lr0, &lalr, &table);
        fs::write(&report_file, report.to_string()).with_context(|| {
            anyhow::anyhow!("failed to write the report to {}", report_file.display())
        })?;
    }

    let mut options = CodegenOptions::default();
    options.line_markers = !args.no_lines;
    let codegen = Codegen::new(&grammar, &table, options)?;
    let mut generated: Vec<u8> = codegen.to_string().into();

    // attempt to apply rustfmt to generated code.
    let sh = xshell::Shell::new()?;
    let res = xshell::cmd!(sh, "rustfmt --emit=stdout --color=never --quiet")
        .quiet()
        .stdin(&generated)
        .output();
    match res {
        Ok(output) if output.status.success() => generated = output.stdout,
        _ => tracing::debug!("rustfmt is not available, emitting unformatted code"),
    }

    match &args.output {
        Some(out_file) => fs::write(out_file, &generated).with_context(|| {
            anyhow::anyhow!("failed to write generated parser to {}", out_file.display())
        })?,
        None => io::stdout()
            .lock()
            .write_all(&generated)
            .context("failed to write generated parser to stdout")?,
    }

    Ok(())
}
