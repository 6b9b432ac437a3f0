//! Build script support.
//!
//! Every `*.y` file below the root directory is compiled into
//! `$OUT_DIR/<relative path>.rs`, which the crate can then `include!`.

use crate::{
    codegen::{Codegen, CodegenOptions},
    grammar::Grammar,
};
use anyhow::Context as _;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub fn process_root() -> anyhow::Result<()> {
    let build = Build::new()?;
    build.process()
}

pub fn process_dir(root_dir: &Path) -> anyhow::Result<()> {
    let build = Build::with_root_dir(root_dir.to_owned())?;
    build.process()
}

#[derive(Debug)]
pub struct Build {
    root_dir: PathBuf,
    out_dir: PathBuf,
    options: CodegenOptions,
}

impl Build {
    pub fn new() -> anyhow::Result<Self> {
        let root_dir = env::var_os("CARGO_MANIFEST_DIR")
            .map(PathBuf::from)
            .context("The environment variable `CARGO_MANIFEST_DIR' is not set")?;
        Self::with_root_dir(root_dir)
    }

    pub fn with_root_dir(root_dir: PathBuf) -> anyhow::Result<Self> {
        let out_dir = env::var_os("OUT_DIR")
            .map(PathBuf::from)
            .context("The environment variable `OUT_DIR' is not set")?;
        Ok(Self {
            root_dir,
            out_dir,
            options: CodegenOptions::default(),
        })
    }

    /// Toggle the `// line N` comments in the generated code.
    pub fn line_markers(mut self, enabled: bool) -> Self {
        self.options.line_markers = enabled;
        self
    }

    pub fn process(&self) -> anyhow::Result<()> {
        for entry in WalkDir::new(&self.root_dir) {
            let entry = entry.context("from WalkDir entry")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let in_file = entry.path();
            match in_file.extension().and_then(|ext| ext.to_str()) {
                Some("y") => self.process_file(in_file)?,
                _ => continue,
            }
        }

        Ok(())
    }

    fn process_file(&self, in_file: &Path) -> anyhow::Result<()> {
        let mut out_file = self.out_dir.join(in_file.strip_prefix(&self.root_dir)?);
        out_file.set_extension("rs");
        let report_file = out_file.with_extension("report");
        if let Some(out_dir) = out_file.parent() {
            fs::create_dir_all(out_dir)?;
        }

        println!("cargo:rerun-if-changed={}", in_file.display());

        let grammar = Grammar::from_file(in_file)
            .with_context(|| format!("failed to read the grammar {}", in_file.display()))?;
        let (lr0, lalr) = crate::compute_automaton(&grammar);
        let table = crate::table::generate(&grammar, &lr0);
        for conflict in &table.conflicts {
            println!(
                "cargo:warning={}: {}",
                in_file.display(),
                conflict.display(&grammar)
            );
        }

        let codegen = Codegen::new(&grammar, &table, self.options.clone())?;
        fs::write(&out_file, codegen.to_string())
            .with_context(|| format!("failed to write {}", out_file.display()))?;
        let report = crate::report(&grammar, &lr0, &lalr, &table);
        fs::write(&report_file, report.to_string())
            .with_context(|| format!("failed to write {}", report_file.display()))?;

        Ok(())
    }
}
