use criterion::{criterion_group, criterion_main, Criterion};
use lalrgen::grammar::Grammar;
use std::{env, path::PathBuf};

criterion_main!(benches);
criterion_group!(benches, bench_arithmetic, bench_misc);

fn bench_arithmetic(c: &mut Criterion) {
    bench_table_gen(c, "arithmetic");
    bench_table_gen(c, "arithmetic_prec");
}

fn bench_misc(c: &mut Criterion) {
    bench_table_gen(c, "json");
    bench_table_gen(c, "dangling_else");
    bench_table_gen(c, "lalr_not_slr");
}

fn bench_table_gen(c: &mut Criterion, grammar_name: &str) {
    let project_root = env::var_os("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .expect("missing environment variable: `CARGO_MANIFEST_DIR'");
    let grammar =
        Grammar::from_file(project_root.join(format!("tests/{}.y", grammar_name))).unwrap();

    let mut group = c.benchmark_group(grammar_name);
    group.bench_function("LR0", |b| {
        b.iter(|| lalrgen::lr0::lr0(&grammar));
    });
    group.bench_function("LALR", |b| {
        b.iter(|| lalrgen::compute(&grammar));
    });
    group.finish();
}
