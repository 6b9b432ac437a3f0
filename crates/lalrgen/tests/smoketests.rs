use lalrgen::{
    codegen::{Codegen, CodegenOptions},
    grammar::Grammar,
};
use std::{env, path::PathBuf};

macro_rules! define_tests {
    ($($name:ident: $conflicts:expr),*$(,)?) => {$(
        #[test]
        fn $name() {
            let grammar = Grammar::from_file(
                &PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap())
                    .join(concat!("tests/", stringify!($name), ".y"))
            ).unwrap();
            let table = lalrgen::compute(&grammar);
            assert_eq!(
                table.conflicts.len(),
                $conflicts,
                "{}",
                table.display(&grammar)
            );
            let _code = Codegen::new(&grammar, &table, CodegenOptions::default())
                .unwrap()
                .to_string();
        }
    )*};
}

define_tests! {
    arithmetic: 0,
    arithmetic_prec: 0,
    dangling_else: 1,
    json: 0,
    lalr_not_slr: 0,
    nullable: 0,
    reduce_reduce: 1,
}
