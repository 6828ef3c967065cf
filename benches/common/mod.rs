#![allow(dead_code)]
use std::fs;
use std::path::Path;

use wlang::ast::Sequence;
use wlang::parser;

/// Fixture cases tagged for benchmarking, as `(label, path to program.w)`.
pub fn workloads(tag: &str) -> Vec<(String, String)> {
    test_support::bench_cases(Path::new("tests/programs"), tag)
        .unwrap_or_else(|err| panic!("load bench cases: {err:#}"))
        .into_iter()
        .map(|case| (case.name, case.program_path.display().to_string()))
        .collect()
}

pub fn load_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"))
}

pub fn load_program(path: &str) -> Sequence {
    let source = load_source(path);
    parser::parse(&source).unwrap_or_else(|err| panic!("parse {path}: {err}"))
}
