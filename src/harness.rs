use anyhow::{Context, Result, ensure};
use indoc::indoc;

use crate::backend::bytecode::compile;
use crate::backend::wasm::compile_module;
use crate::backend::{self, Bindings};
use crate::parser::MAX_NESTING_DEPTH;
use crate::token::TokenKind;
use crate::{lexer, parser};

const PROGRAMS: [&str; 6] = [
    "x := 3 + 4; y := x * 2",
    "while x < 3 do x := x + 1 end",
    "if 0 then a := 1 end; b := a",
    indoc! {"
        n := 12; total := 0;
        while n > 0 do
            if (n - (n / 3) * 3 = 0) | (n = 1) then total := total + n else skip end;
            n := n - 1
        end
    "},
    indoc! {"
        p := (0 - 17) / 5; q := 17 / (0 - 5); r := !(p < q) & true;
        s := 9223372036854775807 * 3 - 1
    "},
    indoc! {"
        a := 0; b := 1; i := 0;
        while i < 60 do
            t := a + b; a := b; b := t; i := i + 1
        end
    "},
];

fn run_everywhere(source: &str) -> Result<Vec<(&'static str, Bindings)>> {
    let program = parser::parse(source).with_context(|| format!("Parsing {source:?}"))?;
    backend::backends()
        .into_iter()
        .map(|backend| {
            let bindings = backend
                .run(&program)
                .with_context(|| format!("Backend {} failed for {source:?}", backend.name()))?;
            Ok((backend.name(), bindings))
        })
        .collect()
}

#[test]
fn backends_agree_on_every_program() -> Result<()> {
    for source in PROGRAMS {
        let results = run_everywhere(source)?;
        let (reference_name, reference) = &results[0];
        for (name, bindings) in &results[1..] {
            assert_eq!(
                bindings, reference,
                "{name} disagrees with {reference_name} on {source:?}"
            );
        }
    }
    Ok(())
}

#[test]
fn backends_agree_on_runtime_errors() -> Result<()> {
    for source in ["x := 10 / 0", "y := 1; x := y / (y - 1)"] {
        let program = parser::parse(source)?;
        for backend in backend::backends() {
            let error = backend
                .run(&program)
                .expect_err("division by zero must fail");
            ensure!(
                error.to_string().starts_with("Division by zero"),
                "{} reported '{error}' for {source:?}",
                backend.name()
            );
        }
    }
    Ok(())
}

#[test]
fn backends_handle_programs_at_the_nesting_limit() -> Result<()> {
    let chain = format!("x := 1{}", " + 1".repeat(MAX_NESTING_DEPTH - 1));
    for (_, bindings) in run_everywhere(&chain)? {
        assert_eq!(bindings.get("x"), Some(&(MAX_NESTING_DEPTH as i64)));
    }

    let loops = format!(
        "{}x := 1{}",
        "while x < 1 do ".repeat(MAX_NESTING_DEPTH),
        " end".repeat(MAX_NESTING_DEPTH)
    );
    for (_, bindings) in run_everywhere(&loops)? {
        assert_eq!(bindings.get("x"), Some(&1));
    }
    Ok(())
}

#[test]
fn prepared_programs_are_idempotent() -> Result<()> {
    for source in PROGRAMS {
        let program = parser::parse(source)?;
        for backend in backend::backends() {
            let prepared = backend.prepare(&program)?;
            let first = prepared.run()?;
            let second = prepared.run()?;
            assert_eq!(first, second, "{} is not idempotent", backend.name());
        }
    }
    Ok(())
}

#[test]
fn module_compilation_is_byte_identical() -> Result<()> {
    for source in PROGRAMS {
        let program = parser::parse(source)?;
        assert_eq!(compile_module(&program).bytes, compile_module(&program).bytes);
    }
    Ok(())
}

#[test]
fn relative_jumps_stay_in_range() -> Result<()> {
    for source in PROGRAMS {
        let compiled = compile(&parser::parse(source)?);
        let len = compiled.instructions.len() as isize;
        for (index, instruction) in compiled.instructions.iter().enumerate() {
            if let Some(offset) = instruction.opcode.jump_offset() {
                let target = index as isize + offset;
                ensure!(
                    (0..len).contains(&target),
                    "jump at {index} lands on {target} in {source:?}"
                );
            }
        }
    }
    Ok(())
}

#[test]
fn module_annotations_cover_every_byte() -> Result<()> {
    for source in PROGRAMS {
        let module = compile_module(&parser::parse(source)?);
        let mut expected_offset = 0;
        for (offset, bytes, _) in module.disassembly() {
            ensure!(offset == expected_offset, "gap before offset {offset}");
            ensure!(!bytes.is_empty(), "empty primitive at {offset}");
            expected_offset += bytes.len();
        }
        ensure!(expected_offset == module.bytes.len());
    }
    Ok(())
}

#[test]
fn token_texts_reassemble_the_source() {
    for source in PROGRAMS {
        let tokens = lexer::tokenize(source);
        assert_eq!(tokens.last().map(|token| token.kind), Some(TokenKind::EOF));
        let joined: String = tokens.iter().map(|token| token.text).collect();
        let stripped: String = source.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(joined, stripped);
    }
}
