use anyhow::{Context, Result};
use indoc::indoc;

use wlang::backend::{Bindings, RuntimeError};
use wlang::pipeline::{Intermediate, PipelineError, PipelineKind, select};

const PIPELINES: [&str; 3] = ["Interpreter", "Abstract Machine", "Binary Module"];

async fn run_to_bindings(name: &str, code: &str) -> Result<Bindings> {
    let pipeline = select(name)?;
    let run = pipeline.run(code);
    if let Some(error) = run.error {
        anyhow::bail!(error);
    }
    let last = run.last().context("pipeline produced nothing")?;
    pipeline.execute(last).await
}

fn bindings(pairs: &[(&str, i64)]) -> Bindings {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}

#[tokio::test]
async fn every_pipeline_computes_the_same_bindings() -> Result<()> {
    let code = indoc! {"
        x := 3 + 4;
        y := x * 2;
        while x < 10 do x := x + 1 end;
        if y >= 14 then big := true else big := false end
    "};
    for name in PIPELINES {
        let result = run_to_bindings(name, code)
            .await
            .with_context(|| format!("pipeline {name}"))?;
        assert_eq!(
            result,
            bindings(&[("big", 1), ("x", 10), ("y", 14)]),
            "pipeline {name}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn untouched_branch_variables_are_absent_everywhere() -> Result<()> {
    for name in PIPELINES {
        let result = run_to_bindings(name, "if 0 then a := 1 end").await?;
        assert!(result.is_empty(), "pipeline {name} returned {result:?}");
    }
    Ok(())
}

#[tokio::test]
async fn runtime_errors_surface_from_execute() -> Result<()> {
    for name in PIPELINES {
        let error = run_to_bindings(name, "x := 10 / 0")
            .await
            .expect_err("division by zero must fail");
        assert_eq!(
            error.downcast_ref::<RuntimeError>().map(RuntimeError::root),
            Some(&RuntimeError::DivisionByZero),
            "pipeline {name}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn syntax_errors_keep_earlier_intermediates() -> Result<()> {
    let pipeline = select("Binary Module")?;
    let run = pipeline.run("x := ");
    assert!(!run.succeeded());
    assert_eq!(
        run.error.as_deref(),
        Some("Unexpected end-of-input token '' at 5")
    );
    assert!(matches!(run.intermediates[0], Intermediate::Code("x := ")));
    assert!(matches!(run.last(), Some(Intermediate::Tokens(_))));
    Ok(())
}

#[tokio::test]
async fn execute_rejects_mismatched_intermediates() -> Result<()> {
    let pipeline = select("Abstract Machine")?;
    let error = pipeline
        .execute(&Intermediate::Code("x := 1"))
        .await
        .expect_err("code is not executable");
    assert_eq!(
        error.to_string(),
        "Abstract Machine pipeline cannot execute code"
    );
    Ok(())
}

#[test]
fn unknown_pipeline_names_are_rejected() {
    let error = select("Quantum").expect_err("no such pipeline");
    assert_eq!(
        error,
        PipelineError::Unsupported {
            name: "Quantum".to_string()
        }
    );
}

#[test]
fn final_intermediate_matches_the_pipeline() {
    let expected = [
        (PipelineKind::Interpreter, "ast"),
        (PipelineKind::AbstractMachine, "bytecode"),
        (PipelineKind::BinaryModule, "module"),
    ];
    for (kind, last_kind) in expected {
        let run = select(kind.name()).expect("known pipeline").run("a := 1");
        assert_eq!(run.last().map(Intermediate::kind), Some(last_kind));
    }
}
