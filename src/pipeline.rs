//! Named chains of compilation stages.
//!
//! A pipeline turns source text into the representation its executor
//! consumes, keeping every intermediate so callers can display how a program
//! was lowered. Execution is a separate, explicit step.

use std::fmt;

use anyhow::{Result, bail};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ast::{Node, Sequence};
use crate::backend::bytecode::{self, CompiledProgram};
use crate::backend::wasm::{self, CompiledModule};
use crate::backend::{Bindings, interpreter, vm};
use crate::lexer;
use crate::parser;
use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Unsupported pipeline '{name}'")]
    Unsupported { name: String },
}

/// One representation of the program on its way to execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Intermediate<'a> {
    Code(&'a str),
    Tokens(Vec<Token<'a>>),
    Ast(Sequence),
    Bytecode(CompiledProgram),
    Module(CompiledModule),
}

impl Intermediate<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Intermediate::Code(_) => "code",
            Intermediate::Tokens(_) => "tokens",
            Intermediate::Ast(_) => "ast",
            Intermediate::Bytecode(_) => "bytecode",
            Intermediate::Module(_) => "module",
        }
    }

    /// Multi-line text form used by the command line front end.
    pub fn render(&self) -> String {
        match self {
            Intermediate::Code(code) => code.to_string(),
            Intermediate::Tokens(tokens) => tokens
                .iter()
                .map(|token| format!("{token}\n"))
                .collect(),
            Intermediate::Ast(program) => Node::Sequence(program).to_string(),
            Intermediate::Bytecode(program) => program.to_string(),
            Intermediate::Module(module) => module
                .listing()
                .into_iter()
                .map(|line| line + "\n")
                .collect(),
        }
    }
}

/// Transformation from one intermediate to the next.
pub type Stage = for<'a> fn(&Intermediate<'a>) -> Result<Intermediate<'a>>;

#[derive(Clone, Copy)]
pub struct NamedStage {
    pub name: &'static str,
    pub apply: Stage,
}

impl fmt::Debug for NamedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedStage").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineKind {
    Interpreter,
    AbstractMachine,
    BinaryModule,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 3] = [
        PipelineKind::Interpreter,
        PipelineKind::AbstractMachine,
        PipelineKind::BinaryModule,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PipelineKind::Interpreter => "Interpreter",
            PipelineKind::AbstractMachine => "Abstract Machine",
            PipelineKind::BinaryModule => "Binary Module",
        }
    }

    fn stages(self) -> Vec<NamedStage> {
        let mut stages = vec![
            NamedStage {
                name: "tokenize",
                apply: tokenize,
            },
            NamedStage {
                name: "parse",
                apply: parse,
            },
        ];
        match self {
            PipelineKind::Interpreter => {}
            PipelineKind::AbstractMachine => stages.push(NamedStage {
                name: "compile bytecode",
                apply: compile_bytecode,
            }),
            PipelineKind::BinaryModule => stages.push(NamedStage {
                name: "compile module",
                apply: compile_module,
            }),
        }
        stages
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub kind: PipelineKind,
    pub stages: Vec<NamedStage>,
}

/// Everything a pipeline produced before it finished or failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun<'a> {
    pub intermediates: Vec<Intermediate<'a>>,
    pub error: Option<String>,
}

impl<'a> PipelineRun<'a> {
    pub fn last(&self) -> Option<&Intermediate<'a>> {
        self.intermediates.last()
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Looks up a pipeline by its display name.
pub fn select(name: &str) -> Result<Pipeline, PipelineError> {
    PipelineKind::ALL
        .into_iter()
        .find(|kind| kind.name() == name)
        .map(Pipeline::new)
        .ok_or_else(|| PipelineError::Unsupported {
            name: name.to_string(),
        })
}

impl Pipeline {
    pub fn new(kind: PipelineKind) -> Self {
        Self {
            kind,
            stages: kind.stages(),
        }
    }

    /// Applies the stages in order, stopping at the first failure.
    pub fn run<'a>(&self, code: &'a str) -> PipelineRun<'a> {
        let mut intermediates = vec![Intermediate::Code(code)];
        let mut error = None;

        for stage in &self.stages {
            let Some(input) = intermediates.last() else {
                break;
            };
            match (stage.apply)(input) {
                Ok(output) => {
                    debug!(
                        pipeline = %self.kind,
                        stage = stage.name,
                        produced = output.kind(),
                        "stage finished"
                    );
                    intermediates.push(output);
                }
                Err(err) => {
                    warn!(pipeline = %self.kind, stage = stage.name, error = %err, "stage failed");
                    error = Some(err.to_string());
                    break;
                }
            }
        }

        PipelineRun {
            intermediates,
            error,
        }
    }

    /// Runs the executor matching this pipeline over its final intermediate.
    pub async fn execute(&self, last: &Intermediate<'_>) -> Result<Bindings> {
        let bindings = match (self.kind, last) {
            (PipelineKind::Interpreter, Intermediate::Ast(program)) => {
                interpreter::interpret(program)?
            }
            (PipelineKind::AbstractMachine, Intermediate::Bytecode(program)) => vm::run(program)?,
            (PipelineKind::BinaryModule, Intermediate::Module(module)) => {
                wasm::run_module(&module.bytes, &module.variables).await?
            }
            (kind, other) => bail!("{kind} pipeline cannot execute {}", other.kind()),
        };
        debug!(pipeline = %self.kind, variables = bindings.len(), "execution finished");
        Ok(bindings)
    }
}

fn wrong_input(stage: &str, expected: &str, input: &Intermediate<'_>) -> anyhow::Error {
    anyhow::anyhow!("{stage} expected {expected} but got {}", input.kind())
}

fn tokenize<'a>(input: &Intermediate<'a>) -> Result<Intermediate<'a>> {
    match input {
        Intermediate::Code(code) => Ok(Intermediate::Tokens(lexer::tokenize(*code))),
        other => Err(wrong_input("tokenize", "code", other)),
    }
}

fn parse<'a>(input: &Intermediate<'a>) -> Result<Intermediate<'a>> {
    match input {
        Intermediate::Tokens(tokens) => Ok(Intermediate::Ast(parser::parse_tokens(tokens)?)),
        other => Err(wrong_input("parse", "tokens", other)),
    }
}

fn compile_bytecode<'a>(input: &Intermediate<'a>) -> Result<Intermediate<'a>> {
    match input {
        Intermediate::Ast(program) => Ok(Intermediate::Bytecode(bytecode::compile(program))),
        other => Err(wrong_input("compile bytecode", "ast", other)),
    }
}

fn compile_module<'a>(input: &Intermediate<'a>) -> Result<Intermediate<'a>> {
    match input {
        Intermediate::Ast(program) => Ok(Intermediate::Module(wasm::compile_module(program))),
        other => Err(wrong_input("compile module", "ast", other)),
    }
}
