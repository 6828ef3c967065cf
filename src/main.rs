use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use wlang::backend::Bindings;
use wlang::pipeline::{self, Intermediate};

#[derive(Parser)]
#[command(name = "wlang", about = "Tokenize, compile and run W programs", version)]
struct Cli {
    /// Source file; reads stdin when omitted
    input: Option<PathBuf>,

    /// Pipeline to run: "Interpreter", "Abstract Machine" or "Binary Module"
    #[arg(short, long, default_value = "Interpreter")]
    pipeline: String,

    /// Intermediates to print before running
    #[arg(long, value_enum, value_delimiter = ',')]
    emit: Vec<Emit>,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Stop after the last compilation stage
    #[arg(long)]
    no_run: bool,

    /// Log level (-v=info, -vv=debug, -vvv=trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    /// Bytecode listing or module disassembly, depending on the pipeline
    Code,
}

impl Emit {
    fn matches(self, intermediate: &Intermediate<'_>) -> bool {
        matches!(
            (self, intermediate),
            (Emit::Tokens, Intermediate::Tokens(_))
                | (Emit::Ast, Intermediate::Ast(_))
                | (Emit::Code, Intermediate::Bytecode(_) | Intermediate::Module(_))
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_source(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading stdin")?;
            Ok(buffer)
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = read_source(cli.input.as_ref())?;
    let pipeline = pipeline::select(&cli.pipeline)?;
    let run = pipeline.run(&source);

    let emitted = run
        .intermediates
        .iter()
        .filter(|intermediate| cli.emit.iter().any(|emit| emit.matches(intermediate)))
        .collect::<Vec<_>>();

    let bindings = match (&run.error, run.last()) {
        (None, Some(last)) if !cli.no_run => Some(pipeline.execute(last).await),
        _ => None,
    };

    match cli.format {
        OutputFormat::Text => {
            for intermediate in &emitted {
                println!("== {} ==", intermediate.kind());
                print!("{}", intermediate.render());
            }
            if let Some(Ok(bindings)) = &bindings {
                print_bindings(bindings);
            }
        }
        OutputFormat::Json => {
            let report = json!({
                "pipeline": pipeline.kind.name(),
                "intermediates": emitted,
                "error": run.error,
                "bindings": bindings.as_ref().and_then(|result| result.as_ref().ok()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if let Some(error) = &run.error {
        bail!("{error}");
    }
    match bindings {
        Some(Err(error)) => Err(error),
        _ => Ok(()),
    }
}

fn print_bindings(bindings: &Bindings) {
    for (name, value) in bindings {
        println!("{name} = {value}");
    }
}
