use std::thread;

use anyhow::{Context, Result, anyhow};
use tokio::runtime::Handle;
use tracing::debug;
use wasmtime::{Caller, Config, Engine, Linker, Module, Store, Trap};

use super::codegen::TABLE_EXPORT;
use crate::backend::{Bindings, RuntimeError, RuntimeResult};
use crate::variables::VariableTable;

/// `(value, defined)` pairs collected from `env.report` calls.
type Reports = Vec<(i64, i64)>;

/// Instantiates `bytes` under wasmtime, calls the entry point stored at index 0
/// of the exported table and turns the host reports into bindings.
pub async fn run_module(bytes: &[u8], variables: &VariableTable) -> RuntimeResult<Bindings> {
    let mut config = Config::new();
    config.async_support(true);
    let engine = Engine::new(&config).map_err(rejected)?;
    let module = Module::new(&engine, bytes).map_err(rejected)?;

    let mut linker: Linker<Reports> = Linker::new(&engine);
    linker
        .func_wrap(
            "env",
            "report",
            |mut caller: Caller<'_, Reports>, value: i64, defined: i64| {
                caller.data_mut().push((value, defined));
            },
        )
        .map_err(rejected)?;

    let mut store = Store::new(&engine, Reports::new());
    let instance = linker
        .instantiate_async(&mut store, &module)
        .await
        .map_err(rejected)?;

    let table = instance
        .get_table(&mut store, TABLE_EXPORT)
        .ok_or_else(|| RuntimeError::MissingExport {
            name: TABLE_EXPORT.to_string(),
        })?;
    let entry = table
        .get(&mut store, 0)
        .and_then(|reference| reference.as_func().flatten().copied())
        .ok_or(RuntimeError::MissingEntryPoint)?;
    let entry = entry.typed::<(), ()>(&store).map_err(rejected)?;

    entry.call_async(&mut store, ()).await.map_err(trap)?;

    let reports = store.into_data();
    debug!(reports = reports.len(), "wasm entry point returned");
    collect_bindings(&reports, variables)
}

/// Runs [`run_module`] to completion on a fresh current-thread runtime.
///
/// Callers already inside a tokio runtime get the module run on a scoped
/// helper thread, since `block_on` panics on a thread that drives a runtime.
pub fn run_module_blocking(bytes: &[u8], variables: &VariableTable) -> Result<Bindings> {
    if Handle::try_current().is_err() {
        return block_on_fresh_runtime(bytes, variables);
    }
    debug!("inside an async runtime, running wasm on a helper thread");
    thread::scope(|scope| {
        scope
            .spawn(|| block_on_fresh_runtime(bytes, variables))
            .join()
            .map_err(|_| anyhow!("wasm execution thread panicked"))?
    })
}

fn block_on_fresh_runtime(bytes: &[u8], variables: &VariableTable) -> Result<Bindings> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("failed to start async runtime for wasm execution")?;
    Ok(runtime.block_on(run_module(bytes, variables))?)
}

fn collect_bindings(reports: &[(i64, i64)], variables: &VariableTable) -> RuntimeResult<Bindings> {
    if reports.len() != variables.len() {
        return Err(RuntimeError::ReportMismatch {
            expected: variables.len(),
            found: reports.len(),
        });
    }
    Ok(variables
        .names()
        .zip(reports)
        .filter(|(_, (_, defined))| *defined != 0)
        .map(|(name, (value, _))| (name.to_string(), *value))
        .collect())
}

fn rejected(error: anyhow::Error) -> RuntimeError {
    RuntimeError::ModuleRejected {
        message: format!("{error:#}"),
    }
}

fn trap(error: anyhow::Error) -> RuntimeError {
    match error.downcast_ref::<Trap>() {
        Some(Trap::IntegerDivisionByZero) => RuntimeError::DivisionByZero,
        Some(Trap::IntegerOverflow) => RuntimeError::IntegerOverflow,
        _ => RuntimeError::Trap {
            message: format!("{error:#}"),
        },
    }
}
