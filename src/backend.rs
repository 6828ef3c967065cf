use std::collections::BTreeMap;

use anyhow::Result;

use crate::ast::Sequence;

pub mod bytecode;
pub mod error;
pub mod interpreter;
pub mod vm;
pub mod wasm;

pub use error::{RuntimeError, RuntimeResult};

/// Final variable values after a run: one entry per variable that was
/// assigned or read. The ordering is only there to make output stable.
pub type Bindings = BTreeMap<String, i64>;

/// Executable artifact produced by a backend `prepare` step.
///
/// This keeps compilation and execution separated so benchmarks and tests can
/// measure/validate prepare-vs-run phases independently. Every `run` starts
/// from fresh state.
pub trait PreparedBackend {
    fn run(&self) -> Result<Bindings>;
}

/// Common interface implemented by each execution backend.
///
/// `prepare` translates AST into backend-owned executable state, while `run`
/// offers the convenience path for one-shot execution.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn prepare(&self, program: &Sequence) -> Result<Box<dyn PreparedBackend>>;

    fn run(&self, program: &Sequence) -> Result<Bindings> {
        self.prepare(program)?.run()
    }
}

pub fn backends() -> Vec<Box<dyn Backend>> {
    vec![
        Box::new(interpreter::Interpreter::new()),
        Box::new(vm::VM::new()),
        Box::new(wasm::Wasm::new()),
    ]
}

/// Truth values are plain integers: 1 for true, 0 for false.
pub(crate) fn truth(value: bool) -> i64 {
    i64::from(value)
}

/// Division rounding toward negative infinity.
pub(crate) fn floor_div(left: i64, right: i64) -> RuntimeResult<i64> {
    if right == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    let quotient = left
        .checked_div(right)
        .ok_or(RuntimeError::IntegerOverflow)?;
    if left % right != 0 && (left ^ right) < 0 {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}
