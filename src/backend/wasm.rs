use anyhow::Result;

use crate::ast::Sequence;
use crate::backend::{Backend, Bindings, PreparedBackend};

pub mod codegen;
pub mod encoder;
pub mod runtime;

pub use codegen::{CompiledModule, compile_module};
pub use encoder::Annotation;
pub use runtime::{run_module, run_module_blocking};

/// Backend that compiles to a WebAssembly module and runs it under wasmtime.
pub struct Wasm;

pub struct PreparedWasm {
    module: CompiledModule,
}

impl Wasm {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Wasm {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Wasm {
    fn name(&self) -> &'static str {
        "wasm"
    }

    fn prepare(&self, program: &Sequence) -> Result<Box<dyn PreparedBackend>> {
        Ok(Box::new(PreparedWasm {
            module: compile_module(program),
        }))
    }
}

impl PreparedBackend for PreparedWasm {
    fn run(&self) -> Result<Bindings> {
        run_module_blocking(&self.module.bytes, &self.module.variables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[tokio::test]
    async fn runs_from_async_callers() -> Result<()> {
        let program = parse("x := 1; while x < 100 do x := x * 3 end")?;
        let bindings = Wasm::new().run(&program)?;
        assert_eq!(bindings.get("x"), Some(&243));
        Ok(())
    }
}
