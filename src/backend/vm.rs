use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ast::Sequence;
use crate::backend::bytecode::{CompiledProgram, Opcode, compile};
use crate::backend::{
    Backend, Bindings, PreparedBackend, RuntimeError, RuntimeResult, floor_div, truth,
};

/// Bytecode backend: compiles to `Opcode`s and runs them on a stack machine.
pub struct VM;

pub struct PreparedVM {
    compiled: CompiledProgram,
}

impl VM {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for VM {
    fn name(&self) -> &'static str {
        "vm"
    }

    fn prepare(&self, program: &Sequence) -> Result<Box<dyn PreparedBackend>> {
        Ok(Box::new(PreparedVM {
            compiled: compile(program),
        }))
    }
}

impl PreparedBackend for PreparedVM {
    fn run(&self) -> Result<Bindings> {
        Ok(run(&self.compiled)?)
    }
}

/// Executes `program` from a fresh machine state and projects the store back
/// to variable names.
pub fn run(program: &CompiledProgram) -> RuntimeResult<Bindings> {
    let mut machine = Machine::default();
    machine.execute(program)?;

    let mut bindings = Bindings::new();
    for (address, value) in machine.store {
        if let Some(name) = program.variables.name(address) {
            bindings.insert(name.to_string(), value);
        }
    }
    debug!(steps = machine.steps, "vm halted");
    Ok(bindings)
}

#[derive(Default)]
struct Machine {
    stack: Vec<i64>,
    store: FxHashMap<usize, i64>,
    ip: usize,
    steps: u64,
}

impl Machine {
    fn execute(&mut self, program: &CompiledProgram) -> RuntimeResult<()> {
        let code = &program.instructions;
        loop {
            let opcode = code
                .get(self.ip)
                .map(|instruction| instruction.opcode)
                .ok_or(RuntimeError::InstructionPointerOutOfRange { ip: self.ip })?;
            trace!(ip = self.ip, %opcode, depth = self.stack.len(), "step");
            self.steps += 1;

            match opcode {
                Opcode::Push(value) => self.stack.push(value),
                Opcode::Fetch(address) => {
                    let value = *self.store.entry(address).or_insert(0);
                    self.stack.push(value);
                }
                Opcode::Store(address) => {
                    let value = self.pop()?;
                    self.store.insert(address, value);
                }
                Opcode::Jmp(offset) => {
                    self.ip = self.jump_target(offset, code.len())?;
                    continue;
                }
                Opcode::Jz(offset) => {
                    if self.pop()? == 0 {
                        self.ip = self.jump_target(offset, code.len())?;
                        continue;
                    }
                }
                Opcode::Add => self.binary(|l, r| Ok(l.wrapping_add(r)))?,
                Opcode::Sub => self.binary(|l, r| Ok(l.wrapping_sub(r)))?,
                Opcode::Mult => self.binary(|l, r| Ok(l.wrapping_mul(r)))?,
                Opcode::Div => self.binary(floor_div)?,
                Opcode::And => self.binary(|l, r| Ok(truth(l != 0 && r != 0)))?,
                Opcode::Or => self.binary(|l, r| Ok(truth(l != 0 || r != 0)))?,
                Opcode::Lt => self.binary(|l, r| Ok(truth(l < r)))?,
                Opcode::Gt => self.binary(|l, r| Ok(truth(l > r)))?,
                Opcode::Le => self.binary(|l, r| Ok(truth(l <= r)))?,
                Opcode::Ge => self.binary(|l, r| Ok(truth(l >= r)))?,
                Opcode::Eq => self.binary(|l, r| Ok(truth(l == r)))?,
                Opcode::Neq => self.binary(|l, r| Ok(truth(l != r)))?,
                Opcode::Neg => {
                    let value = self.pop()?;
                    self.stack.push(truth(value == 0));
                }
                Opcode::Noop => {}
                Opcode::End => return Ok(()),
            }
            self.ip += 1;
        }
    }

    fn pop(&mut self) -> RuntimeResult<i64> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { ip: self.ip })
    }

    /// Left operand is on top of the stack, right operand below it.
    fn binary(&mut self, op: impl FnOnce(i64, i64) -> RuntimeResult<i64>) -> RuntimeResult<()> {
        let left = self.pop()?;
        let right = self.pop()?;
        let ip = self.ip;
        let value = op(left, right).map_err(|source| RuntimeError::AtInstruction {
            ip,
            source: Box::new(source),
        })?;
        self.stack.push(value);
        Ok(())
    }

    fn jump_target(&self, offset: isize, len: usize) -> RuntimeResult<usize> {
        let from = self.ip as isize;
        match from.checked_add(offset) {
            Some(target) if (0..len as isize).contains(&target) => Ok(target as usize),
            _ => Err(RuntimeError::JumpOutOfRange {
                from: self.ip,
                target: from.saturating_add(offset),
            }),
        }
    }
}
