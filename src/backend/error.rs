use thiserror::Error;

/// Failures raised while executing a program, shared by every backend so the
/// same program fails with the same message regardless of how it runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in division")]
    IntegerOverflow,
    #[error("Stack underflow at instruction {ip}")]
    StackUnderflow { ip: usize },
    #[error("Jump from instruction {from} to {target} is out of range")]
    JumpOutOfRange { from: usize, target: isize },
    #[error("Instruction pointer {ip} ran past the end of the program")]
    InstructionPointerOutOfRange { ip: usize },
    #[error("Module rejected by host: {message}")]
    ModuleRejected { message: String },
    #[error("Module does not export '{name}'")]
    MissingExport { name: String },
    #[error("Module table has no entry point at index 0")]
    MissingEntryPoint,
    #[error("Module reported {found} values for {expected} variables")]
    ReportMismatch { expected: usize, found: usize },
    #[error("Module trapped: {message}")]
    Trap { message: String },
    #[error("{source} at instruction {ip}")]
    AtInstruction {
        ip: usize,
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// The failure itself, with any instruction context peeled off.
    pub fn root(&self) -> &RuntimeError {
        match self {
            RuntimeError::AtInstruction { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
