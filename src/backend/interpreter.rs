use anyhow::Result;
use tracing::debug;

use crate::ast::{Expression, HighOperator, LowOperator, Sequence, Statement};
use crate::backend::{Backend, Bindings, PreparedBackend, RuntimeResult, floor_div, truth};

/// AST-walking backend that executes programs directly without compilation.
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Prepared executable program for the tree-walking interpreter.
pub struct PreparedInterpreter {
    program: Sequence,
}

impl PreparedBackend for PreparedInterpreter {
    fn run(&self) -> Result<Bindings> {
        Ok(interpret(&self.program)?)
    }
}

impl Backend for Interpreter {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn prepare(&self, program: &Sequence) -> Result<Box<dyn PreparedBackend>> {
        Ok(Box::new(PreparedInterpreter {
            program: program.clone(),
        }))
    }
}

/// Evaluates `program` from an empty store and returns the final bindings.
pub fn interpret(program: &Sequence) -> RuntimeResult<Bindings> {
    let mut runtime = InterpreterRuntime::default();
    runtime.exec_sequence(program)?;
    debug!(variables = runtime.variables.len(), "interpreter finished");
    Ok(runtime.variables)
}

#[derive(Default)]
struct InterpreterRuntime {
    variables: Bindings,
}

impl InterpreterRuntime {
    fn exec_sequence(&mut self, sequence: &Sequence) -> RuntimeResult<()> {
        for statement in &sequence.statements {
            self.exec_statement(statement)?;
        }
        Ok(())
    }

    fn exec_statement(&mut self, statement: &Statement) -> RuntimeResult<()> {
        match statement {
            Statement::Assignment { name, value } => {
                let value = self.eval_expression(value)?;
                self.variables.insert(name.clone(), value);
            }
            Statement::Skip => {}
            Statement::While { head, body } => {
                while self.eval_expression(head)? != 0 {
                    self.exec_sequence(body)?;
                }
            }
            Statement::If {
                condition,
                consequence,
                alternative,
            } => {
                if self.eval_expression(condition)? != 0 {
                    self.exec_sequence(consequence)?;
                } else {
                    self.exec_sequence(alternative)?;
                }
            }
        }
        Ok(())
    }

    fn eval_expression(&mut self, expr: &Expression) -> RuntimeResult<i64> {
        match expr {
            Expression::Number(value) => Ok(*value),
            Expression::Boolean(value) => Ok(truth(*value)),
            Expression::Identifier(name) => Ok(self.load(name)),
            Expression::Parenthesized(inner) => self.eval_expression(inner),
            Expression::Not(operand) => Ok(truth(self.eval_expression(operand)? == 0)),
            Expression::Comparison { left, op, right } => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                Ok(truth(op.holds(left, right)))
            }
            Expression::BinaryLow { left, op, right } => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                Ok(match op {
                    LowOperator::Add => left.wrapping_add(right),
                    LowOperator::Sub => left.wrapping_sub(right),
                    LowOperator::Or => truth(left != 0 || right != 0),
                })
            }
            Expression::BinaryHigh { left, op, right } => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                match op {
                    HighOperator::Mul => Ok(left.wrapping_mul(right)),
                    HighOperator::Div => floor_div(left, right),
                    HighOperator::And => Ok(truth(left != 0 && right != 0)),
                }
            }
        }
    }

    /// Reading a variable that was never assigned defines it as 0.
    fn load(&mut self, name: &str) -> i64 {
        *self.variables.entry(name.to_string()).or_insert(0)
    }
}
