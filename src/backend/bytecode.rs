use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::ast::{Comparator, Expression, HighOperator, LowOperator, Sequence, Statement};
use crate::variables::VariableTable;

/// Stack machine operation. Jump offsets are relative to the jump's own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "arg", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    Push(i64),
    Fetch(usize),
    Store(usize),
    Jmp(isize),
    Jz(isize),
    Add,
    Sub,
    Mult,
    Div,
    And,
    Or,
    Neg,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Neq,
    Noop,
    End,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Push(_) => "PUSH",
            Opcode::Fetch(_) => "FETCH",
            Opcode::Store(_) => "STORE",
            Opcode::Jmp(_) => "JMP",
            Opcode::Jz(_) => "JZ",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mult => "MULT",
            Opcode::Div => "DIV",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Neg => "NEG",
            Opcode::Lt => "LT",
            Opcode::Gt => "GT",
            Opcode::Le => "LE",
            Opcode::Ge => "GE",
            Opcode::Eq => "EQ",
            Opcode::Neq => "NEQ",
            Opcode::Noop => "NOOP",
            Opcode::End => "END",
        }
    }

    /// Relative offset for jump opcodes.
    pub fn jump_offset(self) -> Option<isize> {
        match self {
            Opcode::Jmp(offset) | Opcode::Jz(offset) => Some(offset),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Push(value) => write!(f, "{} {value}", self.mnemonic()),
            Opcode::Fetch(address) | Opcode::Store(address) => {
                write!(f, "{} {address}", self.mnemonic())
            }
            Opcode::Jmp(offset) | Opcode::Jz(offset) => write!(f, "{} {offset:+}", self.mnemonic()),
            _ => f.write_str(self.mnemonic()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub annotation: Option<String>,
}

impl Instruction {
    fn plain(opcode: Opcode) -> Self {
        Self {
            opcode,
            annotation: None,
        }
    }

    fn annotated(opcode: Opcode, annotation: impl Into<String>) -> Self {
        Self {
            opcode,
            annotation: Some(annotation.into()),
        }
    }
}

type CompiledBlock = Vec<Instruction>;

/// Bytecode for a whole program together with the variable numbering it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledProgram {
    pub instructions: Vec<Instruction>,
    pub variables: VariableTable,
}

impl CompiledProgram {
    /// One line per instruction: index, opcode with argument, annotation.
    pub fn listing(&self) -> Vec<String> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| {
                let opcode = instruction.opcode.to_string();
                match &instruction.annotation {
                    Some(annotation) => format!("{index:>4}  {opcode:<12} ; {annotation}"),
                    None => format!("{index:>4}  {opcode}"),
                }
            })
            .collect()
    }
}

impl fmt::Display for CompiledProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.listing() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

pub fn compile(program: &Sequence) -> CompiledProgram {
    let mut compiler = Compiler::default();
    let mut instructions = compiler.compile_sequence(program);
    instructions.push(Instruction::plain(Opcode::End));
    annotate_jump_targets(&mut instructions);

    debug!(
        instructions = instructions.len(),
        variables = compiler.variables.len(),
        "compiled bytecode"
    );
    CompiledProgram {
        instructions,
        variables: compiler.variables,
    }
}

/// Absolute targets are only known once every block has been concatenated.
fn annotate_jump_targets(instructions: &mut [Instruction]) {
    for (index, instruction) in instructions.iter_mut().enumerate() {
        if let Some(offset) = instruction.opcode.jump_offset() {
            let target = index as isize + offset;
            instruction.annotation = Some(format!("-> {target}"));
        }
    }
}

#[derive(Default)]
struct Compiler {
    variables: VariableTable,
}

impl Compiler {
    fn compile_sequence(&mut self, sequence: &Sequence) -> CompiledBlock {
        let mut code = Vec::new();
        for statement in &sequence.statements {
            code.extend(self.compile_statement(statement));
        }
        code
    }

    fn compile_statement(&mut self, statement: &Statement) -> CompiledBlock {
        let mut code = Vec::new();
        match statement {
            Statement::Assignment { name, value } => {
                code.extend(self.compile_expression(value));
                let address = self.variables.address_of(name);
                code.push(Instruction::annotated(Opcode::Store(address), name));
            }
            Statement::Skip => code.push(Instruction::plain(Opcode::Noop)),
            Statement::While { head, body } => {
                let head_code = self.compile_expression(head);
                let body_code = self.compile_sequence(body);
                let head_len = head_code.len() as isize;
                let body_len = body_code.len() as isize;

                code.extend(head_code);
                code.push(Instruction::plain(Opcode::Jz(body_len + 2)));
                code.extend(body_code);
                code.push(Instruction::plain(Opcode::Jmp(-(body_len + head_len + 1))));
            }
            Statement::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition_code = self.compile_expression(condition);
                let then_code = self.compile_sequence(consequence);
                let else_code = self.compile_sequence(alternative);
                let then_len = then_code.len() as isize;
                let else_len = else_code.len() as isize;

                code.extend(condition_code);
                code.push(Instruction::plain(Opcode::Jz(then_len + 2)));
                code.extend(then_code);
                code.push(Instruction::plain(Opcode::Jmp(else_len + 1)));
                code.extend(else_code);
            }
        }
        code
    }

    fn compile_expression(&mut self, expr: &Expression) -> CompiledBlock {
        let mut code = Vec::new();
        match expr {
            Expression::Number(value) => code.push(Instruction::plain(Opcode::Push(*value))),
            Expression::Boolean(value) => {
                code.push(Instruction::plain(Opcode::Push(i64::from(*value))))
            }
            Expression::Identifier(name) => {
                let address = self.variables.address_of(name);
                code.push(Instruction::annotated(Opcode::Fetch(address), name));
            }
            Expression::Parenthesized(inner) => code.extend(self.compile_expression(inner)),
            Expression::Not(operand) => {
                code.extend(self.compile_expression(operand));
                code.push(Instruction::plain(Opcode::Neg));
            }
            Expression::Comparison { left, op, right } => {
                code.extend(self.compile_binary(left, right));
                code.push(Instruction::plain(comparison_opcode(*op)));
            }
            Expression::BinaryLow { left, op, right } => {
                code.extend(self.compile_binary(left, right));
                code.push(Instruction::plain(match op {
                    LowOperator::Add => Opcode::Add,
                    LowOperator::Sub => Opcode::Sub,
                    LowOperator::Or => Opcode::Or,
                }));
            }
            Expression::BinaryHigh { left, op, right } => {
                code.extend(self.compile_binary(left, right));
                code.push(Instruction::plain(match op {
                    HighOperator::Mul => Opcode::Mult,
                    HighOperator::Div => Opcode::Div,
                    HighOperator::And => Opcode::And,
                }));
            }
        }
        code
    }

    /// Right operand first so the left one ends up on top of the stack.
    fn compile_binary(&mut self, left: &Expression, right: &Expression) -> CompiledBlock {
        let mut code = self.compile_expression(right);
        code.extend(self.compile_expression(left));
        code
    }
}

fn comparison_opcode(op: Comparator) -> Opcode {
    match op {
        Comparator::LessEqual => Opcode::Le,
        Comparator::GreaterEqual => Opcode::Ge,
        Comparator::NotEqual => Opcode::Neq,
        Comparator::Less => Opcode::Lt,
        Comparator::Greater => Opcode::Gt,
        Comparator::Equal => Opcode::Eq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn opcodes(source: &str) -> Vec<Opcode> {
        let program = compile(&parse(source).expect("parse failed"));
        program
            .instructions
            .iter()
            .map(|instruction| instruction.opcode)
            .collect()
    }

    #[test]
    fn emits_right_operand_before_left() {
        assert_eq!(
            opcodes("x := 3 - y"),
            vec![
                Opcode::Fetch(1),
                Opcode::Push(3),
                Opcode::Sub,
                Opcode::Store(0),
                Opcode::End,
            ]
        );
    }

    #[test]
    fn lowers_while_with_relative_jumps() {
        assert_eq!(
            opcodes("while x < 3 do x := x + 1 end"),
            vec![
                Opcode::Push(3),
                Opcode::Fetch(0),
                Opcode::Lt,
                Opcode::Jz(6),
                Opcode::Push(1),
                Opcode::Fetch(0),
                Opcode::Add,
                Opcode::Store(0),
                Opcode::Jmp(-8),
                Opcode::End,
            ]
        );
    }

    #[test]
    fn lowers_if_with_synthesized_else() {
        assert_eq!(
            opcodes("if 1 then a := 1 end"),
            vec![
                Opcode::Push(1),
                Opcode::Jz(4),
                Opcode::Push(1),
                Opcode::Store(0),
                Opcode::Jmp(2),
                Opcode::Noop,
                Opcode::End,
            ]
        );
    }

    #[test]
    fn annotates_names_and_absolute_jump_targets() {
        let program = compile(&parse("while x < 3 do x := x + 1 end").expect("parse failed"));
        let annotations = program
            .instructions
            .iter()
            .map(|instruction| instruction.annotation.as_deref())
            .collect::<Vec<_>>();
        assert_eq!(
            annotations,
            vec![
                None,
                Some("x"),
                None,
                Some("-> 9"),
                None,
                Some("x"),
                None,
                Some("x"),
                Some("-> 0"),
                None,
            ]
        );
    }

    #[test]
    fn every_jump_lands_inside_the_program() {
        let program = compile(
            &parse("while a < 2 do if a = 0 then b := 1 else while b < 4 do b := b + 1 end end; a := a + 1 end")
                .expect("parse failed"),
        );
        let len = program.instructions.len() as isize;
        for (index, instruction) in program.instructions.iter().enumerate() {
            if let Some(offset) = instruction.opcode.jump_offset() {
                let target = index as isize + offset;
                assert!((0..len).contains(&target), "jump at {index} lands on {target}");
            }
        }
        assert_eq!(program.instructions.last().map(|i| i.opcode), Some(Opcode::End));
    }

    #[test]
    fn listing_renders_one_line_per_instruction() {
        let program = compile(&parse("x := !true").expect("parse failed"));
        assert_eq!(
            program.listing(),
            vec![
                "   0  PUSH 1".to_string(),
                "   1  NEG".to_string(),
                "   2  STORE 0      ; x".to_string(),
                "   3  END".to_string(),
            ]
        );
    }
}
