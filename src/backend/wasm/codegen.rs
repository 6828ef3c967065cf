use serde::Serialize;
use tracing::debug;

use super::encoder::{Annotation, ModuleWriter};
use crate::ast::{Comparator, Expression, HighOperator, LowOperator, Sequence, Statement};
use crate::variables::VariableTable;

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_TABLE: u8 = 4;
const SECTION_EXPORT: u8 = 7;
const SECTION_ELEMENT: u8 = 9;
const SECTION_CODE: u8 = 10;

const I64: u8 = 0x7e;
const FUNCREF: u8 = 0x70;
const FUNC_TYPE: u8 = 0x60;

/// Function index of the imported `env.report` hook.
const REPORT_FUNCTION: u32 = 0;
/// Function index of the program body.
const ENTRY_FUNCTION: u32 = 1;

/// Scratch locals used by the floor division sequence.
const SCRATCH_LEFT: u32 = 0;
const SCRATCH_RIGHT: u32 = 1;
const FIRST_VARIABLE_LOCAL: u32 = 2;

pub const TABLE_EXPORT: &str = "table";

mod op {
    pub const NOP: u8 = 0x01;
    pub const BLOCK: u8 = 0x02;
    pub const LOOP: u8 = 0x03;
    pub const IF: u8 = 0x04;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0b;
    pub const BR: u8 = 0x0c;
    pub const BR_IF: u8 = 0x0d;
    pub const CALL: u8 = 0x10;
    pub const LOCAL_GET: u8 = 0x20;
    pub const LOCAL_SET: u8 = 0x21;
    pub const I32_CONST: u8 = 0x41;
    pub const I32_EQZ: u8 = 0x45;
    pub const I64_EQZ: u8 = 0x50;
    pub const I64_EQ: u8 = 0x51;
    pub const I64_NE: u8 = 0x52;
    pub const I64_LT_S: u8 = 0x53;
    pub const I64_GT_S: u8 = 0x55;
    pub const I64_LE_S: u8 = 0x57;
    pub const I64_GE_S: u8 = 0x59;
    pub const I32_AND: u8 = 0x71;
    pub const I32_OR: u8 = 0x72;
    pub const I64_ADD: u8 = 0x7c;
    pub const I64_SUB: u8 = 0x7d;
    pub const I64_MUL: u8 = 0x7e;
    pub const I64_DIV_S: u8 = 0x7f;
    pub const I64_REM_S: u8 = 0x81;
    pub const I64_XOR: u8 = 0x85;
    pub const I64_EXTEND_I32_U: u8 = 0xad;
}

/// A finished WebAssembly module plus the metadata needed to list it and to
/// map its reports back to variable names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledModule {
    pub bytes: Vec<u8>,
    pub annotations: Vec<Annotation>,
    pub variables: VariableTable,
}

impl CompiledModule {
    /// `(offset, bytes, text)` for every annotated primitive, in buffer order.
    pub fn disassembly(&self) -> Vec<(usize, &[u8], &str)> {
        self.annotations
            .iter()
            .enumerate()
            .map(|(index, annotation)| {
                let end = self
                    .annotations
                    .get(index + 1)
                    .map_or(self.bytes.len(), |next| next.offset);
                (
                    annotation.offset,
                    &self.bytes[annotation.offset..end],
                    annotation.text.as_str(),
                )
            })
            .collect()
    }

    pub fn listing(&self) -> Vec<String> {
        self.disassembly()
            .into_iter()
            .map(|(offset, bytes, text)| {
                let hex = bytes
                    .iter()
                    .map(|byte| format!("{byte:02x}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{offset:06x}  {hex:<30} {text}")
            })
            .collect()
    }
}

pub fn compile_module(program: &Sequence) -> CompiledModule {
    let mut codegen = Codegen::default();
    let mut body = ModuleWriter::new();
    codegen.sequence(&mut body, program);
    codegen.report_variables(&mut body);
    body.op(op::END, "end");

    let mut module = ModuleWriter::new();
    module.emit(&MAGIC, "magic \\0asm");
    module.emit(&VERSION, "version 1");
    module.section(SECTION_TYPE, "type", type_section());
    module.section(SECTION_IMPORT, "import", import_section());
    module.section(SECTION_FUNCTION, "function", function_section());
    module.section(SECTION_TABLE, "table", table_section());
    module.section(SECTION_EXPORT, "export", export_section());
    module.section(SECTION_ELEMENT, "element", element_section());
    module.section(
        SECTION_CODE,
        "code",
        code_section(codegen.variables.len(), body),
    );

    let (bytes, annotations) = module.finish();
    debug!(
        bytes = bytes.len(),
        variables = codegen.variables.len(),
        "compiled wasm module"
    );
    CompiledModule {
        bytes,
        annotations,
        variables: codegen.variables,
    }
}

fn type_section() -> ModuleWriter {
    let mut w = ModuleWriter::new();
    w.u32(2, "type count 2");
    w.byte(FUNC_TYPE, "type 0: func");
    w.u32(2, "param count 2");
    w.byte(I64, "param i64 (value)");
    w.byte(I64, "param i64 (defined)");
    w.u32(0, "result count 0");
    w.byte(FUNC_TYPE, "type 1: func");
    w.u32(0, "param count 0");
    w.u32(0, "result count 0");
    w
}

fn import_section() -> ModuleWriter {
    let mut w = ModuleWriter::new();
    w.u32(1, "import count 1");
    w.name("env");
    w.name("report");
    w.byte(0x00, "import kind func");
    w.u32(0, "type index 0");
    w
}

fn function_section() -> ModuleWriter {
    let mut w = ModuleWriter::new();
    w.u32(1, "function count 1");
    w.u32(1, "function 1: type index 1");
    w
}

fn table_section() -> ModuleWriter {
    let mut w = ModuleWriter::new();
    w.u32(1, "table count 1");
    w.byte(FUNCREF, "funcref");
    w.byte(0x01, "limits min and max");
    w.u32(1, "min 1");
    w.u32(1, "max 1");
    w
}

fn export_section() -> ModuleWriter {
    let mut w = ModuleWriter::new();
    w.u32(1, "export count 1");
    w.name(TABLE_EXPORT);
    w.byte(0x01, "export kind table");
    w.u32(0, "table index 0");
    w
}

fn element_section() -> ModuleWriter {
    let mut w = ModuleWriter::new();
    w.u32(1, "segment count 1");
    w.u32(0, "segment flags 0 (active, table 0)");
    w.op_u32(op::I32_CONST, 0, "i32.const");
    w.op(op::END, "end");
    w.u32(1, "function count 1");
    w.u32(ENTRY_FUNCTION, "function index 1");
    w
}

fn code_section(variables: usize, body: ModuleWriter) -> ModuleWriter {
    let locals = FIRST_VARIABLE_LOCAL + 2 * variables as u32;
    let mut entry = ModuleWriter::new();
    entry.u32(1, "local group count 1");
    entry.u32(locals, format!("local count {locals}"));
    entry.byte(I64, "local type i64");
    entry.append(body);

    let mut w = ModuleWriter::new();
    w.u32(1, "body count 1");
    w.u32(entry.len() as u32, format!("body size {}", entry.len()));
    w.append(entry);
    w
}

#[derive(Default)]
struct Codegen {
    variables: VariableTable,
}

impl Codegen {
    /// Value local and defined-flag local of `name`.
    fn locals_of(&mut self, name: &str) -> (u32, u32) {
        let index = self.variables.address_of(name) as u32;
        let value = FIRST_VARIABLE_LOCAL + 2 * index;
        (value, value + 1)
    }

    fn mark_defined(&self, w: &mut ModuleWriter, flag: u32) {
        w.i64_const(1);
        w.op_u32(op::LOCAL_SET, flag, "local.set");
    }

    fn sequence(&mut self, w: &mut ModuleWriter, sequence: &Sequence) {
        for statement in &sequence.statements {
            self.statement(w, statement);
        }
    }

    fn statement(&mut self, w: &mut ModuleWriter, statement: &Statement) {
        match statement {
            Statement::Assignment { name, value } => {
                self.expression(w, value);
                let (local, flag) = self.locals_of(name);
                w.op_u32(op::LOCAL_SET, local, "local.set");
                self.mark_defined(w, flag);
            }
            Statement::Skip => w.op(op::NOP, "nop"),
            Statement::While { head, body } => {
                w.block_op(op::BLOCK, "block");
                w.block_op(op::LOOP, "loop");
                self.expression(w, head);
                w.op(op::I64_EQZ, "i64.eqz");
                w.op_u32(op::BR_IF, 1, "br_if");
                self.sequence(w, body);
                w.op_u32(op::BR, 0, "br");
                w.op(op::END, "end");
                w.op(op::END, "end");
            }
            Statement::If {
                condition,
                consequence,
                alternative,
            } => {
                self.expression(w, condition);
                w.op(op::I64_EQZ, "i64.eqz");
                w.op(op::I32_EQZ, "i32.eqz");
                w.block_op(op::IF, "if");
                self.sequence(w, consequence);
                w.op(op::ELSE, "else");
                self.sequence(w, alternative);
                w.op(op::END, "end");
            }
        }
    }

    fn expression(&mut self, w: &mut ModuleWriter, expr: &Expression) {
        match expr {
            Expression::Number(value) => w.i64_const(*value),
            Expression::Boolean(value) => w.i64_const(i64::from(*value)),
            Expression::Identifier(name) => {
                let (local, flag) = self.locals_of(name);
                self.mark_defined(w, flag);
                w.op_u32(op::LOCAL_GET, local, "local.get");
            }
            Expression::Parenthesized(inner) => self.expression(w, inner),
            Expression::Not(operand) => {
                self.expression(w, operand);
                w.op(op::I64_EQZ, "i64.eqz");
                widen(w);
            }
            Expression::Comparison { left, op, right } => {
                self.expression(w, left);
                self.expression(w, right);
                let (opcode, mnemonic) = comparison(*op);
                w.op(opcode, mnemonic);
                widen(w);
            }
            Expression::BinaryLow { left, op, right } => match op {
                LowOperator::Add => self.arithmetic(w, left, right, op::I64_ADD, "i64.add"),
                LowOperator::Sub => self.arithmetic(w, left, right, op::I64_SUB, "i64.sub"),
                LowOperator::Or => {
                    self.expression(w, left);
                    w.op(op::I64_EQZ, "i64.eqz");
                    self.expression(w, right);
                    w.op(op::I64_EQZ, "i64.eqz");
                    w.op(op::I32_AND, "i32.and");
                    w.op(op::I32_EQZ, "i32.eqz");
                    widen(w);
                }
            },
            Expression::BinaryHigh { left, op, right } => match op {
                HighOperator::Mul => self.arithmetic(w, left, right, op::I64_MUL, "i64.mul"),
                HighOperator::Div => {
                    self.expression(w, left);
                    self.expression(w, right);
                    floor_division(w);
                }
                HighOperator::And => {
                    self.expression(w, left);
                    w.op(op::I64_EQZ, "i64.eqz");
                    self.expression(w, right);
                    w.op(op::I64_EQZ, "i64.eqz");
                    w.op(op::I32_OR, "i32.or");
                    w.op(op::I32_EQZ, "i32.eqz");
                    widen(w);
                }
            },
        }
    }

    fn arithmetic(
        &mut self,
        w: &mut ModuleWriter,
        left: &Expression,
        right: &Expression,
        opcode: u8,
        mnemonic: &str,
    ) {
        self.expression(w, left);
        self.expression(w, right);
        w.op(opcode, mnemonic);
    }

    /// Passes every variable and its defined flag to the host, in table order.
    fn report_variables(&self, w: &mut ModuleWriter) {
        for index in 0..self.variables.len() as u32 {
            let local = FIRST_VARIABLE_LOCAL + 2 * index;
            w.op_u32(op::LOCAL_GET, local, "local.get");
            w.op_u32(op::LOCAL_GET, local + 1, "local.get");
            w.op_u32(op::CALL, REPORT_FUNCTION, "call");
        }
    }
}

fn widen(w: &mut ModuleWriter) {
    w.op(op::I64_EXTEND_I32_U, "i64.extend_i32_u");
}

/// `q - ((l rem r != 0) & ((l xor r) < 0))` with `q = l div_s r`.
fn floor_division(w: &mut ModuleWriter) {
    w.op_u32(op::LOCAL_SET, SCRATCH_RIGHT, "local.set");
    w.op_u32(op::LOCAL_SET, SCRATCH_LEFT, "local.set");

    w.op_u32(op::LOCAL_GET, SCRATCH_LEFT, "local.get");
    w.op_u32(op::LOCAL_GET, SCRATCH_RIGHT, "local.get");
    w.op(op::I64_DIV_S, "i64.div_s");

    w.op_u32(op::LOCAL_GET, SCRATCH_LEFT, "local.get");
    w.op_u32(op::LOCAL_GET, SCRATCH_RIGHT, "local.get");
    w.op(op::I64_REM_S, "i64.rem_s");
    w.i64_const(0);
    w.op(op::I64_NE, "i64.ne");

    w.op_u32(op::LOCAL_GET, SCRATCH_LEFT, "local.get");
    w.op_u32(op::LOCAL_GET, SCRATCH_RIGHT, "local.get");
    w.op(op::I64_XOR, "i64.xor");
    w.i64_const(0);
    w.op(op::I64_LT_S, "i64.lt_s");

    w.op(op::I32_AND, "i32.and");
    widen(w);
    w.op(op::I64_SUB, "i64.sub");
}

fn comparison(op: Comparator) -> (u8, &'static str) {
    match op {
        Comparator::Equal => (op::I64_EQ, "i64.eq"),
        Comparator::NotEqual => (op::I64_NE, "i64.ne"),
        Comparator::Less => (op::I64_LT_S, "i64.lt_s"),
        Comparator::Greater => (op::I64_GT_S, "i64.gt_s"),
        Comparator::LessEqual => (op::I64_LE_S, "i64.le_s"),
        Comparator::GreaterEqual => (op::I64_GE_S, "i64.ge_s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn module(source: &str) -> CompiledModule {
        compile_module(&parse(source).expect("parse failed"))
    }

    #[test]
    fn starts_with_header_and_type_section() {
        let compiled = module("x := 1");
        assert_eq!(
            &compiled.bytes[..8],
            &[0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            &compiled.bytes[8..20],
            &[1, 9, 2, 0x60, 2, 0x7e, 0x7e, 0, 0x60, 0, 0, 2]
        );
    }

    #[test]
    fn section_ids_appear_in_order() {
        let compiled = module("x := 1");
        let ids = compiled
            .annotations
            .iter()
            .filter(|annotation| annotation.text.contains("(id "))
            .map(|annotation| compiled.bytes[annotation.offset])
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3, 4, 7, 9, 10]);
    }

    #[test]
    fn annotations_cover_the_buffer() {
        let compiled = module("a := 7 / 2; while a > 0 do a := a - 1 end; if !a then b := 1 end");
        assert_eq!(compiled.annotations.first().map(|a| a.offset), Some(0));
        for pair in compiled.annotations.windows(2) {
            assert!(pair[0].offset < pair[1].offset);
        }
        let covered: usize = compiled
            .disassembly()
            .iter()
            .map(|(_, bytes, _)| bytes.len())
            .sum();
        assert_eq!(covered, compiled.bytes.len());
    }

    #[test]
    fn allocates_two_locals_per_variable_plus_scratch() {
        let compiled = module("a := b + c");
        assert_eq!(compiled.variables.names().collect::<Vec<_>>(), vec!["b", "c", "a"]);
        let locals = compiled
            .disassembly()
            .into_iter()
            .find(|(_, _, text)| text.starts_with("local count"))
            .map(|(_, bytes, _)| bytes.to_vec());
        assert_eq!(locals, Some(vec![8]));
    }

    #[test]
    fn compilation_is_deterministic() {
        let source = "x := 9223372036854775807 * 2; while x < 0 do x := x + 1000000 end";
        assert_eq!(module(source), module(source));
    }

    #[test]
    fn reports_every_variable_before_returning() {
        let compiled = module("x := 1; y := x");
        let tail = compiled
            .disassembly()
            .iter()
            .rev()
            .take(7)
            .map(|(_, _, text)| text.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            tail,
            vec![
                "end",
                "call 0",
                "local.get 5",
                "local.get 4",
                "call 0",
                "local.get 3",
                "local.get 2",
            ]
        );
    }
}
