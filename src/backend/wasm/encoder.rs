//! Byte-level writer for WebAssembly modules.
//!
//! Every primitive written through [`ModuleWriter`] is recorded as an
//! [`Annotation`], so the finished buffer can be listed back with one line per
//! header field, section id, size, count, name or instruction.

use serde::Serialize;

/// Human-readable label for the primitive starting at `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ModuleWriter {
    bytes: Vec<u8>,
    annotations: Vec<Annotation>,
}

impl ModuleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Appends one primitive. Empty primitives are ignored so offsets stay
    /// strictly increasing.
    pub fn emit(&mut self, bytes: &[u8], text: impl Into<String>) {
        if bytes.is_empty() {
            return;
        }
        self.annotations.push(Annotation {
            offset: self.bytes.len(),
            text: text.into(),
        });
        self.bytes.extend_from_slice(bytes);
    }

    pub fn byte(&mut self, byte: u8, text: impl Into<String>) {
        self.emit(&[byte], text);
    }

    pub fn u32(&mut self, value: u32, text: impl Into<String>) {
        self.emit(&unsigned_leb128(u64::from(value)), text);
    }

    /// Length-prefixed UTF-8 name, annotated as a single primitive.
    pub fn name(&mut self, name: &str) {
        let mut bytes = unsigned_leb128(name.len() as u64);
        bytes.extend_from_slice(name.as_bytes());
        self.emit(&bytes, format!("name \"{name}\""));
    }

    /// Opcode without immediates.
    pub fn op(&mut self, opcode: u8, mnemonic: &str) {
        self.byte(opcode, mnemonic);
    }

    /// Opcode followed by one unsigned immediate (an index or depth).
    pub fn op_u32(&mut self, opcode: u8, immediate: u32, mnemonic: &str) {
        let mut bytes = vec![opcode];
        bytes.extend(unsigned_leb128(u64::from(immediate)));
        self.emit(&bytes, format!("{mnemonic} {immediate}"));
    }

    /// `i64.const` with its signed immediate.
    pub fn i64_const(&mut self, value: i64) {
        let mut bytes = vec![0x42];
        bytes.extend(signed_leb128(value));
        self.emit(&bytes, format!("i64.const {value}"));
    }

    /// Block-introducing opcode with the empty block type.
    pub fn block_op(&mut self, opcode: u8, mnemonic: &str) {
        self.emit(&[opcode, 0x40], mnemonic);
    }

    /// Moves every byte and annotation of `other` to the end of `self`,
    /// shifting its offsets.
    pub fn append(&mut self, other: ModuleWriter) {
        let base = self.bytes.len();
        self.annotations
            .extend(other.annotations.into_iter().map(|annotation| Annotation {
                offset: annotation.offset + base,
                text: annotation.text,
            }));
        self.bytes.extend(other.bytes);
    }

    /// Writes `id`, the byte size of `contents`, then `contents`.
    pub fn section(&mut self, id: u8, name: &str, contents: ModuleWriter) {
        self.byte(id, format!("section {name} (id {id})"));
        self.u32(contents.len() as u32, format!("section size {}", contents.len()));
        self.append(contents);
    }

    pub fn finish(self) -> (Vec<u8>, Vec<Annotation>) {
        (self.bytes, self.annotations)
    }
}

pub fn unsigned_leb128(mut value: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            bytes.push(byte);
            return bytes;
        }
        bytes.push(byte | 0x80);
    }
}

pub fn signed_leb128(mut value: i64) -> Vec<u8> {
    let mut bytes = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        // Arithmetic shift keeps the sign bits.
        value >>= 7;
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            bytes.push(byte);
            return bytes;
        }
        bytes.push(byte | 0x80);
    }
}
