pub mod ast;
pub mod backend;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod token;
pub mod variables;

#[cfg(test)]
mod harness;
