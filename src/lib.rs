//! Back end for GoxLang: typed scoping, IR generation and a stack VM.
//!
//! ```text
//! Program ──analyze──▶ Checked ──Compiler──▶ ProgramIr ──Vm::execute──▶ output
//! ```
//!
//! Lexing and parsing happen elsewhere; this crate starts from a
//! [`lang::program::Program`].

pub mod bytecode;
pub mod lang;
pub mod pipeline;
pub mod runtime;
pub mod semantic;

pub use pipeline::{Error, compile, run};
