//! # GoxLang syntax tree and value model
//!
//! This module defines the Abstract Syntax Tree (AST) handed over by the
//! front end, the static [`types::Type`] lattice shared by the analyzer and
//! the IR, and the runtime [`value::Value`] that lives on the VM stack.
//!
//! ## Documentation conventions
//!
//! - Source snippets use GoxLang surface syntax: `var x int = 1;`.
//! - `` `expr `` denotes a dereference of linear memory at address `expr`.

pub mod node;
pub mod program;
pub mod types;
pub mod value;
