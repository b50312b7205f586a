//! Typed scoping for GoxLang.
//!
//! The analyzer walks a [`Program`](crate::lang::program::Program) once,
//! depth first, and collects every scope and type problem instead of stopping
//! at the first one. The result is an [`Analysis`]: either a [`Checked`]
//! program ready for IR generation, or the full list of diagnostics.

pub mod analyzer;
pub mod diagnostic;
pub mod scope;

pub use analyzer::{Analyzer, analyze};
pub use diagnostic::{Analysis, Checked, Diagnostic, DiagnosticKind, SemanticError};
pub use scope::{ScopeStack, Signature, SymbolInfo};
