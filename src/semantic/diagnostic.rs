use std::collections::HashMap;

use crate::lang::program::Program;
use crate::semantic::scope::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Name already bound in the innermost scope.
    Redeclaration,
    UnresolvedName,
    TypeMismatch,
    ArityMismatch,
    /// `return` outside a function, or with the wrong shape for its function.
    InvalidReturn,
    /// Non-void function whose body can end without a `return`.
    MissingReturn,
    /// `break` / `continue` outside a loop.
    LoopControl,
    InvalidCast,
    NotCallable,
    NotAVariable,
    ConstAssignment,
    /// Function declared below the global scope.
    MisplacedFunction,
    /// Declaration with neither a type nor an initializer.
    MissingType,
}

/// A single semantic problem. Diagnostics are collected, never raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Aggregated failure of a whole analysis pass.
#[derive(Debug, Clone)]
pub struct SemanticError {
    pub diagnostics: Vec<Diagnostic>,
}

impl std::fmt::Display for SemanticError {
    /// One message per line, in the order they were found.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, d) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for SemanticError {}

/// A program the analyzer accepted.
///
/// Only the analyzer can build one, and the IR generator only takes a
/// `Checked`, so rejected programs never reach generation.
#[derive(Debug)]
pub struct Checked<'a> {
    program: &'a Program,
    functions: HashMap<String, Signature>,
}

impl<'a> Checked<'a> {
    pub(crate) fn new(program: &'a Program, functions: HashMap<String, Signature>) -> Self {
        Self { program, functions }
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn signature(&self, name: &str) -> Option<&Signature> {
        self.functions.get(name)
    }
}

/// Outcome of [`crate::semantic::analyzer::Analyzer::analyze`].
#[derive(Debug)]
pub enum Analysis<'a> {
    Accepted(Checked<'a>),
    Rejected(Vec<Diagnostic>),
}

impl<'a> Analysis<'a> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Analysis::Accepted(_))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Analysis::Accepted(_) => &[],
            Analysis::Rejected(diagnostics) => diagnostics,
        }
    }

    pub fn into_result(self) -> Result<Checked<'a>, SemanticError> {
        match self {
            Analysis::Accepted(checked) => Ok(checked),
            Analysis::Rejected(diagnostics) => Err(SemanticError { diagnostics }),
        }
    }
}
