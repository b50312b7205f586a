//! Analyze, generate and run in one call.

use std::io::Write;

use tracing::debug;

use crate::bytecode::{CompileError, Compiler, ProgramIr};
use crate::lang::program::Program;
use crate::runtime::{RuntimeError, Vm};
use crate::semantic::{SemanticError, analyze};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Analyze `program` and lower it to IR.
pub fn compile(program: &Program) -> Result<ProgramIr, Error> {
    let checked = analyze(program).into_result()?;
    let ir = Compiler::new().compile_program(&checked)?;
    Ok(ir)
}

/// Compile `program` and execute it on `vm`.
///
/// The VM keeps its final state for inspection afterwards.
pub fn run<W: Write>(program: &Program, vm: &mut Vm<W>) -> Result<ProgramIr, Error> {
    let ir = compile(program)?;
    vm.execute(&ir)?;
    debug!(frames = vm.frame_depth(), stack = vm.stack().len(), "program finished");
    Ok(ir)
}
