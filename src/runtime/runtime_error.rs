use thiserror::Error;

/// What went wrong. Every fault terminates the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    #[error("unresolved label '{0}'")]
    UnresolvedLabel(String),

    #[error("label '{label}' defined twice (instructions {first} and {second})")]
    DuplicateLabel {
        label: String,
        first: usize,
        second: usize,
    },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack size limit exceeded ({0})")]
    StackOverflow(usize),

    #[error("unsupported opcode {0}")]
    UnsupportedOpcode(String),

    #[error("cannot cast {from} to {to}")]
    UnsupportedCast { from: String, to: String },

    #[error("memory access out of bounds: {len} bytes at address {addr}, memory size {size}")]
    OutOfBounds { addr: i64, len: usize, size: usize },

    #[error("invalid memory growth by {0} bytes")]
    InvalidGrow(i64),

    #[error("type error: expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("call depth limit exceeded ({0}) - possible infinite recursion")]
    CallDepthExceeded(usize),

    #[error("execution step limit exceeded ({0})")]
    StepLimitExceeded(usize),

    #[error("cannot write output: {0}")]
    Output(String),
}

/// A fault together with where it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub fault: Fault,
    /// Index of the faulting instruction, if execution had started.
    pub pc: Option<usize>,
    /// Listing form of the faulting instruction.
    pub op: Option<String>,
    /// Active functions, outermost first.
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.fault)?;

        if let (Some(pc), Some(op)) = (self.pc, &self.op) {
            write!(f, "\n  at {:04}: {}", pc, op)?;
        }

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.fault)
    }
}

impl RuntimeError {
    pub fn new(fault: Fault) -> Self {
        RuntimeError {
            fault,
            pc: None,
            op: None,
            call_stack: Vec::new(),
        }
    }

    pub fn at(mut self, pc: usize, op: impl std::fmt::Display) -> Self {
        self.pc = Some(pc);
        self.op = Some(op.to_string());
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}

impl From<Fault> for RuntimeError {
    fn from(fault: Fault) -> Self {
        RuntimeError::new(fault)
    }
}
