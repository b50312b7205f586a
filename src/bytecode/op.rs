use crate::lang::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// LABEL - Jump and call targets
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowKind {
    Else,
    EndIf,
    Loop,
    EndLoop,
}

impl FlowKind {
    pub fn prefix(self) -> &'static str {
        match self {
            FlowKind::Else => "ELSE",
            FlowKind::EndIf => "ENDIF",
            FlowKind::Loop => "LOOP",
            FlowKind::EndLoop => "ENDLOOP",
        }
    }
}

/// Target of a `JUMP`, `JUMP_IF_FALSE` or `CALL`, defined by a `LABEL`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// Entry point of a declared function. Prints as `FUNC_<name>`.
    Function(String),

    /// Control-flow label. `id` comes from one counter per generator, so
    /// every flow label in a program is distinct.
    Flow { kind: FlowKind, id: u32 },
}

impl Label {
    pub fn function(name: &str) -> Self {
        Label::Function(name.to_string())
    }

    pub fn flow(kind: FlowKind, id: u32) -> Self {
        Label::Flow { kind, id }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Function(name) => write!(f, "FUNC_{}", name),
            Label::Flow { kind, id } => write!(f, "{}{}", kind.prefix(), id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLabelError(pub String);

impl fmt::Display for ParseLabelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid label '{}'", self.0)
    }
}

impl std::error::Error for ParseLabelError {}

impl FromStr for Label {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix("FUNC_") {
            if name.is_empty() {
                return Err(ParseLabelError(s.to_string()));
            }
            return Ok(Label::Function(name.to_string()));
        }

        // ENDIF / ENDLOOP before their shorter lookalikes
        let kinds = [
            FlowKind::EndLoop,
            FlowKind::EndIf,
            FlowKind::Else,
            FlowKind::Loop,
        ];
        for kind in kinds {
            if let Some(digits) = s.strip_prefix(kind.prefix()) {
                if let Ok(id) = digits.parse::<u32>() {
                    return Ok(Label::Flow { kind, id });
                }
            }
        }

        Err(ParseLabelError(s.to_string()))
    }
}

// =============================================================================
// OP - IR instructions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // literals
    ConstI(i64),
    ConstR(f64),
    ConstB(bool),

    // variables
    LocalGet(String),
    LocalSet(String),
    GlobalGet(String),
    GlobalSet(String),

    // arithmetic (int and float alike, mixed operands promote)
    AddI,
    SubI,
    MulI,
    DivI,
    Neg,
    Pos,

    // logic
    And,
    Or,
    Not,

    // comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // ==========================================================================
    // Control flow - symbolic labels resolved by the VM before execution
    // ==========================================================================
    Jump(Label),

    /// Pop bool from stack, jump if false. If true, continue to next instruction.
    JumpIfFalse(Label),

    /// No-op at runtime; marks a jump or call target.
    Label(Label),

    /// Push a frame and jump to `FUNC_<name>`.
    Call(String),

    /// Pop a frame and resume after its `CALL`. Halts when no frame exists.
    Return,

    // I/O
    Print,

    // linear memory
    Grow,
    PokeI,
    PeekI,
    PokeF,
    PeekF,

    Cast(Type),

    /// Discard the top of stack.
    Pop,

    // Legacy markers. Never emitted; the VM rejects them.
    Break,
    Continue,
}

impl Op {
    /// Upper-case mnemonic used in listings.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::ConstI(_) => "CONSTI",
            Op::ConstR(_) => "CONSTR",
            Op::ConstB(_) => "CONSTB",
            Op::LocalGet(_) => "LOCAL_GET",
            Op::LocalSet(_) => "LOCAL_SET",
            Op::GlobalGet(_) => "GLOBAL_GET",
            Op::GlobalSet(_) => "GLOBAL_SET",
            Op::AddI => "ADDI",
            Op::SubI => "SUBI",
            Op::MulI => "MULI",
            Op::DivI => "DIVI",
            Op::Neg => "NEG",
            Op::Pos => "POS",
            Op::And => "AND",
            Op::Or => "OR",
            Op::Not => "NOT",
            Op::Eq => "EQ",
            Op::Ne => "NE",
            Op::Lt => "LT",
            Op::Gt => "GT",
            Op::Le => "LE",
            Op::Ge => "GE",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Op::Label(_) => "LABEL",
            Op::Call(_) => "CALL",
            Op::Return => "RETURN",
            Op::Print => "PRINT",
            Op::Grow => "GROW",
            Op::PokeI => "POKEI",
            Op::PeekI => "PEEKI",
            Op::PokeF => "POKEF",
            Op::PeekF => "PEEKF",
            Op::Cast(_) => "CAST",
            Op::Pop => "POP",
            Op::Break => "BREAK",
            Op::Continue => "CONTINUE",
        }
    }

    /// Jump target, for `JUMP` and `JUMP_IF_FALSE`.
    pub fn jump_target(&self) -> Option<&Label> {
        match self {
            Op::Jump(label) | Op::JumpIfFalse(label) => Some(label),
            _ => None,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Op::ConstI(n) => write!(f, "{} {}", mnemonic, n),
            Op::ConstR(n) => write!(f, "{} {:?}", mnemonic, n),
            Op::ConstB(b) => write!(f, "{} {}", mnemonic, b),
            Op::LocalGet(name)
            | Op::LocalSet(name)
            | Op::GlobalGet(name)
            | Op::GlobalSet(name)
            | Op::Call(name) => write!(f, "{} {}", mnemonic, name),
            Op::Jump(label) | Op::JumpIfFalse(label) | Op::Label(label) => {
                write!(f, "{} {}", mnemonic, label)
            }
            Op::Cast(ty) => write!(f, "{} {}", mnemonic, ty),
            _ => f.write_str(mnemonic),
        }
    }
}
