use crate::bytecode::Op;
use serde::{Deserialize, Serialize};

/// A generated IR program: one flat instruction stream.
///
/// Convention: top-level code comes first and ends with a `RETURN`, function
/// bodies follow, each starting at its `LABEL FUNC_<name>`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgramIr {
    pub code: Vec<Op>,
}

impl ProgramIr {
    pub fn new(code: Vec<Op>) -> Self {
        Self { code }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Compact binary encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

impl From<Vec<Op>> for ProgramIr {
    fn from(code: Vec<Op>) -> Self {
        Self { code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::{FlowKind, Label};
    use crate::lang::types::Type;

    #[test]
    fn test_binary_encoding_preserves_program() {
        let program = ProgramIr::new(vec![
            Op::Label(Label::flow(FlowKind::Loop, 1)),
            Op::ConstR(2.5),
            Op::Cast(Type::Int),
            Op::GlobalSet("x".to_string()),
            Op::Jump(Label::flow(FlowKind::Loop, 1)),
            Op::Call("f".to_string()),
            Op::Return,
        ]);

        let bytes = program.to_bytes().unwrap();
        assert_eq!(ProgramIr::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn test_truncated_bytes_are_rejected() {
        let bytes = ProgramIr::new(vec![Op::ConstI(1000), Op::Print])
            .to_bytes()
            .unwrap();
        assert!(ProgramIr::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
