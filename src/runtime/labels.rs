use std::collections::HashMap;

use crate::bytecode::op::{Label, Op};
use crate::runtime::runtime_error::{Fault, RuntimeError};

/// `LABEL` positions of one program, built by a single pre-scan.
#[derive(Debug, Default)]
pub struct LabelTable {
    positions: HashMap<Label, usize>,
}

impl LabelTable {
    /// Index every `LABEL`. A label defined twice is a fault, and so is a
    /// jump or call whose target is never defined.
    pub fn build(code: &[Op]) -> Result<Self, RuntimeError> {
        let mut positions = HashMap::new();
        for (pc, op) in code.iter().enumerate() {
            if let Op::Label(label) = op {
                if let Some(first) = positions.insert(label.clone(), pc) {
                    return Err(RuntimeError::new(Fault::DuplicateLabel {
                        label: label.to_string(),
                        first,
                        second: pc,
                    })
                    .at(pc, op));
                }
            }
        }

        let table = Self { positions };
        for (pc, op) in code.iter().enumerate() {
            let target = match op {
                Op::Call(name) => Label::function(name),
                _ => match op.jump_target() {
                    Some(label) => label.clone(),
                    None => continue,
                },
            };
            table
                .resolve(&target)
                .map_err(|fault| RuntimeError::new(fault).at(pc, op))?;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Index of the `LABEL` instruction defining `label`.
    pub fn resolve(&self, label: &Label) -> Result<usize, Fault> {
        self.positions
            .get(label)
            .copied()
            .ok_or_else(|| Fault::UnresolvedLabel(label.to_string()))
    }
}
