use crate::bytecode::op::{Label, ParseLabelError};
use crate::bytecode::{Op, ProgramIr};
use crate::lang::types::Type;
use std::fmt::Write;
use thiserror::Error;

/// One `OPCODE [operand]` line per instruction.
pub fn listing(ops: &[Op]) -> String {
    let mut out = String::new();
    for op in ops {
        let _ = writeln!(out, "{}", op);
    }
    out
}

/// Annotated disassembly: instruction indices, with jump and call targets
/// marked.
pub fn disassemble(ir: &ProgramIr) -> String {
    let targets = collect_jump_targets(&ir.code);
    let mut out = String::new();

    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " {} instructions", ir.code.len());
    let _ = writeln!(out, "════════════════════════════════════════");

    for (ip, op) in ir.code.iter().enumerate() {
        let is_target = matches!(op, Op::Label(label) if targets.contains(label));
        if matches!(op, Op::Label(Label::Function(_))) {
            let _ = writeln!(out, "      ┌──────────────────────────────────");
        }
        let marker = if is_target { "► " } else { "  " };
        let _ = writeln!(out, "{:04} {}{}", ip, marker, op);
    }
    out
}

/// Labels referenced by a jump or call.
fn collect_jump_targets(ops: &[Op]) -> Vec<Label> {
    let mut targets = Vec::new();

    for op in ops {
        let target = match op {
            Op::Jump(label) | Op::JumpIfFalse(label) => Some(label.clone()),
            Op::Call(name) => Some(Label::function(name)),
            _ => None,
        };

        if let Some(target) = target {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    }

    targets
}

// =============================================================================
// Parsing listings back
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ListingError {
    #[error("line {line}: unknown opcode '{opcode}'")]
    UnknownOpcode { line: usize, opcode: String },

    #[error("line {line}: {opcode} expects an operand")]
    MissingOperand { line: usize, opcode: String },

    #[error("line {line}: {opcode} takes no operand, found '{operand}'")]
    UnexpectedOperand {
        line: usize,
        opcode: String,
        operand: String,
    },

    #[error("line {line}: invalid operand '{operand}' for {opcode}")]
    InvalidOperand {
        line: usize,
        opcode: String,
        operand: String,
    },

    #[error("line {line}: {source}")]
    InvalidLabel {
        line: usize,
        #[source]
        source: ParseLabelError,
    },
}

/// Parse text produced by [`listing`]. Blank lines and `;` comments are
/// skipped.
pub fn parse_listing(text: &str) -> Result<ProgramIr, ListingError> {
    let mut code = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = raw.split(';').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        let (opcode, operand) = match content.split_once(char::is_whitespace) {
            Some((opcode, rest)) => (opcode, Some(rest.trim())),
            None => (content, None),
        };
        code.push(parse_op(line, opcode, operand)?);
    }

    Ok(ProgramIr::new(code))
}

fn parse_op(line: usize, opcode: &str, operand: Option<&str>) -> Result<Op, ListingError> {
    let bare = |op: Op| match operand {
        None => Ok(op),
        Some(found) => Err(ListingError::UnexpectedOperand {
            line,
            opcode: opcode.to_string(),
            operand: found.to_string(),
        }),
    };
    let required = || {
        operand.ok_or_else(|| ListingError::MissingOperand {
            line,
            opcode: opcode.to_string(),
        })
    };
    let invalid = |found: &str| ListingError::InvalidOperand {
        line,
        opcode: opcode.to_string(),
        operand: found.to_string(),
    };
    let label = |found: &str| {
        found
            .parse::<Label>()
            .map_err(|source| ListingError::InvalidLabel { line, source })
    };

    match opcode {
        "CONSTI" => {
            let found = required()?;
            found.parse().map(Op::ConstI).map_err(|_| invalid(found))
        }
        "CONSTR" => {
            let found = required()?;
            found.parse().map(Op::ConstR).map_err(|_| invalid(found))
        }
        "CONSTB" => {
            let found = required()?;
            found.parse().map(Op::ConstB).map_err(|_| invalid(found))
        }
        "LOCAL_GET" => Ok(Op::LocalGet(required()?.to_string())),
        "LOCAL_SET" => Ok(Op::LocalSet(required()?.to_string())),
        "GLOBAL_GET" => Ok(Op::GlobalGet(required()?.to_string())),
        "GLOBAL_SET" => Ok(Op::GlobalSet(required()?.to_string())),
        "CALL" => Ok(Op::Call(required()?.to_string())),
        "JUMP" => Ok(Op::Jump(label(required()?)?)),
        "JUMP_IF_FALSE" => Ok(Op::JumpIfFalse(label(required()?)?)),
        "LABEL" => Ok(Op::Label(label(required()?)?)),
        "CAST" => {
            let found = required()?;
            Type::from_name(found)
                .map(Op::Cast)
                .ok_or_else(|| invalid(found))
        }
        "ADDI" => bare(Op::AddI),
        "SUBI" => bare(Op::SubI),
        "MULI" => bare(Op::MulI),
        "DIVI" => bare(Op::DivI),
        "NEG" => bare(Op::Neg),
        "POS" => bare(Op::Pos),
        "AND" => bare(Op::And),
        "OR" => bare(Op::Or),
        "NOT" => bare(Op::Not),
        "EQ" => bare(Op::Eq),
        "NE" => bare(Op::Ne),
        "LT" => bare(Op::Lt),
        "GT" => bare(Op::Gt),
        "LE" => bare(Op::Le),
        "GE" => bare(Op::Ge),
        "RETURN" => bare(Op::Return),
        "PRINT" => bare(Op::Print),
        "GROW" => bare(Op::Grow),
        "POKEI" => bare(Op::PokeI),
        "PEEKI" => bare(Op::PeekI),
        "POKEF" => bare(Op::PokeF),
        "PEEKF" => bare(Op::PeekF),
        "POP" => bare(Op::Pop),
        "BREAK" => bare(Op::Break),
        "CONTINUE" => bare(Op::Continue),
        _ => Err(ListingError::UnknownOpcode {
            line,
            opcode: opcode.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::FlowKind;

    fn sample() -> Vec<Op> {
        vec![
            Op::ConstI(1),
            Op::Call("f".to_string()),
            Op::Pop,
            Op::Return,
            Op::Label(Label::function("f")),
            Op::Label(Label::flow(FlowKind::Loop, 1)),
            Op::ConstB(false),
            Op::JumpIfFalse(Label::flow(FlowKind::EndLoop, 2)),
            Op::Jump(Label::flow(FlowKind::Loop, 1)),
            Op::Label(Label::flow(FlowKind::EndLoop, 2)),
            Op::ConstR(0.5),
            Op::Cast(Type::Char),
            Op::Return,
        ]
    }

    #[test]
    fn test_listing_lines() {
        let text = listing(&sample()[..3]);
        assert_eq!(text, "CONSTI 1\nCALL f\nPOP\n");
    }

    #[test]
    fn test_listing_parses_back() {
        let ops = sample();
        let parsed = parse_listing(&listing(&ops)).unwrap();
        assert_eq!(parsed.code, ops);
    }

    #[test]
    fn test_parse_skips_blanks_and_comments() {
        let parsed = parse_listing("\n  CONSTI 65 ; 'A'\n; nothing here\nPRINT\n").unwrap();
        assert_eq!(parsed.code, vec![Op::ConstI(65), Op::Print]);
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        assert_eq!(
            parse_listing("POP\nFROB").unwrap_err(),
            ListingError::UnknownOpcode {
                line: 2,
                opcode: "FROB".to_string()
            }
        );
        assert!(matches!(
            parse_listing("CONSTI"),
            Err(ListingError::MissingOperand { line: 1, .. })
        ));
        assert!(matches!(
            parse_listing("CONSTI ten"),
            Err(ListingError::InvalidOperand { .. })
        ));
        assert!(matches!(
            parse_listing("PRINT 3"),
            Err(ListingError::UnexpectedOperand { .. })
        ));
        assert!(matches!(
            parse_listing("JUMP nowhere"),
            Err(ListingError::InvalidLabel { line: 1, .. })
        ));
        assert!(matches!(
            parse_listing("CAST string"),
            Err(ListingError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_disassemble_marks_targets() {
        let text = disassemble(&ProgramIr::new(sample()));
        assert!(text.contains("13 instructions"));
        assert!(text.contains("0004 ► LABEL FUNC_f"));
        assert!(text.contains("0005 ► LABEL LOOP1"));
        assert!(text.contains("0001   CALL f"));
    }
}
