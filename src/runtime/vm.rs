use crate::bytecode::ProgramIr;
use crate::bytecode::op::{Label, Op};
use crate::lang::types::Type;
use crate::lang::value::Value;
use crate::runtime::labels::LabelTable;
use crate::runtime::memory::Memory;
use crate::runtime::runtime_error::{Fault, RuntimeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Stdout, Write};
use tracing::{debug, instrument, trace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Size in bytes of linear memory at the start of a run.
    pub initial_memory: usize,
    /// Largest size in bytes `GROW` may take linear memory to.
    pub max_memory: usize,
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            initial_memory: 1024,
            max_memory: 16 * 1024 * 1024,
            max_call_depth: 1000,
            max_steps: None,
            max_stack_size: 10_000,
        }
    }
}

#[derive(Debug)]
struct Frame {
    return_address: usize,
    locals: HashMap<String, Value>,
    function: String,
}

/// What the program counter does after an instruction.
enum Control {
    Next,
    Jump(usize),
    Halt,
}

pub struct Vm<W: Write = Stdout> {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    /// The synthetic global frame: top-level locals and `GLOBAL_*` storage.
    globals: HashMap<String, Value>,
    memory: Memory,
    config: VmConfig,
    steps: usize,
    last_fault: Option<RuntimeError>,
    out: W,
}

impl Vm<Stdout> {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self::with_output(config, io::stdout())
    }
}

impl Default for Vm<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    /// VM whose `PRINT` output goes to `out`.
    pub fn with_output(config: VmConfig, out: W) -> Self {
        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            globals: HashMap::new(),
            memory: Memory::new(config.initial_memory),
            config,
            steps: 0,
            last_fault: None,
            out,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// The fault that ended the last run, if it ended in one.
    pub fn last_fault(&self) -> Option<&RuntimeError> {
        self.last_fault.as_ref()
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn reset_execution_state(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.globals.clear();
        self.memory = Memory::new(self.config.initial_memory);
        self.steps = 0;
        self.last_fault = None;
    }

    /// Run `ir` from its first instruction until a frameless `RETURN`, the
    /// end of the code, or a fault.
    ///
    /// Machine state is left as it was when the run stopped, so it can be
    /// inspected after a fault too.
    #[instrument(skip_all, name = "execute", fields(instructions = ir.code.len()))]
    pub fn execute(&mut self, ir: &ProgramIr) -> Result<(), RuntimeError> {
        self.reset_execution_state();

        let result = self.run(&ir.code);
        match &result {
            Ok(()) => debug!(steps = self.steps, "halted"),
            Err(err) => {
                debug!(steps = self.steps, error = %err, "faulted");
                self.last_fault = Some(err.clone());
            }
        }
        result
    }

    fn run(&mut self, code: &[Op]) -> Result<(), RuntimeError> {
        let labels = LabelTable::build(code).map_err(|e| self.with_call_stack(e))?;
        debug!(labels = labels.len(), "resolved labels");

        let mut pc = 0;
        while let Some(op) = code.get(pc) {
            let control = self
                .check_limits()
                .and_then(|_| self.step(op, pc, &labels))
                .map_err(|fault| self.with_call_stack(RuntimeError::new(fault).at(pc, op)))?;

            match control {
                Control::Next => pc += 1,
                Control::Jump(target) => pc = target,
                Control::Halt => break,
            }
        }
        Ok(())
    }

    fn with_call_stack(&self, mut err: RuntimeError) -> RuntimeError {
        err = err.with_context("<top level>");
        for frame in &self.frames {
            err = err.with_context(&frame.function);
        }
        err
    }

    fn check_limits(&mut self) -> Result<(), Fault> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(Fault::StepLimitExceeded(max));
            }
        }

        if self.stack.len() > self.config.max_stack_size {
            return Err(Fault::StackOverflow(self.config.max_stack_size));
        }

        Ok(())
    }

    fn step(&mut self, op: &Op, pc: usize, labels: &LabelTable) -> Result<Control, Fault> {
        trace!(pc, %op, stack = self.stack.len(), "step");

        match op {
            // Literals
            Op::ConstI(n) => self.push(Value::Int(*n)),
            Op::ConstR(n) => self.push(Value::Float(*n)),
            Op::ConstB(b) => self.push(Value::Bool(*b)),

            // Variables
            Op::LocalGet(name) => {
                let locals = match self.frames.last() {
                    Some(frame) => &frame.locals,
                    None => &self.globals,
                };
                let value = *locals
                    .get(name)
                    .ok_or_else(|| Fault::UndefinedVariable(name.clone()))?;
                self.push(value);
            }
            Op::LocalSet(name) => {
                let value = self.pop()?;
                let locals = match self.frames.last_mut() {
                    Some(frame) => &mut frame.locals,
                    None => &mut self.globals,
                };
                locals.insert(name.clone(), value);
            }
            Op::GlobalGet(name) => {
                let value = *self
                    .globals
                    .get(name)
                    .ok_or_else(|| Fault::UndefinedVariable(name.clone()))?;
                self.push(value);
            }
            Op::GlobalSet(name) => {
                let value = self.pop()?;
                self.globals.insert(name.clone(), value);
            }

            // Arithmetic
            Op::AddI => self.arith(i64::wrapping_add, |a, b| a + b)?,
            Op::SubI => self.arith(i64::wrapping_sub, |a, b| a - b)?,
            Op::MulI => self.arith(i64::wrapping_mul, |a, b| a * b)?,
            Op::DivI => {
                let b = self.pop()?;
                let a = self.pop()?;
                let result = match (a, b) {
                    (Value::Int(_), Value::Int(0)) => return Err(Fault::DivisionByZero),
                    (Value::Int(a), Value::Int(b)) => Value::Int(floor_div(a, b)),
                    _ => Value::Float(number(a)? / number(b)?),
                };
                self.push(result);
            }
            Op::Neg => {
                let result = match self.pop()? {
                    Value::Int(n) => Value::Int(n.wrapping_neg()),
                    Value::Float(n) => Value::Float(-n),
                    other => return Err(mismatch("number", other)),
                };
                self.push(result);
            }
            Op::Pos => {
                let value = self.pop()?;
                number(value)?;
                self.push(value);
            }

            // Logic
            Op::And => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.push(Value::Bool(a && b));
            }
            Op::Or => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.push(Value::Bool(a || b));
            }
            Op::Not => {
                let a = self.pop_bool()?;
                self.push(Value::Bool(!a));
            }

            // Comparison
            Op::Eq => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(values_equal(a, b)));
            }
            Op::Ne => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(!values_equal(a, b)));
            }
            Op::Lt => self.compare(|a, b| a < b, |a, b| a < b)?,
            Op::Gt => self.compare(|a, b| a > b, |a, b| a > b)?,
            Op::Le => self.compare(|a, b| a <= b, |a, b| a <= b)?,
            Op::Ge => self.compare(|a, b| a >= b, |a, b| a >= b)?,

            // Control flow
            Op::Label(_) => {}
            Op::Jump(label) => return Ok(Control::Jump(labels.resolve(label)?)),
            Op::JumpIfFalse(label) => {
                if !self.pop_bool()? {
                    return Ok(Control::Jump(labels.resolve(label)?));
                }
            }
            Op::Call(name) => {
                let entry = labels.resolve(&Label::function(name))?;
                if self.frames.len() >= self.config.max_call_depth {
                    return Err(Fault::CallDepthExceeded(self.config.max_call_depth));
                }
                self.frames.push(Frame {
                    return_address: pc + 1,
                    locals: HashMap::new(),
                    function: name.clone(),
                });
                trace!(function = %name, depth = self.frames.len(), "call");
                return Ok(Control::Jump(entry + 1));
            }
            Op::Return => {
                return Ok(match self.frames.pop() {
                    Some(frame) => {
                        trace!(function = %frame.function, depth = self.frames.len(), "return");
                        Control::Jump(frame.return_address)
                    }
                    None => Control::Halt,
                });
            }

            // I/O
            Op::Print => {
                let value = self.pop()?;
                self.print(value)?;
            }

            // Linear memory
            Op::Grow => {
                let n = self.pop_int()?;
                let within_limit = usize::try_from(n)
                    .ok()
                    .and_then(|extra| self.memory.len().checked_add(extra))
                    .is_some_and(|size| size <= self.config.max_memory);
                if n > 0 && !within_limit {
                    return Err(Fault::InvalidGrow(n));
                }
                let old = self.memory.grow(n)?;
                self.push(Value::Int(old as i64));
            }
            // value below address, as the generator evaluates them
            Op::PokeI => {
                let addr = self.pop_int()?;
                let value = match self.pop()? {
                    Value::Int(n) => n,
                    Value::Char(c) => i64::from(c),
                    Value::Bool(b) => i64::from(b),
                    // truncates, as CAST int does
                    Value::Float(f) => f as i64,
                };
                self.memory.store_int(addr, value)?;
            }
            Op::PeekI => {
                let addr = self.pop_int()?;
                let value = self.memory.load_int(addr)?;
                self.push(Value::Int(value));
            }
            Op::PokeF => {
                let addr = self.pop_int()?;
                let value = number(self.pop()?)?;
                self.memory.store_float(addr, value)?;
            }
            Op::PeekF => {
                let addr = self.pop_int()?;
                let value = self.memory.load_float(addr)?;
                self.push(Value::Float(value));
            }

            Op::Cast(ty) => {
                let value = self.pop()?;
                self.push(cast(value, *ty)?);
            }

            Op::Pop => {
                self.pop()?;
            }

            Op::Break | Op::Continue => {
                return Err(Fault::UnsupportedOpcode(op.mnemonic().to_string()));
            }
        }

        Ok(Control::Next)
    }

    // Stack helpers

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, Fault> {
        self.stack.pop().ok_or(Fault::StackUnderflow)
    }

    fn pop_bool(&mut self) -> Result<bool, Fault> {
        match self.pop()? {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", other)),
        }
    }

    fn pop_int(&mut self) -> Result<i64, Fault> {
        match self.pop()? {
            Value::Int(n) => Ok(n),
            other => Err(mismatch("int", other)),
        }
    }

    /// Pop right then left; int with int stays int, anything else promotes.
    fn arith(&mut self, int: fn(i64, i64) -> i64, float: fn(f64, f64) -> f64) -> Result<(), Fault> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (a, b) {
            (Value::Int(a), Value::Int(b)) => Value::Int(int(a, b)),
            _ => Value::Float(float(number(a)?, number(b)?)),
        };
        self.push(result);
        Ok(())
    }

    fn compare(&mut self, int: fn(&i64, &i64) -> bool, float: fn(&f64, &f64) -> bool) -> Result<(), Fault> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (a, b) {
            (Value::Int(a), Value::Int(b)) => int(&a, &b),
            _ => float(&number(a)?, &number(b)?),
        };
        self.push(Value::Bool(result));
        Ok(())
    }

    /// Ints in 0..=255 and chars print as the Latin-1 character, UTF-8
    /// encoded. Everything else prints naturally.
    fn print(&mut self, value: Value) -> Result<(), Fault> {
        let written = match value {
            Value::Int(n @ 0..=255) => write!(self.out, "{}", char::from(n as u8)),
            Value::Char(c) => write!(self.out, "{}", char::from(c)),
            other => write!(self.out, "{}", other),
        };
        written
            .and_then(|_| self.out.flush())
            .map_err(|e| Fault::Output(e.to_string()))
    }
}

fn mismatch(expected: &'static str, found: Value) -> Fault {
    Fault::TypeMismatch {
        expected,
        found: found.type_name(),
    }
}

fn number(value: Value) -> Result<f64, Fault> {
    match value {
        Value::Int(n) => Ok(n as f64),
        Value::Float(n) => Ok(n),
        other => Err(mismatch("number", other)),
    }
}

/// Integer division rounding toward negative infinity.
pub fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn values_equal(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Int(n), Value::Char(c)) | (Value::Char(c), Value::Int(n)) => n == i64::from(c),
        (Value::Int(n), Value::Float(f)) | (Value::Float(f), Value::Int(n)) => n as f64 == f,
        _ => a == b,
    }
}

fn cast(value: Value, target: Type) -> Result<Value, Fault> {
    let converted = match (target, value) {
        (Type::Int, Value::Int(n)) => Value::Int(n),
        // `as` truncates toward zero and saturates
        (Type::Int, Value::Float(f)) => Value::Int(f as i64),
        (Type::Int, Value::Bool(b)) => Value::Int(i64::from(b)),
        (Type::Int, Value::Char(c)) => Value::Int(i64::from(c)),

        (Type::Float, Value::Int(n)) => Value::Float(n as f64),
        (Type::Float, Value::Float(f)) => Value::Float(f),
        (Type::Float, Value::Bool(b)) => Value::Float(if b { 1.0 } else { 0.0 }),
        (Type::Float, Value::Char(c)) => Value::Float(f64::from(c)),

        (Type::Bool, Value::Int(n)) => Value::Bool(n != 0),
        (Type::Bool, Value::Float(f)) => Value::Bool(f != 0.0),
        (Type::Bool, Value::Bool(b)) => Value::Bool(b),
        (Type::Bool, Value::Char(c)) => Value::Bool(c != 0),

        // low 8 bits
        (Type::Char, Value::Int(n)) => Value::Char(n as u8),
        (Type::Char, Value::Float(f)) => Value::Char((f as i64) as u8),
        (Type::Char, Value::Bool(b)) => Value::Char(u8::from(b)),
        (Type::Char, Value::Char(c)) => Value::Char(c),

        (Type::Void | Type::Error, value) => {
            return Err(Fault::UnsupportedCast {
                from: value.type_name().to_string(),
                to: target.name().to_string(),
            });
        }
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::op::FlowKind;
    use proptest::prelude::*;

    // ============================================================
    // Test Helpers
    // ============================================================

    fn new_vm() -> Vm<Vec<u8>> {
        Vm::with_output(VmConfig::default(), Vec::new())
    }

    /// Run ops with a trailing frameless RETURN and return the finished VM.
    fn run_ops(mut ops: Vec<Op>) -> Vm<Vec<u8>> {
        ops.push(Op::Return);
        let mut vm = new_vm();
        vm.execute(&ProgramIr::new(ops)).unwrap();
        vm
    }

    fn assert_stack(ops: Vec<Op>, expected: &[Value]) {
        let vm = run_ops(ops);
        assert_eq!(vm.stack(), expected);
    }

    fn assert_error(ops: Vec<Op>, expected_substring: &str) {
        let mut vm = new_vm();
        let err = vm.execute(&ProgramIr::new(ops)).unwrap_err();
        assert!(
            err.to_string().contains(expected_substring),
            "expected error containing '{}', got '{}'",
            expected_substring,
            err
        );
    }

    fn output_of(ops: Vec<Op>) -> String {
        String::from_utf8(run_ops(ops).into_output()).unwrap()
    }

    fn else_label(id: u32) -> Label {
        Label::flow(FlowKind::Else, id)
    }

    // ============================================================
    // Arithmetic
    // ============================================================

    #[test]
    fn test_binary_ops_pop_right_first() {
        assert_stack(
            vec![Op::ConstI(10), Op::ConstI(3), Op::SubI],
            &[Value::Int(7)],
        );
    }

    #[test]
    fn test_mixed_arithmetic_promotes() {
        assert_stack(
            vec![Op::ConstI(10), Op::ConstR(2.5), Op::AddI],
            &[Value::Float(12.5)],
        );
        assert_stack(
            vec![Op::ConstR(1.0), Op::ConstI(4), Op::DivI],
            &[Value::Float(0.25)],
        );
    }

    #[test]
    fn test_integer_division_floors() {
        assert_stack(vec![Op::ConstI(7), Op::ConstI(2), Op::DivI], &[Value::Int(3)]);
        assert_stack(vec![Op::ConstI(-7), Op::ConstI(2), Op::DivI], &[Value::Int(-4)]);
        assert_stack(vec![Op::ConstI(7), Op::ConstI(-2), Op::DivI], &[Value::Int(-4)]);
        assert_stack(vec![Op::ConstI(-8), Op::ConstI(2), Op::DivI], &[Value::Int(-4)]);
    }

    #[test]
    fn test_integer_division_by_zero() {
        assert_error(
            vec![Op::ConstI(1), Op::ConstI(0), Op::DivI],
            "integer division by zero",
        );
    }

    #[test]
    fn test_float_division_by_zero_is_ieee() {
        let vm = run_ops(vec![Op::ConstR(1.0), Op::ConstI(0), Op::DivI]);
        assert_eq!(vm.stack(), &[Value::Float(f64::INFINITY)]);
    }

    #[test]
    fn test_overflow_wraps() {
        assert_stack(
            vec![Op::ConstI(i64::MAX), Op::ConstI(1), Op::AddI],
            &[Value::Int(i64::MIN)],
        );
    }

    #[test]
    fn test_arithmetic_on_bool_faults() {
        assert_error(
            vec![Op::ConstB(true), Op::ConstI(1), Op::AddI],
            "expected number, got bool",
        );
    }

    #[test]
    fn test_unary_ops() {
        assert_stack(vec![Op::ConstI(5), Op::Neg], &[Value::Int(-5)]);
        assert_stack(vec![Op::ConstR(1.5), Op::Pos], &[Value::Float(1.5)]);
        assert_stack(vec![Op::ConstB(false), Op::Not], &[Value::Bool(true)]);
    }

    // ============================================================
    // Comparison and logic
    // ============================================================

    #[test]
    fn test_comparisons() {
        assert_stack(vec![Op::ConstI(2), Op::ConstI(3), Op::Lt], &[Value::Bool(true)]);
        assert_stack(vec![Op::ConstI(3), Op::ConstR(2.5), Op::Gt], &[Value::Bool(true)]);
        assert_stack(vec![Op::ConstI(3), Op::ConstI(3), Op::Le], &[Value::Bool(true)]);
        assert_stack(vec![Op::ConstI(2), Op::ConstI(3), Op::Ge], &[Value::Bool(false)]);
    }

    #[test]
    fn test_equality_across_kinds() {
        assert_stack(
            vec![Op::ConstI(65), Op::ConstI(65), Op::Cast(Type::Char), Op::Eq],
            &[Value::Bool(true)],
        );
        assert_stack(vec![Op::ConstI(2), Op::ConstR(2.0), Op::Eq], &[Value::Bool(true)]);
        assert_stack(vec![Op::ConstB(true), Op::ConstI(1), Op::Ne], &[Value::Bool(true)]);
    }

    #[test]
    fn test_logic_requires_bools() {
        assert_stack(
            vec![Op::ConstB(true), Op::ConstB(false), Op::Or],
            &[Value::Bool(true)],
        );
        assert_error(vec![Op::ConstI(1), Op::ConstB(true), Op::And], "expected bool");
    }

    // ============================================================
    // Variables and frames
    // ============================================================

    #[test]
    fn test_top_level_locals_use_global_frame() {
        let vm = run_ops(vec![Op::ConstI(4), Op::LocalSet("x".to_string())]);
        assert_eq!(vm.global("x"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_undefined_variable() {
        assert_error(vec![Op::LocalGet("nope".to_string())], "undefined variable 'nope'");
    }

    #[test]
    fn test_call_binds_locals_and_returns() {
        // r = f(2, 3) where f(a, b) = a - b
        let vm = run_ops(vec![
            Op::ConstI(2),
            Op::ConstI(3),
            Op::Call("f".to_string()),
            Op::GlobalSet("r".to_string()),
            Op::Jump(else_label(1)),
            Op::Label(Label::function("f")),
            Op::LocalSet("b".to_string()),
            Op::LocalSet("a".to_string()),
            Op::LocalGet("a".to_string()),
            Op::LocalGet("b".to_string()),
            Op::SubI,
            Op::Return,
            Op::Label(else_label(1)),
        ]);
        assert_eq!(vm.global("r"), Some(&Value::Int(-1)));
        assert_eq!(vm.global("a"), None);
        assert_eq!(vm.frame_depth(), 0);
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn test_frame_depth_is_restored_by_return() {
        let code = ProgramIr::new(vec![
            Op::Call("f".to_string()),
            Op::Return,
            Op::Label(Label::function("f")),
            Op::Return,
        ]);
        let depth_after = |steps| {
            let config = VmConfig {
                max_steps: Some(steps),
                ..VmConfig::default()
            };
            let mut vm = Vm::with_output(config, Vec::new());
            let _ = vm.execute(&code);
            vm.frame_depth()
        };
        assert_eq!(depth_after(0), 0);
        assert_eq!(depth_after(1), 1); // stopped inside f
        assert_eq!(depth_after(2), 0);
    }

    #[test]
    fn test_call_depth_limit() {
        let config = VmConfig {
            max_call_depth: 8,
            ..VmConfig::default()
        };
        let mut vm = Vm::with_output(config, Vec::new());
        let err = vm
            .execute(&ProgramIr::new(vec![
                Op::Label(Label::function("loop")),
                Op::Call("loop".to_string()),
            ]))
            .unwrap_err();
        assert_eq!(err.fault, Fault::CallDepthExceeded(8));
        assert_eq!(err.call_stack.len(), 9);
        assert_eq!(vm.last_fault(), Some(&err));
    }

    #[test]
    fn test_return_without_frame_halts() {
        let vm = run_ops(vec![Op::Return, Op::ConstI(1)]);
        assert!(vm.stack().is_empty());
    }

    // ============================================================
    // Labels and jumps
    // ============================================================

    #[test]
    fn test_jump_if_false_takes_branch() {
        assert_stack(
            vec![
                Op::ConstB(false),
                Op::JumpIfFalse(else_label(1)),
                Op::ConstI(1),
                Op::Label(else_label(1)),
                Op::ConstI(2),
            ],
            &[Value::Int(2)],
        );
    }

    #[test]
    fn test_unresolved_label_faults() {
        assert_error(vec![Op::Jump(else_label(9))], "unresolved label 'ELSE9'");
        assert_error(vec![Op::Call("missing".to_string())], "unresolved label 'FUNC_missing'");
    }

    #[test]
    fn test_dangling_branch_faults_before_running() {
        let mut vm = new_vm();
        let err = vm
            .execute(&ProgramIr::new(vec![
                Op::ConstI(65),
                Op::Print,
                Op::ConstB(true),
                Op::JumpIfFalse(else_label(3)),
                Op::Return,
            ]))
            .unwrap_err();
        assert_eq!(err.fault, Fault::UnresolvedLabel("ELSE3".to_string()));
        assert!(vm.output().is_empty());
    }

    #[test]
    fn test_duplicate_labels_fault_before_running() {
        let mut vm = new_vm();
        let err = vm
            .execute(&ProgramIr::new(vec![
                Op::ConstI(65),
                Op::Print,
                Op::Label(else_label(1)),
                Op::Label(else_label(1)),
            ]))
            .unwrap_err();
        assert!(matches!(err.fault, Fault::DuplicateLabel { .. }));
        assert!(vm.output().is_empty());
    }

    #[test]
    fn test_legacy_markers_are_unsupported() {
        assert_error(vec![Op::Break], "unsupported opcode BREAK");
        assert_error(vec![Op::Continue], "unsupported opcode CONTINUE");
    }

    // ============================================================
    // Memory
    // ============================================================

    #[test]
    fn test_poke_and_peek_cells() {
        assert_stack(
            vec![
                Op::ConstI(-5),
                Op::ConstI(8),
                Op::PokeI,
                Op::ConstR(2.5),
                Op::ConstI(12),
                Op::PokeF,
                Op::ConstI(8),
                Op::PeekI,
                Op::ConstI(12),
                Op::PeekF,
            ],
            &[Value::Int(-5), Value::Float(2.5)],
        );
    }

    #[test]
    fn test_out_of_bounds_access_faults() {
        assert_error(
            vec![Op::ConstI(1022), Op::PeekI],
            "memory access out of bounds: 4 bytes at address 1022, memory size 1024",
        );
        assert_error(
            vec![Op::ConstI(1), Op::ConstI(-4), Op::PokeI],
            "out of bounds",
        );
    }

    #[test]
    fn test_grow_pushes_old_size_and_extends() {
        let vm = run_ops(vec![
            Op::ConstI(16),
            Op::Grow,
            Op::ConstI(7),
            Op::ConstI(1036),
            Op::PokeI,
        ]);
        assert_eq!(vm.stack(), &[Value::Int(1024)]);
        assert_eq!(vm.memory().len(), 1040);
    }

    #[test]
    fn test_negative_grow_faults() {
        assert_error(vec![Op::ConstI(-1), Op::Grow], "invalid memory growth");
    }

    #[test]
    fn test_huge_grow_faults_without_allocating() {
        let mut vm = new_vm();
        let err = vm
            .execute(&ProgramIr::new(vec![Op::ConstI(i64::MAX), Op::Grow, Op::Return]))
            .unwrap_err();
        assert_eq!(err.fault, Fault::InvalidGrow(i64::MAX));
        assert_eq!(vm.memory().len(), 1024);
    }

    #[test]
    fn test_grow_past_max_memory_faults() {
        let config = VmConfig {
            initial_memory: 16,
            max_memory: 64,
            ..VmConfig::default()
        };
        let mut vm = Vm::with_output(config, Vec::new());
        vm.execute(&ProgramIr::new(vec![Op::ConstI(48), Op::Grow, Op::Return]))
            .unwrap();
        assert_eq!(vm.memory().len(), 64);

        let err = vm
            .execute(&ProgramIr::new(vec![Op::ConstI(49), Op::Grow, Op::Return]))
            .unwrap_err();
        assert_eq!(err.fault, Fault::InvalidGrow(49));
    }

    #[test]
    fn test_initial_memory_from_config() {
        let config = VmConfig {
            initial_memory: 8,
            ..VmConfig::default()
        };
        let mut vm = Vm::with_output(config, Vec::new());
        let err = vm
            .execute(&ProgramIr::new(vec![Op::ConstI(8), Op::PeekI]))
            .unwrap_err();
        assert!(matches!(err.fault, Fault::OutOfBounds { size: 8, .. }));
        assert_eq!(vm.memory().len(), 8);
    }

    // ============================================================
    // Casts
    // ============================================================

    #[test]
    fn test_casts_to_every_target() {
        assert_eq!(cast(Value::Float(-2.7), Type::Int), Ok(Value::Int(-2)));
        assert_eq!(cast(Value::Float(1e300), Type::Int), Ok(Value::Int(i64::MAX)));
        assert_eq!(cast(Value::Bool(true), Type::Int), Ok(Value::Int(1)));
        assert_eq!(cast(Value::Char(b'A'), Type::Int), Ok(Value::Int(65)));
        assert_eq!(cast(Value::Int(3), Type::Float), Ok(Value::Float(3.0)));
        assert_eq!(cast(Value::Bool(false), Type::Float), Ok(Value::Float(0.0)));
        assert_eq!(cast(Value::Int(0), Type::Bool), Ok(Value::Bool(false)));
        assert_eq!(cast(Value::Float(0.1), Type::Bool), Ok(Value::Bool(true)));
        assert_eq!(cast(Value::Int(321), Type::Char), Ok(Value::Char(65)));
        assert_eq!(cast(Value::Float(66.9), Type::Char), Ok(Value::Char(b'B')));
    }

    #[test]
    fn test_cast_to_void_faults() {
        assert_error(
            vec![Op::ConstI(1), Op::Cast(Type::Void)],
            "cannot cast int to void",
        );
    }

    // ============================================================
    // Print
    // ============================================================

    #[test]
    fn test_print_byte_range_as_character() {
        assert_eq!(output_of(vec![Op::ConstI(65), Op::Print]), "A");
        assert_eq!(output_of(vec![Op::ConstI(1000), Op::Print]), "1000");
        assert_eq!(output_of(vec![Op::ConstI(-1), Op::Print]), "-1");
    }

    #[test]
    fn test_print_high_bytes_as_utf8() {
        assert_eq!(output_of(vec![Op::ConstI(200), Op::Print]), "È");
        assert_eq!(
            output_of(vec![Op::ConstI(233), Op::Cast(Type::Char), Op::Print]),
            "é"
        );
        assert_eq!(output_of(vec![Op::ConstI(255), Op::Print]).as_bytes(), &[0xc3, 0xbf]);
    }

    #[test]
    fn test_print_natural_forms() {
        assert_eq!(output_of(vec![Op::ConstR(12.5), Op::Print]), "12.5");
        assert_eq!(output_of(vec![Op::ConstR(3.0), Op::Print]), "3.0");
        assert_eq!(output_of(vec![Op::ConstB(true), Op::Print]), "true");
        assert_eq!(
            output_of(vec![Op::ConstI(122), Op::Cast(Type::Char), Op::Print]),
            "z"
        );
    }

    // ============================================================
    // Limits and state
    // ============================================================

    #[test]
    fn test_step_limit() {
        let config = VmConfig {
            max_steps: Some(100),
            ..VmConfig::default()
        };
        let mut vm = Vm::with_output(config, Vec::new());
        let err = vm
            .execute(&ProgramIr::new(vec![
                Op::Label(else_label(1)),
                Op::Jump(else_label(1)),
            ]))
            .unwrap_err();
        assert_eq!(err.fault, Fault::StepLimitExceeded(100));
    }

    #[test]
    fn test_stack_size_limit() {
        let config = VmConfig {
            max_stack_size: 2,
            ..VmConfig::default()
        };
        let mut vm = Vm::with_output(config, Vec::new());
        let err = vm
            .execute(&ProgramIr::new(vec![
                Op::ConstI(1),
                Op::ConstI(2),
                Op::ConstI(3),
                Op::Pop,
            ]))
            .unwrap_err();
        assert_eq!(err.fault, Fault::StackOverflow(2));
    }

    #[test]
    fn test_fault_reports_instruction() {
        let mut vm = new_vm();
        let err = vm
            .execute(&ProgramIr::new(vec![Op::ConstI(1), Op::AddI]))
            .unwrap_err();
        assert_eq!(err.fault, Fault::StackUnderflow);
        assert_eq!(err.pc, Some(1));
        assert_eq!(err.op.as_deref(), Some("ADDI"));
        assert_eq!(err.call_stack, vec!["<top level>".to_string()]);
    }

    #[test]
    fn test_execute_resets_previous_run() {
        let mut vm = new_vm();
        vm.execute(&ProgramIr::new(vec![Op::ConstI(1), Op::LocalSet("x".into())]))
            .unwrap();
        let _ = vm.execute(&ProgramIr::new(vec![Op::Pop]));
        assert!(vm.last_fault().is_some());

        vm.execute(&ProgramIr::new(vec![Op::ConstI(2)])).unwrap();
        assert_eq!(vm.global("x"), None);
        assert!(vm.last_fault().is_none());
    }

    #[test]
    fn test_config_round_trips() {
        let config = VmConfig {
            max_steps: Some(5),
            ..VmConfig::default()
        };
        let bytes = postcard::to_allocvec(&config).unwrap();
        let back: VmConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, config);
        assert_eq!(VmConfig::default().initial_memory, 1024);
    }

    proptest! {
        #[test]
        fn prop_divi_matches_floor(a in -10_000i64..10_000, b in -100i64..100) {
            prop_assume!(b != 0);
            let vm = run_ops(vec![Op::ConstI(a), Op::ConstI(b), Op::DivI]);
            let expected = (a as f64 / b as f64).floor() as i64;
            prop_assert_eq!(vm.stack(), &[Value::Int(expected)]);
        }

        #[test]
        fn prop_floor_div_remainder_has_divisor_sign(a in any::<i64>(), b in any::<i64>()) {
            prop_assume!(b != 0 && !(a == i64::MIN && b == -1));
            let q = i128::from(floor_div(a, b));
            let (a, b) = (i128::from(a), i128::from(b));
            let r = a - q * b;
            prop_assert!(r == 0 || (r < 0) == (b < 0));
            prop_assert!(r.abs() < b.abs());
        }

        #[test]
        fn prop_grow_keeps_written_cell(value in any::<i32>(), n in 0i64..4096) {
            let vm = run_ops(vec![
                Op::ConstI(i64::from(value)),
                Op::ConstI(100),
                Op::PokeI,
                Op::ConstI(n),
                Op::Grow,
                Op::Pop,
                Op::ConstI(100),
                Op::PeekI,
            ]);
            prop_assert_eq!(vm.stack(), &[Value::Int(i64::from(value))]);
        }
    }
}
