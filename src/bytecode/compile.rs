use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, trace};

use crate::{
    bytecode::{
        Op, ProgramIr,
        compile_error::CompileError,
        op::{FlowKind, Label},
    },
    lang::{
        node::{BinOp, Expr, FuncDecl, Literal, Location, Stmt, UnaryOp, block_terminates},
        types::Type,
    },
    semantic::Checked,
};

/// Where a resolved name lives at runtime.
enum Storage<'a> {
    /// Current frame, or the global frame in top-level code.
    Local(&'a str),
    /// Top-level variable read from inside a function body.
    Global(&'a str),
}

pub struct Compiler {
    /// Function bodies, appended after the top-level code
    functions: Vec<Op>,

    /// Last flow-label id handed out
    label_counter: u32,

    /// (loop label, end label) of each enclosing `while`, innermost last
    loops: Vec<(Label, Label)>,

    /// Source name -> storage name, per block of the current frame
    scopes: Vec<HashMap<String, String>>,

    /// Top-level scopes, parked here while a function body is compiled
    enclosing: Option<Vec<HashMap<String, String>>>,

    /// Suffix counter for storage names of shadowing declarations
    shadow_counter: u32,

    /// Functions whose calls leave nothing on the stack
    void_functions: HashSet<String>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
            label_counter: 0,
            loops: Vec::new(),
            scopes: vec![HashMap::new()],
            enclosing: None,
            shadow_counter: 0,
            void_functions: HashSet::new(),
        }
    }

    /// Lower an analyzed program to one instruction stream.
    ///
    /// Top-level statements come first and end with `RETURN`, which halts the
    /// VM; function bodies follow in declaration order.
    #[instrument(skip_all, name = "compile")]
    pub fn compile_program(mut self, checked: &Checked<'_>) -> Result<ProgramIr, CompileError> {
        let program = checked.program();

        for stmt in &program.statements {
            if let Stmt::Func(decl) = stmt {
                let is_void = checked
                    .signature(&decl.name)
                    .map_or(decl.return_type() == Type::Void, |sig| {
                        sig.return_type == Type::Void
                    });
                if is_void {
                    self.void_functions.insert(decl.name.clone());
                }
            }
        }

        let mut code = self.compile_block(&program.statements, false)?;
        code.push(Op::Return);
        let top_level = code.len();
        code.append(&mut self.functions);

        debug!(
            instructions = code.len(),
            top_level,
            labels = self.label_counter,
            "generated IR"
        );

        Ok(ProgramIr::new(code))
    }

    /// Compile statements into a fresh op list. `scoped` opens a block scope.
    fn compile_block(&mut self, body: &[Stmt], scoped: bool) -> Result<Vec<Op>, CompileError> {
        let mut ops = Vec::new();
        if scoped {
            self.scopes.push(HashMap::new());
        }
        let result = body.iter().try_for_each(|stmt| self.compile_stmt(stmt, &mut ops));
        if scoped {
            self.scopes.pop();
        }
        result.map(|_| ops)
    }

    fn new_label(&mut self, kind: FlowKind) -> Label {
        self.label_counter += 1;
        Label::flow(kind, self.label_counter)
    }

    fn in_function(&self) -> bool {
        self.enclosing.is_some()
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// Bind `name` in the innermost block and return its storage name.
    ///
    /// A declaration that shadows a binding visible in the same frame gets a
    /// `<name>.<n>` storage name so the outer value survives the block.
    fn declare(&mut self, name: &str) -> String {
        let shadows = self.scopes.iter().any(|scope| scope.contains_key(name));
        let storage = if shadows {
            self.shadow_counter += 1;
            format!("{}.{}", name, self.shadow_counter)
        } else {
            name.to_string()
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), storage.clone());
        }
        storage
    }

    fn resolve(&self, name: &str) -> Result<Storage<'_>, CompileError> {
        if let Some(storage) = self.scopes.iter().rev().find_map(|s| s.get(name)) {
            return Ok(Storage::Local(storage));
        }
        self.enclosing
            .iter()
            .flat_map(|scopes| scopes.iter().rev())
            .find_map(|s| s.get(name))
            .map(|storage| Storage::Global(storage))
            .ok_or_else(|| CompileError::internal(format!("unresolved name '{}'", name)))
    }

    fn emit_get(&self, name: &str, ops: &mut Vec<Op>) -> Result<(), CompileError> {
        ops.push(match self.resolve(name)? {
            Storage::Local(s) => Op::LocalGet(s.to_string()),
            Storage::Global(s) => Op::GlobalGet(s.to_string()),
        });
        Ok(())
    }

    fn emit_set(&self, name: &str, ops: &mut Vec<Op>) -> Result<(), CompileError> {
        ops.push(match self.resolve(name)? {
            Storage::Local(s) => Op::LocalSet(s.to_string()),
            Storage::Global(s) => Op::GlobalSet(s.to_string()),
        });
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_stmt(&mut self, stmt: &Stmt, ops: &mut Vec<Op>) -> Result<(), CompileError> {
        match stmt {
            Stmt::VarDecl { name, ty, init, .. } => {
                match (init, ty) {
                    (Some(init), _) => self.compile_expr(init, ops)?,
                    (None, Some(ty)) => ops.push(zero_value(*ty, name)?),
                    (None, None) => {
                        return Err(CompileError::internal(format!(
                            "variable '{}' has neither type nor initializer",
                            name
                        )));
                    }
                }
                let storage = self.declare(name);
                ops.push(Op::LocalSet(storage));
            }

            Stmt::Func(decl) => {
                if self.in_function() || self.scopes.len() > 1 {
                    return Err(CompileError::nested_function(&decl.name));
                }
                self.compile_function(decl)?;
            }

            Stmt::Assign { target, value } => match target {
                Location::Name(name) => {
                    self.compile_expr(value, ops)?;
                    self.emit_set(name, ops)?;
                }
                Location::Deref(addr) => {
                    self.compile_expr(value, ops)?;
                    self.compile_expr(addr, ops)?;
                    ops.push(match store_type(value) {
                        Type::Float => Op::PokeF,
                        _ => Op::PokeI,
                    });
                }
            },

            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let else_label = self.new_label(FlowKind::Else);
                let end_label = self.new_label(FlowKind::EndIf);

                self.compile_expr(cond, ops)?;
                ops.push(Op::JumpIfFalse(else_label.clone()));
                ops.extend(self.compile_block(then_body, true)?);
                ops.push(Op::Jump(end_label.clone()));
                ops.push(Op::Label(else_label));
                if let Some(else_body) = else_body {
                    ops.extend(self.compile_block(else_body, true)?);
                }
                ops.push(Op::Label(end_label));
            }

            Stmt::While { cond, body } => {
                let loop_label = self.new_label(FlowKind::Loop);
                let end_label = self.new_label(FlowKind::EndLoop);

                ops.push(Op::Label(loop_label.clone()));
                self.compile_expr(cond, ops)?;
                ops.push(Op::JumpIfFalse(end_label.clone()));

                self.loops.push((loop_label.clone(), end_label.clone()));
                let body = self.compile_block(body, true);
                self.loops.pop();
                ops.extend(body?);

                ops.push(Op::Jump(loop_label));
                ops.push(Op::Label(end_label));
            }

            Stmt::Break => {
                let (_, end) = self
                    .loops
                    .last()
                    .ok_or_else(|| CompileError::outside_loop(stmt))?;
                ops.push(Op::Jump(end.clone()));
            }

            Stmt::Continue => {
                let (top, _) = self
                    .loops
                    .last()
                    .ok_or_else(|| CompileError::outside_loop(stmt))?;
                ops.push(Op::Jump(top.clone()));
            }

            Stmt::Return(expr) => {
                if !self.in_function() {
                    return Err(CompileError::return_at_top_level());
                }
                if let Some(expr) = expr {
                    self.compile_expr(expr, ops)?;
                }
                ops.push(Op::Return);
            }

            Stmt::Print(expr) => {
                self.compile_expr(expr, ops)?;
                ops.push(Op::Print);
            }

            Stmt::Expr(expr) => {
                self.compile_expr(expr, ops)?;
                let leaves_nothing = matches!(
                    expr,
                    Expr::Call { callee, .. } if self.void_functions.contains(callee)
                );
                if !leaves_nothing {
                    ops.push(Op::Pop);
                }
            }
        }
        Ok(())
    }

    fn compile_function(&mut self, decl: &FuncDecl) -> Result<(), CompileError> {
        if decl.is_import {
            trace!(name = %decl.name, "skipping imported function");
            return Ok(());
        }

        let top_level = std::mem::replace(&mut self.scopes, vec![HashMap::new()]);
        self.enclosing = Some(top_level);
        let saved_loops = std::mem::take(&mut self.loops);

        let mut ops = vec![Op::Label(Label::function(&decl.name))];

        // Arguments were pushed left to right, so the last one is on top.
        let mut prologue: Vec<Op> = decl
            .params
            .iter()
            .map(|param| Op::LocalSet(self.declare(&param.name)))
            .collect();
        prologue.reverse();
        ops.extend(prologue);

        let body = self.compile_block(&decl.body, false);

        self.loops = saved_loops;
        self.scopes = self.enclosing.take().unwrap_or_else(|| vec![HashMap::new()]);

        ops.extend(body?);
        if decl.return_type() == Type::Void || !block_terminates(&decl.body) {
            ops.push(Op::Return);
        }

        trace!(name = %decl.name, instructions = ops.len(), "compiled function");
        self.functions.extend(ops);
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expr(&mut self, expr: &Expr, ops: &mut Vec<Op>) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(lit) => ops.push(match lit {
                Literal::Int(n) => Op::ConstI(*n),
                Literal::Float(n) => Op::ConstR(*n),
                Literal::Bool(b) => Op::ConstB(*b),
                Literal::Char(c) => Op::ConstI(i64::from(*c)),
            }),

            Expr::Binary { op, lhs, rhs } => {
                self.compile_expr(lhs, ops)?;
                self.compile_expr(rhs, ops)?;
                ops.push(binary_op(*op));
            }

            Expr::Unary { op, operand } => {
                self.compile_expr(operand, ops)?;
                ops.push(match op {
                    UnaryOp::Pos => Op::Pos,
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Grow => Op::Grow,
                    UnaryOp::Not => Op::Not,
                });
            }

            Expr::Call { callee, args } => {
                for arg in args {
                    self.compile_expr(arg, ops)?;
                }
                ops.push(Op::Call(callee.clone()));
            }

            Expr::Load(Location::Name(name)) => self.emit_get(name, ops)?,

            Expr::Load(Location::Deref(addr)) => {
                self.compile_expr(addr, ops)?;
                ops.push(Op::PeekI);
            }

            Expr::Cast { target, expr } => {
                if !target.is_castable() {
                    return Err(CompileError::unhandled(
                        "cast",
                        format!("no conversion to {} exists", target),
                    ));
                }
                match (target, expr.as_ref()) {
                    // float(`addr) reads the cell as a float instead of converting
                    (Type::Float, Expr::Load(Location::Deref(addr))) => {
                        self.compile_expr(addr, ops)?;
                        ops.push(Op::PeekF);
                    }
                    _ => {
                        self.compile_expr(expr, ops)?;
                        ops.push(Op::Cast(*target));
                    }
                }
            }
        }
        Ok(())
    }
}

fn binary_op(op: BinOp) -> Op {
    match op {
        BinOp::Add => Op::AddI,
        BinOp::Sub => Op::SubI,
        BinOp::Mul => Op::MulI,
        BinOp::Div => Op::DivI,
        BinOp::Lt => Op::Lt,
        BinOp::Gt => Op::Gt,
        BinOp::Le => Op::Le,
        BinOp::Ge => Op::Ge,
        BinOp::Eq => Op::Eq,
        BinOp::Ne => Op::Ne,
        BinOp::And => Op::And,
        BinOp::Or => Op::Or,
    }
}

fn zero_value(ty: Type, name: &str) -> Result<Op, CompileError> {
    match ty {
        Type::Int | Type::Char => Ok(Op::ConstI(0)),
        Type::Float => Ok(Op::ConstR(0.0)),
        Type::Bool => Ok(Op::ConstB(false)),
        Type::Void | Type::Error => Err(CompileError::internal(format!(
            "variable '{}' has no storable type",
            name
        ))),
    }
}

/// Syntactic type of a stored value: literal kind, cast target, else int.
///
/// Known to be imprecise: a float-typed variable stored through a deref is
/// written as an int.
fn store_type(value: &Expr) -> Type {
    match value {
        Expr::Literal(lit) => lit.ty(),
        Expr::Cast { target, .. } => *target,
        _ => Type::Int,
    }
}
