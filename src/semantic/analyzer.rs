use tracing::{debug, instrument, trace};

use crate::lang::node::{BinOp, Expr, FuncDecl, Location, Stmt, UnaryOp, block_terminates};
use crate::lang::program::Program;
use crate::lang::types::Type;
use crate::semantic::diagnostic::{Analysis, Checked, Diagnostic, DiagnosticKind};
use crate::semantic::scope::{ScopeStack, Signature, SymbolInfo};

/// Function whose body is currently being checked.
#[derive(Debug)]
struct FunctionContext {
    name: String,
    return_type: Type,
}

pub struct Analyzer {
    scopes: ScopeStack,
    diagnostics: Vec<Diagnostic>,
    function: Option<FunctionContext>,
    /// Enclosing `while` bodies within the current function (or top level).
    loop_depth: usize,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Analyze `program` with a fresh [`Analyzer`].
pub fn analyze(program: &Program) -> Analysis<'_> {
    Analyzer::new().analyze(program)
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            scopes: ScopeStack::new(),
            diagnostics: Vec::new(),
            function: None,
            loop_depth: 0,
        }
    }

    #[instrument(skip_all, name = "analyze")]
    pub fn analyze(mut self, program: &Program) -> Analysis<'_> {
        for stmt in &program.statements {
            self.check_stmt(stmt);
        }

        debug!(
            statements = program.statements.len(),
            diagnostics = self.diagnostics.len(),
            "semantic analysis finished"
        );

        if !self.diagnostics.is_empty() {
            return Analysis::Rejected(self.diagnostics);
        }

        let functions = self
            .scopes
            .globals()
            .iter()
            .filter_map(|(name, info)| match info {
                SymbolInfo::Function(sig) => Some((name.clone(), sig.clone())),
                SymbolInfo::Variable { .. } => None,
            })
            .collect();

        Analysis::Accepted(Checked::new(program, functions))
    }

    fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(kind, message);
        trace!(kind = ?diagnostic.kind, message = %diagnostic.message, "diagnostic");
        self.diagnostics.push(diagnostic);
    }

    fn check_block(&mut self, body: &[Stmt]) {
        self.scopes.push();
        for stmt in body {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl {
                is_const,
                name,
                ty,
                init,
            } => self.check_var_decl(*is_const, name, *ty, init.as_ref()),

            Stmt::Func(decl) => self.check_function(decl),

            Stmt::Assign { target, value } => self.check_assign(target, value),

            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.check_condition(cond, "if");
                self.check_block(then_body);
                if let Some(else_body) = else_body {
                    self.check_block(else_body);
                }
            }

            Stmt::While { cond, body } => {
                self.check_condition(cond, "while");
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
            }

            Stmt::Break => {
                if self.loop_depth == 0 {
                    self.report(DiagnosticKind::LoopControl, "'break' outside of a loop");
                }
            }

            Stmt::Continue => {
                if self.loop_depth == 0 {
                    self.report(DiagnosticKind::LoopControl, "'continue' outside of a loop");
                }
            }

            Stmt::Return(expr) => self.check_return(expr.as_ref()),

            Stmt::Print(expr) => {
                if self.check_expr(expr) == Type::Void {
                    self.report(DiagnosticKind::TypeMismatch, "cannot print a void value");
                }
            }

            Stmt::Expr(expr) => {
                self.check_expr(expr);
            }
        }
    }

    fn check_var_decl(&mut self, is_const: bool, name: &str, ty: Option<Type>, init: Option<&Expr>) {
        let found = init.map(|e| self.check_expr(e));

        let mut ty = match (ty, found) {
            (None, None) => {
                self.report(
                    DiagnosticKind::MissingType,
                    format!("variable '{}' requires a type or an initializer", name),
                );
                Type::Error
            }
            (Some(declared), Some(found)) => {
                if !found.is_error() && found != declared {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "type mismatch in initialization of '{}': expected {}, found {}",
                            name, declared, found
                        ),
                    );
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(found)) => found,
        };

        if ty == Type::Void {
            self.report(
                DiagnosticKind::TypeMismatch,
                format!("variable '{}' cannot have type void", name),
            );
            ty = Type::Error;
        }

        if !self.scopes.declare(name, SymbolInfo::Variable { ty, is_const }) {
            self.report(
                DiagnosticKind::Redeclaration,
                format!("variable '{}' already declared in this scope", name),
            );
        }
    }

    fn check_assign(&mut self, target: &Location, value: &Expr) {
        match target {
            Location::Name(name) => {
                let binding = self.scopes.lookup(name).cloned();
                let value_ty = self.check_expr(value);
                match binding {
                    None => self.report(
                        DiagnosticKind::UnresolvedName,
                        format!("undeclared identifier '{}'", name),
                    ),
                    Some(SymbolInfo::Function(_)) => self.report(
                        DiagnosticKind::NotAVariable,
                        format!("'{}' is not a variable", name),
                    ),
                    Some(SymbolInfo::Variable { ty, is_const }) => {
                        if is_const {
                            self.report(
                                DiagnosticKind::ConstAssignment,
                                format!("cannot assign to constant '{}'", name),
                            );
                        }
                        if !ty.is_error() && !value_ty.is_error() && ty != value_ty {
                            self.report(
                                DiagnosticKind::TypeMismatch,
                                format!(
                                    "type mismatch in assignment to '{}': expected {}, found {}",
                                    name, ty, value_ty
                                ),
                            );
                        }
                    }
                }
            }
            Location::Deref(addr) => {
                self.check_address(addr);
                let value_ty = self.check_expr(value);
                if !value_ty.is_error()
                    && !matches!(value_ty, Type::Int | Type::Float | Type::Char)
                {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!("cannot store {} through a memory reference", value_ty),
                    );
                }
            }
        }
    }

    fn check_function(&mut self, decl: &FuncDecl) {
        let signature = Signature {
            params: decl.params.iter().map(|p| p.ty).collect(),
            return_type: decl.return_type(),
        };

        if !self.scopes.is_global() {
            self.report(
                DiagnosticKind::MisplacedFunction,
                format!("function '{}' must be declared at global scope", decl.name),
            );
        } else if !self
            .scopes
            .declare(&decl.name, SymbolInfo::Function(signature.clone()))
        {
            self.report(
                DiagnosticKind::Redeclaration,
                format!("function '{}' already declared", decl.name),
            );
        }

        // Loops outside the function are not breakable from inside it.
        let saved_loops = std::mem::take(&mut self.loop_depth);
        let saved_function = self.function.replace(FunctionContext {
            name: decl.name.clone(),
            return_type: signature.return_type,
        });

        self.scopes.push();
        for param in &decl.params {
            let mut ty = param.ty;
            if ty == Type::Void {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    format!("parameter '{}' cannot have type void", param.name),
                );
                ty = Type::Error;
            }
            let info = SymbolInfo::Variable {
                ty,
                is_const: false,
            };
            if !self.scopes.declare(&param.name, info) {
                self.report(
                    DiagnosticKind::Redeclaration,
                    format!(
                        "parameter '{}' already declared in function '{}'",
                        param.name, decl.name
                    ),
                );
            }
        }
        for stmt in &decl.body {
            self.check_stmt(stmt);
        }
        self.scopes.pop();

        let returns_value = !matches!(signature.return_type, Type::Void | Type::Error);
        if !decl.is_import && returns_value && !block_terminates(&decl.body) {
            self.report(
                DiagnosticKind::MissingReturn,
                format!("function '{}' may not return a value", decl.name),
            );
        }

        self.function = saved_function;
        self.loop_depth = saved_loops;
    }

    fn check_return(&mut self, expr: Option<&Expr>) {
        let found = expr.map(|e| self.check_expr(e));

        let Some(function) = &self.function else {
            self.report(DiagnosticKind::InvalidReturn, "'return' outside of a function");
            return;
        };
        let (name, expected) = (function.name.clone(), function.return_type);

        match found {
            Some(_) if expected == Type::Void => self.report(
                DiagnosticKind::InvalidReturn,
                format!("void function '{}' cannot return a value", name),
            ),
            Some(found) => {
                if !found.is_error() && found != expected {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "return type mismatch in '{}': expected {}, found {}",
                            name, expected, found
                        ),
                    );
                }
            }
            None if expected != Type::Void => self.report(
                DiagnosticKind::InvalidReturn,
                format!("function '{}' must return a value of type {}", name, expected),
            ),
            None => {}
        }
    }

    fn check_condition(&mut self, cond: &Expr, keyword: &str) {
        let ty = self.check_expr(cond);
        if !ty.is_error() && ty != Type::Bool {
            self.report(
                DiagnosticKind::TypeMismatch,
                format!("'{}' condition must be bool, found {}", keyword, ty),
            );
        }
    }

    fn check_address(&mut self, addr: &Expr) {
        let ty = self.check_expr(addr);
        if !ty.is_error() && ty != Type::Int {
            self.report(
                DiagnosticKind::TypeMismatch,
                format!("memory address must be int, found {}", ty),
            );
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn check_expr(&mut self, expr: &Expr) -> Type {
        match expr {
            Expr::Literal(lit) => lit.ty(),

            Expr::Binary { op, lhs, rhs } => {
                let l = self.check_expr(lhs);
                let r = self.check_expr(rhs);
                self.check_binary(*op, l, r)
            }

            Expr::Unary { op, operand } => {
                let ty = self.check_expr(operand);
                self.check_unary(*op, ty)
            }

            Expr::Call { callee, args } => self.check_call(callee, args),

            Expr::Load(Location::Name(name)) => match self.scopes.lookup(name) {
                Some(SymbolInfo::Variable { ty, .. }) => *ty,
                Some(SymbolInfo::Function(_)) => {
                    self.report(
                        DiagnosticKind::NotAVariable,
                        format!("'{}' is a function, not a variable", name),
                    );
                    Type::Error
                }
                None => {
                    self.report(
                        DiagnosticKind::UnresolvedName,
                        format!("undeclared identifier '{}'", name),
                    );
                    Type::Error
                }
            },

            Expr::Load(Location::Deref(addr)) => {
                self.check_address(addr);
                Type::Int
            }

            Expr::Cast { target, expr } => {
                let source = self.check_expr(expr);
                if !target.is_castable() {
                    self.report(
                        DiagnosticKind::InvalidCast,
                        format!("cannot cast to {}", target),
                    );
                    return Type::Error;
                }
                if !source.is_error() && !source.is_castable() {
                    self.report(
                        DiagnosticKind::InvalidCast,
                        format!("cannot cast {} to {}", source, target),
                    );
                }
                *target
            }
        }
    }

    fn check_binary(&mut self, op: BinOp, l: Type, r: Type) -> Type {
        let silent = l.is_error() || r.is_error();
        match op {
            BinOp::And | BinOp::Or => {
                if !silent && (l != Type::Bool || r != Type::Bool) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "logical operator '{}' requires bool operands, found {} and {}",
                            op.symbol(),
                            l,
                            r
                        ),
                    );
                }
                Type::Bool
            }
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                if !silent && !(l.is_numeric() && r.is_numeric()) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "relational operator '{}' requires numeric operands, found {} and {}",
                            op.symbol(),
                            l,
                            r
                        ),
                    );
                }
                Type::Bool
            }
            BinOp::Eq | BinOp::Ne => {
                if !silent && l != r {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "equality operator '{}' requires operands of the same type, found {} and {}",
                            op.symbol(),
                            l,
                            r
                        ),
                    );
                }
                Type::Bool
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                if silent {
                    return Type::Error;
                }
                if !(l.is_numeric() && r.is_numeric()) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "arithmetic operator '{}' requires numeric operands, found {} and {}",
                            op.symbol(),
                            l,
                            r
                        ),
                    );
                    return Type::Error;
                }
                if l == Type::Float || r == Type::Float {
                    Type::Float
                } else {
                    Type::Int
                }
            }
        }
    }

    fn check_unary(&mut self, op: UnaryOp, ty: Type) -> Type {
        if ty.is_error() {
            return Type::Error;
        }
        match op {
            UnaryOp::Pos | UnaryOp::Neg | UnaryOp::Grow => {
                if ty.is_numeric() {
                    ty
                } else {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "unary operator '{}' requires a numeric operand, found {}",
                            op.symbol(),
                            ty
                        ),
                    );
                    Type::Error
                }
            }
            UnaryOp::Not => {
                if ty != Type::Bool {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        format!("unary operator '!' requires a bool operand, found {}", ty),
                    );
                }
                Type::Bool
            }
        }
    }

    fn check_call(&mut self, callee: &str, args: &[Expr]) -> Type {
        let found: Vec<Type> = args.iter().map(|arg| self.check_expr(arg)).collect();

        let signature = match self.scopes.lookup(callee).cloned() {
            Some(SymbolInfo::Function(sig)) => sig,
            Some(SymbolInfo::Variable { .. }) => {
                self.report(
                    DiagnosticKind::NotCallable,
                    format!("'{}' is not a function", callee),
                );
                return Type::Error;
            }
            None => {
                self.report(
                    DiagnosticKind::UnresolvedName,
                    format!("undeclared function '{}'", callee),
                );
                return Type::Error;
            }
        };

        if found.len() != signature.params.len() {
            self.report(
                DiagnosticKind::ArityMismatch,
                format!(
                    "function '{}' expects {} arguments, got {}",
                    callee,
                    signature.params.len(),
                    found.len()
                ),
            );
        }

        for (i, (found, expected)) in found.iter().zip(&signature.params).enumerate() {
            if !found.is_error() && !expected.is_error() && found != expected {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "argument {} of call to '{}': expected {}, found {}",
                        i + 1,
                        callee,
                        expected,
                        found
                    ),
                );
            }
        }

        signature.return_type
    }
}
