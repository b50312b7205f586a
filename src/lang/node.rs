use super::types::Type;
use serde::{Deserialize, Serialize};

/// Statement node of a GoxLang program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    // ─────────────────────────── Declarations ───────────────────────────
    /// `var x int = 1;` or `const y = 2.5;`
    ///
    /// At least one of `ty` and `init` is expected; the analyzer reports a
    /// declaration with neither.
    VarDecl {
        is_const: bool,
        name: String,
        ty: Option<Type>,
        init: Option<Expr>,
    },

    /// `func add(a int, b int) int { ... }`
    Func(FuncDecl),

    // ──────────────────────────── Assignment ────────────────────────────
    /// `x = e;` or `` `addr = e; ``
    Assign { target: Location, value: Expr },

    // ─────────────────────────── Control flow ───────────────────────────
    /// `if (cond) { ... } else { ... }`
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },

    /// `while (cond) { ... }`
    While { cond: Expr, body: Vec<Stmt> },

    /// `break;`
    Break,

    /// `continue;`
    Continue,

    /// `return e;` or `return;`
    Return(Option<Expr>),

    // ─────────────────────────────── I/O ────────────────────────────────
    /// `print(e);`
    Print(Expr),

    /// An expression evaluated for its effect, typically a call.
    Expr(Expr),
}

/// Function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    /// `import func ...` declares a signature whose body lives elsewhere.
    pub is_import: bool,
    pub name: String,
    pub params: Vec<Param>,
    /// `None` means `void`.
    pub return_type: Option<Type>,
    pub body: Vec<Stmt>,
}

impl FuncDecl {
    pub fn return_type(&self) -> Type {
        self.return_type.unwrap_or(Type::Void)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// Expression node. Every expression evaluates to exactly one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),

    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// `f(a, b)`
    Call { callee: String, args: Vec<Expr> },

    /// Read of a name or of linear memory.
    Load(Location),

    /// `int(e)`, `float(e)`, `bool(e)`, `char(e)`
    Cast { target: Type, expr: Box<Expr> },
}

/// An assignable place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Location {
    /// A bare variable name.
    Name(String),

    /// `` `addr ``: the 4-byte memory cell at the computed address.
    Deref(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(u8),
}

impl Literal {
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::Bool(_) => Type::Bool,
            Literal::Char(_) => Type::Char,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `+e`
    Pos,
    /// `-e`
    Neg,
    /// `^e`: grow linear memory by `e` bytes.
    Grow,
    /// `!e`
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Pos => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Grow => "^",
            UnaryOp::Not => "!",
        }
    }
}

// Shorthand constructors, mostly for building trees in tests and tools.
impl Expr {
    pub fn int(n: i64) -> Self {
        Expr::Literal(Literal::Int(n))
    }

    pub fn float(n: f64) -> Self {
        Expr::Literal(Literal::Float(n))
    }

    pub fn bool(b: bool) -> Self {
        Expr::Literal(Literal::Bool(b))
    }

    pub fn char(c: u8) -> Self {
        Expr::Literal(Literal::Char(c))
    }

    pub fn name(name: &str) -> Self {
        Expr::Load(Location::Name(name.to_string()))
    }

    pub fn deref(addr: Expr) -> Self {
        Expr::Load(Location::Deref(Box::new(addr)))
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn call(callee: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: callee.to_string(),
            args,
        }
    }

    pub fn cast(target: Type, expr: Expr) -> Self {
        Expr::Cast {
            target,
            expr: Box::new(expr),
        }
    }
}

impl Stmt {
    /// Whether control can never fall past this statement.
    ///
    /// A `return`, an `if` whose branches both terminate, and a
    /// `while (true)` with no `break` of its own all terminate.
    pub fn terminates(&self) -> bool {
        match self {
            Stmt::Return(_) => true,
            Stmt::If {
                then_body,
                else_body: Some(else_body),
                ..
            } => block_terminates(then_body) && block_terminates(else_body),
            Stmt::While {
                cond: Expr::Literal(Literal::Bool(true)),
                body,
            } => !breaks_out(body),
            _ => false,
        }
    }

    pub fn var(name: &str, ty: Option<Type>, init: Option<Expr>) -> Self {
        Stmt::VarDecl {
            is_const: false,
            name: name.to_string(),
            ty,
            init,
        }
    }

    pub fn constant(name: &str, ty: Option<Type>, init: Expr) -> Self {
        Stmt::VarDecl {
            is_const: true,
            name: name.to_string(),
            ty,
            init: Some(init),
        }
    }

    pub fn assign(name: &str, value: Expr) -> Self {
        Stmt::Assign {
            target: Location::Name(name.to_string()),
            value,
        }
    }

    pub fn store(addr: Expr, value: Expr) -> Self {
        Stmt::Assign {
            target: Location::Deref(Box::new(addr)),
            value,
        }
    }

    pub fn func(
        name: &str,
        params: &[(&str, Type)],
        return_type: Option<Type>,
        body: Vec<Stmt>,
    ) -> Self {
        Stmt::Func(FuncDecl {
            is_import: false,
            name: name.to_string(),
            params: params
                .iter()
                .map(|(name, ty)| Param {
                    name: name.to_string(),
                    ty: *ty,
                })
                .collect(),
            return_type,
            body,
        })
    }
}

/// Whether some statement of `body` terminates.
pub fn block_terminates(body: &[Stmt]) -> bool {
    body.iter().any(Stmt::terminates)
}

/// `break` aimed at the loop owning `body`, not at a nested one.
fn breaks_out(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Break => true,
        Stmt::If {
            then_body,
            else_body,
            ..
        } => breaks_out(then_body) || else_body.as_deref().is_some_and(breaks_out),
        _ => false,
    })
}
