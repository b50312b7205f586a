use crate::lang::node::Stmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A node with no lowering rule
    UnhandledNode {
        node_type: String,
        hint: Option<String>,
    },
    /// A node that's valid but appeared in an invalid position
    InvalidPosition {
        node_type: String,
        name: Option<String>,
        reason: String,
        hint: Option<String>,
    },
    /// Internal generator error (shouldn't happen for analyzed programs)
    Internal(String),
}

impl CompileError {
    /// Create an error for an unhandled node type
    pub fn unhandled(node_type: &str, hint: impl Into<String>) -> Self {
        CompileError::UnhandledNode {
            node_type: node_type.to_string(),
            hint: Some(hint.into()),
        }
    }

    /// A loop-control statement with no enclosing loop
    pub fn outside_loop(stmt: &Stmt) -> Self {
        CompileError::InvalidPosition {
            node_type: stmt_type_name(stmt).to_string(),
            name: None,
            reason: "no enclosing loop".to_string(),
            hint: Some("break and continue may only appear inside a while body".to_string()),
        }
    }

    /// A `return` in top-level code
    pub fn return_at_top_level() -> Self {
        CompileError::InvalidPosition {
            node_type: "return".to_string(),
            name: None,
            reason: "return cannot appear outside a function body".to_string(),
            hint: None,
        }
    }

    /// A function declared below the global scope
    pub fn nested_function(name: &str) -> Self {
        CompileError::InvalidPosition {
            node_type: "func".to_string(),
            name: Some(name.to_string()),
            reason: "functions cannot be declared inside a block".to_string(),
            hint: Some("functions must be declared at the top level".to_string()),
        }
    }

    /// Create an internal generator error
    pub fn internal(msg: impl Into<String>) -> Self {
        CompileError::Internal(msg.into())
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UnhandledNode { node_type, hint } => {
                write!(f, "compile error: cannot compile '{}' node", node_type)?;
                if let Some(h) = hint {
                    write!(f, "\n  hint: {}", h)?;
                }
                Ok(())
            }
            CompileError::InvalidPosition {
                node_type,
                name,
                reason,
                hint,
            } => {
                write!(f, "compile error: ")?;
                match name {
                    Some(n) => write!(f, "{} '{}': {}", node_type, n, reason)?,
                    None => write!(f, "{}: {}", node_type, reason)?,
                }
                if let Some(h) = hint {
                    write!(f, "\n  hint: {}", h)?;
                }
                Ok(())
            }
            CompileError::Internal(msg) => {
                write!(f, "compile error: internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for CompileError {}

/// Source keyword of a statement
fn stmt_type_name(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::VarDecl { is_const: true, .. } => "const",
        Stmt::VarDecl { .. } => "var",
        Stmt::Func(_) => "func",
        Stmt::Assign { .. } => "assignment",
        Stmt::If { .. } => "if",
        Stmt::While { .. } => "while",
        Stmt::Break => "break",
        Stmt::Continue => "continue",
        Stmt::Return(_) => "return",
        Stmt::Print(_) => "print",
        Stmt::Expr(_) => "expression statement",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhandled_node_display() {
        let err = CompileError::unhandled("cast", "casts to void have no lowering");

        let msg = err.to_string();
        assert!(msg.contains("cannot compile 'cast'"));
        assert!(msg.contains("hint: casts to void"));
    }

    #[test]
    fn test_outside_loop_display() {
        let msg = CompileError::outside_loop(&Stmt::Continue).to_string();
        assert!(msg.starts_with("compile error: continue: no enclosing loop"));
        assert!(msg.contains("hint"));
    }

    #[test]
    fn test_nested_function_display() {
        let msg = CompileError::nested_function("inner").to_string();
        assert!(msg.contains("func 'inner'"));
        assert!(msg.contains("top level"));
    }

    #[test]
    fn test_return_at_top_level_has_no_hint() {
        let msg = CompileError::return_at_top_level().to_string();
        assert!(msg.contains("outside a function body"));
        assert!(!msg.contains("hint"));
    }

    #[test]
    fn test_internal_error_display() {
        let err = CompileError::internal("something went wrong");

        let msg = err.to_string();
        assert!(msg.contains("internal"));
        assert!(msg.contains("something went wrong"));
    }

    #[test]
    fn test_error_implements_std_error() {
        let err = CompileError::internal("test");
        let _: &dyn std::error::Error = &err;
    }
}
