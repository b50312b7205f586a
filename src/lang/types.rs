use serde::{Deserialize, Serialize};
use std::fmt;

/// Static type of a GoxLang expression or binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Float,
    Bool,
    Char,

    /// Return type of functions that produce no value.
    Void,

    /// Sentinel assigned to a subtree that already produced a diagnostic.
    ///
    /// Operators and checks that see `Error` stay silent, so one mistake
    /// yields one message.
    Error,
}

impl Type {
    /// Resolve a source-level type name (`int`, `float`, `bool`, `char`, `void`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "bool" => Some(Type::Bool),
            "char" => Some(Type::Char),
            "void" => Some(Type::Void),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Float => "float",
            Type::Bool => "bool",
            Type::Char => "char",
            Type::Void => "void",
            Type::Error => "error",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_error(self) -> bool {
        self == Type::Error
    }

    /// Types a value of which can be the source of a cast.
    pub fn is_castable(self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Bool | Type::Char)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
