use serde::{Deserialize, Serialize};

/// Runtime value in the GoxLang VM.
///
/// Values are the only data that can exist on the evaluation stack or in a
/// frame's locals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating-point number.
    Float(f64),

    /// Boolean value.
    Bool(bool),

    /// Single byte character.
    Char(u8),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
        }
    }
}

impl std::fmt::Display for Value {
    /// Natural representation, as `PRINT` shows values outside the byte range.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            // Debug keeps the fractional part: 3.0 stays "3.0"
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", *c as char),
        }
    }
}
