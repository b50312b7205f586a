use std::collections::HashMap;

use crate::lang::types::Type;

/// Signature of a declared function.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub return_type: Type,
}

/// What a name is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolInfo {
    Variable { ty: Type, is_const: bool },
    Function(Signature),
}

/// Stack of name→symbol maps. The global scope sits below every nested
/// scope and is never popped.
#[derive(Debug)]
pub struct ScopeStack {
    global: HashMap<String, SymbolInfo>,
    nested: Vec<HashMap<String, SymbolInfo>>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            global: HashMap::new(),
            nested: Vec::new(),
        }
    }

    pub fn push(&mut self) {
        self.nested.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.nested.pop();
    }

    /// Number of active scopes, the global one included.
    pub fn depth(&self) -> usize {
        self.nested.len() + 1
    }

    /// True while the global scope is the innermost one.
    pub fn is_global(&self) -> bool {
        self.nested.is_empty()
    }

    /// Bind `name` in the innermost scope.
    ///
    /// Returns `false` and keeps the existing binding if the name is already
    /// declared in that scope.
    pub fn declare(&mut self, name: &str, info: SymbolInfo) -> bool {
        let current = match self.nested.last_mut() {
            Some(scope) => scope,
            None => &mut self.global,
        };
        if current.contains_key(name) {
            return false;
        }
        current.insert(name.to_string(), info);
        true
    }

    /// Innermost binding of `name`.
    pub fn lookup(&self, name: &str) -> Option<&SymbolInfo> {
        self.nested
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.global.get(name))
    }

    pub fn globals(&self) -> &HashMap<String, SymbolInfo> {
        &self.global
    }
}
