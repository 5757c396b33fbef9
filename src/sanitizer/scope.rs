//! Scoped symbol table
//!
//! The outermost scope holds module-level names (structs, externals,
//! functions). Function bodies and nested blocks push further scopes; lookups
//! walk from the innermost scope outwards.

use crate::ast::{ExpressionType, VariableId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Struct,
    Function,
    Variable { id: VariableId, ty: ExpressionType },
}

#[derive(Debug, Default)]
pub struct Scope {
    symbols: HashMap<String, Symbol>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub struct SymbolTable {
    /// Innermost last; never empty
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Depth of the innermost scope, 0 for module level
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    /// Declare `name` in the innermost scope. Returns `false` if the name is
    /// already declared in that same scope.
    pub fn declare(&mut self, name: &str, symbol: Symbol) -> bool {
        match self.scopes.last_mut() {
            Some(scope) if !scope.symbols.contains_key(name) => {
                scope.symbols.insert(name.to_string(), symbol);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.symbols.get(name))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: u32) -> Symbol {
        Symbol::Variable {
            id: VariableId(id),
            ty: ExpressionType::f32(),
        }
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        assert!(table.declare("x", var(0)));
        table.push_scope();
        assert!(table.declare("x", var(1)));
        assert_eq!(table.lookup("x"), Some(&var(1)));
        table.pop_scope();
        assert_eq!(table.lookup("x"), Some(&var(0)));
    }

    #[test]
    fn test_same_scope_redeclaration_rejected() {
        let mut table = SymbolTable::new();
        assert!(table.declare("x", var(0)));
        assert!(!table.declare("x", var(1)));
    }

    #[test]
    fn test_popped_names_are_gone() {
        let mut table = SymbolTable::new();
        table.push_scope();
        table.declare("tmp", var(3));
        assert_eq!(table.depth(), 1);
        table.pop_scope();
        assert_eq!(table.lookup("tmp"), None);
        table.pop_scope();
        assert_eq!(table.depth(), 0);
    }
}
