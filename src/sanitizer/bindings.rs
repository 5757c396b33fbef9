//! Resource binding table
//!
//! Every external entry occupies one `(set, binding)` slot. The table is
//! ordered by slot so backends emit bindings deterministically.

use crate::ast::{ExpressionType, VariableId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub set: u32,
    pub binding: u32,
    pub name: String,
    pub ty: ExpressionType,
    pub variable: VariableId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    slots: BTreeMap<(u32, u32), Binding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot. On conflict the table is left unchanged and the
    /// existing occupant is returned.
    pub fn insert(&mut self, binding: Binding) -> Result<(), &Binding> {
        let key = (binding.set, binding.binding);
        if self.slots.contains_key(&key) {
            return Err(&self.slots[&key]);
        }
        self.slots.insert(key, binding);
        Ok(())
    }

    pub fn get(&self, set: u32, binding: u32) -> Option<&Binding> {
        self.slots.get(&(set, binding))
    }

    pub fn by_variable(&self, id: VariableId) -> Option<&Binding> {
        self.slots.values().find(|b| b.variable == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.slots.values()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
