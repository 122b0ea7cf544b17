//! SSA values and their def/use bookkeeping.
//!
//! Every value has exactly one defining point for its lifetime: an instruction or a phi.
//! The use-list records each distinct instruction or phi that reads the value; an
//! instruction that uses the same value twice appears once.

use std::sync::Arc;

use crate::{
    analysis::ssa::{InsnId, PhiId},
    metadata::ValueType,
};

arena_id! {
    /// Identifier of an SSA value within one function.
    ValueId, "v"
}

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Not (or no longer) defined; only transient during construction and removal
    None,
    /// Result of an instruction
    Instruction(InsnId),
    /// Result of a phi
    Phi(PhiId),
}

/// A reader of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueUser {
    /// An instruction operand
    Instruction(InsnId),
    /// A phi operand
    Phi(PhiId),
}

/// An SSA value: semantic type, defining point and use-list.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaValue {
    id: ValueId,
    ty: ValueType,
    def: ValueDef,
    users: Vec<ValueUser>,
    debug_name: Option<Arc<str>>,
}

impl SsaValue {
    pub(crate) fn new(id: ValueId, ty: ValueType) -> Self {
        SsaValue {
            id,
            ty,
            def: ValueDef::None,
            users: Vec::new(),
            debug_name: None,
        }
    }

    /// This value's identifier.
    #[must_use]
    pub fn id(&self) -> ValueId {
        self.id
    }

    /// Semantic type tag.
    #[must_use]
    pub fn ty(&self) -> ValueType {
        self.ty
    }

    /// Defining point.
    #[must_use]
    pub fn def(&self) -> ValueDef {
        self.def
    }

    /// Distinct instructions and phis reading this value.
    #[must_use]
    pub fn users(&self) -> &[ValueUser] {
        &self.users
    }

    /// Returns `true` if nothing reads this value.
    #[must_use]
    pub fn is_unused(&self) -> bool {
        self.users.is_empty()
    }

    /// Source-level name from the local-variable table, if any.
    #[must_use]
    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    pub(crate) fn set_def(&mut self, def: ValueDef) {
        self.def = def;
    }

    pub(crate) fn set_debug_name(&mut self, name: Arc<str>) {
        self.debug_name = Some(name);
    }

    pub(crate) fn add_user(&mut self, user: ValueUser) {
        if !self.users.contains(&user) {
            self.users.push(user);
        }
    }

    pub(crate) fn remove_user(&mut self, user: ValueUser) {
        self.users.retain(|u| *u != user);
    }

    pub(crate) fn take_users(&mut self) -> Vec<ValueUser> {
        std::mem::take(&mut self.users)
    }

    pub(crate) fn clear_users(&mut self) {
        self.users.clear();
    }

    pub(crate) fn renumber(&mut self, id: ValueId) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_list_is_a_set() {
        let mut value = SsaValue::new(ValueId::new(0), ValueType::Int);
        let user = ValueUser::Instruction(InsnId::new(3));
        value.add_user(user);
        value.add_user(user);
        value.add_user(ValueUser::Phi(PhiId::new(1)));
        assert_eq!(value.users().len(), 2);

        value.remove_user(user);
        assert_eq!(value.users(), &[ValueUser::Phi(PhiId::new(1))]);
        assert!(!value.is_unused());
        assert_eq!(value.id().to_string(), "v0");
    }
}
