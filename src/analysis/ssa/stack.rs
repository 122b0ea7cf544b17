//! Abstract operand stack used while lifting one block.
//!
//! The lifter simulates the stack machine block by block. [`AbstractStackState`] holds the
//! simulated operand stack and the locals written so far in the current block; it is
//! rebuilt at every block entry and discarded once the block is lifted.
//!
//! # Slots
//!
//! A slot does not always hold a concrete value:
//!
//! | Source | Meaning |
//! |--------|---------|
//! | [`SlotSource::Value`] | An SSA value defined earlier |
//! | [`SlotSource::Local`] | A deferred read of a local, resolved when popped |
//! | [`SlotSource::Incoming`] | The value left at this stack position by the predecessors |
//!
//! Deferred local reads must observe the local as it was when it was loaded, so every
//! rebinding of a local first materializes pending reads of it
//! ([`AbstractStackState::materialize_local`]).
//!
//! Depth is measured in words: `long` and `double` occupy two, like on the real machine.

use std::collections::HashMap;

use crate::{
    analysis::ssa::ValueId,
    metadata::{MethodRef, ValueType},
    Error, Result,
};

/// Where the value in a stack slot comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSource {
    /// A defined value
    Value(ValueId),
    /// A not yet resolved read of a local
    Local(u16),
    /// The value flowing in at this stack position from the block's predecessors
    Incoming(usize),
}

/// One entry of the simulated operand stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
    /// Provenance of the value
    pub source: SlotSource,
    /// Semantic type
    pub ty: ValueType,
}

impl StackSlot {
    /// A slot holding a defined value.
    #[must_use]
    pub const fn value(value: ValueId, ty: ValueType) -> Self {
        StackSlot {
            source: SlotSource::Value(value),
            ty,
        }
    }

    /// Returns `true` for `long` and `double` slots.
    #[must_use]
    pub const fn is_wide(&self) -> bool {
        self.ty.is_wide()
    }
}

/// Simulated operand stack plus the locals bound in the current block.
#[derive(Debug, Clone)]
pub struct AbstractStackState {
    method: MethodRef,
    max_stack: u16,
    offset: usize,
    slots: Vec<StackSlot>,
    locals: HashMap<u16, (ValueId, ValueType)>,
}

impl AbstractStackState {
    /// Creates an empty state for `method` whose stack may hold `max_stack` words.
    #[must_use]
    pub fn new(method: MethodRef, max_stack: u16) -> Self {
        AbstractStackState {
            method,
            max_stack,
            offset: 0,
            slots: Vec::new(),
            locals: HashMap::new(),
        }
    }

    /// Resets the state for a block entered with `incoming` stack slot types.
    pub fn enter_block(&mut self, incoming: &[ValueType]) {
        self.slots = incoming
            .iter()
            .enumerate()
            .map(|(i, &ty)| StackSlot {
                source: SlotSource::Incoming(i),
                ty,
            })
            .collect();
        self.locals.clear();
    }

    /// Sets the instruction offset reported by stack faults.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Number of slots.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Stack height in words.
    #[must_use]
    pub fn words(&self) -> usize {
        self.slots.iter().map(|s| s.ty.slots()).sum()
    }

    /// The slots, bottom first.
    #[must_use]
    pub fn slots(&self) -> &[StackSlot] {
        &self.slots
    }

    /// Pushes a slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack would exceed `max_stack` words.
    pub fn push(&mut self, slot: StackSlot) -> Result<()> {
        if self.words() + slot.ty.slots() > usize::from(self.max_stack) {
            return Err(Error::StackOverflow {
                method: self.method.clone(),
                offset: self.offset,
                max_stack: self.max_stack,
            });
        }
        self.slots.push(slot);
        Ok(())
    }

    /// Pushes a defined value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackOverflow`] if the stack is full.
    pub fn push_value(&mut self, value: ValueId, ty: ValueType) -> Result<()> {
        self.push(StackSlot::value(value, ty))
    }

    /// Pops the top slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the stack is empty.
    pub fn pop(&mut self) -> Result<StackSlot> {
        self.slots.pop().ok_or_else(|| Error::StackUnderflow {
            method: self.method.clone(),
            offset: self.offset,
        })
    }

    /// Pops `count` slots and returns them bottom first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if fewer than `count` slots are present.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<StackSlot>> {
        if count > self.slots.len() {
            return Err(Error::StackUnderflow {
                method: self.method.clone(),
                offset: self.offset,
            });
        }
        Ok(self.slots.split_off(self.slots.len() - count))
    }

    /// The slot `depth` positions below the top (0 is the top).
    ///
    /// # Errors
    ///
    /// Returns [`Error::StackUnderflow`] if the stack is not deep enough.
    pub fn peek(&self, depth: usize) -> Result<&StackSlot> {
        self.slots
            .len()
            .checked_sub(depth + 1)
            .and_then(|i| self.slots.get(i))
            .ok_or_else(|| Error::StackUnderflow {
                method: self.method.clone(),
                offset: self.offset,
            })
    }

    /// Empties the stack (after a throw, or for handler entry).
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Replaces the source of every slot equal to `from`.
    pub fn replace_source(&mut self, from: SlotSource, to: SlotSource) {
        for slot in &mut self.slots {
            if slot.source == from {
                slot.source = to;
            }
        }
    }

    /// Resolves pending reads of `local` to `value`; call before rebinding the local.
    pub fn materialize_local(&mut self, local: u16, value: ValueId) {
        self.replace_source(SlotSource::Local(local), SlotSource::Value(value));
    }

    /// Returns `true` if some slot is a pending read of `local`.
    #[must_use]
    pub fn has_pending_read(&self, local: u16) -> bool {
        self.slots
            .iter()
            .any(|s| s.source == SlotSource::Local(local))
    }

    /// Binds `local` to `value` in the current block.
    pub fn bind_local(&mut self, local: u16, value: ValueId, ty: ValueType) {
        self.locals.insert(local, (value, ty));
    }

    /// The value bound to `local` in the current block, if it was written here.
    #[must_use]
    pub fn local(&self, local: u16) -> Option<(ValueId, ValueType)> {
        self.locals.get(&local).copied()
    }

    /// Locals written in the current block.
    pub fn written_locals(&self) -> impl Iterator<Item = (u16, ValueId, ValueType)> + '_ {
        self.locals.iter().map(|(&l, &(v, ty))| (l, v, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Proto, TypeRef};

    fn state(max_stack: u16) -> AbstractStackState {
        AbstractStackState::new(
            MethodRef::new(TypeRef::class("T"), "m", Proto::new(TypeRef::void(), vec![])),
            max_stack,
        )
    }

    #[test]
    fn test_words_and_overflow() {
        let mut s = state(3);
        s.push_value(ValueId::new(0), ValueType::Long).unwrap();
        s.push_value(ValueId::new(1), ValueType::Int).unwrap();
        assert_eq!(s.depth(), 2);
        assert_eq!(s.words(), 3);
        s.set_offset(7);
        let err = s.push_value(ValueId::new(2), ValueType::Int).unwrap_err();
        assert!(matches!(err, Error::StackOverflow { offset: 7, .. }));
    }

    #[test]
    fn test_underflow() {
        let mut s = state(2);
        assert!(matches!(s.pop(), Err(Error::StackUnderflow { .. })));
        s.push_value(ValueId::new(0), ValueType::Int).unwrap();
        assert!(s.pop_n(2).is_err());
        assert_eq!(s.peek(0).unwrap().source, SlotSource::Value(ValueId::new(0)));
        assert!(s.peek(1).is_err());
    }

    #[test]
    fn test_materialize_pending_local_reads() {
        let mut s = state(4);
        s.push(StackSlot {
            source: SlotSource::Local(1),
            ty: ValueType::Int,
        })
        .unwrap();
        assert!(s.has_pending_read(1));
        s.materialize_local(1, ValueId::new(5));
        assert!(!s.has_pending_read(1));
        assert_eq!(s.pop().unwrap().source, SlotSource::Value(ValueId::new(5)));
    }

    #[test]
    fn test_enter_block() {
        let mut s = state(4);
        s.bind_local(0, ValueId::new(1), ValueType::Int);
        s.enter_block(&[ValueType::Object, ValueType::Int]);
        assert_eq!(s.depth(), 2);
        assert_eq!(s.peek(1).unwrap().source, SlotSource::Incoming(0));
        assert!(s.local(0).is_none());
    }
}
