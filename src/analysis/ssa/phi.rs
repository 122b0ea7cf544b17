//! Phi nodes for control flow merges.
//!
//! A phi sits at the entry of a block and selects one operand per predecessor edge. The
//! operand list is aligned with the block's predecessor list: operand `i` is the value that
//! flows in along the edge from `predecessors()[i]`.
//!
//! # Trivial phis
//!
//! A phi is *trivial* when every operand is either one value `v` or the phi itself, in
//! which case every use of the phi can be replaced by `v`. See [`PhiNode::trivial_operand`].

use std::fmt;

use crate::analysis::ssa::{BlockId, ValueId};

arena_id! {
    /// Identifier of a phi node within one function.
    PhiId, "phi"
}

/// A phi node: one result value merging one operand per predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct PhiNode {
    id: PhiId,
    value: ValueId,
    block: BlockId,
    operands: Vec<ValueId>,
    removed: bool,
}

impl PhiNode {
    pub(crate) fn new(id: PhiId, value: ValueId, block: BlockId) -> Self {
        PhiNode {
            id,
            value,
            block,
            operands: Vec::new(),
            removed: false,
        }
    }

    /// This phi's identifier.
    #[must_use]
    pub fn id(&self) -> PhiId {
        self.id
    }

    /// The value this phi defines.
    #[must_use]
    pub fn value(&self) -> ValueId {
        self.value
    }

    /// The block this phi belongs to.
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Operands, aligned with the block's predecessors.
    #[must_use]
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    /// Returns `true` once the phi has been removed.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// The single value this phi merges, ignoring self-references.
    ///
    /// Returns `None` for a phi merging two or more distinct values, and for a phi with no
    /// operands other than itself (which only occurs in unreachable code).
    #[must_use]
    pub fn trivial_operand(&self) -> Option<ValueId> {
        let mut same = None;
        for &operand in &self.operands {
            if operand == self.value || Some(operand) == same {
                continue;
            }
            if same.is_some() {
                return None;
            }
            same = Some(operand);
        }
        same
    }

    pub(crate) fn operands_mut(&mut self) -> &mut Vec<ValueId> {
        &mut self.operands
    }

    pub(crate) fn set_operands(&mut self, operands: Vec<ValueId>) {
        self.operands = operands;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
        self.operands.clear();
    }

    pub(crate) fn renumber(&mut self, id: PhiId, value: ValueId, block: BlockId) {
        self.id = id;
        self.value = value;
        self.block = block;
    }
}

impl fmt::Display for PhiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = phi(", self.value)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{operand}")?;
        }
        f.write_str(")")
    }
}
