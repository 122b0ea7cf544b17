//! SSA instructions: an operation placed in a block.

use std::fmt;

use crate::analysis::ssa::{BlockId, SsaOp, ValueId};

arena_id! {
    /// Identifier of an instruction within one function.
    InsnId, "i"
}

/// Source position of an instruction, for diagnostics.
///
/// `offset` is the index of the originating stack instruction. Instructions created by
/// optimizations inherit the offset of the instruction they were derived from and are
/// flagged `synthetic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Index into the originating instruction stream
    pub offset: usize,
    /// Created by an optimization rather than lifted
    pub synthetic: bool,
}

impl Position {
    /// A position lifted from instruction `offset`.
    #[must_use]
    pub const fn at(offset: usize) -> Self {
        Position {
            offset,
            synthetic: false,
        }
    }

    /// A synthetic position derived from instruction `offset`.
    #[must_use]
    pub const fn synthetic(offset: usize) -> Self {
        Position {
            offset,
            synthetic: true,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.synthetic {
            write!(f, "@{}*", self.offset)
        } else {
            write!(f, "@{}", self.offset)
        }
    }
}

/// An operation with at most one result, placed in a block.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaInstruction {
    id: InsnId,
    op: SsaOp,
    dest: Option<ValueId>,
    block: BlockId,
    position: Position,
    removed: bool,
}

impl SsaInstruction {
    pub(crate) fn new(
        id: InsnId,
        op: SsaOp,
        dest: Option<ValueId>,
        block: BlockId,
        position: Position,
    ) -> Self {
        SsaInstruction {
            id,
            op,
            dest,
            block,
            position,
            removed: false,
        }
    }

    /// This instruction's identifier.
    #[must_use]
    pub fn id(&self) -> InsnId {
        self.id
    }

    /// The operation performed.
    #[must_use]
    pub fn op(&self) -> &SsaOp {
        &self.op
    }

    /// The value this instruction defines, if any.
    #[must_use]
    pub fn dest(&self) -> Option<ValueId> {
        self.dest
    }

    /// The containing block.
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Diagnostic position.
    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    /// Returns `true` once the instruction has been removed from its block.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Whether the instruction may transfer control abnormally.
    #[must_use]
    pub fn may_throw(&self) -> bool {
        self.op.may_throw()
    }

    /// Returns `true` if the instruction ends its block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    pub(crate) fn op_mut(&mut self) -> &mut SsaOp {
        &mut self.op
    }

    pub(crate) fn set_block(&mut self, block: BlockId) {
        self.block = block;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
        self.op = SsaOp::Nop;
        self.dest = None;
    }

    pub(crate) fn renumber(&mut self, id: InsnId) {
        self.id = id;
    }

    pub(crate) fn set_dest(&mut self, dest: Option<ValueId>) {
        self.dest = dest;
    }
}

impl fmt::Display for SsaInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dest {
            Some(dest) => write!(f, "{dest} = {}", self.op),
            None => write!(f, "{}", self.op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ssa::ConstValue;

    #[test]
    fn test_display_and_removal() {
        let mut insn = SsaInstruction::new(
            InsnId::new(0),
            SsaOp::Const(ConstValue::Int(1)),
            Some(ValueId::new(4)),
            BlockId::new(0),
            Position::at(2),
        );
        assert_eq!(insn.to_string(), "v4 = const 1");
        assert!(!insn.may_throw());

        insn.mark_removed();
        assert!(insn.is_removed());
        assert_eq!(insn.dest(), None);
        assert_eq!(Position::synthetic(2).to_string(), "@2*");
    }
}
