//! SSA basic blocks.
//!
//! A block holds phi nodes (evaluated simultaneously at entry), an ordered list of
//! instructions ending in exactly one terminator, its predecessor list and the exception
//! handlers covering its instructions.
//!
//! ```text
//! B2: preds [B0, B1]
//!   v3 = phi(v1, v2)
//!   v4 = add v3, v0
//!   goto B3
//! ```
//!
//! Predecessors are recorded once per incoming edge, so a conditional branch whose two
//! targets coincide contributes two entries (and every phi in the target two operands).
//! Exceptional edges from covered blocks to their handlers are predecessors too.

use crate::{
    analysis::ssa::{InsnId, PhiId},
    metadata::TypeRef,
};

arena_id! {
    /// Identifier of a basic block within one function.
    BlockId, "B"
}

/// An exceptional successor of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CatchHandler {
    /// Caught type; `None` catches everything
    pub guard: Option<TypeRef>,
    /// The handler block
    pub target: BlockId,
}

/// A basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaBlock {
    id: BlockId,
    phis: Vec<PhiId>,
    instructions: Vec<InsnId>,
    predecessors: Vec<BlockId>,
    handlers: Vec<CatchHandler>,
    removed: bool,
}

impl SsaBlock {
    pub(crate) fn new(id: BlockId) -> Self {
        SsaBlock {
            id,
            phis: Vec::new(),
            instructions: Vec::new(),
            predecessors: Vec::new(),
            handlers: Vec::new(),
            removed: false,
        }
    }

    /// This block's identifier.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Phi nodes at block entry.
    #[must_use]
    pub fn phis(&self) -> &[PhiId] {
        &self.phis
    }

    /// Instructions in execution order; the last one is the terminator.
    #[must_use]
    pub fn instructions(&self) -> &[InsnId] {
        &self.instructions
    }

    /// Predecessor blocks, one entry per incoming edge.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Exception handlers covering this block, in dispatch order.
    #[must_use]
    pub fn handlers(&self) -> &[CatchHandler] {
        &self.handlers
    }

    /// Returns `true` once the block has been removed.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn phis_mut(&mut self) -> &mut Vec<PhiId> {
        &mut self.phis
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<InsnId> {
        &mut self.instructions
    }

    pub(crate) fn predecessors_mut(&mut self) -> &mut Vec<BlockId> {
        &mut self.predecessors
    }

    pub(crate) fn handlers_mut(&mut self) -> &mut Vec<CatchHandler> {
        &mut self.handlers
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
        self.phis.clear();
        self.instructions.clear();
        self.predecessors.clear();
        self.handlers.clear();
    }

    pub(crate) fn renumber(&mut self, id: BlockId) {
        self.id = id;
    }
}
