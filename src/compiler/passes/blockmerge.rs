//! Block merging.
//!
//! Inlining splits blocks at every call site it expands, leaving chains of blocks joined
//! by unconditional jumps. This pass undoes two shapes:
//!
//! ```text
//!   merge                         bypass
//!
//!   B: ...                        P: if c goto T else X      P: if c goto S else X
//!      goto S           ==>       T: goto S            ==>
//!   S: (only pred B)              S: ...                     S: ...
//!      ...
//! ```
//!
//! Neither shape is touched when exception handlers cover the blocks involved, since the
//! handler edges depend on block boundaries.

use crate::{
    analysis::{BlockId, SsaFunction, SsaOp},
    compiler::{CompilerContext, EventKind, SsaPass},
    metadata::MethodRef,
    Result,
};

/// Merges jump-connected blocks and bypasses empty trampolines.
#[derive(Debug, Default)]
pub struct BlockMergingPass;

impl BlockMergingPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// What [`merge_blocks`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Blocks absorbed into their single predecessor.
    pub merged: usize,
    /// Jump-only blocks bypassed and removed.
    pub bypassed: usize,
}

impl MergeStats {
    /// Total number of blocks eliminated.
    #[must_use]
    pub fn total(&self) -> usize {
        self.merged + self.bypassed
    }
}

/// Merges and bypasses blocks in `ssa` until nothing changes.
///
/// # Errors
///
/// Returns an error if the graph is inconsistent (a phi whose block disagrees with its
/// predecessor list).
pub fn merge_blocks(ssa: &mut SsaFunction) -> Result<MergeStats> {
    let mut stats = MergeStats::default();
    loop {
        let mut changed = false;
        for block in ssa.block_ids() {
            if ssa.block(block).is_removed() {
                continue;
            }
            if try_merge(ssa, block)? {
                stats.merged += 1;
                changed = true;
            } else if try_bypass(ssa, block)? {
                stats.bypassed += 1;
                changed = true;
            }
        }
        if !changed {
            return Ok(stats);
        }
    }
}

fn jump_target(ssa: &SsaFunction, block: BlockId) -> Option<BlockId> {
    match ssa.terminator(block).map(|t| t.op()) {
        Some(SsaOp::Goto { target }) => Some(*target),
        _ => None,
    }
}

/// Absorbs the jump target of `block` if `block` is its only predecessor.
fn try_merge(ssa: &mut SsaFunction, block: BlockId) -> Result<bool> {
    let Some(succ) = jump_target(ssa, block) else {
        return Ok(false);
    };
    if succ == block
        || succ == ssa.entry()
        || ssa.predecessors(succ) != [block]
        || !ssa.block(block).handlers().is_empty()
        || !ssa.block(succ).handlers().is_empty()
    {
        return Ok(false);
    }

    // With a single predecessor every phi has exactly one operand.
    for phi in ssa.block(succ).phis().to_vec() {
        let node = ssa.phi(phi);
        let value = node.value();
        let [operand] = node.operands() else {
            return Err(malformed_error!(
                "{} has {} operands for one predecessor",
                phi,
                node.operands().len()
            ));
        };
        let operand = *operand;
        if operand == value {
            return Ok(false);
        }
        ssa.replace_all_uses(value, operand);
        ssa.remove_phi(phi)?;
    }

    let Some(jump) = ssa.terminator(block).map(|t| t.id()) else {
        return Ok(false);
    };
    ssa.remove_instruction(jump)?;
    ssa.absorb_block(block, succ)?;
    Ok(true)
}

/// Redirects every predecessor of a jump-only `block` to its target and removes it.
fn try_bypass(ssa: &mut SsaFunction, block: BlockId) -> Result<bool> {
    let Some(succ) = jump_target(ssa, block) else {
        return Ok(false);
    };
    let b = ssa.block(block);
    if succ == block
        || block == ssa.entry()
        || b.instructions().len() != 1
        || !b.phis().is_empty()
        || !b.handlers().is_empty()
        || b.predecessors().is_empty()
    {
        return Ok(false);
    }
    let Some(slot) = ssa.predecessors(succ).iter().position(|&p| p == block) else {
        return Err(malformed_error!(
            "{} jumps to {} but is not its predecessor",
            block,
            succ
        ));
    };

    let mut preds = ssa.predecessors(block).to_vec();
    preds.dedup();
    // Every predecessor must reach the trampoline through its terminator, not a handler.
    if preds
        .iter()
        .any(|&p| !ssa.normal_successors(p).contains(&block))
    {
        return Ok(false);
    }

    let phis = ssa.block(succ).phis().to_vec();
    for pred in preds {
        let edges = ssa.retarget(pred, block, succ);
        for _ in 0..edges {
            ssa.add_predecessor(succ, pred);
            for &phi in &phis {
                let mut operands = ssa.phi(phi).operands().to_vec();
                operands.push(operands[slot]);
                ssa.set_phi_operands(phi, operands);
            }
        }
    }
    ssa.remove_predecessor_at(succ, slot)?;

    while let Some(index) = ssa.predecessors(block).len().checked_sub(1) {
        ssa.remove_predecessor_at(block, index)?;
    }
    let Some(jump) = ssa.terminator(block).map(|t| t.id()) else {
        return Ok(false);
    };
    ssa.remove_instruction(jump)?;
    ssa.remove_block(block)?;
    Ok(true)
}

impl SsaPass for BlockMergingPass {
    fn name(&self) -> &'static str {
        "BlockMerging"
    }

    fn description(&self) -> &'static str {
        "Merges jump-connected blocks and removes trampolines"
    }

    fn should_run(&self, _method: &MethodRef, ctx: &CompilerContext) -> bool {
        ctx.config.enable_block_merging
    }

    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: &MethodRef,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        let stats = merge_blocks(ssa)?;
        if stats.total() > 0 {
            ctx.events
                .record(EventKind::BlockMerged)
                .method(method)
                .message(format!(
                    "{} merged, {} bypassed",
                    stats.merged, stats.bypassed
                ))
                .pass(self.name());
        }
        Ok(stats.total() > 0)
    }
}
