//! Structural verification of SSA functions.
//!
//! [`verify`] checks the invariants every pass relies on and reports the first violation:
//!
//! - every live block ends in exactly one terminator whose targets are live blocks
//! - every value is defined at most once, and every operand has a live definition
//! - use-lists agree with the operands of live instructions and phis
//! - phi operand counts equal predecessor counts
//! - predecessor lists equal the incoming normal and exceptional edges, as multisets
//! - every use is dominated by its definition; a phi operand must be available at the
//!   end of the matching predecessor

use std::collections::HashMap;

use crate::{
    analysis::ssa::{BlockId, SsaFunction, ValueDef, ValueId, ValueUser},
    utils::graph::{compute_dominators, DominatorTree, GraphBase, NodeId},
    Error, Result,
};

/// Verifies `func`.
///
/// # Errors
///
/// Returns [`Error::SsaVerification`] describing the first violated invariant.
pub fn verify(func: &SsaFunction) -> Result<()> {
    Verifier { func }.run().map_err(|message| Error::SsaVerification {
        method: func.method().clone(),
        message,
    })
}

struct Verifier<'a> {
    func: &'a SsaFunction,
}

impl Verifier<'_> {
    fn run(&self) -> std::result::Result<(), String> {
        let func = self.func;
        let entry = func.entry();
        if func.block_count() == 0 || func.block(entry).is_removed() {
            return Err("function has no entry block".to_string());
        }
        if !func.predecessors(entry).is_empty() {
            return Err(format!("entry {entry} has predecessors"));
        }

        self.check_blocks()?;
        self.check_definitions()?;
        self.check_edges()?;
        self.check_dominance()
    }

    fn check_blocks(&self) -> std::result::Result<(), String> {
        let func = self.func;
        for block in func.blocks() {
            let id = block.id();
            let Some((&last, body)) = block.instructions().split_last() else {
                return Err(format!("{id} is empty"));
            };
            if !func.instruction(last).is_terminator() {
                return Err(format!("{id} does not end in a terminator"));
            }
            if let Some(&misplaced) = body.iter().find(|&&i| func.instruction(i).is_terminator()) {
                return Err(format!("{id}: terminator {misplaced} is not last"));
            }
            for target in func.successors(id) {
                if target.index() >= GraphBase::node_count(func) || func.block(target).is_removed() {
                    return Err(format!("{id} jumps to dead block {target}"));
                }
            }
            for &insn in block.instructions() {
                let instruction = func.instruction(insn);
                if instruction.is_removed() || instruction.block() != id {
                    return Err(format!("{id} lists foreign instruction {insn}"));
                }
            }
            for &phi in block.phis() {
                let node = func.phi(phi);
                if node.is_removed() || node.block() != id {
                    return Err(format!("{id} lists foreign phi {phi}"));
                }
                if node.operands().len() != block.predecessors().len() {
                    return Err(format!(
                        "{phi} in {id} has {} operands for {} predecessors",
                        node.operands().len(),
                        block.predecessors().len()
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_definitions(&self) -> std::result::Result<(), String> {
        let func = self.func;
        let mut defined: HashMap<ValueId, usize> = HashMap::new();

        for insn in func.instructions() {
            if let Some(dest) = insn.dest() {
                *defined.entry(dest).or_default() += 1;
                if func.value(dest).def() != ValueDef::Instruction(insn.id()) {
                    return Err(format!("{dest} does not record {} as its definition", insn.id()));
                }
            }
            for operand in insn.op().operands() {
                self.check_operand(operand, ValueUser::Instruction(insn.id()))?;
            }
        }
        for phi in func.phis() {
            *defined.entry(phi.value()).or_default() += 1;
            if func.value(phi.value()).def() != ValueDef::Phi(phi.id()) {
                return Err(format!(
                    "{} does not record {} as its definition",
                    phi.value(),
                    phi.id()
                ));
            }
            for &operand in phi.operands() {
                self.check_operand(operand, ValueUser::Phi(phi.id()))?;
            }
        }
        if let Some((value, count)) = defined.iter().find(|(_, count)| **count > 1) {
            return Err(format!("{value} is defined {count} times"));
        }

        for value in func.values() {
            for &user in value.users() {
                let uses = match user {
                    ValueUser::Instruction(insn) => {
                        let instruction = func.instruction(insn);
                        !instruction.is_removed() && instruction.op().uses(value.id())
                    }
                    ValueUser::Phi(phi) => {
                        let node = func.phi(phi);
                        !node.is_removed() && node.operands().contains(&value.id())
                    }
                };
                if !uses {
                    return Err(format!("{} lists stale user {user:?}", value.id()));
                }
            }
        }
        Ok(())
    }

    fn check_operand(&self, operand: ValueId, user: ValueUser) -> std::result::Result<(), String> {
        let value = self.func.value(operand);
        if matches!(value.def(), ValueDef::None) {
            return Err(format!("{user:?} reads undefined {operand}"));
        }
        if !value.users().contains(&user) {
            return Err(format!("{operand} is missing user {user:?}"));
        }
        Ok(())
    }

    fn check_edges(&self) -> std::result::Result<(), String> {
        let func = self.func;
        let mut incoming: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for block in func.blocks() {
            for succ in func.successors(block.id()) {
                incoming.entry(succ).or_default().push(block.id());
            }
        }
        for block in func.blocks() {
            let mut expected = incoming.remove(&block.id()).unwrap_or_default();
            let mut actual = block.predecessors().to_vec();
            expected.sort();
            actual.sort();
            if expected != actual {
                return Err(format!(
                    "{} records predecessors {:?} but has incoming edges from {:?}",
                    block.id(),
                    actual,
                    expected
                ));
            }
        }
        Ok(())
    }

    fn check_dominance(&self) -> std::result::Result<(), String> {
        let func = self.func;
        let tree = compute_dominators(func, NodeId::new(func.entry().index()));

        for insn in func.instructions() {
            let block = insn.block();
            if !tree.is_reachable(node(block)) {
                continue;
            }
            let index = func.position_in_block(insn.id()).unwrap_or(usize::MAX);
            for operand in insn.op().operands() {
                if !self.available_at(&tree, operand, block, Some(index)) {
                    return Err(format!(
                        "{} in {block} uses {operand}, which does not dominate it",
                        insn.id()
                    ));
                }
            }
        }

        for phi in func.phis() {
            let block = phi.block();
            if !tree.is_reachable(node(block)) {
                continue;
            }
            for (&operand, &pred) in phi.operands().iter().zip(func.predecessors(block)) {
                if !tree.is_reachable(node(pred)) {
                    continue;
                }
                if !self.available_at(&tree, operand, pred, None) {
                    return Err(format!(
                        "{} operand {operand} is not available at the end of {pred}",
                        phi.id()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Whether `value` is available in `block` before instruction `index` (`None` means
    /// at the end of the block).
    fn available_at(
        &self,
        tree: &DominatorTree,
        value: ValueId,
        block: BlockId,
        index: Option<usize>,
    ) -> bool {
        let func = self.func;
        let Some(def_block) = func.def_block(value) else {
            return false;
        };
        if def_block != block {
            return tree.dominates(node(def_block), node(block));
        }
        match (func.value(value).def(), index) {
            (ValueDef::Phi(_), _) | (_, None) => true,
            (ValueDef::Instruction(def), Some(index)) => func
                .position_in_block(def)
                .is_some_and(|def_index| def_index < index),
            (ValueDef::None, _) => false,
        }
    }
}

fn node(block: BlockId) -> NodeId {
    NodeId::new(block.index())
}
