//! SSA function representation - a complete method in SSA form.
//!
//! An [`SsaFunction`] owns four arenas (values, instructions, phis and blocks) and is the
//! only way to mutate them. Every mutation keeps the def/use information exact: defining
//! an instruction registers it as a user of its operands, replacing uses moves use-list
//! entries, and removal refuses to drop a definition that is still read.
//!
//! # Structure
//!
//! ```text
//! SsaFunction
//! ├── values: Vec<SsaValue>              // type, defining point, use-list
//! ├── instructions: Vec<SsaInstruction>  // tombstoned on removal
//! ├── phis: Vec<PhiNode>                 // tombstoned on removal
//! └── blocks: Vec<SsaBlock>              // block 0 is the entry
//! ```
//!
//! # Edges
//!
//! Normal successors are the targets of a block's terminator; exceptional successors are
//! its handlers. Predecessor lists are maintained explicitly by whoever creates or rewires
//! edges ([`SsaFunction::add_predecessor`], [`SsaFunction::replace_predecessor`],
//! [`SsaFunction::remove_predecessor_at`]) because their order defines phi operand order.
//! [`crate::analysis::verify`] checks that they agree with the terminators.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    analysis::ssa::{
        BlockId, CatchHandler, InsnId, PhiId, PhiNode, Position, SsaBlock, SsaInstruction, SsaOp,
        SsaValue, ValueDef, ValueId, ValueUser,
    },
    lens::LensId,
    metadata::{MethodRef, ValueType},
    utils::graph::{reverse_postorder, GraphBase, NodeId, Successors},
    Result,
};

/// A method in SSA form.
///
/// # Panics
///
/// Accessors taking an identifier index the arenas directly and panic on identifiers that
/// were not created by this function.
#[derive(Debug, Clone, PartialEq)]
pub struct SsaFunction {
    method: MethodRef,
    is_static: bool,
    lens: Option<LensId>,
    values: Vec<SsaValue>,
    instructions: Vec<SsaInstruction>,
    phis: Vec<PhiNode>,
    blocks: Vec<SsaBlock>,
}

impl SsaFunction {
    /// Creates an empty function for `method`.
    #[must_use]
    pub fn new(method: MethodRef, is_static: bool) -> Self {
        SsaFunction {
            method,
            is_static,
            lens: None,
            values: Vec::new(),
            instructions: Vec::new(),
            phis: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// The method this function implements.
    #[must_use]
    pub fn method(&self) -> &MethodRef {
        &self.method
    }

    /// Returns `true` for static methods (no receiver argument).
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// The lens the references in this function are expressed against.
    #[must_use]
    pub fn lens(&self) -> Option<LensId> {
        self.lens
    }

    /// Records the lens the references in this function are expressed against.
    pub fn set_lens(&mut self, lens: Option<LensId>) {
        self.lens = lens;
    }

    /// The entry block.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    // ---- queries ----------------------------------------------------------------------

    /// Live blocks in arena order.
    pub fn blocks(&self) -> impl Iterator<Item = &SsaBlock> {
        self.blocks.iter().filter(|b| !b.is_removed())
    }

    /// Identifiers of the live blocks in arena order.
    #[must_use]
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks().map(SsaBlock::id).collect()
    }

    /// A block by identifier.
    #[must_use]
    pub fn block(&self, block: BlockId) -> &SsaBlock {
        &self.blocks[block.index()]
    }

    /// The instructions of `block` in execution order.
    pub fn block_instructions(&self, block: BlockId) -> impl Iterator<Item = &SsaInstruction> {
        self.blocks[block.index()]
            .instructions()
            .iter()
            .map(|&id| &self.instructions[id.index()])
    }

    /// The phis of `block`.
    pub fn block_phis(&self, block: BlockId) -> impl Iterator<Item = &PhiNode> {
        self.blocks[block.index()]
            .phis()
            .iter()
            .map(|&id| &self.phis[id.index()])
    }

    /// An instruction by identifier.
    #[must_use]
    pub fn instruction(&self, insn: InsnId) -> &SsaInstruction {
        &self.instructions[insn.index()]
    }

    /// All live instructions, block by block.
    pub fn instructions(&self) -> impl Iterator<Item = &SsaInstruction> {
        self.blocks()
            .flat_map(|block| block.instructions().iter())
            .map(|&id| &self.instructions[id.index()])
    }

    /// A phi by identifier.
    #[must_use]
    pub fn phi(&self, phi: PhiId) -> &PhiNode {
        &self.phis[phi.index()]
    }

    /// All live phis, block by block.
    pub fn phis(&self) -> impl Iterator<Item = &PhiNode> {
        self.blocks()
            .flat_map(|block| block.phis().iter())
            .map(|&id| &self.phis[id.index()])
    }

    /// A value by identifier.
    #[must_use]
    pub fn value(&self, value: ValueId) -> &SsaValue {
        &self.values[value.index()]
    }

    /// Every value that currently has a definition.
    pub fn values(&self) -> impl Iterator<Item = &SsaValue> {
        self.values
            .iter()
            .filter(|v| !matches!(v.def(), ValueDef::None))
    }

    /// The distinct instructions and phis reading `value`.
    #[must_use]
    pub fn unique_users(&self, value: ValueId) -> Vec<ValueUser> {
        self.values[value.index()].users().to_vec()
    }

    /// The block defining `value`, if it is defined.
    #[must_use]
    pub fn def_block(&self, value: ValueId) -> Option<BlockId> {
        match self.values[value.index()].def() {
            ValueDef::Instruction(insn) => Some(self.instructions[insn.index()].block()),
            ValueDef::Phi(phi) => Some(self.phis[phi.index()].block()),
            ValueDef::None => None,
        }
    }

    /// The instruction defining `value`, if it is defined by one.
    #[must_use]
    pub fn def_instruction(&self, value: ValueId) -> Option<&SsaInstruction> {
        match self.values[value.index()].def() {
            ValueDef::Instruction(insn) => Some(&self.instructions[insn.index()]),
            _ => None,
        }
    }

    /// Number of live blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    /// Number of live instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks().map(|b| b.instructions().len()).sum()
    }

    /// Number of live phis.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.blocks().map(|b| b.phis().len()).sum()
    }

    /// Number of defined values.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values().count()
    }

    /// The last instruction of `block` if it is a terminator.
    #[must_use]
    pub fn terminator(&self, block: BlockId) -> Option<&SsaInstruction> {
        self.blocks[block.index()]
            .instructions()
            .last()
            .map(|&id| &self.instructions[id.index()])
            .filter(|insn| insn.is_terminator())
    }

    /// Targets of the terminator of `block`, one per edge.
    #[must_use]
    pub fn normal_successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .map(|insn| insn.op().targets())
            .unwrap_or_default()
    }

    /// Normal successors followed by handler blocks.
    #[must_use]
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        let mut out = self.normal_successors(block);
        out.extend(self.blocks[block.index()].handlers().iter().map(|h| h.target));
        out
    }

    /// Predecessors of `block`, one entry per incoming edge.
    #[must_use]
    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.blocks[block.index()].predecessors()
    }

    /// Index of `insn` within its block, or `None` if it was removed.
    #[must_use]
    pub fn position_in_block(&self, insn: InsnId) -> Option<usize> {
        let instruction = &self.instructions[insn.index()];
        if instruction.is_removed() {
            return None;
        }
        self.blocks[instruction.block().index()]
            .instructions()
            .iter()
            .position(|&id| id == insn)
    }

    // ---- construction -----------------------------------------------------------------

    /// Appends a new empty block.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(SsaBlock::new(id));
        id
    }

    /// Creates a value with no definition yet.
    pub fn new_value(&mut self, ty: ValueType) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(SsaValue::new(id, ty));
        id
    }

    /// Attaches a source-level name to `value`.
    pub fn set_debug_name(&mut self, value: ValueId, name: Arc<str>) {
        self.values[value.index()].set_debug_name(name);
    }

    fn create_instruction(
        &mut self,
        block: BlockId,
        op: SsaOp,
        dest: Option<ValueId>,
        position: Position,
    ) -> InsnId {
        let id = InsnId::new(self.instructions.len());
        for operand in op.operands() {
            self.values[operand.index()].add_user(ValueUser::Instruction(id));
        }
        if let Some(dest) = dest {
            self.values[dest.index()].set_def(ValueDef::Instruction(id));
        }
        self.instructions
            .push(SsaInstruction::new(id, op, dest, block, position));
        id
    }

    /// Appends an instruction at the end of `block`.
    pub fn append_instruction(
        &mut self,
        block: BlockId,
        op: SsaOp,
        dest: Option<ValueId>,
        position: Position,
    ) -> InsnId {
        let id = self.create_instruction(block, op, dest, position);
        self.blocks[block.index()].instructions_mut().push(id);
        id
    }

    /// Appends an instruction defining a fresh value of type `ty`.
    pub fn append_value(
        &mut self,
        block: BlockId,
        op: SsaOp,
        ty: ValueType,
        position: Position,
    ) -> (InsnId, ValueId) {
        let value = self.new_value(ty);
        let insn = self.append_instruction(block, op, Some(value), position);
        (insn, value)
    }

    /// Inserts an instruction at `index` within `block` (clamped to the end).
    pub fn insert_instruction(
        &mut self,
        block: BlockId,
        index: usize,
        op: SsaOp,
        dest: Option<ValueId>,
        position: Position,
    ) -> InsnId {
        let id = self.create_instruction(block, op, dest, position);
        let list = self.blocks[block.index()].instructions_mut();
        let index = index.min(list.len());
        list.insert(index, id);
        id
    }

    /// Inserts an instruction immediately before `anchor`, with a synthetic position
    /// derived from it.
    ///
    /// # Errors
    ///
    /// Returns an error if `anchor` has been removed.
    pub fn insert_before(
        &mut self,
        anchor: InsnId,
        op: SsaOp,
        dest: Option<ValueId>,
    ) -> Result<InsnId> {
        let Some(index) = self.position_in_block(anchor) else {
            return Err(malformed_error!("cannot insert before removed instruction {}", anchor));
        };
        let block = self.instructions[anchor.index()].block();
        let position = Position::synthetic(self.instructions[anchor.index()].position().offset);
        Ok(self.insert_instruction(block, index, op, dest, position))
    }

    /// Replaces the operation of `insn`, keeping its result value.
    pub fn replace_op(&mut self, insn: InsnId, op: SsaOp) {
        let old = std::mem::replace(self.instructions[insn.index()].op_mut(), SsaOp::Nop);
        for operand in old.operands() {
            self.values[operand.index()].remove_user(ValueUser::Instruction(insn));
        }
        for operand in op.operands() {
            self.values[operand.index()].add_user(ValueUser::Instruction(insn));
        }
        *self.instructions[insn.index()].op_mut() = op;
    }

    /// Adds an exception handler to `block`.
    ///
    /// The caller records the matching predecessor entry on the handler block.
    pub fn add_handler(&mut self, block: BlockId, handler: CatchHandler) {
        self.blocks[block.index()].handlers_mut().push(handler);
    }

    /// Records an incoming edge `pred -> block`.
    pub fn add_predecessor(&mut self, block: BlockId, pred: BlockId) {
        self.blocks[block.index()].predecessors_mut().push(pred);
    }

    /// Renames every predecessor entry `old` of `block` to `new`; phi operands are kept.
    /// Returns the number of entries renamed.
    pub fn replace_predecessor(&mut self, block: BlockId, old: BlockId, new: BlockId) -> usize {
        let mut count = 0;
        for pred in self.blocks[block.index()].predecessors_mut() {
            if *pred == old {
                *pred = new;
                count += 1;
            }
        }
        count
    }

    /// Removes predecessor entry `index` of `block` and the matching operand of every phi.
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range.
    pub fn remove_predecessor_at(&mut self, block: BlockId, index: usize) -> Result<()> {
        let preds = self.blocks[block.index()].predecessors_mut();
        if index >= preds.len() {
            return Err(malformed_error!(
                "{} has no predecessor #{} (has {})",
                block,
                index,
                preds.len()
            ));
        }
        preds.remove(index);

        let phis = self.blocks[block.index()].phis().to_vec();
        for phi in phis {
            let operands = self.phis[phi.index()].operands_mut();
            if index < operands.len() {
                let removed = operands.remove(index);
                if !operands.contains(&removed) {
                    self.values[removed.index()].remove_user(ValueUser::Phi(phi));
                }
            }
        }
        Ok(())
    }

    /// Rewrites the terminator of `block` so every edge to `from` goes to `to`.
    ///
    /// Predecessor lists are left to the caller. Returns the number of rewritten edges.
    pub fn retarget(&mut self, block: BlockId, from: BlockId, to: BlockId) -> usize {
        let Some(&last) = self.blocks[block.index()].instructions().last() else {
            return 0;
        };
        let mut count = 0;
        self.instructions[last.index()]
            .op_mut()
            .for_each_target_mut(|target| {
                if *target == from {
                    *target = to;
                    count += 1;
                }
            });
        count
    }

    // ---- phis -------------------------------------------------------------------------

    /// Creates an operand-less phi at the entry of `block`.
    pub fn insert_phi(&mut self, block: BlockId, ty: ValueType) -> PhiId {
        let value = self.new_value(ty);
        let id = PhiId::new(self.phis.len());
        self.values[value.index()].set_def(ValueDef::Phi(id));
        self.phis.push(PhiNode::new(id, value, block));
        self.blocks[block.index()].phis_mut().push(id);
        id
    }

    /// Replaces the operands of `phi`.
    pub fn set_phi_operands(&mut self, phi: PhiId, operands: Vec<ValueId>) {
        let old = std::mem::take(self.phis[phi.index()].operands_mut());
        for operand in old {
            self.values[operand.index()].remove_user(ValueUser::Phi(phi));
        }
        for &operand in &operands {
            self.values[operand.index()].add_user(ValueUser::Phi(phi));
        }
        self.phis[phi.index()].set_operands(operands);
    }

    /// Removes `phi`.
    ///
    /// # Errors
    ///
    /// Returns an error if anything other than the phi itself still reads its value.
    pub fn remove_phi(&mut self, phi: PhiId) -> Result<()> {
        if self.phis[phi.index()].is_removed() {
            return Ok(());
        }
        let value = self.phis[phi.index()].value();
        let self_user = ValueUser::Phi(phi);
        let foreign = self.values[value.index()]
            .users()
            .iter()
            .filter(|&&user| user != self_user)
            .count();
        if foreign > 0 {
            return Err(malformed_error!(
                "cannot remove {}: {} still has {} users",
                phi,
                value,
                foreign
            ));
        }

        self.set_phi_operands(phi, Vec::new());
        let block = self.phis[phi.index()].block();
        self.blocks[block.index()].phis_mut().retain(|&p| p != phi);
        self.values[value.index()].set_def(ValueDef::None);
        self.values[value.index()].clear_users();
        self.phis[phi.index()].mark_removed();
        Ok(())
    }

    // ---- rewriting --------------------------------------------------------------------

    /// Redirects every use of `old` to `new`. Returns the number of users rewritten.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) -> usize {
        if old == new {
            return 0;
        }
        let users = self.values[old.index()].take_users();
        for &user in &users {
            match user {
                ValueUser::Instruction(insn) => {
                    self.instructions[insn.index()]
                        .op_mut()
                        .for_each_operand_mut(|operand| {
                            if *operand == old {
                                *operand = new;
                            }
                        });
                }
                ValueUser::Phi(phi) => {
                    for operand in self.phis[phi.index()].operands_mut() {
                        if *operand == old {
                            *operand = new;
                        }
                    }
                }
            }
            self.values[new.index()].add_user(user);
        }
        users.len()
    }

    /// Removes `insn` from its block.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction's result still has users.
    pub fn remove_instruction(&mut self, insn: InsnId) -> Result<()> {
        let instruction = &self.instructions[insn.index()];
        if instruction.is_removed() {
            return Ok(());
        }
        if let Some(dest) = instruction.dest() {
            let users = self.values[dest.index()].users().len();
            if users > 0 {
                return Err(malformed_error!(
                    "cannot remove {}: {} still has {} users",
                    insn,
                    dest,
                    users
                ));
            }
            self.values[dest.index()].set_def(ValueDef::None);
        }

        let block = instruction.block();
        for operand in instruction.op().operands() {
            self.values[operand.index()].remove_user(ValueUser::Instruction(insn));
        }
        self.blocks[block.index()]
            .instructions_mut()
            .retain(|&id| id != insn);
        self.instructions[insn.index()].mark_removed();
        Ok(())
    }

    /// Moves the instructions of `block` from `index` on into a new block, which inherits
    /// the terminator and therefore the normal successors.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is covered by exception handlers.
    pub fn split_block(&mut self, block: BlockId, index: usize) -> Result<BlockId> {
        if !self.blocks[block.index()].handlers().is_empty() {
            return Err(malformed_error!("cannot split {}: covered by handlers", block));
        }
        let successors = self.normal_successors(block);
        let new = self.add_block();

        let list = self.blocks[block.index()].instructions_mut();
        let tail = list.split_off(index.min(list.len()));
        for &insn in &tail {
            self.instructions[insn.index()].set_block(new);
        }
        *self.blocks[new.index()].instructions_mut() = tail;

        for succ in successors {
            self.replace_predecessor(succ, block, new);
        }
        Ok(new)
    }

    /// Moves every instruction of `from` to the end of `into` and removes `from`.
    ///
    /// `from` must have no phis. Successor predecessor entries are renamed; handlers of
    /// `from` are dropped along with the block.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` still has phis.
    pub fn absorb_block(&mut self, into: BlockId, from: BlockId) -> Result<()> {
        if !self.blocks[from.index()].phis().is_empty() {
            return Err(malformed_error!("cannot absorb {}: it has phis", from));
        }
        for succ in self.normal_successors(from) {
            self.replace_predecessor(succ, from, into);
        }
        let moved = std::mem::take(self.blocks[from.index()].instructions_mut());
        for &insn in &moved {
            self.instructions[insn.index()].set_block(into);
        }
        self.blocks[into.index()].instructions_mut().extend(moved);
        self.blocks[from.index()].mark_removed();
        Ok(())
    }

    /// Removes a block with no live instructions, phis or predecessors left.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is not empty.
    pub fn remove_block(&mut self, block: BlockId) -> Result<()> {
        let b = &self.blocks[block.index()];
        if !b.instructions().is_empty() || !b.phis().is_empty() || !b.predecessors().is_empty() {
            return Err(malformed_error!("cannot remove non-empty block {}", block));
        }
        self.blocks[block.index()].mark_removed();
        Ok(())
    }

    /// Removes every block not reachable from the entry. Returns the number removed.
    pub fn remove_unreachable_blocks(&mut self) -> usize {
        let mut reachable = vec![false; self.blocks.len()];
        for node in reverse_postorder(&*self, NodeId::new(0)) {
            reachable[node.index()] = true;
        }

        let dead: Vec<BlockId> = self
            .blocks()
            .map(SsaBlock::id)
            .filter(|b| !reachable[b.index()])
            .collect();

        for &block in &dead {
            for succ in self.successors(block) {
                if !reachable[succ.index()] {
                    continue;
                }
                while let Some(index) = self.blocks[succ.index()]
                    .predecessors()
                    .iter()
                    .position(|&p| p == block)
                {
                    // In range by construction.
                    let _ = self.remove_predecessor_at(succ, index);
                }
            }
        }

        for &block in &dead {
            let insns = self.blocks[block.index()].instructions().to_vec();
            for insn in insns {
                for operand in self.instructions[insn.index()].op().operands() {
                    self.values[operand.index()].remove_user(ValueUser::Instruction(insn));
                }
                if let Some(dest) = self.instructions[insn.index()].dest() {
                    self.values[dest.index()].set_def(ValueDef::None);
                }
                self.instructions[insn.index()].mark_removed();
            }
            let phis = self.blocks[block.index()].phis().to_vec();
            for phi in phis {
                for &operand in self.phis[phi.index()].operands() {
                    self.values[operand.index()].remove_user(ValueUser::Phi(phi));
                }
                let value = self.phis[phi.index()].value();
                self.values[value.index()].set_def(ValueDef::None);
                self.phis[phi.index()].mark_removed();
            }
            self.blocks[block.index()].mark_removed();
        }
        dead.len()
    }

    /// Recomputes every definition and use-list from the live instructions and phis.
    pub fn rebuild_def_use(&mut self) {
        for value in &mut self.values {
            value.set_def(ValueDef::None);
            value.clear_users();
        }
        for block in self.blocks.iter().filter(|b| !b.is_removed()) {
            for &insn in block.instructions() {
                let instruction = &self.instructions[insn.index()];
                for operand in instruction.op().operands() {
                    self.values[operand.index()].add_user(ValueUser::Instruction(insn));
                }
                if let Some(dest) = instruction.dest() {
                    self.values[dest.index()].set_def(ValueDef::Instruction(insn));
                }
            }
            for &phi in block.phis() {
                let node = &self.phis[phi.index()];
                for &operand in node.operands() {
                    self.values[operand.index()].add_user(ValueUser::Phi(phi));
                }
                self.values[node.value().index()].set_def(ValueDef::Phi(phi));
            }
        }
    }

    /// Drops tombstones and renumbers every arena densely, in block order.
    ///
    /// # Errors
    ///
    /// Returns an error if a live instruction or phi reads a value that has no definition.
    pub fn compact(&mut self) -> Result<()> {
        self.rebuild_def_use();

        let mut block_map = HashMap::new();
        let mut insn_order = Vec::new();
        let mut phi_order = Vec::new();
        for block in self.blocks.iter().filter(|b| !b.is_removed()) {
            block_map.insert(block.id(), BlockId::new(block_map.len()));
            phi_order.extend(block.phis().iter().copied());
            insn_order.extend(block.instructions().iter().copied());
        }
        if !block_map.contains_key(&BlockId::new(0)) {
            return Err(malformed_error!("entry block of {} was removed", self.method));
        }

        let mut value_map = HashMap::new();
        for value in &self.values {
            match value.def() {
                ValueDef::None if !value.is_unused() => {
                    return Err(malformed_error!(
                        "{} in {} is used but never defined",
                        value.id(),
                        self.method
                    ));
                }
                ValueDef::None => {}
                _ => {
                    value_map.insert(value.id(), ValueId::new(value_map.len()));
                }
            }
        }
        let insn_map: HashMap<InsnId, InsnId> = insn_order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, InsnId::new(i)))
            .collect();
        let phi_map: HashMap<PhiId, PhiId> = phi_order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, PhiId::new(i)))
            .collect();

        let map_value = |v: &mut ValueId| {
            if let Some(&new) = value_map.get(v) {
                *v = new;
            }
        };
        let map_block = |b: &mut BlockId| {
            if let Some(&new) = block_map.get(b) {
                *b = new;
            }
        };

        let mut values: Vec<SsaValue> = Vec::with_capacity(value_map.len());
        for value in &self.values {
            if let Some(&new) = value_map.get(&value.id()) {
                let mut value = value.clone();
                value.renumber(new);
                values.push(value);
            }
        }

        let mut instructions = Vec::with_capacity(insn_order.len());
        for (i, &old) in insn_order.iter().enumerate() {
            let mut insn = self.instructions[old.index()].clone();
            insn.renumber(InsnId::new(i));
            insn.op_mut().for_each_operand_mut(map_value);
            insn.op_mut().for_each_target_mut(map_block);
            let mut block = insn.block();
            map_block(&mut block);
            insn.set_block(block);
            let mut dest = insn.dest();
            if let Some(d) = dest.as_mut() {
                map_value(d);
            }
            insn.set_dest(dest);
            instructions.push(insn);
        }

        let mut phis = Vec::with_capacity(phi_order.len());
        for (i, &old) in phi_order.iter().enumerate() {
            let mut phi = self.phis[old.index()].clone();
            let mut value = phi.value();
            map_value(&mut value);
            let mut block = phi.block();
            map_block(&mut block);
            phi.renumber(PhiId::new(i), value, block);
            phi.operands_mut().iter_mut().for_each(map_value);
            phis.push(phi);
        }

        let mut blocks = Vec::with_capacity(block_map.len());
        for block in self.blocks.iter().filter(|b| !b.is_removed()) {
            let mut block = block.clone();
            let mut id = block.id();
            map_block(&mut id);
            block.renumber(id);
            for phi in block.phis_mut() {
                if let Some(&new) = phi_map.get(&*phi) {
                    *phi = new;
                }
            }
            for insn in block.instructions_mut() {
                if let Some(&new) = insn_map.get(&*insn) {
                    *insn = new;
                }
            }
            block.predecessors_mut().iter_mut().for_each(map_block);
            for handler in block.handlers_mut() {
                map_block(&mut handler.target);
            }
            blocks.push(block);
        }

        self.values = values;
        self.instructions = instructions;
        self.phis = phis;
        self.blocks = blocks;
        self.rebuild_def_use();
        Ok(())
    }
}

impl GraphBase for SsaFunction {
    fn node_count(&self) -> usize {
        self.blocks.len()
    }
}

impl Successors for SsaFunction {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        let targets = if node.index() < self.blocks.len() && !self.blocks[node.index()].is_removed()
        {
            SsaFunction::successors(self, BlockId::new(node.index()))
        } else {
            Vec::new()
        };
        targets.into_iter().map(|b| NodeId::new(b.index()))
    }
}

impl fmt::Display for SsaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        for block in self.blocks() {
            write!(f, "{}:", block.id())?;
            if !block.predecessors().is_empty() {
                write!(f, " preds {:?}", block.predecessors())?;
            }
            for handler in block.handlers() {
                match &handler.guard {
                    Some(guard) => write!(f, " catch {guard} -> {}", handler.target)?,
                    None => write!(f, " catch-all -> {}", handler.target)?,
                }
            }
            writeln!(f)?;
            for &phi in block.phis() {
                writeln!(f, "  {}", self.phis[phi.index()])?;
            }
            for &insn in block.instructions() {
                writeln!(f, "  {}", self.instructions[insn.index()])?;
            }
        }
        Ok(())
    }
}
