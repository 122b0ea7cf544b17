//! Stack-to-SSA lifting.
//!
//! [`Lifter`] turns one [`MethodCode`] into an [`SsaFunction`]:
//!
//! 1. The instruction stream is cut into raw blocks and the control-flow edges are derived
//!    from branch targets, fall-through and the handler table.
//! 2. Blocks reachable from the entry are created in reverse postorder. Block `B0` holds one
//!    `Argument` per parameter; it also holds the first raw block unless that block is the
//!    target of a back edge, in which case `B0` jumps to it.
//! 3. Each block is lifted by simulating the operand stack ([`AbstractStackState`]).
//!    Locals and live stack positions are SSA variables whose definitions are tracked per
//!    block; reads that cross a block boundary create phis on demand, incomplete phis are
//!    completed once every predecessor has been lifted, and trivial phis are removed as soon
//!    as they are complete.
//! 4. Remaining trivial and dead phis are cleaned up, the arenas are compacted and the result
//!    is verified.
//!
//! Every method, field and type reference passes through the [`LensView`] given with
//! [`Lifter::with_lens`], so the lifted body always speaks the current names.

mod layout;

use std::collections::{HashMap, HashSet};

use crate::{
    analysis::ssa::{
        eliminate_trivial_phis, remove_dead_phis, verify, AbstractStackState, BlockId,
        CatchHandler, ConstValue, PhiId, Position, SlotSource, SsaFunction, SsaOp, StackSlot,
        SwitchKeys, ValueId, ValueUser,
    },
    assembly::{CfInstruction, IfCond, MethodCode},
    lens::LensView,
    metadata::{FieldRef, InvokeKind, MethodDefinition, MethodRef, TypeRef, ValueType},
    utils::graph::{reverse_postorder, NodeId},
    Error, Result,
};

use self::layout::{malformed, Layout};

/// Options for lifting a single method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiftConfig {
    /// Reject a return that leaves values on the operand stack
    pub strict_stack: bool,
    /// Run the SSA verifier on the result
    pub verify: bool,
}

impl LiftConfig {
    /// The default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for LiftConfig {
    fn default() -> Self {
        LiftConfig {
            strict_stack: false,
            verify: true,
        }
    }
}

/// Lifts one stack-form method body into SSA form.
///
/// # Examples
///
/// ```rust,ignore
/// use cfopt::analysis::Lifter;
///
/// let ssa = Lifter::new(&method, true, &code).lift()?;
/// println!("{ssa}");
/// ```
#[derive(Debug, Clone)]
pub struct Lifter<'a> {
    method: &'a MethodRef,
    is_static: bool,
    code: &'a MethodCode,
    config: LiftConfig,
    lens: LensView<'a>,
}

impl<'a> Lifter<'a> {
    /// Creates a lifter for `code`, the body of `method`.
    #[must_use]
    pub fn new(method: &'a MethodRef, is_static: bool, code: &'a MethodCode) -> Self {
        Lifter {
            method,
            is_static,
            code,
            config: LiftConfig::default(),
            lens: LensView::identity(),
        }
    }

    /// Creates a lifter for the body of a method definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the method has no code.
    pub fn for_definition(definition: &'a MethodDefinition) -> Result<Self> {
        let code = definition
            .code
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("{} has no code", definition.reference)))?;
        Ok(Lifter::new(&definition.reference, definition.is_static(), code))
    }

    /// Replaces the lifting options.
    #[must_use]
    pub fn with_config(mut self, config: LiftConfig) -> Self {
        self.config = config;
        self
    }

    /// Maps references through `lens` while lifting.
    #[must_use]
    pub fn with_lens(mut self, lens: LensView<'a>) -> Self {
        self.lens = lens;
        self
    }

    /// Lifts the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCode`], [`Error::StackUnderflow`], [`Error::StackOverflow`]
    /// or [`Error::StackMismatch`] for a broken instruction stream, and
    /// [`Error::SsaVerification`] if verification is enabled and fails.
    pub fn lift(&self) -> Result<SsaFunction> {
        let layout = Layout::build(self.method, self.code)?;
        if layout.is_handler(0) {
            return Err(malformed(self.method, 0, "the first block is an exception handler"));
        }
        let order: Vec<usize> = reverse_postorder(&layout.graph(), NodeId::new(0))
            .into_iter()
            .map(NodeId::index)
            .collect();

        let mut builder = Builder::new(self, &layout);
        builder.create_blocks(&order)?;
        builder.lift_arguments()?;
        for &raw in &order {
            builder.lift_block(raw)?;
        }
        builder.finish()
    }
}

/// An SSA variable: a local slot or a stack position live across a block boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Var {
    Local(u16),
    Stack(usize),
}

struct Builder<'l, 'a> {
    lifter: &'l Lifter<'a>,
    layout: &'l Layout,
    func: SsaFunction,
    state: AbstractStackState,
    /// SSA block of each raw block; `None` for unreachable code
    block_map: Vec<Option<BlockId>>,
    /// Stack slot types on entry to each raw block, recorded by the first lifted predecessor
    entry_types: Vec<Option<Vec<ValueType>>>,
    /// `B0` is separate from the first raw block
    separate_entry: bool,
    current_def: HashMap<(BlockId, Var), ValueId>,
    incomplete: HashMap<BlockId, Vec<(Var, PhiId)>>,
    sealed: HashSet<BlockId>,
    filled: HashSet<BlockId>,
    /// Values of removed trivial phis and their replacements
    replaced: HashMap<ValueId, ValueId>,
    current: BlockId,
    offset: usize,
}

impl<'l, 'a> Builder<'l, 'a> {
    fn new(lifter: &'l Lifter<'a>, layout: &'l Layout) -> Self {
        let count = layout.blocks.len();
        let mut entry_types = vec![None; count];
        entry_types[0] = Some(Vec::new());
        Builder {
            lifter,
            layout,
            func: SsaFunction::new(lifter.method.clone(), lifter.is_static),
            state: AbstractStackState::new(lifter.method.clone(), lifter.code.max_stack),
            block_map: vec![None; count],
            entry_types,
            separate_entry: false,
            current_def: HashMap::new(),
            incomplete: HashMap::new(),
            sealed: HashSet::new(),
            filled: HashSet::new(),
            replaced: HashMap::new(),
            current: BlockId::new(0),
            offset: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        malformed(self.lifter.method, self.offset, message)
    }

    fn ssa_block(&self, raw: usize) -> Result<BlockId> {
        self.block_map
            .get(raw)
            .copied()
            .flatten()
            .ok_or_else(|| malformed_error!("raw block {} was not created", raw))
    }

    // ---- graph skeleton ---------------------------------------------------------------

    fn create_blocks(&mut self, order: &[usize]) -> Result<()> {
        let layout = self.layout;
        let entry = self.func.add_block();
        self.sealed.insert(entry);

        self.separate_entry = order.iter().any(|&k| {
            let block = &layout.blocks[k];
            block.normal.contains(&0) || block.exceptional.iter().any(|(_, t)| *t == 0)
        });
        for &k in order {
            let id = if k == 0 && !self.separate_entry {
                entry
            } else {
                self.func.add_block()
            };
            self.block_map[k] = Some(id);
        }
        if self.separate_entry {
            let first = self.ssa_block(0)?;
            self.func.add_predecessor(first, entry);
        }

        for &k in order {
            let raw = &layout.blocks[k];
            let block = self.ssa_block(k)?;
            for &succ in &raw.normal {
                if layout.is_handler(succ) {
                    return Err(malformed(
                        self.lifter.method,
                        layout.blocks[succ].start,
                        "exception handler entered by normal control flow",
                    ));
                }
                let target = self.ssa_block(succ)?;
                self.func.add_predecessor(target, block);
            }
            for (guard, succ) in &raw.exceptional {
                let target = self.ssa_block(*succ)?;
                let guard = guard.as_ref().map(|g| self.lifter.lens.lookup_type(g));
                self.func.add_handler(block, CatchHandler { guard, target });
                self.func.add_predecessor(target, block);
            }
        }
        Ok(())
    }

    fn lift_arguments(&mut self) -> Result<()> {
        let method = self.lifter.method;
        let entry = self.func.entry();
        self.current = entry;
        self.offset = 0;

        let mut params: Vec<ValueType> = Vec::with_capacity(method.proto.params.len() + 1);
        if !self.lifter.is_static {
            params.push(ValueType::Object);
        }
        for param in method.proto.params.iter() {
            params.push(self.value_type(param)?);
        }
        let slots: usize = params.iter().map(|ty| ty.slots()).sum();
        if slots > usize::from(self.lifter.code.max_locals) {
            return Err(self.error(format!(
                "parameters need {slots} local slots but max_locals is {}",
                self.lifter.code.max_locals
            )));
        }

        let mut local: u16 = 0;
        for (index, ty) in params.into_iter().enumerate() {
            let index = u16::try_from(index).map_err(|_| self.error("too many parameters"))?;
            let (_, value) = self.func.append_value(
                entry,
                SsaOp::Argument { index },
                ty,
                Position::synthetic(0),
            );
            if let Some(name) = self.debug_name(local, 0) {
                self.func.set_debug_name(value, name);
            }
            self.current_def.insert((entry, Var::Local(local)), value);
            local += ty.slots() as u16;
        }

        if self.separate_entry {
            let target = self.ssa_block(0)?;
            self.func.append_instruction(
                entry,
                SsaOp::Goto { target },
                None,
                Position::synthetic(0),
            );
            self.fill(entry)?;
        }
        Ok(())
    }

    // ---- variables --------------------------------------------------------------------

    fn resolve(&self, mut value: ValueId) -> ValueId {
        while let Some(&next) = self.replaced.get(&value) {
            value = next;
        }
        value
    }

    fn read_variable(&mut self, block: BlockId, var: Var, ty: ValueType) -> Result<ValueId> {
        if let Some(&value) = self.current_def.get(&(block, var)) {
            return Ok(self.resolve(value));
        }
        self.read_variable_recursive(block, var, ty)
    }

    fn read_variable_recursive(
        &mut self,
        block: BlockId,
        var: Var,
        ty: ValueType,
    ) -> Result<ValueId> {
        let value = if !self.sealed.contains(&block) {
            let phi = self.func.insert_phi(block, ty);
            self.incomplete.entry(block).or_default().push((var, phi));
            self.func.phi(phi).value()
        } else {
            let preds = self.func.predecessors(block).to_vec();
            match preds.as_slice() {
                [] => return Err(self.unassigned(var)),
                [single] => self.read_variable(*single, var, ty)?,
                _ => {
                    let phi = self.func.insert_phi(block, ty);
                    let value = self.func.phi(phi).value();
                    self.current_def.insert((block, var), value);
                    self.add_phi_operands(block, var, phi)?
                }
            }
        };
        self.current_def.insert((block, var), value);
        Ok(value)
    }

    fn add_phi_operands(&mut self, block: BlockId, var: Var, phi: PhiId) -> Result<ValueId> {
        let ty = self.func.value(self.func.phi(phi).value()).ty();
        let preds = self.func.predecessors(block).to_vec();
        let mut operands = Vec::with_capacity(preds.len());
        for pred in preds {
            operands.push(self.read_variable(pred, var, ty)?);
        }
        let operands = operands.into_iter().map(|v| self.resolve(v)).collect();
        self.func.set_phi_operands(phi, operands);
        self.try_remove_trivial(phi, var)
    }

    fn try_remove_trivial(&mut self, phi: PhiId, var: Var) -> Result<ValueId> {
        let node = self.func.phi(phi);
        let value = node.value();
        if node.is_removed() {
            return Ok(self.resolve(value));
        }
        let Some(same) = node.trivial_operand() else {
            if node.operands().iter().all(|&op| op == value) {
                return Err(self.unassigned(var));
            }
            return Ok(value);
        };

        let dependents: Vec<PhiId> = self
            .func
            .value(value)
            .users()
            .iter()
            .filter_map(|user| match user {
                ValueUser::Phi(p) if *p != phi => Some(*p),
                _ => None,
            })
            .collect();

        self.func.replace_all_uses(value, same);
        self.func.remove_phi(phi)?;
        self.replaced.insert(value, same);
        for dependent in dependents {
            self.try_remove_trivial(dependent, var)?;
        }
        Ok(self.resolve(same))
    }

    fn unassigned(&self, var: Var) -> Error {
        match var {
            Var::Local(local) => self.error(format!("local {local} is read before it is assigned")),
            Var::Stack(slot) => self.error(format!("stack slot {slot} has no incoming value")),
        }
    }

    fn seal(&mut self, block: BlockId) -> Result<()> {
        self.sealed.insert(block);
        for (var, phi) in self.incomplete.remove(&block).unwrap_or_default() {
            self.add_phi_operands(block, var, phi)?;
        }
        Ok(())
    }

    /// Marks `block` as lifted and seals every successor whose predecessors are all lifted.
    fn fill(&mut self, block: BlockId) -> Result<()> {
        self.filled.insert(block);
        let mut successors = self.func.successors(block);
        successors.dedup();
        for succ in successors {
            if !self.sealed.contains(&succ)
                && self
                    .func
                    .predecessors(succ)
                    .iter()
                    .all(|p| self.filled.contains(p))
            {
                self.seal(succ)?;
            }
        }
        Ok(())
    }

    // ---- stack ------------------------------------------------------------------------

    fn read_local(&mut self, local: u16, ty: ValueType) -> Result<ValueId> {
        if let Some((value, _)) = self.state.local(local) {
            return Ok(self.resolve(value));
        }
        self.read_variable(self.current, Var::Local(local), ty)
    }

    fn resolve_slot(&mut self, slot: StackSlot) -> Result<ValueId> {
        match slot.source {
            SlotSource::Value(value) => Ok(self.resolve(value)),
            SlotSource::Local(local) => self.read_local(local, slot.ty),
            SlotSource::Incoming(index) => {
                self.read_variable(self.current, Var::Stack(index), slot.ty)
            }
        }
    }

    fn pop_value(&mut self) -> Result<ValueId> {
        let slot = self.state.pop()?;
        self.resolve_slot(slot)
    }

    fn pop_values(&mut self, count: usize) -> Result<Vec<ValueId>> {
        let slots = self.state.pop_n(count)?;
        slots.into_iter().map(|slot| self.resolve_slot(slot)).collect()
    }

    /// Pops slots covering exactly `words` stack words, bottom first.
    fn pop_words(&mut self, words: usize) -> Result<Vec<StackSlot>> {
        let mut taken = 0;
        let mut slots = Vec::new();
        while taken < words {
            let slot = self.state.pop()?;
            taken += slot.ty.slots();
            slots.push(slot);
        }
        if taken != words {
            return Err(self.error("stack operation splits a category-2 value"));
        }
        slots.reverse();
        Ok(slots)
    }

    fn push_all(&mut self, slots: &[StackSlot]) -> Result<()> {
        for &slot in slots {
            self.state.push(slot)?;
        }
        Ok(())
    }

    // ---- emission ---------------------------------------------------------------------

    fn position(&self) -> Position {
        Position::at(self.offset)
    }

    fn emit(&mut self, op: SsaOp) {
        let position = self.position();
        self.func.append_instruction(self.current, op, None, position);
    }

    fn emit_value(&mut self, op: SsaOp, ty: ValueType) -> Result<ValueId> {
        let position = self.position();
        let (_, value) = self.func.append_value(self.current, op, ty, position);
        self.state.push_value(value, ty)?;
        Ok(value)
    }

    fn value_type(&self, ty: &TypeRef) -> Result<ValueType> {
        ty.value_type()
            .ok_or_else(|| self.error(format!("type {ty} has no runtime value")))
    }

    fn map_type(&self, ty: &TypeRef) -> TypeRef {
        self.lifter.lens.lookup_type(ty)
    }

    fn map_field(&self, field: &FieldRef) -> FieldRef {
        self.lifter.lens.lookup_field(field)
    }

    fn check_local(&self, local: u16, ty: ValueType) -> Result<()> {
        let max = self.lifter.code.max_locals;
        if usize::from(local) + ty.slots() > usize::from(max) {
            return Err(self.error(format!("local {local} exceeds max_locals {max}")));
        }
        Ok(())
    }

    /// Name of the debug-table variable stored in `local` by the instruction at `offset`.
    fn debug_name(&self, local: u16, offset: usize) -> Option<std::sync::Arc<str>> {
        self.lifter
            .code
            .local_variables
            .iter()
            .find(|var| {
                if var.local != local {
                    return false;
                }
                match (
                    self.layout.label_position(var.start),
                    self.layout.label_position(var.end),
                ) {
                    (Some(start), Some(end)) => start <= offset + 1 && offset < end,
                    _ => false,
                }
            })
            .map(|var| var.name.clone())
    }

    // ---- blocks -----------------------------------------------------------------------

    fn lift_block(&mut self, raw: usize) -> Result<()> {
        let layout = self.layout;
        let code = self.lifter.code;
        let block = self.ssa_block(raw)?;
        let range = &layout.blocks[raw];
        self.current = block;
        self.offset = range.start;
        if range.falls_off {
            self.offset = range.end.saturating_sub(1);
            return Err(self.error("execution falls off the end of the code"));
        }

        if layout.is_handler(raw) {
            self.state.enter_block(&[]);
            let guard = layout
                .handler_guards
                .get(&raw)
                .cloned()
                .flatten()
                .map(|g| self.map_type(&g));
            self.emit_value(SsaOp::MoveException { guard }, ValueType::Object)?;
        } else {
            let incoming = self.entry_types[raw]
                .clone()
                .ok_or_else(|| malformed_error!("no stack shape recorded for raw block {}", raw))?;
            self.state.enter_block(&incoming);
        }

        let mut terminated = false;
        for index in range.start..range.end {
            self.offset = index;
            self.state.set_offset(index);
            terminated = self.lift_instruction(&code.instructions[index], raw)?;
        }

        if !terminated {
            let target = self.ssa_block(range.normal[0])?;
            self.emit(SsaOp::Goto { target });
        }
        self.finish_block(raw)
    }

    fn finish_block(&mut self, raw: usize) -> Result<()> {
        let layout = self.layout;
        let block = self.current;
        let slots = self.state.slots().to_vec();
        let mut values = Vec::with_capacity(slots.len());
        for &slot in &slots {
            values.push(self.resolve_slot(slot)?);
        }
        for (index, value) in values.into_iter().enumerate() {
            self.current_def.insert((block, Var::Stack(index)), value);
        }
        let written: Vec<(u16, ValueId)> = self
            .state
            .written_locals()
            .map(|(local, value, _)| (local, value))
            .collect();
        for (local, value) in written {
            let value = self.resolve(value);
            self.current_def.insert((block, Var::Local(local)), value);
        }

        let types: Vec<ValueType> = slots.iter().map(|s| s.ty).collect();
        for &succ in &layout.blocks[raw].normal {
            match &self.entry_types[succ] {
                Some(expected) if expected.len() != types.len() => {
                    return Err(Error::StackMismatch {
                        method: self.lifter.method.clone(),
                        offset: layout.blocks[succ].start,
                        expected: expected.len(),
                        found: types.len(),
                    });
                }
                Some(_) => {}
                None => self.entry_types[succ] = Some(types.clone()),
            }
        }
        self.fill(block)
    }

    /// Lifts one instruction; returns `true` if it terminated the block.
    fn lift_instruction(&mut self, insn: &CfInstruction, raw: usize) -> Result<bool> {
        use CfInstruction as I;

        match insn {
            I::Label(_) | I::Nop => {}
            I::ConstNull => self.constant(ConstValue::Null)?,
            I::ConstInt(v) => self.constant(ConstValue::Int(*v))?,
            I::ConstLong(v) => self.constant(ConstValue::Long(*v))?,
            I::ConstFloat(v) => self.constant(ConstValue::Float(*v))?,
            I::ConstDouble(v) => self.constant(ConstValue::Double(*v))?,
            I::ConstString(s) => self.constant(ConstValue::String(s.clone()))?,
            I::ConstClass(ty) => self.constant(ConstValue::Class(self.map_type(ty)))?,
            I::ConstMethodType(proto) => self.constant(ConstValue::MethodType(proto.clone()))?,
            I::ConstMethodHandle(method) => {
                let target = self
                    .lifter
                    .lens
                    .lookup_method(method, self.lifter.method, InvokeKind::Static)
                    .reference;
                self.constant(ConstValue::MethodHandle(target))?;
            }

            I::Load { ty, local } => {
                self.check_local(*local, *ty)?;
                self.state.push(StackSlot {
                    source: SlotSource::Local(*local),
                    ty: *ty,
                })?;
            }
            I::Store { ty, local } => {
                self.check_local(*local, *ty)?;
                let value = self.pop_value()?;
                self.rebind_local(*local, value, *ty)?;
                if let Some(name) = self.debug_name(*local, self.offset) {
                    self.func.set_debug_name(value, name);
                }
            }
            I::Iinc { local, delta } => {
                self.check_local(*local, ValueType::Int)?;
                let current = self.read_local(*local, ValueType::Int)?;
                let position = self.position();
                let (_, value) = self.func.append_value(
                    self.current,
                    SsaOp::AddLiteral {
                        ty: ValueType::Int,
                        value: current,
                        literal: *delta,
                    },
                    ValueType::Int,
                    position,
                );
                self.rebind_local(*local, value, ValueType::Int)?;
            }

            I::ArrayLoad(elem) => {
                let index = self.pop_value()?;
                let array = self.pop_value()?;
                self.emit_value(
                    SsaOp::ArrayLoad {
                        elem: *elem,
                        array,
                        index,
                    },
                    elem.value_type(),
                )?;
            }
            I::ArrayStore(elem) => {
                let value = self.pop_value()?;
                let index = self.pop_value()?;
                let array = self.pop_value()?;
                self.emit(SsaOp::ArrayStore {
                    elem: *elem,
                    array,
                    index,
                    value,
                });
            }
            I::ArrayLength => {
                let array = self.pop_value()?;
                self.emit_value(SsaOp::ArrayLength { array }, ValueType::Int)?;
            }

            I::Arith { op, ty } => {
                let right = self.pop_value()?;
                let left = self.pop_value()?;
                self.emit_value(
                    SsaOp::Binary {
                        op: *op,
                        ty: *ty,
                        left,
                        right,
                    },
                    *ty,
                )?;
            }
            I::Neg(ty) => {
                let value = self.pop_value()?;
                self.emit_value(SsaOp::Neg { ty: *ty, value }, *ty)?;
            }
            I::Convert { from, to } => {
                let value = self.pop_value()?;
                self.emit_value(
                    SsaOp::Convert {
                        from: *from,
                        to: *to,
                        value,
                    },
                    *to,
                )?;
            }
            I::Cmp { ty, bias } => {
                let right = self.pop_value()?;
                let left = self.pop_value()?;
                self.emit_value(
                    SsaOp::Compare {
                        ty: *ty,
                        bias: *bias,
                        left,
                        right,
                    },
                    ValueType::Int,
                )?;
            }

            I::If { cond, .. } => {
                let left = self.pop_value()?;
                self.branch(raw, *cond, left, None)?;
                return Ok(true);
            }
            I::IfCmp { cond, .. } => {
                let right = self.pop_value()?;
                let left = self.pop_value()?;
                self.branch(raw, *cond, left, Some(right))?;
                return Ok(true);
            }
            I::Goto(_) => {
                let target = self.normal_target(raw, 0)?;
                self.emit(SsaOp::Goto { target });
                return Ok(true);
            }
            I::TableSwitch { low, .. } => {
                self.switch(raw, SwitchKeys::Table { low: *low })?;
                return Ok(true);
            }
            I::LookupSwitch { keys, targets, .. } => {
                if keys.len() != targets.len() {
                    return Err(self.error(format!(
                        "lookupswitch has {} keys but {} targets",
                        keys.len(),
                        targets.len()
                    )));
                }
                self.switch(raw, SwitchKeys::Lookup(keys.clone()))?;
                return Ok(true);
            }
            I::Return(ty) => {
                let value = match ty {
                    Some(_) => Some(self.pop_value()?),
                    None => None,
                };
                if self.lifter.config.strict_stack && self.state.depth() != 0 {
                    return Err(self.error(format!(
                        "return leaves {} values on the stack",
                        self.state.depth()
                    )));
                }
                self.emit(SsaOp::Return { value });
                return Ok(true);
            }
            I::Throw => {
                let exception = self.pop_value()?;
                self.state.clear();
                self.emit(SsaOp::Throw { exception });
                return Ok(true);
            }

            I::New(ty) => {
                let ty = self.map_type(ty);
                self.emit_value(SsaOp::NewInstance { ty }, ValueType::Object)?;
            }
            I::NewArray(ty) => {
                let size = self.pop_value()?;
                let ty = self.map_type(ty);
                self.emit_value(SsaOp::NewArray { ty, size }, ValueType::Object)?;
            }
            I::MultiANewArray { ty, dims } => {
                let dims = self.pop_values(usize::from(*dims))?;
                let ty = self.map_type(ty);
                self.emit_value(SsaOp::MultiNewArray { ty, dims }, ValueType::Object)?;
            }
            I::CheckCast(ty) => {
                let object = self.pop_value()?;
                let ty = self.map_type(ty);
                self.emit_value(SsaOp::CheckCast { ty, object }, ValueType::Object)?;
            }
            I::InstanceOf(ty) => {
                let object = self.pop_value()?;
                let ty = self.map_type(ty);
                self.emit_value(SsaOp::InstanceOf { ty, object }, ValueType::Int)?;
            }
            I::GetField(field) => {
                let object = self.pop_value()?;
                let field = self.map_field(field);
                let ty = self.value_type(&field.ty)?;
                self.emit_value(SsaOp::InstanceGet { field, object }, ty)?;
            }
            I::PutField(field) => {
                let value = self.pop_value()?;
                let object = self.pop_value()?;
                let field = self.map_field(field);
                self.emit(SsaOp::InstancePut {
                    field,
                    object,
                    value,
                });
            }
            I::GetStatic(field) => {
                let field = self.map_field(field);
                let ty = self.value_type(&field.ty)?;
                self.emit_value(SsaOp::StaticGet { field }, ty)?;
            }
            I::PutStatic(field) => {
                let value = self.pop_value()?;
                let field = self.map_field(field);
                self.emit(SsaOp::StaticPut { field, value });
            }
            I::Invoke { kind, method } => {
                let args = self.pop_values(method.argument_count(!kind.has_receiver()))?;
                let lookup = self.lifter.lens.lookup_method(method, self.lifter.method, *kind);
                let ret = lookup.reference.proto.ret.clone();
                let op = SsaOp::Invoke {
                    kind: lookup.kind,
                    method: lookup.reference,
                    args,
                };
                self.call(op, &ret)?;
            }
            I::InvokeDynamic {
                name,
                proto,
                bootstrap,
            } => {
                let args = self.pop_values(proto.params.len())?;
                let bootstrap = self
                    .lifter
                    .lens
                    .lookup_method(bootstrap, self.lifter.method, InvokeKind::Static)
                    .reference;
                let op = SsaOp::InvokeCustom {
                    name: name.clone(),
                    proto: proto.clone(),
                    bootstrap,
                    args,
                };
                self.call(op, &proto.ret)?;
            }

            I::Pop => {
                self.pop_words(1)?;
            }
            I::Pop2 => {
                self.pop_words(2)?;
            }
            I::Dup => {
                let top = self.pop_words(1)?;
                self.push_all(&top)?;
                self.push_all(&top)?;
            }
            I::DupX1 => self.dup_below(1, 1)?,
            I::DupX2 => self.dup_below(1, 2)?,
            I::Dup2 => {
                let top = self.pop_words(2)?;
                self.push_all(&top)?;
                self.push_all(&top)?;
            }
            I::Dup2X1 => self.dup_below(2, 1)?,
            I::Dup2X2 => self.dup_below(2, 2)?,
            I::Swap => {
                let top = self.pop_words(1)?;
                let below = self.pop_words(1)?;
                self.push_all(&top)?;
                self.push_all(&below)?;
            }
            I::MonitorEnter | I::MonitorExit => {
                let object = self.pop_value()?;
                self.emit(SsaOp::Monitor {
                    enter: matches!(insn, I::MonitorEnter),
                    object,
                });
            }
        }
        Ok(false)
    }

    fn constant(&mut self, value: ConstValue) -> Result<()> {
        let ty = value.value_type();
        self.emit_value(SsaOp::Const(value), ty)?;
        Ok(())
    }

    fn call(&mut self, op: SsaOp, ret: &TypeRef) -> Result<()> {
        if ret.is_void() {
            self.emit(op);
        } else {
            let ty = self.value_type(ret)?;
            self.emit_value(op, ty)?;
        }
        Ok(())
    }

    /// Copies the top `top` words below the `below` words underneath them.
    fn dup_below(&mut self, top: usize, below: usize) -> Result<()> {
        let upper = self.pop_words(top)?;
        let lower = self.pop_words(below)?;
        self.push_all(&upper)?;
        self.push_all(&lower)?;
        self.push_all(&upper)
    }

    fn rebind_local(&mut self, local: u16, value: ValueId, ty: ValueType) -> Result<()> {
        if self.state.has_pending_read(local) {
            let old = self.read_local(local, ty)?;
            self.state.materialize_local(local, old);
        }
        self.state.bind_local(local, value, ty);
        Ok(())
    }

    fn normal_target(&self, raw: usize, index: usize) -> Result<BlockId> {
        let succ = self.layout.blocks[raw]
            .normal
            .get(index)
            .copied()
            .ok_or_else(|| self.error("branch target missing from block layout"))?;
        self.ssa_block(succ)
    }

    fn branch(
        &mut self,
        raw: usize,
        cond: IfCond,
        left: ValueId,
        right: Option<ValueId>,
    ) -> Result<()> {
        let then_target = self.normal_target(raw, 0)?;
        let else_target = self.normal_target(raw, 1)?;
        self.emit(SsaOp::If {
            cond,
            left,
            right,
            then_target,
            else_target,
        });
        Ok(())
    }

    fn switch(&mut self, raw: usize, keys: SwitchKeys) -> Result<()> {
        let selector = self.pop_value()?;
        let normal = &self.layout.blocks[raw].normal;
        let Some((&default, cases)) = normal.split_last() else {
            return Err(self.error("switch without targets"));
        };
        let targets = cases
            .iter()
            .map(|&succ| self.ssa_block(succ))
            .collect::<Result<Vec<_>>>()?;
        let default = self.ssa_block(default)?;
        self.emit(SsaOp::Switch {
            selector,
            keys,
            targets,
            default,
        });
        Ok(())
    }

    fn finish(mut self) -> Result<SsaFunction> {
        if let Some(block) = self
            .func
            .block_ids()
            .into_iter()
            .find(|b| !self.sealed.contains(b))
        {
            return Err(malformed_error!(
                "{} was never sealed while lifting {}",
                block,
                self.lifter.method
            ));
        }

        eliminate_trivial_phis(&mut self.func)?;
        remove_dead_phis(&mut self.func)?;
        self.func.compact()?;
        self.func
            .set_lens(self.lifter.lens.target().or(self.lifter.code.lens));
        if self.lifter.config.verify {
            verify(&self.func)?;
        }
        Ok(self.func)
    }
}
