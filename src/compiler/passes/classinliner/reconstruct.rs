//! Field-value reconstruction for an inlined allocation.
//!
//! Once every call on an instance has been force-inlined, the only remaining users are
//! field reads and writes on it (plus the root constructor call). Each read is replaced by
//! the value the field holds at that point:
//!
//! - scanning backward within the read's block, the nearest write to the field wins; the
//!   allocation itself means "never written" and yields the zero value of the field type
//! - otherwise the value flowing into the block is used: the outgoing value of its single
//!   predecessor, or a phi over the outgoing values of all predecessors
//!
//! Phis are created before recursing into predecessors, so loops terminate on the
//! placeholder. Results are memoized per field and per block. Trivial phis are collapsed
//! after all reads of the allocation have been rewritten.

use std::collections::HashMap;

use crate::{
    analysis::{
        eliminate_trivial_phis, remove_dead_phis, BlockId, ConstValue, InsnId, PhiId,
        SsaFunction, SsaOp, ValueId, ValueUser,
    },
    compiler::passes::classinliner::eligibility::AllocationSite,
    metadata::{FieldRef, MethodRef, TypeRef, ValueType},
    Error, Result,
};

/// Counts of what reconstruction changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconstruction {
    /// Field reads replaced by values.
    pub reads: usize,
    /// Field writes deleted.
    pub writes: usize,
    /// Phis created that survived simplification.
    pub phis: usize,
}

/// Where a backward scan stops.
enum Found {
    Value(ValueId),
    Allocation,
}

/// Resolves the values of one field of one allocation.
struct FieldResolver<'a> {
    method: &'a MethodRef,
    site: &'a AllocationSite,
    field: &'a FieldRef,
    zero: Option<ValueId>,
    incoming: HashMap<BlockId, ValueId>,
    outgoing: HashMap<BlockId, ValueId>,
    phis: Vec<PhiId>,
}

impl<'a> FieldResolver<'a> {
    fn new(method: &'a MethodRef, site: &'a AllocationSite, field: &'a FieldRef) -> Self {
        FieldResolver {
            method,
            site,
            field,
            zero: None,
            incoming: HashMap::new(),
            outgoing: HashMap::new(),
            phis: Vec::new(),
        }
    }

    /// The value of the field just before `read`.
    fn value_before(&mut self, ssa: &mut SsaFunction, read: InsnId) -> Result<ValueId> {
        let block = ssa.instruction(read).block();
        let index = ssa
            .position_in_block(read)
            .ok_or_else(|| self.postcondition(format!("read {read} is not in a block")))?;
        match self.scan(ssa, block, index) {
            Some(found) => self.materialize(ssa, found),
            None => self.incoming(ssa, block),
        }
    }

    /// The value of the field at the end of `block`.
    fn outgoing(&mut self, ssa: &mut SsaFunction, block: BlockId) -> Result<ValueId> {
        if let Some(&value) = self.outgoing.get(&block) {
            return Ok(value);
        }
        let end = ssa.block(block).instructions().len();
        let value = match self.scan(ssa, block, end) {
            Some(found) => self.materialize(ssa, found)?,
            None => self.incoming(ssa, block)?,
        };
        self.outgoing.insert(block, value);
        Ok(value)
    }

    /// The value of the field on entry to `block`.
    fn incoming(&mut self, ssa: &mut SsaFunction, block: BlockId) -> Result<ValueId> {
        if let Some(&value) = self.incoming.get(&block) {
            return Ok(value);
        }
        let preds = ssa.predecessors(block).to_vec();
        let value = match preds.as_slice() {
            [] => {
                return Err(self.postcondition(format!(
                    "{} is read in {block}, which the allocation does not reach",
                    self.field
                )));
            }
            [pred] => {
                let value = self.outgoing(ssa, *pred)?;
                self.incoming.insert(block, value);
                value
            }
            _ => {
                let ty = self.value_type()?;
                let phi = ssa.insert_phi(block, ty);
                let value = ssa.phi(phi).value();
                // Placeholder first: a loop back to this block reads the phi itself.
                self.incoming.insert(block, value);
                self.phis.push(phi);

                let mut operands = Vec::with_capacity(preds.len());
                for pred in preds {
                    operands.push(self.outgoing(ssa, pred)?);
                }
                ssa.set_phi_operands(phi, operands);
                value
            }
        };
        Ok(value)
    }

    /// Scans `block` backward from just before `end` for a write to the field or the
    /// allocation.
    fn scan(&self, ssa: &SsaFunction, block: BlockId, end: usize) -> Option<Found> {
        let instructions = &ssa.block(block).instructions()[..end];
        instructions.iter().rev().find_map(|&insn| {
            let instruction = ssa.instruction(insn);
            match instruction.op() {
                SsaOp::InstancePut {
                    field,
                    object,
                    value,
                } if *object == self.site.value && field == self.field => {
                    Some(Found::Value(*value))
                }
                _ if insn == self.site.insn => Some(Found::Allocation),
                _ => None,
            }
        })
    }

    fn materialize(&mut self, ssa: &mut SsaFunction, found: Found) -> Result<ValueId> {
        match found {
            Found::Value(value) => Ok(value),
            Found::Allocation => self.zero(ssa),
        }
    }

    /// The zero value of the field, created once in front of the allocation.
    fn zero(&mut self, ssa: &mut SsaFunction) -> Result<ValueId> {
        if let Some(zero) = self.zero {
            return Ok(zero);
        }
        let ty = self.value_type()?;
        let value = ssa.new_value(ty);
        ssa.insert_before(self.site.insn, SsaOp::Const(ConstValue::zero(ty)), Some(value))?;
        self.zero = Some(value);
        Ok(value)
    }

    fn value_type(&self) -> Result<ValueType> {
        self.field.ty.value_type().ok_or_else(|| {
            self.postcondition(format!("field {} has no value type", self.field))
        })
    }

    fn postcondition(&self, message: String) -> Error {
        postcondition(self.method, self.site, message)
    }
}

/// Replaces every field read of the allocation, then deletes its writes, the root
/// constructor call and the allocation itself.
///
/// `root` is the universal root type whose constructor call is stripped.
///
/// # Errors
///
/// Returns [`Error::InliningPostcondition`] if anything other than field accesses and the
/// root constructor call still uses the allocation, or if the allocation keeps any use
/// after stripping.
pub fn reconstruct(
    ssa: &mut SsaFunction,
    site: &AllocationSite,
    root: &TypeRef,
) -> Result<Reconstruction> {
    let method = ssa.method().clone();
    let mut reads: Vec<(InsnId, FieldRef)> = Vec::new();
    let mut writes: Vec<InsnId> = Vec::new();
    let mut constructors: Vec<InsnId> = Vec::new();

    for user in ssa.unique_users(site.value) {
        let ValueUser::Instruction(insn) = user else {
            return Err(postcondition(
                &method,
                site,
                "the allocation flows into a phi".to_string(),
            ));
        };
        match ssa.instruction(insn).op() {
            SsaOp::InstanceGet { field, .. } => reads.push((insn, field.clone())),
            SsaOp::InstancePut { object, value, .. }
                if *object == site.value && *value != site.value =>
            {
                writes.push(insn);
            }
            SsaOp::Invoke { method: target, args, .. }
                if target.is_constructor() && target.holder == *root && args.len() == 1 =>
            {
                constructors.push(insn);
            }
            other => {
                return Err(postcondition(
                    &method,
                    site,
                    format!("unexpected use {}", other.mnemonic()),
                ));
            }
        }
    }

    // Resolve everything before rewriting, while all writes are still in place.
    let mut resolved: Vec<(InsnId, ValueId)> = Vec::with_capacity(reads.len());
    let mut created: Vec<PhiId> = Vec::new();
    let mut by_field: Vec<(FieldRef, Vec<InsnId>)> = Vec::new();
    for (insn, field) in reads {
        match by_field.iter_mut().find(|(f, _)| *f == field) {
            Some((_, insns)) => insns.push(insn),
            None => by_field.push((field, vec![insn])),
        }
    }
    for (field, insns) in &by_field {
        let mut resolver = FieldResolver::new(&method, site, field);
        for &insn in insns {
            resolved.push((insn, resolver.value_before(ssa, insn)?));
        }
        created.extend(resolver.phis);
    }

    for &phi in &created {
        let node = ssa.phi(phi);
        if node.operands().len() != ssa.predecessors(node.block()).len() {
            return Err(postcondition(&method, site, format!("{phi} was never filled")));
        }
    }

    // A read may resolve to the result of another read; follow the replacements.
    let mut replaced: HashMap<ValueId, ValueId> = HashMap::new();
    let read_count = resolved.len();
    for (insn, value) in resolved {
        let mut value = value;
        while let Some(&next) = replaced.get(&value) {
            value = next;
        }
        let Some(dest) = ssa.instruction(insn).dest() else {
            continue;
        };
        if dest == value {
            return Err(postcondition(&method, site, format!("read {insn} resolves to itself")));
        }
        ssa.replace_all_uses(dest, value);
        replaced.insert(dest, value);
        ssa.remove_instruction(insn)?;
    }

    for &insn in &writes {
        ssa.remove_instruction(insn)?;
    }
    for &insn in &constructors {
        ssa.remove_instruction(insn)?;
    }

    eliminate_trivial_phis(ssa)?;
    remove_dead_phis(ssa)?;
    let phis = created.iter().filter(|&&p| !ssa.phi(p).is_removed()).count();

    if !ssa.value(site.value).is_unused() {
        return Err(postcondition(
            &method,
            site,
            format!(
                "{} still has {} uses after stripping",
                site.value,
                ssa.value(site.value).users().len()
            ),
        ));
    }
    ssa.remove_instruction(site.insn)?;

    Ok(Reconstruction {
        reads: read_count,
        writes: writes.len(),
        phis,
    })
}

fn postcondition(method: &MethodRef, site: &AllocationSite, message: String) -> Error {
    Error::InliningPostcondition {
        method: method.clone(),
        offset: site.offset,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{verify, Lifter},
        assembly::{CodeBuilder, IfCond, Label},
        metadata::{MethodDefinition, MethodFlags, Proto},
        test::{l_type, x_field},
    };

    fn lift(code: crate::assembly::MethodCode) -> SsaFunction {
        let method = MethodRef::new(
            TypeRef::class("Caller"),
            "run",
            Proto::new(TypeRef::int(), vec![TypeRef::int()]),
        );
        let def = MethodDefinition::new(method, MethodFlags::STATIC, Some(code));
        Lifter::for_definition(&def).unwrap().lift().unwrap()
    }

    fn site(ssa: &SsaFunction) -> AllocationSite {
        AllocationSite::collect(ssa).remove(0)
    }

    #[test]
    fn test_unwritten_field_reads_zero() {
        let mut ssa = lift(
            CodeBuilder::new(2, 2)
                .new_instance(l_type())
                .astore(1)
                .aload(1)
                .get_field(x_field())
                .ireturn()
                .build(),
        );
        let site = site(&ssa);
        let result = reconstruct(&mut ssa, &site, &TypeRef::object()).unwrap();
        assert_eq!(result.reads, 1);
        assert_eq!(result.writes, 0);
        assert_eq!(result.phis, 0);

        let ret = ssa
            .instructions()
            .find_map(|i| match i.op() {
                SsaOp::Return { value: Some(v) } => Some(*v),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            ssa.def_instruction(ret).unwrap().op(),
            &SsaOp::Const(ConstValue::Int(0))
        );
        assert!(!ssa
            .instructions()
            .any(|i| matches!(i.op(), SsaOp::NewInstance { .. })));
        verify(&ssa).unwrap();
    }

    #[test]
    fn test_write_on_one_path_inserts_phi() {
        let join = Label(1);
        let mut ssa = lift(
            CodeBuilder::new(2, 2)
                .new_instance(l_type())
                .astore(1)
                .iload(0)
                .if_zero(IfCond::Eq, join)
                .aload(1)
                .iconst(5)
                .put_field(x_field())
                .label(join)
                .aload(1)
                .get_field(x_field())
                .ireturn()
                .build(),
        );
        let site = site(&ssa);
        let result = reconstruct(&mut ssa, &site, &TypeRef::object()).unwrap();
        assert_eq!(result.reads, 1);
        assert_eq!(result.writes, 1);
        assert_eq!(result.phis, 1);

        let phi = ssa.phis().next().unwrap();
        let mut constants: Vec<SsaOp> = phi
            .operands()
            .iter()
            .map(|&v| ssa.def_instruction(v).unwrap().op().clone())
            .collect();
        constants.sort_by_key(|op| format!("{op:?}"));
        assert_eq!(
            constants,
            vec![
                SsaOp::Const(ConstValue::Int(0)),
                SsaOp::Const(ConstValue::Int(5)),
            ]
        );
        assert!(!ssa
            .instructions()
            .any(|i| matches!(i.op(), SsaOp::InstancePut { .. } | SsaOp::InstanceGet { .. })));
        verify(&ssa).unwrap();
    }

    #[test]
    fn test_write_in_loop_merges_at_header() {
        let header = Label(1);
        let exit = Label(2);
        let mut ssa = lift(
            CodeBuilder::new(3, 2)
                .new_instance(l_type())
                .astore(1)
                .label(header)
                .aload(1)
                .get_field(x_field())
                .iload(0)
                .if_icmp(IfCond::Ge, exit)
                .aload(1)
                .aload(1)
                .get_field(x_field())
                .iconst(1)
                .iadd()
                .put_field(x_field())
                .goto(header)
                .label(exit)
                .aload(1)
                .get_field(x_field())
                .ireturn()
                .build(),
        );
        let site = site(&ssa);
        let result = reconstruct(&mut ssa, &site, &TypeRef::object()).unwrap();
        assert_eq!(result.reads, 3);
        assert_eq!(result.writes, 1);
        assert_eq!(result.phis, 1);
        assert!(ssa.value(site.value).is_unused());
        verify(&ssa).unwrap();
    }

    #[test]
    fn test_unexpected_use_is_fatal() {
        let mut ssa = lift(
            CodeBuilder::new(2, 2)
                .new_instance(l_type())
                .checkcast(l_type())
                .pop()
                .iconst(0)
                .ireturn()
                .build(),
        );
        let site = site(&ssa);
        let before = ssa.clone();
        assert!(matches!(
            reconstruct(&mut ssa, &site, &TypeRef::object()),
            Err(Error::InliningPostcondition { .. })
        ));
        assert_eq!(ssa, before);
    }
}
