//! Force inlining of a single call site.
//!
//! [`ForceInliner`] substitutes one invoke instruction with a copy of the callee's body,
//! bypassing any cost heuristic. It is the mechanism the class inliner uses to expose the
//! field accesses hidden in constructors and accessors; whether a call *should* be inlined
//! is decided by the caller.
//!
//! # Shape of the result
//!
//! ```text
//!   before                     after (multi-block callee)
//!
//!   B: ...                     B: ...
//!      r = call m(a, b)           goto C0
//!      use(r)                  C0..Cn: callee blocks, args -> a, b
//!      ...                        return v  ==>  goto K
//!                              K: r' = phi(v...)   (only for several returns)
//!                                 use(r')
//!                                 ...
//! ```
//!
//! A callee consisting of one block that ends in a return is spliced directly in front of
//! the call without splitting anything.

use std::collections::HashMap;

use crate::{
    analysis::{BlockId, InsnId, Position, SsaFunction, SsaOp, ValueId},
    Result,
};

/// Substitutes calls with callee bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceInliner;

/// What an inlined call turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedCall {
    /// Number of callee instructions copied (excluding arguments and returns).
    pub instructions: usize,
    /// Number of callee blocks copied; 0 when the body was spliced in place.
    pub blocks: usize,
}

impl ForceInliner {
    /// Creates an inliner.
    #[must_use]
    pub fn new() -> Self {
        ForceInliner
    }

    /// Replaces the invoke `call` in `ssa` by the body of `callee`.
    ///
    /// Returns `None` without touching `ssa` if the call site is covered by exception
    /// handlers or the callee has handlers of its own.
    ///
    /// # Errors
    ///
    /// Returns an error if `call` is not an invoke, the argument counts disagree or the
    /// callee does not return a value the call result needs.
    pub fn inline_call(
        &self,
        ssa: &mut SsaFunction,
        call: InsnId,
        callee: &SsaFunction,
    ) -> Result<Option<InlinedCall>> {
        let instruction = ssa.instruction(call);
        let SsaOp::Invoke { args, .. } = instruction.op() else {
            return Err(malformed_error!("{} is not an invoke", call));
        };
        let args = args.clone();
        let block = instruction.block();
        let position = Position::synthetic(instruction.position().offset);

        if !ssa.block(block).handlers().is_empty()
            || callee.blocks().any(|b| !b.handlers().is_empty())
        {
            return Ok(None);
        }

        let entry = callee.entry();
        let single_block = callee.block_count() == 1
            && matches!(
                callee.terminator(entry).map(|t| t.op()),
                Some(SsaOp::Return { .. })
            );

        if single_block {
            self.splice(ssa, call, callee, &args).map(Some)
        } else {
            self.expand(ssa, call, block, callee, &args, position)
                .map(Some)
        }
    }

    /// Copies a single-block callee in front of the call.
    fn splice(
        &self,
        ssa: &mut SsaFunction,
        call: InsnId,
        callee: &SsaFunction,
        args: &[ValueId],
    ) -> Result<InlinedCall> {
        let mut values: HashMap<ValueId, ValueId> = HashMap::new();
        let mut returned = None;
        let mut copied = 0;

        for insn in callee.block_instructions(callee.entry()) {
            match insn.op() {
                SsaOp::Argument { index } => {
                    let dest = insn
                        .dest()
                        .ok_or_else(|| malformed_error!("argument without a value"))?;
                    values.insert(dest, argument(args, *index, callee)?);
                }
                SsaOp::Return { value } => {
                    returned = value.map(|v| map_value(&values, v));
                }
                op => {
                    let mut op = op.clone();
                    op.for_each_operand_mut(|operand| *operand = map_value(&values, *operand));
                    let dest = insn.dest().map(|d| {
                        let new = ssa.new_value(callee.value(d).ty());
                        values.insert(d, new);
                        new
                    });
                    ssa.insert_before(call, op, dest)?;
                    copied += 1;
                }
            }
        }

        bind_result(ssa, call, returned)?;
        ssa.remove_instruction(call)?;
        Ok(InlinedCall {
            instructions: copied,
            blocks: 0,
        })
    }

    /// Copies a multi-block callee between the call's block and a continuation block.
    fn expand(
        &self,
        ssa: &mut SsaFunction,
        call: InsnId,
        block: BlockId,
        callee: &SsaFunction,
        args: &[ValueId],
        position: Position,
    ) -> Result<InlinedCall> {
        let index = ssa
            .position_in_block(call)
            .ok_or_else(|| malformed_error!("{} is not in a block", call))?;
        let continuation = ssa.split_block(block, index + 1)?;

        let mut blocks: HashMap<BlockId, BlockId> = HashMap::new();
        for callee_block in callee.blocks() {
            blocks.insert(callee_block.id(), ssa.add_block());
        }
        let map_block = |b: BlockId| blocks.get(&b).copied().unwrap_or(b);

        // Every definition gets its new value up front so forward references (phis and
        // loop-carried values) resolve while copying.
        let mut values: HashMap<ValueId, ValueId> = HashMap::new();
        let mut phis = Vec::new();
        for callee_block in callee.blocks() {
            for phi in callee.block_phis(callee_block.id()) {
                let new = ssa.insert_phi(map_block(callee_block.id()), callee.value(phi.value()).ty());
                values.insert(phi.value(), ssa.phi(new).value());
                phis.push((new, phi.operands().to_vec()));
            }
        }
        for insn in callee.instructions() {
            match (insn.op(), insn.dest()) {
                (SsaOp::Argument { index }, Some(dest)) => {
                    values.insert(dest, argument(args, *index, callee)?);
                }
                (_, Some(dest)) => {
                    values.insert(dest, ssa.new_value(callee.value(dest).ty()));
                }
                _ => {}
            }
        }

        let mut returns: Vec<(BlockId, Option<ValueId>)> = Vec::new();
        let mut copied = 0;
        for callee_block in callee.blocks() {
            let target = map_block(callee_block.id());
            for insn in callee.block_instructions(callee_block.id()) {
                match insn.op() {
                    SsaOp::Argument { .. } => {}
                    SsaOp::Return { value } => {
                        returns.push((target, value.map(|v| map_value(&values, v))));
                        ssa.append_instruction(
                            target,
                            SsaOp::Goto {
                                target: continuation,
                            },
                            None,
                            position,
                        );
                    }
                    op => {
                        let mut op = op.clone();
                        op.for_each_operand_mut(|operand| {
                            *operand = map_value(&values, *operand);
                        });
                        op.for_each_target_mut(|t| *t = map_block(*t));
                        let dest = insn.dest().map(|d| map_value(&values, d));
                        ssa.append_instruction(target, op, dest, position);
                        copied += 1;
                    }
                }
            }
            for &pred in callee_block.predecessors() {
                ssa.add_predecessor(target, map_block(pred));
            }
        }
        for (phi, operands) in phis {
            let operands = operands.iter().map(|&v| map_value(&values, v)).collect();
            ssa.set_phi_operands(phi, operands);
        }

        // Enter the copy of the callee.
        let callee_entry = map_block(callee.entry());
        ssa.append_instruction(
            block,
            SsaOp::Goto {
                target: callee_entry,
            },
            None,
            position,
        );
        ssa.add_predecessor(callee_entry, block);

        // Leave it through the continuation.
        for &(from, _) in &returns {
            ssa.add_predecessor(continuation, from);
        }
        let result = match returns.as_slice() {
            [] => None,
            [(_, value)] => *value,
            many => {
                let dest = ssa.instruction(call).dest();
                match dest {
                    Some(dest) => {
                        let mut operands = Vec::with_capacity(many.len());
                        for (from, value) in many {
                            operands.push(value.ok_or_else(|| {
                                malformed_error!("return in {} carries no value", from)
                            })?);
                        }
                        let phi = ssa.insert_phi(continuation, ssa.value(dest).ty());
                        ssa.set_phi_operands(phi, operands);
                        Some(ssa.phi(phi).value())
                    }
                    None => None,
                }
            }
        };

        if returns.is_empty() {
            // The callee never returns normally; everything after the call is dead.
            ssa.remove_unreachable_blocks();
        } else {
            bind_result(ssa, call, result)?;
        }
        ssa.remove_instruction(call)?;

        Ok(InlinedCall {
            instructions: copied,
            blocks: blocks.len(),
        })
    }
}

fn map_value(values: &HashMap<ValueId, ValueId>, value: ValueId) -> ValueId {
    values.get(&value).copied().unwrap_or(value)
}

fn argument(args: &[ValueId], index: u16, callee: &SsaFunction) -> Result<ValueId> {
    args.get(usize::from(index)).copied().ok_or_else(|| {
        malformed_error!(
            "{} reads argument {} but the call passes {}",
            callee.method(),
            index,
            args.len()
        )
    })
}

/// Redirects the users of the call result to `returned`.
fn bind_result(ssa: &mut SsaFunction, call: InsnId, returned: Option<ValueId>) -> Result<()> {
    let Some(dest) = ssa.instruction(call).dest() else {
        return Ok(());
    };
    match returned {
        Some(value) => {
            ssa.replace_all_uses(dest, value);
            Ok(())
        }
        None if ssa.value(dest).is_unused() => Ok(()),
        None => Err(malformed_error!(
            "result {} of {} is used but the callee returns nothing",
            dest,
            call
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{verify, ConstValue, Lifter},
        assembly::{CodeBuilder, IfCond, Label},
        metadata::{MethodDefinition, MethodFlags, MethodRef, Proto, TypeRef},
    };

    fn lift(method: &MethodRef, flags: MethodFlags, code: crate::assembly::MethodCode) -> SsaFunction {
        let def = MethodDefinition::new(method.clone(), flags, Some(code));
        Lifter::for_definition(&def).unwrap().lift().unwrap()
    }

    fn static_method(name: &str, params: Vec<TypeRef>) -> MethodRef {
        MethodRef::new(TypeRef::class("A"), name, Proto::new(TypeRef::int(), params))
    }

    fn find_call(ssa: &SsaFunction) -> InsnId {
        ssa.instructions()
            .find(|i| matches!(i.op(), SsaOp::Invoke { .. }))
            .map(|i| i.id())
            .unwrap()
    }

    #[test]
    fn test_splice_single_block() {
        let add = static_method("add", vec![TypeRef::int(), TypeRef::int()]);
        let callee = lift(
            &add,
            MethodFlags::STATIC,
            CodeBuilder::new(2, 2).iload(0).iload(1).iadd().ireturn().build(),
        );
        let caller_ref = static_method("caller", vec![]);
        let mut caller = lift(
            &caller_ref,
            MethodFlags::STATIC,
            CodeBuilder::new(2, 0)
                .iconst(1)
                .iconst(2)
                .invoke_static(add)
                .ireturn()
                .build(),
        );
        let blocks = caller.block_count();

        let call = find_call(&caller);
        let inlined = ForceInliner::new().inline_call(&mut caller, call, &callee).unwrap().unwrap();
        assert_eq!(inlined.blocks, 0);
        assert_eq!(inlined.instructions, 1);
        assert_eq!(caller.block_count(), blocks);
        assert!(!caller.instructions().any(|i| matches!(i.op(), SsaOp::Invoke { .. })));
        assert!(caller
            .instructions()
            .any(|i| matches!(i.op(), SsaOp::Binary { .. })));
        verify(&caller).unwrap();
    }

    #[test]
    fn test_expand_with_two_returns_merges_through_phi() {
        let pick = static_method("pick", vec![TypeRef::int()]);
        let other = Label(1);
        let callee = lift(
            &pick,
            MethodFlags::STATIC,
            CodeBuilder::new(1, 1)
                .iload(0)
                .if_zero(IfCond::Eq, other)
                .iconst(10)
                .ireturn()
                .label(other)
                .iconst(20)
                .ireturn()
                .build(),
        );
        let caller_ref = static_method("caller", vec![TypeRef::int()]);
        let mut caller = lift(
            &caller_ref,
            MethodFlags::STATIC,
            CodeBuilder::new(2, 1)
                .iload(0)
                .invoke_static(pick)
                .iconst(1)
                .iadd()
                .ireturn()
                .build(),
        );

        let call = find_call(&caller);
        let inlined = ForceInliner::new().inline_call(&mut caller, call, &callee).unwrap().unwrap();
        assert!(inlined.blocks >= 3);
        assert_eq!(caller.phi_count(), 1);
        let phi = caller.phis().next().unwrap();
        let constants: Vec<_> = phi
            .operands()
            .iter()
            .map(|&v| caller.def_instruction(v).unwrap().op().clone())
            .collect();
        assert!(constants.contains(&SsaOp::Const(ConstValue::Int(10))));
        assert!(constants.contains(&SsaOp::Const(ConstValue::Int(20))));
        verify(&caller).unwrap();
    }

    #[test]
    fn test_call_in_try_range_is_declined() {
        let one = static_method("one", vec![]);
        let callee = lift(
            &one,
            MethodFlags::STATIC,
            CodeBuilder::new(1, 0).iconst(1).ireturn().build(),
        );
        let caller_ref = static_method("caller", vec![]);
        let (start, end, handler) = (Label(1), Label(2), Label(3));
        let mut caller = lift(
            &caller_ref,
            MethodFlags::STATIC,
            CodeBuilder::new(1, 0)
                .handler(start, end, handler, None)
                .label(start)
                .invoke_static(one)
                .ireturn()
                .label(end)
                .label(handler)
                .pop()
                .iconst(0)
                .ireturn()
                .build(),
        );
        let before = caller.clone();
        let call = find_call(&caller);
        assert!(ForceInliner::new()
            .inline_call(&mut caller, call, &callee)
            .unwrap()
            .is_none());
        assert_eq!(caller, before);
    }
}
