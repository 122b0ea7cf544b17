//! Receiver summaries for interprocedural decisions.
//!
//! A [`MethodSummary`] records what a method does with its receiver and whether its body
//! may be force-inlined. The class inliner consults it for every call on a candidate
//! allocation: a call is only safe to inline when the callee never lets `this` escape.

use crate::{
    analysis::{SsaFunction, SsaOp, ValueId, ValueUser},
    metadata::{MethodDefinition, MethodRef, TypeRef},
};

/// What a callee does with its receiver, as needed while summarizing a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverUse {
    /// The receiver escapes the callee.
    pub leaks: bool,
    /// The callee may return its receiver.
    pub returns: bool,
}

/// Summary of a method's behavior for interprocedural analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    /// The summarized method.
    pub method: MethodRef,

    /// The receiver may escape: it is stored, passed on, merged or thrown.
    ///
    /// Always `true` for static methods, which have no receiver to reason about.
    pub leaks_receiver: bool,

    /// Some return instruction returns the receiver.
    pub returns_receiver: bool,

    /// Number of SSA instructions, excluding argument definitions.
    pub instruction_count: usize,

    /// The body may be force-inlined: it has code, no handlers and no monitors, is not
    /// native, abstract or synchronized, and does not call itself.
    pub inlinable: bool,
}

impl MethodSummary {
    /// Creates a summary that allows nothing.
    #[must_use]
    pub fn opaque(method: MethodRef) -> Self {
        Self {
            method,
            leaks_receiver: true,
            returns_receiver: false,
            instruction_count: 0,
            inlinable: false,
        }
    }

    /// Summarizes `definition` from its lifted body.
    ///
    /// `root` is the universal root type: calling its constructor on the receiver does not
    /// leak it. `callee` answers what a same-holder method does with its receiver; it
    /// returns `None` when that is unknown (including recursion), which counts as leaking.
    pub fn analyze(
        definition: &MethodDefinition,
        ssa: &SsaFunction,
        root: &TypeRef,
        mut callee: impl FnMut(&MethodRef) -> Option<ReceiverUse>,
    ) -> Self {
        let method = definition.reference.clone();
        let instruction_count = ssa
            .instructions()
            .filter(|insn| !matches!(insn.op(), SsaOp::Argument { .. }))
            .count();

        let has_handlers = definition
            .code
            .as_ref()
            .map_or(true, |code| !code.handlers.is_empty());
        let has_monitors = ssa
            .instructions()
            .any(|insn| matches!(insn.op(), SsaOp::Monitor { .. }));
        let self_recursive = ssa.instructions().any(
            |insn| matches!(insn.op(), SsaOp::Invoke { method: target, .. } if *target == method),
        );
        let inlinable = !has_handlers
            && !has_monitors
            && !self_recursive
            && !definition.is_native()
            && !definition.is_abstract()
            && !definition.is_synchronized();

        let (leaks_receiver, returns_receiver) = match receiver_value(ssa) {
            Some(receiver) => receiver_escape(ssa, receiver, &method, root, &mut callee),
            None => (true, false),
        };

        Self {
            method,
            leaks_receiver,
            returns_receiver,
            instruction_count,
            inlinable,
        }
    }

    /// The receiver-related part of the summary.
    #[must_use]
    pub fn receiver_use(&self) -> ReceiverUse {
        ReceiverUse {
            leaks: self.leaks_receiver,
            returns: self.returns_receiver,
        }
    }

    /// Inlinable and does not leak its receiver.
    #[must_use]
    pub fn is_receiver_safe(&self) -> bool {
        self.inlinable && !self.leaks_receiver
    }
}

/// The value defined by `Argument { index: 0 }` of an instance method.
pub(crate) fn receiver_value(ssa: &SsaFunction) -> Option<ValueId> {
    if ssa.is_static() {
        return None;
    }
    ssa.block_instructions(ssa.entry())
        .find(|insn| matches!(insn.op(), SsaOp::Argument { index: 0 }))
        .and_then(|insn| insn.dest())
}

fn receiver_escape(
    ssa: &SsaFunction,
    receiver: ValueId,
    method: &MethodRef,
    root: &TypeRef,
    callee: &mut impl FnMut(&MethodRef) -> Option<ReceiverUse>,
) -> (bool, bool) {
    let mut returns = false;
    for user in ssa.unique_users(receiver) {
        let ValueUser::Instruction(insn) = user else {
            return (true, returns);
        };
        let instruction = ssa.instruction(insn);
        let safe = match instruction.op() {
            SsaOp::InstanceGet { .. } => true,
            SsaOp::InstancePut { value, .. } => *value != receiver,
            SsaOp::Return { .. } => {
                returns = true;
                true
            }
            SsaOp::Invoke {
                method: target,
                args,
                kind,
            } if kind.has_receiver()
                && args.first() == Some(&receiver)
                && !args[1..].contains(&receiver) =>
            {
                if target.is_constructor() && target.holder == *root {
                    true
                } else if target.holder == method.holder && target != method {
                    match callee(target) {
                        Some(usage) if !usage.leaks => {
                            // A returned receiver aliases ours; only an unused result is safe.
                            !usage.returns
                                || instruction
                                    .dest()
                                    .map_or(true, |dest| ssa.value(dest).is_unused())
                        }
                        _ => false,
                    }
                } else {
                    false
                }
            }
            _ => false,
        };
        if !safe {
            return (true, returns);
        }
    }
    (false, returns)
}
