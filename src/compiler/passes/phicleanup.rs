//! Phi cleanup: trivial phi elimination followed by dead phi removal.

use crate::{
    analysis::{eliminate_trivial_phis, remove_dead_phis, SsaFunction},
    compiler::{CompilerContext, EventKind, SsaPass},
    metadata::MethodRef,
    Result,
};

/// Collapses trivial phis and removes phis nothing reads.
#[derive(Debug, Default)]
pub struct PhiCleanupPass;

impl PhiCleanupPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SsaPass for PhiCleanupPass {
    fn name(&self) -> &'static str {
        "PhiCleanup"
    }

    fn description(&self) -> &'static str {
        "Removes trivial and dead phis"
    }

    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: &MethodRef,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        let removed = eliminate_trivial_phis(ssa)? + remove_dead_phis(ssa)?;
        if removed > 0 {
            ctx.events
                .record(EventKind::PhiSimplified)
                .method(method)
                .message(format!("{removed} phis removed"))
                .pass(self.name());
        }
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::{ConstValue, Position, SsaOp},
        compiler::CompilerConfig,
        metadata::{Program, Proto, TypeRef, ValueType},
    };

    #[test]
    fn test_removes_trivial_phi_once() {
        let method = MethodRef::new(TypeRef::class("A"), "f", Proto::new(TypeRef::int(), vec![]));
        let mut ssa = SsaFunction::new(method.clone(), true);
        let pos = Position::synthetic(0);
        let b0 = ssa.add_block();
        let b1 = ssa.add_block();
        let (_, one) = ssa.append_value(b0, SsaOp::Const(ConstValue::Int(1)), ValueType::Int, pos);
        ssa.append_instruction(b0, SsaOp::Goto { target: b1 }, None, pos);
        ssa.add_predecessor(b1, b0);
        let phi = ssa.insert_phi(b1, ValueType::Int);
        ssa.set_phi_operands(phi, vec![one]);
        let merged = ssa.phi(phi).value();
        ssa.append_instruction(b1, SsaOp::Return { value: Some(merged) }, None, pos);

        let ctx = CompilerContext::new(Arc::new(Program::new()), CompilerConfig::default());
        let pass = PhiCleanupPass::new();
        assert!(pass.run_on_method(&mut ssa, &method, &ctx).unwrap());
        assert_eq!(ssa.phi_count(), 0);
        assert!(ctx.events.has(EventKind::PhiSimplified));

        // Already reduced: a second run is a no-op.
        let before = ssa.clone();
        assert!(!pass.run_on_method(&mut ssa, &method, &ctx).unwrap());
        assert_eq!(ssa, before);
    }
}
