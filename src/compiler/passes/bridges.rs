//! Bridge forwarding.
//!
//! Compilers emit bridge methods whose body does nothing but pass every argument on to
//! another method and return its result. This pass maps each such bridge to the method it
//! forwards to in a new [`LensLayer`], then makes that layer current. Callers pick up the
//! new names when the scheduler refreshes their references; nothing is rewritten here.

use dashmap::DashSet;

use crate::{
    analysis::{SsaFunction, SsaOp, ValueId},
    compiler::{CompilerContext, EventKind, SsaPass},
    lens::LensLayer,
    metadata::{InvokeKind, MethodRef, ProgramItem},
    Result,
};

/// Forwards calls of bridge methods to their targets through a lens layer.
#[derive(Debug, Default)]
pub struct BridgeForwardingPass {
    forwarded: DashSet<MethodRef>,
}

impl BridgeForwardingPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_candidate(method: &MethodRef, ctx: &CompilerContext) -> bool {
        ctx.app.method_definition(method).is_some_and(|def| {
            def.is_bridge() && !ctx.app.is_pinned(&ProgramItem::Method(method.clone()))
        })
    }
}

/// The call a forwarding body makes, if the body does nothing else.
///
/// A forwarding body consists of its arguments, one invoke passing all of them in order,
/// and a return of the invoke's result (or a plain return for void calls).
pub fn forwarding_target(ssa: &SsaFunction) -> Option<(InvokeKind, MethodRef)> {
    let mut arguments: Vec<(u16, ValueId)> = Vec::new();
    let mut call: Option<(InvokeKind, &MethodRef, &[ValueId], Option<ValueId>)> = None;
    let mut returned: Option<Option<ValueId>> = None;

    for insn in ssa.instructions() {
        match insn.op() {
            SsaOp::Argument { index } => arguments.push((*index, insn.dest()?)),
            SsaOp::Goto { .. } | SsaOp::Nop => {}
            SsaOp::Invoke { kind, method, args } if call.is_none() && returned.is_none() => {
                call = Some((*kind, method, args.as_slice(), insn.dest()));
            }
            SsaOp::Return { value } if call.is_some() && returned.is_none() => {
                returned = Some(*value);
            }
            _ => return None,
        }
    }

    let (kind, target, args, result) = call?;
    let returned = returned?;
    arguments.sort_unstable_by_key(|(index, _)| *index);
    let forwards_all = arguments.len() == args.len()
        && arguments.iter().zip(args).all(|((_, a), b)| a == b);
    let returns_result = match returned {
        Some(value) => result == Some(value),
        None => target.proto.ret.is_void(),
    };

    (forwards_all && returns_result && target != ssa.method()).then(|| (kind, target.clone()))
}

impl SsaPass for BridgeForwardingPass {
    fn name(&self) -> &'static str {
        "BridgeForwarding"
    }

    fn description(&self) -> &'static str {
        "Maps forwarding bridge methods to their targets"
    }

    fn is_global(&self) -> bool {
        true
    }

    fn run_on_method(
        &self,
        _ssa: &mut SsaFunction,
        _method: &MethodRef,
        _ctx: &CompilerContext,
    ) -> Result<bool> {
        Ok(false)
    }

    fn run_global(&self, ctx: &CompilerContext) -> Result<bool> {
        if !ctx.config.enable_bridge_forwarding {
            return Ok(false);
        }

        let mut bridges: Vec<(MethodRef, InvokeKind, MethodRef)> = Vec::new();
        for method in ctx.all_methods() {
            if self.forwarded.contains(&method) || !Self::is_candidate(&method, ctx) {
                continue;
            }
            match ctx.with_ssa(&method, forwarding_target) {
                // Special calls only resolve from inside the declaring class.
                Some(Some((InvokeKind::Special, _))) | Some(None) | None => {}
                Some(Some((kind, target))) => bridges.push((method, kind, target)),
            }
        }
        if bridges.is_empty() {
            return Ok(false);
        }

        let mut builder = LensLayer::builder(self.name());
        for (bridge, kind, target) in &bridges {
            // Callers take over the bridge's own call, so a static bridge to an instance
            // method becomes a virtual call on the first argument.
            builder = builder.map_method_with_kind(bridge.clone(), target.clone(), *kind);
        }
        let layer = builder.build(ctx.current_lens());
        let id = ctx.lenses.push(layer)?;
        ctx.set_current_lens(Some(id));

        ctx.events
            .record(EventKind::LensLayerCreated)
            .message(format!("{id}: {} bridges", bridges.len()))
            .pass(self.name());
        for (bridge, kind, target) in bridges {
            ctx.events
                .record(EventKind::BridgeForwarded)
                .method(&bridge)
                .message(format!("{kind} {target}"))
                .pass(self.name());
            self.forwarded.insert(bridge);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::Lifter,
        assembly::CodeBuilder,
        compiler::CompilerConfig,
        metadata::{ClassBuilder, MethodDefinition, MethodFlags, Program, Proto, TypeRef},
    };

    fn holder() -> TypeRef {
        TypeRef::class("Box")
    }

    fn get_int() -> MethodRef {
        MethodRef::new(holder(), "getInt", Proto::new(TypeRef::int(), vec![]))
    }

    fn get_bridge() -> MethodRef {
        MethodRef::new(holder(), "get", Proto::new(TypeRef::int(), vec![]))
    }

    fn bridge_definition(flags: MethodFlags) -> MethodDefinition {
        MethodDefinition::new(
            get_bridge(),
            flags,
            Some(
                CodeBuilder::new(1, 1)
                    .aload(0)
                    .invoke_virtual(get_int())
                    .ireturn()
                    .build(),
            ),
        )
    }

    fn context(flags: MethodFlags) -> CompilerContext {
        let program = Program::new();
        let bridge = bridge_definition(flags);
        program.add_class(ClassBuilder::new(holder()).method(bridge).build());
        let ctx = CompilerContext::new(Arc::new(program), CompilerConfig::default());
        let def = bridge_definition(flags);
        let ssa = Lifter::for_definition(&def).unwrap().lift().unwrap();
        ctx.set_ssa(get_bridge(), ssa);
        ctx
    }

    #[test]
    fn test_forwarding_target() {
        let def = bridge_definition(MethodFlags::BRIDGE);
        let ssa = Lifter::for_definition(&def).unwrap().lift().unwrap();
        assert_eq!(
            forwarding_target(&ssa),
            Some((InvokeKind::Virtual, get_int()))
        );
    }

    #[test]
    fn test_extra_work_is_not_forwarding() {
        let def = MethodDefinition::new(
            get_bridge(),
            MethodFlags::BRIDGE,
            Some(
                CodeBuilder::new(2, 1)
                    .aload(0)
                    .invoke_virtual(get_int())
                    .iconst(1)
                    .iadd()
                    .ireturn()
                    .build(),
            ),
        );
        let ssa = Lifter::for_definition(&def).unwrap().lift().unwrap();
        assert_eq!(forwarding_target(&ssa), None);
    }

    #[test]
    fn test_creates_one_layer() {
        let ctx = context(MethodFlags::BRIDGE);
        let pass = BridgeForwardingPass::new();

        assert!(pass.run_global(&ctx).unwrap());
        assert_eq!(ctx.lenses.len(), 1);
        let view = ctx.lens_view(None).unwrap();
        let caller = MethodRef::new(TypeRef::class("User"), "run", Proto::new(TypeRef::int(), vec![]));
        assert_eq!(
            view.lookup_method(&get_bridge(), &caller, InvokeKind::Virtual)
                .reference,
            get_int()
        );
        assert_eq!(ctx.events.count_kind(EventKind::BridgeForwarded), 1);

        // Callers reaching the bridge statically still call the target virtually.
        assert_eq!(
            view.lookup_method(&get_bridge(), &caller, InvokeKind::Static)
                .kind,
            InvokeKind::Virtual
        );

        // Already forwarded: a second run changes nothing.
        assert!(!pass.run_global(&ctx).unwrap());
        assert_eq!(ctx.lenses.len(), 1);
    }

    #[test]
    fn test_special_forwarding_is_skipped() {
        let program = Program::new();
        let def = MethodDefinition::new(
            get_bridge(),
            MethodFlags::BRIDGE,
            Some(
                CodeBuilder::new(1, 1)
                    .aload(0)
                    .invoke_special(get_int())
                    .ireturn()
                    .build(),
            ),
        );
        let ssa = Lifter::for_definition(&def).unwrap().lift().unwrap();
        program.add_class(ClassBuilder::new(holder()).method(def).build());
        let ctx = CompilerContext::new(Arc::new(program), CompilerConfig::default());
        ctx.set_ssa(get_bridge(), ssa);

        assert!(!BridgeForwardingPass::new().run_global(&ctx).unwrap());
        assert!(ctx.lenses.is_empty());
    }

    #[test]
    fn test_ignores_methods_without_bridge_flag() {
        let ctx = context(MethodFlags::empty());
        assert!(!BridgeForwardingPass::new().run_global(&ctx).unwrap());
        assert!(ctx.lenses.is_empty());
        assert_eq!(ctx.current_lens(), None);
    }
}
