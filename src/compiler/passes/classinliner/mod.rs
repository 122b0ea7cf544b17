//! Class inlining: eliminating allocations of small, non-escaping classes.
//!
//! For every `NewInstance` in a method the pass decides whether the instance can be
//! replaced by its fields. A site qualifies when its class is eligible (see
//! [`ClassVerdict`]) and every use of the instance is a field access on it or a call that
//! can be force-inlined without the receiver escaping.
//!
//! # Processing one site
//!
//! ```text
//!   analyze uses ──rejected──> leave the method untouched
//!        │
//!     eligible
//!        │
//!   force-inline the calls ──> analyze again (new uses exposed by the inlined bodies)
//!        │
//!   no calls left
//!        │
//!   reconstruct field values, strip writes, root constructor and allocation
//! ```
//!
//! All of this happens on a copy of the method. The copy replaces the method only when the
//! whole sequence succeeds, so a rejected site never leaves a partial rewrite behind.
//! Sites are processed one at a time, in block order.

mod eligibility;
mod reconstruct;

pub use eligibility::{
    analyze_site, AllocationSite, Candidate, ClassRejection, ClassVerdict, SiteAnalysis,
    SiteRejection,
};
pub use reconstruct::{reconstruct, Reconstruction};

use crate::{
    analysis::SsaFunction,
    compiler::{passes::ForceInliner, CompilerContext, EventKind, SsaPass},
    metadata::{MethodRef, ProgramItem},
    Result,
};

/// Inlines non-escaping allocations of eligible classes.
#[derive(Debug, Default)]
pub struct ClassInliningPass {
    inliner: ForceInliner,
}

/// What happened to one inlined site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct InlinedSite {
    calls: Vec<MethodRef>,
    reconstruction: Reconstruction,
}

impl ClassInliningPass {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one site on a copy of `ssa`.
    ///
    /// Returns the rewritten copy, or the reason the site was rejected.
    fn inline_site(
        &self,
        ssa: &SsaFunction,
        site: &AllocationSite,
        ctx: &CompilerContext,
    ) -> Result<std::result::Result<(SsaFunction, InlinedSite), SiteRejection>> {
        let verdict = ctx.class_verdict(&site.ty);
        if let ClassVerdict::Ineligible(reason) = verdict {
            return Ok(Err(SiteRejection::Class(reason)));
        }
        let Some(class) = ctx.app.definition_for(&site.ty) else {
            return Ok(Err(SiteRejection::Class(ClassRejection::Undefined)));
        };

        let config = &ctx.config.class_inlining;
        let mut work = ssa.clone();
        let mut inlined = InlinedSite::default();
        let mut spent = 0usize;

        // One analysis per round, plus a last one to see whether the final round converged.
        for round in 0..=config.max_inlining_rounds {
            let analysis = analyze_site(&work, site, &class, ctx)?;
            let cost = analysis.cost();
            let candidates = match analysis {
                SiteAnalysis::Rejected(rejection) => return Ok(Err(rejection)),
                SiteAnalysis::Eligible(candidates) => candidates,
            };
            if candidates.is_empty() {
                inlined.reconstruction = reconstruct(&mut work, site, &ctx.app.root_type())?;
                return Ok(Ok((work, inlined)));
            }
            if round == config.max_inlining_rounds {
                break;
            }

            spent += cost;
            if spent > config.instruction_allowance {
                return Ok(Err(SiteRejection::InstructionBudget(
                    config.instruction_allowance,
                )));
            }

            for candidate in candidates {
                let Some(body) = ctx.callee_body(&candidate.target)? else {
                    return Ok(Err(SiteRejection::InliningFailed(candidate.target)));
                };
                if self
                    .inliner
                    .inline_call(&mut work, candidate.call, &body)?
                    .is_none()
                {
                    return Ok(Err(SiteRejection::InliningFailed(candidate.target)));
                }
                inlined.calls.push(candidate.target);
            }
        }

        Ok(Err(SiteRejection::RoundLimit))
    }
}

impl SsaPass for ClassInliningPass {
    fn name(&self) -> &'static str {
        "ClassInlining"
    }

    fn description(&self) -> &'static str {
        "Replaces non-escaping allocations by their field values"
    }

    fn should_run(&self, method: &MethodRef, ctx: &CompilerContext) -> bool {
        ctx.config.class_inlining.enabled
            && !ctx.app.is_pinned(&ProgramItem::Method(method.clone()))
    }

    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: &MethodRef,
        ctx: &CompilerContext,
    ) -> Result<bool> {
        let mut changed = false;

        for site in AllocationSite::collect(ssa) {
            // An earlier site may have made this one unreachable.
            if ssa.instruction(site.insn).is_removed() {
                continue;
            }

            match self.inline_site(ssa, &site, ctx)? {
                Ok((rewritten, inlined)) => {
                    *ssa = rewritten;
                    changed = true;

                    for target in &inlined.calls {
                        ctx.events
                            .record(EventKind::MethodInlined)
                            .at(method, site.offset)
                            .message(format!("{target}"))
                            .pass(self.name());
                    }
                    if inlined.reconstruction.phis > 0 {
                        ctx.events
                            .record(EventKind::PhiInserted)
                            .at(method, site.offset)
                            .message(format!(
                                "{} phis for fields of {}",
                                inlined.reconstruction.phis, site.ty
                            ))
                            .pass(self.name());
                    }
                    ctx.events
                        .record(EventKind::InstructionRemoved)
                        .at(method, site.offset)
                        .message(format!("new {}", site.ty))
                        .pass(self.name());
                    ctx.events
                        .record(EventKind::AllocationInlined)
                        .at(method, site.offset)
                        .message(format!(
                            "{}: {} reads, {} writes",
                            site.ty,
                            inlined.reconstruction.reads,
                            inlined.reconstruction.writes
                        ))
                        .pass(self.name());
                }
                Err(rejection) => {
                    if ctx.config.class_inlining.log_rejections {
                        ctx.events
                            .record(EventKind::SiteRejected)
                            .at(method, site.offset)
                            .message(format!("{}: {rejection}", site.ty))
                            .pass(self.name());
                    }
                }
            }
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::{verify, ConstValue, Lifter, SsaOp},
        assembly::{CodeBuilder, Label, MethodCode},
        compiler::{ClassInliningConfig, CompilerConfig},
        metadata::{FieldRef, MethodDefinition, MethodFlags, Program, Proto, TypeRef},
        test::{
            get_x, l_caller, l_constructor, l_program, l_program_with, l_type, static_caller,
        },
    };

    fn setup(caller: &MethodDefinition, config: CompilerConfig) -> (CompilerContext, SsaFunction) {
        let ctx = CompilerContext::new(Arc::new(l_program()), config);
        let ssa = Lifter::for_definition(caller).unwrap().lift().unwrap();
        (ctx, ssa)
    }

    /// Rejects the only allocation in `code` and checks that the pass leaves the method as
    /// lifted.
    fn rejection_of(program: Program, code: MethodCode, config: CompilerConfig) -> SiteRejection {
        let caller = static_caller(code);
        let ctx = CompilerContext::new(Arc::new(program), config);
        let mut ssa = Lifter::for_definition(&caller).unwrap().lift().unwrap();
        let before = ssa.clone();
        let sites = AllocationSite::collect(&ssa);
        assert_eq!(sites.len(), 1);

        let pass = ClassInliningPass::new();
        let rejection = pass.inline_site(&ssa, &sites[0], &ctx).unwrap().unwrap_err();
        assert!(!pass
            .run_on_method(&mut ssa, &caller.reference, &ctx)
            .unwrap());
        assert_eq!(ssa, before);
        rejection
    }

    /// `new L(1)` followed by `then`, with the instance in local 0.
    fn with_instance(then: impl FnOnce(CodeBuilder) -> CodeBuilder) -> MethodCode {
        let code = CodeBuilder::new(3, 1)
            .new_instance(l_type())
            .dup()
            .iconst(1)
            .invoke_special(l_constructor())
            .astore(0);
        then(code).build()
    }

    fn l_method(name: &str, ret: TypeRef, code: MethodCode) -> (MethodRef, MethodDefinition) {
        let reference = MethodRef::new(l_type(), name, Proto::new(ret, vec![]));
        let definition = MethodDefinition::new(reference.clone(), MethodFlags::PUBLIC, Some(code));
        (reference, definition)
    }

    fn logging() -> CompilerConfig {
        CompilerConfig::default().with_class_inlining(ClassInliningConfig {
            log_rejections: true,
            ..ClassInliningConfig::default()
        })
    }

    #[test]
    fn test_inlines_constructor_and_accessor() {
        let caller = l_caller(false);
        let (ctx, mut ssa) = setup(&caller, logging());
        let pass = ClassInliningPass::new();

        assert!(pass
            .run_on_method(&mut ssa, &caller.reference, &ctx)
            .unwrap());
        verify(&ssa).unwrap();

        assert!(!ssa.instructions().any(|i| matches!(
            i.op(),
            SsaOp::NewInstance { .. }
                | SsaOp::Invoke { .. }
                | SsaOp::InstanceGet { .. }
                | SsaOp::InstancePut { .. }
        )));
        let returned = ssa
            .instructions()
            .find_map(|i| match i.op() {
                SsaOp::Return { value: Some(v) } => Some(*v),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            ssa.def_instruction(returned).unwrap().op(),
            &SsaOp::Const(ConstValue::Int(1))
        );

        assert_eq!(ctx.events.count_kind(EventKind::AllocationInlined), 1);
        assert_eq!(ctx.events.count_kind(EventKind::MethodInlined), 2);
        assert_eq!(ctx.events.count_kind(EventKind::SiteRejected), 0);
    }

    #[test]
    fn test_rejection_keeps_method_unchanged() {
        let caller = l_caller(true);
        let (ctx, mut ssa) = setup(&caller, logging());
        let before = ssa.clone();

        assert!(!ClassInliningPass::new()
            .run_on_method(&mut ssa, &caller.reference, &ctx)
            .unwrap());
        assert_eq!(ssa, before);

        let rejected: Vec<_> = ctx.events.filter_kind(EventKind::SiteRejected).collect();
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].message.contains("passed as an argument"));
    }

    #[test]
    fn test_budget_rejects_site() {
        let caller = l_caller(false);
        let config = CompilerConfig::default().with_class_inlining(ClassInliningConfig {
            instruction_allowance: 1,
            log_rejections: true,
            ..ClassInliningConfig::default()
        });
        let (ctx, mut ssa) = setup(&caller, config);
        let before = ssa.clone();

        assert!(!ClassInliningPass::new()
            .run_on_method(&mut ssa, &caller.reference, &ctx)
            .unwrap());
        assert_eq!(ssa, before);
        let rejected = ctx.events.filter_kind(EventKind::SiteRejected).next().unwrap();
        assert!(rejected.message.contains("allowance of 1"));
    }

    #[test]
    fn test_rejections_are_silent_by_default() {
        let caller = l_caller(true);
        let (ctx, mut ssa) = setup(&caller, CompilerConfig::default());

        ClassInliningPass::new()
            .run_on_method(&mut ssa, &caller.reference, &ctx)
            .unwrap();
        assert!(!ctx.events.has(EventKind::SiteRejected));
    }

    #[test]
    fn test_skips_pinned_and_disabled() {
        let caller = l_caller(false);
        let pass = ClassInliningPass::new();

        let program = l_program();
        program.pin(ProgramItem::Method(caller.reference.clone()));
        let ctx = CompilerContext::new(Arc::new(program), CompilerConfig::default());
        assert!(!pass.should_run(&caller.reference, &ctx));

        let config =
            CompilerConfig::default().with_class_inlining(ClassInliningConfig::disabled());
        let ctx = CompilerContext::new(Arc::new(Program::new()), config);
        assert!(!pass.should_run(&caller.reference, &ctx));
    }

    #[test]
    fn test_storing_instance_into_own_field_rejected() {
        // l.next = l;
        let next = FieldRef::new(l_type(), "next", l_type());
        let code = with_instance(|c| {
            c.aload(0)
                .aload(0)
                .put_field(next)
                .aload(0)
                .invoke_virtual(get_x())
                .ireturn()
        });
        let program = l_program_with(&[("next", l_type())], Vec::new());
        assert_eq!(
            rejection_of(program, code, CompilerConfig::default()),
            SiteRejection::SelfCapture
        );
    }

    #[test]
    fn test_field_of_another_class_rejected() {
        let other = FieldRef::new(TypeRef::class("Other"), "y", TypeRef::int());
        let code = with_instance(|c| c.aload(0).get_field(other).ireturn());
        assert_eq!(
            rejection_of(l_program(), code, CompilerConfig::default()),
            SiteRejection::ForeignField
        );
    }

    #[test]
    fn test_used_returned_receiver_rejected() {
        // L self() { return this; }   ...   return l.self().getX();
        let (this, definition) = l_method(
            "self",
            l_type(),
            CodeBuilder::new(1, 1).aload(0).areturn().build(),
        );
        let code = with_instance(|c| {
            c.aload(0)
                .invoke_virtual(this)
                .invoke_virtual(get_x())
                .ireturn()
        });
        let program = l_program_with(&[], vec![definition]);
        assert_eq!(
            rejection_of(program, code, CompilerConfig::default()),
            SiteRejection::ReceiverReturned
        );
    }

    #[test]
    fn test_use_inside_try_range_rejected() {
        // try { return l.getX(); } catch (Throwable t) { return 0; }
        let code = with_instance(|c| {
            c.label(Label(0))
                .aload(0)
                .invoke_virtual(get_x())
                .ireturn()
                .label(Label(1))
                .label(Label(2))
                .pop()
                .iconst(0)
                .ireturn()
                .handler(Label(0), Label(1), Label(2), None)
        });
        assert_eq!(
            rejection_of(l_program(), code, CompilerConfig::default()),
            SiteRejection::TryRange
        );
    }

    #[test]
    fn test_call_without_exact_target_rejected() {
        let missing = MethodRef::new(l_type(), "missing", Proto::new(TypeRef::int(), vec![]));
        let code = with_instance(|c| c.aload(0).invoke_virtual(missing).ireturn());
        assert_eq!(
            rejection_of(l_program(), code, CompilerConfig::default()),
            SiteRejection::UnresolvedTarget
        );
    }

    #[test]
    fn test_direct_call_to_non_constructor_rejected() {
        let code = with_instance(|c| c.aload(0).invoke_special(get_x()).ireturn());
        assert_eq!(
            rejection_of(l_program(), code, CompilerConfig::default()),
            SiteRejection::DirectCall
        );
    }

    #[test]
    fn test_calls_left_after_last_round_rejected() {
        // int getY() { return getX(); }   ...   return l.getY();
        let (get_y, definition) = l_method(
            "getY",
            TypeRef::int(),
            CodeBuilder::new(1, 1)
                .aload(0)
                .invoke_virtual(get_x())
                .ireturn()
                .build(),
        );
        let code = || with_instance(|c| c.aload(0).invoke_virtual(get_y.clone()).ireturn());

        // Inlining getY exposes getX, which a single round cannot reach.
        let one_round = CompilerConfig::default().with_class_inlining(ClassInliningConfig {
            max_inlining_rounds: 1,
            ..ClassInliningConfig::default()
        });
        let program = l_program_with(&[], vec![definition.clone()]);
        assert_eq!(
            rejection_of(program, code(), one_round),
            SiteRejection::RoundLimit
        );

        // Two rounds are enough.
        let two_rounds = CompilerConfig::default().with_class_inlining(ClassInliningConfig {
            max_inlining_rounds: 2,
            ..ClassInliningConfig::default()
        });
        let ctx = CompilerContext::new(Arc::new(l_program_with(&[], vec![definition])), two_rounds);
        let caller = static_caller(code());
        let mut ssa = Lifter::for_definition(&caller).unwrap().lift().unwrap();
        assert!(ClassInliningPass::new()
            .run_on_method(&mut ssa, &caller.reference, &ctx)
            .unwrap());
        verify(&ssa).unwrap();
        assert!(!ssa
            .instructions()
            .any(|i| matches!(i.op(), SsaOp::NewInstance { .. } | SsaOp::Invoke { .. })));
    }
}
