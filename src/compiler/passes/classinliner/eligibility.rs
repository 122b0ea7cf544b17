//! Eligibility of classes and allocation sites for class inlining.
//!
//! Class-level checks depend only on the class shape and are cached per class in
//! [`crate::compiler::CompilerContext::class_verdict`]. Site-level checks walk the unique
//! users of one allocation and either collect the calls that must be force-inlined or name
//! the first use that disqualifies the site.

use std::fmt;

use strum::{Display, EnumCount, EnumIter};

use crate::{
    analysis::{InsnId, SsaFunction, SsaOp, ValueId, ValueUser},
    compiler::CompilerContext,
    metadata::{AppView, ClassDefinition, InvokeKind, MethodRef, ProgramItem, TypeRef},
    Result,
};

/// Why a class can never be inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum ClassRejection {
    /// The program does not define the class
    #[strum(serialize = "class is not defined")]
    Undefined,
    /// Abstract classes are never instantiated exactly
    #[strum(serialize = "class is abstract")]
    Abstract,
    /// Interfaces are never instantiated
    #[strum(serialize = "class is an interface")]
    Interface,
    /// Library classes cannot be changed
    #[strum(serialize = "class is a library class")]
    Library,
    /// The embedder pinned the class
    #[strum(serialize = "class is pinned")]
    Pinned,
    /// Inherited state and constructors are not modelled
    #[strum(serialize = "superclass is not the root type")]
    SuperclassNotRoot,
    /// Removing the allocation would skip finalization
    #[strum(serialize = "class declares a finalizer")]
    Finalizer,
    /// Removing the allocation would skip a class initializer
    #[strum(serialize = "instantiation may run a static initializer")]
    StaticInitializer,
}

/// Cached per-class inlining verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassVerdict {
    /// Instances of the class may be inlined, subject to per-site checks.
    Eligible,
    /// Instances of the class are never inlined.
    Ineligible(ClassRejection),
}

impl ClassVerdict {
    /// Computes the verdict for `ty`.
    pub fn compute(app: &dyn AppView, ty: &TypeRef) -> Self {
        match class_rejection(app, ty) {
            Some(reason) => ClassVerdict::Ineligible(reason),
            None => ClassVerdict::Eligible,
        }
    }

    /// Returns `true` for [`ClassVerdict::Eligible`].
    #[must_use]
    pub fn is_eligible(self) -> bool {
        matches!(self, ClassVerdict::Eligible)
    }
}

impl fmt::Display for ClassVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassVerdict::Eligible => f.write_str("eligible"),
            ClassVerdict::Ineligible(reason) => write!(f, "ineligible ({reason})"),
        }
    }
}

fn class_rejection(app: &dyn AppView, ty: &TypeRef) -> Option<ClassRejection> {
    let Some(class) = app.definition_for(ty) else {
        return Some(ClassRejection::Undefined);
    };
    if class.is_interface() {
        return Some(ClassRejection::Interface);
    }
    if class.is_abstract() {
        return Some(ClassRejection::Abstract);
    }
    if class.is_library() {
        return Some(ClassRejection::Library);
    }
    if app.is_pinned(&ProgramItem::Type(ty.clone())) {
        return Some(ClassRejection::Pinned);
    }
    if class.superclass.as_ref() != Some(&app.root_type()) {
        return Some(ClassRejection::SuperclassNotRoot);
    }
    if class.has_finalizer() {
        return Some(ClassRejection::Finalizer);
    }
    if app.can_trigger_static_initializer(ty) {
        return Some(ClassRejection::StaticInitializer);
    }
    None
}

/// Why one allocation site is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteRejection {
    /// The class itself is ineligible
    Class(ClassRejection),
    /// The instance flows into a phi
    PhiUse,
    /// A field access names a field not declared on the allocated class
    ForeignField,
    /// The instance is stored into a field
    SelfCapture,
    /// The instance is passed as an argument
    ArgumentEscape,
    /// A direct call that is not a constructor of the allocated class
    DirectCall,
    /// A virtual call without a single exact target
    UnresolvedTarget,
    /// A call target that leaks its receiver or cannot be force-inlined
    UnsafeTarget(MethodRef),
    /// A call target returns its receiver and the result is used
    ReceiverReturned,
    /// A call or field write inside a try range
    TryRange,
    /// Any other use of the instance, named by its mnemonic
    UnsupportedUse(&'static str),
    /// The estimated cost of all force-inlined calls exceeds the allowance
    InstructionBudget(usize),
    /// Calls on the instance remain after the last inlining round
    RoundLimit,
    /// The force inliner declined a call
    InliningFailed(MethodRef),
}

impl fmt::Display for SiteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteRejection::Class(reason) => write!(f, "{reason}"),
            SiteRejection::PhiUse => f.write_str("instance flows into a phi"),
            SiteRejection::ForeignField => {
                f.write_str("field is not an instance field of the allocated class")
            }
            SiteRejection::SelfCapture => f.write_str("instance is stored into a field"),
            SiteRejection::ArgumentEscape => f.write_str("instance is passed as an argument"),
            SiteRejection::DirectCall => {
                f.write_str("direct call is not a constructor of the allocated class")
            }
            SiteRejection::UnresolvedTarget => f.write_str("virtual call has no exact target"),
            SiteRejection::UnsafeTarget(target) => {
                write!(f, "call target {target} is not receiver-safe")
            }
            SiteRejection::ReceiverReturned => f.write_str("returned receiver is used"),
            SiteRejection::TryRange => f.write_str("use inside a try range"),
            SiteRejection::UnsupportedUse(mnemonic) => write!(f, "unsupported use: {mnemonic}"),
            SiteRejection::InstructionBudget(allowance) => {
                write!(f, "inlining cost exceeds the allowance of {allowance}")
            }
            SiteRejection::RoundLimit => f.write_str("inlining did not converge"),
            SiteRejection::InliningFailed(target) => write!(f, "could not inline {target}"),
        }
    }
}

/// An allocation under consideration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationSite {
    /// The `NewInstance` instruction.
    pub insn: InsnId,
    /// The allocated instance.
    pub value: ValueId,
    /// The allocated class.
    pub ty: TypeRef,
    /// Stream offset of the allocation, for diagnostics.
    pub offset: usize,
}

impl AllocationSite {
    /// Every allocation in `ssa`, in block order.
    pub fn collect(ssa: &SsaFunction) -> Vec<AllocationSite> {
        ssa.instructions()
            .filter_map(|insn| match (insn.op(), insn.dest()) {
                (SsaOp::NewInstance { ty }, Some(value)) => Some(AllocationSite {
                    insn: insn.id(),
                    value,
                    ty: ty.clone(),
                    offset: insn.position().offset,
                }),
                _ => None,
            })
            .collect()
    }
}

/// A call on the instance that has to be force-inlined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The invoke instruction.
    pub call: InsnId,
    /// The exact method the call reaches.
    pub target: MethodRef,
    /// Estimated instruction count of the target.
    pub cost: usize,
}

/// Outcome of analyzing the current users of an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteAnalysis {
    /// Every use is acceptable; these calls still need inlining.
    Eligible(Vec<Candidate>),
    /// Some use disqualifies the site.
    Rejected(SiteRejection),
}

impl SiteAnalysis {
    /// Total estimated cost of the candidates.
    #[must_use]
    pub fn cost(&self) -> usize {
        match self {
            SiteAnalysis::Eligible(candidates) => candidates.iter().map(|c| c.cost).sum(),
            SiteAnalysis::Rejected(_) => 0,
        }
    }
}

/// Checks every unique user of the allocated instance.
///
/// # Errors
///
/// Returns an error only if a callee body needed for a summary cannot be lifted.
pub fn analyze_site(
    ssa: &SsaFunction,
    site: &AllocationSite,
    class: &ClassDefinition,
    ctx: &CompilerContext,
) -> Result<SiteAnalysis> {
    let instance = site.value;
    let root = ctx.app.root_type();
    let mut candidates = Vec::new();

    for user in ssa.unique_users(instance) {
        let ValueUser::Instruction(insn) = user else {
            return Ok(SiteAnalysis::Rejected(SiteRejection::PhiUse));
        };
        let instruction = ssa.instruction(insn);
        let in_try = !ssa.block(instruction.block()).handlers().is_empty();

        let rejection = match instruction.op() {
            SsaOp::InstanceGet { field, .. } => {
                (!declares_instance_field(class, field)).then_some(SiteRejection::ForeignField)
            }
            SsaOp::InstancePut { field, object, value } => {
                if *value == instance {
                    Some(SiteRejection::SelfCapture)
                } else if *object != instance || !declares_instance_field(class, field) {
                    Some(SiteRejection::ForeignField)
                } else if in_try {
                    Some(SiteRejection::TryRange)
                } else {
                    None
                }
            }
            SsaOp::Invoke { kind, method, args } => {
                if !kind.has_receiver()
                    || args.first() != Some(&instance)
                    || args[1..].contains(&instance)
                {
                    Some(SiteRejection::ArgumentEscape)
                } else if in_try {
                    Some(SiteRejection::TryRange)
                } else if *kind == InvokeKind::Special {
                    if method.is_constructor() && method.holder == root {
                        // Stripped together with the allocation.
                        None
                    } else if method.is_constructor() && method.holder == site.ty {
                        match receiver_safe_target(ctx, method)? {
                            Ok(cost) => {
                                candidates.push(Candidate {
                                    call: insn,
                                    target: method.clone(),
                                    cost,
                                });
                                None
                            }
                            Err(rejection) => Some(rejection),
                        }
                    } else {
                        Some(SiteRejection::DirectCall)
                    }
                } else {
                    match ctx
                        .app
                        .resolve_exact_virtual(&site.ty, &method.name, &method.proto)
                    {
                        None => Some(SiteRejection::UnresolvedTarget),
                        Some(target) => {
                            let target = target.reference.clone();
                            match ctx.summary(&target)? {
                                Some(summary) if summary.is_receiver_safe() => {
                                    let result_used = instruction
                                        .dest()
                                        .is_some_and(|dest| !ssa.value(dest).is_unused());
                                    if summary.returns_receiver && result_used {
                                        Some(SiteRejection::ReceiverReturned)
                                    } else {
                                        candidates.push(Candidate {
                                            call: insn,
                                            target,
                                            cost: summary.instruction_count,
                                        });
                                        None
                                    }
                                }
                                _ => Some(SiteRejection::UnsafeTarget(target)),
                            }
                        }
                    }
                }
            }
            other => Some(SiteRejection::UnsupportedUse(other.mnemonic())),
        };

        if let Some(rejection) = rejection {
            return Ok(SiteAnalysis::Rejected(rejection));
        }
    }

    Ok(SiteAnalysis::Eligible(candidates))
}

fn declares_instance_field(class: &ClassDefinition, field: &crate::metadata::FieldRef) -> bool {
    field.holder == class.ty && class.lookup_field(field).is_some_and(|f| !f.is_static())
}

/// The cost of `method` if it is force-inlinable and does not leak its receiver.
fn receiver_safe_target(
    ctx: &CompilerContext,
    method: &MethodRef,
) -> Result<std::result::Result<usize, SiteRejection>> {
    Ok(match ctx.summary(method)? {
        Some(summary) if summary.is_receiver_safe() => Ok(summary.instruction_count),
        _ => Err(SiteRejection::UnsafeTarget(method.clone())),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::Lifter,
        compiler::CompilerConfig,
        metadata::{ClassBuilder, ClassFlags, MethodDefinition, MethodFlags, Program, Proto},
        test::{l_caller, l_program, l_type},
    };

    fn context(program: Program) -> CompilerContext {
        CompilerContext::new(Arc::new(program), CompilerConfig::default())
    }

    fn analyze(ctx: &CompilerContext, caller: &MethodDefinition) -> SiteAnalysis {
        let ssa = Lifter::for_definition(caller).unwrap().lift().unwrap();
        let sites = AllocationSite::collect(&ssa);
        assert_eq!(sites.len(), 1);
        let class = ctx.app.definition_for(&sites[0].ty).unwrap();
        analyze_site(&ssa, &sites[0], &class, ctx).unwrap()
    }

    #[test]
    fn test_class_rejections() {
        let program = Program::new();
        let abstract_ty = TypeRef::class("Abs");
        let derived = TypeRef::class("Derived");
        let library = TypeRef::class("Lib");
        program.add_class(
            ClassBuilder::new(abstract_ty.clone())
                .flags(ClassFlags::ABSTRACT)
                .build(),
        );
        program.add_class(
            ClassBuilder::new(derived.clone())
                .superclass(abstract_ty.clone())
                .build(),
        );
        program.add_class(
            ClassBuilder::new(library.clone())
                .flags(ClassFlags::LIBRARY)
                .build(),
        );

        let verdict = |ty: &TypeRef| ClassVerdict::compute(&program, ty);
        assert_eq!(
            verdict(&abstract_ty),
            ClassVerdict::Ineligible(ClassRejection::Abstract)
        );
        assert_eq!(
            verdict(&derived),
            ClassVerdict::Ineligible(ClassRejection::SuperclassNotRoot)
        );
        assert_eq!(
            verdict(&library),
            ClassVerdict::Ineligible(ClassRejection::Library)
        );
        assert_eq!(
            verdict(&TypeRef::class("Missing")),
            ClassVerdict::Ineligible(ClassRejection::Undefined)
        );
    }

    #[test]
    fn test_finalizer_and_initializer() {
        let program = Program::new();
        let fin = TypeRef::class("Fin");
        let init = TypeRef::class("Init");
        let void = Proto::new(TypeRef::void(), vec![]);
        program.add_class(
            ClassBuilder::new(fin.clone())
                .method(MethodDefinition::new(
                    MethodRef::new(fin.clone(), "finalize", void.clone()),
                    MethodFlags::PROTECTED,
                    None,
                ))
                .build(),
        );
        program.add_class(
            ClassBuilder::new(init.clone())
                .method(MethodDefinition::new(
                    MethodRef::new(init.clone(), "<clinit>", void),
                    MethodFlags::STATIC,
                    None,
                ))
                .build(),
        );
        assert_eq!(
            ClassVerdict::compute(&program, &fin),
            ClassVerdict::Ineligible(ClassRejection::Finalizer)
        );
        assert_eq!(
            ClassVerdict::compute(&program, &init),
            ClassVerdict::Ineligible(ClassRejection::StaticInitializer)
        );
    }

    #[test]
    fn test_eligible_site_collects_constructor_and_getter() {
        let program = l_program();
        let caller = l_caller(false);
        let ctx = context(program);
        let SiteAnalysis::Eligible(candidates) = analyze(&ctx, &caller) else {
            panic!("site should be eligible");
        };
        let names: Vec<&str> = candidates.iter().map(|c| &*c.target.name).collect();
        assert_eq!(names, vec!["<init>", "getX"]);
        assert!(SiteAnalysis::Eligible(candidates).cost() > 0);
    }

    #[test]
    fn test_argument_escape_rejected() {
        let program = l_program();
        let caller = l_caller(true);
        let ctx = context(program);
        assert_eq!(
            analyze(&ctx, &caller),
            SiteAnalysis::Rejected(SiteRejection::ArgumentEscape)
        );
    }

    #[test]
    fn test_pinned_class_rejected() {
        let program = l_program();
        program.pin(ProgramItem::Type(l_type()));
        assert_eq!(
            ClassVerdict::compute(&program, &l_type()),
            ClassVerdict::Ineligible(ClassRejection::Pinned)
        );
    }

    #[test]
    fn test_rejection_display() {
        assert_eq!(
            SiteRejection::Class(ClassRejection::Finalizer).to_string(),
            "class declares a finalizer"
        );
        assert_eq!(
            SiteRejection::InstructionBudget(65).to_string(),
            "inlining cost exceeds the allowance of 65"
        );
        assert_eq!(
            ClassVerdict::Ineligible(ClassRejection::Library).to_string(),
            "ineligible (class is a library class)"
        );
    }
}
