//! Compiler context for interprocedural optimization.
//!
//! The [`CompilerContext`] holds all state shared by the passes of one compilation run:
//! the lifted functions, the lens chain and which layer is current, the per-class
//! inlining verdicts, receiver summaries and the event log.
//!
//! All collection fields use thread-safe types (`DashMap`, `DashSet`) so that per-method
//! passes can run on many methods at once.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use dashmap::{DashMap, DashSet};

use crate::{
    analysis::{Lifter, SsaFunction, SsaOp},
    compiler::{
        events::{EventKind, EventLog},
        passes::ClassVerdict,
        summary::MethodSummary,
        CompilerConfig,
    },
    lens::{LensChain, LensId, LensView},
    metadata::{AppView, MethodRef, TypeRef},
    Result,
};

/// Shared state of one compilation run.
pub struct CompilerContext {
    /// The program being optimized.
    pub app: Arc<dyn AppView>,

    /// SSA form of every method being optimized, keyed by its definition.
    pub ssa_functions: DashMap<MethodRef, SsaFunction>,

    /// Every lens layer created so far.
    pub lenses: LensChain,

    /// Layer the IR is being brought up to.
    current_lens: RwLock<Option<LensId>>,

    /// Class inlining verdicts, computed at most once per class.
    pub class_verdicts: DashMap<TypeRef, ClassVerdict>,

    /// Receiver summaries of methods called on candidate allocations.
    pub summaries: DashMap<MethodRef, MethodSummary>,

    /// Callee bodies lifted against the current lens.
    callee_bodies: DashMap<MethodRef, Arc<SsaFunction>>,

    /// Methods changed by at least one pass.
    pub processed_methods: DashSet<MethodRef>,

    /// Accumulated events from all passes.
    pub events: EventLog,

    /// Configuration of the run.
    pub config: CompilerConfig,

    /// When the run started.
    start_time: Instant,
}

impl CompilerContext {
    /// Creates an empty context for `app`.
    #[must_use]
    pub fn new(app: Arc<dyn AppView>, config: CompilerConfig) -> Self {
        Self {
            app,
            ssa_functions: DashMap::new(),
            lenses: LensChain::new(),
            current_lens: RwLock::new(None),
            class_verdicts: DashMap::new(),
            summaries: DashMap::new(),
            callee_bodies: DashMap::new(),
            processed_methods: DashSet::new(),
            events: EventLog::new(),
            config,
            start_time: Instant::now(),
        }
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// The newest lens layer, `None` while no pass has renamed anything.
    #[must_use]
    pub fn current_lens(&self) -> Option<LensId> {
        *self
            .current_lens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `lens` current.
    ///
    /// Callee bodies and summaries were computed against the previous names and are
    /// dropped.
    pub fn set_current_lens(&self, lens: Option<LensId>) {
        *self
            .current_lens
            .write()
            .unwrap_or_else(PoisonError::into_inner) = lens;
        self.callee_bodies.clear();
        self.summaries.clear();
    }

    /// A view translating references written against `from` into the current names.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidLens`] if `from` is not an ancestor of the current
    /// layer.
    pub fn lens_view(&self, from: Option<LensId>) -> Result<LensView<'_>> {
        self.lenses.view(from, self.current_lens())
    }

    /// The class inlining verdict for `ty`, computing it on first use.
    ///
    /// Concurrent first uses race on the map entry; only one computation runs.
    pub fn class_verdict(&self, ty: &TypeRef) -> ClassVerdict {
        if let Some(verdict) = self.class_verdicts.get(ty) {
            return verdict.clone();
        }
        self.class_verdicts
            .entry(ty.clone())
            .or_insert_with(|| {
                let verdict = ClassVerdict::compute(self.app.as_ref(), ty);
                self.events
                    .record(EventKind::ClassVerdictComputed)
                    .message(format!("{ty}: {verdict}"));
                verdict
            })
            .clone()
    }

    /// The body of `method` lifted against the current lens.
    ///
    /// Returns `None` if the program does not define the method or it has no code.
    ///
    /// # Errors
    ///
    /// Returns the lifter's error if the body is malformed.
    pub fn callee_body(&self, method: &MethodRef) -> Result<Option<Arc<SsaFunction>>> {
        if let Some(body) = self.callee_bodies.get(method) {
            return Ok(Some(body.clone()));
        }
        let Some(definition) = self.app.method_definition(method) else {
            return Ok(None);
        };
        let Some(code) = definition.code.as_ref() else {
            return Ok(None);
        };

        let body = Lifter::new(&definition.reference, definition.is_static(), code)
            .with_config(self.config.lift)
            .with_lens(self.lens_view(code.lens)?)
            .lift()?;
        let body = Arc::new(body);
        self.callee_bodies.insert(method.clone(), body.clone());
        Ok(Some(body))
    }

    /// The receiver summary of `method`.
    ///
    /// Returns `None` if the method has no body to summarize.
    ///
    /// # Errors
    ///
    /// Returns the lifter's error if a body involved is malformed.
    pub fn summary(&self, method: &MethodRef) -> Result<Option<MethodSummary>> {
        self.summary_with_stack(method, &mut Vec::new())
    }

    fn summary_with_stack(
        &self,
        method: &MethodRef,
        stack: &mut Vec<MethodRef>,
    ) -> Result<Option<MethodSummary>> {
        if let Some(summary) = self.summaries.get(method) {
            return Ok(Some(summary.clone()));
        }
        if stack.contains(method) {
            return Ok(None);
        }
        let Some(definition) = self.app.method_definition(method) else {
            return Ok(None);
        };
        let Some(body) = self.callee_body(method)? else {
            return Ok(None);
        };

        stack.push(method.clone());
        let root = self.app.root_type();
        let mut failure = None;
        let summary = MethodSummary::analyze(&definition, &body, &root, |callee| {
            if failure.is_some() {
                return None;
            }
            match self.summary_with_stack(callee, stack) {
                Ok(summary) => summary.map(|s| s.receiver_use()),
                Err(e) => {
                    failure = Some(e);
                    None
                }
            }
        });
        stack.pop();
        if let Some(e) = failure {
            return Err(e);
        }

        self.summaries.insert(method.clone(), summary.clone());
        Ok(Some(summary))
    }

    /// Rewrites every method, field and type reference of `ssa` into the current names.
    ///
    /// Returns `true` if any instruction changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidLens`] if the function's lens is not an ancestor of
    /// the current layer.
    pub fn refresh_lens(&self, ssa: &mut SsaFunction) -> Result<bool> {
        let current = self.current_lens();
        if ssa.lens() == current {
            return Ok(false);
        }
        let view = self.lens_view(ssa.lens())?;
        let context = ssa.method().clone();
        let rewrites: Vec<_> = ssa
            .instructions()
            .filter_map(|insn| remap_references(insn.op(), &view, &context).map(|op| (insn.id(), op)))
            .collect();

        let changed = !rewrites.is_empty();
        for (insn, op) in rewrites {
            ssa.replace_op(insn, op);
        }
        ssa.set_lens(current);
        Ok(changed)
    }

    /// Runs `f` with read access to the SSA of `method`.
    pub fn with_ssa<R, F>(&self, method: &MethodRef, f: F) -> Option<R>
    where
        F: FnOnce(&SsaFunction) -> R,
    {
        self.ssa_functions.get(method).map(|ssa| f(&ssa))
    }

    /// Stores the SSA of `method`.
    pub fn set_ssa(&self, method: MethodRef, ssa: SsaFunction) {
        self.ssa_functions.insert(method, ssa);
    }

    /// Removes and returns the SSA of `method`.
    pub fn take_ssa(&self, method: &MethodRef) -> Option<SsaFunction> {
        self.ssa_functions.remove(method).map(|(_, ssa)| ssa)
    }

    /// Every method with SSA, in a stable order.
    #[must_use]
    pub fn all_methods(&self) -> Vec<MethodRef> {
        let mut methods: Vec<MethodRef> = self
            .ssa_functions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        methods.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        methods
    }

    /// Number of methods with SSA.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.ssa_functions.len()
    }
}

/// `op` with its references mapped through `view`, or `None` if nothing changes.
fn remap_references(op: &SsaOp, view: &LensView<'_>, context: &MethodRef) -> Option<SsaOp> {
    let mapped = match op {
        SsaOp::Invoke { kind, method, args } => {
            let lookup = view.lookup_method(method, context, *kind);
            SsaOp::Invoke {
                kind: lookup.kind,
                method: lookup.reference,
                args: args.clone(),
            }
        }
        SsaOp::InstanceGet { field, object } => SsaOp::InstanceGet {
            field: view.lookup_field(field),
            object: *object,
        },
        SsaOp::InstancePut {
            field,
            object,
            value,
        } => SsaOp::InstancePut {
            field: view.lookup_field(field),
            object: *object,
            value: *value,
        },
        SsaOp::StaticGet { field } => SsaOp::StaticGet {
            field: view.lookup_field(field),
        },
        SsaOp::StaticPut { field, value } => SsaOp::StaticPut {
            field: view.lookup_field(field),
            value: *value,
        },
        SsaOp::NewInstance { ty } => SsaOp::NewInstance {
            ty: view.lookup_type(ty),
        },
        SsaOp::NewArray { ty, size } => SsaOp::NewArray {
            ty: view.lookup_type(ty),
            size: *size,
        },
        SsaOp::MultiNewArray { ty, dims } => SsaOp::MultiNewArray {
            ty: view.lookup_type(ty),
            dims: dims.clone(),
        },
        SsaOp::CheckCast { ty, object } => SsaOp::CheckCast {
            ty: view.lookup_type(ty),
            object: *object,
        },
        SsaOp::InstanceOf { ty, object } => SsaOp::InstanceOf {
            ty: view.lookup_type(ty),
            object: *object,
        },
        SsaOp::MoveException { guard: Some(guard) } => SsaOp::MoveException {
            guard: Some(view.lookup_type(guard)),
        },
        _ => return None,
    };
    (mapped != *op).then_some(mapped)
}
