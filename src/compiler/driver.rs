//! The top-level compilation driver.
//!
//! [`Compiler`] lifts every method with code, runs the configured pass pipeline over the
//! result and hands back the optimized functions together with the event log.

use std::{collections::HashMap, sync::Arc, time::Duration};

use rayon::prelude::*;

use crate::{
    analysis::{verify, Lifter, SsaFunction},
    compiler::{
        passes::{BlockMergingPass, BridgeForwardingPass, ClassInliningPass, PhiCleanupPass},
        CompilerConfig, CompilerContext, DerivedStats, EventKind, EventLog, PassScheduler,
    },
    lens::{LensChain, LensId},
    metadata::{AppView, MethodDefinition, MethodRef, Program},
    Error, Result,
};

/// Lifts and optimizes a set of methods.
///
/// # Examples
///
/// ```rust,ignore
/// use cfopt::prelude::*;
///
/// let result = Compiler::new(CompilerConfig::default()).compile_program(program)?;
/// println!("{}", result.summary());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    /// Creates a compiler with the given configuration.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// The configuration this compiler runs with.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Builds the scheduler with every pass the configuration enables.
    #[must_use]
    pub fn scheduler(&self) -> PassScheduler {
        let mut scheduler = PassScheduler::new(
            self.config.max_iterations,
            1,
            self.config.max_phase_iterations,
        );

        if self.config.enable_bridge_forwarding {
            scheduler.rename.push(Box::new(BridgeForwardingPass::new()));
        }
        if self.config.class_inlining.enabled {
            scheduler.inline.push(Box::new(ClassInliningPass::new()));
        }
        scheduler.normalize.push(Box::new(PhiCleanupPass::new()));
        if self.config.enable_block_merging {
            scheduler.normalize.push(Box::new(BlockMergingPass::new()));
        }
        scheduler
    }

    /// Compiles every method of `program` that has code.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: a malformed method body, a failed verification or
    /// a violated inlining postcondition.
    pub fn compile_program(&self, program: Arc<Program>) -> Result<CompilationResult> {
        let methods = program.methods_with_code();
        self.compile(program, &methods)
    }

    /// Compiles `methods` against the program view `app`.
    ///
    /// Methods without code are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: a malformed method body, a failed verification or
    /// a violated inlining postcondition.
    pub fn compile(
        &self,
        app: Arc<dyn AppView>,
        methods: &[Arc<MethodDefinition>],
    ) -> Result<CompilationResult> {
        let ctx = CompilerContext::new(app, self.config.clone());

        let lifted = methods
            .par_iter()
            .filter(|def| def.code.is_some())
            .map(|def| Self::lift(&ctx, def).map(|ssa| (def.reference.clone(), ssa)))
            .collect::<Result<Vec<_>>>()?;
        for (method, ssa) in lifted {
            ctx.events
                .record(EventKind::MethodLifted)
                .method(&method)
                .message(format!(
                    "{} blocks, {} instructions",
                    ssa.block_count(),
                    ssa.instruction_count()
                ));
            ctx.set_ssa(method, ssa);
        }

        let iterations = self.scheduler().run_pipeline(&ctx)?;
        Ok(CompilationResult::from_context(ctx, iterations))
    }

    fn lift(ctx: &CompilerContext, def: &MethodDefinition) -> Result<SsaFunction> {
        let Some(code) = def.code.as_ref() else {
            return Err(Error::NotFound(format!("{} has no code", def.reference)));
        };
        let ssa = Lifter::for_definition(def)?
            .with_config(ctx.config.lift)
            .with_lens(ctx.lens_view(code.lens)?)
            .lift()?;
        if ctx.config.verify_after_passes && !ctx.config.lift.verify {
            verify(&ssa).map_err(|e| Error::SsaVerification {
                method: def.reference.clone(),
                message: e.to_string(),
            })?;
        }
        Ok(ssa)
    }
}

/// The outcome of a compilation run.
#[derive(Debug)]
pub struct CompilationResult {
    /// The optimized function of every compiled method.
    pub functions: HashMap<MethodRef, SsaFunction>,
    /// The lens chain built during the run.
    pub lenses: LensChain,
    /// The lens every function is expressed against.
    pub current_lens: Option<LensId>,
    /// Everything the passes recorded.
    pub events: EventLog,
    /// Aggregate counters.
    pub stats: DerivedStats,
}

impl CompilationResult {
    fn from_context(ctx: CompilerContext, iterations: usize) -> Self {
        let current_lens = ctx.current_lens();
        let elapsed: Duration = ctx.elapsed();
        let stats = DerivedStats::from_log(&ctx.events)
            .with_time(elapsed)
            .with_iterations(iterations);
        let CompilerContext {
            ssa_functions,
            lenses,
            events,
            ..
        } = ctx;

        Self {
            functions: ssa_functions.into_iter().collect(),
            lenses,
            current_lens,
            events,
            stats,
        }
    }

    /// The optimized function of `method`.
    #[must_use]
    pub fn function(&self, method: &MethodRef) -> Option<&SsaFunction> {
        self.functions.get(method)
    }

    /// Methods changed by at least one transformation, in a stable order.
    #[must_use]
    pub fn changed_methods(&self) -> Vec<MethodRef> {
        let mut methods: Vec<MethodRef> = self
            .events
            .transformations()
            .filter_map(|event| event.method.clone())
            .collect();
        methods.sort_by_key(ToString::to_string);
        methods.dedup();
        methods
    }

    /// A one-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        self.stats.summary()
    }
}

/// Passes registered by default, in scheduling order.
#[must_use]
pub fn default_pass_names(config: &CompilerConfig) -> Vec<&'static str> {
    let scheduler = Compiler::new(config.clone()).scheduler();
    scheduler
        .rename
        .iter()
        .chain(&scheduler.inline)
        .chain(&scheduler.normalize)
        .map(|pass| pass.name())
        .collect()
}
