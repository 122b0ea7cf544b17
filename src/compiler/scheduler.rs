//! Pass scheduler for orchestrating SSA pass execution.
//!
//! The `PassScheduler` runs the optimization passes in a 3-phase pipeline; each phase runs
//! to fixpoint with normalization after each structural change.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use rayon::prelude::*;

use crate::{
    analysis::verify,
    compiler::{context::CompilerContext, events::EventKind, pass::SsaPass},
    Error, Result,
};

/// Orchestrates SSA pass execution in a phased pipeline.
///
/// The scheduler runs passes in a 3-phase pipeline:
///
/// 1. **Rename**: passes that publish lens layers (bridge forwarding); afterwards every
///    function is brought up to the current layer
/// 2. **Inline**: class inlining + normalize
/// 3. **Normalize**: phi cleanup and block merging on their own
///
/// Each phase runs to fixpoint (until no more changes) before proceeding.
/// The entire pipeline is then repeated until global fixpoint or max iterations.
#[allow(clippy::struct_field_names)]
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Number of stable iterations before stopping.
    stable_iterations: usize,
    /// Maximum iterations for a single phase before moving on.
    max_phase_iterations: usize,
    /// Phase 1: Renaming (e.g., bridge forwarding).
    pub rename: Vec<Box<dyn SsaPass>>,
    /// Phase 2: Inlining (e.g., class inlining).
    pub inline: Vec<Box<dyn SsaPass>>,
    /// Normalization passes (phi cleanup, block merging).
    /// Run after each phase to clean up before the next.
    pub normalize: Vec<Box<dyn SsaPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(5, 1, 10)
    }
}

impl PassScheduler {
    /// Creates a new scheduler with the specified iteration limits.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline before stopping.
    /// * `stable_iterations` - Stop early if no changes for this many iterations.
    /// * `max_phase_iterations` - Maximum iterations for a single phase before moving on.
    #[must_use]
    pub fn new(
        max_iterations: usize,
        stable_iterations: usize,
        max_phase_iterations: usize,
    ) -> Self {
        Self {
            max_iterations,
            stable_iterations: stable_iterations.max(1),
            max_phase_iterations,
            rename: Vec::new(),
            inline: Vec::new(),
            normalize: Vec::new(),
        }
    }

    /// Total number of registered passes.
    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.rename.len() + self.inline.len() + self.normalize.len()
    }

    /// Runs normalization passes until no more changes occur.
    ///
    /// Returns `true` if any changes were made.
    fn normalize_to_fixpoint(
        ctx: &CompilerContext,
        passes: &mut [Box<dyn SsaPass>],
        max_phase_iterations: usize,
    ) -> Result<bool> {
        let mut any_changed = false;

        for _ in 0..max_phase_iterations {
            let changed = Self::run_passes_once(ctx, passes)?;

            if !changed {
                break;
            }

            any_changed = true;
        }

        Ok(any_changed)
    }

    /// Runs a phase to fixpoint: execute phase passes, then normalize until stable.
    ///
    /// Returns `true` if any changes were made during this phase.
    fn phase_to_fixpoint(
        ctx: &CompilerContext,
        phase_passes: &mut [Box<dyn SsaPass>],
        normalize_passes: &mut [Box<dyn SsaPass>],
        max_phase_iterations: usize,
    ) -> Result<bool> {
        if phase_passes.is_empty() {
            return Ok(false);
        }

        let mut phase_changed = false;

        for _ in 0..max_phase_iterations {
            let pass_changed = Self::run_passes_once(ctx, phase_passes)?;
            if !pass_changed {
                break;
            }

            phase_changed = true;

            // Normalization can expose new opportunities for the phase passes.
            if !normalize_passes.is_empty() {
                Self::normalize_to_fixpoint(ctx, normalize_passes, max_phase_iterations)?;
            }
        }

        Ok(phase_changed)
    }

    /// Brings every function up to the current lens layer.
    fn refresh_lenses(ctx: &CompilerContext) -> Result<bool> {
        let methods = ctx.all_methods();
        let results: Vec<Result<bool>> = methods
            .par_iter()
            .map(|method| {
                let Some(mut entry) = ctx.ssa_functions.get_mut(method) else {
                    return Ok(false);
                };
                let changed = ctx.refresh_lens(&mut entry)?;
                drop(entry);
                if changed {
                    ctx.processed_methods.insert(method.clone());
                }
                Ok(changed)
            })
            .collect();

        let mut any_changed = false;
        for result in results {
            any_changed |= result?;
        }
        Ok(any_changed)
    }

    /// Runs all passes once over all methods.
    ///
    /// Per-method passes are executed in parallel using rayon. Each method's SSA is taken
    /// out of the map while its pass runs, so no lock is held during the transformation.
    /// The first error aborts the run; every function is reinserted before it is reported.
    fn run_passes_once(ctx: &CompilerContext, passes: &mut [Box<dyn SsaPass>]) -> Result<bool> {
        let any_changed = AtomicBool::new(false);

        for pass in passes.iter_mut() {
            pass.initialize(ctx)?;
        }

        // Global passes first (sequential - they need to see all methods)
        for pass in passes.iter() {
            if !pass.is_global() {
                continue;
            }
            let started = Instant::now();
            ctx.events
                .record(EventKind::PassStarted)
                .pass(pass.name())
                .message(pass.description());
            let changed = pass.run_global(ctx)?;
            ctx.events
                .record(EventKind::PassCompleted)
                .pass(pass.name())
                .message(format!("changed={changed} in {:?}", started.elapsed()));
            if changed {
                any_changed.store(true, Ordering::Relaxed);
            }
        }

        let methods = ctx.all_methods();

        for pass in passes.iter() {
            if pass.is_global() {
                continue;
            }
            let started = Instant::now();
            ctx.events
                .record(EventKind::PassStarted)
                .pass(pass.name())
                .message(pass.description());

            let results: Vec<Result<bool>> = methods
                .par_iter()
                .map(|method| {
                    if !pass.should_run(method, ctx) {
                        return Ok(false);
                    }

                    // Remove SSA (brief lock, then released)
                    let Some(mut ssa) = ctx.take_ssa(method) else {
                        return Ok(false);
                    };

                    // Run the pass with no locks held
                    let result = pass.run_on_method(&mut ssa, method, ctx);
                    let result = match result {
                        Ok(true) if ctx.config.verify_after_passes => {
                            verify(&ssa).map(|()| true).map_err(|e| Error::SsaVerification {
                                method: method.clone(),
                                message: format!("after {}: {e}", pass.name()),
                            })
                        }
                        other => other,
                    };

                    // Reinsert SSA (brief lock, then released)
                    ctx.set_ssa(method.clone(), ssa);

                    if let Ok(true) = result {
                        ctx.processed_methods.insert(method.clone());
                    }
                    result
                })
                .collect();

            let mut pass_changed = false;
            for result in results {
                pass_changed |= result?;
            }
            ctx.events
                .record(EventKind::PassCompleted)
                .pass(pass.name())
                .message(format!("changed={pass_changed} in {:?}", started.elapsed()));
            if pass_changed {
                any_changed.store(true, Ordering::Relaxed);
            }
        }

        for pass in passes.iter_mut() {
            pass.finalize(ctx)?;
        }

        Ok(any_changed.load(Ordering::Relaxed))
    }

    /// Runs the complete pipeline.
    ///
    /// Executes a 3-phase pipeline where each phase runs to fixpoint:
    ///
    /// 1. **Rename**: lens producers, then every function is refreshed to the new names
    /// 2. **Inline**: class inlining + normalize
    /// 3. **Normalize**: cleanup on its own, so it runs even when nothing was inlined
    ///
    /// The entire pipeline repeats until no phase makes changes or max iterations.
    ///
    /// Returns the number of iterations completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error raised by any pass.
    pub fn run_pipeline(&mut self, ctx: &CompilerContext) -> Result<usize> {
        let mut stable_count = 0;
        let mut iterations = 0;
        let max_phase = self.max_phase_iterations;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            let mut iteration_changed = false;

            // Phase 1: Rename
            if Self::phase_to_fixpoint(ctx, &mut self.rename, &mut [], max_phase)? {
                iteration_changed = true;
            }
            if Self::refresh_lenses(ctx)? {
                iteration_changed = true;
            }

            // Phase 2: Inline
            if Self::phase_to_fixpoint(ctx, &mut self.inline, &mut self.normalize, max_phase)? {
                iteration_changed = true;
            }

            // Phase 3: Normalize
            if Self::normalize_to_fixpoint(ctx, &mut self.normalize, max_phase)? {
                iteration_changed = true;
            }

            // Check for global fixpoint
            if iteration_changed {
                stable_count = 0;
            } else {
                stable_count += 1;
                if stable_count >= self.stable_iterations {
                    break;
                }
            }
        }

        Ok(iterations)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use crate::{
        analysis::{Lifter, SsaFunction},
        compiler::{
            context::CompilerContext, pass::SsaPass, CompilerConfig, EventKind, PassScheduler,
        },
        metadata::{MethodRef, Program},
        test::l_program,
        Error, Result,
    };

    /// Reports a change on its first `changes` runs per method.
    struct TestPass {
        name: &'static str,
        changes: usize,
        runs: AtomicUsize,
    }

    impl TestPass {
        fn new(name: &'static str, changes: usize) -> Self {
            Self {
                name,
                changes,
                runs: AtomicUsize::new(0),
            }
        }
    }

    impl SsaPass for TestPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn run_on_method(
            &self,
            _ssa: &mut SsaFunction,
            method: &MethodRef,
            ctx: &CompilerContext,
        ) -> Result<bool> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run < self.changes {
                ctx.events
                    .record(EventKind::Info)
                    .method(method)
                    .message("test");
                return Ok(true);
            }
            Ok(false)
        }
    }

    struct FailingPass;

    impl SsaPass for FailingPass {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run_on_method(
            &self,
            _ssa: &mut SsaFunction,
            method: &MethodRef,
            _ctx: &CompilerContext,
        ) -> Result<bool> {
            Err(Error::NotFound(method.to_string()))
        }
    }

    fn lifted_context() -> CompilerContext {
        let program = Arc::new(l_program());
        let ctx = CompilerContext::new(program.clone(), CompilerConfig::default());
        for def in program.methods_with_code() {
            let ssa = Lifter::for_definition(&def).unwrap().lift().unwrap();
            ctx.set_ssa(def.reference.clone(), ssa);
        }
        ctx
    }

    #[test]
    fn test_scheduler_iteration_limits() {
        let scheduler = PassScheduler::new(10, 3, 5);
        assert_eq!(scheduler.max_iterations, 10);
        assert_eq!(scheduler.stable_iterations, 3);
        assert_eq!(scheduler.max_phase_iterations, 5);
    }

    #[test]
    fn test_default_scheduler() {
        let scheduler = PassScheduler::default();
        assert_eq!(scheduler.max_iterations, 5);
        assert_eq!(scheduler.stable_iterations, 1);
        assert_eq!(scheduler.max_phase_iterations, 10);
        assert_eq!(scheduler.pass_count(), 0);
    }

    #[test]
    fn test_empty_pipeline_stops_after_one_iteration() {
        let ctx = CompilerContext::new(Arc::new(Program::new()), CompilerConfig::default());
        let mut scheduler = PassScheduler::default();
        assert_eq!(scheduler.run_pipeline(&ctx).unwrap(), 1);
    }

    #[test]
    fn test_changes_mark_methods_processed() {
        let ctx = lifted_context();
        let methods = ctx.method_count();
        let mut scheduler = PassScheduler::new(5, 1, 5);
        scheduler.inline.push(Box::new(TestPass::new("inline", methods)));

        let iterations = scheduler.run_pipeline(&ctx).unwrap();
        assert_eq!(iterations, 2);
        assert!(!ctx.processed_methods.is_empty());
        assert!(ctx.events.has(EventKind::PassStarted));
        assert!(ctx.events.has(EventKind::PassCompleted));
    }

    #[test]
    fn test_error_aborts_and_keeps_functions() {
        let ctx = lifted_context();
        let methods = ctx.method_count();
        let mut scheduler = PassScheduler::default();
        scheduler.normalize.push(Box::new(FailingPass));

        assert!(matches!(
            scheduler.run_pipeline(&ctx),
            Err(Error::NotFound(_))
        ));
        assert_eq!(ctx.method_count(), methods);
    }
}
