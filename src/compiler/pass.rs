//! The pass trait implemented by every SSA transformation.

use crate::{analysis::SsaFunction, compiler::CompilerContext, metadata::MethodRef, Result};

/// A transformation that operates on SSA form.
///
/// All passes must be thread-safe (Send + Sync): per-method passes run on many methods at
/// once. A pass receives mutable access to one method's SSA and shared access to the
/// [`CompilerContext`].
///
/// # Scheduling
///
/// Passes do not declare their own ordering. The [`crate::compiler::PassScheduler`] runs
/// them in a fixed sequence of phases (rename, inline, normalize), each to fixpoint.
pub trait SsaPass: Send + Sync {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Should this pass run on a specific method?
    ///
    /// Called before `run_on_method`. Override to skip methods the pass cannot change.
    fn should_run(&self, _method: &MethodRef, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Runs the pass on a single method's SSA.
    ///
    /// Returns `true` if any changes were made. Events should be recorded directly to
    /// `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error for a structural failure; the scheduler aborts the run.
    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: &MethodRef,
        ctx: &CompilerContext,
    ) -> Result<bool>;

    /// Runs on the whole program (for passes that need to see every method).
    ///
    /// # Errors
    ///
    /// Returns an error if the pass fails.
    fn run_global(&self, _ctx: &CompilerContext) -> Result<bool> {
        Ok(false)
    }

    /// Does this pass operate globally (across all methods)?
    ///
    /// Global passes have their `run_global` called instead of `run_on_method`.
    fn is_global(&self) -> bool {
        false
    }

    /// Called once before the pass runs in a phase iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after the pass completes in a phase iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
