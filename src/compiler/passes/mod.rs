//! Built-in SSA passes.
//!
//! Each pass operates on SSA form and records what it changed in the context's
//! [`EventLog`](crate::compiler::EventLog).
//!
//! # Pipeline Phases
//!
//! The [`PassScheduler`](crate::compiler::PassScheduler) organizes passes into phases
//! that run in a fixed order. Within each phase, passes run iteratively until a fixpoint
//! is reached.
//!
//! ## Phase 1: Rename
//!
//! Produces lens layers. Runs before anything inspects call targets.
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`BridgeForwardingPass`] | Maps forwarding bridge methods to their targets |
//!
//! ## Phase 2: Inline
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`ClassInliningPass`] | Replaces non-escaping allocations by their field values |
//!
//! ## Phase 3: Normalize
//!
//! Runs after every inline iteration and once more at the end.
//!
//! | Pass | Description |
//! |------|-------------|
//! | [`PhiCleanupPass`] | Removes trivial and dead phis |
//! | [`BlockMergingPass`] | Merges jump-connected blocks and removes trampolines |
//!
//! # Building Blocks
//!
//! [`ForceInliner`] substitutes a single call with the callee body. It is not a pass on
//! its own; the class inliner drives it.

mod blockmerge;
mod bridges;
mod classinliner;
mod inlining;
mod phicleanup;

pub use self::blockmerge::{merge_blocks, BlockMergingPass, MergeStats};
pub use self::bridges::{forwarding_target, BridgeForwardingPass};
pub use self::classinliner::{
    analyze_site, reconstruct, AllocationSite, Candidate, ClassInliningPass, ClassRejection,
    ClassVerdict, Reconstruction, SiteAnalysis, SiteRejection,
};
pub use self::inlining::{ForceInliner, InlinedCall};
pub use self::phicleanup::PhiCleanupPass;
