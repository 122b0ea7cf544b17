//! Compiler infrastructure for SSA-based code transformations.
//!
//! This module provides the middle layer between lifting and whatever consumes the
//! optimized functions:
//!
//! - [`crate::analysis`] - stack code → SSA construction, phi simplification, verification
//! - [`compiler`](self) - SSA optimization passes and the driver that runs them
//! - [`crate::lens`] - the renames passes publish while running
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Compiler                    Lift all methods (parallel), run    │
//! │                              the scheduler, collect the result   │
//! │                                                                  │
//! │  CompilerContext             Shared interprocedural state        │
//! │    ├─ SSA functions          (per-method SSA)                    │
//! │    ├─ Lens chain             (current names)                     │
//! │    ├─ Class verdicts         (computed once per class)           │
//! │    ├─ Receiver summaries     (does a method leak `this`?)        │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               3-phase fixpoint execution          │
//! │    ├─ Phase 1: Rename        (bridge forwarding)                 │
//! │    ├─ Phase 2: Inline        (class inlining)                    │
//! │    └─ Phase 3: Normalize     (phi cleanup, block merging)        │
//! │    Each phase: run → normalize → repeat until stable             │
//! │                                                                  │
//! │  SsaPass trait               Interface for all passes            │
//! │    ├─ run_on_method()        Per-method transformation           │
//! │    ├─ run_global()           Whole-program transformation        │
//! │    ├─ initialize()           Setup before each phase iteration   │
//! │    └─ finalize()             Cleanup after each phase iteration  │
//! │                                                                  │
//! │  ForceInliner                Call → callee body substitution     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use cfopt::compiler::{Compiler, CompilerConfig};
//!
//! let result = Compiler::new(CompilerConfig::aggressive()).compile_program(program)?;
//! for method in result.changed_methods() {
//!     println!("{method}:\n{}", result.function(&method).unwrap());
//! }
//! ```

mod config;
mod context;
mod driver;
mod events;
mod pass;
mod passes;
mod scheduler;
mod summary;

pub use config::{ClassInliningConfig, CompilerConfig};
pub use context::CompilerContext;
pub use driver::{default_pass_names, CompilationResult, Compiler};
pub use events::{DerivedStats, Event, EventBuilder, EventKind, EventLog};
pub use pass::SsaPass;
pub use passes::{
    analyze_site, forwarding_target, merge_blocks, reconstruct, AllocationSite,
    BlockMergingPass, BridgeForwardingPass, Candidate, ClassInliningPass, ClassRejection,
    ClassVerdict, ForceInliner, InlinedCall, MergeStats, PhiCleanupPass, Reconstruction,
    SiteAnalysis, SiteRejection,
};
pub use scheduler::PassScheduler;
pub use summary::{MethodSummary, ReceiverUse};
