//! Program analysis infrastructure for stack-machine methods.
//!
//! This module hosts the SSA intermediate representation every optimization in the crate
//! operates on. It builds upon the generic graph infrastructure in [`crate::utils::graph`]
//! for traversal orders and dominator trees.
//!
//! # Architecture
//!
//! - [`ssa`] - SSA values, phis, instructions and blocks, phi simplification, the verifier
//!   and the stack-to-SSA [`Lifter`]
//!
//! # Usage
//!
//! ```rust,ignore
//! use cfopt::analysis::{Lifter, LiftConfig};
//!
//! let ssa = Lifter::new(&method, is_static, &code)
//!     .with_config(LiftConfig { strict_stack: true, ..LiftConfig::default() })
//!     .lift()?;
//! for block in ssa.blocks() {
//!     for insn in ssa.block_instructions(block.id()) {
//!         println!("{insn}");
//!     }
//! }
//! ```

pub mod ssa;

pub use ssa::{
    eliminate_trivial_phis, remove_dead_phis, verify, BlockId, CatchHandler, ConstValue, InsnId,
    LiftConfig, Lifter, PhiId, PhiNode, Position, SsaBlock, SsaFunction, SsaInstruction, SsaOp,
    SsaValue, SwitchKeys, ValueDef, ValueId, ValueUser,
};
