//! Static Single Assignment (SSA) form for stack-machine methods.
//!
//! This module provides the register-based intermediate representation every optimization
//! in the crate works on, together with the lifter that produces it from a
//! [`crate::assembly::MethodCode`] instruction stream.
//!
//! # Architecture
//!
//! A function is a set of arenas addressed by small copyable identifiers:
//!
//! - [`value`] - SSA values ([`ValueId`]) with their defining point and use-list
//! - [`consts`] - constant operands
//! - [`ops`] - the closed set of operations ([`SsaOp`])
//! - [`instruction`] - an operation placed in a block ([`InsnId`])
//! - [`phi`] - phi nodes at block entries ([`PhiId`])
//! - [`block`] - basic blocks with ordered predecessors and exception handlers ([`BlockId`])
//! - [`function`] - the arena owner and the mutation API that keeps def/use exact
//! - [`phis`] - trivial and dead phi elimination
//! - [`verify`] - structural and dominance checks
//! - [`stack`] - the abstract operand stack used during lifting
//! - [`lifter`] - stack-to-SSA construction
//!
//! Removal never reuses an identifier: removed items are tombstoned and skipped by every
//! iterator until [`SsaFunction::compact`] renumbers the arenas.
//!
//! # Construction
//!
//! Lifting follows Braun et al. ("Simple and Efficient Construction of Static Single
//! Assignment Form", CC 2013): stack slots and locals are treated as variables whose
//! current definition is tracked per block, incomplete phis are created in blocks whose
//! predecessors are not yet all filled, and trivial phis are removed as soon as they are
//! completed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cfopt::analysis::{Lifter, verify};
//!
//! let ssa = Lifter::new(&method, is_static, &code).lift()?;
//! verify(&ssa)?;
//! for block in ssa.blocks() {
//!     for &phi in block.phis() {
//!         println!("{}", ssa.phi(phi));
//!     }
//! }
//! ```

/// Declares a dense arena identifier.
macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            /// Creates an identifier from its arena index.
            #[must_use]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// The arena index of this identifier.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

mod block;
mod consts;
mod function;
mod instruction;
mod lifter;
mod ops;
mod phi;
mod phis;
mod stack;
mod value;
mod verify;

pub use block::{BlockId, CatchHandler, SsaBlock};
pub use consts::ConstValue;
pub use function::SsaFunction;
pub use instruction::{InsnId, Position, SsaInstruction};
pub use lifter::{LiftConfig, Lifter};
pub use ops::{SsaOp, SwitchKeys};
pub use phi::{PhiId, PhiNode};
pub use phis::{eliminate_trivial_phis, remove_dead_phis};
pub use stack::{AbstractStackState, SlotSource, StackSlot};
pub use value::{SsaValue, ValueDef, ValueId, ValueUser};
pub use verify::verify;
