// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cfopt
//!
//! An optimizing middle-end for stack-machine class files. `cfopt` lifts stack-based method
//! bodies into SSA form and eliminates allocations of small classes whose instances never
//! escape, replacing every field access with the value the field holds at that point.
//!
//! ## Features
//!
//! - **Stack-to-SSA lifting** - On-the-fly SSA construction from an instruction stream
//!   with exception handler ranges and local-variable debug information
//! - **Class inlining** - Escape-checked elimination of allocations, including forced
//!   inlining of constructors and accessors and phi-aware field value reconstruction
//! - **Reference lenses** - Composable rename layers, so passes can retarget methods
//!   without rewriting code that was already lowered
//! - **Parallel pipeline** - Per-method work runs on all cores, sharing only read-only
//!   lenses and a concurrent eligibility cache
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cfopt::prelude::*;
//!
//! let program = Program::new();
//! // ... add classes with ClassBuilder / CodeBuilder ...
//! let result = Compiler::new(CompilerConfig::default()).compile_program(Arc::new(program))?;
//! println!("{}", result.summary());
//! # Ok::<(), cfopt::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`prelude`] - Convenient re-exports of commonly used types and traits
//! - [`metadata`] - The class/method/field graph the optimizer reads
//! - [`assembly`] - The stack-form instruction model and a fluent builder
//! - [`analysis`] - SSA form, the lifter, phi simplification and verification
//! - [`lens`] - The reference lens chain
//! - [`compiler`] - Passes, the scheduler and the compilation driver
//! - [`utils`] - Graph traversal and dominators
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! Structural failures (a malformed instruction stream, a stack discipline violation, a
//! violated inlining postcondition) are returned as [`Error`] and abort compilation of the
//! unit. Deciding not to inline an allocation is never an error; rejected sites are left
//! unchanged and optionally logged as events.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

pub mod prelude;

pub mod analysis;
pub mod assembly;
pub mod compiler;
pub mod lens;
pub mod metadata;
pub mod utils;

/// `cfopt` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cfopt` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,ignore
/// use cfopt::{Error, analysis::Lifter};
///
/// match Lifter::for_definition(&method)?.lift() {
///     Ok(ssa) => println!("{ssa}"),
///     Err(Error::StackUnderflow { method, offset }) => println!("{method} @ {offset}: underflow"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;
