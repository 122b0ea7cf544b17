//! The stack-form input of the optimizer.
//!
//! Method bodies arrive as an ordered stream of [`CfInstruction`]s together with their
//! declared limits, an exception handler table and an optional local-variable debug table
//! ([`MethodCode`]). The [`crate::analysis::Lifter`] turns them into SSA form.
//!
//! # Key Components
//!
//! - [`CfInstruction`] / [`CfKind`] - the closed instruction set and its discriminants
//! - [`CfKind::semantics`] - the per-kind dispatch table ([`KindSemantics`])
//! - [`MethodCode`] - one method body with handlers and debug info
//! - [`CodeBuilder`] - fluent construction for tests and synthesized code

mod builder;
mod code;
mod instruction;

pub use builder::CodeBuilder;
pub use code::{ExceptionHandler, LocalVariableInfo, MethodCode};
pub use instruction::{
    ArithOp, ArrayElem, CfInstruction, CfKind, CmpBias, FlowType, IfCond, InstructionCategory,
    KindSemantics, Label,
};
