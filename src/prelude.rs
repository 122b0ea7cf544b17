//! # cfopt Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the cfopt library. Import it to get quick access to everything needed to describe
//! a program, lift it and run the optimizer.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cfopt operations
pub use crate::Error;

/// The result type used throughout cfopt
pub use crate::Result;

// ================================================================================================
// Program Model
// ================================================================================================

/// Symbolic identities
pub use crate::metadata::{FieldRef, InvokeKind, MethodRef, ProgramItem, Proto, TypeRef, ValueType};

/// Definitions and the in-memory program
pub use crate::metadata::{
    AppView, ClassBuilder, ClassDefinition, ClassFlags, FieldDefinition, FieldFlags,
    MethodDefinition, MethodFlags, Program,
};

// ================================================================================================
// Instruction Model
// ================================================================================================

/// Stack-form code and its builder
pub use crate::assembly::{CfInstruction, CodeBuilder, IfCond, Label, MethodCode};

// ================================================================================================
// SSA
// ================================================================================================

/// SSA form and lifting
pub use crate::analysis::{
    verify, BlockId, ConstValue, InsnId, LiftConfig, Lifter, PhiId, SsaFunction, SsaOp, ValueId,
};

// ================================================================================================
// Lenses
// ================================================================================================

/// The reference lens chain
pub use crate::lens::{LensChain, LensId, LensLayer, LensView};

// ================================================================================================
// Compiler
// ================================================================================================

/// Driver, configuration and diagnostics
pub use crate::compiler::{
    ClassInliningConfig, CompilationResult, Compiler, CompilerConfig, CompilerContext,
    DerivedStats, EventKind, EventLog, PassScheduler, SsaPass,
};

/// Built-in passes
pub use crate::compiler::{
    BlockMergingPass, BridgeForwardingPass, ClassInliningPass, ClassVerdict, ForceInliner,
    PhiCleanupPass,
};
