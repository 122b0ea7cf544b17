//! The class/method/field graph.
//!
//! This module holds everything the optimizer knows about the program outside of individual
//! method bodies:
//!
//! - [`identity`] - symbolic identities ([`TypeRef`], [`Proto`], [`MethodRef`], [`FieldRef`])
//!   and the computational [`ValueType`]s
//! - [`class`] - class, method and field definitions with their access flags
//! - [`program`] - the read-only [`AppView`] query interface and the in-memory [`Program`]
//!
//! The graph is owned by an external component; the optimizer only reads it.

pub mod class;
pub mod identity;
pub mod program;

pub use class::{
    ClassBuilder, ClassDefinition, ClassFlags, FieldDefinition, FieldFlags, MethodDefinition,
    MethodFlags,
};
pub use identity::{
    FieldRef, InvokeKind, MethodRef, ProgramItem, Proto, TypeRef, ValueType,
    CLASS_INITIALIZER_NAME, CONSTRUCTOR_NAME, OBJECT_DESCRIPTOR,
};
pub use program::{AppView, Program};
