//! Method bodies in stack form.

use std::sync::Arc;

use crate::{
    assembly::{CfInstruction, Label},
    lens::LensId,
    metadata::TypeRef,
};

/// A protected range and the handler that catches exceptions raised inside it.
///
/// The range covers the instructions from `start` up to, but excluding, `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First label of the protected range
    pub start: Label,
    /// Label just past the protected range
    pub end: Label,
    /// Entry of the handler code
    pub handler: Label,
    /// Caught type, `None` catches everything
    pub guard: Option<TypeRef>,
}

/// An entry of the local-variable debug table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableInfo {
    /// Local slot
    pub local: u16,
    /// Source-level name
    pub name: Arc<str>,
    /// Declared type
    pub ty: TypeRef,
    /// First label where the variable is in scope
    pub start: Label,
    /// Label past the last instruction where the variable is in scope
    pub end: Label,
}

/// The stack-form body of one method.
///
/// Produced by an external reader (or by [`crate::assembly::CodeBuilder`]); the optimizer
/// never persists this format.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCode {
    /// Declared maximum operand stack depth, in words
    pub max_stack: u16,
    /// Declared number of local slots, including parameters
    pub max_locals: u16,
    /// The instruction stream
    pub instructions: Vec<CfInstruction>,
    /// Exception handler table, innermost first
    pub handlers: Vec<ExceptionHandler>,
    /// Optional local-variable debug table
    pub local_variables: Vec<LocalVariableInfo>,
    /// The lens the references in this body are expressed in, `None` for original names
    pub lens: Option<LensId>,
}

impl MethodCode {
    /// Creates a body without handlers or debug information.
    #[must_use]
    pub fn new(max_stack: u16, max_locals: u16, instructions: Vec<CfInstruction>) -> Self {
        MethodCode {
            max_stack,
            max_locals,
            instructions,
            handlers: Vec::new(),
            local_variables: Vec::new(),
            lens: None,
        }
    }

    /// Number of instructions that are not labels.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| !matches!(i, CfInstruction::Label(_) | CfInstruction::Nop))
            .count()
    }
}
