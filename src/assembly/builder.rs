//! Fluent construction of [`MethodCode`].
//!
//! Used by tests, benchmarks and embedders that synthesize code:
//!
//! ```rust,ignore
//! use cfopt::assembly::CodeBuilder;
//!
//! // return new L(1).getX();
//! let code = CodeBuilder::new(3, 1)
//!     .new_instance(l.clone())
//!     .dup()
//!     .iconst(1)
//!     .invoke_special(init)
//!     .invoke_virtual(get_x)
//!     .ireturn()
//!     .build();
//! ```

use std::sync::Arc;

use crate::{
    assembly::{
        ArithOp, ArrayElem, CfInstruction, ExceptionHandler, IfCond, Label, LocalVariableInfo,
        MethodCode,
    },
    lens::LensId,
    metadata::{FieldRef, InvokeKind, MethodRef, TypeRef, ValueType},
};

/// Builder for stack-form method bodies.
pub struct CodeBuilder {
    code: MethodCode,
}

impl CodeBuilder {
    /// Starts an empty body with the given limits.
    #[must_use]
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        CodeBuilder {
            code: MethodCode::new(max_stack, max_locals, Vec::new()),
        }
    }

    /// Appends any instruction.
    #[must_use]
    pub fn push(mut self, instruction: CfInstruction) -> Self {
        self.code.instructions.push(instruction);
        self
    }

    /// Places a label.
    #[must_use]
    pub fn label(self, label: Label) -> Self {
        self.push(CfInstruction::Label(label))
    }

    /// Adds an exception handler entry.
    #[must_use]
    pub fn handler(mut self, start: Label, end: Label, handler: Label, guard: Option<TypeRef>) -> Self {
        self.code.handlers.push(ExceptionHandler {
            start,
            end,
            handler,
            guard,
        });
        self
    }

    /// Adds a local-variable debug entry.
    #[must_use]
    pub fn local_variable(mut self, local: u16, name: &str, ty: TypeRef, start: Label, end: Label) -> Self {
        self.code.local_variables.push(LocalVariableInfo {
            local,
            name: Arc::from(name),
            ty,
            start,
            end,
        });
        self
    }

    /// Records the lens the references are expressed in.
    #[must_use]
    pub fn lens(mut self, lens: LensId) -> Self {
        self.code.lens = Some(lens);
        self
    }

    /// `aconst_null`
    #[must_use]
    pub fn aconst_null(self) -> Self {
        self.push(CfInstruction::ConstNull)
    }

    /// `iconst`
    #[must_use]
    pub fn iconst(self, value: i32) -> Self {
        self.push(CfInstruction::ConstInt(value))
    }

    /// `lconst`
    #[must_use]
    pub fn lconst(self, value: i64) -> Self {
        self.push(CfInstruction::ConstLong(value))
    }

    /// `ldc` of a string
    #[must_use]
    pub fn sconst(self, value: &str) -> Self {
        self.push(CfInstruction::ConstString(Arc::from(value)))
    }

    /// Typed load from a local.
    #[must_use]
    pub fn load(self, ty: ValueType, local: u16) -> Self {
        self.push(CfInstruction::Load { ty, local })
    }

    /// `iload`
    #[must_use]
    pub fn iload(self, local: u16) -> Self {
        self.load(ValueType::Int, local)
    }

    /// `aload`
    #[must_use]
    pub fn aload(self, local: u16) -> Self {
        self.load(ValueType::Object, local)
    }

    /// Typed store into a local.
    #[must_use]
    pub fn store(self, ty: ValueType, local: u16) -> Self {
        self.push(CfInstruction::Store { ty, local })
    }

    /// `istore`
    #[must_use]
    pub fn istore(self, local: u16) -> Self {
        self.store(ValueType::Int, local)
    }

    /// `astore`
    #[must_use]
    pub fn astore(self, local: u16) -> Self {
        self.store(ValueType::Object, local)
    }

    /// `iinc`
    #[must_use]
    pub fn iinc(self, local: u16, delta: i32) -> Self {
        self.push(CfInstruction::Iinc { local, delta })
    }

    /// Typed arithmetic.
    #[must_use]
    pub fn arith(self, op: ArithOp, ty: ValueType) -> Self {
        self.push(CfInstruction::Arith { op, ty })
    }

    /// `iadd`
    #[must_use]
    pub fn iadd(self) -> Self {
        self.arith(ArithOp::Add, ValueType::Int)
    }

    /// Array element load.
    #[must_use]
    pub fn array_load(self, elem: ArrayElem) -> Self {
        self.push(CfInstruction::ArrayLoad(elem))
    }

    /// Array element store.
    #[must_use]
    pub fn array_store(self, elem: ArrayElem) -> Self {
        self.push(CfInstruction::ArrayStore(elem))
    }

    /// Branch comparing one `int` against zero.
    #[must_use]
    pub fn if_zero(self, cond: IfCond, target: Label) -> Self {
        self.push(CfInstruction::If {
            cond,
            ty: ValueType::Int,
            target,
        })
    }

    /// Branch comparing two `int`s.
    #[must_use]
    pub fn if_icmp(self, cond: IfCond, target: Label) -> Self {
        self.push(CfInstruction::IfCmp {
            cond,
            ty: ValueType::Int,
            target,
        })
    }

    /// `goto`
    #[must_use]
    pub fn goto(self, target: Label) -> Self {
        self.push(CfInstruction::Goto(target))
    }

    /// `tableswitch`
    #[must_use]
    pub fn table_switch(self, low: i32, targets: Vec<Label>, default: Label) -> Self {
        self.push(CfInstruction::TableSwitch {
            low,
            targets,
            default,
        })
    }

    /// `lookupswitch`
    #[must_use]
    pub fn lookup_switch(self, keys: Vec<i32>, targets: Vec<Label>, default: Label) -> Self {
        self.push(CfInstruction::LookupSwitch {
            keys,
            targets,
            default,
        })
    }

    /// `new`
    #[must_use]
    pub fn new_instance(self, ty: TypeRef) -> Self {
        self.push(CfInstruction::New(ty))
    }

    /// `checkcast`
    #[must_use]
    pub fn checkcast(self, ty: TypeRef) -> Self {
        self.push(CfInstruction::CheckCast(ty))
    }

    /// `getfield`
    #[must_use]
    pub fn get_field(self, field: FieldRef) -> Self {
        self.push(CfInstruction::GetField(field))
    }

    /// `putfield`
    #[must_use]
    pub fn put_field(self, field: FieldRef) -> Self {
        self.push(CfInstruction::PutField(field))
    }

    /// `getstatic`
    #[must_use]
    pub fn get_static(self, field: FieldRef) -> Self {
        self.push(CfInstruction::GetStatic(field))
    }

    /// `putstatic`
    #[must_use]
    pub fn put_static(self, field: FieldRef) -> Self {
        self.push(CfInstruction::PutStatic(field))
    }

    /// Any invoke.
    #[must_use]
    pub fn invoke(self, kind: InvokeKind, method: MethodRef) -> Self {
        self.push(CfInstruction::Invoke { kind, method })
    }

    /// `invokestatic`
    #[must_use]
    pub fn invoke_static(self, method: MethodRef) -> Self {
        self.invoke(InvokeKind::Static, method)
    }

    /// `invokevirtual`
    #[must_use]
    pub fn invoke_virtual(self, method: MethodRef) -> Self {
        self.invoke(InvokeKind::Virtual, method)
    }

    /// `invokespecial`
    #[must_use]
    pub fn invoke_special(self, method: MethodRef) -> Self {
        self.invoke(InvokeKind::Special, method)
    }

    /// `pop`
    #[must_use]
    pub fn pop(self) -> Self {
        self.push(CfInstruction::Pop)
    }

    /// `dup`
    #[must_use]
    pub fn dup(self) -> Self {
        self.push(CfInstruction::Dup)
    }

    /// `swap`
    #[must_use]
    pub fn swap(self) -> Self {
        self.push(CfInstruction::Swap)
    }

    /// `athrow`
    #[must_use]
    pub fn athrow(self) -> Self {
        self.push(CfInstruction::Throw)
    }

    /// `return`
    #[must_use]
    pub fn vreturn(self) -> Self {
        self.push(CfInstruction::Return(None))
    }

    /// `ireturn`
    #[must_use]
    pub fn ireturn(self) -> Self {
        self.push(CfInstruction::Return(Some(ValueType::Int)))
    }

    /// `areturn`
    #[must_use]
    pub fn areturn(self) -> Self {
        self.push(CfInstruction::Return(Some(ValueType::Object)))
    }

    /// Finishes the body.
    #[must_use]
    pub fn build(self) -> MethodCode {
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_instructions() {
        let code = CodeBuilder::new(2, 1)
            .label(Label(0))
            .iconst(1)
            .istore(0)
            .iinc(0, 2)
            .iload(0)
            .ireturn()
            .handler(Label(0), Label(1), Label(2), None)
            .build();
        assert_eq!(code.instructions.len(), 6);
        assert_eq!(code.instruction_count(), 5);
        assert_eq!(code.handlers.len(), 1);
        assert_eq!(code.max_stack, 2);
        assert!(code.lens.is_none());
    }
}
