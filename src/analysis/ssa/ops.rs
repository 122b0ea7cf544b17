//! SSA operations.
//!
//! [`SsaOp`] is the closed set of operations an [`crate::analysis::SsaInstruction`] can
//! perform. Operations carry their input values and, for terminators, their target blocks;
//! the (at most one) result value is held by the instruction.
//!
//! # Categories
//!
//! | Category | Operations |
//! |----------|------------|
//! | Values | `Const`, `Argument`, `MoveException` |
//! | Arithmetic | `Binary`, `AddLiteral`, `Neg`, `Convert`, `Compare` |
//! | Arrays | `ArrayLoad`, `ArrayStore`, `ArrayLength`, `NewArray`, `MultiNewArray` |
//! | Objects | `NewInstance`, `CheckCast`, `InstanceOf`, `InstanceGet`, `InstancePut`, `StaticGet`, `StaticPut`, `Monitor` |
//! | Calls | `Invoke`, `InvokeCustom` |
//! | Control flow | `Goto`, `If`, `Switch`, `Return`, `Throw` |

use std::{fmt, sync::Arc};

use crate::{
    analysis::ssa::{BlockId, ConstValue, ValueId},
    assembly::{ArithOp, ArrayElem, CmpBias, IfCond},
    metadata::{FieldRef, InvokeKind, MethodRef, Proto, TypeRef, ValueType},
};

/// Key layout of a multi-way branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchKeys {
    /// Dense keys `low, low + 1, ...`, one per target
    Table {
        /// Key of the first target
        low: i32,
    },
    /// Explicit sparse keys, parallel to the targets
    Lookup(Vec<i32>),
}

impl SwitchKeys {
    /// The key selecting target number `index`.
    #[must_use]
    pub fn key(&self, index: usize) -> Option<i32> {
        match self {
            SwitchKeys::Table { low } => i32::try_from(index)
                .ok()
                .and_then(|offset| low.checked_add(offset)),
            SwitchKeys::Lookup(keys) => keys.get(index).copied(),
        }
    }
}

/// An SSA operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SsaOp {
    /// Materializes a constant
    Const(ConstValue),
    /// Defines the method parameter at `index` (the receiver is index 0 for instance methods)
    Argument {
        /// Parameter position
        index: u16,
    },
    /// Binary arithmetic or bitwise operation
    Binary {
        /// Operator
        op: ArithOp,
        /// Operand type
        ty: ValueType,
        /// Left operand
        left: ValueId,
        /// Right operand
        right: ValueId,
    },
    /// Adds a literal to a value (local increment)
    AddLiteral {
        /// Operand type
        ty: ValueType,
        /// Operand
        value: ValueId,
        /// Literal addend
        literal: i32,
    },
    /// Arithmetic negation
    Neg {
        /// Operand type
        ty: ValueType,
        /// Operand
        value: ValueId,
    },
    /// Numeric conversion
    Convert {
        /// Source type
        from: ValueType,
        /// Target type
        to: ValueType,
        /// Operand
        value: ValueId,
    },
    /// Three-way comparison producing -1, 0 or 1
    Compare {
        /// Operand type
        ty: ValueType,
        /// NaN handling
        bias: CmpBias,
        /// Left operand
        left: ValueId,
        /// Right operand
        right: ValueId,
    },
    /// Reads an array element
    ArrayLoad {
        /// Element kind
        elem: ArrayElem,
        /// Array
        array: ValueId,
        /// Index
        index: ValueId,
    },
    /// Writes an array element
    ArrayStore {
        /// Element kind
        elem: ArrayElem,
        /// Array
        array: ValueId,
        /// Index
        index: ValueId,
        /// Stored value
        value: ValueId,
    },
    /// Reads an array's length
    ArrayLength {
        /// Array
        array: ValueId,
    },
    /// Allocates an uninitialized instance
    NewInstance {
        /// Allocated class
        ty: TypeRef,
    },
    /// Allocates a one-dimensional array
    NewArray {
        /// Array type
        ty: TypeRef,
        /// Length
        size: ValueId,
    },
    /// Allocates a multi-dimensional array
    MultiNewArray {
        /// Array type
        ty: TypeRef,
        /// Length of each allocated dimension, outermost first
        dims: Vec<ValueId>,
    },
    /// Narrows a reference, producing a new value for the same object
    CheckCast {
        /// Target type
        ty: TypeRef,
        /// Operand
        object: ValueId,
    },
    /// Tests a reference against a type
    InstanceOf {
        /// Tested type
        ty: TypeRef,
        /// Operand
        object: ValueId,
    },
    /// Reads an instance field
    InstanceGet {
        /// Field
        field: FieldRef,
        /// Object
        object: ValueId,
    },
    /// Writes an instance field
    InstancePut {
        /// Field
        field: FieldRef,
        /// Object
        object: ValueId,
        /// Stored value
        value: ValueId,
    },
    /// Reads a static field
    StaticGet {
        /// Field
        field: FieldRef,
    },
    /// Writes a static field
    StaticPut {
        /// Field
        field: FieldRef,
        /// Stored value
        value: ValueId,
    },
    /// Calls a method; `args[0]` is the receiver unless `kind` is static
    Invoke {
        /// Dispatch form
        kind: InvokeKind,
        /// Target
        method: MethodRef,
        /// Operands in declaration order
        args: Vec<ValueId>,
    },
    /// Calls through a bootstrapped call site
    InvokeCustom {
        /// Call site name
        name: Arc<str>,
        /// Call site type
        proto: Proto,
        /// Bootstrap method
        bootstrap: MethodRef,
        /// Operands in declaration order
        args: Vec<ValueId>,
    },
    /// Acquires or releases a monitor
    Monitor {
        /// `true` for enter, `false` for exit
        enter: bool,
        /// Locked object
        object: ValueId,
    },
    /// Defines the caught exception at the start of a handler block
    MoveException {
        /// Caught type, `None` for catch-all
        guard: Option<TypeRef>,
    },
    /// Unconditional jump (also used for fall-through)
    Goto {
        /// Target block
        target: BlockId,
    },
    /// Two-way conditional branch; compares against zero or `null` when `right` is absent
    If {
        /// Condition
        cond: IfCond,
        /// Left operand
        left: ValueId,
        /// Right operand
        right: Option<ValueId>,
        /// Block taken when the condition holds
        then_target: BlockId,
        /// Block taken otherwise
        else_target: BlockId,
    },
    /// Multi-way branch
    Switch {
        /// Selector
        selector: ValueId,
        /// Key layout
        keys: SwitchKeys,
        /// Targets, one per key
        targets: Vec<BlockId>,
        /// Target for every other key
        default: BlockId,
    },
    /// Normal method exit
    Return {
        /// Returned value, if any
        value: Option<ValueId>,
    },
    /// Exceptional exit
    Throw {
        /// Thrown exception
        exception: ValueId,
    },
    /// No operation; also the tombstone of removed instructions
    Nop,
}

impl SsaOp {
    /// Input values in operand order.
    #[must_use]
    pub fn operands(&self) -> Vec<ValueId> {
        let mut out = Vec::new();
        self.clone_operands_into(&mut out);
        out
    }

    fn clone_operands_into(&self, out: &mut Vec<ValueId>) {
        match self {
            SsaOp::Const(_)
            | SsaOp::Argument { .. }
            | SsaOp::NewInstance { .. }
            | SsaOp::StaticGet { .. }
            | SsaOp::MoveException { .. }
            | SsaOp::Goto { .. }
            | SsaOp::Nop => {}
            SsaOp::Binary { left, right, .. } | SsaOp::Compare { left, right, .. } => {
                out.extend([*left, *right]);
            }
            SsaOp::AddLiteral { value, .. }
            | SsaOp::Neg { value, .. }
            | SsaOp::Convert { value, .. }
            | SsaOp::StaticPut { value, .. } => out.push(*value),
            SsaOp::ArrayLoad { array, index, .. } => out.extend([*array, *index]),
            SsaOp::ArrayStore {
                array,
                index,
                value,
                ..
            } => out.extend([*array, *index, *value]),
            SsaOp::ArrayLength { array } => out.push(*array),
            SsaOp::NewArray { size, .. } => out.push(*size),
            SsaOp::MultiNewArray { dims, .. } => out.extend(dims.iter().copied()),
            SsaOp::CheckCast { object, .. }
            | SsaOp::InstanceOf { object, .. }
            | SsaOp::InstanceGet { object, .. }
            | SsaOp::Monitor { object, .. } => out.push(*object),
            SsaOp::InstancePut { object, value, .. } => out.extend([*object, *value]),
            SsaOp::Invoke { args, .. } | SsaOp::InvokeCustom { args, .. } => {
                out.extend(args.iter().copied());
            }
            SsaOp::If { left, right, .. } => {
                out.push(*left);
                out.extend(right.iter().copied());
            }
            SsaOp::Switch { selector, .. } => out.push(*selector),
            SsaOp::Return { value } => out.extend(value.iter().copied()),
            SsaOp::Throw { exception } => out.push(*exception),
        }
    }

    /// Calls `f` on every input value slot.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut ValueId)) {
        match self {
            SsaOp::Const(_)
            | SsaOp::Argument { .. }
            | SsaOp::NewInstance { .. }
            | SsaOp::StaticGet { .. }
            | SsaOp::MoveException { .. }
            | SsaOp::Goto { .. }
            | SsaOp::Nop => {}
            SsaOp::Binary { left, right, .. } | SsaOp::Compare { left, right, .. } => {
                f(left);
                f(right);
            }
            SsaOp::AddLiteral { value, .. }
            | SsaOp::Neg { value, .. }
            | SsaOp::Convert { value, .. }
            | SsaOp::StaticPut { value, .. } => f(value),
            SsaOp::ArrayLoad { array, index, .. } => {
                f(array);
                f(index);
            }
            SsaOp::ArrayStore {
                array,
                index,
                value,
                ..
            } => {
                f(array);
                f(index);
                f(value);
            }
            SsaOp::ArrayLength { array } => f(array),
            SsaOp::NewArray { size, .. } => f(size),
            SsaOp::MultiNewArray { dims, .. } => dims.iter_mut().for_each(f),
            SsaOp::CheckCast { object, .. }
            | SsaOp::InstanceOf { object, .. }
            | SsaOp::InstanceGet { object, .. }
            | SsaOp::Monitor { object, .. } => f(object),
            SsaOp::InstancePut { object, value, .. } => {
                f(object);
                f(value);
            }
            SsaOp::Invoke { args, .. } | SsaOp::InvokeCustom { args, .. } => {
                args.iter_mut().for_each(f);
            }
            SsaOp::If { left, right, .. } => {
                f(left);
                if let Some(right) = right {
                    f(right);
                }
            }
            SsaOp::Switch { selector, .. } => f(selector),
            SsaOp::Return { value } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            SsaOp::Throw { exception } => f(exception),
        }
    }

    /// Returns `true` if this operation uses `value`.
    #[must_use]
    pub fn uses(&self, value: ValueId) -> bool {
        self.operands().contains(&value)
    }

    /// Returns `true` for control transfers that must end a block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            SsaOp::Goto { .. }
                | SsaOp::If { .. }
                | SsaOp::Switch { .. }
                | SsaOp::Return { .. }
                | SsaOp::Throw { .. }
        )
    }

    /// Normal-flow targets, in edge order (switch default last). Duplicates are kept.
    #[must_use]
    pub fn targets(&self) -> Vec<BlockId> {
        match self {
            SsaOp::Goto { target } => vec![*target],
            SsaOp::If {
                then_target,
                else_target,
                ..
            } => vec![*then_target, *else_target],
            SsaOp::Switch {
                targets, default, ..
            } => targets.iter().chain(std::iter::once(default)).copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Calls `f` on every target slot.
    pub fn for_each_target_mut(&mut self, mut f: impl FnMut(&mut BlockId)) {
        match self {
            SsaOp::Goto { target } => f(target),
            SsaOp::If {
                then_target,
                else_target,
                ..
            } => {
                f(then_target);
                f(else_target);
            }
            SsaOp::Switch {
                targets, default, ..
            } => {
                targets.iter_mut().for_each(&mut f);
                f(default);
            }
            _ => {}
        }
    }

    /// Whether this operation may transfer control abnormally.
    #[must_use]
    pub fn may_throw(&self) -> bool {
        match self {
            SsaOp::Const(value) => value.may_throw(),
            SsaOp::Binary {
                op: ArithOp::Div | ArithOp::Rem,
                ty: ValueType::Int | ValueType::Long,
                ..
            } => true,
            SsaOp::ArrayLoad { .. }
            | SsaOp::ArrayStore { .. }
            | SsaOp::ArrayLength { .. }
            | SsaOp::NewInstance { .. }
            | SsaOp::NewArray { .. }
            | SsaOp::MultiNewArray { .. }
            | SsaOp::CheckCast { .. }
            | SsaOp::InstanceOf { .. }
            | SsaOp::InstanceGet { .. }
            | SsaOp::InstancePut { .. }
            | SsaOp::StaticGet { .. }
            | SsaOp::StaticPut { .. }
            | SsaOp::Invoke { .. }
            | SsaOp::InvokeCustom { .. }
            | SsaOp::Monitor { .. }
            | SsaOp::Throw { .. } => true,
            _ => false,
        }
    }

    /// Short name used in listings.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            SsaOp::Const(_) => "const",
            SsaOp::Argument { .. } => "arg",
            SsaOp::Binary { op, .. } => op.name(),
            SsaOp::AddLiteral { .. } => "add-lit",
            SsaOp::Neg { .. } => "neg",
            SsaOp::Convert { .. } => "convert",
            SsaOp::Compare { .. } => "cmp",
            SsaOp::ArrayLoad { .. } => "aget",
            SsaOp::ArrayStore { .. } => "aput",
            SsaOp::ArrayLength { .. } => "array-length",
            SsaOp::NewInstance { .. } => "new-instance",
            SsaOp::NewArray { .. } => "new-array",
            SsaOp::MultiNewArray { .. } => "new-multi-array",
            SsaOp::CheckCast { .. } => "check-cast",
            SsaOp::InstanceOf { .. } => "instance-of",
            SsaOp::InstanceGet { .. } => "iget",
            SsaOp::InstancePut { .. } => "iput",
            SsaOp::StaticGet { .. } => "sget",
            SsaOp::StaticPut { .. } => "sput",
            SsaOp::Invoke { .. } => "invoke",
            SsaOp::InvokeCustom { .. } => "invoke-custom",
            SsaOp::Monitor { enter: true, .. } => "monitor-enter",
            SsaOp::Monitor { enter: false, .. } => "monitor-exit",
            SsaOp::MoveException { .. } => "move-exception",
            SsaOp::Goto { .. } => "goto",
            SsaOp::If { .. } => "if",
            SsaOp::Switch { .. } => "switch",
            SsaOp::Return { .. } => "return",
            SsaOp::Throw { .. } => "throw",
            SsaOp::Nop => "nop",
        }
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[ValueId]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}

impl fmt::Display for SsaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            SsaOp::Const(value) => write!(f, "{mnemonic} {value}"),
            SsaOp::Argument { index } => write!(f, "{mnemonic} {index}"),
            SsaOp::AddLiteral { value, literal, .. } => write!(f, "{mnemonic} {value}, {literal}"),
            SsaOp::Convert { from, to, value } => write!(f, "{from}-to-{to} {value}"),
            SsaOp::NewInstance { ty } => write!(f, "{mnemonic} {ty}"),
            SsaOp::NewArray { ty, size } => write!(f, "{mnemonic} {ty}[{size}]"),
            SsaOp::CheckCast { ty, object } | SsaOp::InstanceOf { ty, object } => {
                write!(f, "{mnemonic} {object}, {ty}")
            }
            SsaOp::InstanceGet { field, object } => write!(f, "{mnemonic} {object}.{}", field.name),
            SsaOp::InstancePut {
                field,
                object,
                value,
            } => write!(f, "{mnemonic} {object}.{} = {value}", field.name),
            SsaOp::StaticGet { field } => write!(f, "{mnemonic} {field}"),
            SsaOp::StaticPut { field, value } => write!(f, "{mnemonic} {field} = {value}"),
            SsaOp::Invoke { kind, method, args } => {
                write!(f, "{mnemonic}-{kind} {method}(")?;
                write_values(f, args)?;
                f.write_str(")")
            }
            SsaOp::InvokeCustom { name, args, .. } => {
                write!(f, "{mnemonic} {name}(")?;
                write_values(f, args)?;
                f.write_str(")")
            }
            SsaOp::MoveException { guard: Some(ty) } => write!(f, "{mnemonic} {ty}"),
            SsaOp::Goto { target } => write!(f, "{mnemonic} {target}"),
            SsaOp::If {
                cond,
                left,
                right,
                then_target,
                else_target,
            } => {
                write!(f, "if-{} {left}", cond.name())?;
                if let Some(right) = right {
                    write!(f, ", {right}")?;
                }
                write!(f, " then {then_target} else {else_target}")
            }
            SsaOp::Switch {
                selector,
                targets,
                default,
                ..
            } => write!(f, "{mnemonic} {selector} {targets:?} default {default}"),
            _ => {
                f.write_str(mnemonic)?;
                let operands = self.operands();
                if !operands.is_empty() {
                    f.write_str(" ")?;
                    write_values(f, &operands)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: usize) -> ValueId {
        ValueId::new(i)
    }

    #[test]
    fn test_operands_and_rewrite() {
        let mut op = SsaOp::InstancePut {
            field: FieldRef::new(TypeRef::class("L"), "x", TypeRef::int()),
            object: v(0),
            value: v(1),
        };
        assert_eq!(op.operands(), vec![v(0), v(1)]);
        op.for_each_operand_mut(|value| {
            if *value == v(1) {
                *value = v(7);
            }
        });
        assert_eq!(op.operands(), vec![v(0), v(7)]);
        assert!(op.uses(v(7)));
        assert!(op.may_throw());
        assert!(!op.is_terminator());
    }

    #[test]
    fn test_targets() {
        let mut op = SsaOp::If {
            cond: IfCond::Eq,
            left: v(0),
            right: None,
            then_target: BlockId::new(1),
            else_target: BlockId::new(2),
        };
        assert!(op.is_terminator());
        assert_eq!(op.targets(), vec![BlockId::new(1), BlockId::new(2)]);
        op.for_each_target_mut(|t| *t = BlockId::new(5));
        assert_eq!(op.targets(), vec![BlockId::new(5), BlockId::new(5)]);
    }

    #[test]
    fn test_switch_keys() {
        let table = SwitchKeys::Table { low: 10 };
        assert_eq!(table.key(2), Some(12));
        let lookup = SwitchKeys::Lookup(vec![3, 9]);
        assert_eq!(lookup.key(1), Some(9));
        assert_eq!(lookup.key(2), None);
    }

    #[test]
    fn test_may_throw() {
        let div = SsaOp::Binary {
            op: ArithOp::Div,
            ty: ValueType::Int,
            left: v(0),
            right: v(1),
        };
        let add = SsaOp::Binary {
            op: ArithOp::Add,
            ty: ValueType::Int,
            left: v(0),
            right: v(1),
        };
        assert!(div.may_throw());
        assert!(!add.may_throw());
        assert!(!SsaOp::Const(ConstValue::Int(1)).may_throw());
        assert!(SsaOp::NewInstance {
            ty: TypeRef::class("L")
        }
        .may_throw());
    }

    #[test]
    fn test_display() {
        let op = SsaOp::Invoke {
            kind: InvokeKind::Virtual,
            method: MethodRef::new(
                TypeRef::class("L"),
                "getX",
                Proto::new(TypeRef::int(), vec![]),
            ),
            args: vec![v(0)],
        };
        assert_eq!(op.to_string(), "invoke-virtual LL;->getX()I(v0)");
        assert_eq!(SsaOp::Return { value: Some(v(3)) }.to_string(), "return v3");
    }
}
