//! Stack-machine instructions.
//!
//! [`CfInstruction`] is a closed enumeration of every instruction form the lifter understands.
//! Per-kind properties (mnemonic, control flow, whether it can throw) live in a single dispatch
//! table, [`CfKind::semantics`], keyed by the discriminant enum [`CfKind`] that strum derives
//! from the instruction enum. Adding a variant without a table row is a compile error.
//!
//! Branch targets are symbolic [`Label`]s; the `Label` pseudo-instruction marks the position
//! it names and has no runtime effect.

use std::{fmt, sync::Arc};

use strum::{EnumCount, EnumDiscriminants, EnumIter};

use crate::metadata::{FieldRef, InvokeKind, MethodRef, Proto, TypeRef, ValueType};

/// A symbolic branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`, throws on integer division by zero
    Div,
    /// `%`, throws on integer division by zero
    Rem,
    /// `<<`
    Shl,
    /// `>>` (arithmetic)
    Shr,
    /// `>>>` (logical)
    Ushr,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
}

impl ArithOp {
    /// Short lower-case name used in listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
            ArithOp::Shl => "shl",
            ArithOp::Shr => "shr",
            ArithOp::Ushr => "ushr",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
        }
    }

    /// Returns `true` for the shift operators, whose right operand is always an `int`.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr)
    }
}

/// NaN handling of floating point comparisons (`lcmp` has no bias).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpBias {
    /// Integral comparison
    None,
    /// NaN compares as less (`fcmpl`, `dcmpl`)
    Less,
    /// NaN compares as greater (`fcmpg`, `dcmpg`)
    Greater,
}

/// Condition of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum IfCond {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `<=`
    Le,
}

impl IfCond {
    /// Short lower-case name used in listings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            IfCond::Eq => "eq",
            IfCond::Ne => "ne",
            IfCond::Lt => "lt",
            IfCond::Ge => "ge",
            IfCond::Gt => "gt",
            IfCond::Le => "le",
        }
    }
}

/// Element kind of an array access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum ArrayElem {
    /// `boolean[]` / `byte[]`
    Byte,
    /// `char[]`
    Char,
    /// `short[]`
    Short,
    /// `int[]`
    Int,
    /// `long[]`
    Long,
    /// `float[]`
    Float,
    /// `double[]`
    Double,
    /// Reference arrays
    Object,
}

impl ArrayElem {
    /// Computational type of an element once loaded.
    #[must_use]
    pub const fn value_type(self) -> ValueType {
        match self {
            ArrayElem::Byte | ArrayElem::Char | ArrayElem::Short | ArrayElem::Int => ValueType::Int,
            ArrayElem::Long => ValueType::Long,
            ArrayElem::Float => ValueType::Float,
            ArrayElem::Double => ValueType::Double,
            ArrayElem::Object => ValueType::Object,
        }
    }
}

/// Control flow behavior of an instruction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Continues with the next instruction
    Sequential,
    /// Either jumps or continues
    ConditionalBranch,
    /// Always jumps
    UnconditionalBranch,
    /// Calls a method and continues
    Call,
    /// Multi-way jump
    Switch,
    /// Leaves the method normally
    Return,
    /// Leaves the method (or enters a handler) exceptionally
    Throw,
}

impl FlowType {
    /// Returns `true` if no instruction may follow in the same basic block.
    #[must_use]
    pub const fn ends_block(self) -> bool {
        matches!(
            self,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Return
                | FlowType::Throw
        )
    }
}

/// Functional grouping of instruction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionCategory {
    /// Labels and nops
    Pseudo,
    /// Constant loads
    Constant,
    /// Local variable access
    Local,
    /// Array access
    Array,
    /// Arithmetic, conversion, comparison
    Arithmetic,
    /// Branches, switches, returns, throw
    ControlFlow,
    /// Allocation, casts, field access, monitors
    ObjectModel,
    /// Invocations
    Invoke,
    /// Operand stack shuffling
    Stack,
}

/// One row of the per-kind dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSemantics {
    /// Assembler mnemonic
    pub mnemonic: &'static str,
    /// Control flow behavior
    pub flow: FlowType,
    /// Functional grouping
    pub category: InstructionCategory,
    /// Whether every instance of this kind may transfer control abnormally
    pub may_throw: bool,
}

const fn row(
    mnemonic: &'static str,
    flow: FlowType,
    category: InstructionCategory,
    may_throw: bool,
) -> KindSemantics {
    KindSemantics {
        mnemonic,
        flow,
        category,
        may_throw,
    }
}

/// A stack-machine instruction.
#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(
    name(CfKind),
    doc = "The kind of a [`CfInstruction`], without its operands.",
    derive(Hash, EnumIter, EnumCount)
)]
pub enum CfInstruction {
    /// Names a branch target
    Label(Label),
    /// Pushes `null`
    ConstNull,
    /// Pushes an `int`
    ConstInt(i32),
    /// Pushes a `long`
    ConstLong(i64),
    /// Pushes a `float`
    ConstFloat(f32),
    /// Pushes a `double`
    ConstDouble(f64),
    /// Pushes a string reference
    ConstString(Arc<str>),
    /// Pushes a class literal
    ConstClass(TypeRef),
    /// Pushes a method type
    ConstMethodType(Proto),
    /// Pushes a method handle
    ConstMethodHandle(MethodRef),
    /// Pushes the value of a local
    Load {
        /// Declared type of the load
        ty: ValueType,
        /// Local slot
        local: u16,
    },
    /// Pops a value into a local
    Store {
        /// Declared type of the store
        ty: ValueType,
        /// Local slot
        local: u16,
    },
    /// Adds a constant to an `int` local
    Iinc {
        /// Local slot
        local: u16,
        /// Increment
        delta: i32,
    },
    /// Pops index and array, pushes the element
    ArrayLoad(ArrayElem),
    /// Pops value, index and array
    ArrayStore(ArrayElem),
    /// Pops an array, pushes its length
    ArrayLength,
    /// Pops two operands, pushes the result
    Arith {
        /// Operator
        op: ArithOp,
        /// Operand type
        ty: ValueType,
    },
    /// Pops one operand, pushes its negation
    Neg(ValueType),
    /// Pops one operand, pushes it converted
    Convert {
        /// Source type
        from: ValueType,
        /// Target type
        to: ValueType,
    },
    /// Pops two operands, pushes -1, 0 or 1
    Cmp {
        /// Operand type
        ty: ValueType,
        /// NaN handling
        bias: CmpBias,
    },
    /// Pops one operand and branches if it compares to zero (or `null`) per `cond`
    If {
        /// Condition
        cond: IfCond,
        /// Operand type, `Int` or `Object`
        ty: ValueType,
        /// Taken target
        target: Label,
    },
    /// Pops two operands and branches if they compare per `cond`
    IfCmp {
        /// Condition
        cond: IfCond,
        /// Operand type, `Int` or `Object`
        ty: ValueType,
        /// Taken target
        target: Label,
    },
    /// Unconditional jump
    Goto(Label),
    /// Dense switch on the popped selector
    TableSwitch {
        /// Key of the first target
        low: i32,
        /// Targets for keys `low..low + targets.len()`
        targets: Vec<Label>,
        /// Target for every other key
        default: Label,
    },
    /// Sparse switch on the popped selector
    LookupSwitch {
        /// Keys, parallel to `targets`
        keys: Vec<i32>,
        /// Targets, parallel to `keys`
        targets: Vec<Label>,
        /// Target for every other key
        default: Label,
    },
    /// Returns, popping the result if any
    Return(Option<ValueType>),
    /// Pops and throws an exception
    Throw,
    /// Allocates an uninitialized instance
    New(TypeRef),
    /// Pops a size, pushes a new array of the given array type
    NewArray(TypeRef),
    /// Pops `dims` sizes, pushes a new multi-dimensional array
    MultiANewArray {
        /// Array type
        ty: TypeRef,
        /// Number of dimensions to allocate
        dims: u8,
    },
    /// Pops a reference, pushes it narrowed to `TypeRef`
    CheckCast(TypeRef),
    /// Pops a reference, pushes `1` if it is an instance of `TypeRef`
    InstanceOf(TypeRef),
    /// Pops an object, pushes a field value
    GetField(FieldRef),
    /// Pops value and object
    PutField(FieldRef),
    /// Pushes a static field value
    GetStatic(FieldRef),
    /// Pops a value into a static field
    PutStatic(FieldRef),
    /// Calls a method
    Invoke {
        /// Dispatch form
        kind: InvokeKind,
        /// Referenced method
        method: MethodRef,
    },
    /// Calls through a dynamically bootstrapped call site
    InvokeDynamic {
        /// Call site name
        name: Arc<str>,
        /// Call site type
        proto: Proto,
        /// Bootstrap method
        bootstrap: MethodRef,
    },
    /// Discards one category-1 value
    Pop,
    /// Discards one category-2 value or two category-1 values
    Pop2,
    /// Duplicates the top value
    Dup,
    /// Duplicates the top value below the second
    DupX1,
    /// Duplicates the top value below the second and third
    DupX2,
    /// Duplicates the top two words
    Dup2,
    /// Duplicates the top two words below the third
    Dup2X1,
    /// Duplicates the top two words below the third and fourth
    Dup2X2,
    /// Swaps the top two category-1 values
    Swap,
    /// Pops an object and acquires its monitor
    MonitorEnter,
    /// Pops an object and releases its monitor
    MonitorExit,
    /// Does nothing
    Nop,
}

impl CfKind {
    /// The dispatch table: per-kind properties shared by every instance of the kind.
    #[must_use]
    pub const fn semantics(self) -> KindSemantics {
        use FlowType::{
            Call, ConditionalBranch, Return, Sequential, Switch, Throw, UnconditionalBranch,
        };
        use InstructionCategory as C;

        match self {
            CfKind::Label => row("label", Sequential, C::Pseudo, false),
            CfKind::Nop => row("nop", Sequential, C::Pseudo, false),
            CfKind::ConstNull => row("aconst_null", Sequential, C::Constant, false),
            CfKind::ConstInt => row("iconst", Sequential, C::Constant, false),
            CfKind::ConstLong => row("lconst", Sequential, C::Constant, false),
            CfKind::ConstFloat => row("fconst", Sequential, C::Constant, false),
            CfKind::ConstDouble => row("dconst", Sequential, C::Constant, false),
            // Resolving string and class constants may fail at runtime.
            CfKind::ConstString => row("ldc_string", Sequential, C::Constant, true),
            CfKind::ConstClass => row("ldc_class", Sequential, C::Constant, true),
            CfKind::ConstMethodType => row("ldc_method_type", Sequential, C::Constant, true),
            CfKind::ConstMethodHandle => row("ldc_method_handle", Sequential, C::Constant, true),
            CfKind::Load => row("load", Sequential, C::Local, false),
            CfKind::Store => row("store", Sequential, C::Local, false),
            CfKind::Iinc => row("iinc", Sequential, C::Local, false),
            CfKind::ArrayLoad => row("arrayload", Sequential, C::Array, true),
            CfKind::ArrayStore => row("arraystore", Sequential, C::Array, true),
            CfKind::ArrayLength => row("arraylength", Sequential, C::Array, true),
            CfKind::Arith => row("arith", Sequential, C::Arithmetic, false),
            CfKind::Neg => row("neg", Sequential, C::Arithmetic, false),
            CfKind::Convert => row("convert", Sequential, C::Arithmetic, false),
            CfKind::Cmp => row("cmp", Sequential, C::Arithmetic, false),
            CfKind::If => row("if", ConditionalBranch, C::ControlFlow, false),
            CfKind::IfCmp => row("if_cmp", ConditionalBranch, C::ControlFlow, false),
            CfKind::Goto => row("goto", UnconditionalBranch, C::ControlFlow, false),
            CfKind::TableSwitch => row("tableswitch", Switch, C::ControlFlow, false),
            CfKind::LookupSwitch => row("lookupswitch", Switch, C::ControlFlow, false),
            CfKind::Return => row("return", Return, C::ControlFlow, false),
            CfKind::Throw => row("athrow", Throw, C::ControlFlow, true),
            CfKind::New => row("new", Sequential, C::ObjectModel, true),
            CfKind::NewArray => row("newarray", Sequential, C::ObjectModel, true),
            CfKind::MultiANewArray => row("multianewarray", Sequential, C::ObjectModel, true),
            CfKind::CheckCast => row("checkcast", Sequential, C::ObjectModel, true),
            CfKind::InstanceOf => row("instanceof", Sequential, C::ObjectModel, true),
            CfKind::GetField => row("getfield", Sequential, C::ObjectModel, true),
            CfKind::PutField => row("putfield", Sequential, C::ObjectModel, true),
            CfKind::GetStatic => row("getstatic", Sequential, C::ObjectModel, true),
            CfKind::PutStatic => row("putstatic", Sequential, C::ObjectModel, true),
            CfKind::Invoke => row("invoke", Call, C::Invoke, true),
            CfKind::InvokeDynamic => row("invokedynamic", Call, C::Invoke, true),
            CfKind::Pop => row("pop", Sequential, C::Stack, false),
            CfKind::Pop2 => row("pop2", Sequential, C::Stack, false),
            CfKind::Dup => row("dup", Sequential, C::Stack, false),
            CfKind::DupX1 => row("dup_x1", Sequential, C::Stack, false),
            CfKind::DupX2 => row("dup_x2", Sequential, C::Stack, false),
            CfKind::Dup2 => row("dup2", Sequential, C::Stack, false),
            CfKind::Dup2X1 => row("dup2_x1", Sequential, C::Stack, false),
            CfKind::Dup2X2 => row("dup2_x2", Sequential, C::Stack, false),
            CfKind::Swap => row("swap", Sequential, C::Stack, false),
            CfKind::MonitorEnter => row("monitorenter", Sequential, C::ObjectModel, true),
            CfKind::MonitorExit => row("monitorexit", Sequential, C::ObjectModel, true),
        }
    }
}

impl CfInstruction {
    /// The discriminant of this instruction.
    #[must_use]
    pub fn kind(&self) -> CfKind {
        CfKind::from(self)
    }

    /// The table row for this instruction's kind.
    #[must_use]
    pub fn semantics(&self) -> KindSemantics {
        self.kind().semantics()
    }

    /// Whether this instruction may transfer control abnormally.
    ///
    /// Integral division and remainder throw on a zero divisor; everything else follows the
    /// kind table.
    #[must_use]
    pub fn may_throw(&self) -> bool {
        match self {
            CfInstruction::Arith {
                op: ArithOp::Div | ArithOp::Rem,
                ty: ValueType::Int | ValueType::Long,
            } => true,
            _ => self.semantics().may_throw,
        }
    }

    /// Returns `true` if no instruction may follow in the same basic block.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        self.semantics().flow.ends_block()
    }

    /// Returns `true` if execution may continue with the next instruction in the stream.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        !matches!(
            self.semantics().flow,
            FlowType::UnconditionalBranch | FlowType::Switch | FlowType::Return | FlowType::Throw
        )
    }

    /// Every label this instruction can jump to, default target last for switches.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            CfInstruction::If { target, .. }
            | CfInstruction::IfCmp { target, .. }
            | CfInstruction::Goto(target) => vec![*target],
            CfInstruction::TableSwitch {
                targets, default, ..
            }
            | CfInstruction::LookupSwitch {
                targets, default, ..
            } => targets.iter().chain(std::iter::once(default)).copied().collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for CfInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.semantics().mnemonic;
        match self {
            CfInstruction::Label(label) => write!(f, "{label}:"),
            CfInstruction::ConstInt(v) => write!(f, "{mnemonic} {v}"),
            CfInstruction::ConstLong(v) => write!(f, "{mnemonic} {v}"),
            CfInstruction::ConstFloat(v) => write!(f, "{mnemonic} {v}"),
            CfInstruction::ConstDouble(v) => write!(f, "{mnemonic} {v}"),
            CfInstruction::ConstString(s) => write!(f, "{mnemonic} {s:?}"),
            CfInstruction::ConstClass(ty)
            | CfInstruction::New(ty)
            | CfInstruction::NewArray(ty)
            | CfInstruction::CheckCast(ty)
            | CfInstruction::InstanceOf(ty) => write!(f, "{mnemonic} {ty}"),
            CfInstruction::ConstMethodType(proto) => write!(f, "{mnemonic} {proto}"),
            CfInstruction::ConstMethodHandle(method) => write!(f, "{mnemonic} {method}"),
            CfInstruction::Load { ty, local } | CfInstruction::Store { ty, local } => {
                write!(f, "{mnemonic}_{ty} {local}")
            }
            CfInstruction::Iinc { local, delta } => write!(f, "{mnemonic} {local} {delta}"),
            CfInstruction::ArrayLoad(elem) | CfInstruction::ArrayStore(elem) => {
                write!(f, "{mnemonic} {elem:?}")
            }
            CfInstruction::Arith { op, ty } => write!(f, "{}_{ty}", op.name()),
            CfInstruction::Neg(ty) => write!(f, "{mnemonic}_{ty}"),
            CfInstruction::Convert { from, to } => write!(f, "{from}2{to}"),
            CfInstruction::Cmp { ty, bias } => write!(f, "{mnemonic}_{ty} {bias:?}"),
            CfInstruction::If { cond, ty, target } => {
                write!(f, "if{}_{ty} {target}", cond.name())
            }
            CfInstruction::IfCmp { cond, ty, target } => {
                write!(f, "if_cmp{}_{ty} {target}", cond.name())
            }
            CfInstruction::Goto(target) => write!(f, "{mnemonic} {target}"),
            CfInstruction::TableSwitch {
                low,
                targets,
                default,
            } => write!(f, "{mnemonic} {low} {targets:?} default {default}"),
            CfInstruction::LookupSwitch {
                keys,
                targets,
                default,
            } => write!(f, "{mnemonic} {keys:?} {targets:?} default {default}"),
            CfInstruction::Return(Some(ty)) => write!(f, "{mnemonic}_{ty}"),
            CfInstruction::MultiANewArray { ty, dims } => write!(f, "{mnemonic} {ty} {dims}"),
            CfInstruction::GetField(field)
            | CfInstruction::PutField(field)
            | CfInstruction::GetStatic(field)
            | CfInstruction::PutStatic(field) => write!(f, "{mnemonic} {field}"),
            CfInstruction::Invoke { kind, method } => write!(f, "{mnemonic}{kind} {method}"),
            CfInstruction::InvokeDynamic {
                name,
                proto,
                bootstrap,
            } => write!(f, "{mnemonic} {name}{proto} via {bootstrap}"),
            _ => f.write_str(mnemonic),
        }
    }
}
