//! Constant operands of the SSA IR.

use std::{fmt, sync::Arc};

use crate::metadata::{MethodRef, Proto, TypeRef, ValueType};

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// The null reference
    Null,
    /// 32-bit integer (also booleans, bytes, chars, shorts)
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// String literal
    String(Arc<str>),
    /// Class literal
    Class(TypeRef),
    /// Method type literal
    MethodType(Proto),
    /// Method handle literal
    MethodHandle(MethodRef),
}

impl ConstValue {
    /// The zero value a freshly allocated field of type `ty` holds.
    #[must_use]
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::Object => ConstValue::Null,
            ValueType::Int => ConstValue::Int(0),
            ValueType::Long => ConstValue::Long(0),
            ValueType::Float => ConstValue::Float(0.0),
            ValueType::Double => ConstValue::Double(0.0),
        }
    }

    /// Semantic type of the constant.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            ConstValue::Int(_) => ValueType::Int,
            ConstValue::Long(_) => ValueType::Long,
            ConstValue::Float(_) => ValueType::Float,
            ConstValue::Double(_) => ValueType::Double,
            ConstValue::Null
            | ConstValue::String(_)
            | ConstValue::Class(_)
            | ConstValue::MethodType(_)
            | ConstValue::MethodHandle(_) => ValueType::Object,
        }
    }

    /// Loading the constant may fail at runtime (resolution of pooled constants).
    #[must_use]
    pub fn may_throw(&self) -> bool {
        matches!(
            self,
            ConstValue::String(_)
                | ConstValue::Class(_)
                | ConstValue::MethodType(_)
                | ConstValue::MethodHandle(_)
        )
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => f.write_str("null"),
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Long(v) => write!(f, "{v}L"),
            ConstValue::Float(v) => write!(f, "{v}f"),
            ConstValue::Double(v) => write!(f, "{v}d"),
            ConstValue::String(s) => write!(f, "{s:?}"),
            ConstValue::Class(ty) => write!(f, "{ty}.class"),
            ConstValue::MethodType(proto) => write!(f, "methodtype {proto}"),
            ConstValue::MethodHandle(method) => write!(f, "methodhandle {method}"),
        }
    }
}
