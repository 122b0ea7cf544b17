//! Symbolic identities for types, prototypes, methods and fields.
//!
//! Identities are cheap to clone (reference-counted strings and slices) and compare by
//! value, so they can be used directly as keys of concurrent maps and lens layers.
//! Types are identified by their descriptor (`I`, `J`, `Lpkg/Name;`, `[I`, ...).

use std::{fmt, sync::Arc};

use strum::{Display, EnumCount, EnumIter};

/// Descriptor of the universal root type.
pub const OBJECT_DESCRIPTOR: &str = "Ljava/lang/Object;";

/// Name shared by all instance constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// Name of the static class initializer.
pub const CLASS_INITIALIZER_NAME: &str = "<clinit>";

/// The semantic type tag carried by every SSA value and typed stack instruction.
///
/// Sub-int primitives (`boolean`, `byte`, `char`, `short`) are represented as [`ValueType::Int`],
/// matching the computational types of the stack machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    /// A reference (including `null`)
    Object,
    /// A 32-bit integer
    Int,
    /// A 32-bit float
    Float,
    /// A 64-bit integer, occupies two stack and local slots
    Long,
    /// A 64-bit float, occupies two stack and local slots
    Double,
}

impl ValueType {
    /// Returns `true` for the two-slot types `long` and `double`.
    #[must_use]
    pub const fn is_wide(self) -> bool {
        matches!(self, ValueType::Long | ValueType::Double)
    }

    /// Number of stack words / local slots occupied by a value of this type.
    #[must_use]
    pub const fn slots(self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }
}

/// A type identity, expressed as a descriptor.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(Arc<str>);

impl TypeRef {
    /// Creates a type from its descriptor.
    #[must_use]
    pub fn new(descriptor: impl Into<Arc<str>>) -> Self {
        TypeRef(descriptor.into())
    }

    /// Creates a class type from its binary name (`pkg/Name` becomes `Lpkg/Name;`).
    #[must_use]
    pub fn class(binary_name: &str) -> Self {
        TypeRef(format!("L{binary_name};").into())
    }

    /// The universal root type.
    #[must_use]
    pub fn object() -> Self {
        TypeRef::new(OBJECT_DESCRIPTOR)
    }

    /// `void`
    #[must_use]
    pub fn void() -> Self {
        TypeRef::new("V")
    }

    /// `int`
    #[must_use]
    pub fn int() -> Self {
        TypeRef::new("I")
    }

    /// `long`
    #[must_use]
    pub fn long() -> Self {
        TypeRef::new("J")
    }

    /// `float`
    #[must_use]
    pub fn float() -> Self {
        TypeRef::new("F")
    }

    /// `double`
    #[must_use]
    pub fn double() -> Self {
        TypeRef::new("D")
    }

    /// `boolean`
    #[must_use]
    pub fn boolean() -> Self {
        TypeRef::new("Z")
    }

    /// The descriptor string.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.0
    }

    /// Returns `true` for `V`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        &*self.0 == "V"
    }

    /// Returns `true` for array types.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    /// Returns `true` for class and array types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.0.starts_with('L') || self.is_array()
    }

    /// Returns `true` for `J` and `D`.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(&*self.0, "J" | "D")
    }

    /// Computational type of values of this type, `None` for `void`.
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        match self.0.as_bytes().first() {
            Some(b'Z' | b'B' | b'C' | b'S' | b'I') => Some(ValueType::Int),
            Some(b'J') => Some(ValueType::Long),
            Some(b'F') => Some(ValueType::Float),
            Some(b'D') => Some(ValueType::Double),
            Some(b'L' | b'[') => Some(ValueType::Object),
            _ => None,
        }
    }

    /// Element type of an array type.
    #[must_use]
    pub fn element_type(&self) -> Option<TypeRef> {
        self.0.strip_prefix('[').map(TypeRef::new)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0)
    }
}

/// A method prototype: return type plus parameter types.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Proto {
    /// Return type, `V` for none
    pub ret: TypeRef,
    /// Declared parameters (without the receiver)
    pub params: Arc<[TypeRef]>,
}

impl Proto {
    /// Creates a prototype from its parts.
    #[must_use]
    pub fn new(ret: TypeRef, params: Vec<TypeRef>) -> Self {
        Proto {
            ret,
            params: params.into(),
        }
    }

    /// Parses a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the descriptor is not well formed.
    pub fn from_descriptor(descriptor: &str) -> crate::Result<Self> {
        let Some(rest) = descriptor.strip_prefix('(') else {
            return Err(malformed_error!("descriptor {} does not start with '('", descriptor));
        };
        let Some(close) = rest.find(')') else {
            return Err(malformed_error!("descriptor {} has no ')'", descriptor));
        };

        let mut params = Vec::new();
        let mut cursor = &rest[..close];
        while !cursor.is_empty() {
            let len = field_descriptor_len(cursor)
                .ok_or_else(|| malformed_error!("bad parameter in descriptor {}", descriptor))?;
            params.push(TypeRef::new(&cursor[..len]));
            cursor = &cursor[len..];
        }

        let ret = &rest[close + 1..];
        if ret != "V" && field_descriptor_len(ret) != Some(ret.len()) {
            return Err(malformed_error!("bad return type in descriptor {}", descriptor));
        }

        Ok(Proto::new(TypeRef::new(ret), params))
    }

    /// Number of local slots needed by the parameters (wide types count twice).
    #[must_use]
    pub fn parameter_slots(&self) -> usize {
        self.params
            .iter()
            .map(|p| if p.is_wide() { 2 } else { 1 })
            .sum()
    }
}

/// Length of the leading field descriptor in `s`, if any.
fn field_descriptor_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut dims = 0;
    while bytes.get(dims) == Some(&b'[') {
        dims += 1;
    }
    match bytes.get(dims)? {
        b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' => Some(dims + 1),
        b'L' => s[dims..].find(';').map(|end| dims + end + 1),
        _ => None,
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in self.params.iter() {
            write!(f, "{param}")?;
        }
        write!(f, "){}", self.ret)
    }
}

impl fmt::Debug for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proto({self})")
    }
}

/// A method identity: holder type, name and prototype.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    /// The declaring (or referenced) type
    pub holder: TypeRef,
    /// Simple name
    pub name: Arc<str>,
    /// Prototype
    pub proto: Proto,
}

impl MethodRef {
    /// Creates a method identity.
    #[must_use]
    pub fn new(holder: TypeRef, name: impl Into<Arc<str>>, proto: Proto) -> Self {
        MethodRef {
            holder,
            name: name.into(),
            proto,
        }
    }

    /// Returns `true` for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        &*self.name == CONSTRUCTOR_NAME
    }

    /// Returns `true` for the static class initializer.
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        &*self.name == CLASS_INITIALIZER_NAME
    }

    /// Number of call operands: the receiver (unless static) plus every declared parameter.
    #[must_use]
    pub fn argument_count(&self, is_static: bool) -> usize {
        self.proto.params.len() + usize::from(!is_static)
    }

    /// Returns the same name and prototype on a different holder.
    #[must_use]
    pub fn with_holder(&self, holder: TypeRef) -> Self {
        MethodRef {
            holder,
            name: self.name.clone(),
            proto: self.proto.clone(),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.holder, self.name, self.proto)
    }
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodRef({self})")
    }
}

/// A field identity: holder type, name and field type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    /// The declaring (or referenced) type
    pub holder: TypeRef,
    /// Simple name
    pub name: Arc<str>,
    /// Type of the field
    pub ty: TypeRef,
}

impl FieldRef {
    /// Creates a field identity.
    #[must_use]
    pub fn new(holder: TypeRef, name: impl Into<Arc<str>>, ty: TypeRef) -> Self {
        FieldRef {
            holder,
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}:{}", self.holder, self.name, self.ty)
    }
}

impl fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldRef({self})")
    }
}

/// The dispatch form of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
#[strum(serialize_all = "lowercase")]
pub enum InvokeKind {
    /// No receiver, statically bound
    Static,
    /// Virtual dispatch on a class type
    Virtual,
    /// Virtual dispatch on an interface type
    Interface,
    /// Direct (non-virtual) call: constructors, private and super calls
    Special,
}

impl InvokeKind {
    /// Returns `true` if the first operand of the call is a receiver.
    #[must_use]
    pub const fn has_receiver(self) -> bool {
        !matches!(self, InvokeKind::Static)
    }
}

/// Any item of the program graph that can be pinned (kept as-is) by an embedder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgramItem {
    /// A class or interface
    Type(TypeRef),
    /// A method
    Method(MethodRef),
    /// A field
    Field(FieldRef),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert_eq!(TypeRef::int().value_type(), Some(ValueType::Int));
        assert_eq!(TypeRef::boolean().value_type(), Some(ValueType::Int));
        assert_eq!(TypeRef::long().value_type(), Some(ValueType::Long));
        assert_eq!(TypeRef::object().value_type(), Some(ValueType::Object));
        assert_eq!(TypeRef::new("[I").value_type(), Some(ValueType::Object));
        assert_eq!(TypeRef::void().value_type(), None);
        assert!(ValueType::Double.is_wide());
        assert_eq!(ValueType::Long.slots(), 2);
        assert_eq!(ValueType::Object.to_string(), "object");
    }

    #[test]
    fn test_class_descriptor() {
        let ty = TypeRef::class("pkg/L");
        assert_eq!(ty.descriptor(), "Lpkg/L;");
        assert!(ty.is_reference());
        assert!(!ty.is_array());
        assert_eq!(TypeRef::new("[[J").element_type(), Some(TypeRef::new("[J")));
    }

    #[test]
    fn test_proto_from_descriptor() {
        let proto = Proto::from_descriptor("(IJ[Ljava/lang/String;)V").unwrap();
        assert_eq!(proto.params.len(), 3);
        assert_eq!(proto.params[2].descriptor(), "[Ljava/lang/String;");
        assert!(proto.ret.is_void());
        assert_eq!(proto.parameter_slots(), 4);
        assert_eq!(proto.to_string(), "(IJ[Ljava/lang/String;)V");
    }

    #[test]
    fn test_proto_rejects_garbage() {
        assert!(Proto::from_descriptor("I)V").is_err());
        assert!(Proto::from_descriptor("(I").is_err());
        assert!(Proto::from_descriptor("(Q)V").is_err());
        assert!(Proto::from_descriptor("(I)Lfoo").is_err());
    }

    #[test]
    fn test_method_ref() {
        let init = MethodRef::new(
            TypeRef::class("L"),
            CONSTRUCTOR_NAME,
            Proto::from_descriptor("(I)V").unwrap(),
        );
        assert!(init.is_constructor());
        assert_eq!(init.argument_count(false), 2);
        assert_eq!(init.to_string(), "LL;-><init>(I)V");
        assert_eq!(init.with_holder(TypeRef::object()).holder, TypeRef::object());
    }

    #[test]
    fn test_invoke_kind() {
        assert!(!InvokeKind::Static.has_receiver());
        assert!(InvokeKind::Special.has_receiver());
        assert_eq!(InvokeKind::Interface.to_string(), "interface");
    }
}
