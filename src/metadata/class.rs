//! Class, method and field definitions.
//!
//! These are the read-only records the optimizer consults through [`crate::metadata::AppView`].
//! Methods are stored behind `Arc` so a definition can be handed to worker threads without
//! copying its code.

use std::sync::Arc;

use bitflags::bitflags;

use crate::{
    assembly::MethodCode,
    metadata::{FieldRef, MethodRef, Proto, TypeRef},
};

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
    /// Access and property flags of a class.
    pub struct ClassFlags: u32 {
        /// Visible outside its package
        const PUBLIC = 0x0001;
        /// Cannot be subclassed
        const FINAL = 0x0010;
        /// Declared as an interface
        const INTERFACE = 0x0200;
        /// Cannot be instantiated
        const ABSTRACT = 0x0400;
        /// Compiler generated
        const SYNTHETIC = 0x1000;
        /// Provided by a library or the runtime, not by the program being optimized
        const LIBRARY = 0x8000_0000;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
    /// Access and property flags of a method.
    pub struct MethodFlags: u32 {
        /// Public access
        const PUBLIC = 0x0001;
        /// Private access
        const PRIVATE = 0x0002;
        /// Protected access
        const PROTECTED = 0x0004;
        /// No receiver
        const STATIC = 0x0008;
        /// Cannot be overridden
        const FINAL = 0x0010;
        /// Holds the receiver's monitor for the duration of the call
        const SYNCHRONIZED = 0x0020;
        /// Compiler generated forwarding method
        const BRIDGE = 0x0040;
        /// Variable arity
        const VARARGS = 0x0080;
        /// Implemented outside the bytecode
        const NATIVE = 0x0100;
        /// No implementation
        const ABSTRACT = 0x0400;
        /// Compiler generated
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    #[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
    /// Access and property flags of a field.
    pub struct FieldFlags: u32 {
        /// Public access
        const PUBLIC = 0x0001;
        /// Private access
        const PRIVATE = 0x0002;
        /// Protected access
        const PROTECTED = 0x0004;
        /// Class-level field
        const STATIC = 0x0008;
        /// Assigned once
        const FINAL = 0x0010;
        /// Not cached across threads
        const VOLATILE = 0x0040;
    }
}

/// A field declared by a class.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Identity of the field
    pub reference: FieldRef,
    /// Access flags
    pub flags: FieldFlags,
}

impl FieldDefinition {
    /// Returns `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC)
    }
}

/// A method declared by a class, with its stack-form body if it has one.
#[derive(Debug, Clone)]
pub struct MethodDefinition {
    /// Identity of the method
    pub reference: MethodRef,
    /// Access flags
    pub flags: MethodFlags,
    /// The body, `None` for abstract, native and library methods
    pub code: Option<MethodCode>,
}

impl MethodDefinition {
    /// Creates a method definition.
    #[must_use]
    pub fn new(reference: MethodRef, flags: MethodFlags, code: Option<MethodCode>) -> Self {
        MethodDefinition {
            reference,
            flags,
            code,
        }
    }

    /// No receiver.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Declared abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodFlags::ABSTRACT)
    }

    /// Implemented natively.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.flags.contains(MethodFlags::NATIVE)
    }

    /// Compiler-generated forwarding method.
    #[must_use]
    pub fn is_bridge(&self) -> bool {
        self.flags.contains(MethodFlags::BRIDGE)
    }

    /// Declared synchronized.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.flags.contains(MethodFlags::SYNCHRONIZED)
    }

    /// Instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.reference.is_constructor()
    }
}

/// A class or interface of the program graph.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    /// The type this class defines
    pub ty: TypeRef,
    /// Access flags
    pub flags: ClassFlags,
    /// Direct superclass, `None` only for the root type
    pub superclass: Option<TypeRef>,
    /// Directly implemented interfaces
    pub interfaces: Vec<TypeRef>,
    /// Declared fields
    pub fields: Vec<FieldDefinition>,
    /// Declared methods
    pub methods: Vec<Arc<MethodDefinition>>,
}

impl ClassDefinition {
    /// Declared as an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(ClassFlags::INTERFACE)
    }

    /// Declared abstract.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(ClassFlags::ABSTRACT)
    }

    /// Provided by a library rather than by the program.
    #[must_use]
    pub fn is_library(&self) -> bool {
        self.flags.contains(ClassFlags::LIBRARY)
    }

    /// Finds a field declared on exactly this class.
    #[must_use]
    pub fn lookup_field(&self, field: &FieldRef) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.reference == *field)
    }

    /// Finds a method declared on exactly this class.
    #[must_use]
    pub fn lookup_method(&self, method: &MethodRef) -> Option<&Arc<MethodDefinition>> {
        self.methods.iter().find(|m| m.reference == *method)
    }

    /// Finds a concrete instance method with the given signature declared on this class.
    #[must_use]
    pub fn lookup_virtual(&self, name: &str, proto: &Proto) -> Option<&Arc<MethodDefinition>> {
        self.methods.iter().find(|m| {
            &*m.reference.name == name
                && m.reference.proto == *proto
                && !m.is_static()
                && !m.is_abstract()
                && !m.is_constructor()
        })
    }

    /// Instance fields, in declaration order.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    /// Declares `void finalize()`.
    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.methods.iter().any(|m| {
            &*m.reference.name == "finalize"
                && m.reference.proto.params.is_empty()
                && m.reference.proto.ret.is_void()
                && !m.is_static()
        })
    }

    /// Declares a static initializer.
    #[must_use]
    pub fn has_class_initializer(&self) -> bool {
        self.methods.iter().any(|m| m.reference.is_class_initializer())
    }
}

/// Fluent construction of [`ClassDefinition`]s.
///
/// The superclass defaults to the root type.
///
/// ```rust,ignore
/// let class = ClassBuilder::new(TypeRef::class("L"))
///     .field("x", TypeRef::int(), FieldFlags::FINAL)
///     .method(getter)
///     .build();
/// ```
pub struct ClassBuilder {
    class: ClassDefinition,
}

impl ClassBuilder {
    /// Starts a public class extending the root type.
    #[must_use]
    pub fn new(ty: TypeRef) -> Self {
        ClassBuilder {
            class: ClassDefinition {
                ty,
                flags: ClassFlags::PUBLIC,
                superclass: Some(TypeRef::object()),
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
            },
        }
    }

    /// Replaces the class flags.
    #[must_use]
    pub fn flags(mut self, flags: ClassFlags) -> Self {
        self.class.flags = flags;
        self
    }

    /// Sets the superclass.
    #[must_use]
    pub fn superclass(mut self, superclass: TypeRef) -> Self {
        self.class.superclass = Some(superclass);
        self
    }

    /// Removes the superclass (only meaningful for the root type).
    #[must_use]
    pub fn no_superclass(mut self) -> Self {
        self.class.superclass = None;
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn interface(mut self, interface: TypeRef) -> Self {
        self.class.interfaces.push(interface);
        self
    }

    /// Declares a field on this class.
    #[must_use]
    pub fn field(mut self, name: &str, ty: TypeRef, flags: FieldFlags) -> Self {
        let reference = FieldRef::new(self.class.ty.clone(), name, ty);
        self.class.fields.push(FieldDefinition { reference, flags });
        self
    }

    /// Declares a method on this class.
    #[must_use]
    pub fn method(mut self, method: MethodDefinition) -> Self {
        self.class.methods.push(Arc::new(method));
        self
    }

    /// Finishes the class.
    #[must_use]
    pub fn build(self) -> ClassDefinition {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn void_proto() -> Proto {
        Proto::new(TypeRef::void(), vec![])
    }

    #[test]
    fn test_builder_defaults() {
        let class = ClassBuilder::new(TypeRef::class("A")).build();
        assert_eq!(class.superclass, Some(TypeRef::object()));
        assert!(!class.is_abstract());
        assert!(!class.is_library());
        assert!(!class.has_finalizer());
    }

    #[test]
    fn test_lookup_field_exact_holder() {
        let class = ClassBuilder::new(TypeRef::class("A"))
            .field("x", TypeRef::int(), FieldFlags::empty())
            .field("s", TypeRef::int(), FieldFlags::STATIC)
            .build();
        let x = FieldRef::new(TypeRef::class("A"), "x", TypeRef::int());
        let foreign = FieldRef::new(TypeRef::class("B"), "x", TypeRef::int());
        assert!(class.lookup_field(&x).is_some());
        assert!(class.lookup_field(&foreign).is_none());
        assert_eq!(class.instance_fields().count(), 1);
    }

    #[test]
    fn test_finalizer_and_clinit() {
        let ty = TypeRef::class("A");
        let class = ClassBuilder::new(ty.clone())
            .method(MethodDefinition::new(
                MethodRef::new(ty.clone(), "finalize", void_proto()),
                MethodFlags::PROTECTED,
                None,
            ))
            .method(MethodDefinition::new(
                MethodRef::new(ty, "<clinit>", void_proto()),
                MethodFlags::STATIC,
                None,
            ))
            .build();
        assert!(class.has_finalizer());
        assert!(class.has_class_initializer());
    }

    #[test]
    fn test_lookup_virtual_skips_static_and_abstract() {
        let ty = TypeRef::class("A");
        let class = ClassBuilder::new(ty.clone())
            .method(MethodDefinition::new(
                MethodRef::new(ty.clone(), "run", void_proto()),
                MethodFlags::STATIC,
                None,
            ))
            .method(MethodDefinition::new(
                MethodRef::new(ty, "stop", void_proto()),
                MethodFlags::ABSTRACT,
                None,
            ))
            .build();
        assert!(class.lookup_virtual("run", &void_proto()).is_none());
        assert!(class.lookup_virtual("stop", &void_proto()).is_none());
    }
}
