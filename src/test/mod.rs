//! Shared factories for unit tests.
//!
//! The central fixture is the class `L`:
//!
//! ```text
//! final class L {
//!     final int x;
//!     L(int x) { super(); this.x = x; }
//!     int getX() { return x; }
//! }
//! ```
//!
//! and a static caller `Caller.run()` computing `new L(1).getX()`, optionally also handing
//! the instance to `Sink.take(Object)`.

use crate::{
    assembly::{CodeBuilder, MethodCode},
    metadata::{
        ClassBuilder, ClassDefinition, ClassFlags, FieldFlags, FieldRef, MethodDefinition,
        MethodFlags, MethodRef, Program, Proto, TypeRef, CONSTRUCTOR_NAME,
    },
};

pub fn l_type() -> TypeRef {
    TypeRef::class("L")
}

pub fn x_field() -> FieldRef {
    FieldRef::new(l_type(), "x", TypeRef::int())
}

pub fn object_constructor() -> MethodRef {
    MethodRef::new(
        TypeRef::object(),
        CONSTRUCTOR_NAME,
        Proto::new(TypeRef::void(), vec![]),
    )
}

pub fn l_constructor() -> MethodRef {
    MethodRef::new(
        l_type(),
        CONSTRUCTOR_NAME,
        Proto::new(TypeRef::void(), vec![TypeRef::int()]),
    )
}

pub fn get_x() -> MethodRef {
    MethodRef::new(l_type(), "getX", Proto::new(TypeRef::int(), vec![]))
}

/// `static void Sink.take(Object)`, a call the instance escapes into.
pub fn sink_method() -> MethodRef {
    MethodRef::new(
        TypeRef::class("Sink"),
        "take",
        Proto::new(TypeRef::void(), vec![TypeRef::object()]),
    )
}

pub fn caller_method() -> MethodRef {
    MethodRef::new(
        TypeRef::class("Caller"),
        "run",
        Proto::new(TypeRef::int(), vec![]),
    )
}

pub fn l_class() -> ClassDefinition {
    l_class_with(&[], Vec::new())
}

/// `L` with additional instance fields and methods.
pub fn l_class_with(fields: &[(&str, TypeRef)], methods: Vec<MethodDefinition>) -> ClassDefinition {
    let constructor = CodeBuilder::new(2, 2)
        .aload(0)
        .invoke_special(object_constructor())
        .aload(0)
        .iload(1)
        .put_field(x_field())
        .vreturn()
        .build();
    let getter = CodeBuilder::new(1, 1)
        .aload(0)
        .get_field(x_field())
        .ireturn()
        .build();

    let mut class = ClassBuilder::new(l_type())
        .flags(ClassFlags::PUBLIC | ClassFlags::FINAL)
        .field("x", TypeRef::int(), FieldFlags::FINAL)
        .method(MethodDefinition::new(
            l_constructor(),
            MethodFlags::PUBLIC,
            Some(constructor),
        ))
        .method(MethodDefinition::new(
            get_x(),
            MethodFlags::PUBLIC,
            Some(getter),
        ));
    for (name, ty) in fields {
        class = class.field(name, ty.clone(), FieldFlags::empty());
    }
    for method in methods {
        class = class.method(method);
    }
    class.build()
}

/// A program holding only `L`.
pub fn l_program() -> Program {
    let program = Program::new();
    program.add_class(l_class());
    program
}

/// A program holding only [`l_class_with`].
pub fn l_program_with(fields: &[(&str, TypeRef)], methods: Vec<MethodDefinition>) -> Program {
    let program = Program::new();
    program.add_class(l_class_with(fields, methods));
    program
}

/// `static int Caller.run()` with the given body.
pub fn static_caller(code: MethodCode) -> MethodDefinition {
    MethodDefinition::new(caller_method(), MethodFlags::STATIC, Some(code))
}

/// `return new L(1).getX();`, with `Sink.take(l)` in between when `escape` is set.
pub fn l_caller(escape: bool) -> MethodDefinition {
    let code = if escape {
        CodeBuilder::new(3, 1)
            .new_instance(l_type())
            .dup()
            .iconst(1)
            .invoke_special(l_constructor())
            .astore(0)
            .aload(0)
            .invoke_static(sink_method())
            .aload(0)
            .invoke_virtual(get_x())
            .ireturn()
            .build()
    } else {
        CodeBuilder::new(3, 0)
            .new_instance(l_type())
            .dup()
            .iconst(1)
            .invoke_special(l_constructor())
            .invoke_virtual(get_x())
            .ireturn()
            .build()
    };
    static_caller(code)
}
