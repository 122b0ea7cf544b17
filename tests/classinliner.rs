//! Integration tests for class inlining through the public compiler API.
//!
//! Every test builds a small program around the class
//!
//! ```text
//! final class L {
//!     int x;
//!     L(int x) { super(); this.x = x; }
//!     int getX() { return x; }
//! }
//! ```
//!
//! compiles it and inspects the SSA of the calling method.

use std::sync::Arc;

use cfopt::{analysis::ValueDef, prelude::*};

fn l_type() -> TypeRef {
    TypeRef::class("L")
}

fn x_field() -> FieldRef {
    FieldRef::new(l_type(), "x", TypeRef::int())
}

fn l_constructor() -> MethodRef {
    MethodRef::new(
        l_type(),
        "<init>",
        Proto::new(TypeRef::void(), vec![TypeRef::int()]),
    )
}

fn get_x() -> MethodRef {
    MethodRef::new(l_type(), "getX", Proto::new(TypeRef::int(), vec![]))
}

fn l_class() -> ClassDefinition {
    let object_init = MethodRef::new(
        TypeRef::object(),
        "<init>",
        Proto::new(TypeRef::void(), vec![]),
    );
    let constructor = CodeBuilder::new(2, 2)
        .aload(0)
        .invoke_special(object_init)
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

    ClassBuilder::new(l_type())
        .flags(ClassFlags::PUBLIC | ClassFlags::FINAL)
        .field("x", TypeRef::int(), FieldFlags::empty())
        .method(MethodDefinition::new(
            l_constructor(),
            MethodFlags::PUBLIC,
            Some(constructor),
        ))
        .method(MethodDefinition::new(
            get_x(),
            MethodFlags::PUBLIC,
            Some(getter),
        ))
        .build()
}

/// A program holding `L` and a class `Caller` with the single static method `run(I)I`.
fn program_with(code: MethodCode) -> (Arc<Program>, MethodRef) {
    let run = MethodRef::new(
        TypeRef::class("Caller"),
        "run",
        Proto::new(TypeRef::int(), vec![TypeRef::int()]),
    );
    let program = Program::new();
    program.add_class(l_class());
    program.add_class(
        ClassBuilder::new(TypeRef::class("Caller"))
            .method(MethodDefinition::new(
                run.clone(),
                MethodFlags::PUBLIC | MethodFlags::STATIC,
                Some(code),
            ))
            .build(),
    );
    (Arc::new(program), run)
}

fn count_ops(ssa: &SsaFunction, pred: impl Fn(&SsaOp) -> bool) -> usize {
    ssa.instructions().filter(|i| pred(i.op())).count()
}

fn returned_value(ssa: &SsaFunction) -> ValueId {
    ssa.instructions()
        .find_map(|i| match i.op() {
            SsaOp::Return { value } => *value,
            _ => None,
        })
        .expect("method returns a value")
}

fn log_rejections() -> CompilerConfig {
    CompilerConfig::default().with_class_inlining(ClassInliningConfig {
        log_rejections: true,
        ..ClassInliningConfig::default()
    })
}

#[test]
fn test_constructor_and_getter_fold_to_constant() -> Result<()> {
    // return new L(1).getX();
    let code = CodeBuilder::new(3, 1)
        .new_instance(l_type())
        .dup()
        .iconst(1)
        .invoke_special(l_constructor())
        .invoke_virtual(get_x())
        .ireturn()
        .build();
    let (program, run) = program_with(code);

    let result = Compiler::default().compile_program(program)?;
    let ssa = result.function(&run).expect("run was compiled");

    assert_eq!(count_ops(ssa, |op| matches!(op, SsaOp::NewInstance { .. })), 0);
    assert_eq!(count_ops(ssa, |op| matches!(op, SsaOp::Invoke { .. })), 0);
    assert_eq!(
        count_ops(ssa, |op| matches!(
            op,
            SsaOp::InstanceGet { .. } | SsaOp::InstancePut { .. }
        )),
        0
    );

    let ret = returned_value(ssa);
    let def = ssa.def_instruction(ret).expect("defined by an instruction");
    assert_eq!(def.op(), &SsaOp::Const(ConstValue::Int(1)));

    assert_eq!(result.stats.allocations_inlined, 1);
    assert_eq!(result.events.count_kind(EventKind::AllocationInlined), 1);
    assert!(verify(ssa).is_ok());
    Ok(())
}

#[test]
fn test_escaping_instance_is_left_unchanged() -> Result<()> {
    // L l = new L(1); Objects.requireNonNull(l); return l.getX();
    let require = MethodRef::new(
        TypeRef::class("Objects"),
        "requireNonNull",
        Proto::new(TypeRef::object(), vec![TypeRef::object()]),
    );
    let code = CodeBuilder::new(3, 2)
        .new_instance(l_type())
        .dup()
        .iconst(1)
        .invoke_special(l_constructor())
        .astore(1)
        .aload(1)
        .invoke_static(require)
        .pop()
        .aload(1)
        .invoke_virtual(get_x())
        .ireturn()
        .build();
    let (program, run) = program_with(code);

    let baseline = Compiler::new(
        CompilerConfig::default().with_class_inlining(ClassInliningConfig::disabled()),
    )
    .compile_program(program.clone())?;
    let result = Compiler::new(log_rejections()).compile_program(program)?;

    let ssa = result.function(&run).expect("run was compiled");
    assert_eq!(Some(ssa), baseline.function(&run));
    assert_eq!(count_ops(ssa, |op| matches!(op, SsaOp::NewInstance { .. })), 1);
    assert_eq!(result.stats.allocations_inlined, 0);

    let rejection = result
        .events
        .rejections()
        .next()
        .expect("rejection was logged");
    assert!(rejection.message.contains("passed as an argument"));
    Ok(())
}

#[test]
fn test_allocation_merged_by_phi_is_never_inlined() -> Result<()> {
    // L l = c == 0 ? new L(1) : new L(2); return l.getX();
    let other = Label(1);
    let join = Label(2);
    let code = CodeBuilder::new(3, 2)
        .iload(0)
        .if_zero(IfCond::Ne, other)
        .new_instance(l_type())
        .dup()
        .iconst(1)
        .invoke_special(l_constructor())
        .astore(1)
        .goto(join)
        .label(other)
        .new_instance(l_type())
        .dup()
        .iconst(2)
        .invoke_special(l_constructor())
        .astore(1)
        .label(join)
        .aload(1)
        .invoke_virtual(get_x())
        .ireturn()
        .build();
    let (program, run) = program_with(code);

    let result = Compiler::new(log_rejections()).compile_program(program)?;
    let ssa = result.function(&run).expect("run was compiled");

    assert_eq!(count_ops(ssa, |op| matches!(op, SsaOp::NewInstance { .. })), 2);
    assert!(ssa
        .instructions()
        .any(|i| matches!(i.op(), SsaOp::Invoke { method, .. } if *method == get_x())));
    assert_eq!(result.stats.allocations_inlined, 0);
    let rejections: Vec<_> = result.events.rejections().collect();
    assert!(rejections.len() >= 2);
    assert!(rejections.iter().all(|e| e.message.contains("phi")));
    Ok(())
}

#[test]
fn test_conditional_write_reconstructs_phi() -> Result<()> {
    // L l = new L(1); if (c != 0) l.x = 7; return l.x;
    let join = Label(1);
    let code = CodeBuilder::new(3, 2)
        .new_instance(l_type())
        .dup()
        .iconst(1)
        .invoke_special(l_constructor())
        .astore(1)
        .iload(0)
        .if_zero(IfCond::Eq, join)
        .aload(1)
        .iconst(7)
        .put_field(x_field())
        .label(join)
        .aload(1)
        .get_field(x_field())
        .ireturn()
        .build();
    let (program, run) = program_with(code);

    let result = Compiler::default().compile_program(program)?;
    let ssa = result.function(&run).expect("run was compiled");

    assert_eq!(count_ops(ssa, |op| matches!(op, SsaOp::NewInstance { .. })), 0);
    assert_eq!(
        count_ops(ssa, |op| matches!(
            op,
            SsaOp::InstanceGet { .. } | SsaOp::InstancePut { .. }
        )),
        0
    );

    let ret = returned_value(ssa);
    let ValueDef::Phi(phi) = ssa.value(ret).def() else {
        panic!("returned value should be a phi");
    };
    let incoming: Vec<ConstValue> = ssa
        .phi(phi)
        .operands()
        .iter()
        .filter_map(|&v| match ssa.def_instruction(v)?.op() {
            SsaOp::Const(c) => Some(c.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(incoming.len(), 2);
    assert!(incoming.contains(&ConstValue::Int(1)));
    assert!(incoming.contains(&ConstValue::Int(7)));
    assert!(verify(ssa).is_ok());
    Ok(())
}

#[test]
fn test_pinned_class_is_not_inlined() -> Result<()> {
    let code = CodeBuilder::new(3, 1)
        .new_instance(l_type())
        .dup()
        .iconst(1)
        .invoke_special(l_constructor())
        .invoke_virtual(get_x())
        .ireturn()
        .build();
    let (program, run) = program_with(code);
    program.pin(ProgramItem::Type(l_type()));

    let result = Compiler::new(log_rejections()).compile_program(program)?;
    let ssa = result.function(&run).expect("run was compiled");
    assert_eq!(count_ops(ssa, |op| matches!(op, SsaOp::NewInstance { .. })), 1);
    assert!(result
        .events
        .rejections()
        .any(|e| e.message.contains("pinned")));
    Ok(())
}
