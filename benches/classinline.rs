#![allow(unused)]
extern crate cfopt;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cfopt::prelude::*;
use std::{hint::black_box, sync::Arc};

fn point_type() -> TypeRef {
    TypeRef::class("Point")
}

fn x_field() -> FieldRef {
    FieldRef::new(point_type(), "x", TypeRef::int())
}

fn constructor() -> MethodRef {
    MethodRef::new(
        point_type(),
        "<init>",
        Proto::new(TypeRef::void(), vec![TypeRef::int()]),
    )
}

fn get_x() -> MethodRef {
    MethodRef::new(point_type(), "getX", Proto::new(TypeRef::int(), vec![]))
}

/// A program with `Point` and `callers` static methods, each computing
/// `new Point(i).getX()` `allocations` times and summing the results.
fn build_program(callers: usize, allocations: usize) -> Arc<Program> {
    let object_init = MethodRef::new(
        TypeRef::object(),
        "<init>",
        Proto::new(TypeRef::void(), vec![]),
    );
    let program = Program::new();
    program.add_class(
        ClassBuilder::new(point_type())
            .flags(ClassFlags::PUBLIC | ClassFlags::FINAL)
            .field("x", TypeRef::int(), FieldFlags::empty())
            .method(MethodDefinition::new(
                constructor(),
                MethodFlags::PUBLIC,
                Some(
                    CodeBuilder::new(2, 2)
                        .aload(0)
                        .invoke_special(object_init)
                        .aload(0)
                        .iload(1)
                        .put_field(x_field())
                        .vreturn()
                        .build(),
                ),
            ))
            .method(MethodDefinition::new(
                get_x(),
                MethodFlags::PUBLIC,
                Some(
                    CodeBuilder::new(1, 1)
                        .aload(0)
                        .get_field(x_field())
                        .ireturn()
                        .build(),
                ),
            ))
            .build(),
    );

    let mut callers_class = ClassBuilder::new(TypeRef::class("Callers"));
    for c in 0..callers {
        let mut code = CodeBuilder::new(4, 0).iconst(0);
        for i in 0..allocations {
            code = code
                .new_instance(point_type())
                .dup()
                .iconst(i as i32)
                .invoke_special(constructor())
                .invoke_virtual(get_x())
                .iadd();
        }
        let method = MethodRef::new(
            TypeRef::class("Callers"),
            &format!("run{c}"),
            Proto::new(TypeRef::int(), vec![]),
        );
        callers_class = callers_class.method(MethodDefinition::new(
            method,
            MethodFlags::STATIC,
            Some(code.ireturn().build()),
        ));
    }
    program.add_class(callers_class.build());
    Arc::new(program)
}

/// Benchmark lifting alone against lifting plus class inlining.
fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for &(callers, allocations) in &[(1, 4), (16, 16), (64, 32)] {
        let program = build_program(callers, allocations);
        group.throughput(Throughput::Elements((callers * allocations) as u64));

        let label = format!("{callers}x{allocations}");
        group.bench_with_input(BenchmarkId::new("lift_only", &label), &program, |b, p| {
            let compiler = Compiler::new(CompilerConfig::conservative());
            b.iter(|| black_box(compiler.compile_program(black_box(p.clone())).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("class_inlining", &label), &program, |b, p| {
            let compiler = Compiler::default();
            b.iter(|| black_box(compiler.compile_program(black_box(p.clone())).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
