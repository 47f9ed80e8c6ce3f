use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tessel::compiler::compile;
use tessel::number::{number_to_string, to_string_radix};
use tessel::{CompileOptions, ContextCreateInfo, ExecutionContext};

const FIB: &str = "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2) }\nfib(18)";

const LOOP: &str = "var sum = 0\nfor (var i = 0; i < 10000; i++) { sum = sum + i }\nsum";

const ARGUMENTS: &str = "function total() {\n\
                           var s = 0\n\
                           for (var i = 0; i < arguments.length; i++) { s = s + arguments[i] }\n\
                           return s\n\
                         }\n\
                         var acc = 0\n\
                         for (var j = 0; j < 500; j++) { acc = acc + total(1, 2, 3, 4, 5) }\n\
                         acc";

fn run_case(c: &mut Criterion, name: &str, src: &str, options: CompileOptions) {
    let unit = compile(src, &options).expect("compile");
    let mut ctx = ExecutionContext::new(ContextCreateInfo {
        compile: options.clone(),
        ..ContextCreateInfo::default()
    });
    let warmup = ctx.execute(&unit).expect("warmup");
    black_box(warmup);

    c.bench_function(&format!("{name}_execute"), |b| {
        b.iter(|| {
            let value = ctx.execute(&unit).expect("execute");
            black_box(value);
        })
    });

    c.bench_function(&format!("{name}_compile"), |b| {
        b.iter(|| black_box(compile(black_box(src), &options).expect("compile")))
    });
}

fn bench_interpreter(c: &mut Criterion) {
    run_case(c, "fib", FIB, CompileOptions::default());
    run_case(c, "loop", LOOP, CompileOptions::default());
    run_case(c, "arguments", ARGUMENTS, CompileOptions::default());
    run_case(
        c,
        "fib_forced_activation",
        FIB,
        CompileOptions {
            force_activation: true,
            ..CompileOptions::default()
        },
    );
}

fn bench_number_to_string(c: &mut Criterion) {
    let samples = [0.1, 1.0 / 3.0, 123456.789, 5e-324, 1.7976931348623157e308, 1e21];

    c.bench_function("number_to_string_shortest", |b| {
        b.iter(|| {
            for &d in &samples {
                black_box(number_to_string(black_box(d)));
            }
        })
    });

    c.bench_function("number_to_string_radix_16", |b| {
        b.iter(|| {
            for &d in &samples {
                black_box(to_string_radix(black_box(d), 16));
            }
        })
    });
}

criterion_group!(benches, bench_interpreter, bench_number_to_string);
criterion_main!(benches);
