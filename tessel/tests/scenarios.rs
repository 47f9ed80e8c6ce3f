use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread;

use tessel::number::{number_to_string, string_to_number};
use tessel::{
    ActivationRecord, CompileOptions, ContextCreateInfo, Error, ExecutionContext, LanguageVersion,
    Unwind, Value,
};

fn context() -> ExecutionContext {
    ExecutionContext::new(ContextCreateInfo::default())
}

fn context_with(compile: CompileOptions) -> ExecutionContext {
    ExecutionContext::new(ContextCreateInfo {
        compile,
        ..ContextCreateInfo::default()
    })
}

fn suspended(result: Result<Value, Unwind>) -> tessel::Suspension {
    match result {
        Err(Unwind::Suspended(suspension)) => suspension,
        other => panic!("expected a suspension, got {other:?}"),
    }
}

#[test]
fn arguments_writes_are_seen_through_parameters() {
    let mut ctx = context();
    let unit = ctx
        .compile("function f(a, b) { arguments[0] = 9; return a; }", "alias.js")
        .unwrap();
    let f = unit.functions[0].clone();
    let scope = ctx.global_scope();
    let value = ctx
        .invoke(&f, Value::Undefined, scope, &[Value::Number(1.0), Value::Number(2.0)])
        .unwrap();
    assert_eq!(value, Value::Number(9.0));
}

#[test]
fn parameter_writes_are_seen_through_arguments() {
    let mut ctx = context();
    let value = ctx
        .evaluate("function f(a, b) { b = 'x'; return arguments[1] + arguments[2] + arguments.length }\nf(1, 2, 3)")
        .unwrap();
    assert_eq!(value, Value::from("x33"));
}

#[test]
fn escaped_arguments_keep_their_values() {
    let mut ctx = context();
    let value = ctx
        .evaluate("function f(a) { return arguments }\nvar args = f(1, 2)\nargs[0] + args[1] + args.length")
        .unwrap();
    assert_eq!(value, Value::Number(5.0));
}

#[test]
fn point_one_prints_shortest() {
    let mut ctx = context();
    let value = ctx
        .evaluate("function g() { return (0.1).toString(); }\ng()")
        .unwrap();
    assert_eq!(value, Value::from("0.1"));
    assert_eq!(ctx.evaluate("String(0.1 + 0.2)").unwrap(), Value::from("0.30000000000000004"));
}

#[test]
fn caller_chain_matches_call_order_and_is_released() {
    let mut ctx = context_with(CompileOptions {
        force_activation: true,
        ..CompileOptions::default()
    });
    let names = Rc::new(RefCell::new(Vec::new()));
    let weak: Rc<RefCell<Vec<Weak<ActivationRecord>>>> = Rc::new(RefCell::new(Vec::new()));
    let (names_sink, weak_sink) = (names.clone(), weak.clone());
    ctx.define_native("probe", 0, move |ctx, _, _| {
        let mut depth = 0;
        while let Some(activation) = ctx.activation_at(depth) {
            names_sink.borrow_mut().push(activation.name().to_string());
            weak_sink.borrow_mut().push(Rc::downgrade(&activation));
            depth += 1;
        }
        Ok(Value::Number(ctx.frame_count() as f64))
    });

    let count = ctx
        .evaluate(
            "function one() { return two() }\n\
             function two() { return three() }\n\
             function three() { return probe() }\n\
             one()",
        )
        .unwrap();
    assert_eq!(count, Value::Number(3.0));
    assert_eq!(*names.borrow(), ["three", "two", "one"]);
    assert!(weak.borrow().iter().all(|w| w.upgrade().is_none()));
    assert!(ctx.current_activation().is_none());
}

#[test]
fn legacy_versions_expose_arguments_caller() {
    let source = "function inner() { return arguments.caller[0] }\n\
                  function outer(x) { return inner() }\n\
                  outer(42)";
    let mut legacy = context_with(CompileOptions {
        language_version: LanguageVersion::V1_2,
        force_activation: true,
        ..CompileOptions::default()
    });
    assert_eq!(legacy.evaluate(source).unwrap(), Value::Number(42.0));

    let mut modern = context_with(CompileOptions {
        force_activation: true,
        ..CompileOptions::default()
    });
    let source = "function inner() { return typeof arguments.caller }\ninner()";
    assert_eq!(modern.evaluate(source).unwrap(), Value::from("undefined"));
}

#[test]
fn overriding_arguments_caller_sticks() {
    let mut ctx = context_with(CompileOptions {
        language_version: LanguageVersion::V1_3,
        force_activation: true,
        ..CompileOptions::default()
    });
    let value = ctx
        .evaluate(
            "function inner() { arguments.caller = 7; delete arguments.caller; return typeof arguments.caller }\n\
             function outer() { return inner() }\n\
             outer()",
        )
        .unwrap();
    assert_eq!(value, Value::from("undefined"));
}

#[test]
fn resume_tokens_can_be_resumed_repeatedly() {
    let mut ctx = context();
    ctx.evaluate("function gen() { var x = yield 1; var y = yield x + 1; return x + y }")
        .unwrap();
    let gen_fn = ctx.get_global("gen").unwrap();

    let first = suspended(ctx.call(&gen_fn, Value::Undefined, &[]));
    assert_eq!(first.value, Value::Number(1.0));

    let second = suspended(ctx.resume(&first.token, Value::Number(10.0)));
    assert_eq!(second.value, Value::Number(11.0));
    assert_eq!(second.token.unit_name(), Some("gen"));

    assert_eq!(ctx.resume(&second.token, Value::Number(5.0)).unwrap(), Value::Number(15.0));
    assert_eq!(ctx.resume(&second.token, Value::Number(6.0)).unwrap(), Value::Number(16.0));

    let again = suspended(ctx.resume(&first.token, Value::Number(20.0)));
    assert_eq!(again.value, Value::Number(21.0));
}

#[test]
fn resumptions_share_activation_records() {
    let mut ctx = context();
    ctx.evaluate(
        "function counter() { var n = 0; var inc = function () { n = n + 1 }; yield n; inc(); return n }",
    )
    .unwrap();
    let counter = ctx.get_global("counter").unwrap();
    let paused = suspended(ctx.call(&counter, Value::Undefined, &[]));
    assert_eq!(paused.value, Value::Number(0.0));
    assert_eq!(ctx.resume(&paused.token, Value::Undefined).unwrap(), Value::Number(1.0));
    assert_eq!(ctx.resume(&paused.token, Value::Undefined).unwrap(), Value::Number(2.0));
}

#[test]
fn suspension_unwinds_through_nested_calls() {
    let mut ctx = context();
    ctx.evaluate("function inner() { return yield 'ask' }\nfunction outer() { return 'got ' + inner() }")
        .unwrap();
    let outer = ctx.get_global("outer").unwrap();
    let paused = suspended(ctx.call(&outer, Value::Undefined, &[]));
    assert_eq!(paused.value, Value::from("ask"));
    assert_eq!(paused.token.depth(), 2);
    assert_eq!(ctx.resume(&paused.token, Value::from("answer")).unwrap(), Value::from("got answer"));
}

#[test]
fn runaway_recursion_is_a_stack_overflow() {
    let mut ctx = ExecutionContext::new(ContextCreateInfo {
        max_call_depth: 50,
        ..ContextCreateInfo::default()
    });
    let err = ctx.evaluate("function r(n) { return r(n + 1) }\nr(0)").unwrap_err();
    assert!(matches!(err, Error::Unwind(Unwind::StackOverflow { limit: 50 })));

    // Not catchable by scripts.
    let err = ctx
        .evaluate("var caught = false\ntry { r(0) } catch (e) { caught = true }")
        .unwrap_err();
    assert!(matches!(err, Error::Unwind(Unwind::StackOverflow { .. })));
    assert_eq!(ctx.get_global("caught"), Some(Value::Bool(false)));

    assert_eq!(ctx.evaluate("1 + 1").unwrap(), Value::Number(2.0));
}

#[test]
fn exceptions_unwind_to_the_innermost_handler() {
    let mut ctx = context();
    let value = ctx
        .evaluate(
            "var log = ''\n\
             function thrower(v) { throw v }\n\
             function middle() {\n\
               try { thrower('a') } catch (e) { log = log + e; thrower('b') }\n\
             }\n\
             try { middle() } catch (e) { log = log + e }\n\
             try { try { thrower('c') } catch (e) { log = log + e } } catch (e) { log = log + 'x' }\n\
             log",
        )
        .unwrap();
    assert_eq!(value, Value::from("abc"));
}

#[test]
fn uncaught_errors_report_file_and_line() {
    let mut ctx = context();
    let unit = ctx
        .compile("var a = 1\nfunction f() {\n  return a.b.c\n}\nf()", "report.js")
        .unwrap();
    let err = match ctx.execute(&unit) {
        Err(Unwind::Thrown(err)) => err,
        other => panic!("expected a thrown error, got {other:?}"),
    };
    assert_eq!(err.unit, "report.js");
    assert_eq!(err.line, Some(3));
    let text = err.to_string();
    assert!(text.starts_with("TypeError: "), "{text}");
    assert!(text.contains("(report.js:3)"), "{text}");
    assert!(text.ends_with("return a.b.c"), "{text}");
}

#[test]
fn breakpoints_report_line_and_depth() {
    let mut ctx = context();
    let unit = ctx
        .compile("var x = 1\nfunction f() {\n  return x + 1\n}\nx = f()\nx", "dbg.js")
        .unwrap();
    let hits = Rc::new(RefCell::new(Vec::new()));
    let sink = hits.clone();
    ctx.set_debug_hook(move |event| {
        sink.borrow_mut().push((event.unit_name().to_string(), event.line, event.frame_count));
    });

    assert_eq!(unit.set_breakpoint_recursive(3, true), 1);
    assert!(unit.set_breakpoint(5, true));
    assert_eq!(ctx.execute(&unit).unwrap(), Value::Number(2.0));
    assert_eq!(
        *hits.borrow(),
        [("dbg.js".to_string(), 5, 1), ("f".to_string(), 3, 2)]
    );

    unit.set_breakpoint_recursive(3, false);
    unit.set_breakpoint(5, false);
    hits.borrow_mut().clear();
    ctx.execute(&unit).unwrap();
    assert!(hits.borrow().is_empty());
}

#[test]
fn compiled_units_are_shared_across_threads() {
    let unit = tessel::compiler::compile(
        "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2) }\nfib(15)",
        &CompileOptions::default(),
    )
    .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let unit = Arc::clone(&unit);
            thread::spawn(move || {
                let mut ctx = ExecutionContext::new(ContextCreateInfo::default());
                match ctx.execute(&unit) {
                    Ok(Value::Number(n)) => n,
                    other => panic!("unexpected result {other:?}"),
                }
            })
        })
        .collect();
    // Toggling markers while other threads execute the same unit.
    unit.set_breakpoint(2, true);
    unit.set_breakpoint(2, false);

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 610.0);
    }
}

#[test]
fn numbers_round_trip_through_strings() {
    let mut samples = vec![
        0.0,
        -0.0,
        0.1,
        0.2 + 0.1,
        1.0 / 3.0,
        5e-324,
        2.2250738585072014e-308,
        2.225073858507201e-308,
        f64::MAX,
        f64::MIN_POSITIVE,
        9007199254740993.0,
        2f64.powi(53) + 2.0,
        123456789012345680.0,
        1e21,
        1e-7,
        123e-20,
    ];
    for exp in [-1022, -500, -1, 0, 1, 52, 53, 500, 1023] {
        let p = 2f64.powi(exp);
        samples.extend([p, f64::from_bits(p.to_bits() - 1), f64::from_bits(p.to_bits() + 1)]);
    }
    for d in samples {
        let text = number_to_string(d);
        let back = string_to_number(&text);
        if d == 0.0 {
            assert_eq!(text, "0");
        } else {
            assert_eq!(back.to_bits(), d.to_bits(), "{d:e} -> {text}");
        }
    }
}
