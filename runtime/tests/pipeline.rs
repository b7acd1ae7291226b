//! End-to-end tests driving the full pipeline: source → compiler → VM, and
//! source → bundle → VM, through the embedding facade.

use std::sync::{Arc, Mutex};

use vellum_runtime::bundle;
use vellum_runtime::compiler::compile;
use vellum_runtime::error::Error;
use vellum_runtime::interpreter::{RuntimeError, RuntimeErrorKind, Vm};
use vellum_runtime::limits::ExecutionLimits;
use vellum_runtime::natives::{NativeError, NativeRegistry};
use vellum_runtime::value::Value;
use vellum_runtime::{Runtime, DEFAULT_ENTRY};

fn expect_runtime(err: Error) -> RuntimeError {
    match err {
        Error::Runtime(err) => err,
        other => panic!("expected a runtime error, got {other}"),
    }
}

/// Registry with a `log` native that records every message it sees.
fn logging_registry() -> (NativeRegistry, Arc<Mutex<Vec<String>>>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    let mut natives = NativeRegistry::new();
    natives.register_fn("log", 1, move |args| {
        sink.lock().expect("sink lock").push(args[0].as_string());
        Ok(Value::Null)
    });
    (natives, messages)
}

#[test]
fn string_concat_is_left_associative_with_int_coercion() {
    let (natives, messages) = logging_registry();
    let runtime = Runtime::new(natives);
    let result = runtime
        .run_source(
            "func main() { let a = 1; let b = 2; log(\"sum=\" + a + b) }",
            DEFAULT_ENTRY,
        )
        .expect("run");
    assert_eq!(result, Value::Null);
    assert_eq!(*messages.lock().expect("sink lock"), vec!["sum=12"]);
}

#[test]
fn labeled_parameters_forward_arguments() {
    let (natives, messages) = logging_registry();
    let runtime = Runtime::new(natives);
    let result = runtime
        .run_source(
            "func greet(_ name: String) { log(\"Hola \" + name) }\n\
             func main() { greet(\"Rafa\") }",
            DEFAULT_ENTRY,
        )
        .expect("run");
    assert_eq!(result, Value::Null);
    assert_eq!(*messages.lock().expect("sink lock"), vec!["Hola Rafa"]);
}

#[test]
fn conditional_takes_the_true_branch_once() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let mut natives = NativeRegistry::new();
    natives.register_fn("setText", 2, move |args| {
        sink.lock()
            .expect("sink lock")
            .push((args[0].as_string(), args[1].as_string()));
        Ok(Value::Null)
    });
    let runtime = Runtime::new(natives);
    runtime
        .run_source(
            "func main() { let x = \"Rafa\"\n\
               if x == \"Rafa\" { setText(id: \"t\", text: \"ok\") }\n\
               else { setText(id: \"t\", text: \"no\") } }",
            DEFAULT_ENTRY,
        )
        .expect("run");
    assert_eq!(
        *calls.lock().expect("sink lock"),
        vec![("t".to_string(), "ok".to_string())]
    );
}

#[test]
fn returns_the_sum_of_literals() {
    let runtime = Runtime::new(NativeRegistry::new());
    let result = runtime
        .run_source("func main() { return 1 + 2 }", DEFAULT_ENTRY)
        .expect("run");
    assert_eq!(result, Value::Int(3));
}

#[test]
fn unknown_native_reports_the_call_line() {
    let runtime = Runtime::new(NativeRegistry::new());
    let err = runtime
        .run_source("func main() {\n  unknown()\n}", DEFAULT_ENTRY)
        .unwrap_err();
    let err = expect_runtime(err);
    assert_eq!(
        err.kind,
        RuntimeErrorKind::UnknownNative("unknown".to_string())
    );
    assert_eq!(err.line, Some(2));
}

#[test]
fn empty_body_returns_null() {
    let runtime = Runtime::new(NativeRegistry::new());
    let result = runtime
        .run_source("func main() { }", DEFAULT_ENTRY)
        .expect("run");
    assert_eq!(result, Value::Null);
}

#[test]
fn false_condition_without_else_has_no_side_effect() {
    let (natives, messages) = logging_registry();
    let runtime = Runtime::new(natives);
    let result = runtime
        .run_source(
            "func main() { if 1 == 2 { log(\"unreachable\") } }",
            DEFAULT_ENTRY,
        )
        .expect("run");
    assert_eq!(result, Value::Null);
    assert!(messages.lock().expect("sink lock").is_empty());
}

#[test]
fn execution_is_deterministic_across_runs() {
    let source = "func twice(x: Int) { return x + x }\n\
                  func main() { log(\"a\")\n log(twice(4))\n log(\"b\")\n return twice(10) }";
    let mut results = Vec::new();
    let mut logs = Vec::new();
    for _ in 0..2 {
        let (natives, messages) = logging_registry();
        let runtime = Runtime::new(natives);
        results.push(runtime.run_source(source, DEFAULT_ENTRY).expect("run"));
        logs.push(messages.lock().expect("sink lock").clone());
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], Value::Int(20));
    assert_eq!(logs[0], logs[1]);
    assert_eq!(logs[0], vec!["a", "8", "b"]);
}

#[test]
fn cross_type_equality_is_false() {
    let runtime = Runtime::new(NativeRegistry::new());
    let result = runtime
        .run_source("func main() { return 1 == 1.0 }", DEFAULT_ENTRY)
        .expect("run");
    assert_eq!(result, Value::Bool(false));
}

#[test]
fn adding_bool_to_int_faults_with_a_line() {
    let runtime = Runtime::new(NativeRegistry::new());
    let err = runtime
        .run_source("func main() {\n  return 1 + true\n}", DEFAULT_ENTRY)
        .unwrap_err();
    let err = expect_runtime(err);
    assert_eq!(
        err.kind,
        RuntimeErrorKind::InvalidAdd {
            lhs: "int",
            rhs: "bool"
        }
    );
    assert_eq!(err.line, Some(2));
}

#[test]
fn script_function_arity_is_checked_at_the_call() {
    let runtime = Runtime::new(NativeRegistry::new());
    let err = runtime
        .run_source(
            "func pair(a: Int, b: Int) { return a + b }\nfunc main() { return pair(1) }",
            DEFAULT_ENTRY,
        )
        .unwrap_err();
    let err = expect_runtime(err);
    assert_eq!(
        err.kind,
        RuntimeErrorKind::ArityMismatch {
            name: "pair".to_string(),
            expected: 2,
            actual: 1,
        }
    );
}

#[test]
fn native_arity_is_checked_before_invocation() {
    let (natives, messages) = logging_registry();
    let runtime = Runtime::new(natives);
    let err = runtime
        .run_source("func main() { log(\"a\", \"b\") }", DEFAULT_ENTRY)
        .unwrap_err();
    let err = expect_runtime(err);
    assert!(matches!(err.kind, RuntimeErrorKind::ArityMismatch { .. }));
    assert!(messages.lock().expect("sink lock").is_empty());
}

#[test]
fn native_failures_keep_their_message() {
    let mut natives = NativeRegistry::new();
    natives.register_fn("explode", 0, |_| Err(NativeError::new("boom")));
    let runtime = Runtime::new(natives);
    let err = runtime
        .run_source("func main() { explode() }", DEFAULT_ENTRY)
        .unwrap_err();
    let err = expect_runtime(err);
    let RuntimeErrorKind::NativeFailure { name, source } = err.kind else {
        panic!("expected a native failure");
    };
    assert_eq!(name, "explode");
    assert_eq!(source.to_string(), "boom");
}

#[test]
fn runaway_recursion_hits_the_gas_ceiling() {
    let runtime = Runtime::with_limits(
        NativeRegistry::new(),
        ExecutionLimits::with_gas_limit(1_000),
    );
    let err = runtime
        .run_source("func spin() { spin() }\nfunc main() { spin() }", DEFAULT_ENTRY)
        .unwrap_err();
    let err = expect_runtime(err);
    assert_eq!(err.kind, RuntimeErrorKind::GasExceeded { limit: 1_000 });
    assert!(err.line.is_some());
}

#[test]
fn forward_references_resolve_at_runtime() {
    let runtime = Runtime::new(NativeRegistry::new());
    let result = runtime
        .run_source(
            "func main() { return later(20) }\nfunc later(x: Int) { return x + 1 }",
            DEFAULT_ENTRY,
        )
        .expect("run");
    assert_eq!(result, Value::Int(21));
}

#[test]
fn bundles_run_without_reparsing() {
    let program = compile(
        "func main() { return greeting() + \"!\" }\n\
         func greeting() { return \"hola\" }",
    )
    .expect("compile");
    let key: &[u8] = b"bundle key";
    let bytes = bundle::write_bundle(&program, Some(key)).expect("write");

    let runtime = Runtime::new(NativeRegistry::new());
    let result = runtime
        .run_bundle(&bytes, Some(key), DEFAULT_ENTRY)
        .expect("run");
    assert_eq!(result, Value::String("hola!".to_string()));
}

#[test]
fn bundle_with_wrong_key_is_rejected_by_the_facade() {
    let program = compile("func main() { return 7 }").expect("compile");
    let bytes = bundle::write_bundle(&program, Some(b"right".as_slice())).expect("write");
    let runtime = Runtime::new(NativeRegistry::new());
    let err = runtime
        .run_bundle(&bytes, Some(b"wrong".as_slice()), DEFAULT_ENTRY)
        .unwrap_err();
    assert!(matches!(err, Error::Bundle(_)));
}

#[test]
fn direct_vm_call_passes_arguments_as_locals() {
    let program = compile("func double(x: Int) { return x + x }").expect("compile");
    let natives = NativeRegistry::new();
    let vm = Vm::new(&program, &natives);
    let result = vm.call("double", vec![Value::Int(21)]).expect("run");
    assert_eq!(result, Value::Int(42));
}
