use skiff::{HostValue, Runner};

fn run(code: &str) -> HostValue {
    let runner = Runner::new(code.to_owned(), "test.js", vec![], vec![]).unwrap();
    runner.run_no_limits(vec![]).unwrap()
}

fn run_err(code: &str) -> skiff::Exception {
    let runner = Runner::new(code.to_owned(), "test.js", vec![], vec![]).unwrap();
    runner.run_no_limits(vec![]).unwrap_err()
}

#[test]
fn tdz_read_before_declaration() {
    // The block-scoped `x` shadows the outer one from block entry, so the
    // assignment hits its dead zone.
    let err = run_err("let x; { x = 1; let x = 2; }");
    assert_eq!(err.name(), "ReferenceError");
    assert!(err.message().contains("before initialization"), "{err}");
}

#[test]
fn tdz_read_in_same_scope() {
    let err = run_err("f(); function f() { return y; } let y = 1;");
    assert_eq!(err.name(), "ReferenceError");
}

#[test]
fn duplicate_lexical_rejected() {
    let err = run_err("{ var a = 1; let a = 2; }");
    assert_eq!(err.name(), "SyntaxError");
}

#[test]
fn var_hoists_to_function_scope() {
    assert_eq!(
        run("function f() { { var inner = 5; } return inner; } f()"),
        HostValue::Number(5.0)
    );
}

#[test]
fn annex_b_block_function_promotes_in_sloppy_mode() {
    // The inner declaration becomes the identity bound at outer scope.
    assert_eq!(
        run("function g() { return 0; }\n{ function g() { return 1; } }\ng()"),
        HostValue::Number(1.0)
    );
}

#[test]
fn annex_b_promotion_blocked_by_lexical() {
    // A same-named lexical between the block and the var-env blocks the
    // promotion; the outer binding survives.
    let code = "
        function probe() {
            let g = () => 0;
            { function g() { return 1; } }
            return g();
        }
        probe()
    ";
    assert_eq!(run(code), HostValue::Number(0.0));
}

#[test]
fn strict_mode_has_no_block_function_promotion() {
    let code = "'use strict';\nfunction g() { return 0; }\n{ function g() { return 1; } }\ng()";
    assert_eq!(run(code), HostValue::Number(0.0));
}

#[test]
fn catch_param_annex_b_exemption() {
    // `var e` may coexist with the catch parameter `e`.
    assert_eq!(
        run("function f() { try { throw 1; } catch (e) { var e = 2; return e; } } f()"),
        HostValue::Number(2.0)
    );
}

#[test]
fn closures_capture_per_iteration_bindings() {
    let code = "
        const fns = [];
        for (let i = 0; i < 3; i++) { fns.push(() => i); }
        fns.map((f) => f()).join(',')
    ";
    assert_eq!(run(code), HostValue::string("0,1,2"));
}

#[test]
fn var_loop_shares_one_binding() {
    let code = "
        const fns = [];
        for (var i = 0; i < 3; i++) { fns.push(() => i); }
        fns.map((f) => f()).join(',')
    ";
    assert_eq!(run(code), HostValue::string("3,3,3"));
}

#[test]
fn labeled_continue_targets_outer_loop() {
    let code = "
        let count = 0;
        outer: for (let i = 0; i < 3; i++) {
            for (let j = 0; j < 3; j++) {
                if (j === 1) continue outer;
                count++;
            }
        }
        count
    ";
    assert_eq!(run(code), HostValue::Number(3.0));
}

#[test]
fn labeled_break_exits_labeled_block() {
    let code = "
        let reached = 'no';
        done: { reached = 'before'; break done; reached = 'after'; }
        reached
    ";
    assert_eq!(run(code), HostValue::string("before"));
}

#[test]
fn sloppy_assignment_creates_global() {
    assert_eq!(run("function f() { leaked = 7; } f(); leaked"), HostValue::Number(7.0));
}

#[test]
fn strict_assignment_to_unknown_fails() {
    let err = run_err("'use strict'; missing = 1;");
    assert_eq!(err.name(), "ReferenceError");
}

#[test]
fn const_reassignment_fails() {
    let err = run_err("const c = 1; c = 2;");
    assert_eq!(err.name(), "TypeError");
    assert!(err.message().contains("constant"), "{err}");
}

#[test]
fn with_statement_binds_object_properties() {
    assert_eq!(
        run("const box = { width: 4, height: 5 }; let area; with (box) { area = width * height; } area"),
        HostValue::Number(20.0)
    );
}

#[test]
fn do_while_runs_body_once() {
    assert_eq!(run("let n = 0; do { n++; } while (false); n"), HostValue::Number(1.0));
}

#[test]
fn delete_respects_configurability() {
    assert_eq!(run("const o = { a: 1 }; delete o.a; o.a === undefined"), HostValue::Bool(true));
    let err = run_err("'use strict'; let q = 1; delete q;");
    assert_eq!(err.name(), "SyntaxError");
}

#[test]
fn for_in_visits_integer_keys_first() {
    let code = "
        const obj = { b: 1, 2: 'two', a: 3 };
        const keys = [];
        for (const k in obj) keys.push(k);
        keys.join(',')
    ";
    assert_eq!(run(code), HostValue::string("2,b,a"));
}
