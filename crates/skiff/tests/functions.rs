use skiff::{HostValue, LimitedTracker, NoConsole, ResourceLimits, Runner};

fn run(code: &str) -> HostValue {
    let runner = Runner::new(code.to_owned(), "test.js", vec![], vec![]).unwrap();
    runner.run_no_limits(vec![]).unwrap()
}

fn run_err(code: &str) -> skiff::Exception {
    let runner = Runner::new(code.to_owned(), "test.js", vec![], vec![]).unwrap();
    runner.run_no_limits(vec![]).unwrap_err()
}

#[test]
fn default_parameters_fill_undefined() {
    assert_eq!(run("function f(a, b = 10) { return a + b; } f(1)"), HostValue::Number(11.0));
    assert_eq!(
        run("function f(a, b = 10) { return a + b; } f(1, 2)"),
        HostValue::Number(3.0)
    );
    // Explicit undefined also takes the default.
    assert_eq!(
        run("function f(a = 5) { return a; } f(undefined)"),
        HostValue::Number(5.0)
    );
}

#[test]
fn defaults_see_earlier_parameters() {
    assert_eq!(run("function f(a, b = a * 2) { return b; } f(3)"), HostValue::Number(6.0));
}

#[test]
fn rest_parameters_collect() {
    assert_eq!(
        run("function f(first, ...rest) { return rest.join(','); } f(1, 2, 3, 4)"),
        HostValue::string("2,3,4")
    );
}

#[test]
fn destructured_parameters() {
    assert_eq!(
        run("function dist({ x, y }) { return Math.sqrt(x * x + y * y); } dist({ x: 3, y: 4 })"),
        HostValue::Number(5.0)
    );
}

#[test]
fn mapped_arguments_alias_parameters_in_sloppy_mode() {
    assert_eq!(
        run("function m(a) { a = 5; return arguments[0]; } m(1)"),
        HostValue::Number(5.0)
    );
}

#[test]
fn strict_arguments_are_unmapped() {
    assert_eq!(
        run("'use strict'; function m(a) { a = 5; return arguments[0]; } m(1)"),
        HostValue::Number(1.0)
    );
}

#[test]
fn arrows_inherit_this() {
    let code = "
        const counter = {
            n: 10,
            read() { const get = () => this.n; return get(); }
        };
        counter.read()
    ";
    assert_eq!(run(code), HostValue::Number(10.0));
}

#[test]
fn call_apply_bind() {
    assert_eq!(
        run("function who() { return this.name; } who.call({ name: 'a' })"),
        HostValue::string("a")
    );
    assert_eq!(
        run("function add(a, b) { return a + b; } add.apply(null, [2, 3])"),
        HostValue::Number(5.0)
    );
    assert_eq!(
        run("function add(a, b) { return a + b; } const inc = add.bind(null, 1); inc(41)"),
        HostValue::Number(42.0)
    );
}

#[test]
fn closures_capture_frames_not_copies() {
    let code = "
        function counter() { let n = 0; return { inc: () => ++n, read: () => n }; }
        const c = counter();
        c.inc(); c.inc();
        c.read()
    ";
    assert_eq!(run(code), HostValue::Number(2.0));
}

#[test]
fn update_operators_read_once() {
    assert_eq!(run("let n = 5; [n++, n, ++n].join(',')"), HostValue::string("5,6,7"));
    let code = "
        let reads = 0;
        const box = { get k() { reads++; return { v: 1 }; } };
        box.k.v++;
        reads
    ";
    assert_eq!(run(code), HostValue::Number(1.0));
}

#[test]
fn compound_assignment_short_circuits() {
    assert_eq!(run("let a = null; a ??= 3; a"), HostValue::Number(3.0));
    assert_eq!(run("let a = 1; a ??= 3; a"), HostValue::Number(1.0));
    // Short-circuit forms must not evaluate the right side.
    assert_eq!(
        run("let hits = 0; let a = 1; a ||= (hits++, 9); hits"),
        HostValue::Number(0.0)
    );
}

#[test]
fn call_depth_ceiling_is_uncatchable() {
    let err = run_err("function f() { return f(); } try { f() } catch (e) { 'swallowed' }");
    assert_eq!(err.name(), "InternalError");
    assert!(err.message().contains("call depth"), "{err}");
}

#[test]
fn operation_limit_stops_infinite_loops() {
    let runner = Runner::new("while (true) {}".to_owned(), "test.js", vec![], vec![]).unwrap();
    let tracker = LimitedTracker::new(ResourceLimits {
        max_operations: Some(10_000),
        ..ResourceLimits::default()
    });
    let err = runner.run(vec![], tracker, &mut NoConsole).unwrap_err();
    assert_eq!(err.name(), "InternalError");
}

#[test]
fn cancellation_is_uncatchable() {
    use std::sync::{Arc, atomic::AtomicBool};
    let cancel = Arc::new(AtomicBool::new(true));
    let runner = Runner::new(
        "try { while (true) {} } catch (e) { 'swallowed' }".to_owned(),
        "test.js",
        vec![],
        vec![],
    )
    .unwrap();
    let tracker = LimitedTracker::new(ResourceLimits {
        cancel: Some(cancel),
        ..ResourceLimits::default()
    });
    let err = runner.run(vec![], tracker, &mut NoConsole).unwrap_err();
    assert_eq!(err.name(), "InternalError");
    assert!(err.message().contains("cancelled"), "{err}");
}

#[test]
fn function_name_and_length() {
    assert_eq!(run("function f(a, b) {} f.name"), HostValue::string("f"));
    assert_eq!(run("function f(a, b) {} f.length"), HostValue::Number(2.0));
    assert_eq!(run("const g = () => 0; g.name"), HostValue::string("g"));
}

#[test]
fn new_allocates_from_prototype() {
    let code = "
        function Point(x, y) { this.x = x; this.y = y; }
        Point.prototype.norm = function () { return this.x + this.y; };
        new Point(1, 2).norm()
    ";
    assert_eq!(run(code), HostValue::Number(3.0));
}

#[test]
fn constructor_object_return_wins() {
    assert_eq!(
        run("function C() { return { marker: 9 }; } new C().marker"),
        HostValue::Number(9.0)
    );
    assert_eq!(
        run("function C() { this.marker = 1; return 42; } new C().marker"),
        HostValue::Number(1.0)
    );
}
