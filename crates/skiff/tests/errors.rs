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
fn parse_errors_surface_as_syntax_errors() {
    let err = Runner::new("let let = ;".to_owned(), "bad.js", vec![], vec![]).unwrap_err();
    assert_eq!(err.name(), "SyntaxError");
}

#[test]
fn unsupported_syntax_is_rejected_at_build_time() {
    let err = Runner::new("import x from 'mod';".to_owned(), "bad.js", vec![], vec![]).unwrap_err();
    assert_eq!(err.name(), "SyntaxError");
    assert!(err.message().contains("not supported"), "{err}");
}

#[test]
fn throw_and_catch_custom_values() {
    assert_eq!(
        run("try { throw 42; } catch (e) { e + 1 }"),
        HostValue::Number(43.0)
    );
    assert_eq!(
        run("try { throw { code: 'X' }; } catch (e) { e.code }"),
        HostValue::string("X")
    );
}

#[test]
fn catch_binding_can_destructure() {
    assert_eq!(
        run("try { throw { reason: 'nope' }; } catch ({ reason }) { reason }"),
        HostValue::string("nope")
    );
}

#[test]
fn catch_without_binding() {
    assert_eq!(run("try { throw 1; } catch { 'handled' }"), HostValue::string("handled"));
}

#[test]
fn finally_always_runs() {
    assert_eq!(
        run("let log = []; try { log.push('t'); throw 1; } catch { log.push('c'); } finally { log.push('f'); } log.join(',')"),
        HostValue::string("t,c,f")
    );
}

#[test]
fn abrupt_finally_overrides_pending_completion() {
    assert_eq!(
        run("function f() { try { return 1; } finally { return 2; } } f()"),
        HostValue::Number(2.0)
    );
    assert_eq!(
        run("function f() { try { throw 'x'; } finally { return 'recovered'; } } f()"),
        HostValue::string("recovered")
    );
}

#[test]
fn engine_errors_carry_constructor_identities() {
    assert_eq!(
        run("try { missing(); } catch (e) { e instanceof ReferenceError }"),
        HostValue::Bool(true)
    );
    assert_eq!(
        run("try { null.x; } catch (e) { e instanceof TypeError }"),
        HostValue::Bool(true)
    );
    assert_eq!(
        run("try { undefined(); } catch (e) { e.name }"),
        HostValue::string("TypeError")
    );
}

#[test]
fn error_objects_have_name_and_message() {
    assert_eq!(
        run("const e = new RangeError('out of range'); e.name + ': ' + e.message"),
        HostValue::string("RangeError: out of range")
    );
    assert_eq!(
        run("new Error('plain').toString()"),
        HostValue::string("Error: plain")
    );
}

#[test]
fn uncaught_errors_report_span_and_kind() {
    let err = run_err("const x = 1;\nmissingName + 1;");
    assert_eq!(err.name(), "ReferenceError");
    assert!(err.message().contains("missingName"), "{err}");
    let frame = &err.frames()[0];
    assert_eq!(frame.loc.line, 2);
    assert_eq!(frame.script_name, "test.js");
    assert!(frame.preview.as_deref().is_some_and(|p| p.contains("missingName")));
}

#[test]
fn switch_matches_with_strict_equality_and_falls_through() {
    let code = "
        function pick(v) {
            const log = [];
            switch (v) {
                case '1': log.push('string-one'); break;
                case 1: log.push('one');
                case 2: log.push('two'); break;
                default: log.push('other');
            }
            return log.join(',');
        }
        [pick('1'), pick(1), pick(2), pick(3)].join('|')
    ";
    assert_eq!(
        run(code),
        HostValue::string("string-one|one,two|two|other")
    );
}

#[test]
fn switch_default_falls_through_to_later_cases() {
    let code = "
        function pick(v) {
            const log = [];
            switch (v) {
                default: log.push('other');
                case 9: log.push('nine');
            }
            return log.join(',');
        }
        pick(5)
    ";
    assert_eq!(run(code), HostValue::string("other,nine"));
}

#[test]
fn in_operator_requires_objects() {
    assert_eq!(run("'a' in { a: 1 }"), HostValue::Bool(true));
    assert_eq!(run("0 in [7]"), HostValue::Bool(true));
    let err = run_err("'a' in 'abc'");
    assert_eq!(err.name(), "TypeError");
}

#[test]
fn typed_array_indexing_is_bounds_checked() {
    assert_eq!(
        run("const t = new Int32Array(3); t[0] = 2.9; t[0]"),
        HostValue::Number(2.0)
    );
    let err = run_err("const t = new Float64Array(2); t[5]");
    assert_eq!(err.name(), "RangeError");
    let err = run_err("const t = new Float64Array(2); t[2] = 1;");
    assert_eq!(err.name(), "RangeError");
}

#[test]
fn frozen_objects_reject_writes_in_strict_mode() {
    let err = run_err("'use strict'; const o = Object.freeze({ a: 1 }); o.a = 2;");
    assert_eq!(err.name(), "TypeError");
    // Sloppy writes are silently ignored.
    assert_eq!(
        run("const o = Object.freeze({ a: 1 }); o.a = 2; o.a"),
        HostValue::Number(1.0)
    );
}

#[test]
fn getter_setter_descriptors() {
    let code = "
        const store = { raw: 0 };
        Object.defineProperty(store, 'double', {
            get() { return this.raw * 2; },
            configurable: true,
        });
        store.raw = 21;
        store.double
    ";
    assert_eq!(run(code), HostValue::Number(42.0));
}

#[test]
fn sequence_expression_evaluates_left_to_right() {
    assert_eq!(run("let a = 0; (a = 5, a + 1)"), HostValue::Number(6.0));
}
