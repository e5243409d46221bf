use skiff::{HostValue, NoLimitTracker, Runner};

fn run(code: &str) -> HostValue {
    let runner = Runner::new(code.to_owned(), "test.js", vec![], vec![]).unwrap();
    runner.run_no_limits(vec![]).unwrap()
}

/// Test we can reuse a runner without borrow checker issues.
#[test]
fn repeat_exec() {
    let runner = Runner::new("1 + 2".to_owned(), "test.js", vec![], vec![]).unwrap();

    let r = runner.run_no_limits(vec![]).unwrap();
    assert_eq!(r, HostValue::Number(3.0));

    let r = runner.run_no_limits(vec![]).unwrap();
    assert_eq!(r, HostValue::Number(3.0));
}

#[test]
fn inputs_bind_as_globals() {
    let runner = Runner::new(
        "x * y".to_owned(),
        "test.js",
        vec!["x".to_owned(), "y".to_owned()],
        vec![],
    )
    .unwrap();
    let r = runner
        .run_no_limits(vec![HostValue::Number(6.0), HostValue::Number(7.0)])
        .unwrap();
    assert_eq!(r, HostValue::Number(42.0));
}

#[test]
fn string_concat_and_templates() {
    assert_eq!(run("'foo' + 'bar'"), HostValue::string("foobar"));
    assert_eq!(run("`2 + 2 = ${2 + 2}`"), HostValue::string("2 + 2 = 4"));
    assert_eq!(run("'a' + 1"), HostValue::string("a1"));
    assert_eq!(run("1 + '2'"), HostValue::string("12"));
}

#[test]
fn arithmetic_follows_ieee() {
    assert_eq!(run("1 / 0"), HostValue::Number(f64::INFINITY));
    assert_eq!(run("7 % 3"), HostValue::Number(1.0));
    assert_eq!(run("-7 % 3"), HostValue::Number(-1.0));
    assert_eq!(run("2 ** 10"), HostValue::Number(1024.0));
    let HostValue::Number(nan) = run("0 / 0") else {
        panic!("expected a number");
    };
    assert!(nan.is_nan());
}

#[test]
fn equality_semantics() {
    assert_eq!(run("NaN === NaN"), HostValue::Bool(false));
    assert_eq!(run("0 === -0"), HostValue::Bool(true));
    assert_eq!(run("1 == '1'"), HostValue::Bool(true));
    assert_eq!(run("1 === '1'"), HostValue::Bool(false));
    assert_eq!(run("null == undefined"), HostValue::Bool(true));
    assert_eq!(run("null === undefined"), HostValue::Bool(false));
}

#[test]
fn objects_and_arrays_convert_to_host_values() {
    assert_eq!(
        run("({ a: 1, b: 'x' })"),
        HostValue::Object(vec![
            ("a".to_owned(), HostValue::Number(1.0)),
            ("b".to_owned(), HostValue::string("x")),
        ])
    );
    assert_eq!(
        run("[1, 'two', true]"),
        HostValue::List(vec![
            HostValue::Number(1.0),
            HostValue::string("two"),
            HostValue::Bool(true),
        ])
    );
}

#[test]
fn typeof_reports_tags() {
    assert_eq!(run("typeof 1"), HostValue::string("number"));
    assert_eq!(run("typeof 'x'"), HostValue::string("string"));
    assert_eq!(run("typeof undefined"), HostValue::string("undefined"));
    assert_eq!(run("typeof null"), HostValue::string("object"));
    assert_eq!(run("typeof (() => 1)"), HostValue::string("function"));
    // typeof never throws on unresolved identifiers.
    assert_eq!(run("typeof missing"), HostValue::string("undefined"));
}

#[test]
fn conditional_and_logical_operators() {
    assert_eq!(run("true ? 'a' : 'b'"), HostValue::string("a"));
    assert_eq!(run("0 || 'fallback'"), HostValue::string("fallback"));
    assert_eq!(run("0 ?? 'fallback'"), HostValue::Number(0.0));
    assert_eq!(run("null ?? 'fallback'"), HostValue::string("fallback"));
    assert_eq!(run("1 && 2"), HostValue::Number(2.0));
}

#[test]
fn constant_folding_preserves_behavior() {
    // Folded and unfolded versions must produce the same result.
    let folded = run("(1 + 2) * 3");
    let via_vars = run("let a = 1; let b = 2; let c = 3; (a + b) * c");
    assert_eq!(folded, via_vars);
    assert_eq!(folded, HostValue::Number(9.0));
}

#[test]
fn snapshot_roundtrip() {
    let runner = Runner::new("[1, 2, 3].map((n) => n * 2).join('-')".to_owned(), "snap.js", vec![], vec![]).unwrap();
    let bytes = runner.dump().unwrap();
    let restored = Runner::load(&bytes).unwrap();
    assert_eq!(restored.run_no_limits(vec![]).unwrap(), HostValue::string("2-4-6"));
}

#[test]
fn external_functions_dispatch_by_name() {
    let runner = Runner::new(
        "double(21)".to_owned(),
        "test.js",
        vec![],
        vec!["double".to_owned()],
    )
    .unwrap();
    let mut dispatcher = |name: &str, args: Vec<HostValue>| {
        assert_eq!(name, "double");
        let HostValue::Number(n) = args[0] else {
            return Err(skiff::HostCallError::new("expected a number"));
        };
        Ok(HostValue::Number(n * 2.0))
    };
    let mut console = skiff::NoConsole;
    let r = runner
        .run_with_externals(vec![], &mut dispatcher, NoLimitTracker, &mut console)
        .unwrap();
    assert_eq!(r, HostValue::Number(42.0));
}

#[test]
fn math_and_number_builtins() {
    assert_eq!(run("Math.max(1, 5, 3)"), HostValue::Number(5.0));
    assert_eq!(run("Math.floor(2.7)"), HostValue::Number(2.0));
    assert_eq!(run("Number('12')"), HostValue::Number(12.0));
    assert_eq!(run("Number.isInteger(4)"), HostValue::Bool(true));
    assert_eq!(run("parseInt('42px')"), HostValue::Number(42.0));
    assert_eq!(run("isNaN('not a number')"), HostValue::Bool(true));
}

#[test]
fn string_methods() {
    assert_eq!(run("'hello'.slice(1, 3)"), HostValue::string("el"));
    assert_eq!(run("'a,b,c'.split(',').length"), HostValue::Number(3.0));
    assert_eq!(run("'hello'.toUpperCase()"), HostValue::string("HELLO"));
    assert_eq!(run("'  pad  '.trim()"), HostValue::string("pad"));
    assert_eq!(run("'hello'.length"), HostValue::Number(5.0));
    assert_eq!(run("'hello'[1]"), HostValue::string("e"));
}

#[test]
fn array_methods() {
    assert_eq!(run("const a = [1, 2]; a.push(3); a.length"), HostValue::Number(3.0));
    assert_eq!(run("[3, 1, 2].indexOf(2)"), HostValue::Number(2.0));
    assert_eq!(run("[1, 2, 3].includes(2)"), HostValue::Bool(true));
    assert_eq!(
        run("[1, 2, 3, 4].filter((n) => n % 2 === 0).join(',')"),
        HostValue::string("2,4")
    );
    assert_eq!(run("[[1], [2]].concat([[3]]).length"), HostValue::Number(3.0));
    assert_eq!(run("Array.isArray([])"), HostValue::Bool(true));
}
