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
fn for_of_walks_arrays() {
    assert_eq!(
        run("let sum = 0; for (const n of [1, 2, 3]) sum += n; sum"),
        HostValue::Number(6.0)
    );
}

#[test]
fn for_of_walks_strings() {
    assert_eq!(
        run("const out = []; for (const c of 'abc') out.push(c); out.join('-')"),
        HostValue::string("a-b-c")
    );
}

#[test]
fn custom_iterator_return_called_on_throw() {
    // next, next, then return() when the body throws at the second value.
    let code = "
        const log = [];
        const iterable = {
            [Symbol.iterator]() {
                let i = 0;
                return {
                    next() { log.push('n'); i += 1; return { value: i, done: i > 3 }; },
                    return() { log.push('r'); return { value: undefined, done: true }; },
                };
            },
        };
        try {
            for (const x of iterable) { if (x === 2) throw 0; }
        } catch (e) {}
        log.join(',')
    ";
    assert_eq!(run(code), HostValue::string("n,n,r"));
}

#[test]
fn iterator_return_called_on_break() {
    let code = "
        let closed = false;
        const iterable = {
            [Symbol.iterator]() {
                let i = 0;
                return {
                    next() { i += 1; return { value: i, done: false }; },
                    return() { closed = true; return { done: true }; },
                };
            },
        };
        for (const x of iterable) { if (x === 2) break; }
        closed
    ";
    assert_eq!(run(code), HostValue::Bool(true));
}

#[test]
fn iterator_not_closed_on_exhaustion() {
    let code = "
        let closed = false;
        const iterable = {
            [Symbol.iterator]() {
                let i = 0;
                return {
                    next() { i += 1; return { value: i, done: i > 2 }; },
                    return() { closed = true; return { done: true }; },
                };
            },
        };
        for (const x of iterable) {}
        closed
    ";
    assert_eq!(run(code), HostValue::Bool(false));
}

#[test]
fn non_iterable_for_of_is_type_error() {
    let err = run_err("for (const x of 42) {}");
    assert_eq!(err.name(), "TypeError");
    assert!(err.message().contains("not iterable"), "{err}");
}

#[test]
fn destructuring_with_defaults_and_rest() {
    let code = "const [a = 10, b, ...c] = [undefined, 2, 3, 4]; [a, b, c.join('+')].join(',')";
    assert_eq!(run(code), HostValue::string("10,2,3+4"));
}

#[test]
fn sparse_array_pattern_advances_iterator() {
    // The elision consumes a value without binding it.
    assert_eq!(run("const [, second] = [1, 2, 3]; second"), HostValue::Number(2.0));
}

#[test]
fn object_destructuring_with_rename_and_defaults() {
    let code = "
        const { a: renamed, missing = 'fallback', ...rest } = { a: 1, b: 2, c: 3 };
        [renamed, missing, Object.keys(rest).join('+')].join(',')
    ";
    assert_eq!(run(code), HostValue::string("1,fallback,b+c"));
}

#[test]
fn nested_destructuring() {
    assert_eq!(
        run("const { point: [x, { y }] } = { point: [1, { y: 2 }] }; x + y"),
        HostValue::Number(3.0)
    );
}

#[test]
fn destructuring_assignment_to_member_targets() {
    let code = "
        const box = {};
        [box.first, box.second] = [1, 2];
        box.first + box.second
    ";
    assert_eq!(run(code), HostValue::Number(3.0));
}

#[test]
fn spread_in_calls_and_arrays() {
    assert_eq!(run("Math.max(...[3, 9, 4])"), HostValue::Number(9.0));
    assert_eq!(run("[0, ...[1, 2], 3].join(',')"), HostValue::string("0,1,2,3"));
}

#[test]
fn object_spread_copies_enumerable_own_keys() {
    let code = "
        const base = { a: 1, b: 2 };
        const merged = { ...base, b: 3 };
        [merged.a, merged.b].join(',')
    ";
    assert_eq!(run(code), HostValue::string("1,3"));
}

#[test]
fn array_holes_stay_holes() {
    assert_eq!(run("const a = [1, , 3]; a.length"), HostValue::Number(3.0));
    assert_eq!(run("const a = [1, , 3]; a[1] === undefined"), HostValue::Bool(true));
}

#[test]
fn optional_chaining_short_circuits() {
    assert_eq!(run("null?.x.y()  === undefined"), HostValue::Bool(true));
    assert_eq!(run("const o = { a: { b: () => 7 } }; o?.a?.b()"), HostValue::Number(7.0));
    assert_eq!(run("const o = {}; o.missing?.()  === undefined"), HostValue::Bool(true));
    // The call after the nullish link must not evaluate.
    let code = "
        let hits = 0;
        const nothing = null;
        nothing?.x[hits++];
        hits
    ";
    assert_eq!(run(code), HostValue::Number(0.0));
}

#[test]
fn array_entries_and_keys() {
    assert_eq!(
        run("const out = []; for (const [i, v] of ['a', 'b'].entries()) out.push(i + ':' + v); out.join(',')"),
        HostValue::string("0:a,1:b")
    );
}
