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
fn generator_yields_in_order_with_delegation() {
    let code = "
        function* a() { yield 1; yield* [2, 3]; yield 4; }
        const out = [];
        for (const v of a()) out.push(v);
        out.join(',')
    ";
    assert_eq!(run(code), HostValue::string("1,2,3,4"));
}

#[test]
fn generator_body_does_not_run_until_next() {
    let code = "
        let started = false;
        function* g() { started = true; yield 1; }
        const it = g();
        const before = started;
        it.next();
        [before, started].join(',')
    ";
    assert_eq!(run(code), HostValue::string("false,true"));
}

#[test]
fn next_value_feeds_the_yield_expression() {
    let code = "
        function* g() { const x = yield 1; yield x * 2; }
        const it = g();
        it.next();
        it.next(21).value
    ";
    assert_eq!(run(code), HostValue::Number(42.0));
}

#[test]
fn done_generators_keep_reporting_done() {
    let code = "
        function* g() { yield 1; }
        const it = g();
        it.next();
        it.next();
        const after = it.next();
        [after.value === undefined, after.done].join(',')
    ";
    assert_eq!(run(code), HostValue::string("true,true"));
}

#[test]
fn generator_return_closes_early() {
    let code = "
        function* g() { yield 1; yield 2; }
        const it = g();
        it.next();
        const r = it.return(9);
        const after = it.next();
        [r.value, r.done, after.value === undefined, after.done].join(',')
    ";
    assert_eq!(run(code), HostValue::string("9,true,true,true"));
}

#[test]
fn closed_generators_answer_every_resumption_with_done() {
    let code = "
        function* g() { yield 1; yield 2; }
        const it = g();
        it.next();
        it.return(0);
        const n = it.next();
        const t = it.throw('ignored');
        const r = it.return(7);
        [n.done, t.value === undefined, t.done, r.value, r.done].join(',')
    ";
    assert_eq!(run(code), HostValue::string("true,true,true,7,true"));
}

#[test]
fn finally_can_delay_return_with_more_yields() {
    let code = "
        function* g() { try { yield 1; yield 2; } finally { yield 99; } }
        const it = g();
        it.next();
        const during = it.return(5);
        const after = it.next();
        [during.value, during.done, after.value, after.done].join(',')
    ";
    assert_eq!(run(code), HostValue::string("99,false,5,true"));
}

#[test]
fn generator_throw_is_catchable_inside() {
    let code = "
        function* g() { try { yield 1; } catch (e) { yield e + 1; } }
        const it = g();
        it.next();
        it.throw(10).value
    ";
    assert_eq!(run(code), HostValue::Number(11.0));
}

#[test]
fn generator_throw_propagates_when_uncaught() {
    let code = "
        function* g() { yield 1; }
        const it = g();
        it.next();
        it.throw(new TypeError('bang'));
    ";
    let err = run_err(code);
    assert_eq!(err.name(), "TypeError");
    assert_eq!(err.message(), "bang");
}

#[test]
fn yield_star_forwards_throw_to_inner_throw_method() {
    let code = "
        const seen = [];
        const inner = {
            [Symbol.iterator]() { return this; },
            next() { return { value: 'inner', done: false }; },
            throw(e) { seen.push('inner-throw:' + e); return { value: undefined, done: true }; },
        };
        function* outer() { const result = yield* inner; yield 'after'; }
        const it = outer();
        it.next();
        it.throw('x');
        seen.join(',')
    ";
    assert_eq!(run(code), HostValue::string("inner-throw:x"));
}

#[test]
fn yield_star_without_inner_throw_raises_type_error() {
    let code = "
        const inner = {
            [Symbol.iterator]() { return this; },
            next() { return { value: 1, done: false }; },
        };
        function* outer() { yield* inner; }
        const it = outer();
        it.next();
        it.throw('x');
    ";
    let err = run_err(code);
    assert_eq!(err.name(), "TypeError");
    assert!(err.message().contains("throw"), "{err}");
}

#[test]
fn generators_in_loops_and_conditionals() {
    let code = "
        function* evens(limit) {
            for (let i = 0; i <= limit; i++) {
                if (i % 2 === 0) yield i;
            }
        }
        const out = [];
        for (const n of evens(6)) out.push(n);
        out.join(',')
    ";
    assert_eq!(run(code), HostValue::string("0,2,4,6"));
}

#[test]
fn break_inside_for_of_over_generator_closes_it() {
    let code = "
        let cleaned = false;
        function* g() { try { yield 1; yield 2; yield 3; } finally { cleaned = true; } }
        for (const v of g()) { if (v === 2) break; }
        cleaned
    ";
    assert_eq!(run(code), HostValue::Bool(true));
}

#[test]
fn generator_is_its_own_iterator() {
    let code = "
        function* g() { yield 'a'; }
        const it = g();
        it[Symbol.iterator]() === it
    ";
    assert_eq!(run(code), HostValue::Bool(true));
}

#[test]
fn spread_consumes_generators() {
    assert_eq!(
        run("function* g() { yield 1; yield 2; } [...g(), 3].join(',')"),
        HostValue::string("1,2,3")
    );
}
