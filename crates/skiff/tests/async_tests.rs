use skiff::{CollectStringConsole, HostValue, NoLimitTracker, Runner};

fn run(code: &str) -> HostValue {
    let runner = Runner::new(code.to_owned(), "test.js", vec![], vec![]).unwrap();
    runner.run_no_limits(vec![]).unwrap()
}

fn run_logged(code: &str) -> Vec<String> {
    let runner = Runner::new(code.to_owned(), "test.js", vec![], vec![]).unwrap();
    let mut console = CollectStringConsole::new();
    runner.run(vec![], NoLimitTracker, &mut console).unwrap();
    console.lines().to_vec()
}

#[test]
fn async_functions_return_promises() {
    assert_eq!(
        run("async function f() { return 1; } typeof f().then"),
        HostValue::string("function")
    );
}

#[test]
fn await_resolution_is_scheduled_after_current_turn() {
    let lines = run_logged(
        "
        async function f() { let r = await Promise.resolve(1); return r + 1; }
        f().then((v) => console.log(v));
        console.log('sync');
        ",
    );
    assert_eq!(lines, ["sync", "2"]);
}

#[test]
fn await_accepts_plain_values() {
    let lines = run_logged(
        "
        async function f() { return await 5; }
        f().then((v) => console.log('got', v));
        ",
    );
    assert_eq!(lines, ["got 5"]);
}

#[test]
fn async_rejections_are_catchable() {
    let lines = run_logged(
        "
        async function boom() { throw new TypeError('bad'); }
        boom().catch((e) => console.log('caught', e.message));
        ",
    );
    assert_eq!(lines, ["caught bad"]);
}

#[test]
fn sync_throw_in_default_parameters_rejects() {
    // A throwing default-parameter initializer must produce a rejected
    // promise, never a synchronous exception.
    let lines = run_logged(
        "
        function thrower() { throw new Error('param'); }
        async function f(a = thrower()) { return 1; }
        f().catch((e) => console.log('rejected', e.message));
        console.log('after-call');
        ",
    );
    assert_eq!(lines, ["after-call", "rejected param"]);
}

#[test]
fn awaits_in_loops_run_on_the_resume_path() {
    let lines = run_logged(
        "
        async function sum(values) {
            let total = 0;
            for (const v of values) { total += await v; }
            return total;
        }
        sum([Promise.resolve(1), 2, Promise.resolve(3)]).then((v) => console.log('sum', v));
        ",
    );
    assert_eq!(lines, ["sum 6"]);
}

#[test]
fn try_catch_works_around_await() {
    let lines = run_logged(
        "
        async function f() {
            try {
                await Promise.reject(new Error('kaboom'));
                return 'unreachable';
            } catch (e) {
                return 'caught ' + e.message;
            }
        }
        f().then((v) => console.log(v));
        ",
    );
    assert_eq!(lines, ["caught kaboom"]);
}

#[test]
fn promise_chains_order_microtasks_fifo() {
    let lines = run_logged(
        "
        Promise.resolve('a').then((v) => console.log(v));
        Promise.resolve('b').then((v) => console.log(v));
        console.log('sync');
        ",
    );
    assert_eq!(lines, ["sync", "a", "b"]);
}

#[test]
fn promise_executor_and_chaining() {
    let lines = run_logged(
        "
        new Promise((resolve) => { resolve(2); })
            .then((v) => v * 2)
            .then((v) => console.log('value', v));
        ",
    );
    assert_eq!(lines, ["value 4"]);
}

#[test]
fn executor_throw_rejects() {
    let lines = run_logged(
        "
        new Promise(() => { throw new Error('boom'); }).catch((e) => console.log('caught', e.message));
        ",
    );
    assert_eq!(lines, ["caught boom"]);
}

#[test]
fn for_await_of_iterates_promises_and_values() {
    let lines = run_logged(
        "
        async function collect() {
            const out = [];
            for await (const v of [Promise.resolve(1), 2]) { out.push(v); }
            console.log(out.join(','));
        }
        collect();
        ",
    );
    assert_eq!(lines, ["1,2"]);
}

#[test]
fn async_generators_step_through_promises() {
    let lines = run_logged(
        "
        async function* gen() { yield 1; yield 2; }
        async function main() {
            const out = [];
            for await (const v of gen()) { out.push(v); }
            console.log(out.join(','));
        }
        main();
        ",
    );
    assert_eq!(lines, ["1,2"]);
}

#[test]
fn awaited_async_calls_compose() {
    let lines = run_logged(
        "
        async function inner() { return await Promise.resolve(20); }
        async function outer() { const v = await inner(); return v + 1; }
        outer().then((v) => console.log('outer', v));
        ",
    );
    assert_eq!(lines, ["outer 21"]);
}
