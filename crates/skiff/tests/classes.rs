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
fn derived_constructor_runs_super_then_own_fields() {
    let code = "
        class B { constructor() { this.x = 1; } }
        class D extends B { constructor() { super(); this.y = 2; } }
        const d = new D();
        d.x + d.y
    ";
    assert_eq!(run(code), HostValue::Number(3.0));
}

#[test]
fn this_unreadable_before_super() {
    let code = "
        class B {}
        class D extends B { constructor() { this.y = 2; super(); } }
        new D()
    ";
    let err = run_err(code);
    assert_eq!(err.name(), "ReferenceError");
    assert!(err.message().contains("super"), "{err}");
}

#[test]
fn super_may_only_be_called_once() {
    let code = "
        class B {}
        class D extends B { constructor() { super(); super(); } }
        new D()
    ";
    let err = run_err(code);
    assert_eq!(err.name(), "ReferenceError");
    assert!(err.message().contains("once"), "{err}");
}

#[test]
fn implicit_derived_constructor_forwards_arguments() {
    let code = "
        class B { constructor(v) { this.v = v; } }
        class D extends B {}
        new D(7).v
    ";
    assert_eq!(run(code), HostValue::Number(7.0));
}

#[test]
fn class_constructor_requires_new() {
    let err = run_err("class A {} A()");
    assert_eq!(err.name(), "TypeError");
    assert!(err.message().contains("new"), "{err}");
}

#[test]
fn methods_dispatch_through_prototype_chain() {
    let code = "
        class Base { greet() { return 'base'; } }
        class Kid extends Base { greet() { return 'kid+' + super.greet(); } }
        new Kid().greet()
    ";
    assert_eq!(run(code), HostValue::string("kid+base"));
}

#[test]
fn instance_fields_initialize_in_order() {
    let code = "
        class P { a = 1; b = this.a + 1; }
        const p = new P();
        p.a + p.b
    ";
    assert_eq!(run(code), HostValue::Number(3.0));
}

#[test]
fn private_fields_and_methods() {
    let code = "
        class Counter {
            #n = 0;
            inc() { this.#n += 1; return this.#n; }
            static read(c) { return c.#n; }
        }
        const c = new Counter();
        c.inc();
        c.inc();
        Counter.read(c)
    ";
    assert_eq!(run(code), HostValue::Number(2.0));
}

#[test]
fn private_brand_mismatch_is_type_error() {
    let code = "
        class Counter { #n = 0; static read(c) { return c.#n; } }
        Counter.read({})
    ";
    let err = run_err(code);
    assert_eq!(err.name(), "TypeError");
}

#[test]
fn private_in_checks_brand() {
    let code = "
        class A { #secret = 1; static has(o) { return #secret in o; } }
        [A.has(new A()), A.has({})].join(',')
    ";
    assert_eq!(run(code), HostValue::string("true,false"));
}

#[test]
fn accessors_on_classes() {
    let code = "
        class Temp {
            #c = 0;
            get celsius() { return this.#c; }
            set celsius(v) { this.#c = v; }
        }
        const t = new Temp();
        t.celsius = 25;
        t.celsius
    ";
    assert_eq!(run(code), HostValue::Number(25.0));
}

#[test]
fn static_members_and_blocks() {
    let code = "
        class Config {
            static values = [];
            static { Config.values.push('a'); }
            static { Config.values.push('b'); }
        }
        Config.values.join(',')
    ";
    assert_eq!(run(code), HostValue::string("a,b"));
}

#[test]
fn static_blocks_bind_this_to_constructor() {
    let code = "
        class Marked { static tag = 'm'; static { this.copied = this.tag + '!'; } }
        Marked.copied
    ";
    assert_eq!(run(code), HostValue::string("m!"));
}

#[test]
fn computed_member_names_resolve_at_definition() {
    let code = "
        const key = 'dynamic';
        class C { [key]() { return 5; } }
        new C().dynamic()
    ";
    assert_eq!(run(code), HostValue::Number(5.0));
}

#[test]
fn instanceof_walks_prototypes() {
    let code = "
        class A {}
        class B extends A {}
        const b = new B();
        [b instanceof B, b instanceof A, ({}) instanceof A].join(',')
    ";
    assert_eq!(run(code), HostValue::string("true,true,false"));
}

#[test]
fn extends_non_constructor_is_type_error() {
    let err = run_err("class Bad extends 42 {}");
    assert_eq!(err.name(), "TypeError");
}

#[test]
fn class_name_binding_is_tdz_protected_inside_body() {
    let code = "
        class Named { tag() { return Named.name; } }
        new Named().tag()
    ";
    assert_eq!(run(code), HostValue::string("Named"));
}

#[test]
fn class_expression_values() {
    assert_eq!(run("const C = class { v() { return 3; } }; new C().v()"), HostValue::Number(3.0));
}
