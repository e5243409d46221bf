//! The generator / async state machine.
//!
//! A generator call binds its parameters eagerly but does not run the body;
//! it allocates a `GeneratorState` holding the compiled plan, the frame
//! environment, the instruction pointer, temp slots and a block stack.
//! `next`/`return`/`throw` (and promise settlements, for async bodies) feed
//! a [`GenResume`] into [`drive`], which steps the plan until the next
//! suspension or completion. Abrupt completions unwind the block stack,
//! running `finally` regions and closing active loop iterators on the way
//! out.

use std::rc::Rc;

use crate::{
    ast::DeclKind,
    environment::{Binding, EnvId, ScopeKind},
    error::{ErrorKind, RunError, RunResult},
    genplan::{self, IterTemps, Plan, PlanStep, UnwindKind},
    heap::{Heap, HeapData, HeapId},
    intern::{FunctionId, StaticStrings, StringId},
    interp::{BindMode, Completion, Interp},
    io::ConsoleWriter,
    iterator::IteratorRecord,
    object::{JsObject, PropertyKey, PropertyKeyRef},
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

/// How a suspended body resumes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum GenResume {
    Next(Value),
    Throw(Value),
    Return(Value),
}

/// What one drive of the machine produced, as seen by a synchronous caller.
#[derive(Debug, Clone, Copy)]
pub(crate) enum StepOutcome {
    /// Suspended at a `yield` with this value.
    Yielded(Value),
    /// Ran to completion with this value.
    Done(Value),
    /// Suspended at an `await` (or an async `yield` already settled its
    /// step promise); nothing for the caller to observe synchronously.
    Suspended,
}

/// A pending abrupt completion routed through `finally` regions.
#[derive(Debug, Clone)]
pub(crate) enum Pending {
    Throw(RunError),
    Break(Option<StringId>),
    Continue(Option<StringId>),
    Return(Value),
}

/// One entry of the machine's block stack.
#[derive(Debug, Clone)]
pub(crate) enum BlockInfo {
    Scope {
        saved_env: EnvId,
    },
    Loop {
        labels: Vec<StringId>,
        continue_ip: usize,
        break_ip: usize,
        saved_env: EnvId,
        /// Current head scope; replaced by `FreshIteration`.
        head_env: EnvId,
        per_iteration: Vec<StringId>,
        iterator: Option<IterTemps>,
    },
    Breakable {
        labels: Vec<StringId>,
        break_ip: usize,
        saved_env: EnvId,
    },
    Handler {
        catch_ip: Option<usize>,
        finally_ip: Option<usize>,
        saved_env: EnvId,
    },
}

/// Active `yield*` delegation.
#[derive(Debug, Clone)]
pub(crate) struct DelegateState {
    pub record: IteratorRecord,
    pub resume_temp: u16,
    pub span: SourceSpan,
}

/// Heap state of one generator instance or suspended async invocation.
#[derive(Debug, Clone)]
pub(crate) struct GeneratorState {
    pub obj: JsObject,
    pub def: FunctionId,
    pub plan: Rc<Plan>,
    /// Current environment; scope blocks move it as the plan executes.
    pub env: EnvId,
    pub ip: usize,
    pub temps: Vec<Value>,
    pub blocks: Vec<BlockInfo>,
    /// Completion traveling through a `finally` region.
    pub pending: Option<Pending>,
    /// Thrown error waiting for its `CatchBind`.
    pub pending_throw: Option<RunError>,
    /// Temp slot receiving the next resume value.
    pub resume_temp: Option<u16>,
    pub delegate: Option<DelegateState>,
    pub started: bool,
    pub done: bool,
    pub running: bool,
    /// Async function body (plan path).
    pub is_async_fn: bool,
    /// Async generator (`async function*`).
    pub is_async_gen: bool,
    /// Settled with the completion of an async function body.
    pub result_promise: Option<HeapId>,
    /// Settled with `{value, done}` per async-generator step.
    pub step_promise: Option<HeapId>,
}

impl GeneratorState {
    fn placeholder() -> Self {
        Self {
            obj: JsObject::new(None),
            def: FunctionId::new(0),
            plan: Rc::new(Plan {
                steps: Vec::new(),
                temp_count: 0,
            }),
            env: EnvId::ZERO,
            ip: 0,
            temps: Vec::new(),
            blocks: Vec::new(),
            pending: None,
            pending_throw: None,
            resume_temp: None,
            delegate: None,
            started: false,
            done: true,
            running: false,
            is_async_fn: false,
            is_async_gen: false,
            result_promise: None,
            step_promise: None,
        }
    }
}

fn take_state(heap: &mut Heap<impl ResourceTracker>, gen_id: HeapId) -> RunResult<GeneratorState> {
    match heap.get_mut(gen_id) {
        HeapData::Generator(state) => Ok(std::mem::replace(state, GeneratorState::placeholder())),
        _ => Err(RunError::internal("resuming a non-generator")),
    }
}

fn put_state(heap: &mut Heap<impl ResourceTracker>, gen_id: HeapId, state: GeneratorState) {
    if let HeapData::Generator(slot) = heap.get_mut(gen_id) {
        *slot = state;
    }
}

fn plan_for<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    def: FunctionId,
) -> Rc<Plan> {
    if let Some(plan) = interp.ctx.plan_cache.get(&def) {
        return Rc::clone(plan);
    }
    let plan = Rc::new(genplan::compile(&interp.interns.get_function(def).body));
    interp.ctx.plan_cache.insert(def, Rc::clone(&plan));
    plan
}

/// Creates a generator object for a generator function call; parameters are
/// bound now, the body has not started.
pub(crate) fn create_generator<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    function_id: HeapId,
    this: Value,
    args: Vec<Value>,
    span: SourceSpan,
) -> RunResult<Value> {
    let frame = interp.prepare_call_env(function_id, this, args, None, span)?;
    let def = frame.def;
    let def_data = interp.interns.get_function(def);
    let is_async_gen = def_data.is_async;
    let plan = plan_for(interp, def);

    // The instance prototype is the function's own `prototype` object.
    let proto = match interp.get_property(
        Value::Ref(function_id),
        PropertyKeyRef::String(StaticStrings::Prototype.as_str()),
        span,
    )? {
        Value::Ref(id) if interp.heap.object(id).is_some() => Some(id),
        _ => Some(if is_async_gen {
            interp.realm.async_generator_proto
        } else {
            interp.realm.generator_proto
        }),
    };

    let temp_count = plan.temp_count as usize;
    let state = GeneratorState {
        obj: JsObject::new(proto),
        def,
        plan,
        env: frame.body_env,
        ip: 0,
        temps: vec![Value::Undefined; temp_count],
        blocks: Vec::new(),
        pending: None,
        pending_throw: None,
        resume_temp: None,
        delegate: None,
        started: false,
        done: false,
        running: false,
        is_async_fn: false,
        is_async_gen,
        result_promise: None,
        step_promise: None,
    };
    Ok(Value::Ref(interp.heap.allocate(HeapData::Generator(state))?))
}

/// Calls an async function on the suspend-and-resume path: returns a
/// promise, with synchronous throws (including parameter binding failures)
/// surfacing as rejections.
pub(crate) fn call_async_plan<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    function_id: HeapId,
    this: Value,
    args: Vec<Value>,
    span: SourceSpan,
) -> RunResult<Value> {
    let promise = interp.new_promise()?;
    let frame = match interp.prepare_call_env(function_id, this, args, None, span) {
        Ok(frame) => frame,
        Err(err) if err.is_catchable() => {
            let reason = interp.error_to_value(err)?;
            interp.reject_promise(promise, reason)?;
            return Ok(Value::Ref(promise));
        }
        Err(err) => return Err(err),
    };
    let def = frame.def;
    let plan = plan_for(interp, def);
    let temp_count = plan.temp_count as usize;
    let state = GeneratorState {
        obj: JsObject::new(Some(interp.realm.object_proto)),
        def,
        plan,
        env: frame.body_env,
        ip: 0,
        temps: vec![Value::Undefined; temp_count],
        blocks: Vec::new(),
        pending: None,
        pending_throw: None,
        resume_temp: None,
        delegate: None,
        started: false,
        done: false,
        running: false,
        is_async_fn: true,
        is_async_gen: false,
        result_promise: Some(promise),
        step_promise: None,
    };
    let gen_id = interp.heap.allocate(HeapData::Generator(state))?;
    drive(interp, gen_id, GenResume::Next(Value::Undefined))?;
    Ok(Value::Ref(promise))
}

/// Resumes a suspended body from the job queue.
pub(crate) fn resume_job<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    gen_id: HeapId,
    resume: GenResume,
) -> RunResult<()> {
    drive(interp, gen_id, resume).map(|_| ())
}

/// Guest-facing `next`/`return`/`throw` on a synchronous generator: drives
/// the plan and shapes the `{value, done}` result object.
pub(crate) fn generator_step<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    gen_id: HeapId,
    resume: GenResume,
    span: SourceSpan,
) -> RunResult<Value> {
    let (done, is_async_gen) = match interp.heap.get(gen_id) {
        HeapData::Generator(state) => (state.done, state.is_async_gen),
        _ => {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Receiver is not a generator",
                span,
            ));
        }
    };
    if is_async_gen {
        return async_generator_step(interp, gen_id, resume, span);
    }
    if done {
        // A closed generator answers every resumption with a done result.
        return match resume {
            GenResume::Next(_) | GenResume::Throw(_) => iter_result(interp, Value::Undefined, true),
            GenResume::Return(value) => iter_result(interp, value, true),
        };
    }
    match drive(interp, gen_id, resume)? {
        StepOutcome::Yielded(value) => iter_result(interp, value, false),
        StepOutcome::Done(value) => iter_result(interp, value, true),
        StepOutcome::Suspended => Err(RunError::internal("synchronous generator suspended on await")),
    }
}

/// `next`/`return`/`throw` on an async generator: every step produces a
/// promise of a `{value, done}` object.
fn async_generator_step<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    gen_id: HeapId,
    resume: GenResume,
    _span: SourceSpan,
) -> RunResult<Value> {
    let step_promise = interp.new_promise()?;
    let done = match interp.heap.get_mut(gen_id) {
        HeapData::Generator(state) => {
            if state.done {
                true
            } else {
                state.step_promise = Some(step_promise);
                false
            }
        }
        _ => return Err(RunError::internal("resuming a non-generator")),
    };
    if done {
        match resume {
            GenResume::Next(_) => {
                let result = iter_result(interp, Value::Undefined, true)?;
                interp.resolve_promise(step_promise, result)?;
            }
            GenResume::Return(value) => {
                let result = iter_result(interp, value, true)?;
                interp.resolve_promise(step_promise, result)?;
            }
            GenResume::Throw(value) => {
                interp.reject_promise(step_promise, value)?;
            }
        }
        return Ok(Value::Ref(step_promise));
    }
    drive(interp, gen_id, resume)?;
    Ok(Value::Ref(step_promise))
}

/// Builds an iterator result object `{ value, done }`.
pub(crate) fn iter_result<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    value: Value,
    done: bool,
) -> RunResult<Value> {
    let result = interp.alloc_object()?;
    if let Some(obj) = interp.heap.object_mut(result) {
        obj.insert_value(PropertyKey::String("value".into()), value);
        obj.insert_value(PropertyKey::String("done".into()), Value::Bool(done));
    }
    Ok(Value::Ref(result))
}

// ==========================
// The machine

/// Inner outcome of one drive before promise settlement.
enum InnerOutcome {
    Yielded(Value),
    Done(Value),
    Await(Value),
}

/// Drives a suspended body with a resume completion until the next
/// suspension point or completion, settling async promises as needed.
pub(crate) fn drive<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    gen_id: HeapId,
    resume: GenResume,
) -> RunResult<StepOutcome> {
    let mut state = take_state(interp.heap, gen_id)?;
    if state.running {
        put_state(interp.heap, gen_id, state);
        return Err(RunError::type_error("Generator is already running"));
    }
    if state.done {
        let value = match resume {
            GenResume::Return(v) => v,
            _ => Value::Undefined,
        };
        put_state(interp.heap, gen_id, state);
        return Ok(StepOutcome::Done(value));
    }
    state.running = true;
    interp.ctx.plan_temps.push(std::mem::take(&mut state.temps));

    let inner = drive_inner(interp, gen_id, &mut state, resume);

    state.temps = interp.ctx.plan_temps.pop().unwrap_or_default();
    state.running = false;
    let is_async_fn = state.is_async_fn;
    let is_async_gen = state.is_async_gen;
    let result_promise = state.result_promise;
    let step_promise = state.step_promise;
    if matches!(inner, Ok(InnerOutcome::Done(_)) | Err(_)) {
        state.done = true;
    }
    put_state(interp.heap, gen_id, state);

    match inner {
        Ok(InnerOutcome::Await(value)) => {
            interp.await_value(value, gen_id)?;
            Ok(StepOutcome::Suspended)
        }
        Ok(InnerOutcome::Yielded(value)) => {
            if is_async_gen {
                if let Some(step) = step_promise {
                    let result = iter_result(interp, value, false)?;
                    interp.resolve_promise(step, result)?;
                }
                Ok(StepOutcome::Suspended)
            } else {
                Ok(StepOutcome::Yielded(value))
            }
        }
        Ok(InnerOutcome::Done(value)) => {
            if is_async_fn
                && let Some(promise) = result_promise
            {
                interp.resolve_promise(promise, value)?;
            }
            if is_async_gen
                && let Some(step) = step_promise
            {
                let result = iter_result(interp, value, true)?;
                interp.resolve_promise(step, result)?;
            }
            Ok(StepOutcome::Done(value))
        }
        Err(err) if err.is_catchable() && (is_async_fn || is_async_gen) => {
            let reason = interp.error_to_value(err)?;
            if let Some(promise) = result_promise {
                interp.reject_promise(promise, reason)?;
            }
            if let Some(step) = step_promise {
                interp.reject_promise(step, reason)?;
            }
            Ok(StepOutcome::Done(Value::Undefined))
        }
        Err(err) => Err(err),
    }
}

/// Routing decision produced by unwinding helpers: either keep stepping at
/// a new ip, or finish with a result.
enum Flow {
    Continue,
    Finish(InnerOutcome),
    Fail(RunError),
}

fn drive_inner<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    gen_id: HeapId,
    st: &mut GeneratorState,
    resume: GenResume,
) -> Result<InnerOutcome, RunError> {
    // Feed the resume completion in.
    if !st.started {
        match resume {
            GenResume::Next(_) => st.started = true,
            GenResume::Return(value) => return Ok(InnerOutcome::Done(value)),
            GenResume::Throw(value) => return Err(RunError::throw(value)),
        }
    } else if st.delegate.is_some() {
        match delegate_resume(interp, st, resume)? {
            Flow::Continue => {}
            Flow::Finish(outcome) => return Ok(outcome),
            Flow::Fail(err) => match unwind_throw(interp, st, err)? {
                Flow::Continue => {}
                Flow::Finish(outcome) => return Ok(outcome),
                Flow::Fail(err) => return Err(err),
            },
        }
    } else {
        match resume {
            GenResume::Next(value) => {
                if let Some(slot) = st.resume_temp.take() {
                    set_temp(interp, slot, value);
                }
            }
            GenResume::Throw(value) => match unwind_throw(interp, st, RunError::throw(value))? {
                Flow::Continue => {}
                Flow::Finish(outcome) => return Ok(outcome),
                Flow::Fail(err) => return Err(err),
            },
            GenResume::Return(value) => match unwind_return(interp, st, value)? {
                Flow::Continue => {}
                Flow::Finish(outcome) => return Ok(outcome),
                Flow::Fail(err) => return Err(err),
            },
        }
    }

    // The step loop.
    let plan = Rc::clone(&st.plan);
    loop {
        interp.heap.tracker_mut().check_statement()?;
        let Some(step) = plan.steps.get(st.ip) else {
            return Ok(InnerOutcome::Done(Value::Undefined));
        };
        let flow = run_step(interp, st, step)?;
        match flow {
            Flow::Continue => {}
            Flow::Finish(outcome) => return Ok(outcome),
            Flow::Fail(err) => return Err(err),
        }
    }
}

fn get_temp<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &Interp<'_, '_, T, C, Tr>,
    slot: u16,
) -> Value {
    interp
        .ctx
        .plan_temps
        .last()
        .and_then(|temps| temps.get(slot as usize).copied())
        .unwrap_or(Value::Undefined)
}

fn set_temp<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    slot: u16,
    value: Value,
) {
    if let Some(temps) = interp.ctx.plan_temps.last_mut()
        && let Some(entry) = temps.get_mut(slot as usize)
    {
        *entry = value;
    }
}

fn run_step<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    st: &mut GeneratorState,
    step: &PlanStep,
) -> Result<Flow, RunError> {
    match step {
        PlanStep::Stmt(statement) => match interp.eval_stmt(st.env, statement) {
            Ok(Completion::Normal(_)) => {
                st.ip += 1;
                Ok(Flow::Continue)
            }
            Ok(Completion::Return(value)) => unwind_return(interp, st, value),
            Ok(Completion::Break(label)) => unwind_break_continue(interp, st, UnwindKind::Break(label)),
            Ok(Completion::Continue(label)) => unwind_break_continue(interp, st, UnwindKind::Continue(label)),
            Err(err) => unwind_throw(interp, st, err),
        },
        PlanStep::EvalTemp { temp, expr } => match interp.eval_expr(st.env, expr) {
            Ok(value) => {
                set_temp(interp, *temp, value);
                st.ip += 1;
                Ok(Flow::Continue)
            }
            Err(err) => unwind_throw(interp, st, err),
        },
        PlanStep::EvalDrop { expr } => match interp.eval_expr(st.env, expr) {
            Ok(_) => {
                st.ip += 1;
                Ok(Flow::Continue)
            }
            Err(err) => unwind_throw(interp, st, err),
        },
        PlanStep::Bind {
            kind,
            pattern,
            temp,
            span,
        } => {
            let value = get_temp(interp, *temp);
            let mode = match kind {
                Some(DeclKind::Var) => BindMode::Var,
                Some(DeclKind::Let | DeclKind::Const) => BindMode::Lexical,
                None => BindMode::Assign,
            };
            match interp.bind_pattern(st.env, pattern, value, mode, *span) {
                Ok(()) => {
                    st.ip += 1;
                    Ok(Flow::Continue)
                }
                Err(err) => unwind_throw(interp, st, err),
            }
        }
        PlanStep::Jump(target) => {
            st.ip = *target;
            Ok(Flow::Continue)
        }
        PlanStep::JumpIfFalse { expr, target } => match interp.eval_expr(st.env, expr) {
            Ok(value) => {
                st.ip = if value.truthy(interp.heap, interp.interns) {
                    st.ip + 1
                } else {
                    *target
                };
                Ok(Flow::Continue)
            }
            Err(err) => unwind_throw(interp, st, err),
        },
        PlanStep::PushScope { lexicals, functions } => {
            let saved_env = st.env;
            let mode = interp.envs.mode(st.env);
            let scope = interp.envs.push(Some(st.env), ScopeKind::Block, mode);
            for (name, is_const) in lexicals {
                if let Err(err) = interp.envs.define(scope, *name, Binding::lexical(*is_const)) {
                    let err = interp.binding_error(err, SourceSpan::default());
                    return unwind_throw(interp, st, err);
                }
            }
            st.env = scope;
            st.blocks.push(BlockInfo::Scope { saved_env });
            for func in functions {
                let def = interp.interns.get_function(*func);
                if let Some(name) = def.name {
                    match interp.create_function_value(*func, scope) {
                        Ok(value) => interp.envs.define_unchecked(scope, name, Binding::var(value)),
                        Err(err) => return unwind_throw(interp, st, err),
                    }
                }
            }
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::PushWith { temp, span } => {
            let value = get_temp(interp, *temp);
            let Value::Ref(id) = value else {
                let err = RunError::raise_at(ErrorKind::TypeError, "'with' requires an object", *span);
                return unwind_throw(interp, st, err);
            };
            let saved_env = st.env;
            let mode = interp.envs.mode(st.env);
            let scope = interp.envs.push(Some(st.env), ScopeKind::With, mode);
            interp.envs.scope_mut(scope).with_object = Some(id);
            st.env = scope;
            st.blocks.push(BlockInfo::Scope { saved_env });
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::PushLoop {
            labels,
            continue_ip,
            break_ip,
            head_lexicals,
            per_iteration,
            iterator,
        } => {
            let saved_env = st.env;
            let mode = interp.envs.mode(st.env);
            let head_env = interp.envs.push(Some(st.env), ScopeKind::Block, mode);
            for (name, is_const) in head_lexicals {
                if let Err(err) = interp.envs.define(head_env, *name, Binding::lexical(*is_const)) {
                    let err = interp.binding_error(err, SourceSpan::default());
                    return unwind_throw(interp, st, err);
                }
            }
            st.env = head_env;
            st.blocks.push(BlockInfo::Loop {
                labels: labels.clone(),
                continue_ip: *continue_ip,
                break_ip: *break_ip,
                saved_env,
                head_env,
                per_iteration: per_iteration.clone(),
                iterator: *iterator,
            });
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::PushBreakable { labels, break_ip } => {
            st.blocks.push(BlockInfo::Breakable {
                labels: labels.clone(),
                break_ip: *break_ip,
                saved_env: st.env,
            });
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::PopBlock => {
            match st.blocks.pop() {
                Some(
                    BlockInfo::Scope { saved_env }
                    | BlockInfo::Loop { saved_env, .. }
                    | BlockInfo::Breakable { saved_env, .. }
                    | BlockInfo::Handler { saved_env, .. },
                ) => st.env = saved_env,
                None => return Err(RunError::internal("plan block stack underflow")),
            }
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::FreshIteration => {
            let Some(BlockInfo::Loop {
                saved_env,
                head_env,
                per_iteration,
                ..
            }) = st.blocks.last_mut()
            else {
                return Err(RunError::internal("per-iteration copy outside a loop"));
            };
            let parent = *saved_env;
            let old_head = *head_env;
            let names = per_iteration.clone();
            let mode = interp.envs.mode(parent);
            let fresh = interp.envs.push(Some(parent), ScopeKind::Block, mode);
            interp.envs.copy_bindings(old_head, fresh, &names);
            if let Some(BlockInfo::Loop { head_env, .. }) = st.blocks.last_mut() {
                *head_env = fresh;
            }
            st.env = fresh;
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::PushHandler { catch_ip, finally_ip } => {
            st.blocks.push(BlockInfo::Handler {
                catch_ip: *catch_ip,
                finally_ip: *finally_ip,
                saved_env: st.env,
            });
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::PopHandler => {
            match st.blocks.pop() {
                Some(BlockInfo::Handler { saved_env, .. }) => st.env = saved_env,
                _ => return Err(RunError::internal("handler stack mismatch")),
            }
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::CatchBind { param, span } => {
            let err = st
                .pending_throw
                .take()
                .ok_or_else(|| RunError::internal("catch entered without a pending throw"))?;
            let thrown = match interp.error_to_value(err) {
                Ok(value) => value,
                Err(err) => return unwind_throw(interp, st, err),
            };
            let saved_env = st.env;
            let mode = interp.envs.mode(st.env);
            let scope = interp.envs.push(Some(st.env), ScopeKind::Catch, mode);
            st.env = scope;
            st.blocks.push(BlockInfo::Scope { saved_env });
            if let Some(pattern) = param {
                let mut names = Vec::new();
                pattern.bound_names(&mut names);
                for name in names {
                    interp
                        .envs
                        .define_unchecked(scope, name, Binding::catch_param(Value::Undefined));
                }
                if let Err(err) = interp.bind_pattern(scope, pattern, thrown, BindMode::CatchParam, *span) {
                    return unwind_throw(interp, st, err);
                }
            }
            st.ip += 1;
            Ok(Flow::Continue)
        }
        PlanStep::EndFinally => match st.pending.take() {
            None => {
                st.ip += 1;
                Ok(Flow::Continue)
            }
            Some(Pending::Throw(err)) => unwind_throw(interp, st, err),
            Some(Pending::Break(label)) => unwind_break_continue(interp, st, UnwindKind::Break(label)),
            Some(Pending::Continue(label)) => unwind_break_continue(interp, st, UnwindKind::Continue(label)),
            Some(Pending::Return(value)) => unwind_return(interp, st, value),
        },
        PlanStep::Yield { value, resume_temp } => {
            let yielded = value.map_or(Value::Undefined, |slot| get_temp(interp, slot));
            st.resume_temp = Some(*resume_temp);
            st.ip += 1;
            interp.tracer.on_yield();
            Ok(Flow::Finish(InnerOutcome::Yielded(yielded)))
        }
        PlanStep::Await { value, resume_temp } => {
            let awaited = get_temp(interp, *value);
            st.resume_temp = Some(*resume_temp);
            st.ip += 1;
            interp.tracer.on_await();
            Ok(Flow::Finish(InnerOutcome::Await(awaited)))
        }
        PlanStep::Delegate {
            iterable,
            resume_temp,
            span,
        } => {
            let target = get_temp(interp, *iterable);
            let record = match interp.get_iterator(target, st.is_async_gen, *span) {
                Ok(record) => record,
                Err(err) => return unwind_throw(interp, st, err),
            };
            st.delegate = Some(DelegateState {
                record,
                resume_temp: *resume_temp,
                span: *span,
            });
            st.ip += 1;
            match delegate_resume(interp, st, GenResume::Next(Value::Undefined))? {
                Flow::Continue => Ok(Flow::Continue),
                other => Ok(other),
            }
        }
        PlanStep::Unwind { kind } => unwind_break_continue(interp, st, *kind),
        PlanStep::ReturnTemp { temp } => {
            let value = temp.map_or(Value::Undefined, |slot| get_temp(interp, slot));
            unwind_return(interp, st, value)
        }
        PlanStep::ThrowTemp { temp, span } => {
            let value = get_temp(interp, *temp);
            let mut err = RunError::throw(value);
            err.push_frame(crate::error::RawStackFrame::new(*span));
            unwind_throw(interp, st, err)
        }
        PlanStep::GetIterator {
            from,
            iter,
            is_async,
            span,
        } => {
            let target = get_temp(interp, *from);
            match interp.get_iterator(target, *is_async, *span) {
                Ok(record) => {
                    set_temp(interp, iter.iterator, record.iterator);
                    set_temp(interp, iter.next_method, record.next_method);
                    st.ip += 1;
                    Ok(Flow::Continue)
                }
                Err(err) => unwind_throw(interp, st, err),
            }
        }
        PlanStep::IterNext { iter, out, span } => {
            let record = iter_record(interp, *iter);
            match interp.call_value(record.next_method, record.iterator, vec![], None, *span) {
                Ok(result) => {
                    set_temp(interp, *out, result);
                    st.ip += 1;
                    Ok(Flow::Continue)
                }
                Err(err) => unwind_throw(interp, st, err),
            }
        }
        PlanStep::IterUnpack {
            result,
            value_out,
            done_target,
            span,
        } => {
            let raw = get_temp(interp, *result);
            match interp.iterator_step_result(raw, *span) {
                Ok((value, done)) => {
                    if done {
                        st.ip = *done_target;
                    } else {
                        set_temp(interp, *value_out, value);
                        st.ip += 1;
                    }
                    Ok(Flow::Continue)
                }
                Err(err) => unwind_throw(interp, st, err),
            }
        }
    }
}

fn iter_record<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &Interp<'_, '_, T, C, Tr>,
    temps: IterTemps,
) -> IteratorRecord {
    IteratorRecord {
        iterator: get_temp(interp, temps.iterator),
        next_method: get_temp(interp, temps.next_method),
        is_async: false,
    }
}

// ==========================
// yield* delegation

fn delegate_resume<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    st: &mut GeneratorState,
    resume: GenResume,
) -> Result<Flow, RunError> {
    let delegate = st.delegate.clone().expect("delegate state present");
    let span = delegate.span;
    match resume {
        GenResume::Next(value) => {
            let step = interp.iterator_next(&delegate.record, Some(value), span);
            finish_delegate_step(interp, st, &delegate, step)
        }
        GenResume::Throw(value) => {
            let throw_method = interp.get_method(
                delegate.record.iterator,
                PropertyKeyRef::String(StaticStrings::Throw.as_str()),
                span,
            )?;
            match throw_method {
                Some(method) => {
                    let step = interp
                        .call_value(method, delegate.record.iterator, vec![value], None, span)
                        .and_then(|result| interp.iterator_step_result(result, span));
                    finish_delegate_step(interp, st, &delegate, step)
                }
                None => {
                    // A delegate without `throw` is closed, then the outer
                    // generator throws.
                    st.delegate = None;
                    let _ = interp.iterator_close(&delegate.record, span);
                    Ok(Flow::Fail(RunError::raise_at(
                        ErrorKind::TypeError,
                        "The iterator does not provide a 'throw' method",
                        span,
                    )))
                }
            }
        }
        GenResume::Return(value) => {
            let return_method = interp.get_method(
                delegate.record.iterator,
                PropertyKeyRef::String(StaticStrings::Return.as_str()),
                span,
            )?;
            match return_method {
                Some(method) => {
                    let step = interp
                        .call_value(method, delegate.record.iterator, vec![value], None, span)
                        .and_then(|result| interp.iterator_step_result(result, span));
                    match step {
                        Ok((inner_value, true)) => {
                            st.delegate = None;
                            unwind_return(interp, st, inner_value)
                        }
                        Ok((inner_value, false)) => Ok(Flow::Finish(InnerOutcome::Yielded(inner_value))),
                        Err(err) => {
                            st.delegate = None;
                            Ok(Flow::Fail(err))
                        }
                    }
                }
                None => {
                    st.delegate = None;
                    unwind_return(interp, st, value)
                }
            }
        }
    }
}

fn finish_delegate_step<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    st: &mut GeneratorState,
    delegate: &DelegateState,
    step: RunResult<(Value, bool)>,
) -> Result<Flow, RunError> {
    match step {
        Ok((value, true)) => {
            st.delegate = None;
            set_temp(interp, delegate.resume_temp, value);
            Ok(Flow::Continue)
        }
        Ok((value, false)) => Ok(Flow::Finish(InnerOutcome::Yielded(value))),
        Err(err) => {
            st.delegate = None;
            Ok(Flow::Fail(err))
        }
    }
}

// ==========================
// Unwinding

fn unwind_throw<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    st: &mut GeneratorState,
    err: RunError,
) -> Result<Flow, RunError> {
    if !err.is_catchable() {
        return Ok(Flow::Fail(err));
    }
    let mut err = err;
    while let Some(block) = st.blocks.pop() {
        match block {
            BlockInfo::Scope { saved_env } | BlockInfo::Breakable { saved_env, .. } => st.env = saved_env,
            BlockInfo::Loop {
                saved_env, iterator, ..
            } => {
                if let Some(temps) = iterator {
                    let record = iter_record(interp, temps);
                    err = interp.close_iterator_on_error(&record, err, SourceSpan::default());
                }
                st.env = saved_env;
            }
            BlockInfo::Handler {
                catch_ip,
                finally_ip,
                saved_env,
            } => {
                st.env = saved_env;
                if let Some(catch_ip) = catch_ip {
                    st.pending_throw = Some(err);
                    st.ip = catch_ip;
                    return Ok(Flow::Continue);
                }
                if let Some(finally_ip) = finally_ip {
                    st.pending = Some(Pending::Throw(err));
                    st.ip = finally_ip;
                    return Ok(Flow::Continue);
                }
            }
        }
    }
    Ok(Flow::Fail(err))
}

fn unwind_return<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    st: &mut GeneratorState,
    value: Value,
) -> Result<Flow, RunError> {
    while let Some(block) = st.blocks.pop() {
        match block {
            BlockInfo::Scope { saved_env } | BlockInfo::Breakable { saved_env, .. } => st.env = saved_env,
            BlockInfo::Loop {
                saved_env, iterator, ..
            } => {
                if let Some(temps) = iterator {
                    let record = iter_record(interp, temps);
                    if let Err(close_err) = interp.iterator_close(&record, SourceSpan::default()) {
                        st.env = saved_env;
                        return unwind_throw(interp, st, close_err);
                    }
                }
                st.env = saved_env;
            }
            BlockInfo::Handler {
                finally_ip, saved_env, ..
            } => {
                st.env = saved_env;
                if let Some(finally_ip) = finally_ip {
                    st.pending = Some(Pending::Return(value));
                    st.ip = finally_ip;
                    return Ok(Flow::Continue);
                }
            }
        }
    }
    Ok(Flow::Finish(InnerOutcome::Done(value)))
}

fn unwind_break_continue<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    st: &mut GeneratorState,
    kind: UnwindKind,
) -> Result<Flow, RunError> {
    let label = match kind {
        UnwindKind::Break(label) | UnwindKind::Continue(label) => label,
    };
    let is_break = matches!(kind, UnwindKind::Break(_));
    while let Some(block) = st.blocks.pop() {
        match block {
            BlockInfo::Scope { saved_env } => st.env = saved_env,
            BlockInfo::Breakable {
                labels,
                break_ip,
                saved_env,
            } => {
                st.env = saved_env;
                // Unlabeled breaks stop at the nearest breakable (switch).
                if is_break && label.is_none_or(|l| labels.contains(&l)) {
                    st.ip = break_ip;
                    return Ok(Flow::Continue);
                }
            }
            BlockInfo::Loop {
                labels,
                continue_ip,
                break_ip,
                saved_env,
                head_env,
                per_iteration,
                iterator,
            } => {
                let matches_label = label.is_none() || label.is_some_and(|l| labels.contains(&l));
                if matches_label {
                    if is_break {
                        if let Some(temps) = iterator {
                            let record = iter_record(interp, temps);
                            if let Err(close_err) = interp.iterator_close(&record, SourceSpan::default()) {
                                st.env = saved_env;
                                return unwind_throw(interp, st, close_err);
                            }
                        }
                        st.env = saved_env;
                        st.ip = break_ip;
                    } else {
                        // Continue: the loop block stays, execution resumes
                        // at the per-iteration step inside the head scope.
                        st.env = head_env;
                        st.blocks.push(BlockInfo::Loop {
                            labels,
                            continue_ip,
                            break_ip,
                            saved_env,
                            head_env,
                            per_iteration,
                            iterator,
                        });
                        st.ip = continue_ip;
                    }
                    return Ok(Flow::Continue);
                }
                // Not the target loop: close its iterator and keep going.
                if let Some(temps) = iterator {
                    let record = iter_record(interp, temps);
                    if let Err(close_err) = interp.iterator_close(&record, SourceSpan::default()) {
                        st.env = saved_env;
                        return unwind_throw(interp, st, close_err);
                    }
                }
                st.env = saved_env;
            }
            BlockInfo::Handler {
                finally_ip, saved_env, ..
            } => {
                st.env = saved_env;
                if let Some(finally_ip) = finally_ip {
                    st.pending = Some(match kind {
                        UnwindKind::Break(label) => Pending::Break(label),
                        UnwindKind::Continue(label) => Pending::Continue(label),
                    });
                    st.ip = finally_ip;
                    return Ok(Flow::Continue);
                }
            }
        }
    }
    Err(RunError::internal("unmatched break or continue in a plan"))
}
