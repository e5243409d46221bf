//! Public interface for running skiff code.

use crate::{
    ast::Program,
    builder::parse_and_build,
    context::EvalContext,
    environment::{Binding, Environments},
    error::RunError,
    exception::Exception,
    heap::Heap,
    host::{HostDispatch, HostValue, from_host_value, thrown_to_parts, to_host_value},
    intern::{ExtFunctionId, Interns, StringId},
    interp::Interp,
    io::{ConsoleWriter, StdConsole},
    realm::Realm,
    resource::{NoLimitTracker, ResourceTracker},
    tracer::{EvalTracer, NoopTracer},
    value::Value,
};

/// Primary interface for running skiff code.
///
/// `Runner` parses and prepares a script once; each `run*` call executes it
/// against a fresh heap and realm, so runs never observe each other.
///
/// # Example
/// ```
/// use skiff::{HostValue, Runner};
///
/// let runner = Runner::new("x + 1".to_owned(), "test.js", vec!["x".to_owned()], vec![]).unwrap();
/// let result = runner.run_no_limits(vec![HostValue::Number(41.0)]).unwrap();
/// assert_eq!(result, HostValue::Number(42.0));
/// ```
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Runner {
    executor: Executor,
}

impl Runner {
    /// Parses, builds and folds the given script.
    ///
    /// # Arguments
    /// * `code` - The JavaScript source to execute
    /// * `script_name` - The script name for error messages
    /// * `input_names` - Global names bound to the run inputs
    /// * `external_functions` - Names of host functions dispatched at call time
    ///
    /// # Errors
    /// Returns `Exception` if the code cannot be parsed or uses unsupported
    /// syntax.
    pub fn new(
        code: String,
        script_name: &str,
        input_names: Vec<String>,
        external_functions: Vec<String>,
    ) -> Result<Self, Exception> {
        Executor::new(code, script_name, input_names, external_functions).map(|executor| Self { executor })
    }

    /// Returns the source that was parsed to create this runner.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.executor.code
    }

    /// Executes the script to completion.
    ///
    /// # Arguments
    /// * `inputs` - Values bound to `input_names`, in order
    /// * `tracker` - Resource tracker enforcing the sandbox limits
    /// * `console` - Sink for `console.log` output
    pub fn run(
        &self,
        inputs: Vec<HostValue>,
        tracker: impl ResourceTracker,
        console: &mut impl ConsoleWriter,
    ) -> Result<HostValue, Exception> {
        self.executor
            .execute(inputs, tracker, console, None, &mut NoopTracer)
    }

    /// Executes with no resource limits (beyond the call-depth ceiling),
    /// printing to stdout.
    pub fn run_no_limits(&self, inputs: Vec<HostValue>) -> Result<HostValue, Exception> {
        self.executor
            .execute(inputs, NoLimitTracker, &mut StdConsole, None, &mut NoopTracer)
    }

    /// Executes with host functions available through `externals`.
    pub fn run_with_externals(
        &self,
        inputs: Vec<HostValue>,
        externals: &mut dyn HostDispatch,
        tracker: impl ResourceTracker,
        console: &mut impl ConsoleWriter,
    ) -> Result<HostValue, Exception> {
        self.executor
            .execute(inputs, tracker, console, Some(externals), &mut NoopTracer)
    }

    /// Executes with an observer attached; tracing has no behavioral
    /// effect.
    pub fn run_traced(
        &self,
        inputs: Vec<HostValue>,
        tracker: impl ResourceTracker,
        console: &mut impl ConsoleWriter,
        tracer: &mut impl EvalTracer,
    ) -> Result<HostValue, Exception> {
        self.executor.execute(inputs, tracker, console, None, tracer)
    }

    /// Serializes the prepared script to a binary format.
    ///
    /// The serialized data can be stored and later restored with `load()`,
    /// avoiding re-parsing on subsequent runs.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes a runner from binary format.
    ///
    /// # Errors
    /// Returns an error if deserialization fails.
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Lower level interface holding the prepared program.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Executor {
    program: Program,
    interns: Interns,
    /// Interned ids of the input binding names, in declaration order.
    input_name_ids: Vec<StringId>,
    /// Interned ids of the external function binding names.
    external_name_ids: Vec<StringId>,
    /// Interned id of the script name for diagnostics.
    script_id: StringId,
    /// Source code for error reporting (snippet extraction).
    code: String,
}

impl Executor {
    fn new(
        code: String,
        script_name: &str,
        input_names: Vec<String>,
        external_functions: Vec<String>,
    ) -> Result<Self, Exception> {
        let output = parse_and_build(&code, script_name)?;
        let crate::builder::BuildOutput {
            mut program,
            mut functions,
            mut interner,
        } = output;

        crate::fold::fold(&mut program, &mut functions, &mut interner);
        crate::cps::rewrite_async_functions(&mut functions);

        let script_id = interner.intern(script_name);
        let input_name_ids: Vec<StringId> = input_names.iter().map(|name| interner.intern(name)).collect();
        let external_name_ids: Vec<StringId> = external_functions.iter().map(|name| interner.intern(name)).collect();

        let interns = Interns::new(interner, functions, external_functions);
        Ok(Self {
            program,
            interns,
            input_name_ids,
            external_name_ids,
            script_id,
            code,
        })
    }

    fn execute<'a>(
        &self,
        inputs: Vec<HostValue>,
        tracker: impl ResourceTracker + 'a,
        console: &'a mut impl ConsoleWriter,
        externals: Option<&'a mut dyn HostDispatch>,
        tracer: &'a mut impl EvalTracer,
    ) -> Result<HostValue, Exception> {
        if inputs.len() != self.input_name_ids.len() {
            return Err(Exception::runtime_error(format!(
                "expected {} inputs, got {}",
                self.input_name_ids.len(),
                inputs.len()
            )));
        }

        let mut heap = Heap::new(64, tracker);
        let mut envs = Environments::new();
        let realm = Realm::install(&mut heap, &mut envs, self.program.strict)
            .map_err(|e| Exception::runtime_error(e.to_string()))?;

        // External functions first, then inputs, both as ordinary globals.
        for (index, &name) in self.external_name_ids.iter().enumerate() {
            envs.define_unchecked(
                realm.global_env,
                name,
                Binding::var(Value::ExtFunction(ExtFunctionId::new(index))),
            );
        }
        for (&name, input) in self.input_name_ids.iter().zip(&inputs) {
            let value = from_host_value(input, &mut heap, realm)
                .map_err(|_| Exception::runtime_error("invalid input value"))?;
            envs.define_unchecked(realm.global_env, name, Binding::var(value));
        }

        let mut ctx = EvalContext::new(self.script_id);
        let mut interp = Interp {
            heap: &mut heap,
            envs: &mut envs,
            interns: &self.interns,
            ctx: &mut ctx,
            console,
            tracer,
            externals,
            realm,
        };

        let result = interp.run_program(&self.program);
        drop(interp);

        match result {
            Ok(value) => to_host_value(value, &heap, &self.interns, &ctx)
                .map_err(|e| e.into_exception(&self.interns, &self.code)),
            Err(RunError::Throw(thrown)) => {
                let (name, message) = thrown_to_parts(thrown.value, &heap, &self.interns);
                Err(Exception::new(
                    name,
                    message,
                    crate::error::frames_to_public(&thrown.frames, &self.interns, &self.code),
                ))
            }
            Err(err) => Err(err.into_exception(&self.interns, &self.code)),
        }
    }
}
