#![doc = include_str!("../../../README.md")]
#![expect(dead_code, reason = "embedding shims keep some currently-unused APIs")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts mirror ECMAScript ToUint32")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior mirrors ECMAScript ToInt32")]
#![expect(clippy::unnecessary_wraps, reason = "dispatch signatures are uniform")]
#![expect(clippy::needless_pass_by_value, reason = "call APIs pass values consistently")]
#![expect(clippy::struct_excessive_bools, reason = "state mirrors ECMAScript record fields")]
#![expect(clippy::too_many_arguments, reason = "call protocol requires wide signatures")]
#![expect(clippy::float_cmp, reason = "ECMAScript equality requires exact float comparison")]

mod ast;
mod builder;
mod builtins;
mod context;
mod cps;
mod environment;
mod error;
mod exception;
mod fold;
mod generator;
mod genplan;
mod heap;
mod host;
mod intern;
mod interp;
mod io;
mod iterator;
mod object;
mod promise;
mod realm;
mod resource;
mod run;
mod span;
mod tracer;
mod value;

pub use crate::{
    error::ErrorKind,
    exception::{CodeLoc, Exception, StackFrame},
    host::{HostCallError, HostDispatch, HostValue},
    io::{CollectStringConsole, ConsoleWriter, NoConsole, StdConsole},
    resource::{
        DEFAULT_MAX_CALL_DEPTH, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits,
        ResourceTracker,
    },
    run::Runner,
    tracer::{EvalTracer, NoopTracer, RecordingTracer, TraceEvent},
};
