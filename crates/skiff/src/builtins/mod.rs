//! Engine-provided builtins.
//!
//! Each builtin is one variant of [`NativeFn`]; callable values carry the
//! variant inline (`Value::Native`) or behind a property-bearing heap object
//! (constructors). Dispatch is a single match forwarding into the per-area
//! modules, mirroring how guest calls reach them.

mod array;
mod error;
mod function;
mod global;
mod iteration;
mod math;
mod object;
mod promise;
mod string;
mod typed_array;

use crate::{
    error::{ErrorKind, RunError, RunResult},
    heap::HeapId,
    interp::Interp,
    io::ConsoleWriter,
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

/// Every engine-provided callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeFn {
    // globals
    EvalStub,
    ParseInt,
    ParseFloat,
    GlobalIsNaN,
    GlobalIsFinite,
    AwaitHelper,
    // console
    ConsoleLog,
    ConsoleError,
    // Object
    ObjectCtor,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectFreeze,
    ObjectIsFrozen,
    ObjectGetPrototypeOf,
    ObjectDefineProperty,
    ObjectGetOwnPropertyNames,
    ObjectCreate,
    ObjectAssign,
    ObjectProtoHasOwnProperty,
    ObjectProtoToString,
    ObjectProtoValueOf,
    // Function.prototype
    FunctionProtoCall,
    FunctionProtoApply,
    FunctionProtoBind,
    // Array
    ArrayCtor,
    ArrayIsArray,
    ArrayOf,
    ArrayProtoPush,
    ArrayProtoPop,
    ArrayProtoShift,
    ArrayProtoSlice,
    ArrayProtoJoin,
    ArrayProtoIndexOf,
    ArrayProtoIncludes,
    ArrayProtoForEach,
    ArrayProtoMap,
    ArrayProtoFilter,
    ArrayProtoConcat,
    ArrayProtoKeys,
    ArrayProtoValues,
    ArrayProtoEntries,
    // String.prototype
    StringProtoSlice,
    StringProtoIndexOf,
    StringProtoIncludes,
    StringProtoCharAt,
    StringProtoCharCodeAt,
    StringProtoToUpperCase,
    StringProtoToLowerCase,
    StringProtoSplit,
    StringProtoTrim,
    StringProtoRepeat,
    StringProtoStartsWith,
    StringProtoEndsWith,
    StringProtoIterator,
    // Number / Boolean
    NumberCtor,
    NumberIsNaN,
    NumberIsFinite,
    NumberIsInteger,
    BooleanCtor,
    StringCtor,
    // Symbol
    SymbolCtor,
    // Errors
    ErrorCtor(ErrorKind),
    ErrorProtoToString,
    // Promise
    PromiseCtor,
    PromiseResolve,
    PromiseReject,
    PromiseProtoThen,
    PromiseProtoCatch,
    /// Per-promise resolving function handed to executors and thenables.
    PromiseResolveSlot(HeapId),
    PromiseRejectSlot(HeapId),
    // Math
    MathFloor,
    MathCeil,
    MathRound,
    MathAbs,
    MathMax,
    MathMin,
    MathPow,
    MathSqrt,
    MathTrunc,
    MathSign,
    // Iterator / generator protocol
    NativeIterNext,
    IterSelf,
    GeneratorNext,
    GeneratorReturn,
    GeneratorThrow,
    // RegExp / typed arrays
    RegExpCtor,
    Float64ArrayCtor,
    Int32ArrayCtor,
    Uint8ArrayCtor,
}

/// Invokes a builtin.
pub(crate) fn invoke_native<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    func: NativeFn,
    this: Value,
    args: Vec<Value>,
    new_target: Option<Value>,
    span: SourceSpan,
) -> RunResult<Value> {
    use NativeFn as N;
    match func {
        N::EvalStub => Err(RunError::raise_at(
            ErrorKind::TypeError,
            "eval of source text is not supported",
            span,
        )),
        N::ParseInt => global::parse_int(interp, &args, span),
        N::ParseFloat => global::parse_float(interp, &args, span),
        N::GlobalIsNaN => global::is_nan(interp, &args, span),
        N::GlobalIsFinite => global::is_finite(interp, &args, span),
        N::AwaitHelper => interp.promise_resolved(args.first().copied().unwrap_or(Value::Undefined)),
        N::ConsoleLog | N::ConsoleError => global::console_write(interp, &args),
        N::ObjectCtor
        | N::ObjectKeys
        | N::ObjectValues
        | N::ObjectEntries
        | N::ObjectFreeze
        | N::ObjectIsFrozen
        | N::ObjectGetPrototypeOf
        | N::ObjectDefineProperty
        | N::ObjectGetOwnPropertyNames
        | N::ObjectCreate
        | N::ObjectAssign
        | N::ObjectProtoHasOwnProperty
        | N::ObjectProtoToString
        | N::ObjectProtoValueOf => object::invoke(interp, func, this, args, span),
        N::FunctionProtoCall | N::FunctionProtoApply | N::FunctionProtoBind => {
            function::invoke(interp, func, this, args, span)
        }
        N::ArrayCtor
        | N::ArrayIsArray
        | N::ArrayOf
        | N::ArrayProtoPush
        | N::ArrayProtoPop
        | N::ArrayProtoShift
        | N::ArrayProtoSlice
        | N::ArrayProtoJoin
        | N::ArrayProtoIndexOf
        | N::ArrayProtoIncludes
        | N::ArrayProtoForEach
        | N::ArrayProtoMap
        | N::ArrayProtoFilter
        | N::ArrayProtoConcat
        | N::ArrayProtoKeys
        | N::ArrayProtoValues
        | N::ArrayProtoEntries => array::invoke(interp, func, this, args, span),
        N::StringProtoSlice
        | N::StringProtoIndexOf
        | N::StringProtoIncludes
        | N::StringProtoCharAt
        | N::StringProtoCharCodeAt
        | N::StringProtoToUpperCase
        | N::StringProtoToLowerCase
        | N::StringProtoSplit
        | N::StringProtoTrim
        | N::StringProtoRepeat
        | N::StringProtoStartsWith
        | N::StringProtoEndsWith
        | N::StringProtoIterator
        | N::StringCtor => string::invoke(interp, func, this, args, span),
        N::NumberCtor | N::NumberIsNaN | N::NumberIsFinite | N::NumberIsInteger | N::BooleanCtor => {
            global::number_invoke(interp, func, &args, span)
        }
        N::SymbolCtor => {
            if new_target.is_some() {
                return Err(RunError::raise_at(
                    ErrorKind::TypeError,
                    "Symbol is not a constructor",
                    span,
                ));
            }
            let description = match args.first() {
                None | Some(Value::Undefined) => None,
                Some(value) => Some(interp.to_string_rust(*value, span)?),
            };
            Ok(Value::Symbol(interp.ctx.alloc_symbol(description)))
        }
        N::ErrorCtor(kind) => error::construct_error(interp, kind, &args, span),
        N::ErrorProtoToString => error::error_to_string(interp, this, span),
        N::PromiseCtor
        | N::PromiseResolve
        | N::PromiseReject
        | N::PromiseProtoThen
        | N::PromiseProtoCatch
        | N::PromiseResolveSlot(_)
        | N::PromiseRejectSlot(_) => promise::invoke(interp, func, this, args, new_target, span),
        N::MathFloor
        | N::MathCeil
        | N::MathRound
        | N::MathAbs
        | N::MathMax
        | N::MathMin
        | N::MathPow
        | N::MathSqrt
        | N::MathTrunc
        | N::MathSign => math::invoke(interp, func, &args, span),
        N::NativeIterNext | N::IterSelf | N::GeneratorNext | N::GeneratorReturn | N::GeneratorThrow => {
            iteration::invoke(interp, func, this, args, span)
        }
        N::RegExpCtor => global::regexp_ctor(interp, &args, span),
        N::Float64ArrayCtor | N::Int32ArrayCtor | N::Uint8ArrayCtor => {
            typed_array::construct(interp, func, &args, span)
        }
    }
}
