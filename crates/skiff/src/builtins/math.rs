//! The `Math` namespace functions used by the test realm.

use crate::{
    builtins::NativeFn,
    error::RunResult,
    interp::Interp,
    io::ConsoleWriter,
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

pub(super) fn invoke<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer>(
    interp: &mut Interp<'_, '_, T, C, Tr>,
    func: NativeFn,
    args: &[Value],
    span: SourceSpan,
) -> RunResult<Value> {
    let first = || args.first().copied().unwrap_or(Value::Undefined);
    let result = match func {
        NativeFn::MathFloor => interp.to_number(first(), span)?.floor(),
        NativeFn::MathCeil => interp.to_number(first(), span)?.ceil(),
        NativeFn::MathRound => {
            let n = interp.to_number(first(), span)?;
            // JS rounds .5 toward +Infinity, unlike f64::round.
            (n + 0.5).floor()
        }
        NativeFn::MathAbs => interp.to_number(first(), span)?.abs(),
        NativeFn::MathSqrt => interp.to_number(first(), span)?.sqrt(),
        NativeFn::MathTrunc => interp.to_number(first(), span)?.trunc(),
        NativeFn::MathSign => {
            let n = interp.to_number(first(), span)?;
            if n.is_nan() || n == 0.0 { n } else { n.signum() }
        }
        NativeFn::MathPow => {
            let base = interp.to_number(first(), span)?;
            let exponent = interp.to_number(args.get(1).copied().unwrap_or(Value::Undefined), span)?;
            base.powf(exponent)
        }
        NativeFn::MathMax => {
            let mut best = f64::NEG_INFINITY;
            for arg in args {
                let n = interp.to_number(*arg, span)?;
                if n.is_nan() {
                    best = f64::NAN;
                    break;
                }
                if n > best {
                    best = n;
                }
            }
            best
        }
        NativeFn::MathMin => {
            let mut best = f64::INFINITY;
            for arg in args {
                let n = interp.to_number(*arg, span)?;
                if n.is_nan() {
                    best = f64::NAN;
                    break;
                }
                if n < best {
                    best = n;
                }
            }
            best
        }
        _ => unreachable!("routed by dispatch"),
    };
    Ok(Value::Number(result))
}
