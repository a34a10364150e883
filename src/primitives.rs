use std::time::{SystemTime, UNIX_EPOCH};

use crate::evaluator::{EvalResult, Interpreter, RuntimeError};
use crate::types::{Arity, NativeContext, Value};

/// Installs the built-in native functions into the interpreter's globals.
pub fn register_all(interpreter: &mut Interpreter) {
    interpreter.register_native("print", 0, prim_print);
    interpreter.register_native_with_arity("str", Arity::Exact(1), prim_str);
    interpreter.register_native_with_arity("len", Arity::Exact(1), prim_len);
    interpreter.register_native_with_arity("type", Arity::Exact(1), prim_type);
    interpreter.register_native_with_arity("abs", Arity::Exact(1), prim_abs);
    interpreter.register_native_with_arity("floor", Arity::Exact(1), prim_floor);
    interpreter.register_native_with_arity("sqrt", Arity::Exact(1), prim_sqrt);
    interpreter.register_native_with_arity("clock", Arity::Exact(0), prim_clock);
}

// Extracts a number from a Value or returns a TypeMismatch error
macro_rules! expect_number {
    ($value:expr, $ctx:expr, $name:expr) => {
        match $value {
            Value::Number(n) => n,
            other => {
                return Err(RuntimeError::TypeMismatch {
                    message: format!("'{}' expects a number, got {}", $name, other.type_name()),
                    span: $ctx.span,
                });
            }
        }
    };
}

// Arity has already been checked by the caller.
fn single(args: Vec<Value>) -> Value {
    args.into_iter().next().unwrap_or(Value::Nil)
}

/// Writes its arguments separated by spaces, then a newline.
pub fn prim_print(ctx: &mut NativeContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    let line = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let span = ctx.span;
    writeln!(ctx.out, "{}", line)
        .map_err(|e| RuntimeError::native(format!("print failed: {}", e), span))?;
    Ok(Value::Nil)
}

pub fn prim_str(_ctx: &mut NativeContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::String(single(args).to_string()))
}

pub fn prim_len(ctx: &mut NativeContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    match single(args) {
        Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
        other => Err(RuntimeError::TypeMismatch {
            message: format!("'len' expects a string, got {}", other.type_name()),
            span: ctx.span,
        }),
    }
}

pub fn prim_type(_ctx: &mut NativeContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    Ok(Value::String(single(args).type_name().to_string()))
}

pub fn prim_abs(ctx: &mut NativeContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    let n = expect_number!(single(args), ctx, "abs");
    Ok(Value::Number(n.abs()))
}

pub fn prim_floor(ctx: &mut NativeContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    let n = expect_number!(single(args), ctx, "floor");
    Ok(Value::Number(n.floor()))
}

pub fn prim_sqrt(ctx: &mut NativeContext<'_>, args: Vec<Value>) -> EvalResult<Value> {
    let n = expect_number!(single(args), ctx, "sqrt");
    if n < 0.0 {
        return Err(RuntimeError::native(
            format!("cannot take the square root of {}", n),
            ctx.span,
        ));
    }
    Ok(Value::Number(n.sqrt()))
}

/// Seconds since the Unix epoch, as a number.
pub fn prim_clock(ctx: &mut NativeContext<'_>, _args: Vec<Value>) -> EvalResult<Value> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| RuntimeError::native(format!("system clock error: {}", e), ctx.span))?;
    Ok(Value::Number(elapsed.as_secs_f64()))
}
