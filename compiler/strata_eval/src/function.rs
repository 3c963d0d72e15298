//! User-defined function invocation.

use strata_ir::{Definition, EvalError, Value};

use crate::eval::{eval_statements, resolve, settle, Env};
use crate::resolver::Resolver;
use crate::scope::LocalFrame;

/// Invoke `definition` with already-resolved arguments.
///
/// Every invocation evaluates a fresh copy of the defaults and the body, so
/// repeated calls never observe each other's memoized values. A `return`
/// ends the body and yields its value.
pub fn invoke_function(
    definition: &Definition,
    args: Vec<Value>,
    resolver: &dyn Resolver,
) -> Result<Value, EvalError> {
    check_arity(definition, args.len())?;

    let frame = LocalFrame::new();
    let env = Env::new(resolver, &frame);

    let mut args = args.into_iter();
    for param in &definition.params {
        let value = if param.splat {
            Value::Array(args.by_ref().collect())
        } else if let Some(arg) = args.next() {
            arg
        } else if let Some(default) = &param.default {
            settle(resolve(&default.clone(), &env))?
        } else {
            Value::Undef
        };
        frame.bind(param.name.as_str(), value);
    }

    let body = definition.body.clone();
    let value = eval_statements(&body, &env)?;

    if let Some(returns) = &definition.returns {
        if let Value::Type(expected) = settle(resolve(&returns.clone(), &env))? {
            if !expected.accepts(&value) {
                return Err(EvalError::ReturnType {
                    name: definition.name.clone(),
                    expected: expected.to_string(),
                    actual: value.type_name().to_string(),
                });
            }
        }
    }
    Ok(value)
}

fn check_arity(definition: &Definition, got: usize) -> Result<(), EvalError> {
    let required = definition
        .params
        .iter()
        .filter(|p| !p.splat && p.default.is_none())
        .count();
    let positional = definition.params.iter().filter(|p| !p.splat).count();
    let variadic = definition.params.iter().any(|p| p.splat);

    let expected = if got < required {
        required
    } else if !variadic && got > positional {
        positional
    } else {
        return Ok(());
    };
    Err(EvalError::Arity {
        name: definition.name.clone(),
        expected,
        got,
    })
}
