//! Built-in functions.
//!
//! Built-ins are looked up before user functions and work purely against
//! the [`Resolver`](crate::Resolver) and the current scope.

use strata_ir::{EvalError, Expr, Interrupt, Outcome, ResolveError, Value};

use crate::eval::{resolve, resolve_all, Env};

/// Names handled by [`call_builtin`].
pub const BUILTINS: &[&str] = &[
    "alert",
    "contain",
    "create_resources",
    "debug",
    "defined",
    "ensure_packages",
    "err",
    "fail",
    "include",
    "info",
    "lookup",
    "notice",
    "require",
    "return",
    "warning",
];

/// Run the built-in `name`, or `None` if there is no such built-in.
pub(crate) fn call_builtin(call: &Expr, name: &str, args: &[Expr], env: &Env<'_>) -> Option<Outcome> {
    let outcome = match name {
        "alert" | "warning" => message(args, env).map(|msg| {
            tracing::warn!(function = name, "{msg}");
            Value::Undef
        }),
        "notice" | "info" => message(args, env).map(|msg| {
            tracing::info!(function = name, "{msg}");
            Value::Undef
        }),
        "err" => message(args, env).map(|msg| {
            tracing::error!(function = name, "{msg}");
            Value::Undef
        }),
        "debug" => message(args, env).map(|msg| {
            tracing::debug!(function = name, "{msg}");
            Value::Undef
        }),
        "create_resources" | "ensure_packages" => {
            tracing::trace!(function = name, "no-op built-in");
            Ok(Value::Undef)
        }
        "fail" => fail(call, args, env),
        "include" | "require" | "contain" => include(args, env),
        "return" => {
            let value = match args.first() {
                Some(arg) => match resolve(arg, env) {
                    Ok(value) => value,
                    Err(interrupt) => return Some(Err(interrupt)),
                },
                None => Value::Undef,
            };
            Err(Interrupt::Return(value))
        }
        "lookup" => lookup(args, env),
        "defined" => defined(args, env),
        _ => return None,
    };
    Some(outcome)
}

/// Arguments joined by spaces, as log and failure messages.
fn message(args: &[Expr], env: &Env<'_>) -> Result<String, Interrupt> {
    let values = resolve_all(args, env)?;
    Ok(values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" "))
}

fn fail(call: &Expr, args: &[Expr], env: &Env<'_>) -> Outcome {
    let message = message(args, env)?;
    Err(ResolveError {
        message,
        node: call.node_ref(),
    }
    .into())
}

/// Class names from arguments: arrays flattened, leading `::` stripped.
fn class_names(values: Vec<Value>, out: &mut Vec<String>) {
    for value in values {
        match value {
            Value::Array(items) => class_names(items, out),
            Value::Resource { title, .. } => out.push(title.trim_start_matches("::").to_string()),
            other => out.push(other.to_string().trim_start_matches("::").to_string()),
        }
    }
}

fn include(args: &[Expr], env: &Env<'_>) -> Outcome {
    let mut names = Vec::new();
    class_names(resolve_all(args, env)?, &mut names);
    for name in names {
        env.resolver.resolve_class(&name)?;
    }
    Ok(Value::Undef)
}

/// `lookup(key)`, `lookup(key, default)` or
/// `lookup(key, type, merge, default)`.
fn lookup(args: &[Expr], env: &Env<'_>) -> Outcome {
    let values = resolve_all(args, env)?;
    let Some(key) = values.first().map(ToString::to_string) else {
        return Err(EvalError::Arity {
            name: "lookup".to_string(),
            expected: 1,
            got: 0,
        }
        .into());
    };
    if let Some(found) = env.resolver.get_global_variable(&key) {
        return Ok(found);
    }
    let default = match values.as_slice() {
        [_, _, _, default, ..] => Some(default),
        [_, default] if !matches!(default, Value::Type(_)) => Some(default),
        _ => None,
    };
    default
        .cloned()
        .ok_or_else(|| EvalError::LookupMissing { key }.into())
}

/// `defined('$var')`, `defined('name')`: true when any argument names an
/// existing variable, function or class.
fn defined(args: &[Expr], env: &Env<'_>) -> Outcome {
    for value in resolve_all(args, env)? {
        let found = match &value {
            Value::String(s) => match s.strip_prefix('$') {
                Some(var) => {
                    env.scope.lookup(var).is_some()
                        || env.resolver.has_global_variable(var).exists()
                }
                None => {
                    let name = s.trim_start_matches("::");
                    BUILTINS.contains(&name)
                        || env.resolver.resolve_function(name)?.is_some()
                        || env.resolver.resolve_class(name).is_ok()
                }
            },
            Value::Resource { type_name, title } if type_name == "class" => {
                env.resolver.resolve_class(title).is_ok()
            }
            Value::Type(_) | Value::Resource { .. } => true,
            _ => false,
        };
        if found {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}
