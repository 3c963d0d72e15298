//! Memoized, cycle-guarded expression resolution.
//!
//! [`resolve`] consults the node's [`ResolveCell`](strata_ir::ResolveCell)
//! before evaluating anything, so a node is evaluated at most once per tree
//! copy and re-entrant resolution answers `Undef` instead of recursing.
//!
//! `return` travels as [`Interrupt::Return`] through every nested
//! evaluation. Only [`eval_statements`], run at a class or function
//! boundary, turns it back into a value.

use indexmap::IndexMap;
use strata_ir::{
    BinaryOp, CaseOption, CompilationError, DefinitionKind, EvalError, Expr, ExprKind, Interrupt,
    Outcome, ResourceDecl, TypeRef, Value,
};

use crate::builtins::call_builtin;
use crate::function::invoke_function;
use crate::instance::DeclaredResource;
use crate::operators::evaluate_binary;
use crate::resolver::Resolver;
use crate::scope::Scope;
use crate::stack::ensure_sufficient_stack;
use crate::unary_operators::evaluate_unary;

/// Core type names. Any other capitalized name used with `[...]` is a
/// resource reference (`File['/etc/motd']`).
const CORE_TYPES: &[&str] = &[
    "Any", "Array", "Boolean", "Callable", "CatalogEntry", "Collection", "Data", "Default",
    "Enum", "Float", "Hash", "Integer", "Iterable", "Iterator", "NotUndef", "Numeric", "Object",
    "Optional", "Pattern", "Regexp", "Runtime", "Scalar", "ScalarData", "SemVer", "SemVerRange",
    "Sensitive", "String", "Struct", "Timespan", "Timestamp", "Tuple", "Type", "Undef", "Variant",
];

/// What an expression is evaluated against.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub resolver: &'a dyn Resolver,
    pub scope: &'a dyn Scope,
}

impl<'a> Env<'a> {
    pub fn new(resolver: &'a dyn Resolver, scope: &'a dyn Scope) -> Self {
        Env { resolver, scope }
    }
}

/// Resolve one node, reusing its cached outcome when there is one.
pub fn resolve(expr: &Expr, env: &Env<'_>) -> Outcome {
    if let Some(cached) = expr.cell().begin() {
        return cached;
    }
    let outcome = ensure_sufficient_stack(|| eval_kind(expr, env));
    expr.cell().finish(&outcome);
    outcome
}

/// Evaluate a statement sequence at a class or function boundary.
///
/// Stops at the first `return` and yields its value; otherwise yields the
/// value of the last statement.
pub fn eval_statements(stmts: &[Expr], env: &Env<'_>) -> Result<Value, EvalError> {
    settle(eval_sequence(stmts, env))
}

/// Collapse a `return` into the value it carries.
pub fn settle(outcome: Outcome) -> Result<Value, EvalError> {
    match outcome {
        Ok(value) | Err(Interrupt::Return(value)) => Ok(value),
        Err(Interrupt::Error(e)) => Err(e),
    }
}

/// Evaluate statements in order, propagating `return`.
fn eval_sequence(stmts: &[Expr], env: &Env<'_>) -> Outcome {
    let mut last = Value::Undef;
    for stmt in stmts {
        last = resolve(stmt, env)?;
    }
    Ok(last)
}

pub(crate) fn resolve_all(exprs: &[Expr], env: &Env<'_>) -> Result<Vec<Value>, Interrupt> {
    exprs.iter().map(|e| resolve(e, env)).collect()
}

fn eval_kind(expr: &Expr, env: &Env<'_>) -> Outcome {
    match &expr.kind {
        ExprKind::Literal(value) => Ok(value.clone()),
        ExprKind::Default => Ok(Value::Default),
        ExprKind::Nop
        | ExprKind::Class(_)
        | ExprKind::DefinedType(_)
        | ExprKind::Function(_) => Ok(Value::Undef),
        ExprKind::Regex(pattern) => Ok(Value::Regex(pattern.clone())),
        ExprKind::TypeReference(name) => Ok(Value::Type(TypeRef::new(name.as_str()))),
        ExprKind::QualifiedName(name) => Ok(Value::string(name.as_str())),
        ExprKind::List(items) => resolve_all(items, env).map(Value::Array),
        ExprKind::Hash(entries) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                let key = resolve(key, env)?.to_string();
                map.insert(key, resolve(value, env)?);
            }
            Ok(Value::Hash(map))
        }
        ExprKind::Block(stmts) => eval_sequence(stmts, env),
        ExprKind::Variable(name) => lookup_variable(name, env),
        ExprKind::Assignment { target, value } => {
            let ExprKind::Variable(name) = &target.kind else {
                return Err(EvalError::InvalidAssignmentTarget.into());
            };
            let outcome = resolve(value, env);
            env.scope.assign(name, outcome)
        }
        ExprKind::Access { target, keys } => {
            let target = resolve(target, env)?;
            let keys = resolve_all(keys, env)?;
            Ok(access(target, keys)?)
        }
        ExprKind::Call { name, args } => call_function(expr, name, args, env),
        ExprKind::If {
            test,
            then_branch,
            else_branch,
            negated,
        } => {
            let truthy = resolve(test, env)?.is_truthy();
            if truthy == *negated {
                eval_sequence(else_branch, env)
            } else {
                eval_sequence(then_branch, env)
            }
        }
        ExprKind::Case { test, options } => eval_case(test, options, env),
        ExprKind::Selector { test, entries } => {
            let value = resolve(test, env)?;
            for (key, result) in entries {
                if option_matches(&value, &resolve(key, env)?) {
                    return resolve(result, env);
                }
            }
            Err(EvalError::NoSelectorMatch {
                value: value.to_string(),
            }
            .into())
        }
        ExprKind::Concat(segments) => {
            let mut out = String::new();
            for segment in segments {
                out.push_str(&resolve(segment, env)?.to_string());
            }
            Ok(Value::String(out))
        }
        ExprKind::Str(inner) | ExprKind::Heredoc(inner) => {
            Ok(Value::String(resolve(inner, env)?.to_string()))
        }
        ExprKind::Resource(decl) => declare_resources(decl, env),
        ExprKind::Return(value) => {
            let value = match value {
                Some(value) => resolve(value, env)?,
                None => Value::Undef,
            };
            Err(Interrupt::Return(value))
        }
        ExprKind::Binary { op, left, right } => {
            let left = resolve(left, env)?;
            match op {
                BinaryOp::And if !left.is_truthy() => Ok(Value::Bool(false)),
                BinaryOp::Or if left.is_truthy() => Ok(Value::Bool(true)),
                _ => {
                    let right = resolve(right, env)?;
                    Ok(evaluate_binary(left, right, *op)?)
                }
            }
        }
        ExprKind::Unary { op, operand } => Ok(evaluate_unary(&resolve(operand, env)?, *op)?),
        ExprKind::Paren(inner) => resolve(inner, env),
        ExprKind::Unsupported { tag, .. } => {
            Err(EvalError::Unsupported { tag: tag.clone() }.into())
        }
    }
}

/// Variable lookup.
///
/// - `::name`: global
/// - `a::b::v`: property `v` of class `a::b` (the local scope when `a::b`
///   is the class being evaluated)
/// - `v`: local scope, then the inherited parent class, then global
///
/// Anything not found is `Undef`.
fn lookup_variable(name: &str, env: &Env<'_>) -> Outcome {
    let top_scope = name.starts_with("::");
    let name = name.trim_start_matches("::");

    if let Some((class, var)) = name.rsplit_once("::") {
        if env
            .scope
            .owner()
            .is_some_and(|owner| owner.eq_ignore_ascii_case(class))
        {
            return Ok(env.scope.lookup(var).unwrap_or(Value::Undef));
        }
        let instance = env.resolver.resolve_class(class)?;
        return Ok(instance.value(var).unwrap_or(Value::Undef));
    }

    if !top_scope {
        if let Some(value) = env.scope.lookup(name) {
            return Ok(value);
        }
        if let Some(parent) = env.scope.parent_class() {
            if let Some(value) = env.resolver.resolve_class(parent)?.value(name) {
                return Ok(value);
            }
        }
    }

    Ok(env.resolver.get_global_variable(name).unwrap_or(Value::Undef))
}

fn call_function(call: &Expr, name: &str, args: &[Expr], env: &Env<'_>) -> Outcome {
    let name = name.trim_start_matches("::");
    if let Some(outcome) = call_builtin(call, name, args, env) {
        return outcome;
    }

    let Some(definition) = env.resolver.resolve_function(name)? else {
        return Err(EvalError::UnknownFunction {
            name: name.to_string(),
        }
        .into());
    };
    let args = resolve_all(args, env)?;
    invoke_function(&definition, args, env.resolver).map_err(|e| {
        Interrupt::Error(CompilationError::new(DefinitionKind::Function, name, e).into())
    })
}

fn eval_case(test: &Expr, options: &[CaseOption], env: &Env<'_>) -> Outcome {
    let value = resolve(test, env)?;
    for option in options {
        for when in &option.values {
            if option_matches(&value, &resolve(when, env)?) {
                return eval_sequence(&option.body, env);
            }
        }
    }
    Ok(Value::Undef)
}

/// Arrays given as a `when` value or selector key are alternatives.
fn option_matches(value: &Value, option: &Value) -> bool {
    match option {
        Value::Array(alternatives) if !matches!(value, Value::Array(_)) => {
            alternatives.iter().any(|alt| value.matches_option(alt))
        }
        _ => value.matches_option(option),
    }
}

fn declare_resources(decl: &ResourceDecl, env: &Env<'_>) -> Outcome {
    let type_name = match resolve(&decl.type_name, env)? {
        Value::Type(t) => t.name.to_lowercase(),
        other => other.to_string().to_lowercase(),
    };

    let mut refs = Vec::new();
    for body in &decl.bodies {
        let titles = match resolve(&body.title, env)? {
            Value::Array(items) => items,
            other => vec![other],
        };
        let mut attributes = IndexMap::with_capacity(body.operations.len());
        for op in &body.operations {
            attributes.insert(op.name.clone(), resolve(&op.value, env)?);
        }

        for title in titles {
            let title = title.to_string();
            if type_name == "class" {
                env.resolver
                    .resolve_class(title.trim_start_matches("::"))?;
            } else {
                env.scope.declare_resource(DeclaredResource {
                    type_name: type_name.clone(),
                    title: title.clone(),
                    attributes: attributes.clone(),
                });
            }
            refs.push(Value::Resource {
                type_name: type_name.clone(),
                title,
            });
        }
    }

    Ok(match refs.len() {
        1 => refs.pop().unwrap_or(Value::Undef),
        _ => Value::Array(refs),
    })
}

fn access(target: Value, keys: Vec<Value>) -> Result<Value, EvalError> {
    let invalid = |target: &Value, keys: &[Value]| EvalError::InvalidAccess {
        target: target.type_name(),
        key: keys.first().map_or("nothing", Value::type_name),
    };

    match target {
        Value::Undef => Ok(Value::Undef),
        Value::Hash(map) => {
            let mut found: Vec<Value> = keys
                .iter()
                .map(|key| map.get(&key.to_string()).cloned().unwrap_or(Value::Undef))
                .collect();
            Ok(match found.len() {
                1 => found.pop().unwrap_or(Value::Undef),
                _ => Value::Array(found),
            })
        }
        Value::Array(items) => match keys.as_slice() {
            [Value::Integer(i)] => Ok(index_of(items.len(), *i)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Undef)),
            [Value::Integer(start), Value::Integer(count)] => {
                Ok(Value::Array(slice(&items, *start, *count).to_vec()))
            }
            _ => Err(invalid(&Value::Array(items), &keys)),
        },
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            match keys.as_slice() {
                [Value::Integer(i)] => Ok(index_of(chars.len(), *i)
                    .map_or(Value::Undef, |i| Value::String(chars[i].to_string()))),
                [Value::Integer(start), Value::Integer(count)] => Ok(Value::String(
                    slice(&chars, *start, *count).iter().collect(),
                )),
                _ => Err(invalid(&Value::String(s), &keys)),
            }
        }
        Value::Type(t) if !CORE_TYPES.contains(&t.name.as_str()) => {
            let type_name = t.name.to_lowercase();
            let mut refs: Vec<Value> = keys
                .into_iter()
                .map(|title| Value::Resource {
                    type_name: type_name.clone(),
                    title: title.to_string().trim_start_matches("::").to_string(),
                })
                .collect();
            Ok(match refs.len() {
                1 => refs.pop().unwrap_or(Value::Undef),
                _ => Value::Array(refs),
            })
        }
        Value::Type(t) => Ok(Value::Type(t.with_params(keys))),
        other => Err(invalid(&other, &keys)),
    }
}

/// Position of `index` in a sequence of `len`, counting negative indexes
/// from the end.
fn index_of(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

/// `[start, count]` slice; a negative count runs to the end.
fn slice<T>(items: &[T], start: i64, count: i64) -> &[T] {
    let Some(start) = index_of(items.len(), start) else {
        return &[];
    };
    let end = if count < 0 {
        items.len()
    } else {
        usize::try_from(count).map_or(items.len(), |c| start.saturating_add(c).min(items.len()))
    };
    &items[start..end]
}
