//! Binary operator implementations.
//!
//! Direct enum-based dispatch over the fixed operator set. `and`/`or` are
//! short-circuited by the evaluator before reaching here; this module treats
//! them as plain truthiness combinators.

use std::cmp::Ordering;

use strata_ir::{BinaryOp, EvalError, Value};

use crate::EvalResult;

#[inline]
fn checked_arith(result: Option<i64>, op_name: &'static str) -> EvalResult {
    result
        .map(Value::Integer)
        .ok_or(EvalError::Overflow { op: op_name })
}

#[inline]
fn checked_div<F>(is_zero: bool, op: F, op_name: &'static str) -> EvalResult
where
    F: FnOnce() -> Option<i64>,
{
    if is_zero {
        Err(EvalError::DivisionByZero)
    } else {
        checked_arith(op(), op_name)
    }
}

#[cold]
fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::OperandMismatch {
        op: op.as_str(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// Evaluate a binary operation on two resolved operands.
pub fn evaluate_binary(left: Value, right: Value, op: BinaryOp) -> EvalResult {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ord = compare(&left, &right, op)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::LtEq => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinaryOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinaryOp::In => contains(&right, &left).map(Value::Bool),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(left, right, op)
        }
    }
}

/// Equality as the language defines it: strings compare case-insensitively,
/// integers and floats compare numerically, collections element-wise.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.eq_ignore_ascii_case(y),
        (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => {
            #[expect(clippy::cast_precision_loss, reason = "numeric comparison")]
            let x = *x as f64;
            (x - y).abs() < f64::EPSILON
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Hash(x), Value::Hash(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

fn compare(left: &Value, right: &Value, op: BinaryOp) -> Result<Ordering, EvalError> {
    #[expect(clippy::cast_precision_loss, reason = "mixed numeric comparison")]
    let ord = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
        _ => None,
    };
    ord.ok_or_else(|| mismatch(op, left, right))
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, EvalError> {
    match haystack {
        Value::String(h) => Ok(match needle {
            Value::String(n) => h.contains(n.as_str()),
            _ => false,
        }),
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::Hash(map) => Ok(map
            .keys()
            .any(|k| values_equal(&Value::String(k.clone()), needle))),
        other => Err(EvalError::InvalidOperand {
            op: BinaryOp::In.as_str(),
            operand: other.type_name(),
        }),
    }
}

#[expect(clippy::cast_precision_loss, reason = "integer promoted to float")]
fn arithmetic(left: Value, right: Value, op: BinaryOp) -> EvalResult {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => eval_int_binary(a, b, op),
        (Value::Float(a), Value::Float(b)) => eval_float_binary(a, b, op),
        (Value::Integer(a), Value::Float(b)) => eval_float_binary(a as f64, b, op),
        (Value::Float(a), Value::Integer(b)) => eval_float_binary(a, b as f64, op),
        (Value::Array(mut a), Value::Array(b)) if op == BinaryOp::Add => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::Array(a), Value::Array(b)) if op == BinaryOp::Sub => Ok(Value::Array(
            a.into_iter()
                .filter(|item| !b.iter().any(|other| values_equal(item, other)))
                .collect(),
        )),
        (Value::Array(mut a), Value::Hash(b)) if op == BinaryOp::Add => {
            a.push(Value::Hash(b));
            Ok(Value::Array(a))
        }
        (Value::Hash(mut a), Value::Hash(b)) if op == BinaryOp::Add => {
            a.extend(b);
            Ok(Value::Hash(a))
        }
        (Value::Hash(mut a), Value::Hash(b)) if op == BinaryOp::Sub => {
            a.retain(|k, _| !b.contains_key(k));
            Ok(Value::Hash(a))
        }
        (Value::Hash(mut a), Value::Array(keys)) if op == BinaryOp::Sub => {
            a.retain(|k, _| !keys.iter().any(|key| key.as_str() == Some(k.as_str())));
            Ok(Value::Hash(a))
        }
        (Value::Array(mut a), other) if op == BinaryOp::Add => {
            a.push(other);
            Ok(Value::Array(a))
        }
        (l, r) => Err(mismatch(op, &l, &r)),
    }
}

fn eval_int_binary(a: i64, b: i64, op: BinaryOp) -> EvalResult {
    match op {
        BinaryOp::Add => checked_arith(a.checked_add(b), "+"),
        BinaryOp::Sub => checked_arith(a.checked_sub(b), "-"),
        BinaryOp::Mul => checked_arith(a.checked_mul(b), "*"),
        BinaryOp::Div => checked_div(b == 0, || a.checked_div(b), "/"),
        BinaryOp::Mod => checked_div(b == 0, || a.checked_rem(b), "%"),
        _ => Err(mismatch(op, &Value::Integer(a), &Value::Integer(b))),
    }
}

fn eval_float_binary(a: f64, b: f64, op: BinaryOp) -> EvalResult {
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        BinaryOp::Div if b == 0.0 => Err(EvalError::DivisionByZero),
        BinaryOp::Div => Ok(Value::Float(a / b)),
        _ => Err(mismatch(op, &Value::Float(a), &Value::Float(b))),
    }
}
