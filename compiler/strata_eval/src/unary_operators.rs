//! Unary operator implementations.

use strata_ir::{EvalError, UnaryOp, Value};

use crate::EvalResult;

/// Evaluate a unary operation on a resolved operand.
pub fn evaluate_unary(value: &Value, op: UnaryOp) -> EvalResult {
    match (value, op) {
        (_, UnaryOp::Not) => Ok(Value::Bool(!value.is_truthy())),
        (Value::Integer(n), UnaryOp::Neg) => n
            .checked_neg()
            .map(Value::Integer)
            .ok_or(EvalError::Overflow { op: "-" }),
        (Value::Float(f), UnaryOp::Neg) => Ok(Value::Float(-f)),
        (other, UnaryOp::Neg) => Err(EvalError::InvalidOperand {
            op: op.as_str(),
            operand: other.type_name(),
        }),
    }
}
