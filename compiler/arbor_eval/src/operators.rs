//! Unary and binary operator semantics.
//!
//! Unchecked integer arithmetic wraps; the `*Checked` operators raise
//! [`EvalError::Overflow`]. Short-circuit operators never reach this module,
//! the interpreter evaluates them lazily.

use std::cmp::Ordering;

use arbor_ir::{BinaryOp, UnaryOp};

use crate::errors::{type_error, EvalError, EvalResult};
use crate::value::Value;

#[inline]
fn checked(result: Option<i64>, op: BinaryOp) -> EvalResult<Value> {
    result.map(Value::Int).ok_or(EvalError::Overflow { op: op.symbol() })
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    type_error(format!(
        "`{}` is not defined for {} and {}",
        op.symbol(),
        left.kind_name(),
        right.kind_name()
    ))
}

/// Shift counts are masked like a hardware shift.
fn shift_amount(n: i64) -> u32 {
    u32::try_from(n & 63).unwrap_or(0)
}

fn int_binary(op: BinaryOp, a: i64, b: i64) -> EvalResult<Value> {
    Ok(match op {
        BinaryOp::Add => Value::Int(a.wrapping_add(b)),
        BinaryOp::AddChecked => return checked(a.checked_add(b), op),
        BinaryOp::Subtract => Value::Int(a.wrapping_sub(b)),
        BinaryOp::SubtractChecked => return checked(a.checked_sub(b), op),
        BinaryOp::Multiply => Value::Int(a.wrapping_mul(b)),
        BinaryOp::MultiplyChecked => return checked(a.checked_mul(b), op),
        BinaryOp::Divide | BinaryOp::Modulo if b == 0 => return Err(EvalError::DivideByZero),
        BinaryOp::Divide => Value::Int(a.wrapping_div(b)),
        BinaryOp::Modulo => Value::Int(a.wrapping_rem(b)),
        BinaryOp::Power => {
            let exp = u32::try_from(b)
                .map_err(|_| type_error(format!("negative integer exponent {b}")))?;
            Value::Int(a.wrapping_pow(exp))
        }
        BinaryOp::And => Value::Int(a & b),
        BinaryOp::Or => Value::Int(a | b),
        BinaryOp::ExclusiveOr => Value::Int(a ^ b),
        BinaryOp::LeftShift => Value::Int(a.wrapping_shl(shift_amount(b))),
        BinaryOp::RightShift => Value::Int(a.wrapping_shr(shift_amount(b))),
        _ => return compare(op, &Value::Int(a), &Value::Int(b)),
    })
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> EvalResult<Value> {
    Ok(Value::Float(match op {
        BinaryOp::Add | BinaryOp::AddChecked => a + b,
        BinaryOp::Subtract | BinaryOp::SubtractChecked => a - b,
        BinaryOp::Multiply | BinaryOp::MultiplyChecked => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        BinaryOp::Power => a.powf(b),
        _ => return compare(op, &Value::Float(a), &Value::Float(b)),
    }))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let result = match op {
        BinaryOp::Equal => left.equals(right),
        BinaryOp::NotEqual => !left.equals(right),
        BinaryOp::LessThan => left.compare(right) == Ordering::Less,
        BinaryOp::LessThanOrEqual => left.compare(right) != Ordering::Greater,
        BinaryOp::GreaterThan => left.compare(right) == Ordering::Greater,
        BinaryOp::GreaterThanOrEqual => left.compare(right) != Ordering::Less,
        _ => return Err(mismatch(op, left, right)),
    };
    Ok(Value::Bool(result))
}

/// Apply a strict binary operator to evaluated operands.
pub fn evaluate_binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_binary(op, *a, *b),
        (Value::Float(a), Value::Float(b)) => float_binary(op, *a, *b),
        #[allow(clippy::cast_precision_loss, reason = "int operand promoted to float")]
        (Value::Int(a), Value::Float(b)) => float_binary(op, *a as f64, *b),
        #[allow(clippy::cast_precision_loss, reason = "int operand promoted to float")]
        (Value::Float(a), Value::Int(b)) => float_binary(op, *a, *b as f64),
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::And => Ok(Value::Bool(a & b)),
            BinaryOp::Or => Ok(Value::Bool(a | b)),
            BinaryOp::ExclusiveOr => Ok(Value::Bool(a ^ b)),
            _ => compare(op, left, right),
        },
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => {
            Ok(Value::string(&format!("{a}{b}")))
        }
        _ => compare(op, left, right),
    }
}

/// Apply a non-conversion unary operator.
pub fn evaluate_unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOp::Negate, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnaryOp::NegateChecked, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or(EvalError::Overflow { op: "-" }),
        (UnaryOp::Negate | UnaryOp::NegateChecked, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Plus, Value::Int(_) | Value::Float(_)) => Ok(operand.clone()),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::OnesComplement, Value::Int(n)) => Ok(Value::Int(!n)),
        (UnaryOp::ArrayLength, Value::List(list)) => {
            let len = list.items.borrow().len();
            i64::try_from(len)
                .map(Value::Int)
                .map_err(|_| EvalError::Overflow { op: "length" })
        }
        (UnaryOp::ArrayLength, Value::Null) => Err(crate::errors::null_reference("array length")),
        _ => Err(type_error(format!(
            "{op:?} is not defined for {}",
            operand.kind_name()
        ))),
    }
}
