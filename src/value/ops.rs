//! Value-level operator dispatch.
//!
//! Every operator is total over `Value`: misuse produces an Error value
//! from the catalogue, never a panic. String concatenation wins `+` when
//! either side is a string; the derived comparisons (`<=`, `>=`) are the
//! logical negation of `>` and `<`.

use crate::ast::{BinaryOp, UnaryOp};

use super::{Value, error};

/// Dispatch a binary operator over two evaluated operands.
pub fn binary(op: BinaryOp, a: &Value, b: &Value) -> Value {
    match op {
        BinaryOp::Add => add(a, b),
        BinaryOp::Subtract => subtract(a, b),
        BinaryOp::Multiply => multiply(a, b),
        BinaryOp::Divide => divide(a, b),
        BinaryOp::Modulo => modulo(a, b),
        BinaryOp::Equals => equals(a, b),
        BinaryOp::NotEquals => not_equals(a, b),
        BinaryOp::LessThan => less_than(a, b),
        BinaryOp::GreaterThan => greater_than(a, b),
        BinaryOp::LessOrEqual => less_or_equal(a, b),
        BinaryOp::GreaterOrEqual => greater_or_equal(a, b),
        BinaryOp::And => logical_and(a, b),
        BinaryOp::Or => logical_or(a, b),
    }
}

/// Dispatch a unary operator over an evaluated operand.
pub fn unary(op: UnaryOp, a: &Value) -> Value {
    match op {
        UnaryOp::Not => logical_not(a),
        UnaryOp::Negate => negate(a),
    }
}

/// Strict numeric reading: `None` (rather than NaN) for operands with no
/// numeric form, so arithmetic can report a type mismatch.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Some(*n),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn arithmetic_operands(operation: &str, a: &Value, b: &Value) -> Result<(f64, f64), Value> {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => Ok((x, y)),
        (None, _) => Err(error::invalid_argument(operation, a.type_name())),
        (_, None) => Err(error::invalid_argument(operation, b.type_name())),
    }
}

/// `+`: string concatenation when either operand is a string, numeric
/// addition otherwise.
pub fn add(a: &Value, b: &Value) -> Value {
    if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
        return Value::string(format!("{a}{b}"));
    }
    match arithmetic_operands("addition", a, b) {
        Ok((x, y)) => Value::number(x + y),
        Err(e) => e,
    }
}

pub fn subtract(a: &Value, b: &Value) -> Value {
    match arithmetic_operands("subtraction", a, b) {
        Ok((x, y)) => Value::number(x - y),
        Err(e) => e,
    }
}

pub fn multiply(a: &Value, b: &Value) -> Value {
    match arithmetic_operands("multiplication", a, b) {
        Ok((x, y)) => Value::number(x * y),
        Err(e) => e,
    }
}

pub fn divide(a: &Value, b: &Value) -> Value {
    match arithmetic_operands("division", a, b) {
        Ok((_, y)) if y == 0.0 => error::division_by_zero(),
        Ok((x, y)) => Value::number(x / y),
        Err(e) => e,
    }
}

pub fn modulo(a: &Value, b: &Value) -> Value {
    match arithmetic_operands("modulo", a, b) {
        Ok((_, y)) if y == 0.0 => error::new("Modulo by zero"),
        Ok((x, y)) => Value::number(x % y),
        Err(e) => e,
    }
}

pub fn equals(a: &Value, b: &Value) -> Value {
    Value::boolean(a.equals(b))
}

pub fn not_equals(a: &Value, b: &Value) -> Value {
    Value::boolean(!a.equals(b))
}

/// Ordering over numbers and strings; anything else is incomparable.
fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => {
            let x = numeric(a)?;
            let y = numeric(b)?;
            x.partial_cmp(&y)
        }
    }
}

pub fn less_than(a: &Value, b: &Value) -> Value {
    match compare(a, b) {
        Some(ordering) => Value::boolean(ordering.is_lt()),
        None => error::type_mismatch("comparable values", a.type_name()),
    }
}

pub fn greater_than(a: &Value, b: &Value) -> Value {
    match compare(a, b) {
        Some(ordering) => Value::boolean(ordering.is_gt()),
        None => error::type_mismatch("comparable values", a.type_name()),
    }
}

/// `a <= b` is `not (a > b)`.
pub fn less_or_equal(a: &Value, b: &Value) -> Value {
    match greater_than(a, b) {
        Value::Boolean(gt) => Value::boolean(!gt),
        other => other,
    }
}

/// `a >= b` is `not (a < b)`.
pub fn greater_or_equal(a: &Value, b: &Value) -> Value {
    match less_than(a, b) {
        Value::Boolean(lt) => Value::boolean(!lt),
        other => other,
    }
}

/// Value-returning `and`: the deciding operand, with null propagation.
pub fn logical_and(a: &Value, b: &Value) -> Value {
    if matches!(a, Value::Null) || matches!(b, Value::Null) {
        return Value::null();
    }
    if !a.is_truthy() {
        a.clone()
    } else {
        b.clone()
    }
}

/// Value-returning `or`: the deciding operand, with null propagation.
pub fn logical_or(a: &Value, b: &Value) -> Value {
    if matches!(a, Value::Null) || matches!(b, Value::Null) {
        return Value::null();
    }
    if a.is_truthy() {
        a.clone()
    } else {
        b.clone()
    }
}

/// `not`: boolean negation of truthiness, with null propagation.
pub fn logical_not(a: &Value) -> Value {
    if matches!(a, Value::Null) {
        return Value::null();
    }
    Value::boolean(!a.is_truthy())
}

pub fn negate(a: &Value) -> Value {
    match numeric(a) {
        Some(n) => Value::number(-n),
        None => error::invalid_argument("negation", a.type_name()),
    }
}
