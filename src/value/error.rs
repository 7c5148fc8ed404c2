//! First-class error values: constructors, inspection, and the fixed
//! catalogue of common faults.
//!
//! Errors are ordinary data — there is no unwinding. `propagate` hands a
//! value back unchanged; callers are expected to check `is_error` at each
//! step.

use super::Value;

/// Generic error code when a call site does not specify one.
pub const CODE_GENERIC: i32 = -1;
/// Allocation failure.
pub const CODE_ALLOCATION: i32 = -2;

/// Error with the default code.
pub fn new(message: impl Into<String>) -> Value {
    Value::error(message)
}

/// Error with an explicit code.
pub fn with_code(message: impl Into<String>, code: i32) -> Value {
    Value::error_with_code(message, code)
}

/// Error from format arguments, default code.
pub fn formatted(args: std::fmt::Arguments<'_>) -> Value {
    Value::error(args.to_string())
}

pub fn message(value: &Value) -> Option<String> {
    match value {
        Value::Error(e) => Some(e.message.clone()),
        _ => None,
    }
}

/// The error's code, or `0` for non-errors.
pub fn code(value: &Value) -> i32 {
    match value {
        Value::Error(e) => e.code,
        _ => 0,
    }
}

pub fn has_code(value: &Value, expected: i32) -> bool {
    matches!(value, Value::Error(e) if e.code == expected)
}

pub fn has_message(value: &Value, substring: &str) -> bool {
    matches!(value, Value::Error(e) if e.message.contains(substring))
}

/// Return the value unchanged, error or not. Exists to make propagation
/// points greppable; checking `is_error` remains the caller's job.
pub fn propagate(value: Value) -> Value {
    value
}

/// True if any value in the batch is an error.
pub fn any_error(values: &[Value]) -> bool {
    values.iter().any(Value::is_error)
}

/// The first error in the batch, if any.
pub fn first_error(values: &[Value]) -> Option<Value> {
    values.iter().find(|v| v.is_error()).cloned()
}

// ---- Catalogue ----
//
// One constructor per common fault, so call sites produce consistent,
// greppable messages.

pub fn null_pointer(operation: &str) -> Value {
    new(format!("Null pointer in {operation}"))
}

pub fn type_mismatch(expected: &str, actual: &str) -> Value {
    new(format!("Type mismatch: expected {expected}, got {actual}"))
}

pub fn division_by_zero() -> Value {
    new("Division by zero")
}

pub fn index_out_of_bounds(index: usize, length: usize) -> Value {
    new(format!("Index out of bounds: {index} >= {length}"))
}

pub fn invalid_argument(function_name: &str, description: &str) -> Value {
    new(format!("Invalid argument in {function_name}: {description}"))
}

pub fn allocation_failure() -> Value {
    with_code("Memory allocation failed", CODE_ALLOCATION)
}

pub fn file_not_found(filename: &str) -> Value {
    new(format!("File not found: {filename}"))
}

pub fn parse_failure(context: &str) -> Value {
    new(format!("Parsing failed: {context}"))
}

pub fn undefined_variable(name: &str) -> Value {
    new(format!("Undefined variable '{name}'"))
}

pub fn undefined_function(name: &str) -> Value {
    new(format!("Undefined function '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_message_and_code() {
        let plain = new("boom");
        assert!(plain.is_error());
        assert_eq!(message(&plain).as_deref(), Some("boom"));
        assert_eq!(code(&plain), CODE_GENERIC);

        let coded = with_code("boom", 42);
        assert_eq!(code(&coded), 42);
        assert!(has_code(&coded, 42));
        assert!(!has_code(&coded, 41));

        let formatted = formatted(format_args!("x = {}", 7));
        assert!(has_message(&formatted, "x = 7"));
    }

    #[test]
    fn inspection_on_non_errors() {
        let n = Value::number(1.0);
        assert!(message(&n).is_none());
        assert_eq!(code(&n), 0);
        assert!(!has_code(&n, 0));
        assert!(!has_message(&n, ""));
    }

    #[test]
    fn propagate_returns_value_unchanged() {
        let err = new("kept");
        let same = propagate(err.clone());
        assert!(same.is_same_cell(&err));

        let ok = Value::number(3.0);
        assert_eq!(propagate(ok.clone()), ok);
    }

    #[test]
    fn batch_helpers() {
        let values = vec![Value::number(1.0), new("first"), new("second")];
        assert!(any_error(&values));
        let first = first_error(&values).expect("first error");
        assert!(has_message(&first, "first"));

        let clean = vec![Value::number(1.0), Value::Null];
        assert!(!any_error(&clean));
        assert!(first_error(&clean).is_none());
    }

    #[test]
    fn catalogue_messages_are_stable() {
        assert!(has_message(&null_pointer("push"), "Null pointer in push"));
        assert!(has_message(
            &type_mismatch("number", "string"),
            "expected number, got string"
        ));
        assert!(has_message(&division_by_zero(), "Division by zero"));
        assert!(has_message(&file_not_found("a.koan"), "a.koan"));
        assert!(has_message(&parse_failure("bad block"), "bad block"));
        assert!(has_message(&undefined_variable("x"), "Undefined variable 'x'"));
        assert!(has_message(&undefined_function("f"), "Undefined function 'f'"));
        assert!(has_code(&allocation_failure(), CODE_ALLOCATION));
    }

    #[test]
    fn index_out_of_bounds_names_both_numbers() {
        let err = index_out_of_bounds(10, 5);
        assert!(has_message(&err, "10"));
        assert!(has_message(&err, "5"));
        assert_eq!(code(&err), CODE_GENERIC);
    }
}
