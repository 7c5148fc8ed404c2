//! The registered standard-library table.
//!
//! Calling convention: positional evaluated values in, exactly one value
//! out. A builtin never fails silently — misuse (wrong arity, wrong
//! operand type) returns an Error value, and zero arguments still produce
//! a well-defined result.

use rustc_hash::FxHashMap;

use crate::value::{Value, error};

pub type BuiltinFn = fn(&[Value]) -> Value;

/// Name-to-function registry consulted before user definitions.
pub struct Builtins {
    table: FxHashMap<&'static str, BuiltinFn>,
}

impl Builtins {
    pub fn empty() -> Self {
        Builtins {
            table: FxHashMap::default(),
        }
    }

    /// The default set: `len`, `type`, `str`, `num`, `push`, `keys`.
    /// (`print` is dispatched by the interpreter itself so it can reach
    /// the output handler.)
    pub fn standard() -> Self {
        let mut builtins = Builtins::empty();
        builtins.register("len", builtin_len);
        builtins.register("type", builtin_type);
        builtins.register("str", builtin_str);
        builtins.register("num", builtin_num);
        builtins.register("push", builtin_push);
        builtins.register("keys", builtin_keys);
        builtins
    }

    pub fn register(&mut self, name: &'static str, function: BuiltinFn) {
        self.table.insert(name, function);
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.table.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }
}

fn expect_arity(name: &str, args: &[Value], arity: usize) -> Option<Value> {
    if args.len() == arity {
        None
    } else {
        Some(error::invalid_argument(
            name,
            &format!("expected {} argument(s), got {}", arity, args.len()),
        ))
    }
}

fn builtin_len(args: &[Value]) -> Value {
    if let Some(err) = expect_arity("len", args, 1) {
        return err;
    }
    match &args[0] {
        Value::String(_) | Value::Array(_) | Value::Object(_) => {
            Value::number(args[0].length() as f64)
        }
        other => error::type_mismatch("string, array, or object", other.type_name()),
    }
}

fn builtin_type(args: &[Value]) -> Value {
    if let Some(err) = expect_arity("type", args, 1) {
        return err;
    }
    Value::string(args[0].type_name())
}

fn builtin_str(args: &[Value]) -> Value {
    if let Some(err) = expect_arity("str", args, 1) {
        return err;
    }
    Value::string(args[0].to_string())
}

fn builtin_num(args: &[Value]) -> Value {
    if let Some(err) = expect_arity("num", args, 1) {
        return err;
    }
    Value::number(args[0].to_number())
}

/// `push(array, element)` appends in place and returns the array.
fn builtin_push(args: &[Value]) -> Value {
    if let Some(err) = expect_arity("push", args, 2) {
        return err;
    }
    if !args[0].array_push(args[1].clone()) {
        return error::type_mismatch("array", args[0].type_name());
    }
    args[0].clone()
}

/// `keys(object)` returns the keys as an array, in insertion order.
fn builtin_keys(args: &[Value]) -> Value {
    if let Some(err) = expect_arity("keys", args, 1) {
        return err;
    }
    match &args[0] {
        Value::Object(_) => Value::array(
            args[0]
                .object_keys()
                .into_iter()
                .map(Value::string)
                .collect(),
        ),
        other => error::type_mismatch("object", other.type_name()),
    }
}
