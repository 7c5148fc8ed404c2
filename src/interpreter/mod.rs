//! The tree-walking evaluator.
//!
//! Evaluation is single-threaded, synchronous, and recursive; every case
//! produces a [`Value`]. Control flow travels as an explicit [`Flow`]
//! that enclosing compounds and loops recognize. Malformed input —
//! undefined names, wrong arity, type misuse — degrades to a diagnostic
//! plus a `null` result: the evaluator keeps running rather than fault.

pub mod builtins;

use std::cell::RefCell;
use std::sync::Arc;

use crate::arena::{NodeArena, NodeId};
use crate::ast::Node;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::lexer::{self, LexError};
use crate::memory::Heap;
use crate::parser::{self, ParseError};
use crate::scope::{Scope, ScopeRef};
use crate::value::{Value, error, ops};

use builtins::Builtins;

/// Errors surfaced before evaluation starts. Runtime problems never land
/// here — they become diagnostics and degraded values.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Evaluation limits.
#[derive(Debug, Clone, Copy)]
pub struct EvalConfig {
    /// Hard ceiling on iterations of a single `while` loop.
    pub max_loop_iterations: usize,
    /// Maximum user-function call depth.
    pub max_call_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_loop_iterations: 10_000,
            max_call_depth: 256,
        }
    }
}

/// Result of evaluating one node. Loops and compounds react to the
/// control variants; everything else passes them through.
#[derive(Debug)]
pub enum Flow {
    Value(Value),
    Break,
    Continue,
    Return(Value),
}

impl Flow {
    /// Collapse control flow into the value it carries (`null` for
    /// break/continue that escaped their loop).
    pub fn into_value(self) -> Value {
        match self {
            Flow::Value(v) | Flow::Return(v) => v,
            Flow::Break | Flow::Continue => Value::Null,
        }
    }
}

/// Where `print` writes: straight to stdout, or into a buffer that tests
/// and embedders can read back.
pub enum PrintOutput {
    Stdout,
    Capture(RefCell<String>),
}

impl PrintOutput {
    fn println(&self, line: &str) {
        match self {
            PrintOutput::Stdout => println!("{line}"),
            PrintOutput::Capture(buffer) => {
                let mut buffer = buffer.borrow_mut();
                buffer.push_str(line);
                buffer.push('\n');
            }
        }
    }

    fn captured(&self) -> String {
        match self {
            PrintOutput::Stdout => String::new(),
            PrintOutput::Capture(buffer) => buffer.borrow().clone(),
        }
    }
}

pub struct Interpreter {
    arena: NodeArena,
    heap: Arc<Heap>,
    global: ScopeRef,
    /// Scope stack, global at the bottom. Name resolution searches it
    /// top-down, each scope independently.
    scopes: Vec<ScopeRef>,
    config: EvalConfig,
    diagnostics: Diagnostics,
    builtins: Builtins,
    output: PrintOutput,
    call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::with_parts(Arc::new(Heap::new()), EvalConfig::default(), PrintOutput::Stdout)
    }

    /// Capture `print` output instead of writing to stdout.
    pub fn with_capture() -> Self {
        Interpreter::with_parts(
            Arc::new(Heap::new()),
            EvalConfig::default(),
            PrintOutput::Capture(RefCell::new(String::new())),
        )
    }

    pub fn with_parts(heap: Arc<Heap>, config: EvalConfig, output: PrintOutput) -> Self {
        let global = Scope::shared();
        Interpreter {
            arena: NodeArena::new(Arc::clone(&heap)),
            heap,
            scopes: vec![global.clone()],
            global,
            config,
            diagnostics: Diagnostics::new(),
            builtins: Builtins::standard(),
            output,
            call_depth: 0,
        }
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn global(&self) -> ScopeRef {
        self.global.clone()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn builtins_mut(&mut self) -> &mut Builtins {
        &mut self.builtins
    }

    /// Everything `print` wrote, when running with capture output.
    pub fn captured_output(&self) -> String {
        self.output.captured()
    }

    /// Lex, parse, and evaluate a source program.
    pub fn run_source(&mut self, source: &str) -> Result<Value, RunError> {
        let tokens = lexer::lex(source)?;
        let root = parser::parse(tokens, &self.arena)?;
        Ok(self.eval_root(root))
    }

    /// Evaluate a parsed program.
    pub fn eval_root(&mut self, root: NodeId) -> Value {
        self.eval(root).into_value()
    }

    // ---- Name resolution ----

    fn lookup_variable(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.lookup_variable(name))
    }

    /// Resolve a function binding together with the scope that holds it —
    /// the scope a function was defined into is its captured scope.
    fn lookup_function(&self, name: &str) -> Option<(ScopeRef, NodeId)> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.lookup_function(name).map(|id| (scope.clone(), id)))
    }

    fn innermost(&self) -> ScopeRef {
        self.scopes.last().unwrap_or(&self.global).clone()
    }

    fn report(&mut self, message: impl Into<String>) {
        self.diagnostics.report(Diagnostic::error(message));
    }

    // ---- Evaluation ----

    fn eval_value(&mut self, id: NodeId) -> Value {
        self.eval(id).into_value()
    }

    fn eval(&mut self, id: NodeId) -> Flow {
        let Some(node) = self.arena.get(id) else {
            self.report("evaluated a released syntax node");
            return Flow::Value(Value::Null);
        };

        match node {
            Node::Null => Flow::Value(Value::Null),
            Node::Boolean(b) => Flow::Value(Value::boolean(b)),
            Node::Number(n) => Flow::Value(Value::number(n)),
            Node::String(s) => Flow::Value(Value::string(s)),
            Node::NoOp => Flow::Value(Value::Null),

            Node::Variable { name } => match self.lookup_variable(&name) {
                Some(value) => Flow::Value(value),
                None => {
                    self.report(format!("Undefined variable '{name}'"));
                    Flow::Value(Value::Null)
                }
            },

            Node::VariableDefinition { name, value } => {
                let evaluated = match self.arena.get(value) {
                    // Already-literal right-hand sides skip re-evaluation.
                    Some(Node::Null) => Value::Null,
                    Some(Node::Boolean(b)) => Value::boolean(b),
                    Some(Node::Number(n)) => Value::number(n),
                    Some(Node::String(s)) => Value::string(s),
                    _ => self.eval_value(value),
                };
                self.innermost().define_variable(&name, evaluated.clone());
                Flow::Value(evaluated)
            }

            Node::FunctionDefinition {
                name,
                params,
                body,
            } => {
                let scope = self.innermost();
                scope.define_function(&name, id);
                // The definition's own result is a callable value bound to
                // the scope it was defined in.
                Flow::Value(Value::function(name, params, body, scope))
            }

            Node::Call { name, arguments } => self.eval_call(&name, &arguments),

            Node::Compound { statements } => {
                let mut last = Value::Null;
                for statement in statements {
                    match self.eval(statement) {
                        Flow::Value(v) => last = v,
                        flow => return flow,
                    }
                }
                Flow::Value(last)
            }

            Node::Binary { op, left, right } => {
                let lhs = self.eval_value(left);
                if lhs.is_error() {
                    return Flow::Value(lhs);
                }
                let rhs = self.eval_value(right);
                if rhs.is_error() {
                    return Flow::Value(rhs);
                }
                Flow::Value(ops::binary(op, &lhs, &rhs))
            }

            Node::Unary { op, operand } => {
                let value = self.eval_value(operand);
                if value.is_error() {
                    return Flow::Value(value);
                }
                Flow::Value(ops::unary(op, &value))
            }

            Node::Array { elements } => {
                let array = Value::array(Vec::with_capacity(elements.len()));
                for element in elements {
                    array.array_push(self.eval_value(element));
                }
                Flow::Value(array)
            }

            Node::Object { entries } => {
                let object = Value::object();
                for (key, value) in entries {
                    let evaluated = self.eval_value(value);
                    object.object_set(&key, evaluated);
                }
                Flow::Value(object)
            }

            Node::PropertyAccess { object, property } => {
                let base = self.eval_value(object);
                Flow::Value(self.access_property(&base, &property))
            }

            Node::Index { object, index } => {
                let base = self.eval_value(object);
                let index = self.eval_value(index);
                Flow::Value(self.access_index(&base, &index))
            }

            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_value(condition).is_truthy() {
                    self.eval(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.eval(else_branch)
                } else {
                    Flow::Value(Value::Null)
                }
            }

            Node::While { condition, body } => self.eval_while(condition, body),

            Node::For {
                iterator_variable,
                iterable,
                for_body,
            } => self.eval_for(&iterator_variable, iterable, for_body),

            Node::Break => Flow::Break,
            Node::Continue => Flow::Continue,

            Node::Return { value } => {
                let carried = match value {
                    Some(value) => self.eval_value(value),
                    None => Value::Null,
                };
                Flow::Return(carried)
            }
        }
    }

    /// While semantics: the condition and the body run in the very same
    /// scope instance on every iteration — a mutation in the body must be
    /// visible to the next condition check. No per-iteration scope is
    /// created. A hard iteration ceiling turns a runaway loop into a
    /// diagnostic instead of a hang.
    fn eval_while(&mut self, condition: NodeId, body: NodeId) -> Flow {
        let mut last = Value::Null;
        let mut iterations = 0;

        loop {
            if iterations >= self.config.max_loop_iterations {
                self.diagnostics.warning(format!(
                    "While loop exceeded maximum iterations ({}), terminating",
                    self.config.max_loop_iterations
                ));
                break;
            }
            if !self.eval_value(condition).is_truthy() {
                break;
            }
            iterations += 1;
            match self.eval(body) {
                Flow::Value(v) => last = v,
                Flow::Break => break,
                Flow::Continue => continue,
                Flow::Return(v) => return Flow::Return(v),
            }
        }

        Flow::Value(last)
    }

    /// For-in semantics: array elements or object keys, iterator bound
    /// fresh per element as an ordinary variable definition in the loop's
    /// scope.
    fn eval_for(&mut self, iterator: &str, iterable: NodeId, body: NodeId) -> Flow {
        let source = self.eval_value(iterable);

        let items: Vec<Value> = match &source {
            Value::Array(cell) => cell.borrow().clone(),
            Value::Object(_) => source.object_keys().into_iter().map(Value::string).collect(),
            other => {
                self.report(format!(
                    "For loop iterable must be an array or object, got {}",
                    other.type_name()
                ));
                return Flow::Value(Value::Null);
            }
        };

        let mut last = Value::Null;
        for item in items {
            self.innermost().define_variable(iterator, item);
            match self.eval(body) {
                Flow::Value(v) => last = v,
                Flow::Break => break,
                Flow::Continue => continue,
                Flow::Return(v) => return Flow::Return(v),
            }
        }
        Flow::Value(last)
    }

    fn eval_call(&mut self, name: &str, arguments: &[NodeId]) -> Flow {
        // `print` needs the output handler, so it is dispatched here
        // rather than through the pure builtin table.
        if name == "print" {
            let rendered: Vec<String> = arguments
                .iter()
                .map(|&arg| self.eval_value(arg).to_string())
                .collect();
            self.output.println(&rendered.join(" "));
            return Flow::Value(Value::Null);
        }

        if let Some(builtin) = self.builtins.get(name) {
            let values: Vec<Value> = arguments.iter().map(|&arg| self.eval_value(arg)).collect();
            return Flow::Value(builtin(&values));
        }

        // User-defined function, or a variable holding a function value.
        if let Some((defining_scope, node_id)) = self.lookup_function(name) {
            return self.call_function_node(name, node_id, defining_scope, arguments);
        }
        if let Some(Value::Function(function)) = self.lookup_variable(name) {
            let body = function.body;
            let params = function.params.clone();
            let scope = function.scope.clone();
            return self.call_with(name, &params, body, scope, arguments);
        }

        self.report(format!("Undefined function '{name}'"));
        Flow::Value(Value::Null)
    }

    fn call_function_node(
        &mut self,
        name: &str,
        node_id: NodeId,
        defining_scope: ScopeRef,
        arguments: &[NodeId],
    ) -> Flow {
        let Some(Node::FunctionDefinition { params, body, .. }) = self.arena.get(node_id) else {
            self.report(format!("'{name}' is not callable"));
            return Flow::Value(Value::Null);
        };
        self.call_with(name, &params, body, defining_scope, arguments)
    }

    fn call_with(
        &mut self,
        name: &str,
        params: &[String],
        body: NodeId,
        captured: ScopeRef,
        arguments: &[NodeId],
    ) -> Flow {
        if arguments.len() != params.len() {
            self.report(format!(
                "Function '{}' expects {} argument(s), got {}",
                name,
                params.len(),
                arguments.len()
            ));
            return Flow::Value(Value::Null);
        }
        if self.call_depth >= self.config.max_call_depth {
            self.report(format!(
                "Call depth limit ({}) exceeded calling '{}'",
                self.config.max_call_depth, name
            ));
            return Flow::Value(Value::Null);
        }

        // Arguments evaluate in the caller's scope.
        let values: Vec<Value> = arguments.iter().map(|&arg| self.eval_value(arg)).collect();

        // The callee runs on a fresh stack: global, the captured scope,
        // and an activation scope where parameters are bound as fresh
        // definitions.
        let activation = Scope::shared();
        for (param, value) in params.iter().zip(values) {
            activation.define_variable(param, value);
        }
        let mut callee_stack = vec![self.global.clone()];
        if !captured.is_same(&self.global) {
            callee_stack.push(captured);
        }
        callee_stack.push(activation);

        let caller_stack = std::mem::replace(&mut self.scopes, callee_stack);
        self.call_depth += 1;
        let flow = self.eval(body);
        self.call_depth -= 1;
        self.scopes = caller_stack;

        // A return unwraps to its carried value; otherwise the body's
        // last statement is the result.
        match flow {
            Flow::Return(v) | Flow::Value(v) => Flow::Value(v),
            Flow::Break | Flow::Continue => Flow::Value(Value::Null),
        }
    }

    // ---- Property and index access ----

    fn access_property(&mut self, base: &Value, property: &str) -> Value {
        match base {
            Value::Object(_) => base.object_get(property).unwrap_or(Value::Null),
            Value::Array(_) => match property.parse::<usize>() {
                Ok(index) => match base.array_get(index) {
                    Some(element) => element,
                    None => {
                        let err = error::index_out_of_bounds(index, base.array_len());
                        self.report(error::message(&err).unwrap_or_default());
                        Value::Null
                    }
                },
                Err(_) => {
                    self.report(format!(
                        "Array index must be a non-negative integer, got '{property}'"
                    ));
                    Value::Null
                }
            },
            Value::Instance(_) => base.instance_get_property(property).unwrap_or(Value::Null),
            Value::Class(_) => base.class_get_method(property).unwrap_or(Value::Null),
            other => {
                self.report(format!(
                    "Cannot access property '{}' on {}",
                    property,
                    other.type_name()
                ));
                Value::Null
            }
        }
    }

    fn access_index(&mut self, base: &Value, index: &Value) -> Value {
        match base {
            Value::Array(_) => {
                let raw = index.to_number();
                if raw.is_nan() || raw < 0.0 || raw.fract() != 0.0 {
                    self.report(format!("Array index must be a non-negative integer, got {index}"));
                    return Value::Null;
                }
                self.access_property(base, &(raw as usize).to_string())
            }
            Value::Object(_) => match index {
                Value::String(key) => base.object_get(key).unwrap_or(Value::Null),
                other => {
                    self.report(format!("Object index must be a string, got {}", other.type_name()));
                    Value::Null
                }
            },
            other => {
                self.report(format!("Cannot index into {}", other.type_name()));
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (Value, Interpreter) {
        let mut interp = Interpreter::with_capture();
        let value = interp.run_source(source).expect("run");
        (value, interp)
    }

    #[test]
    fn literals_evaluate_to_themselves() {
        assert_eq!(run("5").0, Value::number(5.0));
        assert_eq!(run("\"hi\"").0, Value::string("hi"));
        assert_eq!(run("true").0, Value::boolean(true));
        assert_eq!(run("null").0, Value::Null);
    }

    #[test]
    fn variable_definition_yields_and_binds() {
        let (value, interp) = run("set x 5\nx + 2");
        assert_eq!(value, Value::number(7.0));
        assert!(interp.diagnostics().is_empty());
    }

    #[test]
    fn undefined_variable_degrades_to_null_with_diagnostic() {
        let (value, interp) = run("missing");
        assert_eq!(value, Value::Null);
        assert!(
            interp
                .diagnostics()
                .messages()
                .iter()
                .any(|m| m.contains("Undefined variable 'missing'"))
        );
    }

    #[test]
    fn variable_redefinition_replaces() {
        let (value, _) = run("set x 1\nset x 2\nx");
        assert_eq!(value, Value::number(2.0));
    }

    #[test]
    fn compound_result_is_last_statement() {
        assert_eq!(run("1\n2\n3").0, Value::number(3.0));
        assert_eq!(run("").0, Value::Null);
    }

    #[test]
    fn user_function_call_binds_parameters() {
        let source = "function add a b\n    return a + b\nset r add(2, 3)\nr";
        assert_eq!(run(source).0, Value::number(5.0));
    }

    #[test]
    fn function_without_return_yields_last_statement() {
        let source = "function last a\n    a * 2\n    a * 3\nlast(2)";
        assert_eq!(run(source).0, Value::number(6.0));
    }

    #[test]
    fn function_arity_mismatch_is_reported_not_fatal() {
        let source = "function one a\n    return a\nset r one(1, 2)\nr";
        let (value, interp) = run(source);
        assert_eq!(value, Value::Null);
        assert!(
            interp
                .diagnostics()
                .messages()
                .iter()
                .any(|m| m.contains("expects 1 argument(s), got 2"))
        );
    }

    #[test]
    fn recursion_works_and_depth_is_bounded() {
        let source = "function fact n\n    if n <= 1\n        return 1\n    return n * fact(n - 1)\nfact(6)";
        assert_eq!(run(source).0, Value::number(720.0));

        let runaway = "function loop n\n    return loop(n + 1)\nloop(0)";
        let (value, interp) = run(runaway);
        assert_eq!(value, Value::Null);
        assert!(
            interp
                .diagnostics()
                .messages()
                .iter()
                .any(|m| m.contains("Call depth limit"))
        );
    }

    #[test]
    fn builtin_table_is_checked_before_user_functions() {
        assert_eq!(run("len(\"abcd\")").0, Value::number(4.0));
        assert_eq!(run("type(3)").0, Value::string("number"));
    }

    #[test]
    fn print_writes_through_the_output_handler() {
        let (_, interp) = run("set x 5\nset y x + 2\nprint y");
        assert_eq!(interp.captured_output(), "7\n");
    }

    #[test]
    fn print_joins_arguments_with_spaces() {
        let (_, interp) = run("print \"a\" 1 true");
        assert_eq!(interp.captured_output(), "a 1 true\n");
    }

    #[test]
    fn if_elif_else_takes_exactly_one_branch() {
        let source = "set x 2\nif x == 1\n    set r \"one\"\nelif x == 2\n    set r \"two\"\nelse\n    set r \"many\"\nr";
        assert_eq!(run(source).0, Value::string("two"));
    }

    #[test]
    fn if_without_else_yields_null_on_false() {
        assert_eq!(run("if false\n    1").0, Value::Null);
    }

    #[test]
    fn while_shares_scope_between_condition_and_body() {
        // The body's mutation must be visible to the next condition
        // check, terminating after exactly 3 iterations.
        let source = "set i 0\nset n 0\nwhile i < 3\n    set i i + 1\n    set n n + 10\nn";
        let (value, interp) = run(source);
        assert_eq!(value, Value::number(30.0));
        assert!(interp.diagnostics().is_empty());
    }

    #[test]
    fn runaway_while_is_stopped_with_a_diagnostic() {
        let mut interp = Interpreter::with_parts(
            Arc::new(Heap::new()),
            EvalConfig {
                max_loop_iterations: 50,
                ..EvalConfig::default()
            },
            PrintOutput::Capture(RefCell::new(String::new())),
        );
        let value = interp.run_source("set i 0\nwhile true\n    set i i + 1\ni").expect("run");
        assert_eq!(value, Value::number(50.0));
        assert!(
            interp
                .diagnostics()
                .messages()
                .iter()
                .any(|m| m.contains("maximum iterations"))
        );
    }

    #[test]
    fn while_break_continue_return() {
        let source = "set i 0\nset hits 0\nwhile i < 10\n    set i i + 1\n    if i == 3\n        continue\n    if i == 5\n        break\n    set hits hits + 1\nhits";
        // i = 1, 2, 4 count; 3 skipped; loop exits at 5.
        assert_eq!(run(source).0, Value::number(3.0));

        let with_return = "function f\n    while true\n        return 42\nf()";
        assert_eq!(run(with_return).0, Value::number(42.0));
    }

    #[test]
    fn for_iterates_array_elements_in_order() {
        let source = "set total 0\nfor x in [1, 2, 3]\n    set total total + x\ntotal";
        assert_eq!(run(source).0, Value::number(6.0));
    }

    #[test]
    fn for_iterates_object_keys_in_insertion_order() {
        let source = "set o {b: 1, a: 2}\nset joined \"\"\nfor k in o\n    set joined joined + k\njoined";
        assert_eq!(run(source).0, Value::string("ba"));
    }

    #[test]
    fn for_over_non_iterable_reports() {
        let (value, interp) = run("for x in 5\n    print x");
        assert_eq!(value, Value::Null);
        assert!(
            interp
                .diagnostics()
                .messages()
                .iter()
                .any(|m| m.contains("array or object"))
        );
    }

    #[test]
    fn property_access_on_objects_and_arrays() {
        assert_eq!(run("set o {x: 41}\no.x + 1").0, Value::number(42.0));
        assert_eq!(run("set a [10, 20]\na[1]").0, Value::number(20.0));
        assert_eq!(run("set a [10, 20]\nset i 0\na[i]").0, Value::number(10.0));
    }

    #[test]
    fn missing_object_key_is_null() {
        assert_eq!(run("set o {x: 1}\no.y").0, Value::Null);
    }

    #[test]
    fn out_of_bounds_index_reports_and_degrades() {
        let (value, interp) = run("set a [1]\na[10]");
        assert_eq!(value, Value::Null);
        assert!(
            interp
                .diagnostics()
                .messages()
                .iter()
                .any(|m| m.contains("Index out of bounds: 10 >= 1"))
        );
    }

    #[test]
    fn negative_or_fractional_index_reports() {
        let (value, interp) = run("set a [1]\na[0.5]");
        assert_eq!(value, Value::Null);
        assert!(!interp.diagnostics().is_empty());
    }

    #[test]
    fn property_access_on_scalar_reports() {
        let (value, interp) = run("set n 5\nn.x");
        assert_eq!(value, Value::Null);
        assert!(
            interp
                .diagnostics()
                .messages()
                .iter()
                .any(|m| m.contains("Cannot access property"))
        );
    }

    #[test]
    fn operand_errors_propagate_through_operators() {
        // Division by zero is an error value; the outer addition hands it
        // through unchanged rather than wrapping it.
        let (value, _) = run("set bad 1 / 0\nbad");
        assert!(value.is_error());
        let (value, _) = run("(1 / 0) + 5");
        assert!(crate::value::error::has_message(&value, "Division by zero"));
    }

    #[test]
    fn nested_function_capture_sees_defining_scope() {
        let source = "function outer\n    set hidden 7\n    function inner\n        return hidden\n    return inner()\nouter()";
        assert_eq!(run(source).0, Value::number(7.0));
    }

    #[test]
    fn function_redefinition_uses_latest_definition() {
        let source = "function f\n    return 1\nfunction f\n    return 2\nf()";
        assert_eq!(run(source).0, Value::number(2.0));
    }
}
