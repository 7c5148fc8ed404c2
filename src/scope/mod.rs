//! Flat lexical scopes.
//!
//! A scope is two order-preserving tables: variable bindings (name to
//! value) and function bindings (name to definition node). Defining a
//! name that already exists replaces the binding in place — for functions
//! as well as variables, so a redefinition is actually reachable. There
//! is no parent chaining here: shadowing comes from the evaluator
//! attaching distinct scope instances to distinct blocks and searching
//! its stack top-down, each scope independently.
//!
//! Scopes never own AST nodes; dropping a scope releases only its own
//! tables.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::arena::NodeId;
use crate::value::Value;

/// Order-preserving name table: entry vector for iteration order, hash
/// index for lookup, replace-in-place on redefinition.
#[derive(Debug)]
struct Bindings<T> {
    entries: Vec<(String, T)>,
    index: FxHashMap<String, usize>,
}

impl<T> Default for Bindings<T> {
    fn default() -> Self {
        Bindings {
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<T: Clone> Bindings<T> {
    fn define(&mut self, name: &str, value: T) {
        match self.index.get(name) {
            Some(&at) => self.entries[at].1 = value,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push((name.to_string(), value));
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<T> {
        self.index.get(name).map(|&at| self.entries[at].1.clone())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }
}

#[derive(Default)]
pub struct Scope {
    variables: Bindings<Value>,
    functions: Bindings<NodeId>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    /// A fresh scope behind a shared handle.
    pub fn shared() -> ScopeRef {
        ScopeRef::new(Scope::new())
    }

    pub fn define_variable(&mut self, name: &str, value: Value) {
        self.variables.define(name, value);
    }

    /// Lookup is exact-match; a miss is `None`, reported by the caller as
    /// a runtime diagnostic rather than a panic.
    pub fn lookup_variable(&self, name: &str) -> Option<Value> {
        self.variables.lookup(name)
    }

    pub fn define_function(&mut self, name: &str, node: NodeId) {
        self.functions.define(name, node);
    }

    pub fn lookup_function(&self, name: &str) -> Option<NodeId> {
        self.functions.lookup(name)
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.names()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bound values can reach back to this scope through function
        // captures; printing counts keeps Debug cycle-free.
        f.debug_struct("Scope")
            .field("variables", &self.variables.len())
            .field("functions", &self.functions.len())
            .finish()
    }
}

/// Shared, single-threaded handle to a scope. Loop bodies and their
/// conditions hold the same handle, which is what makes a mutation in
/// one visible to the other.
pub struct ScopeRef(Rc<RefCell<Scope>>);

impl ScopeRef {
    pub fn new(scope: Scope) -> Self {
        ScopeRef(Rc::new(RefCell::new(scope)))
    }

    pub fn borrow(&self) -> Ref<'_, Scope> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Scope> {
        self.0.borrow_mut()
    }

    /// Same scope instance, not merely equal contents.
    pub fn is_same(&self, other: &ScopeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn define_variable(&self, name: &str, value: Value) {
        self.0.borrow_mut().define_variable(name, value);
    }

    pub fn lookup_variable(&self, name: &str) -> Option<Value> {
        self.0.borrow().lookup_variable(name)
    }

    pub fn define_function(&self, name: &str, node: NodeId) {
        self.0.borrow_mut().define_function(name, node);
    }

    pub fn lookup_function(&self, name: &str) -> Option<NodeId> {
        self.0.borrow().lookup_function(name)
    }
}

impl Clone for ScopeRef {
    fn clone(&self) -> Self {
        ScopeRef(Rc::clone(&self.0))
    }
}

impl fmt::Debug for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeRef").field(&self.0.borrow()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::NodeArena;
    use crate::ast::Node;
    use crate::memory::Heap;
    use std::sync::Arc;

    #[test]
    fn define_and_lookup_variable() {
        let mut scope = Scope::new();
        scope.define_variable("x", Value::number(5.0));
        assert_eq!(scope.lookup_variable("x"), Some(Value::number(5.0)));
        assert!(scope.lookup_variable("y").is_none());
    }

    #[test]
    fn redefining_variable_replaces_in_place() {
        let mut scope = Scope::new();
        scope.define_variable("x", Value::number(1.0));
        scope.define_variable("x", Value::number(2.0));
        assert_eq!(scope.variable_count(), 1);
        assert_eq!(scope.lookup_variable("x"), Some(Value::number(2.0)));
    }

    #[test]
    fn redefining_function_replaces_in_place() {
        let arena = NodeArena::new(Arc::new(Heap::new()));
        let first = arena.acquire(Node::NoOp).expect("first");
        let second = arena.acquire(Node::NoOp).expect("second");

        let mut scope = Scope::new();
        scope.define_function("f", first);
        scope.define_function("f", second);
        assert_eq!(scope.function_count(), 1);
        // The newer definition is the reachable one.
        assert_eq!(scope.lookup_function("f"), Some(second));
    }

    #[test]
    fn variables_and_functions_are_separate_tables() {
        let arena = NodeArena::new(Arc::new(Heap::new()));
        let node = arena.acquire(Node::NoOp).expect("node");

        let mut scope = Scope::new();
        scope.define_variable("name", Value::string("v"));
        scope.define_function("name", node);
        assert_eq!(scope.variable_count(), 1);
        assert_eq!(scope.function_count(), 1);
        assert_eq!(scope.lookup_variable("name"), Some(Value::string("v")));
        assert_eq!(scope.lookup_function("name"), Some(node));
    }

    #[test]
    fn binding_order_is_insertion_order() {
        let mut scope = Scope::new();
        scope.define_variable("b", Value::Null);
        scope.define_variable("a", Value::Null);
        scope.define_variable("b", Value::number(1.0));
        assert_eq!(scope.variable_names(), vec!["b", "a"]);
    }

    #[test]
    fn shared_handles_see_the_same_scope() {
        let shared = Scope::shared();
        let alias = shared.clone();
        assert!(shared.is_same(&alias));

        alias.define_variable("x", Value::number(9.0));
        assert_eq!(shared.lookup_variable("x"), Some(Value::number(9.0)));
    }

    #[test]
    fn distinct_scopes_are_independent() {
        let a = Scope::shared();
        let b = Scope::shared();
        assert!(!a.is_same(&b));
        a.define_variable("x", Value::number(1.0));
        assert!(b.lookup_variable("x").is_none());
    }
}
