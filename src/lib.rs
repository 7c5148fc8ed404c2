//! koan — a small dynamically-typed scripting language runtime.
//!
//! The crate is layered leaves-first: the `memory` subsystem (allocation
//! tracking, pools, refcount primitives), the `arena` handing out
//! fixed-size AST node slots, the `value` model (one reference-counted
//! sum type over every runtime datum), flat lexical `scope`s, and the
//! tree-walking `interpreter` on top. The `lexer` and `parser` turn
//! indentation-structured source into arena-allocated trees.
//!
//! ```
//! use koan::Interpreter;
//!
//! let mut interp = Interpreter::with_capture();
//! interp.run_source("set x 5\nset y x + 2\nprint y").unwrap();
//! assert_eq!(interp.captured_output(), "7\n");
//! ```

pub mod arena;
pub mod ast;
pub mod diagnostic;
pub mod interpreter;
pub mod lexer;
pub mod memory;
pub mod parser;
pub mod scope;
pub mod value;

pub use interpreter::{EvalConfig, Flow, Interpreter, PrintOutput, RunError};
pub use value::Value;

/// Run a source program in a fresh interpreter and return its result
/// value. Convenience for embedders that don't need output capture or
/// diagnostics.
pub fn run_source(source: &str) -> Result<Value, RunError> {
    Interpreter::new().run_source(source)
}
