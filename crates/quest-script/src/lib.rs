//! Lexer, parser, compiler and step-wise interpreter for learner scripts.
//!
//! Scripts are a small imperative subset of JavaScript: `var`/`let`/`const`,
//! `if`/`else`, `while`, `do`/`while`, `for`, `break`/`continue`, top-level
//! `function` declarations, `return`, `throw`, the usual operators and the
//! `Math` object. There is no way to reach the host except through the
//! natives registered in a [`NativeTable`].
//!
//! This crate knows nothing about games so line counters and linters can use
//! it without pulling in the engines.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`ast`] | `Script`, `Stmt`, `Expr` |
//! | [`builtins`] | `Math` functions and constants |
//! | [`compiler`] | `Program`, `compile` entry point |
//! | [`error`] | `ParseError`, `ScriptError`, `NativeError` |
//! | [`lexer`] | `Lexer`, `Token` |
//! | [`metrics`] | `count_lines_of_code` |
//! | [`parser`] | `parse_script` |
//! | [`value`] | `Value` |
//! | [`vm`] | `Interpreter`, `Host`, `NativeTable` |
//!
//! # Quick start
//!
//! ```rust
//! use std::rc::Rc;
//! use quest_script::{Host, Interpreter, NativeError, NativeId, NativeTable, Value, compile};
//!
//! struct Counter(u32);
//! impl Host for Counter {
//!     fn call_native(&mut self, _: NativeId, _: &[Value]) -> Result<Value, NativeError> {
//!         self.0 += 1;
//!         Ok(Value::Undefined)
//!     }
//! }
//!
//! let mut natives = NativeTable::new();
//! natives.register("moveForward");
//!
//! let program = Rc::new(compile("for (var i = 0; i < 3; i++) { moveForward(); }").unwrap());
//! let mut interp = Interpreter::new(program, &natives);
//! let mut host = Counter(0);
//! while interp.step(&mut host).unwrap() {}
//! assert_eq!(host.0, 3);
//! ```

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod metrics;
pub mod parser;
pub mod value;
pub mod vm;

pub use compiler::{Program, compile, compile_looped};
pub use error::{NativeError, ParseError, ScriptError};
pub use metrics::count_lines_of_code;
pub use parser::parse_script;
pub use value::Value;
pub use vm::{Host, Interpreter, MAX_CALL_DEPTH, NativeId, NativeTable, RunOutcome};
