use std::fmt;

use crate::value::Value;

/// A syntax or compile error in a learner script.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// 1-based source line number where the error occurred.
    pub line: usize,
    /// 1-based source column number where the error occurred.
    pub col: usize,
}

impl ParseError {
    pub(crate) fn new(msg: impl Into<String>, line: usize, col: usize) -> Self {
        Self { message: msg.into(), line, col }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "syntax error at {}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

/// An error raised while a script is executing.
///
/// Once an [`Interpreter`](crate::Interpreter) returns one of these it is
/// finished; further `step` calls report no more code.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// The interpreter itself refused to continue (undefined name, stack
    /// overflow, unknown native, ...).
    Runtime { message: String, line: usize },
    /// The script executed `throw` (or a native threw) and nothing caught it.
    Thrown { value: Value, line: usize },
}

impl ScriptError {
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Runtime { line, .. } | ScriptError::Thrown { line, .. } => *line,
        }
    }

    /// The thrown value, if this error is an uncaught `throw`.
    pub fn thrown(&self) -> Option<&Value> {
        match self {
            ScriptError::Thrown { value, .. } => Some(value),
            ScriptError::Runtime { .. } => None,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Runtime { message, line } => {
                write!(f, "runtime error on line {line}: {message}")
            }
            ScriptError::Thrown { value, line } => {
                write!(f, "uncaught exception on line {line}: {value}")
            }
        }
    }
}

impl std::error::Error for ScriptError {}

/// Failure signalled by a native binding back into the interpreter.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeError {
    /// Behaves exactly like a script-level `throw value`.
    Throw(Value),
    /// Aborts the script with a runtime error.
    Fault(String),
}
