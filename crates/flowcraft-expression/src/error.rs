//! Evaluator errors.
//!
//! Per `spec.md` §4.3, both evaluators resolve a malformed or
//! out-of-grammar expression to `undefined` (here, `Value::Null`) rather
//! than propagating an error to the caller. [`EvalError`] exists for
//! callers that want to distinguish "evaluated to null" from "could not
//! even be parsed", via [`Evaluator::try_evaluate`](crate::Evaluator::try_evaluate).

use flowcraft_core::error::{Classify, ErrorKind};
use thiserror::Error;

/// Why an expression could not be evaluated.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EvalError {
    /// The expression did not match the safe-path grammar
    /// `^[A-Za-z_$][\w$]*(\.[A-Za-z_$][\w$]*)*$`.
    #[error("expression does not match the safe property-path grammar: {0}")]
    NotAPropertyPath(String),
    /// The sandboxed parser could not parse the expression.
    #[error("expression failed to parse: {0}")]
    ParseError(String),
    /// Maximum AST recursion depth was exceeded.
    #[error("expression exceeded the maximum nesting depth")]
    TooDeep,
}

impl Classify for EvalError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
