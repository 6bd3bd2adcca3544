//! The safe property-path evaluator (`spec.md` §4.3).

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::EvalError;

fn grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_$][\w$]*(\.[A-Za-z_$][\w$]*)*$").expect("static regex is valid")
    })
}

/// Evaluates dotted property-path expressions against a JSON scope.
///
/// Only expressions matching `^[A-Za-z_$][\w$]*(\.[A-Za-z_$][\w$]*)*$` are
/// accepted; anything else (including any attempt at an operator,
/// function call, or literal) evaluates to `null`. Traversal stops as
/// soon as it hits `null` or a missing key, also yielding `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafePathEvaluator;

impl SafePathEvaluator {
    /// Construct a new evaluator. Stateless; cheap to create per call.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `expression` against `scope`, returning `Value::Null` for
    /// anything outside the grammar or any path through a missing key.
    #[must_use]
    pub fn evaluate(&self, expression: &str, scope: &Value) -> Value {
        self.try_evaluate(expression, scope).unwrap_or(Value::Null)
    }

    /// As [`Self::evaluate`], but distinguishes "not a property path" as
    /// an error rather than folding it into `null`.
    pub fn try_evaluate(&self, expression: &str, scope: &Value) -> Result<Value, EvalError> {
        if !grammar().is_match(expression) {
            return Err(EvalError::NotAPropertyPath(expression.to_owned()));
        }
        let mut current = scope;
        for segment in expression.split('.') {
            match current {
                Value::Object(map) => match map.get(segment) {
                    Some(v) => current = v,
                    None => return Ok(Value::Null),
                },
                _ => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }
}
