//! Edge condition/transform expression evaluators for Flowcraft.
//!
//! Two interchangeable evaluators both resolve an expression against a
//! JSON scope (`spec.md` §4.3): [`SafePathEvaluator`], which only
//! understands dotted property paths, and [`SandboxedEvaluator`], which
//! understands a small operator language but is explicitly unsafe for
//! untrusted input. [`Evaluator`] composes both behind one call site;
//! `Evaluator::default()` is the safe-path evaluator — the sandboxed one
//! requires opt-in construction (`spec.md` §9, Open Questions).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
mod safe;
mod sandboxed;

pub use error::EvalError;
pub use safe::SafePathEvaluator;
pub use sandboxed::SandboxedEvaluator;

use serde_json::Value;

/// Selects between the two evaluator implementations behind one call site.
#[derive(Debug, Clone, Copy)]
pub enum Evaluator {
    /// The safe, property-path-only evaluator. The default.
    SafePath(SafePathEvaluator),
    /// The sandboxed operator-language evaluator. Opt-in only.
    Sandboxed(SandboxedEvaluator),
}

impl Evaluator {
    /// The safe-path evaluator.
    #[must_use]
    pub fn safe_path() -> Self {
        Self::SafePath(SafePathEvaluator::new())
    }

    /// The sandboxed evaluator. Callers must opt in explicitly; it is
    /// not used anywhere by default.
    #[must_use]
    pub fn sandboxed() -> Self {
        Self::Sandboxed(SandboxedEvaluator::new())
    }

    /// Evaluate `expression` against `scope` using whichever
    /// implementation is selected.
    #[must_use]
    pub fn evaluate(&self, expression: &str, scope: &Value) -> Value {
        match self {
            Self::SafePath(e) => e.evaluate(expression, scope),
            Self::Sandboxed(e) => e.evaluate(expression, scope),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::safe_path()
    }
}

/// JS-style truthiness used to decide whether an edge `condition` fires
/// (`spec.md` §4.3): `null`, `false`, `0`, `""`, and empty arrays/objects
/// are falsy; everything else is truthy.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Re-exports of the most commonly used types.
pub mod prelude {
    pub use crate::{truthy, EvalError, Evaluator, SafePathEvaluator, SandboxedEvaluator};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_evaluator_is_safe_path() {
        let evaluator = Evaluator::default();
        assert!(matches!(evaluator, Evaluator::SafePath(_)));
    }

    #[test]
    fn safe_path_variant_ignores_operators() {
        let evaluator = Evaluator::safe_path();
        let scope = serde_json::json!({"a": 1});
        assert_eq!(evaluator.evaluate("a == 1", &scope), Value::Null);
    }

    #[test]
    fn sandboxed_variant_understands_operators() {
        let evaluator = Evaluator::sandboxed();
        let scope = serde_json::json!({"a": 1});
        assert_eq!(evaluator.evaluate("a == 1", &scope), Value::Bool(true));
    }

    #[test]
    fn truthy_matches_js_semantics() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&serde_json::json!(0)));
        assert!(!truthy(&serde_json::json!("")));
        assert!(truthy(&serde_json::json!("x")));
        assert!(truthy(&serde_json::json!(1)));
    }
}
