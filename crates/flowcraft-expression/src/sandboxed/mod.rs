//! The sandboxed expression evaluator (`spec.md` §4.3).
//!
//! Unlike the safe-path evaluator, this one understands operators,
//! literals, and index access. Its only binding to the outside world is
//! `scope`: the only names it can resolve are the top-level keys of
//! `scope` that are valid identifiers. It has no access to any global or
//! process state. **It is explicitly unsafe for untrusted input** — it
//! has no resource limits beyond a bounded parse-nesting depth, and a
//! pathological expression can still consume unbounded evaluator time
//! via deeply chained property/index access on a large scope.

mod ast;

use serde_json::Value;

use crate::error::EvalError;
use ast::{BinOp, Expr};

/// Evaluates a small expression language (literals, property/index
/// access, comparisons, boolean and arithmetic operators) against a JSON
/// scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxedEvaluator;

impl SandboxedEvaluator {
    /// Construct a new evaluator. Stateless; cheap to create per call.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `expression` against `scope`. Any parse failure or
    /// runtime type error resolves to `Value::Null` rather than
    /// propagating, matching `spec.md`'s "failure to compile/evaluate
    /// returns `undefined`" rule.
    #[must_use]
    pub fn evaluate(&self, expression: &str, scope: &Value) -> Value {
        self.try_evaluate(expression, scope).unwrap_or(Value::Null)
    }

    /// As [`Self::evaluate`], surfacing the parse error instead of
    /// folding it into `null`.
    pub fn try_evaluate(&self, expression: &str, scope: &Value) -> Result<Value, EvalError> {
        let expr = ast::parse(expression)?;
        Ok(eval_expr(&expr, scope))
    }
}

fn eval_expr(expr: &Expr, scope: &Value) -> Value {
    match expr {
        Expr::Null => Value::Null,
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Number(n) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        Expr::String(s) => Value::String(s.clone()),
        Expr::Identifier(name) => lookup_top_level(name, scope),
        Expr::PropertyAccess(base, name) => {
            let base_val = eval_expr(base, scope);
            match base_val {
                Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }
        }
        Expr::IndexAccess(base, index) => {
            let base_val = eval_expr(base, scope);
            let index_val = eval_expr(index, scope);
            match (base_val, index_val) {
                (Value::Array(items), Value::Number(n)) => {
                    let idx = n.as_f64().unwrap_or(-1.0);
                    if idx >= 0.0 {
                        items.get(idx as usize).cloned().unwrap_or(Value::Null)
                    } else {
                        Value::Null
                    }
                }
                (Value::Object(map), Value::String(key)) => map.get(&key).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }
        }
        Expr::Not(inner) => Value::Bool(!truthy(&eval_expr(inner, scope))),
        Expr::Negate(inner) => match eval_expr(inner, scope) {
            Value::Number(n) => n
                .as_f64()
                .and_then(|f| serde_json::Number::from_f64(-f))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, scope),
    }
}

fn lookup_top_level(name: &str, scope: &Value) -> Value {
    match scope {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn eval_binary(op: BinOp, lhs: &Expr, rhs: &Expr, scope: &Value) -> Value {
    // Short-circuit boolean operators evaluate their right side lazily.
    if op == BinOp::Or {
        let l = eval_expr(lhs, scope);
        return if truthy(&l) { l } else { eval_expr(rhs, scope) };
    }
    if op == BinOp::And {
        let l = eval_expr(lhs, scope);
        return if truthy(&l) { eval_expr(rhs, scope) } else { l };
    }

    let l = eval_expr(lhs, scope);
    let r = eval_expr(rhs, scope);
    match op {
        BinOp::Eq => Value::Bool(l == r),
        BinOp::NotEq => Value::Bool(l != r),
        BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => match (as_f64(&l), as_f64(&r)) {
            (Some(a), Some(b)) => Value::Bool(match op {
                BinOp::Lt => a < b,
                BinOp::Lte => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            }),
            _ => Value::Null,
        },
        BinOp::Add => match (&l, &r) {
            (Value::String(a), Value::String(b)) => Value::String(format!("{a}{b}")),
            _ => match (as_f64(&l), as_f64(&r)) {
                (Some(a), Some(b)) => serde_json::Number::from_f64(a + b).map(Value::Number).unwrap_or(Value::Null),
                _ => Value::Null,
            },
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div => match (as_f64(&l), as_f64(&r)) {
            (Some(a), Some(b)) => {
                let result = match op {
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    _ if b == 0.0 => return Value::Null,
                    _ => a / b,
                };
                serde_json::Number::from_f64(result).map(Value::Number).unwrap_or(Value::Null)
            }
            _ => Value::Null,
        },
        BinOp::Or | BinOp::And => unreachable!("handled above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Value {
        serde_json::json!({
            "result": {"value": 15, "user": {"role": "admin"}},
            "items": [10, 20, 30],
        })
    }

    #[test]
    fn admin_condition_matches_spec_scenario_5() {
        let eval = SandboxedEvaluator::new();
        assert_eq!(
            eval.evaluate("result.user.role === 'admin'", &scope()),
            Value::Bool(true)
        );
    }

    #[test]
    fn value_threshold_condition_matches_spec_scenario_5() {
        let eval = SandboxedEvaluator::new();
        let low_value = serde_json::json!({"result": {"value": 5, "user": {"role": "guest"}}});
        assert_eq!(eval.evaluate("result.value <= 10", &low_value), Value::Bool(true));
        assert_eq!(eval.evaluate("result.value <= 10", &scope()), Value::Bool(false));
    }

    #[test]
    fn index_access_resolves_array_elements() {
        let eval = SandboxedEvaluator::new();
        assert_eq!(eval.evaluate("items[1]", &scope()), serde_json::json!(20));
    }

    #[test]
    fn logical_and_short_circuits() {
        let eval = SandboxedEvaluator::new();
        assert_eq!(eval.evaluate("false && nonexistent.boom", &scope()), Value::Bool(false));
    }

    #[test]
    fn unparseable_expression_yields_null() {
        let eval = SandboxedEvaluator::new();
        assert_eq!(eval.evaluate("!!! bad ===", &scope()), Value::Null);
    }

    #[test]
    fn only_top_level_scope_keys_are_resolvable() {
        let eval = SandboxedEvaluator::new();
        assert_eq!(eval.evaluate("notAKey", &scope()), Value::Null);
    }

    #[test]
    fn string_concatenation_via_plus() {
        let eval = SandboxedEvaluator::new();
        let scope = serde_json::json!({"a": "foo", "b": "bar"});
        assert_eq!(eval.evaluate("a + b", &scope), serde_json::json!("foobar"));
    }

    #[test]
    fn division_by_zero_yields_null() {
        let eval = SandboxedEvaluator::new();
        assert_eq!(eval.evaluate("1 / 0", &Value::Null), Value::Null);
    }
}
