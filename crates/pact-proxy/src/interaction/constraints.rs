//! Constraint evaluation.
//!
//! Every constraint of an interaction is checked against a normalized
//! request. Evaluation reads shared state only; recording a match is a
//! separate step (`Interaction::store_request`).

use super::catalog::Catalog;
use super::types::{Constraint, Interaction};
use crate::request::NormalizedRequest;
use serde_json::Value;

impl Interaction {
    /// Evaluate all constraints against `request`.
    ///
    /// Returns whether every constraint held, plus one message per violated
    /// constraint. Constraints whose actual value is a list are skipped.
    pub fn evaluate(&self, request: &NormalizedRequest, catalog: &Catalog) -> (bool, Vec<String>) {
        let mut violations = Vec::new();

        for constraint in self.constraints() {
            if let Some(violation) = check(&constraint, request, catalog) {
                violations.push(violation);
            }
        }

        violations.sort();
        (violations.is_empty(), violations)
    }
}

fn check(constraint: &Constraint, request: &NormalizedRequest, catalog: &Catalog) -> Option<String> {
    let values = match resolve_values(constraint, catalog) {
        Ok(values) => values,
        Err(reason) => return Some(format!("{}: {}", constraint.path, reason)),
    };

    let actual = match request.select(&constraint.path) {
        Ok(Value::Array(_)) => return None,
        Ok(value) => render(&value),
        Err(_) => String::new(),
    };

    let expected = format_values(&constraint.format, &values);
    if actual == expected {
        None
    } else {
        Some(format!(
            "{}: expected '{}' but got '{}'",
            constraint.path, expected, actual
        ))
    }
}

/// Literal values, or values pulled from the source interaction's last
/// captured request.
fn resolve_values(constraint: &Constraint, catalog: &Catalog) -> Result<Vec<Value>, String> {
    let Some(source) = &constraint.source else {
        return Ok(constraint.values.clone());
    };

    let source_interaction = catalog
        .load(source)
        .ok_or_else(|| format!("source interaction '{source}' not found"))?;
    let captured = source_interaction
        .last_request()
        .ok_or_else(|| format!("source interaction '{source}' has no requests"))?;

    constraint
        .values
        .iter()
        .map(|value| {
            let expr = value
                .as_str()
                .ok_or_else(|| format!("source value {value} is not a path"))?;
            captured
                .select(expr)
                .map_err(|e| format!("source interaction '{source}': {e}"))
        })
        .collect()
}

/// String form of a JSON value as compared by constraints.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => render_number(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Integral floats render without a fraction so `30.0` compares equal to `30`.
fn render_number(n: &serde_json::Number) -> String {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    match n.as_f64() {
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < EXACT => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

/// printf-style formatting.
///
/// `%v`, `%s`, `%d` and `%f` consume the next value in its rendered form,
/// `%q` consumes it double-quoted, `%%` is a literal percent. Missing and
/// surplus values are reported inline the way Go's fmt does.
pub fn format_values(format: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut remaining = values.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb @ ('v' | 's' | 'd' | 'f' | 'q')) => match remaining.next() {
                Some(value) if verb == 'q' => out.push_str(&format!("{:?}", render(value))),
                Some(value) => out.push_str(&render(value)),
                None => out.push_str(&format!("%!{verb}(MISSING)")),
            },
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }

    let extra: Vec<String> = remaining.map(render).collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_values() {
        assert_eq!(format_values("%v", &[json!("bob")]), "bob");
        assert_eq!(format_values("%v", &[json!(42)]), "42");
        assert_eq!(
            format_values("%s-%d", &[json!("order"), json!(7)]),
            "order-7"
        );
        assert_eq!(format_values("100%% %v", &[json!(true)]), "100% true");
        assert_eq!(format_values("%q", &[json!("x")]), "\"x\"");
        assert_eq!(format_values("literal", &[]), "literal");
    }

    #[test]
    fn test_format_values_missing_and_extra() {
        assert_eq!(format_values("%v-%v", &[json!(1)]), "1-%!v(MISSING)");
        assert_eq!(
            format_values("%v", &[json!(1), json!(2)]),
            "1%!(EXTRA 2)"
        );
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&json!("s")), "s");
        assert_eq!(render(&json!(1.5)), "1.5");
        assert_eq!(render(&json!(30.0)), "30");
        assert_eq!(render(&json!(-2.0)), "-2");
        assert_eq!(render(&json!(30)), "30");
        assert_eq!(render(&json!(1e300)), "1e300");
        assert_eq!(render(&json!(null)), "null");
        assert_eq!(render(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
